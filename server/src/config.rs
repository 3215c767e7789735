//! Server configuration
//!
//! Configuration is loaded from environment variables layered over defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public base URL prepended to pyramid and thumbnail links (optional)
    pub public_base_url: Option<String>,
    /// Allow any origin/method/header via CORS
    pub cors_allow_any: bool,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Upload configuration
    pub upload: UploadConfig,

    /// External pyramid generator configuration
    pub generator: GeneratorConfig,

    /// Sample asset configuration
    pub sample: SampleConfig,
}

/// Storage-related configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding uploads, metadata, pyramids and staging output
    pub data_dir: PathBuf,
}

/// Upload-related configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
}

/// External tiler configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Path or name of the `vips` executable
    pub vips_binary: PathBuf,
    /// Quality used for the `jpeg` output format
    pub jpeg_quality: u8,
    /// Quality used for the `webp` output format
    pub webp_quality: u8,
    /// Optional upper bound on a single generation run
    pub timeout: Option<Duration>,
}

/// Sample asset configuration
#[derive(Debug, Clone)]
pub struct SampleConfig {
    /// Well-known sample source file, provisioned at startup when present
    pub path: PathBuf,
    /// Fixed asset id used for the sample
    pub asset_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: None,
            cors_allow_any: true,
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            generator: GeneratorConfig::default(),
            sample: SampleConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 512 * 1024 * 1024, // 512 MB
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            vips_binary: PathBuf::from("vips"),
            jpeg_quality: 90,
            webp_quality: 85,
            timeout: None,
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./sample.jpg"),
            asset_id: "sample".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL")
            && !url.is_empty()
        {
            config.public_base_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Ok(val) = env::var("CORS_ALLOW_ANY") {
            config.cors_allow_any = parse_bool(&val);
        }

        // Storage config
        if let Ok(dir) = env::var("DATA_DIR")
            && !dir.is_empty()
        {
            config.storage.data_dir = PathBuf::from(dir);
        }

        // Upload config
        if let Ok(val) = env::var("MAX_UPLOAD_SIZE_MB")
            && let Ok(mb) = val.parse::<usize>()
        {
            config.upload.max_upload_size = mb * 1024 * 1024;
        }

        // Generator config
        if let Ok(bin) = env::var("VIPS_BINARY")
            && !bin.is_empty()
        {
            config.generator.vips_binary = PathBuf::from(bin);
        }
        if let Ok(val) = env::var("JPEG_QUALITY")
            && let Ok(q) = val.parse::<u8>()
        {
            config.generator.jpeg_quality = q.clamp(1, 100);
        }
        if let Ok(val) = env::var("WEBP_QUALITY")
            && let Ok(q) = val.parse::<u8>()
        {
            config.generator.webp_quality = q.clamp(1, 100);
        }
        if let Ok(val) = env::var("GENERATOR_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.generator.timeout = Some(Duration::from_secs(secs));
        }

        // Sample config
        if let Ok(path) = env::var("SAMPLE_IMAGE_PATH")
            && !path.is_empty()
        {
            config.sample.path = PathBuf::from(path);
        }
        if let Ok(id) = env::var("SAMPLE_ASSET_ID")
            && !id.is_empty()
        {
            config.sample.asset_id = id;
        }

        config
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.generator.webp_quality, 85);
        assert_eq!(config.sample.asset_id, "sample");
        assert!(config.generator.timeout.is_none());
    }

    #[test]
    fn test_config_from_env() {
        // No env vars are set here, so defaults come back
        let config = Config::from_env();
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("no"));
    }
}
