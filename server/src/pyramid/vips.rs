//! Pyramid generator backed by the `vips` command-line tool

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;

use super::service::PyramidGenerator;
use super::types::{OutputFormat, PyramidError, PyramidHandle};

/// Upper bound on captured stderr carried in errors
const MAX_STDERR_BYTES: usize = 4096;

/// Runs `vips dzsave <source> <prefix> [--suffix ...]`
pub struct VipsPyramidGenerator {
    binary: PathBuf,
    jpeg_quality: u8,
    webp_quality: u8,
    timeout: Option<Duration>,
}

impl VipsPyramidGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            binary: config.vips_binary.clone(),
            jpeg_quality: config.jpeg_quality,
            webp_quality: config.webp_quality,
            timeout: config.timeout,
        }
    }

    /// Tile suffix option for a format, or `None` to keep the tool's default codec
    fn suffix_for(&self, format: OutputFormat) -> Option<String> {
        match format {
            OutputFormat::Default => None,
            OutputFormat::Jpeg => Some(format!(".jpeg[Q={}]", self.jpeg_quality)),
            OutputFormat::Webp => Some(format!(".webp[Q={}]", self.webp_quality)),
            OutputFormat::Png => Some(".png".to_string()),
        }
    }

    /// Full argument vector passed to the binary
    fn dzsave_args(&self, source: &Path, prefix: &Path, format: OutputFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "dzsave".into(),
            source.as_os_str().to_owned(),
            prefix.as_os_str().to_owned(),
        ];
        if let Some(suffix) = self.suffix_for(format) {
            args.push("--suffix".into());
            args.push(suffix.into());
        }
        args
    }
}

#[async_trait]
impl PyramidGenerator for VipsPyramidGenerator {
    async fn generate(
        &self,
        source: &Path,
        destination_prefix: &Path,
        format: OutputFormat,
    ) -> Result<PyramidHandle, PyramidError> {
        let args = self.dzsave_args(source, destination_prefix, format);
        debug!("Running {:?} {:?}", self.binary, args);

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let run = cmd.output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Tiler timed out after {:?} for {:?}", limit, source);
                    return Err(PyramidError::TimedOut(limit));
                }
            },
            None => run.await,
        }
        .map_err(|e| PyramidError::Spawn {
            binary: self.binary.clone(),
            source: e,
        })?;
        histogram!("dzi_generation_duration_seconds", "format" => format.as_str())
            .record(start.elapsed());

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > MAX_STDERR_BYTES {
                let mut cut = MAX_STDERR_BYTES;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            warn!(
                "Tiler failed for {:?} ({}): {}",
                source, output.status, stderr
            );
            return Err(PyramidError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let handle = PyramidHandle::from_prefix(destination_prefix);
        if !handle.check_complete().await {
            return Err(PyramidError::IncompleteOutput(handle.descriptor));
        }

        info!(
            "Generated {} pyramid for {:?} in {:?}",
            format,
            source,
            start.elapsed()
        );
        Ok(handle)
    }
}
