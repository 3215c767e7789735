//! PyramidGenerator trait definition

use std::path::Path;

use async_trait::async_trait;

use super::types::{OutputFormat, PyramidError, PyramidHandle};

/// Trait for tile pyramid generators (external `vips` binary or test doubles)
#[async_trait]
pub trait PyramidGenerator: Send + Sync {
    /// Build a pyramid from `source`, writing `<prefix>.dzi` and `<prefix>_files/`.
    ///
    /// A generator either produces the full set of artifacts or returns an error.
    /// Failures are treated as deterministic, so callers never retry.
    async fn generate(
        &self,
        source: &Path,
        destination_prefix: &Path,
        format: OutputFormat,
    ) -> Result<PyramidHandle, PyramidError>;
}
