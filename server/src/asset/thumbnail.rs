//! Preview tile lookup inside a generated pyramid

use std::path::PathBuf;

use crate::pyramid::PyramidHandle;

/// Candidate levels in order of preference.
///
/// Deep Zoom level 8 is at most 256px on its longest side, a single tile at the
/// default tile size. Nearby larger levels come next, then the smaller ones.
pub const THUMBNAIL_LEVELS: &[u32] = &[8, 9, 10, 7, 6, 5, 4, 3, 2, 1, 0];

/// Find a representative tile using [`THUMBNAIL_LEVELS`]
pub fn find_thumbnail(pyramid: &PyramidHandle) -> Option<PathBuf> {
    find_thumbnail_in(pyramid, THUMBNAIL_LEVELS)
}

/// Return the lexicographically first tile of the first preferred level that has any
pub fn find_thumbnail_in(pyramid: &PyramidHandle, levels: &[u32]) -> Option<PathBuf> {
    levels.iter().find_map(|level| {
        let entries = std::fs::read_dir(pyramid.tiles_dir.join(level.to_string())).ok()?;
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .min()
    })
}
