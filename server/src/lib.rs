//! Deep Zoom Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod annotation;
pub mod asset;
pub mod config;
pub mod pyramid;
pub mod server;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use annotation::{Annotation, AnnotationManager};
pub use asset::{AssetError, AssetStore, StorageLayout};
pub use pyramid::{
    OutputFormat, PyramidError, PyramidGenerator, PyramidHandle, VipsPyramidGenerator,
};
pub use server::{AppState, build_router};
