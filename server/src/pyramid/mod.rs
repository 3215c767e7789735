//! Pyramid generation module
//!
//! This module provides:
//! - `PyramidGenerator` trait for abstracting the external tiling engine
//! - `VipsPyramidGenerator` which shells out to `vips dzsave`
//! - `PyramidHandle` describing the descriptor and tile tree of a generated pyramid

mod service;
mod types;
mod vips;

pub use service::PyramidGenerator;
pub use types::{DESCRIPTOR_EXTENSION, OutputFormat, PyramidError, PyramidHandle};
pub use vips::VipsPyramidGenerator;
