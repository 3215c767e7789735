//! Asset module: the lifecycle of an uploaded image and its generated pyramid
//!
//! This module provides:
//! - `AssetStore` owning source files, metadata records and published pyramids
//! - `StorageLayout` mapping asset ids to paths beneath the storage root
//! - `AssetLocks` serializing metadata mutations per asset id
//! - thumbnail lookup for listings
//! - HTTP routes for upload, listing, deletion and pyramid lookup

mod layout;
mod locks;
pub mod routes;
mod store;
mod thumbnail;
mod types;

pub use layout::{StorageLayout, is_valid_asset_id};
pub use routes::{AssetAppState, AssetErrorResponse, asset_routes};
pub use store::{AssetStore, PYRAMID_FILES_ROUTE};
pub use types::{Asset, AssetError, AssetRecord, AssetSummary};
