//! Annotation module
//!
//! CRUD over the ordered annotation list embedded in each asset's metadata record.

mod manager;
pub mod routes;
mod types;

pub use manager::AnnotationManager;
pub use routes::{AnnotationAppState, annotation_routes};
pub use types::{Annotation, AnnotationPatch};
