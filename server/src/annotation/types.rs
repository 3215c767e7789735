//! Annotation types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key the store indexes annotations by
pub const ID_FIELD: &str = "id";

/// A single annotation: an id plus an opaque payload (shape, region, label, ...)
///
/// Only `id` is interpreted; every other field round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Fields to shallow-merge into an existing annotation
pub type AnnotationPatch = Map<String, Value>;

impl Annotation {
    /// Build an annotation from a client document, keeping its id when it has one
    ///
    /// Returns `Err` with a message when the id is present but not a string or number.
    pub fn from_document(mut document: Map<String, Value>) -> Result<Self, String> {
        let id = match document.remove(ID_FIELD) {
            None | Some(Value::Null) => uuid::Uuid::new_v4().simple().to_string(),
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(format!(
                    "Annotation id must be a non-empty string or number, got {}",
                    other
                ));
            }
        };
        Ok(Self {
            id,
            payload: document,
        })
    }

    /// Overwrite top-level fields from `patch`; the id is never changed
    pub fn merge(&mut self, patch: &AnnotationPatch) {
        for (key, value) in patch {
            if key == ID_FIELD {
                continue;
            }
            self.payload.insert(key.clone(), value.clone());
        }
    }
}
