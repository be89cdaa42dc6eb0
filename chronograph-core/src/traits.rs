//! Trait seams the core depends on but does not implement (§1 "Non-goals",
//! §6 "Out of scope"). Production wiring of these lives outside this
//! workspace's scope; `chronograph-api` only needs to supply something that
//! implements them.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ChronographError;

/// Mints embeddings for text. The core calls this; it never generates
/// embeddings itself (§1 Non-goals).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChronographError>;
}

/// Validates an object's properties against a project's template-pack
/// schema. Out of scope per §1 ("schema/template-pack loading and property
/// coercion"); schema-provider failures degrade to skipping validation with
/// a warning (§7 "Propagation").
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn validate(
        &self,
        project_id: &str,
        object_type: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), ChronographError>;
}

/// Declares inverse relationship types, e.g. `OWNS` <-> `OWNED_BY` (§4.2
/// "Relationship versioning"). Must be warmed outside any transaction (§5
/// "Cross-channel deadlock avoidance").
pub trait InverseTypeProvider: Send + Sync {
    fn inverse_of(&self, relationship_type: &str) -> Option<String>;
}

/// A provider that declares no inverses. Useful as a default when the
/// surrounding system has no inverse-type configuration.
pub struct NoInverseTypes;

impl InverseTypeProvider for NoInverseTypes {
    fn inverse_of(&self, _relationship_type: &str) -> Option<String> {
        None
    }
}
