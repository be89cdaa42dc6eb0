//! Process-wide shared state, built once in `main` and handed to every
//! handler as `web::Data<AppState>` -- the same shape as the teacher's
//! `RpcHandler::new(db_gateway, db_connection_pool)`, just generalised to the
//! extra trait-object collaborators this core depends on (§1 "Out of scope":
//! embedding generation, schema validation, inverse-type configuration).

use std::sync::Arc;

use async_trait::async_trait;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::AsyncPgConnection;

use chronograph_core::traits::{Embedder, InverseTypeProvider, NoInverseTypes, SchemaProvider};
use chronograph_core::ChronographError;

use crate::config::Config;

/// Stand-in `Embedder` for a deployment that hasn't wired a real one in.
/// Distinct from the `NoopEmbedder` test double (§11 "Non-goals remain
/// binding ... a `NoopEmbedder` test double lives under `#[cfg(test)]`
/// only"): this one fails loudly with `Validation` rather than silently
/// returning a zero vector, since minting a fake embedding in production
/// would poison vector search with meaningless neighbours.
pub struct UnconfiguredEmbedder;

#[async_trait]
impl Embedder for UnconfiguredEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ChronographError> {
        Err(ChronographError::validation(
            "no embedder is configured for this deployment; triplet/vector embeddings cannot be minted",
        ))
    }
}

pub struct AppState {
    pub pool: Arc<Pool<AsyncPgConnection>>,
    pub embedder: Arc<dyn Embedder>,
    pub inverse_types: Arc<dyn InverseTypeProvider>,
    pub schema_provider: Option<Arc<dyn SchemaProvider>>,
    pub config: Config,
}

impl AppState {
    pub fn new(pool: Pool<AsyncPgConnection>, config: Config) -> Self {
        AppState {
            pool: Arc::new(pool),
            embedder: Arc::new(UnconfiguredEmbedder),
            inverse_types: Arc::new(NoInverseTypes),
            schema_provider: None,
            config,
        }
    }
}
