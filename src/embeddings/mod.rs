//! Query embedding: the `Embedder` seam and the hosted HTTP client.

mod hosted;

pub use hosted::HostedEmbedder;

use async_trait::async_trait;

use crate::error::Result;

/// Turns query text into a fixed-dimensional vector.
///
/// The vector index must have been populated with the same model the bound
/// embedder runs: the index records the model name and dimensionality, but
/// only the dimensionality can be checked — a same-dimension model swap is a
/// silent correctness hazard.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single query text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the underlying embedding model.
    fn model(&self) -> &str;
}
