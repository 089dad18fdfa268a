pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod llm;
pub mod retriever;

pub use cache::EmbeddingCache;
pub use config::Config;
pub use embeddings::{Embedder, HostedEmbedder};
pub use error::{Result, TrafficRagError};
pub use graph::KnowledgeGraph;
pub use llm::LlmClient;
pub use retriever::{DocumentRetriever, RetrievedDocument};
