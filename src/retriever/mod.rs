//! Semantic nearest-neighbor retrieval over a pre-built vector index.

mod index;

pub use index::{IndexHit, VectorIndex, STORE_FILE};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::cache::EmbeddingCache;
use crate::embeddings::Embedder;
use crate::error::{Result, TrafficRagError};

/// A single retrieved document. Produced fresh per query; owned by the
/// caller, never persisted by this component.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    /// Original document text as stored in the index.
    pub text: String,
    /// Stored metadata; an empty object when the index carries none.
    pub metadata: Value,
    /// Dissimilarity score (cosine distance, lower = more relevant).
    pub score: f32,
}

/// Read-only semantic retriever bound to one index collection and one
/// embedding model.
pub struct DocumentRetriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    cache: Option<Arc<EmbeddingCache>>,
}

impl std::fmt::Debug for DocumentRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRetriever")
            .field("index", &self.index)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl DocumentRetriever {
    /// Bind to a collection inside an existing index directory.
    ///
    /// Fails with `Retrieval` if the index or collection cannot be opened.
    /// The embedder must run the same model the collection was populated
    /// with; only its dimensionality can be verified later, per query.
    pub async fn open<P: AsRef<Path>>(
        index_path: P,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let index = VectorIndex::open(index_path, collection).await?;
        Ok(Self {
            index,
            embedder,
            cache: None,
        })
    }

    /// Attach a query-embedding cache (avoids re-embedding repeated queries).
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Collection this retriever is bound to.
    pub fn collection(&self) -> &str {
        self.index.collection()
    }

    /// Top-k most relevant documents for a query, closest first.
    ///
    /// An empty or whitespace-only query returns no results without calling
    /// the embedder. `k` must be positive; a `k` larger than the collection
    /// returns as many documents as exist.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if k == 0 {
            return Err(TrafficRagError::InvalidInput(
                "k must be a positive integer".to_string(),
            ));
        }

        let start = Instant::now();
        let query_vec = self.embed_query(query).await?;

        if query_vec.len() != self.index.dimensions() {
            return Err(TrafficRagError::Embedding(format!(
                "Unexpected embedding dimension: expected {}, got {}",
                self.index.dimensions(),
                query_vec.len()
            )));
        }

        let hits = self.index.nearest(query_vec, k).await?;
        log::debug!("retrieved {} documents in {:?}", hits.len(), start.elapsed());

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                metadata: decode_metadata(hit.metadata_json.as_deref()),
                text: hit.text,
                score: hit.distance,
            })
            .collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let model = self.embedder.model();
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(model, query)) {
            log::debug!("embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.embedder.embed(query).await?;
        if let Some(cache) = &self.cache {
            cache.put(model, query, embedding.clone());
        }
        Ok(embedding)
    }
}

/// Stored metadata is JSON text; anything absent or unparseable becomes an
/// empty object so callers always see a mapping.
fn decode_metadata(raw: Option<&str>) -> Value {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::params;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic embedder: returns pre-registered vectors and counts
    /// calls so tests can assert the no-embedding fast path.
    struct FixtureEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl FixtureEmbedder {
        fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: vectors
                    .iter()
                    .map(|(q, v)| (q.to_string(), v.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for FixtureEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.vectors.get(text).cloned().ok_or_else(|| {
                TrafficRagError::Embedding(format!("no fixture vector for {:?}", text))
            })
        }

        fn model(&self) -> &str {
            "fixture-model"
        }
    }

    fn build_index(
        dir: &std::path::Path,
        collection: &str,
        dims: usize,
        docs: &[(&str, Option<&str>, Vec<f32>)],
    ) {
        let _ = env_logger::builder().is_test(true).try_init();
        let conn = rusqlite::Connection::open(dir.join(STORE_FILE)).unwrap();
        conn.execute_batch(
            "CREATE TABLE collections (\
                 collection_id INTEGER PRIMARY KEY, \
                 name TEXT NOT NULL UNIQUE, \
                 embedding_model TEXT NOT NULL, \
                 dimensions INTEGER NOT NULL); \
             CREATE TABLE documents (\
                 doc_id TEXT PRIMARY KEY, \
                 collection_id INTEGER NOT NULL REFERENCES collections(collection_id), \
                 doc_text TEXT NOT NULL, \
                 metadata_json TEXT, \
                 embedding BLOB NOT NULL);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO collections (name, embedding_model, dimensions) VALUES (?1, ?2, ?3)",
            params![collection, "fixture-model", dims as i64],
        )
        .unwrap();
        for (i, (text, meta, vec)) in docs.iter().enumerate() {
            let blob: Vec<u8> = vec.iter().flat_map(|f| f.to_le_bytes()).collect();
            conn.execute(
                "INSERT INTO documents (doc_id, collection_id, doc_text, metadata_json, embedding) \
                 VALUES (?1, (SELECT collection_id FROM collections WHERE name = ?2), ?3, ?4, ?5)",
                params![format!("doc_{}", i), collection, text, meta, blob],
            )
            .unwrap();
        }
    }

    /// Three documents at distance 0, ~0.29, and 1 from the "congestion"
    /// query vector.
    async fn congestion_fixture(dir: &TempDir) -> (DocumentRetriever, Arc<FixtureEmbedder>) {
        build_index(
            dir.path(),
            "traffic_knowledge",
            4,
            &[
                (
                    "Main St is congested at rush hour",
                    Some(r#"{"road": "RD_1"}"#),
                    vec![1.0, 0.0, 0.0, 0.0],
                ),
                (
                    "Accident reported near Central Hospital",
                    None,
                    vec![1.0, 1.0, 0.0, 0.0],
                ),
                (
                    "Roadwork on the northern bypass",
                    Some("{broken json"),
                    vec![0.0, 1.0, 0.0, 0.0],
                ),
            ],
        );
        let embedder = Arc::new(FixtureEmbedder::new(&[(
            "congestion",
            vec![1.0, 0.0, 0.0, 0.0],
        )]));
        let retriever = DocumentRetriever::open(dir.path(), "traffic_knowledge", embedder.clone())
            .await
            .unwrap();
        (retriever, embedder)
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let (retriever, _) = congestion_fixture(&dir).await;

        let docs = retriever.retrieve("congestion", 3).await.unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].text, "Main St is congested at rush hour");
        assert!(docs[0].score.abs() < 1e-6);
        for pair in docs.windows(2) {
            assert!(pair[0].score <= pair[1].score, "scores must be non-decreasing");
        }
    }

    #[tokio::test]
    async fn test_retrieve_truncates_to_k() {
        let dir = TempDir::new().unwrap();
        let (retriever, _) = congestion_fixture(&dir).await;
        let docs = retriever.retrieve("congestion", 2).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_k_exceeding_collection_returns_all() {
        let dir = TempDir::new().unwrap();
        let (retriever, _) = congestion_fixture(&dir).await;
        let docs = retriever.retrieve("congestion", 50).await.unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let (retriever, embedder) = congestion_fixture(&dir).await;

        assert!(retriever.retrieve("", 3).await.unwrap().is_empty());
        assert!(retriever.retrieve("   \t\n", 3).await.unwrap().is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let dir = TempDir::new().unwrap();
        let (retriever, _) = congestion_fixture(&dir).await;
        let err = retriever.retrieve("congestion", 0).await.unwrap_err();
        assert!(matches!(err, TrafficRagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_metadata_decoding() {
        let dir = TempDir::new().unwrap();
        let (retriever, _) = congestion_fixture(&dir).await;

        let docs = retriever.retrieve("congestion", 3).await.unwrap();
        assert_eq!(docs[0].metadata["road"], "RD_1");
        // Absent and malformed metadata both come back as an empty object.
        assert_eq!(docs[1].metadata, Value::Object(Map::new()));
        assert_eq!(docs[2].metadata, Value::Object(Map::new()));
    }

    #[tokio::test]
    async fn test_missing_index_is_fatal() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(FixtureEmbedder::new(&[]));
        let err = DocumentRetriever::open(dir.path(), "traffic_knowledge", embedder)
            .await
            .unwrap_err();
        assert!(matches!(err, TrafficRagError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_unknown_collection_is_fatal() {
        let dir = TempDir::new().unwrap();
        build_index(dir.path(), "traffic_knowledge", 4, &[]);
        let embedder = Arc::new(FixtureEmbedder::new(&[]));
        let err = DocumentRetriever::open(dir.path(), "other_collection", embedder)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("other_collection"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        build_index(dir.path(), "traffic_knowledge", 4, &[]);
        // Embedder produces 3-dimensional vectors against a 4-dim collection.
        let embedder = Arc::new(FixtureEmbedder::new(&[("q", vec![1.0, 0.0, 0.0])]));
        let retriever = DocumentRetriever::open(dir.path(), "traffic_knowledge", embedder)
            .await
            .unwrap();
        let err = retriever.retrieve("q", 3).await.unwrap_err();
        assert!(matches!(err, TrafficRagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_corrupt_embedding_rows_skipped() {
        let dir = TempDir::new().unwrap();
        build_index(
            dir.path(),
            "traffic_knowledge",
            4,
            &[("good doc", None, vec![1.0, 0.0, 0.0, 0.0])],
        );
        // Append a row whose blob is not a valid f32 array.
        let conn = rusqlite::Connection::open(dir.path().join(STORE_FILE)).unwrap();
        conn.execute(
            "INSERT INTO documents (doc_id, collection_id, doc_text, metadata_json, embedding) \
             VALUES ('bad', 1, 'bad doc', NULL, ?1)",
            params![vec![1u8, 2, 3]],
        )
        .unwrap();

        let embedder = Arc::new(FixtureEmbedder::new(&[("q", vec![1.0, 0.0, 0.0, 0.0])]));
        let retriever = DocumentRetriever::open(dir.path(), "traffic_knowledge", embedder)
            .await
            .unwrap();
        let docs = retriever.retrieve("q", 5).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "good doc");
    }

    #[tokio::test]
    async fn test_cache_short_circuits_embedder() {
        let dir = TempDir::new().unwrap();
        let (retriever, embedder) = congestion_fixture(&dir).await;
        let retriever = retriever.with_cache(Arc::new(EmbeddingCache::new(16)));

        retriever.retrieve("congestion", 3).await.unwrap();
        retriever.retrieve("congestion", 3).await.unwrap();
        assert_eq!(embedder.call_count(), 1);
    }
}
