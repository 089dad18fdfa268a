//! Read-only access to the persistent vector index.
//!
//! The index is a SQLite file produced by an external ingestion process:
//! a `collections` table naming each collection with the embedding model and
//! dimensionality it was built with, and a `documents` table holding the
//! original text, optional JSON metadata, and the embedding as a
//! little-endian f32 BLOB. This handle never writes.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tokio::task;

use crate::error::{Result, TrafficRagError};

/// File name of the SQLite store inside an index directory.
pub const STORE_FILE: &str = "store.db";

/// One raw hit from the index, before metadata decoding.
#[derive(Debug)]
pub struct IndexHit {
    pub text: String,
    pub metadata_json: Option<String>,
    /// Cosine distance to the query vector (lower = closer).
    pub distance: f32,
}

/// Handle to one collection inside a persistent vector index.
#[derive(Debug)]
pub struct VectorIndex {
    db_path: PathBuf,
    collection_id: i64,
    collection: String,
    embedding_model: String,
    dimensions: usize,
}

impl VectorIndex {
    /// Open a named collection inside an existing index directory.
    ///
    /// Fails with `Retrieval` if the store file is missing or the collection
    /// does not exist. The collection must already be populated; this crate
    /// is a pure consumer of the index.
    pub async fn open<P: AsRef<Path>>(index_path: P, collection: &str) -> Result<Self> {
        let db_path = index_path.as_ref().join(STORE_FILE);
        if !db_path.exists() {
            return Err(TrafficRagError::Retrieval(format!(
                "vector index not found at {}",
                db_path.display()
            )));
        }

        let name = collection.to_string();
        let lookup_path = db_path.clone();
        let lookup_name = name.clone();
        let (collection_id, embedding_model, dimensions) = task::spawn_blocking(move || {
            let conn = open_read_only(&lookup_path)?;
            conn.query_row(
                "SELECT collection_id, embedding_model, dimensions \
                 FROM collections WHERE name = ?1",
                [&lookup_name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => TrafficRagError::Retrieval(format!(
                    "collection {:?} does not exist in the index",
                    lookup_name
                )),
                other => TrafficRagError::Database(other),
            })
        })
        .await
        .map_err(|e| TrafficRagError::Retrieval(format!("index open task failed: {}", e)))??;

        if dimensions <= 0 {
            return Err(TrafficRagError::Retrieval(format!(
                "collection {:?} records a non-positive dimensionality ({})",
                name, dimensions
            )));
        }

        log::debug!(
            "opened vector index collection {:?} (model {}, {} dims)",
            name,
            embedding_model,
            dimensions
        );

        Ok(Self {
            db_path,
            collection_id,
            collection: name,
            embedding_model,
            dimensions: dimensions as usize,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Model name recorded when the collection was populated. Informational:
    /// queries are only compatible when embedded with this model.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-k stored vectors nearest to `query_vec`, closest first.
    ///
    /// Full scan over the collection, scored by cosine distance in memory —
    /// collections are expected to hold hundreds of documents, not millions.
    /// Rows whose stored embedding is corrupt or of a different
    /// dimensionality are skipped.
    pub async fn nearest(&self, query_vec: Vec<f32>, k: usize) -> Result<Vec<IndexHit>> {
        let collection_id = self.collection_id;
        let rows = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doc_text, metadata_json, embedding \
                     FROM documents WHERE collection_id = ?1",
                )?;
                let mut rows = stmt.query([collection_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ));
                }
                Ok(out)
            })
            .await?;

        let mut scored: Vec<IndexHit> = rows
            .into_iter()
            .filter_map(|(text, metadata_json, blob)| {
                let embedding = decode_embedding(&blob)?;
                if embedding.len() != query_vec.len() {
                    return None;
                }
                Some(IndexHit {
                    text,
                    metadata_json,
                    distance: 1.0 - cosine_similarity(&query_vec, &embedding),
                })
            })
            .collect();

        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Run a closure against a read-only connection on the blocking pool.
    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.db_path.clone();
        task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| TrafficRagError::Retrieval(format!("index query task failed: {}", e)))?
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Decode a little-endian f32 BLOB; None when the length is not a multiple
/// of four bytes.
fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Cosine similarity between two equal-length vectors; 0.0 when either has
/// zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_magnitude_independent() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![2.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_decode_embedding_roundtrip() {
        let floats = vec![1.0f32, -2.5, 3.25];
        let blob: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
        assert_eq!(decode_embedding(&blob), Some(floats));
    }

    #[test]
    fn test_decode_embedding_bad_length() {
        assert!(decode_embedding(&[0u8, 1, 2, 3, 4]).is_none());
    }

    #[test]
    fn test_decode_embedding_empty() {
        assert_eq!(decode_embedding(&[]), Some(Vec::new()));
    }
}
