use thiserror::Error;

/// Main error type for trafficrag
#[derive(Error, Debug)]
pub enum TrafficRagError {
    /// Graph description missing or malformed; no partial graph is usable
    #[error("Graph load error: {0}")]
    Load(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vector index database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Vector index unreachable or collection missing
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// LLM provider errors. Never escapes the public API: `LlmClient`
    /// converts these into sentinel strings.
    #[error("{0}")]
    Llm(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using TrafficRagError
pub type Result<T> = std::result::Result<T, TrafficRagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrafficRagError::Load("missing file".to_string());
        assert!(err.to_string().contains("Graph load error"));
        assert!(err.to_string().contains("missing file"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrafficRagError = io_err.into();
        assert!(matches!(err, TrafficRagError::Io(_)));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let db_err = rusqlite::Error::InvalidQuery;
        let err: TrafficRagError = db_err.into();
        assert!(matches!(err, TrafficRagError::Database(_)));
    }

    #[test]
    fn test_llm_error_display_is_bare() {
        // The LLM sentinel embeds this Display output; it must not carry a
        // prefix of its own.
        let err = TrafficRagError::Llm("connection reset".to_string());
        assert_eq!(err.to_string(), "connection reset");
    }
}
