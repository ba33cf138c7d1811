use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key `{0}`")]
    InvalidKey(String),
    #[error("cache entry `{key}` is not valid JSON")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize cache entry `{key}`")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache storage failed for `{key}`")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}
