use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid graph document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed graph document: {0}")]
    Malformed(String),

    #[error("Relationship {relationship} references unknown node {node}")]
    UnknownEndpoint { relationship: String, node: String },

    #[error("Unsupported node labels {0:?}")]
    UnsupportedLabel(Vec<String>),

    #[error("Unsupported relationship type `{0}`")]
    UnsupportedRelationship(String),
}

impl From<rusqlite::Error> for CodecError {
    fn from(e: rusqlite::Error) -> Self {
        CodecError::Store(StoreError::Sqlite(e))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-domain failures. None of these abort the analysis of other domains.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("could not resolve {0}")]
    Resolution(String),

    #[error("hop discovery for {domain} failed: {source}")]
    Discovery {
        domain: String,
        #[source]
        source: hopmap_scanner::ScanError,
    },

    #[error("failed to store path for {domain}: {source}")]
    Commit {
        domain: String,
        #[source]
        source: StoreError,
    },
}
