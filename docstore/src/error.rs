use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocStoreError {
    #[error("Not connected to the document store")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to rebuild index '{index}': {source}")]
    IndexRebuildFailed {
        index: String,
        #[source]
        source: Box<DocStoreError>,
    },

    #[error("Failed to decode document at '{key}': {source}")]
    DecodeFailed {
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to encode document: {0}")]
    Encode(#[source] CodecError),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures of the underlying connection, surfaced to callers unmodified.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error reply sent by the store itself.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Connection closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Converter '{converter}' failed on '{field}': {message}")]
    Converter {
        converter: String,
        field: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DocStoreError>;
