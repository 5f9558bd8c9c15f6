use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The record's `type` tag is not the one expected.
    #[error("unexpected record type: {0:?}")]
    UnexpectedType(Option<String>),

    /// The record declares a schema this decoder does not know.
    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u64),

    /// A field is missing or has the wrong shape.
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
