/// Shared error type used across all wforce crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("authentication failure")]
    Auth,

    #[error("policy error: {0}")]
    Policy(String),

    #[error("network: {0}")]
    Network(String),

    #[error("persistent store unavailable: {0}")]
    PersistUnavailable(String),

    #[error("replication decryption failure")]
    Decrypt,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
