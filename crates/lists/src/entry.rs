use serde::{Deserialize, Serialize};

/// `{key, reason, expirationTimestamp}`, per spec.md §3.1. `key` is
/// already the canonical string form by the time it reaches a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListEntry {
    pub key: String,
    pub reason: String,
    pub expiration_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySpace {
    Ip,
    Login,
    IpLogin,
}
