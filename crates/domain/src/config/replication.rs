use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Datagram,
    Stream,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingConfig {
    pub address: String,
    #[serde(default = "d_transport")]
    pub transport: Transport,
    /// Per-sibling encryption key override, base64-encoded 32 bytes.
    /// Falls back to the replication-wide key when absent.
    #[serde(default)]
    pub key: Option<String>,
}

fn d_transport() -> Transport {
    Transport::Datagram
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base64-encoded 32-byte shared key used when a sibling has no
    /// per-sibling override.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub listen_datagram: Option<String>,
    #[serde(default)]
    pub listen_stream: Option<String>,
    #[serde(default)]
    pub siblings: Vec<SiblingConfig>,
    #[serde(default = "d_num_sibling_threads")]
    pub num_sibling_threads: usize,
    #[serde(default = "d_max_sibling_queue_size")]
    pub max_sibling_queue_size: usize,
    #[serde(default = "d_recv_queue_size")]
    pub recv_queue_size: usize,
    #[serde(default = "d_min_sync_host_uptime")]
    pub min_sync_host_uptime_secs: u64,
    #[serde(default = "d_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: None,
            listen_datagram: None,
            listen_stream: None,
            siblings: Vec::new(),
            num_sibling_threads: d_num_sibling_threads(),
            max_sibling_queue_size: d_max_sibling_queue_size(),
            recv_queue_size: d_recv_queue_size(),
            min_sync_host_uptime_secs: d_min_sync_host_uptime(),
            connect_timeout_secs: d_connect_timeout(),
        }
    }
}

fn d_num_sibling_threads() -> usize {
    2
}
fn d_max_sibling_queue_size() -> usize {
    5000
}
fn d_recv_queue_size() -> usize {
    5000
}
fn d_min_sync_host_uptime() -> u64 {
    10
}
fn d_connect_timeout() -> u64 {
    5
}
