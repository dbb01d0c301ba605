use serde::{Deserialize, Serialize};

/// HTTP API and worker-pool configuration (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// HTTP Basic password. Username is ignored; the password is
    /// compared byte-for-byte.
    #[serde(default)]
    pub password: String,
    /// Idle read timeout for an accepted connection, in seconds.
    #[serde(default = "d_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Worker-pool size for the HTTP command dispatch.
    #[serde(default = "d_num_workers")]
    pub num_workers: usize,
    /// Bounded queue depth in front of the worker pool.
    #[serde(default = "d_worker_queue_size")]
    pub worker_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            password: String::new(),
            idle_timeout_secs: d_idle_timeout(),
            num_workers: d_num_workers(),
            worker_queue_size: d_worker_queue_size(),
        }
    }
}

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8084
}
fn d_idle_timeout() -> u64 {
    5
}
fn d_num_workers() -> usize {
    8
}
fn d_worker_queue_size() -> usize {
    1000
}
