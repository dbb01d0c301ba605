use serde::{Deserialize, Serialize};

/// Control channel (C7) configuration: an encrypted framed TCP admin
/// console, per spec.md §4.7/§6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_listen")]
    pub listen: String,
    /// Base64-encoded 32-byte shared key. Anyone without it produces
    /// unreadable traffic; there is no separate authentication step.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "d_metrics_path")]
    pub metrics_path: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: d_listen(),
            key: None,
            metrics_path: d_metrics_path(),
        }
    }
}

fn d_listen() -> String {
    "127.0.0.1:8085".into()
}
fn d_metrics_path() -> String {
    "/metrics".into()
}
