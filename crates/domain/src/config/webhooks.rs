use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebHookEvent {
    Report,
    Allow,
    Reset,
    AddBl,
    DelBl,
    ExpireBl,
}

impl WebHookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebHookEvent::Report => "report",
            WebHookEvent::Allow => "allow",
            WebHookEvent::Reset => "reset",
            WebHookEvent::AddBl => "addbl",
            WebHookEvent::DelBl => "delbl",
            WebHookEvent::ExpireBl => "expirebl",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebHookConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub events: Vec<WebHookEvent>,
    /// Arbitrary config map; must contain `url`, may contain `secret`,
    /// `allow_filter`, and custom keys.
    pub config: HashMap<String, String>,
    #[serde(default = "d_true")]
    pub active: bool,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub hooks: Vec<WebHookConfig>,
    #[serde(default = "d_pool_threads")]
    pub pool_threads: usize,
    #[serde(default = "d_queue_size")]
    pub queue_size: usize,
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "d_max_hook_conns")]
    pub max_hook_conns: usize,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            hooks: Vec::new(),
            pool_threads: d_pool_threads(),
            queue_size: d_queue_size(),
            timeout_secs: d_timeout_secs(),
            max_hook_conns: d_max_hook_conns(),
        }
    }
}

fn d_pool_threads() -> usize {
    4
}
fn d_queue_size() -> usize {
    1000
}
fn d_timeout_secs() -> u64 {
    2
}
fn d_max_hook_conns() -> usize {
    10
}
