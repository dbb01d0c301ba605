use serde::{Deserialize, Serialize};

/// Per-store return-message overrides, carried from the original's
/// `setIPRetMsg`/`setLoginRetMsg`/`setIPLoginRetMsg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetMessages {
    #[serde(default = "d_ip_msg")]
    pub ip: String,
    #[serde(default = "d_login_msg")]
    pub login: String,
    #[serde(default = "d_iplogin_msg")]
    pub ip_login: String,
}

impl RetMessages {
    fn denylist_default() -> Self {
        Self {
            ip: d_ip_msg(),
            login: d_login_msg(),
            ip_login: d_iplogin_msg(),
        }
    }

    fn allowlist_default() -> Self {
        Self {
            ip: "Allowlisted IP Address".into(),
            login: "Allowlisted Login".into(),
            ip_login: "Allowlisted IP-Login pair".into(),
        }
    }
}

fn d_ip_msg() -> String {
    "Temporarily blacklisted IP Address - try again later".into()
}
fn d_login_msg() -> String {
    "Temporarily blacklisted Login - try again later".into()
}
fn d_iplogin_msg() -> String {
    "Temporarily blacklisted IP-Login pair - try again later".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    pub host: String,
    pub port: u16,
    /// Key prefix, e.g. `wfbl` or `wfwl`.
    pub key_prefix: String,
    /// Whether mutations applied via replication are also persisted
    ///.
    #[serde(default)]
    pub persist_replicated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListStoreConfig {
    #[serde(default)]
    pub ret_messages: RetMessages,
    #[serde(default)]
    pub persist: Option<PersistConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListsConfig {
    #[serde(default = "ListStoreConfig::denylist")]
    pub denylist: ListStoreConfig,
    #[serde(default = "ListStoreConfig::allowlist")]
    pub allowlist: ListStoreConfig,
}

impl ListStoreConfig {
    fn denylist() -> Self {
        Self {
            ret_messages: RetMessages::denylist_default(),
            persist: None,
        }
    }

    fn allowlist() -> Self {
        Self {
            ret_messages: RetMessages::allowlist_default(),
            persist: None,
        }
    }
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            denylist: ListStoreConfig::denylist(),
            allowlist: ListStoreConfig::allowlist(),
        }
    }
}

impl Default for RetMessages {
    fn default() -> Self {
        RetMessages::denylist_default()
    }
}
