mod admin;
mod lists;
mod policy;
mod replication;
mod server;
mod stats;
mod webhooks;

pub use admin::*;
pub use lists::*;
pub use policy::*;
pub use replication::*;
pub use server::*;
pub use stats::*;
pub use webhooks::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub lists: ListsConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Validates cross-field invariants that `serde` defaults alone
    /// can't express. Mirrors the original's "surfaced to configurer
    /// via return value + log; process continues" error kind
    ///.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for db in &self.stats.dbs {
            if db.num_windows == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("stats.dbs[{}].num_windows", db.name),
                    message: "num_windows must be >= 1".into(),
                });
            }
            if db.window_size_secs == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("stats.dbs[{}].window_size_secs", db.name),
                    message: "window_size_secs must be >= 1".into(),
                });
            }
            for f in &db.fields {
                if matches!(f.kind, FieldKind::Hll) && !(4..=30).contains(&f.hll_precision) {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("stats.dbs[{}].fields[{}].hll_precision", db.name, f.name),
                        message: "hll_precision must be in 4..=30".into(),
                    });
                }
            }
        }

        if self.replication.enabled {
            let mut seen = std::collections::HashSet::new();
            for s in &self.replication.siblings {
                if !seen.insert(s.address.clone()) {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Warning,
                        field: "replication.siblings".into(),
                        message: format!(
                            "duplicate sibling address {} silently de-duplicated",
                            s.address
                        ),
                    });
                }
            }
            if self.replication.key.is_none()
                && self.replication.siblings.iter().all(|s| s.key.is_none())
            {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: "replication.key".into(),
                    message: "replication enabled with no key configured; messages will use an all-zero key".into(),
                });
            }
        }

        for hook in &self.webhooks.hooks {
            if !hook.config.contains_key("url") {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("webhooks.hooks[{}].config", hook.id),
                    message: "missing required 'url' key".into(),
                });
            }
        }

        if self.admin.enabled && self.admin.key.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "admin.key".into(),
                message: "control channel enabled with no key; traffic will be unauthenticated"
                    .into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn bad_window_size_flags_error() {
        let mut cfg = Config::default();
        cfg.stats.dbs.push(StatsDbConfig {
            name: "test".into(),
            num_windows: 0,
            window_size_secs: 0,
            fields: vec![],
            soft_max: 10,
            expire_sleep_ms: 250,
            v4_prefix_bits: None,
            v6_prefix_bits: None,
            replication_enabled: false,
        });
        let issues = cfg.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Error));
    }
}
