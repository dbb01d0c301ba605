use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use wforce_domain::config::{WebHookConfig, WebHookEvent};

/// `{id, eventSet, configMap, success/failure counters, active flag}`,
/// per spec.md §3.1. Owned by a process-wide registry keyed by id or
/// name.
pub struct WebHook {
    pub id: String,
    pub name: Option<String>,
    pub events: Vec<WebHookEvent>,
    pub config: std::collections::HashMap<String, String>,
    pub active: AtomicBool,
    pub success_count: AtomicU64,
    pub failure_count: AtomicU64,
}

impl WebHook {
    pub fn from_config(cfg: &WebHookConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            name: cfg.name.clone(),
            events: cfg.events.clone(),
            config: cfg.config.clone(),
            active: AtomicBool::new(cfg.active),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn url(&self) -> Option<&str> {
        self.config.get("url").map(String::as_str)
    }

    pub fn secret(&self) -> Option<&str> {
        self.config.get("secret").map(String::as_str)
    }

    /// Substring filtering on the `allow_filter` config value, applied
    /// only to the `allow` event. Any
    /// combination of `"allow"`, `"reject"`, `"tarpit"` may appear as
    /// substrings of the configured value.
    pub fn allow_filter_matches(&self, status_word: &str) -> bool {
        match self.config.get("allow_filter") {
            Some(filter) => filter.contains(status_word),
            None => true,
        }
    }

    pub fn handles(&self, event: WebHookEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mandatory/optional config keys per event, resolved from the
/// original's `event_names` table (SPEC_FULL.md §5): every event
/// requires `url`; only `allow` additionally accepts `allow_filter`.
/// `secret` is optional for every event.
pub fn validate_config(cfg: &WebHookConfig) -> Result<(), String> {
    if !cfg.config.contains_key("url") {
        return Err(format!("webhook {}: missing required 'url' key", cfg.id));
    }
    for key in cfg.config.keys() {
        if key == "allow_filter" && !cfg.events.contains(&WebHookEvent::Allow) {
            return Err(format!(
                "webhook {}: 'allow_filter' is only meaningful for the 'allow' event",
                cfg.id
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(events: Vec<WebHookEvent>, extra: &[(&str, &str)]) -> WebHookConfig {
        let mut config: HashMap<String, String> = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config.entry("url".into()).or_insert_with(|| "http://example.test/hook".into());
        WebHookConfig {
            id: "h1".into(),
            name: None,
            events,
            config,
            active: true,
        }
    }

    #[test]
    fn missing_url_fails_validation() {
        let mut c = cfg(vec![WebHookEvent::Report], &[]);
        c.config.remove("url");
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn allow_filter_on_non_allow_event_fails() {
        let c = cfg(vec![WebHookEvent::Report], &[("allow_filter", "reject")]);
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn allow_filter_on_allow_event_passes() {
        let c = cfg(vec![WebHookEvent::Allow], &[("allow_filter", "reject,tarpit")]);
        assert!(validate_config(&c).is_ok());
    }
}
