use std::collections::HashMap;

use wforce_domain::LoginEvent;

/// Outcome of an `allow` call, per spec.md §4.4.
///
/// `status < 0` rejects, `status == 0` allows, `status > 0` tarpits
/// (the value is a hint, typically delay seconds).
#[derive(Debug, Clone)]
pub struct AllowVerdict {
    pub status: i32,
    pub user_message: String,
    pub log_message: String,
    pub attrs: HashMap<String, String>,
}

impl AllowVerdict {
    pub fn allow() -> Self {
        Self {
            status: 0,
            user_message: String::new(),
            log_message: String::new(),
            attrs: HashMap::new(),
        }
    }

    pub fn reject(user_message: impl Into<String>, log_message: impl Into<String>) -> Self {
        Self {
            status: -1,
            user_message: user_message.into(),
            log_message: log_message.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn tarpit(delay_secs: i32, user_message: impl Into<String>) -> Self {
        Self {
            status: delay_secs.max(1),
            user_message: user_message.into(),
            log_message: String::new(),
            attrs: HashMap::new(),
        }
    }
}

/// The user-supplied policy, as a trait-object seam. The policy
/// language itself is an external collaborator;
/// this crate only dispatches to whatever implementation is installed.
///
/// Each holder in the dispatch pool (§4.4) owns one instance and calls
/// its four hooks under the holder's own mutex, so an implementation
/// need not be internally thread-safe.
pub trait PolicyEngine: Send {
    fn allow(&mut self, event: &LoginEvent) -> AllowVerdict;

    fn report(&mut self, event: &LoginEvent);

    /// `reset(type, login, ip) -> bool`, per spec.md §4.4.
    fn reset(&mut self, reset_type: &str, login: &str, ip: &str) -> bool;

    /// Login canonicalisation hook, e.g. appending a
    /// default domain.
    fn canonicalize(&mut self, login: &str) -> String {
        login.to_string()
    }

    /// Named custom endpoint, dispatched by name. Returns `None` for
    /// an endpoint the policy doesn't implement.
    fn custom_endpoint(&mut self, _name: &str, _body: &serde_json::Value) -> Option<serde_json::Value> {
        None
    }

    /// Executes an admin-console command string against this instance
    /// and returns whatever it printed. The policy language itself is an
    /// external collaborator; this default just reports that the
    /// installed engine doesn't support REPL-style admin commands.
    fn admin_eval(&mut self, _command: &str) -> String {
        "admin commands not supported by this policy engine".to_string()
    }
}

/// Allows everything and canonicalises logins unchanged. This is the
/// default when no policy script is configured, and the implementation
/// used in tests.
#[derive(Debug, Default)]
pub struct NullPolicy;

impl PolicyEngine for NullPolicy {
    fn allow(&mut self, _event: &LoginEvent) -> AllowVerdict {
        AllowVerdict::allow()
    }

    fn report(&mut self, _event: &LoginEvent) {}

    fn reset(&mut self, _reset_type: &str, _login: &str, _ip: &str) -> bool {
        true
    }

    fn canonicalize(&mut self, login: &str) -> String {
        login.to_string()
    }
}
