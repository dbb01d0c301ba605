use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Parsed device attributes, either supplied by the caller or derived
/// from `device_id` by an external device-parser collaborator (out of
/// scope here; carried as an opaque passthrough map).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A single- or multi-valued free-form attribute, as submitted in the
/// `attrs` map of a `LoginEvent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttrValue {
    Single(String),
    Multi(Vec<String>),
}

/// Immutable snapshot of one login attempt, as decoded from the
/// `allow`/`report` request body. Created on ingress, dropped when the
/// worker that handled it returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub login: String,
    #[serde(default)]
    pub pwhash: String,
    pub remote: IpAddr,
    /// Epoch seconds, possibly fractional. Filled by the server if the
    /// caller omits it.
    #[serde(default)]
    pub t: Option<f64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub policy_reject: bool,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default, rename = "device_id")]
    pub device_id: String,
    #[serde(default)]
    pub device_attrs: Option<DeviceAttrs>,
    #[serde(default)]
    pub attrs: HashMap<String, AttrValue>,

    /// Canonicalised login, filled in by the worker after the policy's
    /// `canonicalize` hook runs. Not part of the wire format.
    #[serde(skip)]
    pub canon_login: String,
}

impl LoginEvent {
    /// Timestamp to use for windowed-stats bucketing: the caller's `t`
    /// if present, otherwise "now".
    pub fn effective_time(&self) -> f64 {
        self.t.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)
        })
    }

    /// `<ip>:<login>` key after both parts are canonicalised, per
    /// spec.md §3.2.
    pub fn ip_login_key(&self) -> String {
        format!("{}:{}", canonical_ip(self.remote), self.canon_login)
    }
}

/// Flattens a v4-mapped-in-v6 address down to its v4 textual form, per
/// spec.md §3.2's IP-key canonicalisation rule.
pub fn canonical_ip(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_mapped_v6_flattens() {
        let addr: IpAddr = "::ffff:203.0.113.7".parse().unwrap();
        assert_eq!(canonical_ip(addr), "203.0.113.7");
    }

    #[test]
    fn plain_v4_roundtrips() {
        let addr: IpAddr = "203.0.113.7".parse().unwrap();
        assert_eq!(canonical_ip(addr), "203.0.113.7");
    }
}
