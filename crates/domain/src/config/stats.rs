use serde::{Deserialize, Serialize};

/// Aggregator kind declared for a field at DB-construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Hll,
    CountMin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKind,
    /// HLL register-bit precision, 4..=30. Only meaningful for `Hll`.
    #[serde(default = "d_hll_precision")]
    pub hll_precision: u8,
    /// Count-Min sketch error bound. Only meaningful for `CountMin`.
    #[serde(default = "d_cm_eps")]
    pub cm_eps: f64,
    /// Count-Min sketch failure probability. Only meaningful for `CountMin`.
    #[serde(default = "d_cm_gamma")]
    pub cm_gamma: f64,
}

fn d_hll_precision() -> u8 {
    6
}
fn d_cm_eps() -> f64 {
    0.001
}
fn d_cm_gamma() -> f64 {
    0.01
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsDbConfig {
    pub name: String,
    #[serde(default = "d_num_windows")]
    pub num_windows: usize,
    #[serde(default = "d_window_size")]
    pub window_size_secs: u64,
    pub fields: Vec<FieldConfig>,
    #[serde(default = "d_soft_max")]
    pub soft_max: usize,
    #[serde(default = "d_expire_sleep_ms")]
    pub expire_sleep_ms: u64,
    #[serde(default)]
    pub v4_prefix_bits: Option<u8>,
    #[serde(default)]
    pub v6_prefix_bits: Option<u8>,
    #[serde(default)]
    pub replication_enabled: bool,
}

fn d_num_windows() -> usize {
    5
}
fn d_window_size() -> u64 {
    60
}
fn d_soft_max() -> usize {
    524_288
}
fn d_expire_sleep_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default)]
    pub dbs: Vec<StatsDbConfig>,
}
