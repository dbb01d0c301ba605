use serde::{Deserialize, Serialize};

/// Policy-dispatch pool configuration (C4). The policy language itself
/// is an external collaborator; this only sizes
/// the pool of trait-object holders that would dispatch to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_num_instances")]
    pub num_instances: usize,
    /// Path to a policy script. Absent (the default) selects the
    /// built-in allow-everything `NullPolicy`.
    #[serde(default)]
    pub script_path: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            num_instances: d_num_instances(),
            script_path: None,
        }
    }
}

fn d_num_instances() -> usize {
    6
}
