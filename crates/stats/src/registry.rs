use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use wforce_domain::config::StatsConfig;
use wforce_domain::ReplicationMessage;

use crate::db::WindowedStatsDB;

/// Named collection of `WindowedStatsDB`s, one process-wide registry
/// built from config at startup.
pub struct StatsRegistry {
    dbs: HashMap<String, Arc<WindowedStatsDB>>,
}

impl StatsRegistry {
    pub fn new(cfg: &StatsConfig) -> Self {
        let dbs = cfg
            .dbs
            .iter()
            .map(|db_cfg| (db_cfg.name.clone(), Arc::new(WindowedStatsDB::new(db_cfg))))
            .collect();
        Self { dbs }
    }

    pub fn get(&self, name: &str) -> Option<Arc<WindowedStatsDB>> {
        self.dbs.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.dbs.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<WindowedStatsDB>)> {
        self.dbs.iter()
    }

    /// Wires every DB's replication hook to the shared outbound
    /// channel and spawns its expire loop.
    pub fn enable_replication_all(&self, tx: UnboundedSender<ReplicationMessage>) {
        for db in self.dbs.values() {
            db.enable_replication(Some(tx.clone()));
        }
    }

    pub fn spawn_expire_loops(&self) {
        for db in self.dbs.values() {
            let db = db.clone();
            tokio::spawn(db.run_expire_loop());
        }
    }

    /// Applies an incoming replicated message without re-emitting it
    ///.
    pub fn apply_replicated(&self, msg: &ReplicationMessage) {
        match msg {
            ReplicationMessage::StatsDbUpdate {
                db_name,
                key,
                field,
                op,
                int_value,
                string_value,
            } => {
                let Some(db) = self.get(db_name) else {
                    return;
                };
                use wforce_domain::StatsOp::*;
                match op {
                    AddInt => {
                        db.add_replicated(key, field, int_value.unwrap_or(0), false);
                    }
                    SubInt => {
                        db.add_replicated(key, field, -int_value.unwrap_or(0), false);
                    }
                    AddString | AddStringInt => {
                        if let Some(s) = string_value {
                            db.add_string_replicated(
                                key,
                                field,
                                s,
                                int_value.unwrap_or(1).max(1) as u32,
                                false,
                            );
                        }
                    }
                    SubString => {}
                    Reset => db.reset_replicated(key, false),
                    ResetField => db.reset_field_replicated(key, field, false),
                }
            }
            ReplicationMessage::StatsDbFullDump {
                db_name,
                key,
                fields,
                ..
            } => {
                if let Some(db) = self.get(db_name) {
                    db.restore_entry(key, fields);
                }
            }
            _ => {}
        }
    }
}
