pub mod entry;
pub mod persist;
pub mod store;

pub use entry::{KeySpace, ListEntry};
pub use persist::{HttpKvPersist, InMemoryPersist, PersistBackend};
pub use store::{ListKeyArg, ListStore};

use std::sync::Arc;

use wforce_domain::config::ListsConfig;
use wforce_domain::ListStoreKind;

/// Owns both independent stores.
pub struct ListsRegistry {
    pub denylist: Arc<ListStore>,
    pub allowlist: Arc<ListStore>,
}

impl ListsRegistry {
    pub fn new(cfg: &ListsConfig) -> Self {
        Self {
            denylist: Arc::new(ListStore::new(ListStoreKind::Bl, &cfg.denylist)),
            allowlist: Arc::new(ListStore::new(ListStoreKind::Wl, &cfg.allowlist)),
        }
    }

    pub fn spawn_expire_loops(&self) {
        tokio::spawn(self.denylist.clone().run_expire_loop());
        tokio::spawn(self.allowlist.clone().run_expire_loop());
    }
}
