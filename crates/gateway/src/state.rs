//! Shared application state passed to every HTTP handler (C6), per
//! spec.md §5 "shared resources": one `Arc` per subsystem, cloned
//! cheaply into each request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use wforce_domain::config::Config;
use wforce_lists::ListsRegistry;
use wforce_policy::PolicyDispatcher;
use wforce_replication::ReplicationTransport;
use wforce_stats::StatsRegistry;
use wforce_webhooks::WebhookRunner;

use crate::metrics::Metrics;
use crate::worker::WorkerPool;

/// Process-wide counters surfaced by `?command=stats`.
#[derive(Default)]
pub struct ServerCounters {
    pub reports: AtomicU64,
    pub allows: AtomicU64,
    pub denieds: AtomicU64,
}

/// Flips from `warmup` to `ok` once a bulk sync (if requested at
/// startup) completes.
#[derive(Default)]
pub struct Readiness {
    ready: std::sync::atomic::AtomicBool,
}

impl Readiness {
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stats: Arc<StatsRegistry>,
    pub lists: Arc<ListsRegistry>,
    pub policy: Arc<PolicyDispatcher>,
    pub webhooks: Arc<WebhookRunner>,
    pub replication: Option<Arc<ReplicationTransport>>,
    pub workers: Arc<WorkerPool>,
    pub metrics: Arc<Metrics>,
    pub counters: Arc<ServerCounters>,
    pub readiness: Arc<Readiness>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
