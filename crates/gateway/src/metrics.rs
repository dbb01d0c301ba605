//! Prometheus-format metrics exposition (C7), per spec.md §4.7 and
//! SPEC_FULL.md §7: allow status, replication send/recv per sibling,
//! list updates, connection failures, list sizes, receive queue depth,
//! exposed as gauges and monotonic counters on a scrape path.
//!
//! Resolved from `original_source/wforce/wforce-prometheus.hh`/`.cc`:
//! text exposition, not a push model — the `prometheus` crate is the
//! direct Rust analogue (see DESIGN.md).

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use wforce_lists::ListsRegistry;
use wforce_replication::ReplicationTransport;

pub struct Metrics {
    registry: Registry,
    pub allow_status: IntCounterVec,
    pub command_total: IntCounterVec,
    pub list_updates: IntCounterVec,
    pub connection_failures: IntCounterVec,
    pub list_size: IntGaugeVec,
    pub recv_queue_depth: IntGauge,
    pub sibling_send_ok: IntGaugeVec,
    pub sibling_send_fail: IntGaugeVec,
    pub sibling_recv_ok: IntGaugeVec,
    pub sibling_recv_fail: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let allow_status = IntCounterVec::new(
            Opts::new("wforce_allow_status_total", "allow verdicts by status word"),
            &["status"],
        )
        .expect("valid metric");
        let command_total = IntCounterVec::new(
            Opts::new("wforce_command_total", "HTTP commands served"),
            &["command"],
        )
        .expect("valid metric");
        let list_updates = IntCounterVec::new(
            Opts::new("wforce_list_updates_total", "list add/delete/expire events"),
            &["store", "op"],
        )
        .expect("valid metric");
        let connection_failures = IntCounterVec::new(
            Opts::new("wforce_connection_failures_total", "rejected/failed connections"),
            &["kind"],
        )
        .expect("valid metric");
        let list_size = IntGaugeVec::new(
            Opts::new("wforce_list_size", "current entry count per store/key-space"),
            &["store", "space"],
        )
        .expect("valid metric");
        let recv_queue_depth =
            IntGauge::new("wforce_replication_recv_queue_depth", "replication receive queue depth")
                .expect("valid metric");
        let sibling_send_ok = IntGaugeVec::new(
            Opts::new("wforce_sibling_send_ok", "successful sends per sibling"),
            &["sibling"],
        )
        .expect("valid metric");
        let sibling_send_fail = IntGaugeVec::new(
            Opts::new("wforce_sibling_send_fail", "failed sends per sibling"),
            &["sibling"],
        )
        .expect("valid metric");
        let sibling_recv_ok = IntGaugeVec::new(
            Opts::new("wforce_sibling_recv_ok", "successful receives per sibling"),
            &["sibling"],
        )
        .expect("valid metric");
        let sibling_recv_fail = IntGaugeVec::new(
            Opts::new("wforce_sibling_recv_fail", "failed receives per sibling"),
            &["sibling"],
        )
        .expect("valid metric");

        registry.register(Box::new(allow_status.clone())).expect("register metric");
        registry.register(Box::new(command_total.clone())).expect("register metric");
        registry.register(Box::new(list_updates.clone())).expect("register metric");
        registry
            .register(Box::new(connection_failures.clone()))
            .expect("register metric");
        registry.register(Box::new(list_size.clone())).expect("register metric");
        registry.register(Box::new(recv_queue_depth.clone())).expect("register metric");
        registry.register(Box::new(sibling_send_ok.clone())).expect("register metric");
        registry.register(Box::new(sibling_send_fail.clone())).expect("register metric");
        registry.register(Box::new(sibling_recv_ok.clone())).expect("register metric");
        registry.register(Box::new(sibling_recv_fail.clone())).expect("register metric");

        Self {
            registry,
            allow_status,
            command_total,
            list_updates,
            connection_failures,
            list_size,
            recv_queue_depth,
            sibling_send_ok,
            sibling_send_fail,
            sibling_recv_ok,
            sibling_recv_fail,
        }
    }

    /// Refreshes the gauges that mirror live subsystem state (list
    /// sizes, replication queue depth, per-sibling counters) just
    /// before encoding — these aren't updated incrementally because
    /// their source of truth (the list stores, the sibling structs)
    /// already owns the canonical value.
    pub fn refresh(&self, lists: &ListsRegistry, replication: Option<&ReplicationTransport>) {
        self.list_size
            .with_label_values(&["bl", "ip"])
            .set(lists.denylist.get_ip_entries().len() as i64);
        self.list_size
            .with_label_values(&["bl", "login"])
            .set(lists.denylist.get_login_entries().len() as i64);
        self.list_size
            .with_label_values(&["bl", "ip_login"])
            .set(lists.denylist.get_ip_login_entries().len() as i64);
        self.list_size
            .with_label_values(&["wl", "ip"])
            .set(lists.allowlist.get_ip_entries().len() as i64);
        self.list_size
            .with_label_values(&["wl", "login"])
            .set(lists.allowlist.get_login_entries().len() as i64);
        self.list_size
            .with_label_values(&["wl", "ip_login"])
            .set(lists.allowlist.get_ip_login_entries().len() as i64);

        if let Some(repl) = replication {
            self.recv_queue_depth.set(
                repl.counters
                    .recv_queue_depth
                    .load(std::sync::atomic::Ordering::Relaxed) as i64,
            );
            for sibling in &repl.siblings {
                use std::sync::atomic::Ordering;
                self.sibling_send_ok
                    .with_label_values(&[&sibling.address])
                    .set(sibling.counters.send_ok.load(Ordering::Relaxed) as i64);
                self.sibling_send_fail
                    .with_label_values(&[&sibling.address])
                    .set(sibling.counters.send_fail.load(Ordering::Relaxed) as i64);
                self.sibling_recv_ok
                    .with_label_values(&[&sibling.address])
                    .set(sibling.counters.recv_ok.load(Ordering::Relaxed) as i64);
                self.sibling_recv_fail
                    .with_label_values(&[&sibling.address])
                    .set(sibling.counters.recv_fail.load(Ordering::Relaxed) as i64);
            }
        }
    }

    pub fn encode(&self, lists: &ListsRegistry, replication: Option<&ReplicationTransport>) -> String {
        self.refresh(lists, replication);
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

