use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use wforce_domain::config::{FieldConfig, FieldKind, StatsDbConfig};
use wforce_domain::{DumpSlot, ReplicationMessage, StatsOp};

use crate::aggregator::{Slot, StatsAggregator};

#[derive(Debug, Clone)]
struct FieldSpec {
    kind: FieldKind,
    hll_precision: u8,
    cm_eps: f64,
    cm_gamma: f64,
}

impl From<&FieldConfig> for FieldSpec {
    fn from(f: &FieldConfig) -> Self {
        Self {
            kind: f.kind,
            hll_precision: f.hll_precision,
            cm_eps: f.cm_eps,
            cm_gamma: f.cm_gamma,
        }
    }
}

struct Record {
    /// One ring of `num_windows` slots per field.
    fields: HashMap<String, Vec<Slot>>,
    last_sweep: u64,
}

struct Inner {
    records: HashMap<String, Record>,
    /// Least-recently-modified key tracker: exactly one node per live
    /// key, moved to the tail in O(1) on every touch.
    lrm: Lrm,
}

/// One node of the intrusive LRM list.
struct LrmNode {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked list of keys ordered by recency of modification,
/// realised over a slab so a touch can relocate a key's existing node
/// to the tail in O(1) instead of appending a fresh copy — mirroring
/// the original's `key_tracker.splice(key_tracker.end(), key_tracker, kt)`
/// (single node per key, moved, never duplicated).
#[derive(Default)]
struct Lrm {
    nodes: Vec<Option<LrmNode>>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    free: Vec<usize>,
}

impl Lrm {
    fn new() -> Self {
        Self::default()
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("node present");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        {
            let node = self.nodes[idx].as_mut().expect("node present");
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.nodes[t].as_mut().unwrap().next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Moves `key`'s node to the tail, allocating one if it has none.
    fn touch(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            self.unlink(idx);
            self.link_tail(idx);
            return;
        }
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(LrmNode { key: key.to_string(), prev: None, next: None });
                idx
            }
            None => {
                self.nodes.push(Some(LrmNode { key: key.to_string(), prev: None, next: None }));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key.to_string(), idx);
        self.link_tail(idx);
    }

    /// Removes and returns the least-recently-modified key, if any.
    fn pop_front(&mut self) -> Option<String> {
        let idx = self.head?;
        let key = self.nodes[idx].as_ref().unwrap().key.clone();
        self.unlink(idx);
        self.index.remove(&key);
        self.nodes[idx] = None;
        self.free.push(idx);
        Some(key)
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-key, per-field, multi-window counters and sketches (C1), per
/// spec.md §3.1/§4.1.
pub struct WindowedStatsDB {
    name: String,
    start_time: u64,
    num_windows: usize,
    window_size: u64,
    fields: HashMap<String, FieldSpec>,
    inner: Mutex<Inner>,
    soft_max: AtomicUsize,
    expire_sleep_ms: AtomicU64,
    v4_prefix: AtomicU64,
    v6_prefix: AtomicU64,
    replicate: AtomicBool,
    repl_tx: Mutex<Option<UnboundedSender<ReplicationMessage>>>,
}

/// 0 is used as "no prefix configured" sentinel; valid prefix bits are 1..=32/128.
const NO_PREFIX: u64 = 0;

impl WindowedStatsDB {
    pub fn new(cfg: &StatsDbConfig) -> Self {
        let mut fields = HashMap::new();
        for f in &cfg.fields {
            fields.insert(f.name.clone(), FieldSpec::from(f));
        }
        Self {
            name: cfg.name.clone(),
            start_time: now_secs(),
            num_windows: cfg.num_windows.max(1),
            window_size: cfg.window_size_secs.max(1),
            fields,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                lrm: Lrm::new(),
            }),
            soft_max: AtomicUsize::new(cfg.soft_max),
            expire_sleep_ms: AtomicU64::new(cfg.expire_sleep_ms),
            v4_prefix: AtomicU64::new(cfg.v4_prefix_bits.map(|b| b as u64).unwrap_or(NO_PREFIX)),
            v6_prefix: AtomicU64::new(cfg.v6_prefix_bits.map(|b| b as u64).unwrap_or(NO_PREFIX)),
            replicate: AtomicBool::new(cfg.replication_enabled),
            repl_tx: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    // ── key canonicalisation ────────────────────────────────────────

    fn canon_key(&self, key: &str) -> String {
        if let Ok(addr) = key.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(v4) => {
                    let bits = self.v4_prefix.load(Ordering::Relaxed);
                    if bits != NO_PREFIX {
                        if let Ok(net) = ipnet::Ipv4Net::new(v4, bits as u8) {
                            return net.network().to_string();
                        }
                    }
                }
                IpAddr::V6(v6) => {
                    let bits = self.v6_prefix.load(Ordering::Relaxed);
                    if bits != NO_PREFIX {
                        if let Ok(net) = ipnet::Ipv6Net::new(v6, bits as u8) {
                            return net.network().to_string();
                        }
                    }
                }
            }
        }
        key.to_string()
    }

    pub fn set_v4_prefix(&self, bits: u8) {
        self.v4_prefix.store(bits as u64, Ordering::Relaxed);
    }

    pub fn set_v6_prefix(&self, bits: u8) {
        self.v6_prefix.store(bits as u64, Ordering::Relaxed);
    }

    pub fn set_max_size(&self, n: usize) {
        self.soft_max.store(n, Ordering::Relaxed);
    }

    pub fn enable_replication(&self, tx: Option<UnboundedSender<ReplicationMessage>>) {
        *self.repl_tx.lock() = tx;
        self.replicate.store(true, Ordering::Relaxed);
    }

    fn emit(&self, msg: ReplicationMessage) {
        if !self.replicate.load(Ordering::Relaxed) {
            return;
        }
        if let Some(tx) = self.repl_tx.lock().as_ref() {
            let _ = tx.send(msg);
        }
    }

    // ── ring helpers ─────────────────────────────────────────────────

    fn current_slot_index(&self, now: u64) -> usize {
        (((now.saturating_sub(self.start_time)) / self.window_size) as usize) % self.num_windows
    }

    fn ring_span(&self) -> u64 {
        self.window_size * self.num_windows as u64
    }

    fn sweep(&self, rec: &mut Record, now: u64) {
        if now.saturating_sub(rec.last_sweep) < self.window_size {
            return;
        }
        let span = self.ring_span();
        for slots in rec.fields.values_mut() {
            for slot in slots.iter_mut() {
                if slot.first_write != 0 && now.saturating_sub(slot.first_write) >= span {
                    slot.erase();
                }
            }
        }
        rec.last_sweep = now;
    }

    fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).map(|f| f.kind)
    }

    fn new_slot(&self, field: &str) -> Option<Slot> {
        let spec = self.fields.get(field)?;
        Some(Slot::empty(spec.kind, spec.hll_precision, spec.cm_eps, spec.cm_gamma))
    }

    fn touch_lrm(&self, inner: &mut Inner, key: &str) {
        inner.lrm.touch(key);
    }

    fn with_record_mut<R>(
        &self,
        key: &str,
        field: &str,
        now: u64,
        f: impl FnOnce(&mut Slot) -> R,
    ) -> Option<R> {
        if !self.fields.contains_key(field) {
            tracing::warn!(db = %self.name, field, "unknown field name");
            return None;
        }
        let canon = self.canon_key(key);
        let mut inner = self.inner.lock();
        let rec = inner
            .records
            .entry(canon.clone())
            .or_insert_with(|| Record {
                fields: HashMap::new(),
                last_sweep: now,
            });
        self.sweep(rec, now);
        let slots = rec
            .fields
            .entry(field.to_string())
            .or_insert_with(|| {
                (0..self.num_windows)
                    .map(|_| self.new_slot(field).expect("field exists"))
                    .collect()
            });
        let idx = self.current_slot_index(now);
        let slot = &mut slots[idx];
        if slot.first_write == 0 {
            slot.first_write = now - ((now - self.start_time) % self.window_size);
        }
        let result = f(slot);
        self.touch_lrm(&mut inner, &canon);
        Some(result)
    }

    // ── mutating ops ─────────────────────────────────────────────────

    pub fn add(&self, key: &str, field: &str, delta: i64) -> bool {
        self.add_replicated(key, field, delta, true)
    }

    pub fn add_replicated(&self, key: &str, field: &str, delta: i64, replicate: bool) -> bool {
        let now = now_secs();
        let ok = self
            .with_record_mut(key, field, now, |slot| slot.agg.add_int(delta))
            .unwrap_or(false);
        if ok && replicate {
            self.emit(ReplicationMessage::StatsDbUpdate {
                db_name: self.name.clone(),
                key: self.canon_key(key),
                field: field.to_string(),
                op: StatsOp::AddInt,
                int_value: Some(delta),
                string_value: None,
            });
        }
        ok
    }

    pub fn sub(&self, key: &str, field: &str, delta: i64) -> bool {
        self.add_replicated(key, field, -delta, true)
    }

    pub fn set(&self, key: &str, field: &str, value: i64) -> bool {
        let now = now_secs();
        self.with_record_mut(key, field, now, |slot| slot.agg.set_int(value))
            .unwrap_or(false)
    }

    pub fn add_string(&self, key: &str, field: &str, item: &str, n: u32) -> bool {
        self.add_string_replicated(key, field, item, n, true)
    }

    pub fn add_string_replicated(
        &self,
        key: &str,
        field: &str,
        item: &str,
        n: u32,
        replicate: bool,
    ) -> bool {
        let now = now_secs();
        let ok = self
            .with_record_mut(key, field, now, |slot| slot.agg.add_string(item, n))
            .unwrap_or(false);
        if ok && replicate {
            self.emit(ReplicationMessage::StatsDbUpdate {
                db_name: self.name.clone(),
                key: self.canon_key(key),
                field: field.to_string(),
                op: StatsOp::AddStringInt,
                int_value: Some(n as i64),
                string_value: Some(item.to_string()),
            });
        }
        ok
    }

    pub fn reset(&self, key: &str) {
        self.reset_replicated(key, true);
    }

    pub fn reset_replicated(&self, key: &str, replicate: bool) {
        let canon = self.canon_key(key);
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.records.get_mut(&canon) {
            for slots in rec.fields.values_mut() {
                slots.iter_mut().for_each(Slot::erase);
            }
        }
        drop(inner);
        if replicate {
            self.emit(ReplicationMessage::StatsDbUpdate {
                db_name: self.name.clone(),
                key: canon,
                field: String::new(),
                op: StatsOp::Reset,
                int_value: None,
                string_value: None,
            });
        }
    }

    pub fn reset_field(&self, key: &str, field: &str) {
        self.reset_field_replicated(key, field, true);
    }

    pub fn reset_field_replicated(&self, key: &str, field: &str, replicate: bool) {
        let canon = self.canon_key(key);
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.records.get_mut(&canon) {
            if let Some(slots) = rec.fields.get_mut(field) {
                slots.iter_mut().for_each(Slot::erase);
            }
        }
        drop(inner);
        if replicate {
            self.emit(ReplicationMessage::StatsDbUpdate {
                db_name: self.name.clone(),
                key: canon,
                field: field.to_string(),
                op: StatsOp::ResetField,
                int_value: None,
                string_value: None,
            });
        }
    }

    // ── reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: &str, field: &str, probe: Option<&str>) -> i64 {
        self.read_windows(key, field, probe).into_iter().sum()
    }

    pub fn get_current(&self, key: &str, field: &str, probe: Option<&str>) -> i64 {
        let now = now_secs();
        let idx = self.current_slot_index(now);
        self.read_windows(key, field, probe)
            .get(idx)
            .copied()
            .unwrap_or(0)
    }

    pub fn get_windows(&self, key: &str, field: &str, probe: Option<&str>) -> Vec<i64> {
        self.read_windows(key, field, probe)
    }

    fn read_windows(&self, key: &str, field: &str, probe: Option<&str>) -> Vec<i64> {
        let Some(kind) = self.field_kind(field) else {
            tracing::warn!(db = %self.name, field, "unknown field name");
            return Vec::new();
        };
        let canon = self.canon_key(key);
        let inner = self.inner.lock();
        let Some(rec) = inner.records.get(&canon) else {
            return vec![0; self.num_windows];
        };
        let Some(slots) = rec.fields.get(field) else {
            return vec![0; self.num_windows];
        };
        slots
            .iter()
            .map(|slot| match (kind, probe) {
                (FieldKind::CountMin, Some(p)) => slot.agg.probe(p),
                _ => slot.agg.scalar(),
            })
            .collect()
    }

    pub fn get_all_fields(&self, key: &str) -> Vec<(String, i64)> {
        let canon = self.canon_key(key);
        let inner = self.inner.lock();
        let Some(rec) = inner.records.get(&canon) else {
            return Vec::new();
        };
        rec.fields
            .keys()
            .map(|field| {
                let sum: i64 = rec.fields[field].iter().map(|s| s.agg.scalar()).sum();
                (field.clone(), sum)
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().records.len()
    }

    // ── dump / restore (bulk sync, §4.3) ─────────────────────────────

    pub fn start_dump(&self) -> Vec<String> {
        self.inner.lock().records.keys().cloned().collect()
    }

    pub fn dump_entry(&self, key: &str) -> Option<ReplicationMessage> {
        let inner = self.inner.lock();
        let rec = inner.records.get(key)?;
        let fields = rec
            .fields
            .iter()
            .map(|(name, slots)| {
                let dumped = slots
                    .iter()
                    .map(|s| DumpSlot {
                        first_write: s.first_write,
                        blob: s.agg.dump(),
                    })
                    .collect();
                (name.clone(), dumped)
            })
            .collect();
        Some(ReplicationMessage::StatsDbFullDump {
            db_name: self.name.clone(),
            key: key.to_string(),
            start_time: self.start_time,
            fields,
        })
    }

    pub fn end_dump(&self) {}

    pub fn restore_entry(&self, key: &str, fields: &[(String, Vec<DumpSlot>)]) {
        let mut inner = self.inner.lock();
        let rec = inner.records.entry(key.to_string()).or_insert_with(|| Record {
            fields: HashMap::new(),
            last_sweep: now_secs(),
        });
        for (name, slots) in fields {
            let Some(spec) = self.fields.get(name) else {
                continue;
            };
            let restored: Vec<Slot> = slots
                .iter()
                .map(|ds| {
                    StatsAggregator::restore(spec.kind, &ds.blob, spec.cm_eps, spec.cm_gamma)
                        .map(|agg| Slot {
                            first_write: ds.first_write,
                            agg,
                        })
                        .unwrap_or_else(|| {
                            Slot::empty(spec.kind, spec.hll_precision, spec.cm_eps, spec.cm_gamma)
                        })
                })
                .collect();
            rec.fields.insert(name.clone(), restored);
        }
        inner.lrm.touch(key);
    }

    // ── expiry / eviction loop (§4.1 "Eviction and sizing") ──────────

    pub fn expire_sleep(&self) -> Duration {
        Duration::from_millis(self.expire_sleep_ms.load(Ordering::Relaxed))
    }

    /// One pass of LRM-based eviction: pop keys from the head while
    /// over the soft max. Public so a shared background task can drive
    /// every configured DB on one timer.
    pub fn evict_pass(&self) {
        let soft_max = self.soft_max.load(Ordering::Relaxed);
        let mut inner = self.inner.lock();
        while inner.records.len() > soft_max {
            let Some(k) = inner.lrm.pop_front() else {
                break;
            };
            inner.records.remove(&k);
        }
    }

    pub async fn run_expire_loop(self: std::sync::Arc<Self>) {
        loop {
            tokio::time::sleep(self.expire_sleep()).await;
            self.evict_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wforce_domain::config::FieldConfig;

    fn int_db() -> WindowedStatsDB {
        WindowedStatsDB::new(&StatsDbConfig {
            name: "test".into(),
            num_windows: 5,
            window_size_secs: 60,
            fields: vec![FieldConfig {
                name: "failed".into(),
                kind: FieldKind::Int,
                hll_precision: 6,
                cm_eps: 0.01,
                cm_gamma: 0.01,
            }],
            soft_max: 100,
            expire_sleep_ms: 250,
            v4_prefix_bits: None,
            v6_prefix_bits: None,
            replication_enabled: false,
        })
    }

    #[test]
    fn add_then_get_current_and_sum() {
        let db = int_db();
        assert!(db.add("alice", "failed", 1));
        assert!(db.add("alice", "failed", 1));
        assert_eq!(db.get_current("alice", "failed", None), 2);
        assert_eq!(db.get("alice", "failed", None), 2);
    }

    #[test]
    fn unknown_field_returns_false_not_panic() {
        let db = int_db();
        assert!(!db.add("alice", "nope", 1));
    }

    #[test]
    fn reset_clears_all_windows() {
        let db = int_db();
        db.add("alice", "failed", 5);
        db.reset("alice");
        assert_eq!(db.get("alice", "failed", None), 0);
    }

    #[test]
    fn reset_replicated_false_does_not_re_emit() {
        let db = int_db();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        db.enable_replication(Some(tx));
        db.add_replicated("alice", "failed", 5, false);
        rx.try_recv().unwrap_err(); // non-replicated add: nothing queued

        // Simulates StatsRegistry::apply_replicated applying an
        // incoming Reset: must not re-emit a fresh Reset back out.
        db.reset_replicated("alice", false);
        assert!(rx.try_recv().is_err());

        // A locally-originated reset still replicates.
        db.reset("alice");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn get_all_fields_reports_sum() {
        let db = int_db();
        db.add("alice", "failed", 3);
        let fields = db.get_all_fields("alice");
        assert_eq!(fields, vec![("failed".to_string(), 3)]);
    }

    #[test]
    fn eviction_respects_soft_max() {
        let db = int_db();
        db.set_max_size(2);
        db.add("a", "failed", 1);
        db.add("b", "failed", 1);
        db.add("c", "failed", 1);
        db.evict_pass();
        assert!(db.size() <= 2);
    }

    #[test]
    fn repeated_touches_do_not_duplicate_lrm_entry() {
        let db = int_db();
        db.set_max_size(2);
        for _ in 0..50 {
            db.add("hot", "failed", 1);
        }
        db.add("cold", "failed", 1);
        // "hot" was touched 50 times after "cold"'s single touch, so
        // it must not be the one evicted despite being the first key
        // ever written.
        db.evict_pass();
        assert!(db.get("hot", "failed", None) > 0);
    }

    #[test]
    fn eviction_picks_least_recently_modified_key() {
        let db = int_db();
        db.set_max_size(2);
        db.add("a", "failed", 1);
        db.add("b", "failed", 1);
        // Re-touch "a" so "b" becomes the least-recently-modified key.
        db.add("a", "failed", 1);
        db.add("c", "failed", 1);
        db.evict_pass();
        assert_eq!(db.get("b", "failed", None), 0);
        assert!(db.get("a", "failed", None) > 0);
        assert!(db.get("c", "failed", None) > 0);
    }

    #[test]
    fn v4_prefix_canonicalises_key() {
        let db = int_db();
        db.set_v4_prefix(24);
        db.add("10.0.0.5", "failed", 1);
        assert_eq!(db.get("10.0.0.9", "failed", None), 1);
    }
}
