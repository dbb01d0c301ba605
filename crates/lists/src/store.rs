use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ipnet::IpNet;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use wforce_domain::config::{ListStoreConfig, RetMessages};
use wforce_domain::{EventSink, ListStoreKind, ListType, ReplicationMessage};

use crate::entry::{KeySpace, ListEntry};
use crate::persist::PersistBackend;

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Key argument accepted by `add_entry`/`delete_entry`/`check_entry`,
/// mirroring spec.md §3.1's three key spaces.
#[derive(Debug, Clone)]
pub enum ListKeyArg {
    /// Plain IP literal (exact match) or `a.b.c.d/nn` netmask
    /// (longest-prefix match).
    Ip(String),
    Login(String),
    IpLogin(String, String),
}

impl ListKeyArg {
    fn key_space(&self) -> KeySpace {
        match self {
            ListKeyArg::Ip(_) => KeySpace::Ip,
            ListKeyArg::Login(_) => KeySpace::Login,
            ListKeyArg::IpLogin(_, _) => KeySpace::IpLogin,
        }
    }

    fn canonical(&self) -> String {
        match self {
            ListKeyArg::Ip(s) => s.clone(),
            ListKeyArg::Login(s) => s.clone(),
            ListKeyArg::IpLogin(ip, login) => format!("{ip}:{login}"),
        }
    }

    fn list_type(&self) -> ListType {
        match self {
            ListKeyArg::Ip(_) => ListType::Ip,
            ListKeyArg::Login(_) => ListType::Login,
            ListKeyArg::IpLogin(_, _) => ListType::IpLogin,
        }
    }
}

struct Inner {
    ip_exact: HashMap<String, ListEntry>,
    ip_nets: Vec<(IpNet, ListEntry)>,
    login: HashMap<String, ListEntry>,
    ip_login: HashMap<String, ListEntry>,
    insertion: HashMap<KeySpace, VecDeque<String>>,
    /// Ordered by expiration for purge; stops at the first non-expired
    /// entry.
    expiry: BTreeMap<i64, Vec<(KeySpace, String)>>,
}

impl Inner {
    fn new() -> Self {
        let mut insertion = HashMap::new();
        insertion.insert(KeySpace::Ip, VecDeque::new());
        insertion.insert(KeySpace::Login, VecDeque::new());
        insertion.insert(KeySpace::IpLogin, VecDeque::new());
        Self {
            ip_exact: HashMap::new(),
            ip_nets: Vec::new(),
            login: HashMap::new(),
            ip_login: HashMap::new(),
            insertion,
            expiry: BTreeMap::new(),
        }
    }
}

/// One of the two independent stores (denylist/allowlist), identical
/// in behaviour.
pub struct ListStore {
    /// `"bl"` or `"wl"`; used for the persistence key prefix and to
    /// pick which webhook events this store emits.
    kind: ListStoreKind,
    ret_messages: RetMessages,
    inner: Mutex<Inner>,
    persist: Mutex<Option<Arc<dyn PersistBackend>>>,
    persist_key_prefix: String,
    persist_replicated: AtomicI64,
    event_sink: Mutex<Option<Arc<dyn EventSink>>>,
    repl_tx: Mutex<Option<UnboundedSender<ReplicationMessage>>>,
}

impl ListStore {
    pub fn new(kind: ListStoreKind, cfg: &ListStoreConfig) -> Self {
        let persist_key_prefix = match kind {
            ListStoreKind::Bl => "wfbl".to_string(),
            ListStoreKind::Wl => "wfwl".to_string(),
        };
        Self {
            kind,
            ret_messages: cfg.ret_messages.clone(),
            inner: Mutex::new(Inner::new()),
            persist: Mutex::new(None),
            persist_key_prefix,
            persist_replicated: AtomicI64::new(0),
            event_sink: Mutex::new(None),
            repl_tx: Mutex::new(None),
        }
    }

    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.event_sink.lock() = Some(sink);
    }

    pub fn enable_replication(&self, tx: UnboundedSender<ReplicationMessage>) {
        *self.repl_tx.lock() = Some(tx);
    }

    pub fn make_persistent(&self, backend: Arc<dyn PersistBackend>, persist_replicated: bool) {
        *self.persist.lock() = Some(backend);
        self.persist_replicated
            .store(persist_replicated as i64, Ordering::Relaxed);
    }

    fn store_kind(&self) -> ListStoreKind {
        self.kind
    }

    fn space_prefix(space: KeySpace) -> &'static str {
        match space {
            KeySpace::Ip => "ip",
            KeySpace::Login => "login",
            KeySpace::IpLogin => "ip_login",
        }
    }

    fn persist_key(&self, space: KeySpace, key: &str) -> String {
        format!("{}:{}:{}", self.persist_key_prefix, Self::space_prefix(space), key)
    }

    fn ret_message(&self, list_type: ListType) -> &str {
        match list_type {
            ListType::Ip => &self.ret_messages.ip,
            ListType::Login => &self.ret_messages.login,
            ListType::IpLogin => &self.ret_messages.ip_login,
        }
    }

    // ── add / delete ──────────────────────────────────────────────

    /// `addEntry` with full side effects (webhook + replication +
    /// persistence). Used by non-replica callers (HTTP API, policy).
    pub fn add_entry(&self, key: ListKeyArg, seconds: i64, reason: String) -> bool {
        self.add_entry_inner(key, seconds, reason, true, true)
    }

    /// Applied from a received replication message: no webhook, no
    /// re-emitted replication event.
    pub fn apply_add(&self, key: ListKeyArg, seconds: i64, reason: String) {
        self.add_entry_inner(key, seconds, reason, false, false);
    }

    /// Applied from `loadPersistEntries` at startup: no webhook, no
    /// replication, and does not
    /// re-persist what was just loaded from persistence.
    pub fn load_persisted(&self, key: ListKeyArg, seconds: i64, reason: String) {
        self.add_entry_inner(key, seconds, reason, false, false);
    }

    fn add_entry_inner(
        &self,
        key: ListKeyArg,
        seconds: i64,
        reason: String,
        emit_webhook: bool,
        replicate: bool,
    ) -> bool {
        let space = key.key_space();
        let canon = key.canonical();
        let now = now_secs();
        let expiration = now + seconds;
        let entry = ListEntry {
            key: canon.clone(),
            reason: reason.clone(),
            expiration_timestamp: expiration,
        };

        {
            let mut inner = self.inner.lock();
            let old_expiry = match &key {
                ListKeyArg::Ip(s) => {
                    if let Ok(net) = s.parse::<IpNet>() {
                        let old = inner
                            .ip_nets
                            .iter()
                            .position(|(n, _)| *n == net)
                            .map(|i| inner.ip_nets[i].1.expiration_timestamp);
                        if let Some(i) = inner.ip_nets.iter().position(|(n, _)| *n == net) {
                            inner.ip_nets[i].1 = entry.clone();
                        } else {
                            inner.ip_nets.push((net, entry.clone()));
                        }
                        old
                    } else {
                        let old = inner.ip_exact.get(&canon).map(|e| e.expiration_timestamp);
                        inner.ip_exact.insert(canon.clone(), entry.clone());
                        old
                    }
                }
                ListKeyArg::Login(_) => {
                    let old = inner.login.get(&canon).map(|e| e.expiration_timestamp);
                    inner.login.insert(canon.clone(), entry.clone());
                    old
                }
                ListKeyArg::IpLogin(_, _) => {
                    let old = inner.ip_login.get(&canon).map(|e| e.expiration_timestamp);
                    inner.ip_login.insert(canon.clone(), entry.clone());
                    old
                }
            };

            if let Some(old_exp) = old_expiry {
                Self::remove_from_expiry(&mut inner.expiry, old_exp, space, &canon);
            } else {
                inner
                    .insertion
                    .get_mut(&space)
                    .expect("key space initialised")
                    .push_back(canon.clone());
            }
            inner
                .expiry
                .entry(expiration)
                .or_default()
                .push((space, canon.clone()));
        }

        if let Some(tx) = self.repl_tx.lock().as_ref() {
            if replicate {
                let _ = tx.send(ReplicationMessage::ListAdd {
                    list_type: key.list_type(),
                    store: self.store_kind(),
                    key: canon.clone(),
                    expire_secs: seconds,
                    reason: reason.clone(),
                });
            }
        }

        let should_persist = self.persist.lock().is_some()
            && (replicate || self.persist_replicated.load(Ordering::Relaxed) != 0);
        if should_persist {
            if let Some(backend) = self.persist.lock().clone() {
                let pkey = self.persist_key(space, &canon);
                let value = format!("{expiration}:{reason}");
                tokio::spawn(async move {
                    if let Err(e) = backend.put(&pkey, &value, seconds).await {
                        tracing::warn!(error = %e, "list persistence put failed");
                    }
                });
            }
        }

        if emit_webhook {
            if let Some(sink) = self.event_sink.lock().as_ref() {
                sink.emit(
                    "addbl",
                    json!({
                        "key": canon,
                        "bl_type": format!("{:?}", space).to_lowercase(),
                        "reason": reason,
                        "expire_secs": seconds,
                    }),
                );
            }
        }

        true
    }

    pub fn delete_entry(&self, key: ListKeyArg) -> bool {
        self.delete_entry_inner(key, true, true)
    }

    pub fn apply_delete(&self, key: ListKeyArg) {
        self.delete_entry_inner(key, false, false);
    }

    fn delete_entry_inner(&self, key: ListKeyArg, emit_webhook: bool, replicate: bool) -> bool {
        let space = key.key_space();
        let canon = key.canonical();
        let removed = {
            let mut inner = self.inner.lock();
            let removed_exp = match &key {
                ListKeyArg::Ip(s) => {
                    if let Ok(net) = s.parse::<IpNet>() {
                        if let Some(i) = inner.ip_nets.iter().position(|(n, _)| *n == net) {
                            Some(inner.ip_nets.remove(i).1.expiration_timestamp)
                        } else {
                            None
                        }
                    } else {
                        inner.ip_exact.remove(&canon).map(|e| e.expiration_timestamp)
                    }
                }
                ListKeyArg::Login(_) => inner.login.remove(&canon).map(|e| e.expiration_timestamp),
                ListKeyArg::IpLogin(_, _) => {
                    inner.ip_login.remove(&canon).map(|e| e.expiration_timestamp)
                }
            };
            if let Some(exp) = removed_exp {
                Self::remove_from_expiry(&mut inner.expiry, exp, space, &canon);
                if let Some(dq) = inner.insertion.get_mut(&space) {
                    dq.retain(|k| k != &canon);
                }
            }
            removed_exp.is_some()
        };

        if !removed {
            return false;
        }

        if replicate {
            if let Some(tx) = self.repl_tx.lock().as_ref() {
                let _ = tx.send(ReplicationMessage::ListDelete {
                    list_type: key.list_type(),
                    store: self.store_kind(),
                    key: canon.clone(),
                });
            }
        }

        if self.persist.lock().is_some() && (replicate || self.persist_replicated.load(Ordering::Relaxed) != 0) {
            if let Some(backend) = self.persist.lock().clone() {
                let pkey = self.persist_key(space, &canon);
                tokio::spawn(async move {
                    if let Err(e) = backend.delete(&pkey).await {
                        tracing::warn!(error = %e, "list persistence delete failed");
                    }
                });
            }
        }

        if emit_webhook {
            if let Some(sink) = self.event_sink.lock().as_ref() {
                sink.emit(
                    "delbl",
                    json!({ "key": canon, "bl_type": format!("{:?}", space).to_lowercase() }),
                );
            }
        }

        true
    }

    fn remove_from_expiry(
        expiry: &mut BTreeMap<i64, Vec<(KeySpace, String)>>,
        ts: i64,
        space: KeySpace,
        key: &str,
    ) {
        if let Some(v) = expiry.get_mut(&ts) {
            v.retain(|(s, k)| !(*s == space && k == key));
            if v.is_empty() {
                expiry.remove(&ts);
            }
        }
    }

    // ── lookups ───────────────────────────────────────────────────

    pub fn check_entry(&self, key: &ListKeyArg) -> bool {
        self.get_entry(key).is_some()
    }

    pub fn get_entry(&self, key: &ListKeyArg) -> Option<ListEntry> {
        let inner = self.inner.lock();
        match key {
            ListKeyArg::Ip(s) => {
                if let Some(e) = inner.ip_exact.get(s.as_str()) {
                    return Some(e.clone());
                }
                if let Ok(addr) = s.parse::<IpAddr>() {
                    let mut best: Option<(&IpNet, &ListEntry)> = None;
                    for (net, entry) in &inner.ip_nets {
                        if net.contains(&addr) {
                            match best {
                                Some((b, _)) if b.prefix_len() >= net.prefix_len() => {}
                                _ => best = Some((net, entry)),
                            }
                        }
                    }
                    return best.map(|(_, e)| e.clone());
                }
                None
            }
            ListKeyArg::Login(s) => inner.login.get(s.as_str()).cloned(),
            ListKeyArg::IpLogin(ip, login) => {
                inner.ip_login.get(&format!("{ip}:{login}")).cloned()
            }
        }
    }

    pub fn get_expiration(&self, key: &ListKeyArg) -> i64 {
        match self.get_entry(key) {
            Some(e) => (e.expiration_timestamp - now_secs()).max(0),
            None => -1,
        }
    }

    pub fn get_ip_entries(&self) -> Vec<ListEntry> {
        self.entries_in_space(KeySpace::Ip)
    }

    pub fn get_login_entries(&self) -> Vec<ListEntry> {
        self.entries_in_space(KeySpace::Login)
    }

    pub fn get_ip_login_entries(&self) -> Vec<ListEntry> {
        self.entries_in_space(KeySpace::IpLogin)
    }

    fn entries_in_space(&self, space: KeySpace) -> Vec<ListEntry> {
        let inner = self.inner.lock();
        let Some(order) = inner.insertion.get(&space) else {
            return Vec::new();
        };
        order
            .iter()
            .filter_map(|k| match space {
                KeySpace::Ip => inner
                    .ip_exact
                    .get(k)
                    .cloned()
                    .or_else(|| inner.ip_nets.iter().find(|(n, _)| n.to_string() == *k).map(|(_, e)| e.clone())),
                KeySpace::Login => inner.login.get(k).cloned(),
                KeySpace::IpLogin => inner.ip_login.get(k).cloned(),
            })
            .collect()
    }

    pub fn ret_message_for(&self, list_type: ListType) -> String {
        self.ret_message(list_type).to_string()
    }

    // ── expiry goroutine ───────────────────

    pub async fn run_expire_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            self.expire_pass();
        }
    }

    /// Scans the expiration index and erases entries with
    /// `expiration <= now`, stopping at the first non-expired entry
    /// (the index is ordered). Emits one `expirebl` webhook per entry.
    pub fn expire_pass(&self) {
        let now = now_secs();
        let expired: Vec<(KeySpace, String)> = {
            let inner = self.inner.lock();
            inner
                .expiry
                .range(..=now)
                .flat_map(|(_, v)| v.iter().cloned())
                .collect()
        };
        for (space, key) in expired {
            let arg = match space {
                KeySpace::Ip => ListKeyArg::Ip(key.clone()),
                KeySpace::Login => ListKeyArg::Login(key.clone()),
                KeySpace::IpLogin => {
                    let (ip, login) = key.split_once(':').unwrap_or((key.as_str(), ""));
                    ListKeyArg::IpLogin(ip.to_string(), login.to_string())
                }
            };
            let removed = self.delete_entry_inner(arg, false, false);
            if removed {
                if let Some(sink) = self.event_sink.lock().as_ref() {
                    sink.emit(
                        "expirebl",
                        json!({ "key": key, "bl_type": format!("{:?}", space).to_lowercase() }),
                    );
                }
            }
        }
    }

    pub async fn load_persist_entries(&self) -> wforce_domain::Result<usize> {
        let backend = self.persist.lock().clone();
        let Some(backend) = backend else {
            return Ok(0);
        };
        let mut loaded = 0;
        for (space, prefix) in [
            (KeySpace::Ip, "ip"),
            (KeySpace::Login, "login"),
            (KeySpace::IpLogin, "ip_login"),
        ] {
            let full_prefix = format!("{}:{}:", self.persist_key_prefix, prefix);
            let pairs = backend.scan(&full_prefix).await?;
            let now = now_secs();
            for (suffix, value) in pairs {
                let Some((epoch_str, reason)) = value.split_once(':') else {
                    continue;
                };
                let Ok(epoch) = epoch_str.parse::<i64>() else {
                    continue;
                };
                let remaining = epoch - now;
                if remaining <= 0 {
                    continue;
                }
                let arg = match space {
                    KeySpace::Ip => ListKeyArg::Ip(suffix),
                    KeySpace::Login => ListKeyArg::Login(suffix),
                    KeySpace::IpLogin => {
                        let (ip, login) = suffix.split_once(':').unwrap_or((suffix.as_str(), ""));
                        ListKeyArg::IpLogin(ip.to_string(), login.to_string())
                    }
                };
                self.load_persisted(arg, remaining, reason.to_string());
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ListStore {
        ListStore::new(ListStoreKind::Bl, &ListStoreConfig {
            ret_messages: RetMessages::default(),
            persist: None,
        })
    }

    #[test]
    fn add_then_check_exact_ip() {
        let s = store();
        assert!(s.add_entry(ListKeyArg::Ip("198.51.100.1".into()), 3600, "abuse".into()));
        assert!(s.check_entry(&ListKeyArg::Ip("198.51.100.1".into())));
        assert!(!s.check_entry(&ListKeyArg::Ip("198.51.100.2".into())));
    }

    #[test]
    fn netmask_matches_contained_ip_only() {
        let s = store();
        s.add_entry(ListKeyArg::Ip("10.0.0.0/8".into()), 3600, "abuse".into());
        assert!(s.check_entry(&ListKeyArg::Ip("10.5.6.7".into())));
        assert!(!s.check_entry(&ListKeyArg::Ip("11.0.0.1".into())));
    }

    #[test]
    fn add_replaces_existing_entry() {
        let s = store();
        s.add_entry(ListKeyArg::Login("bob".into()), 100, "first".into());
        s.add_entry(ListKeyArg::Login("bob".into()), 200, "second".into());
        let e = s.get_entry(&ListKeyArg::Login("bob".into())).unwrap();
        assert_eq!(e.reason, "second");
    }

    #[test]
    fn delete_removes_entry() {
        let s = store();
        s.add_entry(ListKeyArg::Login("bob".into()), 100, "x".into());
        assert!(s.delete_entry(ListKeyArg::Login("bob".into())));
        assert!(!s.check_entry(&ListKeyArg::Login("bob".into())));
    }

    #[test]
    fn expire_pass_removes_past_entries() {
        let s = store();
        s.add_entry(ListKeyArg::Login("bob".into()), -1, "x".into());
        s.expire_pass();
        assert!(!s.check_entry(&ListKeyArg::Login("bob".into())));
    }

    #[test]
    fn get_expiration_reports_remaining_or_negative_one() {
        let s = store();
        s.add_entry(ListKeyArg::Login("bob".into()), 60, "x".into());
        assert!(s.get_expiration(&ListKeyArg::Login("bob".into())) > 0);
        assert_eq!(s.get_expiration(&ListKeyArg::Login("alice".into())), -1);
    }

    #[test]
    fn insertion_order_enumeration() {
        let s = store();
        s.add_entry(ListKeyArg::Login("a".into()), 60, "x".into());
        s.add_entry(ListKeyArg::Login("b".into()), 60, "x".into());
        let entries = s.get_login_entries();
        assert_eq!(entries.iter().map(|e| e.key.clone()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
