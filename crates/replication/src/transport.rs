use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, UdpSocket};
use wforce_domain::config::ReplicationConfig;
use wforce_domain::ReplicationMessage;
use wforce_lists::ListsRegistry;
use wforce_stats::StatsRegistry;

use crate::crypto::{self, KEY_LEN};
use crate::sibling::Sibling;

#[derive(Default)]
pub struct ReplicationCounters {
    pub recv_ok: AtomicU64,
    pub recv_fail: AtomicU64,
    pub recv_rejected: AtomicU64,
    pub recv_queue_depth: AtomicU64,
}

/// Fan-out to siblings plus the shared receive path (C3), per spec.md
/// §4.3.
pub struct ReplicationTransport {
    pub siblings: Vec<Arc<Sibling>>,
    global_key: Option<[u8; KEY_LEN]>,
    pub counters: ReplicationCounters,
    stats: Arc<StatsRegistry>,
    lists: Arc<ListsRegistry>,
}

impl ReplicationTransport {
    pub fn new(
        cfg: &ReplicationConfig,
        stats: Arc<StatsRegistry>,
        lists: Arc<ListsRegistry>,
        local_addrs: &[SocketAddr],
    ) -> Arc<Self> {
        let global_key = cfg.key.as_deref().and_then(crypto::parse_key_b64);
        let connect_timeout = std::time::Duration::from_secs(cfg.connect_timeout_secs);
        let siblings = cfg
            .siblings
            .iter()
            .map(|s| {
                Sibling::spawn(
                    s,
                    global_key,
                    cfg.max_sibling_queue_size,
                    connect_timeout,
                    local_addrs,
                )
            })
            .collect();
        Arc::new(Self {
            siblings,
            global_key,
            counters: ReplicationCounters::default(),
            stats,
            lists,
        })
    }

    /// Builds the outer encrypted packet once with the global key and,
    /// only for siblings overriding the key, a second packet with the
    /// override.
    pub fn fan_out(&self, msg: &ReplicationMessage) {
        let Ok(payload) = serde_json::to_vec(msg) else {
            tracing::error!("failed to serialize replication message");
            return;
        };
        let global_frame = self
            .global_key
            .map(|k| crypto::encrypt(&k, &payload))
            .unwrap_or_else(|| crypto::encrypt(&[0u8; KEY_LEN], &payload));

        for sibling in &self.siblings {
            match sibling.key {
                Some(k) if Some(k) != self.global_key => {
                    sibling.queue_msg(crypto::encrypt(&k, &payload));
                }
                _ => sibling.queue_msg(global_frame.clone()),
            }
        }
    }

    fn checked_sibling(&self, addr: SocketAddr) -> Option<&Arc<Sibling>> {
        self.siblings
            .iter()
            .find(|s| s.resolved.map(|r| r.ip() == addr.ip()).unwrap_or(false))
    }

    fn decrypt_with_any_key(&self, framed: &[u8]) -> Option<ReplicationMessage> {
        let mut keys: Vec<[u8; KEY_LEN]> = self.siblings.iter().filter_map(|s| s.key).collect();
        if let Some(k) = self.global_key {
            keys.push(k);
        }
        keys.push([0u8; KEY_LEN]);
        for key in keys {
            if let Ok(plain) = crypto::decrypt(&key, framed) {
                if let Ok(msg) = serde_json::from_slice(&plain) {
                    return Some(msg);
                }
            }
        }
        None
    }

    fn apply(&self, msg: ReplicationMessage) {
        match &msg {
            ReplicationMessage::ListAdd {
                list_type,
                store,
                key,
                expire_secs,
                reason,
            } => {
                let store = self.lists_store(*store);
                let arg = crate::sync::list_key_arg(*list_type, key);
                store.apply_add(arg, *expire_secs, reason.clone());
            }
            ReplicationMessage::ListDelete {
                list_type,
                store,
                key,
            } => {
                let store = self.lists_store(*store);
                let arg = crate::sync::list_key_arg(*list_type, key);
                store.apply_delete(arg);
            }
            other => self.stats.apply_replicated(other),
        }
    }

    fn lists_store(&self, kind: wforce_domain::ListStoreKind) -> Arc<wforce_lists::ListStore> {
        match kind {
            wforce_domain::ListStoreKind::Bl => self.lists.denylist.clone(),
            wforce_domain::ListStoreKind::Wl => self.lists.allowlist.clone(),
        }
    }

    // ── receive path ─────────────────────────────────────────────

    pub async fn run_datagram_listener(
        self: Arc<Self>,
        addr: SocketAddr,
        recv_tx: tokio::sync::mpsc::Sender<Vec<u8>>,
    ) -> std::io::Result<()> {
        let sock = UdpSocket::bind(addr).await?;
        let mut buf = vec![0u8; 65535];
        loop {
            let (n, from) = sock.recv_from(&mut buf).await?;
            if self.checked_sibling(from).is_none() {
                self.counters.recv_rejected.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if recv_tx.try_send(buf[..n].to_vec()).is_err() {
                tracing::warn!("replication receive queue full, dropping datagram");
            }
        }
    }

    pub async fn run_stream_listener(
        self: Arc<Self>,
        addr: SocketAddr,
        recv_tx: tokio::sync::mpsc::Sender<Vec<u8>>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        loop {
            let (mut stream, from) = listener.accept().await?;
            if self.checked_sibling(from).is_none() {
                self.counters.recv_rejected.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let recv_tx = recv_tx.clone();
            tokio::spawn(async move {
                loop {
                    let mut len_buf = [0u8; 2];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut frame = vec![0u8; len];
                    if stream.read_exact(&mut frame).await.is_err() {
                        return;
                    }
                    if recv_tx.try_send(frame).is_err() {
                        tracing::warn!("replication receive queue full, dropping stream frame");
                    }
                }
            });
        }
    }

    /// Fixed pool of worker tasks consuming the receive queue.
    pub fn spawn_receive_workers(
        self: Arc<Self>,
        mut recv_rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
        num_workers: usize,
    ) {
        // `mpsc::Receiver` has exactly one consumer; wrap it behind a
        // mutex so each worker task competes for the next item.
        let shared_rx = Arc::new(tokio::sync::Mutex::new(recv_rx));
        for _ in 0..num_workers.max(1) {
            let this = self.clone();
            let rx = shared_rx.clone();
            tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    match item {
                        Some(framed) => this.handle_received(framed),
                        None => return,
                    }
                }
            });
        }
    }

    fn handle_received(&self, framed: Vec<u8>) {
        match self.decrypt_with_any_key(&framed) {
            Some(msg) => {
                self.counters.recv_ok.fetch_add(1, Ordering::Relaxed);
                self.apply(msg);
            }
            None => {
                self.counters.recv_fail.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("dropping malformed/undecryptable replication message");
            }
        }
    }
}
