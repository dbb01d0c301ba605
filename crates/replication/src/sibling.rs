use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;
use wforce_domain::config::{SiblingConfig, Transport};

use crate::crypto::{self, KEY_LEN};

#[derive(Debug, Default)]
pub struct SiblingCounters {
    pub send_ok: AtomicU64,
    pub send_fail: AtomicU64,
    pub recv_ok: AtomicU64,
    pub recv_fail: AtomicU64,
}

/// A replication peer, per spec.md §3.1: bounded FIFO queue + a
/// dedicated task that dequeues and transmits.
pub struct Sibling {
    pub address: String,
    pub resolved: Option<SocketAddr>,
    pub transport: Transport,
    pub key: Option<[u8; KEY_LEN]>,
    pub counters: SiblingCounters,
    /// True when this sibling's resolved address is our own listening
    /// endpoint; sends are silently dropped.
    pub is_self: bool,
    queue_tx: tokio::sync::mpsc::Sender<Vec<u8>>,
}

impl Sibling {
    pub fn spawn(
        cfg: &SiblingConfig,
        global_key: Option<[u8; KEY_LEN]>,
        queue_size: usize,
        connect_timeout: Duration,
        local_addrs: &[SocketAddr],
    ) -> Arc<Self> {
        let resolved = cfg.address.parse::<SocketAddr>().ok();
        let is_self = resolved
            .map(|r| local_addrs.iter().any(|l| l.ip() == r.ip() && l.port() == r.port()))
            .unwrap_or(false);
        let key = cfg
            .key
            .as_deref()
            .and_then(crypto::parse_key_b64)
            .or(global_key);
        let (tx, rx) = tokio::sync::mpsc::channel(queue_size);
        let sibling = Arc::new(Self {
            address: cfg.address.clone(),
            resolved,
            transport: cfg.transport,
            key,
            counters: SiblingCounters::default(),
            is_self,
            queue_tx: tx,
        });
        tokio::spawn(sibling.clone().run_sender(rx, connect_timeout));
        sibling
    }

    /// Non-blocking enqueue; drops and logs on a full queue.
    pub fn queue_msg(&self, framed: Vec<u8>) {
        if self.is_self || self.transport == Transport::None {
            return;
        }
        if self.queue_tx.try_send(framed).is_err() {
            tracing::warn!(sibling = %self.address, "replication send queue full, dropping message");
        }
    }

    async fn run_sender(
        self: Arc<Self>,
        mut rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
        connect_timeout: Duration,
    ) {
        let Some(addr) = self.resolved else {
            tracing::warn!(sibling = %self.address, "unresolvable sibling address, sender exiting");
            return;
        };
        match self.transport {
            Transport::Datagram => {
                let Ok(sock) = UdpSocket::bind("0.0.0.0:0").await else {
                    tracing::error!(sibling = %self.address, "failed to bind datagram socket");
                    return;
                };
                while let Some(frame) = rx.recv().await {
                    match sock.send_to(&frame, addr).await {
                        Ok(_) => {
                            self.counters.send_ok.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.counters.send_fail.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(sibling = %self.address, error = %e, "datagram send failed");
                        }
                    }
                }
            }
            Transport::Stream => {
                let conn: AsyncMutex<Option<TcpStream>> = AsyncMutex::new(None);
                while let Some(frame) = rx.recv().await {
                    let mut guard = conn.lock().await;
                    if guard.is_none() {
                        *guard = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
                            .await
                            .ok()
                            .and_then(Result::ok);
                    }
                    let mut len_prefixed = Vec::with_capacity(2 + frame.len());
                    len_prefixed.extend_from_slice(&(frame.len() as u16).to_be_bytes());
                    len_prefixed.extend_from_slice(&frame);

                    let mut ok = false;
                    if let Some(stream) = guard.as_mut() {
                        ok = stream.write_all(&len_prefixed).await.is_ok();
                    }
                    if !ok {
                        // one reconnect + retry per message
                        *guard = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
                            .await
                            .ok()
                            .and_then(Result::ok);
                        ok = match guard.as_mut() {
                            Some(stream) => stream.write_all(&len_prefixed).await.is_ok(),
                            None => false,
                        };
                    }
                    if ok {
                        self.counters.send_ok.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.counters.send_fail.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(sibling = %self.address, "stream send failed after retry");
                        *guard = None;
                    }
                }
            }
            Transport::None => {}
        }
    }
}
