//! Bulk state transfer ("warm sync"), per spec.md §4.3/§4.6 `syncDBs`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use wforce_domain::ListType;
use wforce_lists::ListKeyArg;
use wforce_stats::StatsRegistry;

use crate::crypto::{self, KEY_LEN};

pub fn list_key_arg(list_type: ListType, key: &str) -> ListKeyArg {
    match list_type {
        ListType::Ip => ListKeyArg::Ip(key.to_string()),
        ListType::Login => ListKeyArg::Login(key.to_string()),
        ListType::IpLogin => {
            let (ip, login) = key.split_once(':').unwrap_or((key, ""));
            ListKeyArg::IpLogin(ip.to_string(), login.to_string())
        }
    }
}

/// Opens a fresh stream connection to `addr` and emits one
/// `StatsDBFullDump` message per key for every configured stats DB
///.
pub async fn send_full_dump(
    addr: SocketAddr,
    key: [u8; KEY_LEN],
    stats: &StatsRegistry,
) -> std::io::Result<usize> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut sent = 0usize;
    for (_name, db) in stats.iter() {
        for k in db.start_dump() {
            let Some(msg) = db.dump_entry(&k) else {
                continue;
            };
            let payload = serde_json::to_vec(&msg).unwrap_or_default();
            let framed = crypto::encrypt(&key, &payload);
            let mut len_prefixed = Vec::with_capacity(2 + framed.len());
            len_prefixed.extend_from_slice(&(framed.len() as u16).to_be_bytes());
            len_prefixed.extend_from_slice(&framed);
            stream.write_all(&len_prefixed).await?;
            sent += 1;
        }
        db.end_dump();
    }
    Ok(sent)
}

/// Target-side handler for a `syncDBs` request: connects back to the
/// requester's `replication_host:replication_port`, streams a full
/// dump, then GETs `callback_url` on completion.
pub async fn serve_sync_request(
    replication_addr: SocketAddr,
    key: [u8; KEY_LEN],
    stats: Arc<StatsRegistry>,
    callback_url: String,
) {
    match send_full_dump(replication_addr, key, &stats).await {
        Ok(n) => tracing::info!(count = n, %replication_addr, "bulk sync dump sent"),
        Err(e) => {
            tracing::warn!(error = %e, %replication_addr, "bulk sync dump failed");
            return;
        }
    }
    let client = reqwest::Client::new();
    if let Err(e) = client.get(&callback_url).send().await {
        tracing::warn!(error = %e, %callback_url, "sync completion callback failed");
    }
}
