//! Control channel (C7): a long-lived, encrypted, framed TCP admin
//! console, per spec.md §4.7/§6.4.
//!
//! Wire shape: each side writes a 24-byte greeting nonce in the clear,
//! then the connection becomes a loop of `uint16 length (big-endian)
//! || encrypted(command or response)` frames. Authentication is
//! implicit in the shared key: anyone without it produces frames
//! [`wforce_replication::crypto::decrypt`] rejects.
//!
//! The greeting nonces in the original are folded into the cipher's
//! per-message nonce derivation; `chacha20poly1305` already carries a
//! fresh random nonce per frame (see `wforce_replication::crypto`), so
//! here the greeting only serves as a liveness handshake before the
//! encrypted loop starts (documented as an Open Question resolution
//! in DESIGN.md).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wforce_domain::config::AdminConfig;
use wforce_policy::PolicyDispatcher;
use wforce_replication::crypto::{self, KEY_LEN};

const GREETING_LEN: usize = 24;

pub async fn run(cfg: AdminConfig, policy: Arc<PolicyDispatcher>) -> std::io::Result<()> {
    if !cfg.enabled {
        return Ok(());
    }
    let Some(key) = cfg.key.as_deref().and_then(crypto::parse_key_b64) else {
        tracing::warn!("control channel enabled but no key configured; not starting listener");
        return Ok(());
    };

    let listener = TcpListener::bind(&cfg.listen).await?;
    tracing::info!(listen = %cfg.listen, "control channel listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let policy = policy.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, peer, key, policy).await {
                tracing::debug!(%peer, error = %e, "control channel connection closed");
            }
        });
    }
}

async fn handle_conn(
    mut stream: TcpStream,
    peer: SocketAddr,
    key: [u8; KEY_LEN],
    policy: Arc<PolicyDispatcher>,
) -> std::io::Result<()> {
    // Nonce handshake: exchange a 24-byte greeting in the clear so
    // both ends observe a live peer before trusting any ciphertext.
    let mut local_nonce = [0u8; GREETING_LEN];
    rand_fill(&mut local_nonce);
    stream.write_all(&local_nonce).await?;
    let mut peer_nonce = [0u8; GREETING_LEN];
    stream.read_exact(&mut peer_nonce).await?;
    tracing::debug!(%peer, "control channel handshake complete");

    loop {
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut framed = vec![0u8; len];
        stream.read_exact(&mut framed).await?;

        let command = match crypto::decrypt(&key, &framed) {
            Ok(plain) => String::from_utf8_lossy(&plain).into_owned(),
            Err(_) => {
                tracing::warn!(%peer, "control channel: undecryptable frame, closing connection");
                return Ok(());
            }
        };

        let output = run_command(&policy, command.trim());
        let response = crypto::encrypt(&key, output.as_bytes());
        let mut out = Vec::with_capacity(2 + response.len());
        out.extend_from_slice(&(response.len() as u16).to_be_bytes());
        out.extend_from_slice(&response);
        stream.write_all(&out).await?;
    }
}

/// Runs `command` against every pool interpreter and joins their
/// printed output, one line per holder.
fn run_command(policy: &PolicyDispatcher, command: &str) -> String {
    if command.is_empty() {
        return String::new();
    }
    policy
        .admin_eval_all(command)
        .into_iter()
        .enumerate()
        .map(|(i, out)| format!("[holder {i}] {out}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rand_fill(buf: &mut [u8]) {
    use chacha20poly1305::aead::rand_core::RngCore;
    chacha20poly1305::aead::OsRng.fill_bytes(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_prefixes_each_holder() {
        let policy = PolicyDispatcher::null(2);
        let out = run_command(&policy, "ping");
        assert!(out.contains("[holder 0]"));
        assert!(out.contains("[holder 1]"));
    }

    #[test]
    fn empty_command_yields_empty_output() {
        let policy = PolicyDispatcher::null(1);
        assert_eq!(run_command(&policy, ""), "");
    }
}
