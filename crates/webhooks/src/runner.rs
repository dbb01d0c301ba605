//! Bounded, queued HTTP POST dispatch with HMAC signing (C5), per
//! spec.md §4.5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use wforce_domain::config::{WebHookEvent, WebhooksConfig};
use wforce_domain::EventSink;

use crate::hook::WebHook;

type HmacSha256 = Hmac<Sha256>;

struct Delivery {
    event: WebHookEvent,
    hook: Arc<WebHook>,
    body: String,
}

/// Non-blocking enqueue in front of a bounded thread/task pool that
/// performs the actual HTTP POSTs.
pub struct WebhookRunner {
    hooks: HashMap<String, Arc<WebHook>>,
    tx: tokio::sync::mpsc::Sender<Delivery>,
}

fn parse_event(event: &str) -> Option<WebHookEvent> {
    match event {
        "report" => Some(WebHookEvent::Report),
        "allow" => Some(WebHookEvent::Allow),
        "reset" => Some(WebHookEvent::Reset),
        "addbl" => Some(WebHookEvent::AddBl),
        "delbl" => Some(WebHookEvent::DelBl),
        "expirebl" => Some(WebHookEvent::ExpireBl),
        _ => None,
    }
}

impl WebhookRunner {
    pub fn new(cfg: &WebhooksConfig) -> Arc<Self> {
        let hooks: HashMap<String, Arc<WebHook>> = cfg
            .hooks
            .iter()
            .map(|h| {
                let wh = Arc::new(WebHook::from_config(h));
                (wh.id.clone(), wh)
            })
            .collect();

        let (tx, rx) = tokio::sync::mpsc::channel(cfg.queue_size);
        let runner = Arc::new(Self { hooks, tx });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .pool_max_idle_per_host(cfg.max_hook_conns)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let shared_rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..cfg.pool_threads.max(1) {
            let rx = shared_rx.clone();
            let client = client.clone();
            tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    match item {
                        Some(delivery) => dispatch(&client, delivery).await,
                        None => return,
                    }
                }
            });
        }

        runner
    }

    pub fn get(&self, id_or_name: &str) -> Option<Arc<WebHook>> {
        self.hooks.get(id_or_name).cloned().or_else(|| {
            self.hooks
                .values()
                .find(|h| h.name.as_deref() == Some(id_or_name))
                .cloned()
        })
    }

    pub fn list(&self) -> Vec<Arc<WebHook>> {
        self.hooks.values().cloned().collect()
    }

    /// Enqueues one delivery to one hook. Non-blocking: drops and logs
    /// on a full queue.
    pub fn run_hook(&self, event: WebHookEvent, hook: Arc<WebHook>, body: serde_json::Value) {
        if !hook.is_active() || !hook.handles(event) {
            return;
        }
        let body = serde_json::to_string(&body).unwrap_or_default();
        if self
            .tx
            .try_send(Delivery { event, hook, body })
            .is_err()
        {
            tracing::warn!("webhook delivery queue full, dropping delivery");
        }
    }
}

impl EventSink for WebhookRunner {
    /// Fans a fired event out to every active hook that subscribes to
    /// it. For `allow`, an optional `status_word` field in the payload
    /// (`"allow"`/`"reject"`/`"tarpit"`) is matched against the hook's
    /// `allow_filter`.
    fn emit(&self, event: &str, payload: serde_json::Value) {
        let Some(kind) = parse_event(event) else {
            return;
        };
        let status_word = payload.get("status_word").and_then(|v| v.as_str());
        for hook in self.hooks.values() {
            if !hook.is_active() || !hook.handles(kind) {
                continue;
            }
            if kind == WebHookEvent::Allow {
                if let Some(word) = status_word {
                    if !hook.allow_filter_matches(word) {
                        continue;
                    }
                }
            }
            self.run_hook(kind, hook.clone(), payload.clone());
        }
    }
}

async fn dispatch(client: &reqwest::Client, delivery: Delivery) {
    let Delivery { event, hook, body } = delivery;
    let Some(url) = hook.url() else {
        hook.record_failure();
        tracing::warn!(hook = %hook.id, "webhook has no configured url");
        return;
    };

    let iso_ts = chrono::Utc::now().to_rfc3339();
    let delivery_id_input = format!("{iso_ts}{}{}", hook.id, event.as_str());
    let delivery_hash = Sha256::digest(delivery_id_input.as_bytes());
    let delivery_header = base64::engine::general_purpose::STANDARD.encode(delivery_hash);

    let mut req = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("X-Wforce-Event", event.as_str())
        .header("X-Wforce-HookID", &hook.id)
        .header("X-Wforce-Delivery", delivery_header)
        .body(body.clone());

    if let Some(secret) = hook.secret() {
        if let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) {
            mac.update(body.as_bytes());
            let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
            req = req.header("X-Wforce-Signature", sig);
        }
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            hook.record_success();
        }
        Ok(resp) => {
            hook.record_failure();
            tracing::warn!(hook = %hook.id, status = %resp.status(), "webhook delivery rejected");
        }
        Err(e) => {
            hook.record_failure();
            tracing::warn!(hook = %hook.id, error = %e, "webhook delivery failed");
        }
    }
}
