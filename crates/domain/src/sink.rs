use serde_json::Value;

/// Fire-and-forget event sink, implemented by the webhook runner (C5)
/// and consumed by C1/C2 so those crates don't depend on C5 directly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}
