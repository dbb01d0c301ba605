use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use wforce_domain::LoginEvent;

use crate::engine::{AllowVerdict, PolicyEngine, NullPolicy};

/// One holder: an independent policy-engine instance guarded by its
/// own mutex.
struct Holder {
    engine: Mutex<Box<dyn PolicyEngine>>,
}

/// Pool of `N` policy-instance holders, dispatched by strict
/// round-robin on an atomic counter modulo `N`.
///
/// A single interpreter would serialise all work; one per worker would
/// explode memory and complicate hot reloads — the pool is the
/// middle ground the original strikes.
pub struct PolicyDispatcher {
    holders: Vec<Holder>,
    counter: AtomicUsize,
}

impl PolicyDispatcher {
    /// Builds a pool of `n` holders (minimum 1), each initialised via
    /// `factory`.
    pub fn new(n: usize, mut factory: impl FnMut() -> Box<dyn PolicyEngine>) -> Self {
        let n = n.max(1);
        let holders = (0..n)
            .map(|_| Holder {
                engine: Mutex::new(factory()),
            })
            .collect();
        Self {
            holders,
            counter: AtomicUsize::new(0),
        }
    }

    /// The default pool: every holder is a [`NullPolicy`].
    pub fn null(n: usize) -> Self {
        Self::new(n, || Box::new(NullPolicy))
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    fn next_index(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.holders.len()
    }

    pub fn allow(&self, event: &LoginEvent) -> AllowVerdict {
        let idx = self.next_index();
        self.holders[idx].engine.lock().allow(event)
    }

    pub fn report(&self, event: &LoginEvent) {
        let idx = self.next_index();
        self.holders[idx].engine.lock().report(event);
    }

    pub fn reset(&self, reset_type: &str, login: &str, ip: &str) -> bool {
        let idx = self.next_index();
        self.holders[idx].engine.lock().reset(reset_type, login, ip)
    }

    pub fn canonicalize(&self, login: &str) -> String {
        let idx = self.next_index();
        self.holders[idx].engine.lock().canonicalize(login)
    }

    pub fn custom_endpoint(
        &self,
        name: &str,
        body: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        let idx = self.next_index();
        self.holders[idx].engine.lock().custom_endpoint(name, body)
    }

    /// Atomically replaces the engine in holder `idx`. Reload itself
    /// (watching a script file, re-parsing) is out of scope of this
    /// spec; this is the seam that a reload mechanism would call
    ///.
    pub fn replace(&self, idx: usize, engine: Box<dyn PolicyEngine>) {
        if let Some(holder) = self.holders.get(idx) {
            *holder.engine.lock() = engine;
        }
    }

    /// Executes `f` against every holder in turn under its own lock,
    /// used by the control channel to run a command against every
    /// pool interpreter.
    pub fn for_each<R>(&self, mut f: impl FnMut(usize, &mut dyn PolicyEngine) -> R) -> Vec<R> {
        self.holders
            .iter()
            .enumerate()
            .map(|(i, h)| f(i, &mut **h.engine.lock()))
            .collect()
    }

    /// Runs `command` against every holder in the pool, per spec.md
    /// §4.7 ("executes the received command string ... against every
    /// pool interpreter"). There is no separate "global" interpreter
    /// distinct from the pool in this rewrite (see DESIGN.md); holder
    /// 0 doubles as the global one, so its output is listed first.
    pub fn admin_eval_all(&self, command: &str) -> Vec<String> {
        self.for_each(|_, engine| engine.admin_eval(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_holders() {
        let d = PolicyDispatcher::null(3);
        let indices: Vec<usize> = (0..6).map(|_| d.next_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn null_policy_allows_everything() {
        let d = PolicyDispatcher::null(2);
        let event = LoginEvent {
            login: "alice".into(),
            pwhash: String::new(),
            remote: "203.0.113.7".parse().unwrap(),
            t: None,
            success: true,
            policy_reject: false,
            protocol: "imap".into(),
            tls: true,
            device_id: String::new(),
            device_attrs: None,
            attrs: Default::default(),
            canon_login: "alice".into(),
        };
        let verdict = d.allow(&event);
        assert_eq!(verdict.status, 0);
    }
}
