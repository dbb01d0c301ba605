//! Optional external persistent mirror.
//!
//! The backing store's own wire protocol is out of scope; this crate only needs a seam that exercises the hook:
//! `<prefix>:<keySpace>:<canonicalKey>` -> `<expiryEpoch>:<reason>`.

use async_trait::async_trait;
use wforce_domain::Result;

#[async_trait]
pub trait PersistBackend: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Scans every key under `prefix` and returns `(suffix, value)`
    /// pairs, used by `loadPersistEntries` at startup.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// In-memory stand-in, mainly for tests and for operators who don't
/// need cross-process persistence but still want the hook exercised.
#[derive(Default)]
pub struct InMemoryPersist {
    data: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl PersistBackend for InMemoryPersist {
    async fn put(&self, key: &str, value: &str, _ttl_secs: i64) -> Result<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .data
            .lock()
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|suffix| (suffix.to_string(), v.clone()))
            })
            .collect())
    }
}

/// Talks to an external HTTP key-value service. The wire format of
/// that service is external-collaborator territory; this issues plain
/// GET/PUT/DELETE against `{base_url}/{key}` with a `ttl` query param,
/// which is enough to exercise C2's persistence hook end to end.
pub struct HttpKvPersist {
    base_url: String,
    client: reqwest::Client,
}

impl HttpKvPersist {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PersistBackend for HttpKvPersist {
    async fn put(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        self.client
            .put(format!("{}/{}", self.base_url, key))
            .query(&[("ttl", ttl_secs.to_string())])
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| wforce_domain::Error::PersistUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete(format!("{}/{}", self.base_url, key))
            .send()
            .await
            .map_err(|e| wforce_domain::Error::PersistUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let resp = self
            .client
            .get(format!("{}/scan", self.base_url))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|e| wforce_domain::Error::PersistUnavailable(e.to_string()))?;
        let pairs: Vec<(String, String)> = resp
            .json()
            .await
            .map_err(|e| wforce_domain::Error::PersistUnavailable(e.to_string()))?;
        Ok(pairs)
    }
}
