// Reference resolution backends
//
// The engine treats the definition store as an async batched key-to-value
// lookup. Errors for unknown identifiers travel per-identifier inside the
// returned envelopes; only transport failures fail a whole batch.

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use zobject::envelope::Envelope;
use zobject::error::{ErrorKind, RuntimeResult, ZError};
use zobject::value::ZObject;

/// External collaborator interface: symbolic identifier to stored definition.
/// Must be idempotent and side-effect-free from the engine's perspective.
#[async_trait(?Send)]
pub trait ReferenceResolver {
    async fn dereference(&self, zids: &[String]) -> RuntimeResult<HashMap<String, Envelope>>;
}

/// Wiki-backed resolver: GET `{endpoint}?zids=a|b|c`, response body is a JSON
/// map from ZID to definition payload.
pub struct HttpReferenceResolver {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpReferenceResolver {
    pub fn new(endpoint: &str) -> Self {
        HttpReferenceResolver {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait(?Send)]
impl ReferenceResolver for HttpReferenceResolver {
    async fn dereference(&self, zids: &[String]) -> RuntimeResult<HashMap<String, Envelope>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("zids", zids.join("|"))])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                ZError::new(
                    ErrorKind::ReferenceNotFound,
                    format!("resolver request failed: {}", e),
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ZError::new(
                ErrorKind::ReferenceNotFound,
                format!("resolver answered {}", status),
            ));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| {
            ZError::new(
                ErrorKind::ReferenceNotFound,
                format!("resolver response was not JSON: {}", e),
            )
        })?;
        let map = body.as_object().ok_or_else(|| {
            ZError::new(
                ErrorKind::ReferenceNotFound,
                "resolver response was not a JSON object",
            )
        })?;
        let mut out = HashMap::with_capacity(zids.len());
        for zid in zids {
            let envelope = match map.get(zid) {
                Some(json) => match ZObject::from_json(json) {
                    Ok(z) => Envelope::value(z),
                    Err(e) => Envelope::error(e),
                },
                None => Envelope::error(ZError::new(
                    ErrorKind::ReferenceNotFound,
                    format!("{} not found", zid),
                )),
            };
            out.insert(zid.clone(), envelope);
        }
        Ok(out)
    }
}

/// In-memory resolver for tests and fixtures. Counts batches so memoization
/// properties can be asserted.
#[derive(Default)]
pub struct StaticReferenceResolver {
    definitions: HashMap<String, ZObject>,
    batches: Cell<u64>,
    requested: RefCell<Vec<String>>,
}

impl StaticReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zid: &str, definition: ZObject) {
        self.definitions.insert(zid.to_string(), definition);
    }

    pub fn with(mut self, zid: &str, definition: ZObject) -> Self {
        self.insert(zid, definition);
        self
    }

    pub fn batches(&self) -> u64 {
        self.batches.get()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

#[async_trait(?Send)]
impl ReferenceResolver for StaticReferenceResolver {
    async fn dereference(&self, zids: &[String]) -> RuntimeResult<HashMap<String, Envelope>> {
        self.batches.set(self.batches.get() + 1);
        self.requested.borrow_mut().extend(zids.iter().cloned());
        let mut out = HashMap::with_capacity(zids.len());
        for zid in zids {
            let envelope = match self.definitions.get(zid) {
                Some(definition) => Envelope::value(definition.clone()),
                None => Envelope::error(ZError::new(
                    ErrorKind::ReferenceNotFound,
                    format!("{} not found", zid),
                )),
            };
            out.insert(zid.clone(), envelope);
        }
        Ok(out)
    }
}

/// Per-request memoization layer over any resolver: a ZID is fetched from the
/// backend at most once per orchestration.
pub struct CachingResolver {
    inner: Rc<dyn ReferenceResolver>,
    cache: RefCell<HashMap<String, Envelope>>,
}

impl CachingResolver {
    pub fn new(inner: Rc<dyn ReferenceResolver>) -> Self {
        CachingResolver {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

#[async_trait(?Send)]
impl ReferenceResolver for CachingResolver {
    async fn dereference(&self, zids: &[String]) -> RuntimeResult<HashMap<String, Envelope>> {
        let mut out = HashMap::with_capacity(zids.len());
        let missing: Vec<String> = {
            let cache = self.cache.borrow();
            zids.iter()
                .filter(|zid| {
                    if let Some(hit) = cache.get(*zid) {
                        out.insert((*zid).clone(), hit.clone());
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            let fetched = self.inner.dereference(&missing).await?;
            let mut cache = self.cache.borrow_mut();
            for (zid, envelope) in fetched {
                cache.insert(zid.clone(), envelope.clone());
                out.insert(zid, envelope);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_answers_per_zid() {
        let resolver = StaticReferenceResolver::new().with("Z41", ZObject::boolean(true));
        let out = resolver
            .dereference(&["Z41".to_string(), "Z999".to_string()])
            .await
            .unwrap();
        assert!(!out["Z41"].is_error());
        assert!(out["Z999"].is_error());
        assert_eq!(resolver.batches(), 1);
    }

    #[tokio::test]
    async fn caching_resolver_hits_backend_once_per_zid() {
        let backend = Rc::new(StaticReferenceResolver::new().with("Z41", ZObject::boolean(true)));
        let caching = CachingResolver::new(backend.clone());
        caching.dereference(&["Z41".to_string()]).await.unwrap();
        caching.dereference(&["Z41".to_string()]).await.unwrap();
        assert_eq!(backend.batches(), 1);
    }
}
