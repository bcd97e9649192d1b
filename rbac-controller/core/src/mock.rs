//! An in-memory [`ObjectStore`] for tests.

use crate::store::{CreateError, Created, ObjectStore};
use parking_lot::Mutex;
use rbac_controller_k8s_api::{Namespace, RbacObject, Role, RoleBinding};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;

/// Records created objects and reports duplicates as already existing.
#[derive(Clone, Debug)]
pub struct MockStore {
    inner: Arc<Mutex<Inner>>,
    started: Arc<watch::Sender<usize>>,
    finished: Arc<watch::Sender<usize>>,
    held: Arc<watch::Sender<bool>>,
}

/// A failure to inject for every create of a given kind.
#[derive(Copy, Clone, Debug)]
pub enum Failure {
    Rejected { code: u16, reason: &'static str },
    Transient,
}

#[derive(Debug, Default)]
struct Inner {
    objects: Vec<RbacObject>,
    failures: HashMap<&'static str, Failure>,
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: rbac_controller_k8s_api::ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn terminating_namespace(name: &str) -> Namespace {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "deletionTimestamp": "2024-01-01T00:00:00Z",
        },
        "status": { "phase": "Terminating" },
    }))
    .expect("namespace must deserialize")
}

pub fn forbidden() -> Failure {
    Failure::Rejected {
        code: 403,
        reason: "Forbidden",
    }
}

pub fn unavailable() -> Failure {
    Failure::Transient
}

// === impl MockStore ===

impl Default for MockStore {
    fn default() -> Self {
        Self {
            inner: Default::default(),
            started: Arc::new(watch::channel(0).0),
            finished: Arc::new(watch::channel(0).0),
            held: Arc::new(watch::channel(false).0),
        }
    }
}

impl MockStore {
    /// Stores an object as if it had been created out-of-band.
    pub fn insert(&self, object: RbacObject) {
        self.inner.lock().objects.push(object);
    }

    pub fn fail_kind(&self, kind: &'static str, failure: Failure) {
        self.inner.lock().failures.insert(kind, failure);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Blocks subsequent creates until [`MockStore::release`] is called.
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// The number of completed create calls.
    pub fn calls(&self) -> usize {
        *self.finished.borrow()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|calls| *calls >= n).await;
    }

    /// Waits until `n` create calls have been issued, whether or not they
    /// have completed.
    pub async fn wait_for_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|calls| *calls >= n).await;
    }

    /// Identifies stored objects in creation order.
    pub fn object_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .objects
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        self.find(namespace, name).and_then(|o| match o {
            RbacObject::Role(role) => Some(role),
            _ => None,
        })
    }

    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.find(namespace, name).and_then(|o| match o {
            RbacObject::RoleBinding(binding) => Some(binding),
            _ => None,
        })
    }

    fn find(&self, namespace: &str, name: &str) -> Option<RbacObject> {
        self.inner
            .lock()
            .objects
            .iter()
            .find(|o| o.namespace() == Some(namespace) && o.name() == name)
            .cloned()
    }

    fn apply(&self, object: RbacObject) -> Result<Created, CreateError> {
        let mut inner = self.inner.lock();
        match inner.failures.get(object.kind()) {
            Some(Failure::Rejected { code, reason }) => {
                return Err(CreateError::Rejected {
                    code: *code,
                    reason: reason.to_string(),
                    message: format!("cannot create {object}"),
                });
            }
            Some(Failure::Transient) => {
                return Err(CreateError::Transient(anyhow::anyhow!(
                    "connection reset while creating {object}"
                )));
            }
            None => {}
        }

        let exists = inner.objects.iter().any(|o| {
            o.kind() == object.kind()
                && o.namespace() == object.namespace()
                && o.name() == object.name()
        });
        if exists {
            return Ok(Created::AlreadyExists);
        }
        inner.objects.push(object);
        Ok(Created::Created)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn create(&self, object: RbacObject) -> Result<Created, CreateError> {
        self.started.send_modify(|n| *n += 1);
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let res = self.apply(object);
        self.finished.send_modify(|n| *n += 1);
        res
    }
}
