use crate::{
    core::{CreateError, Created, ObjectStore},
    k8s::{self, RbacObject},
};
use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tokio::time;

/// Creates RBAC objects through the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
    params: k8s::PostParams,
    timeout: time::Duration,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client, field_manager: impl ToString, timeout: time::Duration) -> Self {
        Self {
            client,
            params: k8s::PostParams {
                field_manager: Some(field_manager.to_string()),
                ..Default::default()
            },
            timeout,
        }
    }

    async fn create_with<K>(&self, api: k8s::Api<K>, object: &K) -> Result<Created, CreateError>
    where
        K: Clone + DeserializeOwned + Serialize + fmt::Debug,
    {
        match time::timeout(self.timeout, api.create(&self.params, object)).await {
            Ok(Ok(_)) => Ok(Created::Created),
            Ok(Err(error)) => classify(error),
            Err(_) => Err(CreateError::Transient(anyhow!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("field_manager", &self.params.field_manager)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn create(&self, object: RbacObject) -> Result<Created, CreateError> {
        let namespace = object.namespace().unwrap_or_default().to_string();
        match object {
            RbacObject::Role(role) => {
                let api = k8s::Api::namespaced(self.client.clone(), &namespace);
                self.create_with(api, &role).await
            }
            RbacObject::RoleBinding(binding) => {
                let api = k8s::Api::namespaced(self.client.clone(), &namespace);
                self.create_with(api, &binding).await
            }
            RbacObject::ClusterRole(role) => {
                let api = k8s::Api::all(self.client.clone());
                self.create_with(api, &role).await
            }
            RbacObject::ClusterRoleBinding(binding) => {
                let api = k8s::Api::all(self.client.clone());
                self.create_with(api, &binding).await
            }
        }
    }
}

/// Sorts an API failure into "already exists", a transient failure or a
/// permanent rejection.
fn classify(error: k8s::Error) -> Result<Created, CreateError> {
    let rsp = match error {
        k8s::Error::Api(rsp) => rsp,
        error => return Err(CreateError::Transient(error.into())),
    };

    if rsp.code == 409 && rsp.reason == "AlreadyExists" {
        return Ok(Created::AlreadyExists);
    }

    // Throttling and server-side failures may succeed on a later attempt.
    if rsp.code == 429 || rsp.code >= 500 {
        return Err(CreateError::Transient(anyhow!(
            "server responded with status {} ({}): {}",
            rsp.code,
            rsp.reason,
            rsp.message
        )));
    }

    Err(CreateError::Rejected {
        code: rsp.code,
        reason: rsp.reason.clone(),
        message: rsp.message.clone(),
    })
}
