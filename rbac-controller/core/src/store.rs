use rbac_controller_k8s_api::RbacObject;
use thiserror::Error;

/// Writes RBAC objects to the cluster.
///
/// Implementations must report an object that already exists as
/// [`Created::AlreadyExists`] rather than as an error.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create(&self, object: RbacObject) -> Result<Created, CreateError>;
}

/// The successful outcomes of a create request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Created {
    Created,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum CreateError {
    /// The API server refused the object, e.g. due to authorization or
    /// validation. Retrying the same request will not help.
    #[error("rejected with status {code} ({reason}): {message}")]
    Rejected {
        code: u16,
        reason: String,
        message: String,
    },

    /// The request did not complete, e.g. due to a transport failure, a
    /// timeout or an overloaded server.
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

// === impl CreateError ===

impl CreateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    async fn create(&self, object: RbacObject) -> Result<Created, CreateError> {
        (**self).create(object).await
    }
}
