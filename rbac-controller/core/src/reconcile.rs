use crate::store::{CreateError, Created, ObjectStore};
use rbac_controller_k8s_api::{rbac, Namespace, ResourceExt};
use thiserror::Error;

/// A namespace lifecycle event, as observed from the cluster.
#[derive(Clone, Debug)]
pub enum NamespaceEvent {
    Added(Namespace),
    Updated(Namespace),
    Deleted(Namespace),
}

/// Ensures that each namespace holds its baseline RBAC objects.
#[derive(Clone, Debug)]
pub struct Reconciler<S> {
    store: S,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Synchronized {
    /// The namespace is being deleted and was left untouched.
    Terminating,

    /// Every baseline object was either created or found to exist already.
    Applied { created: usize, existing: usize },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("namespace has no name")]
    Unnamed,

    #[error("failed to create {kind} {namespace}/{name}: {source}")]
    Create {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: CreateError,
    },
}

// === impl NamespaceEvent ===

impl NamespaceEvent {
    pub fn namespace(&self) -> &Namespace {
        match self {
            Self::Added(ns) | Self::Updated(ns) | Self::Deleted(ns) => ns,
        }
    }
}

// === impl Reconciler ===

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Applies an event: additions and updates are synchronized, deletions
    /// are only logged.
    pub async fn handle(
        &self,
        event: NamespaceEvent,
    ) -> Result<Option<Synchronized>, SyncError> {
        match event {
            NamespaceEvent::Added(ns) => {
                tracing::debug!(namespace = %ns.name_any(), "Namespace added");
                self.synchronize(&ns).await.map(Some)
            }
            NamespaceEvent::Updated(ns) => {
                tracing::debug!(namespace = %ns.name_any(), "Namespace updated");
                self.synchronize(&ns).await.map(Some)
            }
            NamespaceEvent::Deleted(ns) => {
                tracing::info!(namespace = %ns.name_any(), "Namespace deleted");
                Ok(None)
            }
        }
    }

    /// Creates the namespace's Role and RoleBindings.
    ///
    /// Objects that already exist are left as they are. The first failure
    /// stops the remaining writes and is returned; the namespace is picked up
    /// again on its next event or resync.
    pub async fn synchronize(&self, ns: &Namespace) -> Result<Synchronized, SyncError> {
        if ns.metadata.deletion_timestamp.is_some() {
            tracing::debug!(namespace = %ns.name_any(), "Skipping terminating namespace");
            return Ok(Synchronized::Terminating);
        }
        let namespace = ns.metadata.name.as_deref().ok_or(SyncError::Unnamed)?;

        let mut created = 0;
        let mut existing = 0;
        for object in rbac::namespace_baseline(namespace) {
            let kind = object.kind();
            let name = object.name().to_string();
            match self.store.create(object).await {
                Ok(Created::Created) => {
                    tracing::info!(%namespace, %name, "Created {kind}");
                    created += 1;
                }
                Ok(Created::AlreadyExists) => {
                    tracing::debug!(%namespace, %name, "{kind} already exists");
                    existing += 1;
                }
                Err(source) => {
                    return Err(SyncError::Create {
                        kind,
                        namespace: namespace.to_string(),
                        name,
                        source,
                    });
                }
            }
        }

        Ok(Synchronized::Applied { created, existing })
    }
}

// === impl SyncError ===

impl SyncError {
    /// Indicates whether the failure may clear up without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unnamed => false,
            Self::Create { source, .. } => source.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockStore};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn creates_baseline_for_new_namespace() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());

        let res = reconciler
            .synchronize(&mock::namespace("team-a"))
            .await
            .unwrap();
        assert_eq!(
            res,
            Synchronized::Applied {
                created: 3,
                existing: 0
            }
        );

        assert_eq!(
            store.object_ids(),
            vec![
                "Role team-a/default-role",
                "RoleBinding team-a/team-a-rolebinding",
                "RoleBinding team-a/team-a-rolebinding-sa",
            ]
        );
        assert_eq!(
            store.role("team-a", "default-role"),
            Some(rbac::role("team-a"))
        );

        let user = store.role_binding("team-a", "team-a-rolebinding").unwrap();
        assert_eq!(user.role_ref.name, "default-role");
        let subject = &user.subjects.as_ref().unwrap()[0];
        assert_eq!(
            (subject.kind.as_str(), subject.name.as_str()),
            ("User", "team-a")
        );

        let sa = store.role_binding("team-a", "team-a-rolebinding-sa").unwrap();
        assert_eq!(sa.role_ref.name, "default-role");
        let subject = &sa.subjects.as_ref().unwrap()[0];
        assert_eq!(
            (
                subject.kind.as_str(),
                subject.name.as_str(),
                subject.namespace.as_deref()
            ),
            ("ServiceAccount", "default", Some("team-a"))
        );
    }

    #[tokio::test]
    async fn repeated_synchronize_is_idempotent() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());
        let ns = mock::namespace("team-a");

        reconciler.synchronize(&ns).await.unwrap();
        let res = reconciler.synchronize(&ns).await.unwrap();
        assert_eq!(
            res,
            Synchronized::Applied {
                created: 0,
                existing: 3
            }
        );
        assert_eq!(store.object_ids().len(), 3);
        assert_eq!(store.calls(), 6);
    }

    #[tokio::test]
    async fn objects_created_out_of_band_are_accepted() {
        let store = MockStore::default();
        for object in rbac::namespace_baseline("team-a") {
            store.insert(object);
        }
        let reconciler = Reconciler::new(store.clone());

        let res = reconciler
            .handle(NamespaceEvent::Updated(mock::namespace("team-a")))
            .await
            .unwrap();
        assert_eq!(
            res,
            Some(Synchronized::Applied {
                created: 0,
                existing: 3
            })
        );
        assert_eq!(store.object_ids().len(), 3);
    }

    #[tokio::test]
    async fn terminating_namespace_is_not_written() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());

        let res = reconciler
            .handle(NamespaceEvent::Added(mock::terminating_namespace("team-b")))
            .await
            .unwrap();
        assert_eq!(res, Some(Synchronized::Terminating));
        assert_eq!(store.calls(), 0);
        assert!(store.object_ids().is_empty());
    }

    #[tokio::test]
    async fn role_failure_skips_bindings() {
        let store = MockStore::default();
        store.fail_kind("Role", mock::forbidden());
        let reconciler = Reconciler::new(store.clone());

        let err = reconciler
            .synchronize(&mock::namespace("team-a"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        match err {
            SyncError::Create {
                kind,
                namespace,
                name,
                ..
            } => {
                assert_eq!(kind, "Role");
                assert_eq!(namespace, "team-a");
                assert_eq!(name, "default-role");
            }
            err => panic!("unexpected error: {err}"),
        }
        assert_eq!(store.calls(), 1);
        assert!(store.object_ids().is_empty());
    }

    #[tokio::test]
    async fn binding_failure_keeps_role() {
        let store = MockStore::default();
        store.fail_kind("RoleBinding", mock::unavailable());
        let reconciler = Reconciler::new(store.clone());

        let err = reconciler
            .synchronize(&mock::namespace("team-a"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.calls(), 2);
        assert_eq!(store.object_ids(), vec!["Role team-a/default-role"]);
    }

    #[tokio::test]
    async fn unnamed_namespace_is_rejected() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());

        let err = reconciler
            .synchronize(&Namespace::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unnamed));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn deletion_marker_is_checked_before_name() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());

        let mut ns = mock::terminating_namespace("team-b");
        ns.metadata.name = None;
        let res = reconciler.synchronize(&ns).await.unwrap();
        assert_eq!(res, Synchronized::Terminating);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn deletion_is_not_written() {
        let store = MockStore::default();
        let reconciler = Reconciler::new(store.clone());

        let res = reconciler
            .handle(NamespaceEvent::Deleted(mock::namespace("team-a")))
            .await
            .unwrap();
        assert_eq!(res, None);
        assert_eq!(store.calls(), 0);
    }
}
