//! Builders for the authorization objects maintained for each namespace.
//!
//! Every builder is a pure function of its inputs so that repeated calls
//! yield identical objects; the API server only ever sees the same desired
//! state for a given namespace.

use crate::{
    ClusterRole, ClusterRoleBinding, ObjectMeta, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};

pub const API_GROUP: &str = "rbac.authorization.k8s.io";

/// Name of the Role created in every namespace.
pub const DEFAULT_ROLE_NAME: &str = "default-role";

/// Name of the (dormant) ClusterRole that grants namespace management.
pub const NAMESPACE_CREATOR_NAME: &str = "namespace-creater";

const ALL: &str = "*";
const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// One of the RBAC objects this controller knows how to submit.
#[derive(Clone, Debug, PartialEq)]
pub enum RbacObject {
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
}

/// Builds the Role granting every verb on every resource within `namespace`.
pub fn role(namespace: &str) -> Role {
    Role {
        metadata: namespaced_meta(DEFAULT_ROLE_NAME, namespace),
        rules: Some(vec![PolicyRule {
            verbs: vec![ALL.to_string()],
            api_groups: Some(vec![ALL.to_string()]),
            resources: Some(vec![ALL.to_string()]),
            ..Default::default()
        }]),
    }
}

/// Binds the user named after `namespace` to the default Role.
pub fn user_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: namespaced_meta(&format!("{namespace}-rolebinding"), namespace),
        role_ref: role_ref("Role", DEFAULT_ROLE_NAME),
        subjects: Some(vec![Subject {
            kind: "User".to_string(),
            name: namespace.to_string(),
            ..Default::default()
        }]),
    }
}

/// Binds the namespace's `default` ServiceAccount to the default Role.
pub fn service_account_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: namespaced_meta(&format!("{namespace}-rolebinding-sa"), namespace),
        role_ref: role_ref("Role", DEFAULT_ROLE_NAME),
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Builds the cluster-scoped role allowing full management of namespaces.
///
/// Not part of the per-namespace baseline.
pub fn namespace_creator_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(NAMESPACE_CREATOR_NAME.to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            verbs: vec![ALL.to_string()],
            api_groups: Some(vec![ALL.to_string()]),
            resources: Some(vec!["namespaces".to_string()]),
            ..Default::default()
        }]),
        aggregation_rule: None,
    }
}

/// Grants members of `group` the namespace-creator ClusterRole.
pub fn namespace_creator_cluster_role_binding(group: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(format!("{group}-{NAMESPACE_CREATOR_NAME}")),
            ..Default::default()
        },
        role_ref: role_ref("ClusterRole", NAMESPACE_CREATOR_NAME),
        subjects: Some(vec![Subject {
            kind: "Group".to_string(),
            name: group.to_string(),
            ..Default::default()
        }]),
    }
}

/// The objects every live namespace must hold, in submission order.
///
/// The Role comes first so that failures are reported against it before
/// any binding that refers to it.
pub fn namespace_baseline(namespace: &str) -> [RbacObject; 3] {
    [
        RbacObject::Role(role(namespace)),
        RbacObject::RoleBinding(user_role_binding(namespace)),
        RbacObject::RoleBinding(service_account_role_binding(namespace)),
    ]
}

fn namespaced_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: API_GROUP.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

// === impl RbacObject ===

impl RbacObject {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Role(_) => "Role",
            Self::RoleBinding(_) => "RoleBinding",
            Self::ClusterRole(_) => "ClusterRole",
            Self::ClusterRoleBinding(_) => "ClusterRoleBinding",
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// The owning namespace, or `None` for cluster-scoped objects.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Role(r) => &r.metadata,
            Self::RoleBinding(rb) => &rb.metadata,
            Self::ClusterRole(cr) => &cr.metadata,
            Self::ClusterRoleBinding(crb) => &crb.metadata,
        }
    }
}

impl std::fmt::Display for RbacObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{} {}/{}", self.kind(), ns, self.name()),
            None => write!(f, "{} {}", self.kind(), self.name()),
        }
    }
}

impl From<Role> for RbacObject {
    fn from(role: Role) -> Self {
        Self::Role(role)
    }
}

impl From<RoleBinding> for RbacObject {
    fn from(binding: RoleBinding) -> Self {
        Self::RoleBinding(binding)
    }
}

impl From<ClusterRole> for RbacObject {
    fn from(role: ClusterRole) -> Self {
        Self::ClusterRole(role)
    }
}

impl From<ClusterRoleBinding> for RbacObject {
    fn from(binding: ClusterRoleBinding) -> Self {
        Self::ClusterRoleBinding(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn role_grants_everything_in_namespace() {
        assert_eq!(
            serde_json::to_value(role("team-a")).unwrap(),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "Role",
                "metadata": {
                    "name": "default-role",
                    "namespace": "team-a",
                },
                "rules": [{
                    "apiGroups": ["*"],
                    "resources": ["*"],
                    "verbs": ["*"],
                }],
            })
        );
    }

    #[test]
    fn user_binding_references_default_role() {
        assert_eq!(
            serde_json::to_value(user_role_binding("team-a")).unwrap(),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "RoleBinding",
                "metadata": {
                    "name": "team-a-rolebinding",
                    "namespace": "team-a",
                },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "Role",
                    "name": "default-role",
                },
                "subjects": [{
                    "kind": "User",
                    "name": "team-a",
                }],
            })
        );
    }

    #[test]
    fn service_account_binding_targets_default_account() {
        assert_eq!(
            serde_json::to_value(service_account_role_binding("team-a")).unwrap(),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "RoleBinding",
                "metadata": {
                    "name": "team-a-rolebinding-sa",
                    "namespace": "team-a",
                },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "Role",
                    "name": "default-role",
                },
                "subjects": [{
                    "kind": "ServiceAccount",
                    "name": "default",
                    "namespace": "team-a",
                }],
            })
        );
    }

    #[test]
    fn namespace_creator_objects() {
        assert_eq!(
            serde_json::to_value(namespace_creator_cluster_role()).unwrap(),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRole",
                "metadata": { "name": "namespace-creater" },
                "rules": [{
                    "apiGroups": ["*"],
                    "resources": ["namespaces"],
                    "verbs": ["*"],
                }],
            })
        );
        assert_eq!(
            serde_json::to_value(namespace_creator_cluster_role_binding("ops")).unwrap(),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": { "name": "ops-namespace-creater" },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "ClusterRole",
                    "name": "namespace-creater",
                },
                "subjects": [{
                    "kind": "Group",
                    "name": "ops",
                }],
            })
        );
    }

    #[rstest]
    #[case("team-a")]
    #[case("kube-system")]
    #[case("a")]
    fn generators_are_deterministic(#[case] ns: &str) {
        assert_eq!(
            serde_json::to_vec(&role(ns)).unwrap(),
            serde_json::to_vec(&role(ns)).unwrap()
        );
        assert_eq!(user_role_binding(ns), user_role_binding(ns));
        assert_eq!(
            service_account_role_binding(ns),
            service_account_role_binding(ns)
        );
        assert_eq!(namespace_baseline(ns), namespace_baseline(ns));
    }

    #[test]
    fn baseline_order_and_identity() {
        let objects = namespace_baseline("team-b")
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            objects,
            vec![
                "Role team-b/default-role",
                "RoleBinding team-b/team-b-rolebinding",
                "RoleBinding team-b/team-b-rolebinding-sa",
            ]
        );
        assert_eq!(
            RbacObject::from(namespace_creator_cluster_role()).to_string(),
            "ClusterRole namespace-creater"
        );
    }
}
