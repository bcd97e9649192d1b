#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod rbac;

pub use self::rbac::RbacObject;
pub use k8s_openapi::api::{
    self,
    core::v1::Namespace,
    rbac::v1::{
        ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
    },
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, PostParams, ResourceExt},
    core::ErrorResponse,
    runtime::{watcher, WatchStreamExt},
    Client, Error, Resource,
};
