pub use rbac_controller_core as core;
pub use rbac_controller_k8s_api as k8s;

mod args;
mod store;
pub mod supervisor;
mod watch;

pub use self::{
    args::Args,
    store::KubeStore,
    watch::{ListNamespaces, NamespaceWatch, State, WatchError},
};
