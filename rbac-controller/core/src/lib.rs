#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod reconcile;
mod store;

pub use self::{
    reconcile::{NamespaceEvent, Reconciler, SyncError, Synchronized},
    store::{CreateError, Created, ObjectStore},
};
