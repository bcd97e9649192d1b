//! Process lifecycle for the namespace watch.
//!
//! The watch runs on its own task and is handed a shutdown [`Watch`]. It
//! completes either because it failed or because a termination signal was
//! received and the watch was drained. A second signal while draining
//! abandons the watch.

use crate::watch::WatchError;
use kubert::shutdown::Watch;
use std::{fmt, future::Future};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("namespace watch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("aborted before the namespace watch drained")]
    Aborted,
}

/// Runs the task built by `spawn` until it fails or `shutdown` completes.
///
/// `shutdown` resolves once the task has released `watch` after a signal, or
/// with an error if the process was signaled again while waiting. In the
/// latter case the task is aborted.
pub async fn run<S, E, W, F>(shutdown: S, watch: Watch, spawn: W) -> Result<(), Error>
where
    S: Future<Output = Result<(), E>>,
    E: fmt::Display,
    W: FnOnce(Watch) -> F,
    F: Future<Output = Result<(), WatchError>> + Send + 'static,
{
    let mut task = tokio::spawn(spawn(watch));

    tokio::select! {
        res = shutdown => match res {
            Ok(()) => {
                info!("Namespace watch drained");
                task.await?.map_err(Into::into)
            }
            Err(error) => {
                warn!(%error, "Abandoning namespace watch");
                task.abort();
                Err(Error::Aborted)
            }
        },

        res = &mut task => {
            debug!("Namespace watch completed");
            res?.map_err(Into::into)
        }
    }
}
