use crate::{
    core::{NamespaceEvent, ObjectStore, Reconciler, Synchronized},
    k8s::{self, watcher, Namespace, ResourceExt},
};
use anyhow::Result;
use futures::prelude::*;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tokio::time;

/// Lists every namespace in the cluster.
#[async_trait::async_trait]
pub trait ListNamespaces: Send + Sync {
    async fn list(&self) -> Result<Vec<Namespace>>;
}

/// Drives namespace events into a [`Reconciler`].
///
/// Incremental watch events are complemented by a periodic full listing so
/// that a namespace whose events were missed while the watch was
/// disconnected is still synchronized within one resync period.
#[derive(Debug)]
pub struct NamespaceWatch<S, L> {
    reconciler: Reconciler<S>,
    lister: L,
    resync_period: time::Duration,
    state: State,

    /// Set once the first listing completes. Watch errors before then mean
    /// the subscription could not be established.
    established: bool,

    /// Names of namespaces that have been observed, used to tell additions
    /// from updates.
    known: HashSet<String>,

    /// Names observed during the current (re)list.
    listed: HashSet<String>,

    /// Synthetic events produced by a resync, delivered one at a time.
    backlog: VecDeque<NamespaceEvent>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Waiting for the watch to deliver its first listing.
    Initializing,

    /// Delivering a full listing of namespaces.
    Syncing,

    /// Delivering incremental events.
    Watching,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to establish namespace watch: {0}")]
    Establish(#[source] watcher::Error),

    #[error("namespace watch terminated unexpectedly")]
    Terminated,
}

// === impl NamespaceWatch ===

impl<S, L> NamespaceWatch<S, L>
where
    S: ObjectStore,
    L: ListNamespaces,
{
    pub fn new(reconciler: Reconciler<S>, lister: L, resync_period: time::Duration) -> Self {
        Self {
            reconciler,
            lister,
            resync_period,
            state: State::Initializing,
            established: false,
            known: HashSet::new(),
            listed: HashSet::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Processes events until `shutdown` is signaled.
    ///
    /// The shutdown signal is only observed between deliveries, so a
    /// reconciliation that has started is allowed to complete. Fails if the
    /// watch can't be established or if the event stream ends.
    pub async fn run<E>(
        mut self,
        events: E,
        shutdown: kubert::shutdown::Watch,
    ) -> Result<(), WatchError>
    where
        E: Stream<Item = watcher::Result<watcher::Event<Namespace>>>,
    {
        tokio::pin!(events);
        let shutdown = shutdown.signaled();
        tokio::pin!(shutdown);

        let mut resyncs = time::interval_at(
            time::Instant::now() + self.resync_period,
            self.resync_period,
        );
        resyncs.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!(namespaces = self.known.len(), "Namespace watch stopped");
                    return Ok(());
                }

                _ = future::ready(()), if !self.backlog.is_empty() => {
                    if let Some(event) = self.backlog.pop_front() {
                        self.dispatch(event).await;
                    }
                }

                event = events.next() => match event {
                    Some(Ok(event)) => self.process(event).await,
                    Some(Err(error)) => self.watch_failed(error)?,
                    None => return Err(WatchError::Terminated),
                },

                _ = resyncs.tick() => self.resync().await,
            }
        }
    }

    async fn process(&mut self, event: watcher::Event<Namespace>) {
        match event {
            watcher::Event::Init => {
                tracing::debug!("Listing namespaces");
                self.state = State::Syncing;
                self.listed.clear();
            }

            watcher::Event::InitApply(ns) => {
                self.listed.insert(ns.name_any());
                let event = self.observed(ns);
                self.dispatch(event).await;
            }

            watcher::Event::InitDone => {
                // Anything that was known before the listing but missing from
                // it was deleted while the watch was disconnected.
                let mut vanished = self
                    .known
                    .difference(&self.listed)
                    .cloned()
                    .collect::<Vec<_>>();
                vanished.sort();
                for name in vanished {
                    self.known.remove(&name);
                    self.dispatch(NamespaceEvent::Deleted(tombstone(name))).await;
                }

                self.listed.clear();
                self.state = State::Watching;
                self.established = true;
                tracing::info!(namespaces = self.known.len(), "Namespace watch synced");
            }

            watcher::Event::Apply(ns) => {
                let event = self.observed(ns);
                self.dispatch(event).await;
            }

            watcher::Event::Delete(ns) => {
                self.known.remove(&ns.name_any());
                self.dispatch(NamespaceEvent::Deleted(ns)).await;
            }
        }
    }

    fn watch_failed(&self, error: watcher::Error) -> Result<(), WatchError> {
        if !self.established {
            return Err(WatchError::Establish(error));
        }

        // The watcher reconnects and replays on its own.
        tracing::warn!(%error, "Namespace watch failed");
        Ok(())
    }

    /// Queues an update for every namespace in the cluster.
    async fn resync(&mut self) {
        if self.state != State::Watching {
            tracing::debug!(state = ?self.state, "Skipping resync");
            return;
        }

        let namespaces = match self.lister.list().await {
            Ok(namespaces) => namespaces,
            Err(error) => {
                tracing::warn!(%error, "Failed to list namespaces for resync");
                return;
            }
        };

        tracing::debug!(namespaces = namespaces.len(), "Resyncing namespaces");
        for ns in namespaces {
            let event = self.observed(ns);
            self.backlog.push_back(event);
        }
    }

    fn observed(&mut self, ns: Namespace) -> NamespaceEvent {
        if self.known.insert(ns.name_any()) {
            NamespaceEvent::Added(ns)
        } else {
            NamespaceEvent::Updated(ns)
        }
    }

    async fn dispatch(&self, event: NamespaceEvent) {
        let namespace = event.namespace().name_any();
        match self.reconciler.handle(event).await {
            Ok(Some(Synchronized::Applied { created, existing })) => {
                tracing::debug!(%namespace, created, existing, "Synchronized namespace");
            }
            Ok(Some(Synchronized::Terminating)) | Ok(None) => {}
            Err(error) if error.is_transient() => {
                tracing::warn!(%namespace, %error, "Failed to synchronize namespace");
            }
            Err(error) => {
                tracing::error!(%namespace, %error, "Failed to synchronize namespace");
            }
        }
    }
}

#[async_trait::async_trait]
impl ListNamespaces for k8s::Api<Namespace> {
    async fn list(&self) -> Result<Vec<Namespace>> {
        let list = k8s::Api::list(self, &k8s::ListParams::default()).await?;
        Ok(list.items)
    }
}

fn tombstone(name: String) -> Namespace {
    Namespace {
        metadata: k8s::ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        ..Default::default()
    }
}
