use crate::{
    core::Reconciler,
    k8s::{self, watcher, WatchStreamExt},
    store::KubeStore,
    supervisor,
    watch::NamespaceWatch,
};
use anyhow::{bail, Result};
use clap::Parser;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "rbac-controller",
    about = "Maintains a baseline Role and RoleBindings in every namespace"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "rbac_controller=info,warn",
        env = "RBAC_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    // Without `--kubeconfig`, the default kubeconfig search and then the
    // in-cluster configuration are used. Control-plane hosts pass
    // `--kubeconfig /etc/kubernetes/admin.conf`.
    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Interval between full resyncs of all namespaces.
    #[clap(long, default_value = "300")]
    resync_period_secs: u64,

    /// Limits how long a single create request may take.
    #[clap(long, default_value = "10000")]
    create_timeout_ms: u64,

    #[clap(long, default_value = "rbac-controller")]
    field_manager: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            resync_period_secs,
            create_timeout_ms,
            field_manager,
        } = self;

        if resync_period_secs == 0 {
            bail!("--resync-period-secs must be greater than zero");
        }
        let resync_period = Duration::from_secs(resync_period_secs);

        log_format.try_init(log_level)?;

        let client = client.try_client().await?;
        let (shutdown, drain) = kubert::shutdown::sigint_or_sigterm()?;

        let store = KubeStore::new(
            client.clone(),
            field_manager,
            Duration::from_millis(create_timeout_ms),
        );
        let namespaces = k8s::Api::<k8s::Namespace>::all(client);
        let events =
            watcher::watcher(namespaces.clone(), watcher::Config::default()).default_backoff();
        let watch = NamespaceWatch::new(Reconciler::new(store), namespaces, resync_period);

        info!(?resync_period, "Watching namespaces");
        supervisor::run(shutdown.signaled(), drain, move |drain| {
            watch
                .run(events, drain)
                .instrument(info_span!("namespaces"))
        })
        .await?;

        Ok(())
    }
}
