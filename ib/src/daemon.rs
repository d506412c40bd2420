//! Daemon wiring
//!
//! Builds the component graph from configuration and runs the polling
//! service until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::deps::DepResolver;
use crate::events::{EventLog, NotificationBus, Notifier, spawn_notice_logger};
use crate::github::{GithubClient, RepoService};
use crate::metrics::Metrics;
use crate::poller::{PollService, PollServiceConfig};
use crate::state::StateManager;
use crate::tools::{CodegenCommand, CodegenTool, ReviewerCommand, ReviewerTool};
use crate::workflow::{IssueLocks, IterationManager, WorkflowEngine};

/// The wired component graph
pub struct Components {
    pub state: StateManager,
    pub bus: NotificationBus,
    pub events: EventLog,
    pub notifier: Notifier,
    pub github: Arc<dyn RepoService>,
    pub codegen: Arc<dyn CodegenTool>,
    pub reviewer: Arc<dyn ReviewerTool>,
    pub engine: Arc<WorkflowEngine>,
    pub resolver: DepResolver,
    pub metrics: Arc<Metrics>,
}

/// Build every component and seed the store with the configured repos
pub async fn build(config: &Config) -> Result<Components> {
    let state = StateManager::spawn(&config.storage.store_path).context("opening issue store")?;

    for repo_config in &config.repos {
        let repo = repo_config.to_watched_repo();
        let id = state
            .upsert_repo(repo.clone())
            .await
            .context("seeding watched repo")?;
        info!(repo = %repo.full_name(), id, "watching repo");
    }

    let bus = NotificationBus::with_default_capacity();
    spawn_notice_logger(&bus);
    let notifier = bus.notifier();
    let events = EventLog::new(state.clone());
    let metrics = Metrics::new();

    let github: Arc<dyn RepoService> = Arc::new(
        GithubClient::new(&config.github.api_base, &config.github.clone_base, config.github_token())
            .context("building upstream client")?,
    );

    let mut codegen = CodegenCommand::new(&config.codegen.command);
    codegen.args = config.codegen.args.clone();
    codegen.timeout = Duration::from_secs(config.codegen.timeout_secs);
    if let Ok(key) = std::env::var(&config.codegen.api_key_env) {
        codegen.env.push((config.codegen.api_key_env.clone(), key));
    }
    let codegen: Arc<dyn CodegenTool> = Arc::new(codegen);

    let mut reviewer = ReviewerCommand::new(&config.reviewer.command, &config.reviewer.model);
    reviewer.args = config.reviewer.args.clone();
    reviewer.timeout = Duration::from_secs(config.reviewer.timeout_secs);
    if let Ok(key) = std::env::var(&config.reviewer.api_key_env) {
        reviewer.env.push((config.reviewer.api_key_env.clone(), key));
    }
    let reviewer: Arc<dyn ReviewerTool> = Arc::new(reviewer);

    let budget = IterationManager::new(state.clone(), github.clone(), events.clone(), notifier.clone());
    let engine = Arc::new(WorkflowEngine::new(
        state.clone(),
        github.clone(),
        codegen.clone(),
        reviewer.clone(),
        budget,
        events.clone(),
        notifier.clone(),
        metrics.clone(),
        IssueLocks::new(),
        config.storage.work_dir.clone(),
    ));
    let resolver = DepResolver::new(github.clone(), state.clone(), events.clone());

    Ok(Components {
        state,
        bus,
        events,
        notifier,
        github,
        codegen,
        reviewer,
        engine,
        resolver,
        metrics,
    })
}

fn poll_service(config: &Config, components: &Components) -> PollService {
    PollService::new(
        PollServiceConfig {
            interval_secs: config.poll.interval_secs,
            max_concurrent_workflows: config.poll.max_concurrent_workflows,
        },
        components.state.clone(),
        components.github.clone(),
        components.resolver.clone(),
        components.engine.clone(),
        components.events.clone(),
        components.notifier.clone(),
        components.metrics.clone(),
    )
}

/// Run the daemon in the foreground until SIGINT
pub async fn run(config: &Config) -> Result<()> {
    config.validate()?;
    let components = build(config).await?;
    let mut poller = poll_service(config, &components);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(()).await;
        }
    });

    poller.run(shutdown_rx).await?;
    components.state.shutdown().await;
    Ok(())
}

/// One poll cycle, waiting for every dispatched workflow to finish
pub async fn run_once(config: &Config) -> Result<()> {
    config.validate()?;
    let components = build(config).await?;
    let mut poller = poll_service(config, &components);

    poller.poll_once().await?;
    poller.drain().await;
    components.state.shutdown().await;
    Ok(())
}
