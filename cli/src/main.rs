//! CLI entrypoint for Arena Relay
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result};
use clap::Parser;
use relay_application::{JobScheduler, JobStore, JobSupervisor};
use relay_domain::Severity;
use relay_infrastructure::{
    ConfigLoader, FileArtifactSink, FileConfig, FileJobStore, IDLE_CHECK_INTERVAL, ModelCatalog,
    RelaySettings, RelayState, SystemClock, build_backend_set, spawn_idle_monitor,
};
use relay_presentation::{AppState, Cli, Command, ConfigSource, JobsCommand, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli);

    if cli.show_config {
        ConfigLoader::print_config_sources();
        return Ok(());
    }

    let source = ConfigSource {
        path: cli.config.clone(),
        no_config: cli.no_config,
        ..ConfigSource::default()
    };
    let config = source
        .load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    for issue in config.validate() {
        match issue.severity {
            Severity::Error => error!("{}", issue.message),
            Severity::Warning => warn!("{}", issue.message),
        }
    }

    match cli.command() {
        Command::Serve { host, port } => serve(config, source, host, port).await,
        Command::Jobs { action } => inspect_jobs(&config, action).await,
    }
}

fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "arena-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

async fn serve(
    config: FileConfig,
    source: ConfigSource,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    info!("Starting Arena Relay");

    // === Dependency Injection ===
    let catalog = ModelCatalog::load(&config.server.models_file, &config.server.endpoint_map_file);
    let relay = Arc::new(RelayState::new(RelaySettings::from_config(&config), catalog));

    let clock = Arc::new(SystemClock);
    let (policy, _) = config.scheduler.parse_policy();
    let scheduler = Arc::new(JobScheduler::new(policy, clock.clone()));
    let store = FileJobStore::new(&config.jobs.dir)
        .with_context(|| format!("Cannot open job directory {}", config.jobs.dir.display()))?;
    let supervisor = Arc::new(
        JobSupervisor::new(
            Arc::new(store),
            Arc::new(FileArtifactSink::new(&config.jobs.dir)),
            build_backend_set(&config, Arc::clone(&relay)),
            scheduler,
            clock,
        )
        .with_params(config.jobs.supervisor_params())
        .with_policy(config.continuation.clone()),
    );
    info!(backends = ?supervisor.backend_names(), "Job backends configured");

    // Nothing drives jobs persisted by an earlier process yet.
    match supervisor.recover_orphans().await {
        Ok(stalled) if !stalled.is_empty() => {
            warn!(?stalled, "Stalled jobs left running by a previous run")
        }
        Ok(_) => {}
        Err(e) => warn!("Job recovery failed: {e}"),
    }

    let shutdown = CancellationToken::new();
    let idle = spawn_idle_monitor(Arc::clone(&relay), IDLE_CHECK_INTERVAL, shutdown.clone());
    let pump = spawn_job_pump(
        Arc::clone(&supervisor),
        config.jobs.pump_interval(),
        shutdown.clone(),
    );

    let addr = format!(
        "{}:{}",
        host.as_deref().unwrap_or(&config.server.host),
        port.unwrap_or(config.server.port)
    );
    let state = Arc::new(AppState::new(relay, supervisor, config, source));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind {addr}"))?;
    info!("Listening on http://{addr} (peer socket at ws://{addr}/ws)");

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
        info!("Shutting down");
        signal.cancel();
    })
    .await?;

    shutdown.cancel();
    let _ = tokio::join!(idle, pump);
    Ok(())
}

/// Stall orphaned jobs and admit pending ones every `interval` until
/// `cancel` fires.
fn spawn_job_pump(
    supervisor: Arc<JobSupervisor>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match supervisor.recover_orphans().await {
                        Ok(stalled) if !stalled.is_empty() => {
                            warn!(?stalled, "Stalled orphaned jobs")
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Job recovery failed: {e}"),
                    }
                    match supervisor.admit_pending().await {
                        Ok(started) if !started.is_empty() => info!(?started, "Admitted jobs"),
                        Ok(_) => {}
                        Err(e) => warn!("Job admission failed: {e}"),
                    }
                }
            }
        }
    })
}

async fn inspect_jobs(config: &FileConfig, action: JobsCommand) -> Result<()> {
    let store = FileJobStore::new(&config.jobs.dir)
        .with_context(|| format!("Cannot open job directory {}", config.jobs.dir.display()))?;
    match action {
        JobsCommand::List => {
            let jobs = store.list().await?;
            if jobs.is_empty() {
                println!("No jobs in {}", config.jobs.dir.display());
            }
            for job in jobs.iter().rev() {
                println!(
                    "{:<24} {:<10} {:<10} {}  {}",
                    job.id,
                    job.state.as_str(),
                    job.backend,
                    job.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    job.name
                );
            }
        }
        JobsCommand::Show { id } => {
            let job = store.load(&id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            for event in store.events(&id).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }
    Ok(())
}
