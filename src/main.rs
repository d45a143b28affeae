//! stackhook: lifecycle hook controller
//!
//! Usage:
//!   stackhook render --catalog stack.yaml --instance widget.yaml [--event created]
//!   stackhook hooks  --catalog stack.yaml --instance widget.yaml
//!   stackhook run    --root ./cluster-state [--config stackhook.toml]
//!   stackhook config [--config stackhook.toml]
//!
//! `render` and `hooks` work offline against an in-memory store and print
//! what a pass would create. `run` drives the controller against a
//! directory tree of YAML objects.

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackhook_controller::{
    resolve, ChannelHost, ControllerConfig, ControllerRegistry, DirectoryEventSource,
    LocalCluster, LogStatusReporter, ReconcileRequest, RenderCoordinator, Resolution,
    SetupCoordinator, SharedCatalog,
};
use stackhook_core::{BehaviorCatalog, Cluster, EventName, Instance, MemoryCluster};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stackhook", version = env!("CARGO_PKG_VERSION"), about = "Render and apply lifecycle hooks for custom resources")]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Path to config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "stackhook.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one render pass offline and print the ConfigMaps and Jobs it creates
    Render {
        /// StackConfiguration YAML
        #[arg(long)]
        catalog: PathBuf,
        /// Triggering instance YAML
        #[arg(long)]
        instance: PathBuf,
        /// Event to fire (default: derived from the instance)
        #[arg(long)]
        event: Option<EventName>,
    },
    /// Show which hooks an instance would run, with their effective engines
    Hooks {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        instance: PathBuf,
        #[arg(long)]
        event: Option<EventName>,
    },
    /// Run the controller against a directory of YAML objects
    Run {
        /// Root of the object tree
        #[arg(long)]
        root: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    let config = ControllerConfig::load(&cli.config);

    match cli.command {
        Commands::Render { catalog, instance, event } => render(&config, &catalog, &instance, event).await,
        Commands::Hooks { catalog, instance, event } => hooks(&catalog, &instance, event),
        Commands::Run { root } => run(config, root).await,
        Commands::Config => {
            println!("{}", config.to_toml());
            Ok(())
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stackhook=info".into());

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("--log-file {} has no file name", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

fn load_inputs(catalog: &Path, instance: &Path) -> anyhow::Result<(BehaviorCatalog, Instance)> {
    let catalog_yaml = std::fs::read_to_string(catalog)
        .with_context(|| format!("reading catalog {}", catalog.display()))?;
    let instance_yaml = std::fs::read_to_string(instance)
        .with_context(|| format!("reading instance {}", instance.display()))?;
    let catalog = BehaviorCatalog::from_yaml(&catalog_yaml)
        .with_context(|| format!("parsing catalog {}", catalog.display()))?;
    let instance = Instance::from_yaml(&instance_yaml)
        .with_context(|| format!("parsing instance {}", instance.display()))?;
    for key in catalog.invalid_keys() {
        tracing::warn!(type_key = %key, "catalog type key does not parse");
    }
    for (key, event) in catalog.unknown_events() {
        tracing::warn!(type_key = %key, %event, "unknown event name; hooks skipped");
    }
    Ok((catalog, instance))
}

async fn render(
    config: &ControllerConfig,
    catalog: &Path,
    instance: &Path,
    event: Option<EventName>,
) -> anyhow::Result<()> {
    let (catalog, instance) = load_inputs(catalog, instance)?;
    let type_id = instance.type_identity()?;

    let cluster = Arc::new(MemoryCluster::new());
    let instance = cluster.insert(instance)?;
    let coordinator = RenderCoordinator::new(
        type_id,
        cluster.clone(),
        SharedCatalog::new(catalog),
        config,
        Arc::new(LogStatusReporter),
    );

    let mut request = ReconcileRequest::new(instance.key());
    request.event = event;
    let report = coordinator.reconcile(&request).await?;

    for object in cluster
        .objects_of("v1", "ConfigMap")
        .into_iter()
        .chain(cluster.objects_of("batch/v1", "Job"))
    {
        print!("---\n{}", serde_yaml::to_string(object.as_value())?);
    }

    for failed in report.failed_hooks() {
        if let Err(e) = &failed.outcome {
            eprintln!("hook {} ({}): {}", failed.index, failed.hook.directory, e);
        }
    }
    let failed = report.failed_hooks().count();
    if failed > 0 {
        anyhow::bail!("{} of {} hooks failed", failed, report.hooks.len());
    }
    Ok(())
}

fn hooks(catalog: &Path, instance: &Path, event: Option<EventName>) -> anyhow::Result<()> {
    let (catalog, instance) = load_inputs(catalog, instance)?;
    let event = stackhook_controller::derive_event(&instance, event);

    match resolve(&instance, &catalog, event)? {
        Resolution::NoBehaviorConfigured(type_key) => {
            println!("{}: no behavior configured", type_key);
        }
        Resolution::NoHooksForEvent(type_key, event) => {
            println!("{}: no hooks for {}", type_key, event);
        }
        Resolution::Hooks(resolved) => {
            println!(
                "{} on {} (source: {})",
                resolved.type_key,
                resolved.event,
                resolved.source.as_deref().unwrap_or("<none>")
            );
            for (index, hook) in resolved.hooks.iter().enumerate() {
                let directory = if hook.directory.is_empty() { "." } else { hook.directory.as_str() };
                println!("  {}. {} [{}]", index, directory, hook.engine.engine_type);
            }
        }
    }
    Ok(())
}

async fn run(config: ControllerConfig, root: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;
    let cluster: Arc<dyn Cluster> = Arc::new(LocalCluster::new(&root));
    let events = Arc::new(DirectoryEventSource::new(&root, config.watch.poll_interval()));
    let host = Arc::new(
        ChannelHost::new(config.reconcile.requeue_after(), config.reconcile.queue_depth)
            .with_event_source(events),
    );
    let registry = Arc::new(ControllerRegistry::new());

    tracing::info!(
        root = %cluster.location(),
        catalog = %config.catalog.key(),
        "starting controller"
    );
    let setup = Arc::new(SetupCoordinator::new(
        cluster,
        host.clone(),
        registry.clone(),
        Arc::new(LogStatusReporter),
        config,
    ));
    let setup_loop = setup.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    setup_loop.join().await;
    registry.shutdown().await;
    host.shutdown();
    Ok(())
}
