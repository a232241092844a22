use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use promsync_core::catalog::{Catalog, FileCatalog, StaticCatalog};
use promsync_core::config::Config;
use promsync_reconcile::{
    AsyncCoordinator, CatalogWatcher, HttpReloader, PromtoolChecker, Reconciler, Settings,
    SyncCoordinator,
};

#[derive(Parser)]
#[command(
    name = "promsync",
    about = "Keeps a metrics engine's scrape configuration in sync with the inventory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Inventory file (overrides catalog.inventory)
    #[arg(long, global = true)]
    inventory: Option<String>,

    /// Engine base URL (overrides engine.base_url)
    #[arg(long, global = true)]
    engine_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile on every inventory change until interrupted
    Run {
        /// Debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Do not watch the inventory file
        #[arg(long)]
        no_watch: bool,
    },

    /// Run one reconciliation pass now
    Apply,

    /// Print the document a pass would write, without checking or writing it
    Render,

    /// Probe the engine and the checker, then run one pass
    Check,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration, or one value by dotted path
    Show { path: Option<String> },
    /// Report configuration warnings and errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    apply_overrides(&mut config, &cli);

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Run {
            debounce_ms,
            no_watch,
        } => {
            let debounce = debounce_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.debounce());
            run(&config, debounce, !no_watch && config.watch_inventory()).await?;
        }
        Commands::Apply => {
            let sync = SyncCoordinator::new(Arc::new(build_reconciler(&config)?));
            let report = sync.update().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Render => {
            let reconciler = build_reconciler(&config)?;
            let document = reconciler.render().await?;
            let bytes = reconciler.serialize(&document)?;
            print!("{}", String::from_utf8_lossy(bytes.as_bytes()));
        }
        Commands::Check => {
            let sync = SyncCoordinator::new(Arc::new(build_reconciler(&config)?));
            let report = sync.check().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { path: None } => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Show { path: Some(path) } => match config.get_path(&path) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{path}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(inventory) = &cli.inventory {
        let mut catalog = config.catalog.clone().unwrap_or_default();
        catalog.inventory = Some(inventory.clone());
        config.catalog = Some(catalog);
    }
    if let Some(url) = &cli.engine_url {
        let mut engine = config.engine();
        engine.base_url = url.clone();
        config.engine = Some(engine);
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".into())
    };
    let mut directives = vec![level];
    if let Some(logging) = &config.logging {
        directives.extend(logging.filters.iter().cloned());
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives.join(",")));

    if config.log_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_catalog(config: &Config) -> Arc<dyn Catalog> {
    match config.inventory_path() {
        Some(path) => Arc::new(FileCatalog::new(path)),
        None => {
            tracing::warn!("No inventory configured, only server jobs will be written");
            Arc::new(StaticCatalog::default())
        }
    }
}

fn build_reconciler(config: &Config) -> anyhow::Result<Reconciler> {
    let checker = PromtoolChecker::new(config.checker_path(), config.checker_timeout())?;
    let reloader = HttpReloader::new(
        config.reload_url(),
        config.health_url(),
        config.request_timeout(),
    )?;
    Ok(Reconciler::new(
        build_catalog(config),
        Arc::new(checker),
        Arc::new(reloader),
        Settings::from_config(config),
    ))
}

async fn run(config: &Config, debounce: Duration, watch: bool) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for w in &warnings {
        tracing::warn!("{w}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration: {}", errors.join("; "));
    }

    let sync = Arc::new(SyncCoordinator::new(Arc::new(build_reconciler(config)?)));
    let coordinator = Arc::new(AsyncCoordinator::new(sync, debounce));
    let cancel = CancellationToken::new();
    let worker = coordinator.clone().spawn(cancel.clone());

    let _watcher = match config.inventory_path() {
        Some(path) if watch => Some(CatalogWatcher::start(path, coordinator.clone())?),
        _ => None,
    };

    tracing::info!(
        scrape_config = %config.scrape_config_path().display(),
        engine = %config.engine().base_url,
        "promsync running"
    );
    coordinator.request_update();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    cancel.cancel();
    worker.await?;

    let status = coordinator.status();
    tracing::info!(passes = status.passes, failures = status.failures, "Stopped");
    Ok(())
}
