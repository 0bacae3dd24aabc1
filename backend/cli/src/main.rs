mod demo;
mod router;
mod terminal_output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use hostforge_config::{RuntimeConfig, ValidationReport};
use hostforge_core::{BusConfig, CancelScope, Event, EventBus};
use hostforge_logging::{init_logger, EventAuditLogger};
use hostforge_plugins::{AppContext, DependencyResolver, PluginRegistry, Runtime, RuntimeOptions};

use router::RouteTable;
use terminal_output::{note_error, note_info, note_success, note_warn, render_table, state_label};

#[derive(Parser)]
#[command(name = "hostforge")]
#[command(about = "HostForge plugin host runtime")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $HOSTFORGE_CONFIG or ~/.hostforge/hostforge.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or `EnvFilter` directive; overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rolling JSON logs; overrides the config file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the built-in plugins and run until Ctrl-C
    Run {
        /// Shut down right after bootstrap and the startup event
        #[arg(long)]
        once: bool,
    },
    /// Print the resolved boot order without starting anything
    Plan,
    /// Validate the config file and report problems
    Check,
    /// Write a config file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(hostforge_config::default_config_path);

    if !matches!(cli.command, Commands::Run { .. }) {
        init_logger(cli.log_dir.as_deref(), cli.log_level.as_deref().unwrap_or("warn"));
    }

    match cli.command {
        Commands::Run { once } => {
            let config = load(&path).await?;
            let level = cli.log_level.as_deref().unwrap_or(config.log_level());
            let log_dir = cli.log_dir.as_deref().or(config.log_dir());
            init_logger(log_dir, level);
            run(config, once).await
        }
        Commands::Plan => plan().map(|_| ()),
        Commands::Check => check(&path).await,
        Commands::Init { force } => init(&path, force).await,
    }
}

async fn load(path: &Path) -> Result<RuntimeConfig> {
    hostforge_config::load_and_prepare(path)
        .await
        .with_context(|| format!("failed to load config from {}", path.display()))
}

fn build_runtime(config: &RuntimeConfig) -> (Runtime, Arc<RouteTable>, Arc<EventAuditLogger>) {
    let bus = EventBus::with_config(BusConfig {
        buffer_size: config.bus_buffer_size(),
        publish_timeout: config.publish_timeout(),
    });
    let audit_logger = Arc::new(EventAuditLogger::new());
    // Lives as long as the bus; never unsubscribed.
    let _ = audit_logger.attach(&bus, demo::TOPICS);

    let routes = Arc::new(RouteTable::new());
    let ctx = AppContext::builder(bus)
        .router(Arc::clone(&routes))
        .config(config.plugins_provider())
        .build();

    let runtime = Runtime::with_options(ctx, RuntimeOptions::from_config(config));
    (runtime, routes, audit_logger)
}

async fn run(config: RuntimeConfig, once: bool) -> Result<()> {
    let (runtime, routes, audit_logger) = build_runtime(&config);
    for plugin in demo::builtin_plugins() {
        runtime.register(plugin)?;
    }

    info!(shutdown_timeout = ?runtime.options().shutdown_timeout, "Starting HostForge runtime");
    let scope = CancelScope::new();
    if let Err(e) = runtime.bootstrap(&scope).await {
        error!(error = %e, "Bootstrap failed");
        note_error(&format!("bootstrap failed: {e}"));
        print_states(&runtime);
        if let Err(e) = runtime.shutdown(&CancelScope::new()).await {
            error!(error = %e, "Shutdown after failed bootstrap reported errors");
        }
        return Err(e.into());
    }

    print_states(&runtime);
    for route in routes.routes() {
        note_info(&format!("{} {} -> {}", route.method, route.path, route.owner));
    }

    let started = Event::new(
        demo::USER_CREATED,
        serde_json::json!({"id": "system", "reason": "startup self-test"}),
    )
    .from_plugin("hostforge");
    runtime
        .publish(&CancelScope::timeout(config.publish_timeout()), started)
        .await
        .context("publish startup event")?;

    let health = runtime.health().await;
    if health.is_healthy() {
        note_success(&format!("{} health checks passing", health.plugins.len()));
    } else {
        note_warn(&format!("unhealthy plugins: {}", health.unhealthy().join(", ")));
    }

    if !once {
        note_info("HostForge is running; press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }

    runtime.shutdown(&CancelScope::new()).await?;
    print_states(&runtime);
    note_success(&format!(
        "stopped cleanly ({} bus events audited)",
        audit_logger.recorded()
    ));
    Ok(())
}

fn print_states(runtime: &Runtime) {
    let order = runtime.boot_order();
    let names = if order.is_empty() {
        runtime.list_plugins().into_keys().collect()
    } else {
        order
    };
    let rows: Vec<Vec<String>> = names
        .into_iter()
        .filter_map(|name| {
            let state = runtime.plugin_state(&name)?;
            let error = runtime.plugin_error(&name).unwrap_or_default();
            Some(vec![name, state_label(state), error])
        })
        .collect();
    print!("{}", render_table(&["PLUGIN", "STATE", "ERROR"], &rows));
}

fn plan() -> Result<Vec<String>> {
    let registry = PluginRegistry::new();
    for plugin in demo::builtin_plugins() {
        registry.register(plugin)?;
    }
    let order = DependencyResolver::resolve(&registry.descriptors())?;
    for (i, name) in order.iter().enumerate() {
        println!("{:>3}. {name}", i + 1);
    }
    Ok(order)
}

async fn check(path: &Path) -> Result<()> {
    let raw = hostforge_config::load_config(path).await?;
    let report: ValidationReport =
        hostforge_config::validate(&hostforge_config::apply_all_defaults(raw));
    for warning in &report.warnings {
        note_warn(&format!("{}: {}", warning.path, warning.message));
    }
    for problem in &report.errors {
        note_error(&format!("{}: {}", problem.path, problem.message));
    }
    if report.is_valid() {
        note_success(&format!("{} is valid", path.display()));
        Ok(())
    } else {
        anyhow::bail!("{}", report.error_summary())
    }
}

async fn init(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let mut config = hostforge_config::apply_all_defaults(RuntimeConfig::default());
    config
        .plugins
        .insert("audit".into(), serde_json::json!({"enabled": true, "maxRecords": 10000}));
    config
        .plugins
        .insert("metrics".into(), serde_json::json!({"enabled": true, "endpoint": "/metrics"}));
    hostforge_config::write_config(&config, path).await?;
    note_success(&format!("wrote {}", path.display()));
    Ok(())
}
