//! stagehand - staged operation runner
//!
//! Loads configuration, wires the operation registry to a scheduler and
//! follows operations from the terminal.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use stagehand_config::{Config, GeneralConfig};
use stagehand_engine::{
    OperationRegistry, RandomPolicy, RegistrySnapshot, Scheduler, TemplateCatalog,
};
use stagehand_errors::EngineError;
use stagehand_types::{LogFormat, Metadata, OperationId};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    // Configuration decides the log format, so it loads before tracing
    let config = match load_config(&cli.global).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    init_tracing(&config.general, cli.global.debug);

    if let Err(e) = run(cli, config).await {
        error!("Application error: {}", e);
        report_error(&e, json_mode);
        process::exit(1);
    }
}

fn report_error(error: &CliError, json_mode: bool) {
    if !json_mode {
        eprintln!("Error: {error}");
        return;
    }
    let payload = match error {
        CliError::Engine(inner) => serde_json::json!({ "error": inner, "message": error.to_string() }),
        _ => serde_json::json!({ "message": error.to_string() }),
    };
    println!("{payload}");
}

/// Options for `stagehand run`
struct RunOptions {
    template: String,
    metadata: Metadata,
    seed: Option<u64>,
    cancel_after: Option<Duration>,
    snapshot: Option<PathBuf>,
}

/// Main application logic
async fn run(cli: Cli, mut config: Config) -> Result<(), CliError> {
    info!("Starting stagehand v{}", env!("CARGO_PKG_VERSION"));
    let renderer = OutputRenderer::new(cli.global.json);

    match cli.command {
        Commands::Templates => {
            let catalog = TemplateCatalog::from_config(&config)?;
            renderer.render_templates(&catalog)?;
        }
        Commands::Show { snapshot } => {
            let snapshot = RegistrySnapshot::load(&snapshot).await?;
            renderer.render_operations(&snapshot.operations)?;
        }
        Commands::Run {
            template,
            metadata,
            failure_probability,
            seed,
            cancel_after,
            snapshot,
        } => {
            if cancel_after == Some(0) {
                return Err(CliError::InvalidArguments(
                    "--cancel-after must be greater than zero".to_string(),
                ));
            }
            if let Some(probability) = failure_probability {
                config.engine.failure_probability = probability;
                config.validate()?;
            }
            let options = RunOptions {
                template,
                metadata: metadata.into_iter().collect(),
                seed,
                cancel_after: cancel_after.map(Duration::from_millis),
                snapshot,
            };
            let mut handler = EventHandler::new(cli.global.json, cli.global.debug);
            run_operation(&config, options, &renderer, &mut handler).await?;
        }
    }

    info!("Command completed successfully");
    Ok(())
}

/// Load configuration with proper precedence: file, environment, CLI flags
async fn load_config(global: &GlobalArgs) -> Result<Config, CliError> {
    let mut config = Config::load_or_default(global.config.as_deref()).await?;
    config.merge_env()?;

    if let Some(format) = global.log_format {
        config.general.log_format = format;
    }
    if let Some(tick_ms) = global.tick_ms {
        config.scheduler.tick_interval_ms = tick_ms;
    }

    config.validate()?;
    Ok(config)
}

/// Create, trigger and follow one operation until it is terminal
async fn run_operation(
    config: &Config,
    options: RunOptions,
    renderer: &OutputRenderer,
    handler: &mut EventHandler,
) -> Result<(), CliError> {
    let (event_sender, mut event_receiver) = stagehand_events::channel();

    let mut registry = OperationRegistry::from_config(config)?.with_events(event_sender);
    if let Some(seed) = options.seed {
        registry = registry.with_policy(RandomPolicy::seeded(
            config.engine.completion_probability,
            config.engine.failure_probability,
            seed,
        ));
    }
    let registry = Arc::new(registry);
    let scheduler = Scheduler::from_config(Arc::clone(&registry), config);

    let operation = registry.create(&options.template, options.metadata)?;
    let operation_id = operation.id();
    let mut feed = registry.watch()?;

    scheduler.start()?;
    registry.trigger(operation_id)?;

    let cancel_timer = async {
        match options.cancel_after {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(cancel_timer);
    let mut cancel_requested = false;

    loop {
        select! {
            Some(message) = event_receiver.recv() => handler.handle_event(message),
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let finished = feed
                    .borrow_and_update()
                    .iter()
                    .any(|op| op.id() == operation_id && op.is_terminal());
                if finished {
                    break;
                }
            }
            () = &mut cancel_timer, if !cancel_requested => {
                cancel_requested = true;
                cancel_if_running(&registry, operation_id)?;
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                warn!(%operation_id, "interrupted, cancelling operation");
                cancel_if_running(&registry, operation_id)?;
            }
        }
    }

    scheduler.stop().await?;

    // Drain any remaining events
    while let Ok(message) = event_receiver.try_recv() {
        handler.handle_event(message);
    }

    let finished = registry.get(operation_id)?;
    renderer.render_operation(&finished)?;

    if let Some(path) = options.snapshot {
        registry.snapshot()?.save(&path).await?;
        info!(path = %path.display(), "snapshot saved");
    }
    Ok(())
}

/// Cancel unless the operation already finished on its own
fn cancel_if_running(registry: &OperationRegistry, operation_id: OperationId) -> Result<(), CliError> {
    match registry.cancel(operation_id) {
        Ok(()) => Ok(()),
        Err(e) if matches!(e.as_engine(), Some(EngineError::InvalidState { .. })) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(general: &GeneralConfig, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "debug"
    } else {
        general.log_filter.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr; stdout is reserved for results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match general.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}
