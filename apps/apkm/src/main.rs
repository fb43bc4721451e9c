//! apkm - Split-package bundle installer
//!
//! This is the main CLI application. It extracts `.apkm` bundles and drives
//! the install pipeline against the local installer service.

mod cli;
mod display;
mod error;
mod events;
mod logging;
mod setup;

use crate::cli::{Cli, Commands};
use crate::display::{CommandOutput, InstallSummary, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use crate::setup::{prompt_yes_no, AppContext, ConfirmMode};
use apkm_config::Config;
use apkm_errors::Error;
use apkm_events::EventReceiver;
use apkm_install::InstallConfig;
use apkm_payload::PayloadSource;
use apkm_types::{ColorChoice, FailureReason, OutputFormat, Phase};
use clap::Parser;
use console::Term;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    // Initialize tracing with JSON awareness
    init_tracing(json_mode, cli.global.debug);

    // Run the application and handle errors
    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        // A failed install was already rendered as the command's result
        if !json_mode && !matches!(e, CliError::Install(_)) {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting apkm v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with proper precedence:
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. Apply CLI flags (highest precedence)
    apply_cli_config(&mut config, &cli.global, &cli.command)?;

    // Create event channel
    let (event_sender, event_receiver) = apkm_events::channel();

    let context = AppContext::initialize(config.clone(), event_sender).await?;

    let json_output = cli.global.json || config.general.default_output == OutputFormat::Json;
    let color = match (cli.global.color, config.general.default_output) {
        (Some(color), _) => color,
        (None, OutputFormat::Plain) => ColorChoice::Never,
        (None, _) => config.general.color,
    };
    let renderer = OutputRenderer::new(json_output, color);

    let colors_enabled = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => Term::stderr().features().colors_supported(),
    };
    let mut event_handler = EventHandler::new(colors_enabled, json_output, cli.global.debug);

    let interactive = !json_output && Term::stderr().is_term();
    let command_name = cli.command.name();

    // Execute command with event handling
    let result = execute_command_with_events(
        cli.command,
        &context,
        &renderer,
        interactive,
        event_receiver,
        &mut event_handler,
    )
    .await?;

    // Render final result
    renderer.render_result(&result)?;

    if let CommandOutput::Install(InstallSummary {
        outcome: Phase::Failure(failure),
        ..
    }) = result
    {
        return Err(CliError::Install(failure));
    }

    info!(command = command_name, "Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    context: &AppContext,
    renderer: &OutputRenderer,
    interactive: bool,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<CommandOutput, CliError> {
    let mut command_future = Box::pin(execute_command(command, context, renderer, interactive));

    // Handle events concurrently with command execution
    loop {
        select! {
            // Command completed
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            // Event received
            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    context: &AppContext,
    renderer: &OutputRenderer,
    interactive: bool,
) -> Result<CommandOutput, CliError> {
    match command {
        Commands::Inspect { archive } => {
            let descriptor = extract(context, archive).await?;
            // Inspection only needs the metadata
            if let Some(dir) = descriptor.payload_paths.first().and_then(|p| p.parent()) {
                let _ = tokio::fs::remove_dir_all(dir).await;
            }
            Ok(CommandOutput::Package(descriptor))
        }

        Commands::Install { archive, yes, .. } => {
            let confirm = if yes {
                ConfirmMode::Automatic
            } else if interactive {
                ConfirmMode::Prompt
            } else {
                ConfirmMode::Unavailable
            };
            install(context, renderer, archive, confirm, interactive).await
        }

        Commands::List => {
            let service = context.service.clone();
            let packages = tokio::task::spawn_blocking(move || service.installed())
                .await
                .map_err(|e| Error::internal(e.to_string()))??;
            Ok(CommandOutput::Installed(packages))
        }

        Commands::ClearCache => {
            let extractor = context.extractor.clone();
            tokio::task::spawn_blocking(move || extractor.clear_cache())
                .await
                .map_err(|e| Error::internal(e.to_string()))??;
            Ok(CommandOutput::Message("Extraction cache cleared".to_string()))
        }
    }
}

async fn extract(
    context: &AppContext,
    archive: PathBuf,
) -> Result<apkm_types::PackageDescriptor, CliError> {
    let extractor = context.extractor.clone();
    let descriptor = tokio::task::spawn_blocking(move || extractor.extract(&archive))
        .await
        .map_err(|e| Error::internal(e.to_string()))??;
    Ok(descriptor)
}

/// Extract and install a bundle; Ctrl-C cancels, failures may be retried
async fn install(
    context: &AppContext,
    renderer: &OutputRenderer,
    archive: PathBuf,
    confirm: ConfirmMode,
    interactive: bool,
) -> Result<CommandOutput, CliError> {
    let descriptor = extract(context, archive).await?;
    if interactive {
        renderer.render_package(&descriptor)?;
    }

    let controller = context.controller(InstallConfig::from(&context.config), confirm);
    let started = Instant::now();
    let mut attempts = 1;
    controller.install(descriptor.clone());

    let outcome = loop {
        let outcome = select! {
            outcome = controller.settled() => outcome,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling install");
                controller.cancel();
                controller.settled().await
            }
        };

        let retryable = matches!(
            outcome.as_failure(),
            Some(failure) if failure.reason != FailureReason::Cancelled
        );
        if !(retryable && interactive) {
            break outcome;
        }
        let retry = tokio::task::spawn_blocking(|| prompt_yes_no("Installation failed. Retry?"))
            .await
            .map_err(|e| Error::internal(e.to_string()))??;
        if !retry || !controller.retry() {
            break outcome;
        }
        attempts += 1;
    };

    Ok(CommandOutput::Install(InstallSummary {
        package_id: descriptor.package_id,
        display_name: descriptor.display_name,
        version_name: descriptor.version_name,
        outcome,
        attempts,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let log_dir = Config::default().cache_dir().join("logs");

    if json_mode {
        // JSON mode: suppress all console output to avoid contaminating JSON
        if debug_enabled && std::fs::create_dir_all(&log_dir).is_ok() {
            let log_file = log_dir.join(format!(
                "apkm-{}.log",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            ));
            if let Ok(file) = std::fs::File::create(&log_file) {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,apkm=debug"),
                        ),
                    )
                    .init();
                return;
            }
        }
        // Fallback: disable all logging in JSON mode
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_dir.join(format!(
            "apkm-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,apkm=debug"),
                        ),
                    )
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
                // Fallback to stderr
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                    )
                    .init();
            }
        }
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,apkm=warn")),
            )
            .init();
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(
    config: &mut Config,
    global: &cli::GlobalArgs,
    command: &Commands,
) -> Result<(), CliError> {
    // Global CLI flags override everything
    if let Some(color) = &global.color {
        config.general.color = *color;
    }

    // Command-specific CLI flags
    if let Commands::Install {
        timeout,
        timeout_scope,
        ..
    } = command
    {
        if let Some(seconds) = timeout {
            if *seconds == 0 {
                return Err(CliError::InvalidArguments(
                    "--timeout must be at least 1 second".to_string(),
                ));
            }
            config.install.timeout = *seconds;
        }
        if let Some(scope) = timeout_scope {
            config.install.timeout_scope = (*scope).into();
        }
    }

    Ok(())
}
