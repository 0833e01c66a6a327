//! shipcheck - Entry Point
//!
//! Deploys a generated backend project locally, smoke-tests it against its API
//! specification and drives the repair loop until it passes.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};

use shipcheck::app::options::AppOptions;
use shipcheck::app::run::{run_once, run_server};
use shipcheck::app::state::AppState;
use shipcheck::errors::OrchestratorError;
use shipcheck::filesys::file::File;
use shipcheck::logs::{init_logging, LogLevel, LogOptions};
use shipcheck::models::api_spec::ApiSpec;
use shipcheck::orchestrate::{VerifyOutcome, VerifyRequest};
use shipcheck::storage::layout::StorageLayout;
use shipcheck::storage::settings::Settings;
use shipcheck::utils::{generate_project_id, version_info};

const USAGE: &str = "\
Usage:
  shipcheck --project-dir=<dir> --api-spec=<file.json> [--project-id=<id>]
  shipcheck --stop=<project_id>
  shipcheck --serve
  shipcheck --version

Common options: --settings=<file.json> --log-level=<level>";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to render version info: {e}"),
        }
        return ExitCode::SUCCESS;
    }
    if cli_args.contains_key("help") {
        eprintln!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let mut settings = match settings_file.read_json_or_default::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", settings_file.path().display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // Initialize logging
    let mut log_dir = None;
    if settings.log_to_file {
        let logs = layout.logs_dir();
        match logs.create().await {
            Ok(()) => log_dir = Some(logs.path().to_path_buf()),
            Err(e) => eprintln!("Unable to create log directory {}: {}", logs.path().display(), e),
        }
    }
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);
    let state = match AppState::init(&options).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Stop a deployment and exit
    if let Some(project_id) = cli_args.get("stop") {
        return match state.orchestrator.lifecycle().stop(project_id).await {
            Ok(()) => {
                info!("Stopped {}", project_id);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to stop {}: {}", project_id, e);
                ExitCode::FAILURE
            }
        };
    }

    // Run the server
    if cli_args.contains_key("serve") {
        info!("Running shipcheck server with options: {:?}", options);
        return match run_server(version.version, options, state, await_shutdown_signal()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to run the server: {e}");
                ExitCode::FAILURE
            }
        };
    }

    // Run one orchestration starting here
    let request = match build_request(&cli_args).await {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };
    let project_id = request.project_id.clone();

    let result = run_once(&state, request, await_shutdown_signal(), |record| {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Unable to render progress record: {}", e),
        }
    })
    .await;

    match result {
        Ok(outcome) => {
            print_summary(&outcome);
            match outcome.failure() {
                None => ExitCode::SUCCESS,
                Some(e) => {
                    eprintln!("{} {}", "error:".red().bold(), e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            if matches!(e, OrchestratorError::Cancelled(_)) {
                // The runtime ends with main; finish the cleanup here
                if let Err(stop) = state.orchestrator.lifecycle().stop(&project_id).await {
                    error!("Failed to stop {}: {}", project_id, stop);
                }
            }
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn build_request(cli_args: &HashMap<String, String>) -> Result<VerifyRequest, OrchestratorError> {
    let project_dir = cli_args
        .get("project-dir")
        .map(PathBuf::from)
        .ok_or_else(|| OrchestratorError::ConfigError("--project-dir is required".to_string()))?;
    let spec_path = cli_args
        .get("api-spec")
        .ok_or_else(|| OrchestratorError::ConfigError("--api-spec is required".to_string()))?;
    let api_spec = File::new(spec_path).read_json::<ApiSpec>().await?;
    let project_id = cli_args
        .get("project-id")
        .cloned()
        .unwrap_or_else(generate_project_id);

    Ok(VerifyRequest {
        project_id,
        project_dir,
        api_spec,
    })
}

fn print_summary(outcome: &VerifyOutcome) {
    for check in &outcome.report.results {
        let mark = if check.passed { "PASS".green() } else { "FAIL".red() };
        eprintln!("  {} {} {} ({})", mark, check.method, check.endpoint, check.name);
        if let Some(message) = &check.error_message {
            eprintln!("       {}", message.dimmed());
        }
    }

    let verdict = if outcome.success {
        "verified".green().bold()
    } else {
        "not verified".red().bold()
    };
    eprintln!(
        "{} after {} attempt(s): {}",
        verdict,
        outcome.attempts,
        outcome.final_project_dir.display()
    );
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
