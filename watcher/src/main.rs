//! Pipewatch - Entry Point
//!
//! Watches one pipeline run and prints its stage graph, deployment and the
//! selected log tail every time they change.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use pipewatch::app::options::{AppOptions, WatchTarget};
use pipewatch::app::run::run;
use pipewatch::filesys::file::File;
use pipewatch::logs::{init_logging, LogOptions};
use pipewatch::observe::view::Selection;
use pipewatch::storage::layout::StorageLayout;
use pipewatch::storage::settings::Settings;
use pipewatch::utils::version_info;

use secrecy::SecretString;
use tracing::{error, info};

const TOKEN_ENV: &str = "PIPEWATCH_TOKEN";

const USAGE: &str = "\
Usage: pipewatch --project=<id> (--pipeline=<id> | --trigger [--branch=<name>])
                 [--job=<id> | --deployment] [--exit-on-finish]
                 [--config=<path>] [--write-config] [--version]

The API token is read from the PIPEWATCH_TOKEN environment variable.";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to serialize version info: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    if cli_args.contains_key("help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };

    if cli_args.contains_key("write-config") {
        return match settings_file.write_json(&Settings::default()).await {
            Ok(()) => {
                println!("Wrote default settings to {}", settings_file.path().display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Unable to write settings file: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging, the guard flushes the log file on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = match parse_options(&cli_args, &settings) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    info!(
        "Running pipewatch {} against {}",
        version_info().version,
        options.backend_base_url
    );
    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to watch the pipeline: {e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_options(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
) -> Result<AppOptions, String> {
    let project_id = parse_id(cli_args, "project")?.ok_or("--project is required")?;

    let target = if cli_args.contains_key("trigger") {
        let branch = cli_args
            .get("branch")
            .cloned()
            .unwrap_or_else(|| "main".to_string());
        WatchTarget::Trigger { branch }
    } else {
        let pipeline_id = parse_id(cli_args, "pipeline")?
            .ok_or("either --pipeline or --trigger is required")?;
        WatchTarget::Pipeline(pipeline_id)
    };

    let initial_selection = match (parse_id(cli_args, "job")?, cli_args.contains_key("deployment")) {
        (Some(_), true) => return Err("--job and --deployment are exclusive".to_string()),
        (Some(job_id), false) => Selection::Job(job_id),
        (None, true) => Selection::Deployment,
        (None, false) => Selection::None,
    };

    let mut options = AppOptions::from_settings(settings, project_id, target);
    options.initial_selection = initial_selection;
    options.exit_on_finish = cli_args.contains_key("exit-on-finish");
    options.token = env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.is_empty())
        .map(SecretString::from);
    Ok(options)
}

fn parse_id(cli_args: &HashMap<String, String>, key: &str) -> Result<Option<i64>, String> {
    cli_args
        .get(key)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| format!("--{key} expects a numeric id, got '{value}'"))
        })
        .transpose()
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
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
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
