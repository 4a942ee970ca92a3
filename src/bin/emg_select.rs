//! Channel selection command line
//!
//! **Usage:**
//! ```bash
//! emg-select --request request.json [--config emg-select.toml] [--output response.json]
//! ```
//!
//! Without `--config` the conventional `emg-select.toml` / `emg-select.local.toml`
//! files of the working directory are merged when present.

use clap::Parser;
use emg_channel_select::{ConfigLoader, SelectionPipeline, SelectionRequest, SelectionResponse};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Rank EMG channels and search for the best subset
#[derive(Parser, Debug)]
#[clap(name = "emg-select", version)]
struct Args {
    /// TOML configuration file
    #[clap(long, value_name = "FILE", env = "EMGSEL_CONFIG")]
    config: Option<PathBuf>,

    /// JSON selection request
    #[clap(long, value_name = "FILE")]
    request: PathBuf,

    /// Write the JSON response here instead of stdout
    #[clap(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => ConfigLoader::load_file(path),
        None => ConfigLoader::new().load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let response = match std::fs::read_to_string(&args.request) {
        Ok(content) => match SelectionRequest::from_json(&content) {
            Ok(request) => {
                info!(request = %args.request.display(), "running selection");
                SelectionPipeline::from_config(config).respond(&request)
            }
            Err(e) => SelectionResponse::Failure(e.to_response()),
        },
        Err(e) => {
            error!("Failed to read {}: {}", args.request.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let body = match response.to_json() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode response: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &body) {
                error!("Failed to write {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
            info!(output = %path.display(), "response written");
        }
        None => println!("{}", body),
    }

    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
