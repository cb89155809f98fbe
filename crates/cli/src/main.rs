mod commands;
mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use stagewatch_client::PollerConfig;
use stagewatch_core::EmitMode;
use tracing_subscriber::EnvFilter;

use crate::config::{AdvanceMode, ServeConfig, ServeOverrides};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Polled job progress: server and client.
#[derive(Parser)]
#[command(name = "stagewatch", version, about = "Polled job progress: server and client")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// TOML config file; flags and STAGEWATCH_* variables override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Response shape: prefix or latest
        #[arg(long)]
        emit_mode: Option<EmitMode>,
        /// Minimum time each stage stays current, in milliseconds
        #[arg(long)]
        stage_threshold_ms: Option<u64>,
        /// What advances a job: elapsed threshold or external signals
        #[arg(long, value_enum)]
        advance: Option<AdvanceMode>,
        /// How long finished jobs stay pollable, in seconds
        #[arg(long)]
        grace_period_secs: Option<u64>,
        /// Directory for normalized uploads
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },

    /// Poll a running job until its artifact arrives, then save it
    Watch {
        /// Project ID returned by /api/start
        project_id: String,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Upload a document, start a job on it, and watch it to completion
    Run {
        /// Document to upload (pdf, docx, png, jpg, jpeg)
        file: PathBuf,
        /// Prompt recorded as the job's first narrative entry
        #[arg(long)]
        prompt: Option<String>,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Apply upload normalization to a local file
    Normalize {
        /// File to normalize
        file: PathBuf,
        /// Directory to write the result to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct ClientArgs {
    /// Base URL of the stagewatch server
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,
    /// Where to save the artifact (default: <project-id>.zip)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 3000)]
    interval_ms: u64,
    /// Consecutive transient failures tolerated before giving up
    #[arg(long, default_value_t = 3)]
    max_failures: u32,
    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    /// Delete the job on the server once its artifact is saved
    #[arg(long)]
    delete_after: bool,
}

impl ClientArgs {
    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval_ms: self.interval_ms,
            max_consecutive_failures: self.max_failures,
            request_timeout_ms: self.timeout_ms,
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            emit_mode,
            stage_threshold_ms,
            advance,
            grace_period_secs,
            upload_dir,
        } => {
            let overrides = ServeOverrides {
                host,
                port,
                stage_threshold_ms,
                emit_mode,
                advance,
                grace_period_secs,
                upload_dir,
            };
            let config = match ServeConfig::load(config.as_deref(), overrides) {
                Ok(c) => c,
                Err(e) => {
                    report_error(&e.to_string(), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to create tokio runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("Server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Watch { project_id, client } => {
            let result = commands::cmd_watch(
                &project_id,
                &client.server,
                client.out.clone(),
                client.poller_config(),
                client.delete_after,
                cli.output,
                cli.quiet,
            );
            exit_on_error(result, cli.output, cli.quiet);
        }
        Commands::Run {
            file,
            prompt,
            client,
        } => {
            let result = commands::cmd_run(
                &file,
                &client.server,
                prompt,
                client.out.clone(),
                client.poller_config(),
                client.delete_after,
                cli.output,
                cli.quiet,
            );
            exit_on_error(result, cli.output, cli.quiet);
        }
        Commands::Normalize { file, out_dir } => {
            let result = commands::cmd_normalize(&file, &out_dir, cli.output, cli.quiet);
            exit_on_error(result, cli.output, cli.quiet);
        }
    }
}

fn exit_on_error(result: Result<(), commands::CliError>, output: OutputFormat, quiet: bool) {
    if let Err(e) = result {
        report_error(&format!("error: {}", e), output, quiet);
        process::exit(1);
    }
}

/// Report an error message in the appropriate output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
