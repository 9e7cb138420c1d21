//! Steprun CLI - drive a job-control server and run steps by hand

mod emitter;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steprun_core::domain::{ApiResponse, JobId, JobState, Target};
use steprun_core::port::{ApiTransport, Step};
use steprun_core::application::TargetRunner;
use steprun_core::ExecContext;
use steprun_sdk::HttpApiClient;
use steprun_steps::{default_registry, BiosSettingsSet, JobStatusStep};
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::emitter::ConsoleEmitter;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
const DEFAULT_REQUESTOR: &str = "steprun-cli";

#[derive(Parser)]
#[command(name = "steprun")]
#[command(about = "Steprun remote step execution CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Job-control server URL
    #[arg(long, env = "STEPRUN_SERVER_URL", default_value = DEFAULT_SERVER_URL, global = true)]
    server_url: String,

    /// Requestor name sent with every API request
    #[arg(long, env = "STEPRUN_REQUESTOR", default_value = DEFAULT_REQUESTOR, global = true)]
    requestor: String,

    /// Log format: pretty or json
    #[arg(long, env = "STEPRUN_LOG_FORMAT", default_value = "pretty", global = true)]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server's API version
    Version,

    /// Submit a job descriptor
    Start {
        /// Path to the JSON job descriptor
        #[arg(long)]
        job_desc: PathBuf,
    },

    /// Stop a running job
    Stop { job_id: JobId },

    /// Show a job's status
    Status { job_id: JobId },

    /// Retry a job
    Retry { job_id: JobId },

    /// List jobs, optionally filtered
    List {
        /// Comma-separated states (e.g. Failed,JobStateCompleted)
        #[arg(long, value_delimiter = ',')]
        states: Vec<JobState>,

        /// Comma-separated tags; a job must carry all of them
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Run one step against one target and print its events
    Run {
        /// Step name (BiosSettingsSet, JobStatus)
        step: String,

        /// Path to the JSON step input
        #[arg(long)]
        params: PathBuf,

        /// Target as `<id>` or `<id>@<fqdn>`
        #[arg(long)]
        target: String,
    },
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job ID")]
    job_id: JobId,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn parse_target(spec: &str) -> Result<Target> {
    let (id, fqdn) = match spec.split_once('@') {
        Some((id, fqdn)) => (id, Some(fqdn)),
        None => (spec, None),
    };
    if id.is_empty() {
        anyhow::bail!("target id cannot be empty in '{}'", spec);
    }
    Ok(match fqdn.filter(|f| !f.is_empty()) {
        Some(fqdn) => Target::new(id).with_fqdn(fqdn),
        None => Target::new(id),
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Print the server line and turn an embedded error into a failure
fn unwrap_response<T>(resp: ApiResponse<T>) -> Result<T> {
    println!("{} {}", "Server:".bold(), resp.server_id);
    resp.into_data()
        .map_err(|e| anyhow::anyhow!("server reported an error: {}", e))
}

/// Cancel `shutdown` on the first Ctrl-C
fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            shutdown.cancel();
        }
    });
}

async fn run_step<S: Step + 'static>(ctx: &ExecContext, step: S, target: Target) -> Result<()> {
    let runner = TargetRunner::new(
        Arc::new(step),
        Arc::new(default_registry()),
        Arc::new(ConsoleEmitter),
    )?;

    info!(step = S::NAME, target = %target, "Running step");
    runner
        .run(ctx, &target)
        .await
        .with_context(|| format!("{} failed on {}", S::NAME, target))?;

    println!(
        "{}",
        format!("✓ {} succeeded on {}", S::NAME, target).green().bold()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_format)?;

    let server_url = cli.server_url.as_str();
    let connect = || {
        HttpApiClient::new(server_url)
            .with_context(|| format!("Invalid server URL '{}'", server_url))
    };
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    let ctx = ExecContext::with_token(shutdown);
    let requestor = cli.requestor.as_str();

    match cli.command {
        Commands::Version => {
            let data = unwrap_response(connect()?.version(&ctx, requestor).await?)?;
            println!("{} {}", "API version:".bold(), data.version);
        }

        Commands::Start { job_desc } => {
            let descriptor = std::fs::read_to_string(&job_desc)
                .with_context(|| format!("Failed to read {}", job_desc.display()))?;
            let data = unwrap_response(connect()?.start(&ctx, requestor, &descriptor).await?)?;
            println!(
                "{}",
                format!("✓ Job {} started", data.job_id).green().bold()
            );
        }

        Commands::Stop { job_id } => {
            unwrap_response(connect()?.stop(&ctx, requestor, job_id).await?)?;
            println!("{}", format!("✓ Job {} stopped", job_id).green().bold());
        }

        Commands::Status { job_id } => {
            let data = unwrap_response(connect()?.status(&ctx, requestor, job_id).await?)?;
            match data.status {
                Some(status) => {
                    let row = StatusRow {
                        name: status.name,
                        state: status.state,
                        error: status.state_error,
                    };
                    println!("{}", Table::new(vec![row]));
                }
                None => println!("{}", format!("No status for job {}", job_id).yellow()),
            }
        }

        Commands::Retry { job_id } => {
            let data = unwrap_response(connect()?.retry(&ctx, requestor, job_id).await?)?;
            println!(
                "{}",
                format!(
                    "✓ Job {} retried as job {} (run {})",
                    job_id, data.job_id, data.run_id
                )
                .green()
                .bold()
            );
        }

        Commands::List { states, tags } => {
            let data = unwrap_response(connect()?.list(&ctx, requestor, &states, &tags).await?)?;
            if data.job_ids.is_empty() {
                println!("{}", "No matching jobs".yellow());
            } else {
                let rows: Vec<JobRow> = data
                    .job_ids
                    .into_iter()
                    .map(|job_id| JobRow { job_id })
                    .collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Run {
            step,
            params,
            target,
        } => {
            let raw = read_json(&params)?;
            let target = parse_target(&target)?;
            match step.as_str() {
                steprun_steps::bios_settings_set::NAME => {
                    let step = BiosSettingsSet::new(raw)?;
                    step.validate_parameters()?;
                    run_step(&ctx, step, target).await?;
                }
                steprun_steps::job_status::NAME => {
                    let step = JobStatusStep::new(raw)?;
                    step.validate_parameters()?;
                    run_step(&ctx, step, target).await?;
                }
                other => anyhow::bail!("unknown step '{}'", other),
            }
        }
    }

    Ok(())
}
