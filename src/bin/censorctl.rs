//! `censorctl` — a local CLI front-end over the censorly pipeline. Not
//! part of the multi-tenant service proper (no HTTP, no auth); it exists
//! so the core pipeline can be exercised end-to-end from a terminal,
//! matching spec.md §6's exit-code contract for CLI front-ends.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use censorly::job::{JobConfig, JobErrorKind, JobFilter, JobInput, JobState, LanguageTag};
use censorly::media::CensorMode;
use censorly::{Service, ServiceConfig};

#[derive(Parser)]
#[command(name = "censorctl", about = "Submit and inspect video censoring jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the job registry database (default: platform data dir).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a video for censoring and wait for it to finish.
    Run {
        input: PathBuf,
        #[arg(long, value_enum, default_value = "beep")]
        mode: ModeArg,
        #[arg(long, default_value_t = 0.3)]
        threshold: f32,
        #[arg(long, default_value = "user-local")]
        user_id: String,
        output: PathBuf,
    },
    /// Print the current state of a job.
    Status { job_id: String },
    /// List jobs for a user.
    List { user_id: String },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Beep,
    Mute,
    Cut,
}

impl From<ModeArg> for CensorMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Beep => CensorMode::Beep { frequency_hz: 1000.0 },
            ModeArg::Mute => CensorMode::Mute,
            ModeArg::Cut => CensorMode::Cut,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    censorly::init_tracing();
    let cli = Cli::parse();

    let mut config = ServiceConfig::default();
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    let service = match Service::initialize(config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("failed to initialize service: {e}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Command::Run {
            input,
            mode,
            threshold,
            user_id,
            output,
        } => run_job(&service, input, mode, threshold, &user_id, output).await,
        Command::Status { job_id } => status(&service, &job_id).await,
        Command::List { user_id } => list(&service, &user_id).await,
    }
}

async fn run_job(
    service: &Service,
    input: PathBuf,
    mode: ModeArg,
    threshold: f32,
    user_id: &str,
    output: PathBuf,
) -> ExitCode {
    let object_ref = match service.object_store.put(&input).await {
        Ok(object_ref) => object_ref,
        Err(e) => {
            eprintln!("input unreadable: {e}");
            return ExitCode::from(2);
        }
    };

    let size_bytes = match std::fs::metadata(&input) {
        Ok(meta) => meta.len(),
        Err(e) => {
            eprintln!("input unreadable: {e}");
            return ExitCode::from(2);
        }
    };

    let config = JobConfig {
        mode: mode.into(),
        threshold,
        languages: vec![LanguageTag::Auto],
        ..JobConfig::default()
    };

    let job_input = JobInput {
        object_ref,
        size_bytes,
        duration_s: None,
    };

    let job_id = match service.submit(user_id, job_input, config).await {
        Ok(job_id) => job_id,
        Err(JobErrorKind::InvalidConfig) => {
            eprintln!("invalid config");
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("submit failed: {e}");
            return ExitCode::from(3);
        }
    };

    let pool_config = censorly::job::WorkerPoolConfig::default();
    let subscriptions = Service::default_subscriptions();
    let _pool = service.spawn_workers(pool_config, subscriptions, 1);

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let job = match service.get_job(&job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                eprintln!("job disappeared unexpectedly");
                return ExitCode::from(3);
            }
            Err(e) => {
                eprintln!("failed to poll job: {e}");
                return ExitCode::from(3);
            }
        };

        match job.state {
            JobState::Completed => {
                if let Err(e) = service.fetch_artifact(&job_id, &output).await {
                    eprintln!("failed to fetch artifact: {e}");
                    return ExitCode::from(3);
                }
                println!("censored output written to {}", output.display());
                return ExitCode::SUCCESS;
            }
            JobState::Failed => {
                let kind = job.error.map(|e| e.kind).unwrap_or(JobErrorKind::InternalError);
                eprintln!("job failed: {kind}");
                return ExitCode::from(match kind {
                    JobErrorKind::Timeout => 4,
                    JobErrorKind::Cancelled => 5,
                    _ => 3,
                });
            }
            JobState::Cancelled => {
                eprintln!("job cancelled");
                return ExitCode::from(5);
            }
            JobState::Pending | JobState::Running => continue,
        }
    }
}

async fn status(service: &Service, job_id: &str) -> ExitCode {
    match service.get_job(job_id).await {
        Ok(Some(job)) => {
            println!("{}", serde_json::to_string_pretty(&job).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("job not found");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(3)
        }
    }
}

async fn list(service: &Service, user_id: &str) -> ExitCode {
    match service.list_jobs(user_id, JobFilter::default()).await {
        Ok(jobs) => {
            for job in jobs {
                println!("{}\t{}\t{}%", job.job_id, job.state.as_str(), job.progress);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(3)
        }
    }
}
