//! pagerun CLI - runs a suite of vision-guided web tests.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pagerun_agent::RoundController;
use pagerun_runner::{report_all, ReportSink, RetryController, Scheduler};
use pagerun_vlm::VlmClient;
use pagerun_webdriver::WebDriverFactory;

mod cli;
mod config;
mod error;
mod loader;
mod report;

use cli::Args;
use config::AppConfig;
use error::CliError;
use report::{ConsoleSink, JsonFileSink};

/// Exit status when the user interrupts the run.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(args.log_directive().parse()?))
        .with_target(args.verbose)
        .init();

    Ok(run(args).await?)
}

async fn run(args: Args) -> Result<ExitCode, CliError> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    config.apply_args(&args);

    let tasks = loader::load_tasks(&args.tasks)?;
    let tasks = args.selection().apply(tasks)?;
    info!(
        tasks = tasks.len(),
        parallel = config.runner.parallel,
        model = %config.vlm.model,
        webdriver = %config.webdriver.webdriver_url,
        "Starting pagerun"
    );

    let decider = Arc::new(VlmClient::new(config.vlm.clone())?);
    let controller = RoundController::new(Arc::new(config.agent.clone()), decider);
    let sessions = Arc::new(WebDriverFactory::new(config.webdriver.clone()));
    let retry = RetryController::new(controller, sessions, config.runner.close_timeout());
    let scheduler = Scheduler::new(config.runner.clone(), retry)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight calls");
            interrupt.cancel();
        }
    });

    let summary = scheduler.run(tasks, cancel.clone()).await?;

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(ConsoleSink)];
    if let Some(path) = &args.output {
        sinks.push(Box::new(JsonFileSink::new(path)));
    }
    report_all(&sinks, &summary).await?;

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
