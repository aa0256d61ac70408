use std::process::ExitCode;

use anyhow::{Context, Result};
use posfact_core::{
    build_store, default_fact_tasks, select_tasks, FactTaskRunner, ObjectGateway, Orchestrator,
    PipelineSettings, RunSummary,
};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const EXIT_TASK_FAILED: u8 = 1;
const EXIT_STARTUP_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match PipelineSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(EXIT_STARTUP_FAILED);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(settings.log_level).into())
                .from_env_lossy(),
        )
        .json()
        .init();

    match run(&settings).await {
        Ok(summary) if summary.all_succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_TASK_FAILED),
        Err(err) => {
            error!(error = %format!("{err:#}"), "pipeline failed to start");
            ExitCode::from(EXIT_STARTUP_FAILED)
        }
    }
}

async fn run(settings: &PipelineSettings) -> Result<RunSummary> {
    let tasks = select_tasks(default_fact_tasks(), settings.fact_filter.as_deref());
    let store = build_store(settings)
        .await
        .context("failed to initialize object store")?;

    info!(
        bucket = %settings.bucket_name,
        batch_size = settings.batch_size,
        tasks = tasks.len(),
        "starting pipeline run"
    );

    let runner = FactTaskRunner::new(ObjectGateway::new(store), settings.batch_size);
    let summary = Orchestrator::new(runner, tasks).run().await;

    let rendered = serde_json::to_string(&summary).context("failed to encode run summary")?;
    info!(summary = %rendered, "pipeline run complete");
    Ok(summary)
}
