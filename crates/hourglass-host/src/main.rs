use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use hourglass_core::{HourglassConfig, JobKey, TriggerKey};
use hourglass_engine::{Job, JobContext, JobDetail, JobError, Schedule, Trigger};
use hourglass_service::LifecycleController;
use tracing::info;

/// hourglass-host - run an in-memory scheduler until Ctrl-C
#[derive(Parser)]
#[command(name = "hourglass-host")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to hourglass.toml (default: ~/.hourglass/hourglass.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Schedule a heartbeat job that logs every N seconds
    #[arg(long, value_name = "SECS")]
    heartbeat_secs: Option<u64>,
}

/// Built-in `log` job type: writes the firing and its data to the log.
struct LogJob;

#[async_trait]
impl Job for LogJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let data = serde_json::Value::Object(ctx.merged_data);
        info!(
            job = %ctx.job_key,
            trigger = %ctx.trigger_key,
            fire_instance = %ctx.fire_instance_id,
            scheduled = %ctx.scheduled_fire_time,
            %data,
            "job fired"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // a bad config must stop the host before anything is registered
    let config = HourglassConfig::load(cli.config.as_deref()).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .init();

    let controller =
        LifecycleController::new(&config.scheduler).context("creating scheduler engine")?;
    let facade = controller.facade()?;
    facade.register_job_type("log", Arc::new(LogJob));

    if let Some(secs) = cli.heartbeat_secs {
        let job = JobDetail::new(JobKey::new("heartbeat", "host"), "log")
            .with_description("periodic liveness message")
            .with_data("message", "still alive");
        let trigger = Trigger::new(
            TriggerKey::new("heartbeat", "host"),
            job.key.clone(),
            Schedule::every_secs(secs),
        );
        let first = facade.schedule_job(job, trigger).await?;
        info!(every_secs = secs, first_fire = %first, "heartbeat scheduled");
    }

    controller.start().await?;
    info!(
        scheduler = %facade.scheduler_name(),
        instance_id = %facade.scheduler_instance_id(),
        "hourglass host running; Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    controller.close().await?;
    Ok(())
}
