//! Scene splitting worker binary.
//!
//! Usage: `scenebot-worker <video-path>...`

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use scenebot_media::{check_ffmpeg, check_ffprobe, FfmpegBackend};
use scenebot_models::{JobFailure, JobId, SceneFile};
use scenebot_worker::{init_tracing, JobInput, PipelineConfig, ScenePipeline, WorkingDirectory};

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum JobReport<'a> {
    Completed {
        input: &'a PathBuf,
        job_id: &'a JobId,
        duration_seconds: f64,
        scenes: &'a [SceneFile],
    },
    Failed {
        input: &'a PathBuf,
        failure: &'a JobFailure,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let inputs: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if inputs.is_empty() {
        anyhow::bail!("usage: scenebot-worker <video-path>...");
    }

    info!("Starting scenebot-worker");

    let config = PipelineConfig::from_env();
    config.validate()?;
    info!("Pipeline config: {:?}", config);

    check_ffmpeg()?;
    check_ffprobe()?;

    // Job directories left by a previous run are unreachable now
    let swept = WorkingDirectory::sweep_stale(&config.work_dir).await?;
    info!("Startup cleanup removed {} stale job directories", swept);

    let pipeline = ScenePipeline::new(Arc::new(config), FfmpegBackend::new());
    let sink = |percent: u8, label: &str| -> anyhow::Result<()> {
        info!(percent, "{}", label);
        Ok(())
    };

    let mut failures = 0usize;
    for input in &inputs {
        match pipeline.run(JobInput::LocalFile(input.clone()), &sink).await {
            Ok(job) => {
                let report = JobReport::Completed {
                    input,
                    job_id: &job.job_id,
                    duration_seconds: job.probe.duration_seconds,
                    scenes: &job.scenes,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
                job.release().await;
            }
            Err(failure) => {
                failures += 1;
                error!("{}: {}", input.display(), failure);
                let report = JobReport::Failed {
                    input,
                    failure: &failure,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    info!(
        "Processed {} inputs, {} failed",
        inputs.len(),
        failures
    );
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
