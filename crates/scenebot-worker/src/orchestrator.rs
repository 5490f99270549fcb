//! End-to-end scene job orchestration.
//!
//! A job runs its stages strictly in sequence, tracked by
//! [`PipelineState`]. The job's [`WorkingDirectory`] is created before the
//! first stage and removed before any failure is returned; on success it
//! travels with the [`CompletedJob`] until the caller releases it.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use scenebot_media::fs_utils::extension_of;
use scenebot_media::{detect, normalize, split, validate, DetectProgress, MediaBackend, SplitOptions};
use scenebot_models::{JobFailure, JobId, MediaProbe, PipelineState, SceneFile, Stage};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::memory::{log_disk_space, MemoryMonitor};
use crate::progress::{ProgressPlan, ProgressReporter, ProgressSink};
use crate::reassemble::{ChunkReassembler, ChunkSource, ReassemblyProgress};
use crate::workdir::WorkingDirectory;

const DEFAULT_EXTENSION: &str = ".mp4";

/// Where a job's video comes from.
#[derive(Clone)]
pub enum JobInput {
    /// A file already on local disk
    LocalFile(PathBuf),
    /// A remote file fetched in byte ranges
    Chunked(Arc<dyn ChunkSource>),
}

impl JobInput {
    pub fn is_chunked(&self) -> bool {
        matches!(self, JobInput::Chunked(_))
    }
}

impl std::fmt::Debug for JobInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobInput::LocalFile(path) => f.debug_tuple("LocalFile").field(path).finish(),
            JobInput::Chunked(source) => f
                .debug_struct("Chunked")
                .field("total_size", &source.total_size())
                .field("file_name", &source.file_name())
                .finish(),
        }
    }
}

/// A finished job whose scene files are ready to hand off.
///
/// The scene files live in the job's working directory, which is deleted
/// by [`release`](Self::release) or when this value is dropped.
#[derive(Debug)]
pub struct CompletedJob {
    pub job_id: JobId,
    /// Ordered by index, `1..=N`
    pub scenes: Vec<SceneFile>,
    pub probe: MediaProbe,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    workdir: WorkingDirectory,
}

impl CompletedJob {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Delete the working directory once the scene files are consumed.
    pub async fn release(self) {
        self.workdir.remove().await;
    }
}

/// Runs scene jobs against a media backend.
pub struct ScenePipeline<B> {
    config: Arc<PipelineConfig>,
    backend: B,
}

impl<B: MediaBackend> ScenePipeline<B> {
    pub fn new(config: Arc<PipelineConfig>, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job under a fresh job ID.
    pub async fn run(
        &self,
        input: JobInput,
        sink: &dyn ProgressSink,
    ) -> Result<CompletedJob, JobFailure> {
        self.run_with_id(JobId::new(), input, sink).await
    }

    /// Run one job. `job_id` must not be in use by another job.
    pub async fn run_with_id(
        &self,
        job_id: JobId,
        input: JobInput,
        sink: &dyn ProgressSink,
    ) -> Result<CompletedJob, JobFailure> {
        let logger = JobLogger::new(&job_id, "scene_split");
        let span = logger.create_span();
        self.run_job(job_id, logger, input, sink)
            .instrument(span)
            .await
    }

    async fn run_job(
        &self,
        job_id: JobId,
        logger: JobLogger,
        input: JobInput,
        sink: &dyn ProgressSink,
    ) -> Result<CompletedJob, JobFailure> {
        let started_at = Utc::now();
        let chunked = input.is_chunked();
        let reporter = ProgressReporter::new(sink, ProgressPlan::for_input(chunked));
        let mut state = PipelineState::initial(chunked);
        logger.log_start(&format!("{input:?}"));

        let workdir = match WorkingDirectory::create(&self.config.work_dir, &job_id).await {
            Ok(workdir) => workdir,
            Err(e) => {
                let stage = state.stage().unwrap_or(Stage::Validating);
                return Err(self.fail(&logger, state, e.into_failure(stage)));
            }
        };

        let budget = self.config.timeouts.job;
        let outcome = {
            let stages = self.run_stages(&input, &workdir, &reporter, &logger, &mut state);
            tokio::time::timeout(budget, stages).await
        };
        let result = outcome.unwrap_or_else(|_| {
            warn!("Job exceeded {:?}", budget);
            Err(PipelineError::JobTimeout(budget))
        });

        match result {
            Ok((probe, scenes)) => {
                let finished_at = Utc::now();
                metrics::counter!("scenebot_jobs_total", "outcome" => "completed").increment(1);
                logger.log_completion(&format!(
                    "{} scenes in {:.1}s",
                    scenes.len(),
                    (finished_at - started_at).num_milliseconds() as f64 / 1000.0
                ));
                Ok(CompletedJob {
                    job_id,
                    scenes,
                    probe,
                    started_at,
                    finished_at,
                    workdir,
                })
            }
            Err(e) => {
                let stage = state.stage().unwrap_or(Stage::Validating);
                let failure = self.fail(&logger, state, e.into_failure(stage));
                workdir.remove().await;
                Err(failure)
            }
        }
    }

    fn fail(&self, logger: &JobLogger, state: PipelineState, failure: JobFailure) -> JobFailure {
        match state.fail(failure.kind) {
            Ok(failed) => info!("Pipeline state: {} -> {}", state, failed),
            Err(e) => warn!("{}", e),
        }
        metrics::counter!(
            "scenebot_jobs_total",
            "outcome" => "failed",
            "kind" => failure.kind.as_str()
        )
        .increment(1);
        logger.log_failure(failure.stage, &failure.message);
        failure
    }

    async fn run_stages(
        &self,
        input: &JobInput,
        workdir: &WorkingDirectory,
        reporter: &ProgressReporter<'_>,
        logger: &JobLogger,
        state: &mut PipelineState,
    ) -> PipelineResult<(MediaProbe, Vec<SceneFile>)> {
        let mut memory = MemoryMonitor::new();
        memory.checkpoint("job start");
        log_disk_space(workdir.path());

        let source_path = match input {
            JobInput::LocalFile(path) => path.clone(),
            JobInput::Chunked(source) => {
                enter(Stage::Reassembling, reporter, logger);
                let combined = workdir.combined_path(&self.combined_extension(source.as_ref()));
                let reassembler = ChunkReassembler::from_config(&self.config);
                let on_progress = |p: ReassemblyProgress| match p.fraction() {
                    Some(fraction) => reporter.update(Stage::Reassembling, fraction),
                    None => reporter.indeterminate(
                        Stage::Reassembling,
                        &format!(
                            "downloading, {:.1} MB received",
                            p.downloaded as f64 / (1024.0 * 1024.0)
                        ),
                    ),
                };
                timed(
                    Stage::Reassembling,
                    reassembler.reassemble(
                        source.as_ref(),
                        &workdir.chunks_dir(),
                        &combined,
                        &on_progress,
                    ),
                )
                .await?;
                advance(state)?;
                combined
            }
        };

        enter(Stage::Validating, reporter, logger);
        let limits = self.config.validation_limits();
        let probe = timed(
            Stage::Validating,
            validate(&source_path, &limits, &self.backend),
        )
        .await?;
        reporter.update(Stage::Validating, 1.0);
        advance(state)?;

        enter(Stage::Detecting, reporter, logger);
        memory.checkpoint("before detection");
        let options = self.config.detect_options(&probe);
        let on_detect = |p: DetectProgress| reporter.update(Stage::Detecting, p.fraction());
        let intervals = timed(
            Stage::Detecting,
            detect(
                &self.backend,
                &source_path,
                &probe,
                &options,
                self.config.timeouts.detect,
                &on_detect,
            ),
        )
        .await?;
        memory.checkpoint("after detection");
        advance(state)?;

        enter(Stage::Splitting, reporter, logger);
        let extension = extension_of(&source_path).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let options = SplitOptions::default()
            .with_extension(extension.clone())
            .with_timeout(self.config.timeouts.split);
        let on_split = |done: usize, total: usize| {
            reporter.update(Stage::Splitting, done as f64 / total.max(1) as f64)
        };
        timed(
            Stage::Splitting,
            split(
                &self.backend,
                &source_path,
                &intervals,
                &workdir.scenes_dir(),
                &options,
                &on_split,
            ),
        )
        .await?;
        memory.checkpoint("after splitting");
        advance(state)?;

        enter(Stage::Normalizing, reporter, logger);
        let scenes = timed(
            Stage::Normalizing,
            normalize(&workdir.scenes_dir(), &extension),
        )
        .await?;

        if input.is_chunked() {
            if let Err(e) = tokio::fs::remove_file(&source_path).await {
                logger.log_warning(&format!("could not remove reassembled input: {e}"));
            }
        }
        advance(state)?;
        reporter.complete("Scenes ready");

        Ok((probe, scenes))
    }

    /// Extension for the reassembled file: the source's own if supported.
    fn combined_extension(&self, source: &dyn ChunkSource) -> String {
        source
            .file_name()
            .and_then(|name| extension_of(Path::new(&name)))
            .filter(|ext| self.config.supported_extensions.contains(ext))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }
}

fn enter(stage: Stage, reporter: &ProgressReporter<'_>, logger: &JobLogger) {
    logger.log_stage(stage);
    reporter.stage_started(stage);
}

fn advance(state: &mut PipelineState) -> PipelineResult<()> {
    let next = state.advance()?;
    info!("Pipeline state: {} -> {}", state, next);
    *state = next;
    Ok(())
}

async fn timed<T, E, F>(stage: Stage, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = future.await;
    metrics::histogram!("scenebot_stage_duration_seconds", "stage" => stage.as_str())
        .record(start.elapsed().as_secs_f64());
    result
}
