//! Render orchestration: prompt → captions → parameter document → engine → video.
//!
//! Stages run strictly in sequence and fail fast; nothing is retried here.
//! Every file a run touches is keyed by a fresh [`JobId`], so concurrent runs
//! never share paths. The render semaphore only bounds how many engine
//! processes run at once.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        captions::{CaptionError, CaptionGenerator},
        invoker::{InvocationError, RenderInvoker},
        store::{ParameterStore, StoreError},
    },
    domain::{
        error::DomainError,
        render::{JobId, RenderParameters, RenderRequest, VideoArtifact},
    },
    infra::artifacts::ArtifactStorage,
};

const TARGET: &str = "application::pipeline";

pub const DEFAULT_STDERR_EXCERPT_BYTES: usize = 2000;
pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid render request")]
    InvalidInput(#[source] DomainError),
    #[error("caption generation failed")]
    CaptionGenerationFailed(#[source] CaptionError),
    #[error("render parameters could not be persisted")]
    PersistenceFailed(#[source] StoreError),
    #[error("render engine could not be run")]
    InvocationError(#[source] InvocationError),
    #[error("render engine exited with code {exit_code}")]
    RenderFailed { exit_code: i32, stderr_excerpt: String },
    #[error("render engine did not finish within {}s", timeout.as_secs())]
    RenderTimedOut {
        timeout: Duration,
        stderr_excerpt: String,
    },
    #[error("render engine exited cleanly without writing {}", output.display())]
    MissingOutput { output: PathBuf },
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "validate",
            Self::CaptionGenerationFailed(_) => "captions",
            Self::PersistenceFailed(_) => "persist",
            Self::InvocationError(_)
            | Self::RenderFailed { .. }
            | Self::RenderTimedOut { .. }
            | Self::MissingOutput { .. } => "render",
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::CaptionGenerationFailed(CaptionError::UpstreamUnavailable { .. }) => {
                "upstream_unavailable"
            }
            Self::CaptionGenerationFailed(CaptionError::MalformedUpstreamResponse { .. }) => {
                "malformed_upstream_response"
            }
            Self::PersistenceFailed(_) => "store_write_failed",
            Self::InvocationError(_) => "invocation_error",
            Self::RenderFailed { .. } => "render_failed",
            Self::RenderTimedOut { .. } => "render_timed_out",
            Self::MissingOutput { .. } => "missing_output",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub max_concurrent_renders: usize,
    pub stderr_excerpt_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            stderr_excerpt_bytes: DEFAULT_STDERR_EXCERPT_BYTES,
        }
    }
}

pub struct RenderPipeline {
    captions: Arc<dyn CaptionGenerator>,
    store: Arc<dyn ParameterStore>,
    invoker: Arc<dyn RenderInvoker>,
    artifacts: Arc<ArtifactStorage>,
    render_slots: Semaphore,
    stderr_excerpt_bytes: usize,
}

impl RenderPipeline {
    pub fn new(
        captions: Arc<dyn CaptionGenerator>,
        store: Arc<dyn ParameterStore>,
        invoker: Arc<dyn RenderInvoker>,
        artifacts: Arc<ArtifactStorage>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            captions,
            store,
            invoker,
            artifacts,
            render_slots: Semaphore::new(config.max_concurrent_renders.max(1)),
            stderr_excerpt_bytes: config.stderr_excerpt_bytes,
        }
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStorage> {
        &self.artifacts
    }

    /// Execute one render run.
    pub async fn render_video(
        &self,
        request: RenderRequest,
    ) -> Result<VideoArtifact, PipelineError> {
        let job_id = JobId::new();
        let started_at = Instant::now();

        let result = self.run(job_id, request).await;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match &result {
            Ok(artifact) => {
                counter!("captionreel_render_total", "outcome" => "succeeded").increment(1);
                info!(
                    target = TARGET,
                    op = "pipeline::render_video",
                    job_id = %job_id,
                    result = "ok",
                    elapsed_ms,
                    output_path = %artifact.path,
                    "Render run completed"
                );
            }
            Err(err) => {
                counter!("captionreel_render_total", "outcome" => err.outcome()).increment(1);
                if matches!(err, PipelineError::InvalidInput(_)) {
                    warn!(
                        target = TARGET,
                        op = "pipeline::render_video",
                        job_id = %job_id,
                        result = "rejected",
                        error = %err,
                        "Render request rejected"
                    );
                } else {
                    error!(
                        target = TARGET,
                        op = "pipeline::render_video",
                        job_id = %job_id,
                        result = "error",
                        stage = err.stage(),
                        elapsed_ms,
                        error = %err,
                        cause = %error_chain(err),
                        "Render run failed"
                    );
                }
            }
        }

        result
    }

    async fn run(
        &self,
        job_id: JobId,
        request: RenderRequest,
    ) -> Result<VideoArtifact, PipelineError> {
        let prompt = request.validate().map_err(PipelineError::InvalidInput)?;

        let stage_started = Instant::now();
        let captions = self
            .captions
            .generate_captions(&prompt)
            .await
            .map_err(PipelineError::CaptionGenerationFailed)?;
        record_stage("captions", stage_started);
        debug!(
            target = TARGET,
            job_id = %job_id,
            caption_lines = captions.line_count(),
            captions = %captions.text(),
            "Captions generated"
        );

        let stage_started = Instant::now();
        let parameters = RenderParameters::from_captions(&captions);
        let parameters_path = self
            .store
            .persist(job_id, &parameters)
            .await
            .map_err(PipelineError::PersistenceFailed)?;
        record_stage("persist", stage_started);

        let output_path = self.artifacts.output_path(job_id);

        let render = {
            // The semaphore is never closed, so acquire only fails if it is.
            let _permit = self.render_slots.acquire().await.ok();
            let stage_started = Instant::now();
            let render = self.invoker.invoke(&parameters_path, &output_path).await;
            record_stage("render", stage_started);
            render
        };

        let failure = match render {
            Ok(outcome) if outcome.succeeded() => {
                debug!(
                    target = TARGET,
                    job_id = %job_id,
                    stdout_bytes = outcome.stdout.len(),
                    stderr_bytes = outcome.stderr.len(),
                    "Render engine finished"
                );
                if tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
                    return Ok(VideoArtifact::mp4(self.artifacts.locator(job_id)));
                }
                PipelineError::MissingOutput {
                    output: output_path.clone(),
                }
            }
            Ok(outcome) => PipelineError::RenderFailed {
                exit_code: outcome.exit_code,
                stderr_excerpt: stderr_excerpt(&outcome.stderr, self.stderr_excerpt_bytes),
            },
            Err(InvocationError::TimedOut { timeout, stderr }) => PipelineError::RenderTimedOut {
                timeout,
                stderr_excerpt: stderr_excerpt(&stderr, self.stderr_excerpt_bytes),
            },
            Err(err) => PipelineError::InvocationError(err),
        };

        self.release_job_files(job_id, &parameters_path).await;
        Err(failure)
    }

    async fn release_job_files(&self, job_id: JobId, parameters_path: &Path) {
        if let Err(err) = self.artifacts.discard(job_id).await {
            warn!(
                target = TARGET,
                job_id = %job_id,
                error = %err,
                "Failed to remove partial render output"
            );
        }
        if let Err(err) = self.store.discard(parameters_path).await {
            warn!(
                target = TARGET,
                job_id = %job_id,
                error = %err,
                "Failed to remove render parameters"
            );
        }
    }
}

fn record_stage(stage: &'static str, started_at: Instant) {
    histogram!("captionreel_render_stage_ms", "stage" => stage)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut messages = Vec::new();
    let mut current = err.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages.join(": ")
}

/// Keep at most `limit` bytes from the end of `stderr`; engines print the fatal
/// error last.
pub fn stderr_excerpt(stderr: &str, limit: usize) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= limit {
        return trimmed.to_string();
    }

    let mut start = trimmed.len() - limit;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &trimmed[start..])
}
