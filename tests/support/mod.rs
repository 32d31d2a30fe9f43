#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use captionreel::{
    application::{
        captions::{CaptionError, CaptionGenerator},
        invoker::{InvocationError, RenderInvoker},
        pipeline::{PipelineConfig, RenderPipeline},
        store::{ParameterStore, StoreError},
    },
    domain::render::{CaptionResult, JobId, PromptText, RenderJobOutcome, RenderParameters},
    infra::{artifacts::ArtifactStorage, params::FsParameterStore},
};
use tempfile::TempDir;

pub const FAKE_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video";

pub struct StubCaptions {
    result: Result<CaptionResult, CaptionError>,
    pub calls: AtomicUsize,
}

impl StubCaptions {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(CaptionResult::new(text).expect("caption text")),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: CaptionError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionGenerator for StubCaptions {
    async fn generate_captions(&self, prompt: &PromptText) -> Result<CaptionResult, CaptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            // Echo the prompt so concurrent runs can be told apart.
            Ok(captions) => Ok(CaptionResult::new(format!(
                "{}\n{}",
                captions.text(),
                prompt.as_str()
            ))
            .expect("caption text")),
            Err(err) => Err(err.clone()),
        }
    }
}

/// Filesystem store that counts writes, or refuses every write.
pub struct CountingStore {
    inner: FsParameterStore,
    fail_writes: bool,
    pub persisted: AtomicUsize,
}

impl CountingStore {
    pub fn new(root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            inner: FsParameterStore::new(root).expect("store"),
            fail_writes: false,
            persisted: AtomicUsize::new(0),
        })
    }

    pub fn failing(root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            inner: FsParameterStore::new(root).expect("store"),
            fail_writes: true,
            persisted: AtomicUsize::new(0),
        })
    }

    pub fn persisted(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterStore for CountingStore {
    async fn persist(
        &self,
        job_id: JobId,
        parameters: &RenderParameters,
    ) -> Result<PathBuf, StoreError> {
        if self.fail_writes {
            return Err(StoreError::WriteFailed {
                path: self.inner.path_for(job_id),
                source: std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
            });
        }
        let path = self.inner.persist(job_id, parameters).await?;
        self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }

    async fn discard(&self, locator: &Path) -> Result<(), StoreError> {
        self.inner.discard(locator).await
    }
}

#[derive(Debug, Clone)]
pub enum EngineBehavior {
    /// Copy the parameter document into the output and exit 0.
    Succeed,
    /// Exit 0 without writing any output.
    SucceedWithoutOutput,
    /// Write a partial output, then exit with `code`.
    Fail { code: i32, stderr: String },
    TimeOut { stderr: String },
    Missing,
}

pub struct StubEngine {
    behavior: EngineBehavior,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubEngine {
    pub fn new(behavior: EngineBehavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    pub fn with_delay(behavior: EngineBehavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderInvoker for StubEngine {
    async fn invoke(
        &self,
        parameters: &Path,
        output: &Path,
    ) -> Result<RenderJobOutcome, InvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match &self.behavior {
            EngineBehavior::Succeed => {
                let document = tokio::fs::read(parameters).await.expect("parameters");
                let mut video = FAKE_VIDEO.to_vec();
                video.extend_from_slice(&document);
                tokio::fs::write(output, video).await.expect("output");
                Ok(RenderJobOutcome {
                    exit_code: 0,
                    stdout: "Rendered".to_string(),
                    stderr: String::new(),
                })
            }
            EngineBehavior::SucceedWithoutOutput => Ok(RenderJobOutcome {
                exit_code: 0,
                stdout: "Rendered".to_string(),
                stderr: String::new(),
            }),
            EngineBehavior::Fail { code, stderr } => {
                tokio::fs::write(output, b"partial").await.expect("partial");
                Ok(RenderJobOutcome {
                    exit_code: *code,
                    stdout: String::new(),
                    stderr: stderr.clone(),
                })
            }
            EngineBehavior::TimeOut { stderr } => {
                tokio::fs::write(output, b"partial").await.expect("partial");
                Err(InvocationError::TimedOut {
                    timeout: Duration::from_secs(300),
                    stderr: stderr.clone(),
                })
            }
            EngineBehavior::Missing => Err(InvocationError::Launch {
                program: "npx".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub captions: Arc<StubCaptions>,
    pub store: Arc<CountingStore>,
    pub engine: Arc<StubEngine>,
    pub pipeline: Arc<RenderPipeline>,
}

impl Harness {
    pub fn params_dir(&self) -> PathBuf {
        self.dir.path().join("render-params")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.dir.path().join("videos")
    }

    pub fn params_files(&self) -> usize {
        count_files(&self.params_dir())
    }

    pub fn video_files(&self) -> usize {
        count_files(&self.videos_dir())
    }
}

pub struct HarnessBuilder {
    captions: Arc<StubCaptions>,
    failing_store: bool,
    engine: Arc<StubEngine>,
    config: PipelineConfig,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            captions: StubCaptions::ok("Line one\nLine two"),
            failing_store: false,
            engine: StubEngine::new(EngineBehavior::Succeed),
            config: PipelineConfig::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn captions(mut self, captions: Arc<StubCaptions>) -> Self {
        self.captions = captions;
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.failing_store = true;
        self
    }

    pub fn engine(mut self, engine: Arc<StubEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn max_concurrent_renders(mut self, count: usize) -> Self {
        self.config.max_concurrent_renders = count;
        self
    }

    pub fn stderr_excerpt_bytes(mut self, bytes: usize) -> Self {
        self.config.stderr_excerpt_bytes = bytes;
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let store = if self.failing_store {
            CountingStore::failing(dir.path().join("render-params"))
        } else {
            CountingStore::new(dir.path().join("render-params"))
        };
        let artifacts =
            Arc::new(ArtifactStorage::new(dir.path().join("videos")).expect("artifact storage"));

        let pipeline = Arc::new(RenderPipeline::new(
            self.captions.clone(),
            store.clone(),
            self.engine.clone(),
            artifacts,
            self.config,
        ));

        Harness {
            dir,
            captions: self.captions,
            store,
            engine: self.engine,
            pipeline,
        }
    }
}

fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).count(),
        Err(_) => 0,
    }
}
