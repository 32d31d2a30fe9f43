//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    fmt,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, PipelineOverrides, RenderArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "captionreel";
const ENV_PREFIX: &str = "CAPTIONREEL";
const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CAPTIONS_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CAPTIONS_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_CAPTIONS_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RENDER_PROGRAM: &str = "npx";
const DEFAULT_RENDER_PROGRAM_ARGS: [&str; 2] = ["remotion", "render"];
const DEFAULT_RENDER_PROJECT_DIR: &str = "TIKTOK";
const DEFAULT_RENDER_ENTRY_POINT: &str = "src/index.ts";
const DEFAULT_RENDER_COMPOSITION: &str = "CaptionedVideo";
const DEFAULT_RENDER_PARAMS_DIR: &str = "render-params";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RENDER_MAX_CONCURRENCY: u32 = 2;
const DEFAULT_STDERR_EXCERPT_BYTES: u64 = 2000;
const DEFAULT_ARTIFACTS_DIR: &str = "videos";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub captions: CaptionSettings,
    pub render: RenderSettings,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone)]
pub struct CaptionSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for CaptionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub program: PathBuf,
    pub program_args: Vec<String>,
    pub project_dir: PathBuf,
    pub entry_point: String,
    pub composition: String,
    pub params_directory: PathBuf,
    pub timeout: Duration,
    pub max_concurrency: NonZeroU32,
    pub stderr_excerpt_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("missing required credential `{key}` (set {env})")]
    MissingCredential {
        key: &'static str,
        env: &'static str,
    },
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(cli);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_pipeline_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    captions: RawCaptionSettings,
    render: RawRenderSettings,
    artifacts: RawArtifactSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, cli: &CliArgs) {
        if let Some(key) = cli.captions_api_key.as_ref() {
            self.captions.api_key = Some(key.clone());
        }
        if let Some(port) = cli.port {
            self.server.port = Some(port);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }

        self.apply_pipeline_overrides(&overrides.pipeline);
    }

    fn apply_pipeline_overrides(&mut self, overrides: &PipelineOverrides) {
        if let Some(model) = overrides.captions_model.as_ref() {
            self.captions.model = Some(model.clone());
        }
        if let Some(program) = overrides.render_program.as_ref() {
            self.render.program = Some(program.clone());
        }
        if let Some(dir) = overrides.render_project_dir.as_ref() {
            self.render.project_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.render_params_directory.as_ref() {
            self.render.params_directory = Some(dir.clone());
        }
        if let Some(seconds) = overrides.render_timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
        if let Some(count) = overrides.render_max_concurrency {
            self.render.max_concurrency = Some(count.into());
        }
        if let Some(dir) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(dir.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            captions,
            render,
            artifacts,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let captions = build_caption_settings(captions)?;
        let render = build_render_settings(render)?;
        let artifacts = build_artifact_settings(artifacts)?;

        Ok(Self {
            server,
            logging,
            captions,
            render,
            artifacts,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_caption_settings(captions: RawCaptionSettings) -> Result<CaptionSettings, LoadError> {
    let api_key = captions
        .api_key
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(LoadError::MissingCredential {
            key: "captions.api_key",
            env: CREDENTIAL_ENV,
        })?;

    let base_url = captions
        .base_url
        .unwrap_or_else(|| DEFAULT_CAPTIONS_BASE_URL.to_string());
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(LoadError::invalid(
            "captions.base_url",
            format!("`{base_url}` is not an http(s) URL"),
        ));
    }

    let model = captions
        .model
        .unwrap_or_else(|| DEFAULT_CAPTIONS_MODEL.to_string());
    if model.trim().is_empty() {
        return Err(LoadError::invalid("captions.model", "must not be empty"));
    }

    let timeout_secs = captions
        .request_timeout_seconds
        .unwrap_or(DEFAULT_CAPTIONS_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "captions.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CaptionSettings {
        api_key,
        base_url,
        model,
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let program = render
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_PROGRAM));
    if program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.program",
            "path must not be empty",
        ));
    }

    let program_args = render.program_args.unwrap_or_else(|| {
        DEFAULT_RENDER_PROGRAM_ARGS
            .iter()
            .map(|arg| arg.to_string())
            .collect()
    });

    let project_dir = render
        .project_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_PROJECT_DIR));
    if project_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.project_dir",
            "path must not be empty",
        ));
    }

    let entry_point = render
        .entry_point
        .unwrap_or_else(|| DEFAULT_RENDER_ENTRY_POINT.to_string());
    let composition = render
        .composition
        .unwrap_or_else(|| DEFAULT_RENDER_COMPOSITION.to_string());
    if composition.trim().is_empty() {
        return Err(LoadError::invalid(
            "render.composition",
            "must not be empty",
        ));
    }

    let params_directory = render
        .params_directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_PARAMS_DIR));
    if params_directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.params_directory",
            "path must not be empty",
        ));
    }

    let timeout_secs = render.timeout_seconds.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "render.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_concurrency = non_zero_u32(
        render
            .max_concurrency
            .unwrap_or(DEFAULT_RENDER_MAX_CONCURRENCY.into()),
        "render.max_concurrency",
    )?;

    let excerpt_bytes = render
        .stderr_excerpt_bytes
        .unwrap_or(DEFAULT_STDERR_EXCERPT_BYTES);
    let stderr_excerpt_bytes = usize::try_from(excerpt_bytes)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "render.stderr_excerpt_bytes",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(RenderSettings {
        program,
        program_args,
        project_dir,
        entry_point,
        composition,
        params_directory,
        timeout: Duration::from_secs(timeout_secs),
        max_concurrency,
        stderr_excerpt_bytes,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    Ok(ArtifactSettings { directory })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawCaptionSettings {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    request_timeout_seconds: Option<u64>,
}

impl fmt::Debug for RawCaptionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCaptionSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    program: Option<PathBuf>,
    program_args: Option<Vec<String>>,
    project_dir: Option<PathBuf>,
    entry_point: Option<String>,
    composition: Option<String>,
    params_directory: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    max_concurrency: Option<u64>,
    stderr_excerpt_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
