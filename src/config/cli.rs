use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the captionreel binary.
#[derive(Debug, Parser)]
#[command(name = "captionreel", version, about = "Prompt-to-video render server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CAPTIONREEL_CONFIG_FILE", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config_file: Option<PathBuf>,

    /// API key for the caption model.
    #[arg(
        long = "captions-api-key",
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        value_name = "KEY",
        global = true
    )]
    pub captions_api_key: Option<String>,

    /// Override the HTTP listener port.
    #[arg(long = "port", env = "PORT", value_name = "PORT", global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP render service.
    Serve(Box<ServeArgs>),
    /// Render a single prompt without starting the server.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: PipelineOverrides,

    /// Prompt describing the video.
    #[arg(value_name = "PROMPT")]
    pub prompt: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PipelineOverrides {
    /// Override the caption model name.
    #[arg(long = "captions-model", value_name = "MODEL")]
    pub captions_model: Option<String>,

    /// Override the render engine executable.
    #[arg(long = "render-program", value_name = "PATH")]
    pub render_program: Option<PathBuf>,

    /// Override the render project directory the engine runs in.
    #[arg(long = "render-project-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub render_project_dir: Option<PathBuf>,

    /// Override the directory parameter documents are written to.
    #[arg(long = "render-params-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub render_params_directory: Option<PathBuf>,

    /// Override the render wall-clock timeout.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub render_timeout_seconds: Option<u64>,

    /// Override the number of engine processes allowed to run at once.
    #[arg(long = "render-max-concurrency", value_name = "COUNT")]
    pub render_max_concurrency: Option<u32>,

    /// Override the directory rendered videos are written to.
    #[arg(long = "artifacts-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub pipeline: PipelineOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,
}
