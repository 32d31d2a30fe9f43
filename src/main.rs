use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use captionreel::{
    application::{
        error::AppError,
        pipeline::{PipelineConfig, RenderPipeline},
    },
    config,
    domain::render::RenderRequest,
    infra::{
        artifacts::ArtifactStorage,
        engine::ProcessRenderInvoker,
        error::InfraError,
        gemini::GeminiCaptionGenerator,
        http::{self, HttpState},
        params::FsParameterStore,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

fn build_pipeline(settings: &config::Settings) -> Result<Arc<RenderPipeline>, AppError> {
    if !settings.render.project_dir.is_dir() {
        warn!(
            target = "captionreel::bootstrap",
            project_dir = %settings.render.project_dir.display(),
            "Render project directory does not exist; renders will fail until it does"
        );
    }

    let artifacts = Arc::new(
        ArtifactStorage::new(settings.artifacts.directory.clone()).map_err(InfraError::from)?,
    );
    let store =
        FsParameterStore::new(settings.render.params_directory.clone()).map_err(InfraError::from)?;
    let captions = GeminiCaptionGenerator::new(&settings.captions)?;
    let invoker = ProcessRenderInvoker::new(&settings.render);

    let config = PipelineConfig {
        max_concurrent_renders: settings.render.max_concurrency.get() as usize,
        stderr_excerpt_bytes: settings.render.stderr_excerpt_bytes.get(),
    };

    Ok(Arc::new(RenderPipeline::new(
        Arc::new(captions),
        Arc::new(store),
        Arc::new(invoker),
        artifacts,
        config,
    )))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings)?;
    let router = http::build_router(HttpState::new(pipeline.clone()));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "captionreel::bootstrap",
        addr = %settings.server.addr,
        artifacts = %pipeline.artifacts().root().display(),
        model = %settings.captions.model,
        max_concurrent_renders = settings.render.max_concurrency.get(),
        "Server running"
    );

    let (signal_tx, mut signal_rx) = watch::channel(());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signal_tx.send(());
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(&mut signal_rx, grace) => {
            warn!(
                target = "captionreel::bootstrap",
                grace_secs = grace.as_secs(),
                "In-flight requests did not drain before the shutdown deadline"
            );
        }
    }

    info!(target = "captionreel::bootstrap", "Server stopped");
    Ok(())
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings)?;

    info!(
        target = "captionreel::render",
        prompt_chars = args.prompt.chars().count(),
        "Starting one-off render"
    );

    let artifact = pipeline
        .render_video(RenderRequest::new(args.prompt))
        .await
        .map_err(|err| AppError::render(format!("{err} (stage: {})", err.stage())))?;

    let path = pipeline
        .artifacts()
        .path_of(&artifact.path)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{}", path.display());
    Ok(())
}

/// Resolves `grace` after the shutdown signal fired.
async fn drain_deadline(signal: &mut watch::Receiver<()>, grace: Duration) {
    if signal.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "captionreel::bootstrap",
        "Shutdown signal received, draining in-flight requests"
    );
}
