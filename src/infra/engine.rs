//! Subprocess invocation of the external video engine.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time::Instant as TokioInstant,
};
use tracing::{info, warn};

use crate::{
    application::invoker::{InvocationError, RenderInvoker},
    config::RenderSettings,
    domain::render::RenderJobOutcome,
};

const TARGET: &str = "infra::engine";

/// How long to wait for output pipes to close after the engine was killed.
const KILLED_STREAM_GRACE: Duration = Duration::from_secs(2);

/// Runs `<program> <program_args..> <entry_point> <composition> <output> --props=<params>`
/// inside the render project directory.
#[derive(Debug, Clone)]
pub struct ProcessRenderInvoker {
    program: PathBuf,
    program_args: Vec<String>,
    project_dir: PathBuf,
    entry_point: String,
    composition: String,
    timeout: Duration,
}

impl ProcessRenderInvoker {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            program: settings.program.clone(),
            program_args: settings.program_args.clone(),
            project_dir: settings.project_dir.clone(),
            entry_point: settings.entry_point.clone(),
            composition: settings.composition.clone(),
            timeout: settings.timeout,
        }
    }

    pub fn command_args(&self, parameters: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.program_args.iter().map(OsString::from).collect();
        args.push(OsString::from(&self.entry_point));
        args.push(OsString::from(&self.composition));
        args.push(output.as_os_str().to_os_string());
        let mut props = OsString::from("--props=");
        props.push(parameters.as_os_str());
        args.push(props);
        args
    }
}

#[async_trait]
impl RenderInvoker for ProcessRenderInvoker {
    async fn invoke(
        &self,
        parameters: &Path,
        output: &Path,
    ) -> Result<RenderJobOutcome, InvocationError> {
        let started_at = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(self.command_args(parameters, output))
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The engine leads its own process group so its descendants can be
        // signalled together.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|err| {
            let error_code = if err.kind() == ErrorKind::NotFound {
                "engine_not_found"
            } else {
                "spawn_engine"
            };
            warn!(
                target = TARGET,
                op = "engine::invoke",
                result = "error",
                error_code,
                program = %self.program.display(),
                project_dir = %self.project_dir.display(),
                error = %err,
                "Failed to spawn render engine"
            );
            InvocationError::Launch {
                program: self.program.display().to_string(),
                source: err,
            }
        })?;
        let process_group = child.id();

        let mut stdout = tokio::spawn(drain(child.stdout.take(), "stdout"));
        let mut stderr = tokio::spawn(drain(child.stderr.take(), "stderr"));
        let deadline = TokioInstant::now() + self.timeout;

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                kill_process_group(process_group);
                return Err(InvocationError::Wait(err));
            }
            Err(_) => {
                kill_process_group(process_group);
                if let Err(err) = child.kill().await {
                    warn!(
                        target = TARGET,
                        op = "engine::invoke",
                        error = %err,
                        "Failed to kill timed out render engine"
                    );
                }
                stdout.abort();
                let stderr = collect_with_grace(stderr).await;
                warn!(
                    target = TARGET,
                    op = "engine::invoke",
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_secs = self.timeout.as_secs(),
                    "Render engine timed out and was killed"
                );
                return Err(InvocationError::TimedOut {
                    timeout: self.timeout,
                    stderr,
                });
            }
        };

        // Leftover descendants would hold the pipes open and could still write
        // the output after the run is over.
        kill_process_group(process_group);

        let drain_deadline = deadline.max(TokioInstant::now() + KILLED_STREAM_GRACE);
        let streams = tokio::time::timeout_at(drain_deadline, async {
            (collect(&mut stdout).await, collect(&mut stderr).await)
        })
        .await;
        let (stdout, stderr) = match streams {
            Ok(streams) => streams,
            Err(_) => {
                stdout.abort();
                stderr.abort();
                warn!(
                    target = TARGET,
                    op = "engine::invoke",
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_secs = self.timeout.as_secs(),
                    "Render engine output streams stayed open past the deadline"
                );
                return Err(InvocationError::TimedOut {
                    timeout: self.timeout,
                    stderr: String::new(),
                });
            }
        };
        let exit_code = status.code().unwrap_or(-1);

        if status.success() {
            info!(
                target = TARGET,
                op = "engine::invoke",
                result = "ok",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                output = %output.display(),
                "Render engine finished"
            );
        } else {
            warn!(
                target = TARGET,
                op = "engine::invoke",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code,
                error_code = "engine_exit",
                stderr_bytes = stderr.len(),
                "Render engine exited with failure"
            );
        }

        Ok(RenderJobOutcome {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// SIGKILL every process left in the engine's group. An empty group is fine.
#[cfg(unix)]
fn kill_process_group(leader: Option<u32>) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Some(pgid) = leader.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(
            target = TARGET,
            op = "engine::invoke",
            pgid,
            error = %err,
            "Failed to signal render engine process group"
        ),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_leader: Option<u32>) {}

async fn drain<R>(reader: Option<R>, stream: &'static str) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(err) = reader.read_to_end(&mut buffer).await {
            warn!(
                target = TARGET,
                stream,
                captured_bytes = buffer.len(),
                error = %err,
                "Render engine output capture was cut short"
            );
        }
    }
    buffer
}

async fn collect(handle: &mut JoinHandle<Vec<u8>>) -> String {
    match handle.await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

/// Grandchildren of a killed engine can keep the pipe open; do not wait on them.
async fn collect_with_grace(mut handle: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(KILLED_STREAM_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
