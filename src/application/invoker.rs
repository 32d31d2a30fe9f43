//! Seam for running the external video engine.

use std::{io, path::Path, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::render::RenderJobOutcome;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to launch render engine `{program}`")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed while waiting for render engine")]
    Wait(#[source] io::Error),
    #[error("render engine did not finish within {}s", timeout.as_secs())]
    TimedOut { timeout: Duration, stderr: String },
}

#[async_trait]
pub trait RenderInvoker: Send + Sync {
    /// Run the engine against `parameters`, asking it to write `output`.
    ///
    /// A non-zero exit is reported through [`RenderJobOutcome`]; only launch
    /// failures and timeouts are errors.
    async fn invoke(
        &self,
        parameters: &Path,
        output: &Path,
    ) -> Result<RenderJobOutcome, InvocationError>;
}
