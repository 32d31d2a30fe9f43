//! Persistence seam for the parameter document the render engine reads.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::render::{JobId, RenderParameters};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write render parameters to `{}`", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove render parameters at `{}`", path.display())]
    DiscardFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write the parameters for `job_id` and return the absolute path the
    /// render engine should read them from.
    async fn persist(
        &self,
        job_id: JobId,
        parameters: &RenderParameters,
    ) -> Result<PathBuf, StoreError>;

    /// Remove a previously persisted document. Missing files are not an error.
    async fn discard(&self, locator: &Path) -> Result<(), StoreError>;
}
