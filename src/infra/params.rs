//! Filesystem-backed parameter documents.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::{
    application::store::{ParameterStore, StoreError},
    domain::render::{JobId, RenderParameters},
};

/// Writes `<root>/<job-id>.json` for each run.
#[derive(Debug, Clone)]
pub struct FsParameterStore {
    root: PathBuf,
}

impl FsParameterStore {
    /// The directory is created lazily on first write.
    pub fn new(root: PathBuf) -> Result<Self, io::Error> {
        let root = std::path::absolute(root)?;
        Ok(Self { root })
    }

    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }
}

#[async_trait]
impl ParameterStore for FsParameterStore {
    async fn persist(
        &self,
        job_id: JobId,
        parameters: &RenderParameters,
    ) -> Result<PathBuf, StoreError> {
        let path = self.path_for(job_id);
        let write_failed = |source: io::Error| StoreError::WriteFailed {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.root).await.map_err(write_failed)?;

        let document = serde_json::to_vec_pretty(parameters)
            .map_err(|err| write_failed(io::Error::other(err)))?;

        // create_new: a job id never writes twice.
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_failed)?;
        file.write_all(&document).await.map_err(write_failed)?;
        file.flush().await.map_err(write_failed)?;

        debug!(
            target = "infra::params",
            job_id = %job_id,
            path = %path.display(),
            bytes = document.len(),
            "Render parameters written"
        );

        Ok(path)
    }

    async fn discard(&self, locator: &Path) -> Result<(), StoreError> {
        match fs::remove_file(locator).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::DiscardFailed {
                path: locator.to_path_buf(),
                source,
            }),
        }
    }
}
