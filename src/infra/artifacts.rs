//! Filesystem storage for rendered videos.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

use crate::domain::render::JobId;

/// Public path prefix artifacts are served under.
pub const PUBLIC_PREFIX: &str = "/videos";

const VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid artifact name")]
    InvalidName,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory holding one `<job-id>.mp4` per successful render.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        let root = std::path::absolute(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path the render engine writes the video for `job_id` to.
    pub fn output_path(&self, job_id: JobId) -> PathBuf {
        self.root.join(file_name(job_id))
    }

    /// Public locator for the video of `job_id`.
    pub fn locator(&self, job_id: JobId) -> String {
        format!("{PUBLIC_PREFIX}/{}", file_name(job_id))
    }

    /// Filesystem path behind a public locator such as `/videos/<job-id>.mp4`.
    pub fn path_of(&self, locator: &str) -> Result<PathBuf, ArtifactError> {
        let name = locator
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or(ArtifactError::InvalidName)?;
        self.resolve(name)
    }

    /// Read a stored video by its file name.
    pub async fn read(&self, name: &str) -> Result<Bytes, ArtifactError> {
        let absolute = self.resolve(name)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the (possibly partial) video of `job_id`. Missing files are treated as success.
    pub async fn discard(&self, job_id: JobId) -> Result<(), ArtifactError> {
        match fs::remove_file(self.output_path(job_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ArtifactError::Io(err)),
        }
    }

    /// Only plain `*.mp4` file names directly under the root are addressable.
    fn resolve(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(name);
        let mut components = relative.components();
        let single_file = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_file {
            return Err(ArtifactError::InvalidName);
        }

        let is_video = relative
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION));
        if !is_video {
            return Err(ArtifactError::InvalidName);
        }

        Ok(self.root.join(relative))
    }
}

fn file_name(job_id: JobId) -> String {
    format!("{job_id}.{VIDEO_EXTENSION}")
}
