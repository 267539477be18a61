//! Directory publisher — writes rendered cards to a local folder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::cards::RenderedImage;
use crate::channels::ArtifactPublisher;
use crate::error::ChannelError;

pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactPublisher for DirectoryPublisher {
    async fn publish(
        &self,
        image: &RenderedImage,
        filename: &str,
        _caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        // Only the final component is used so a filename can't escape the directory.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| ChannelError::SendFailed {
                name: "directory".into(),
                reason: format!("invalid filename {filename:?}"),
            })?;

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        fs::write(&path, &image.bytes).await?;

        info!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            "Card written"
        );
        Ok(())
    }
}
