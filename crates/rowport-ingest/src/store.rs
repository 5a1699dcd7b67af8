//! Where uploaded file content lives

use async_trait::async_trait;
use rowport_common::{Result, RowportError};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::catalog::ImportFile;

/// Storage for uploaded files
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Copy the file's content to a local temporary path
    ///
    /// The copy is removed when the returned [`TempPath`] drops.
    async fn download(&self, file: &ImportFile) -> Result<TempPath>;

    /// Remove the file's content from the store
    async fn delete(&self, file: &ImportFile) -> Result<()>;
}

/// Files under a local root directory, addressed by relative `url`
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file: &ImportFile) -> Result<PathBuf> {
        let relative = Path::new(&file.url);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(RowportError::config(format!(
                "file url '{}' must stay inside the store root",
                file.url
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn download(&self, file: &ImportFile) -> Result<TempPath> {
        let source = self.resolve(file)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(RowportError::not_found(format!(
                "stored content for '{}' at {}",
                file.file_name,
                source.display()
            )));
        }

        let target = tempfile::Builder::new()
            .prefix("rowport-")
            .suffix(".csv")
            .tempfile()?
            .into_temp_path();
        let bytes = tokio::fs::copy(&source, &target).await?;
        debug!(file = %file.file_name, bytes, "Downloaded file to temporary path");
        Ok(target)
    }

    async fn delete(&self, file: &ImportFile) -> Result<()> {
        let path = self.resolve(file)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(file = %file.file_name, "Deleted loaded file from store");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
