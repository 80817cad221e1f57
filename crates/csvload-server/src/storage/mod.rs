//! Local upload store
//!
//! Uploaded bodies are streamed straight to a file under one directory, which is
//! created on first use.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid stored file name '{0}'")]
    InvalidName(String),

    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read upload body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a stored name resolves to. Names must be a single path component.
    pub fn path_for(&self, file_name: &str) -> StorageResult<PathBuf> {
        let is_plain = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\']);

        if !is_plain {
            return Err(StorageError::InvalidName(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }

    pub async fn ensure_dir(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Stream `body` into `<dir>/<file_name>`.
    ///
    /// A partially written file is removed when the body or a write fails mid-way.
    #[instrument(skip(self, body))]
    pub async fn save<S, E>(&self, file_name: &str, body: S) -> StorageResult<StoredFile>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let path = self.path_for(file_name)?;
        self.ensure_dir().await?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        let written = write_body(&path, &mut file, body).await;
        drop(file);

        let size = match written {
            Ok(size) => size,
            Err(err) => {
                self.discard(&path).await;
                return Err(err);
            },
        };
        debug!(path = %path.display(), size, "Upload written");

        info!(file = %file_name, size, "File saved");
        Ok(StoredFile { path, size })
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

async fn write_body<S, E>(path: &Path, file: &mut tokio::fs::File, body: S) -> StorageResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut size = 0u64;

    futures::pin_mut!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| StorageError::Body(Box::new(err)))?;
        file.write_all(&chunk).await.map_err(write_err)?;
        size += chunk.len() as u64;
    }

    file.flush().await.map_err(write_err)?;
    Ok(size)
}
