use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Failed to prepare staging directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to list staging directory: {0}")]
    List(std::io::Error),
}

impl StagingError {
    /// The underlying I/O error, e.g. to tell a body-limit hit from a disk fault
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            StagingError::CreateDir { source, .. } | StagingError::Write { source, .. } => source,
            StagingError::List(source) => source,
        }
    }
}

#[derive(Debug)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Local directory holding uploads until the worker forwards them
#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub async fn ensure_dir(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Streams `reader` into the staging directory under `filename`.
    /// An existing file of the same name is replaced; a partial file is
    /// removed if the stream fails.
    pub async fn write_stream<R>(&self, filename: &str, mut reader: R) -> Result<StoredFile, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_dir().await?;
        let path = self.path_for(filename);

        let result = async {
            let mut file = fs::File::create(&path).await?;
            let size = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        match result {
            Ok(size) => Ok(StoredFile { path, size }),
            Err(source) => {
                if let Err(e) = fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial upload {}: {}", path.display(), e);
                    }
                }
                Err(StagingError::Write { path, source })
            }
        }
    }

    /// Regular, non-hidden files currently staged, sorted by name.
    /// A missing directory is reported as empty.
    pub async fn snapshot(&self) -> Result<Vec<PathBuf>, StagingError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Staging directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(StagingError::List(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StagingError::List)? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            // Entries can vanish between read_dir and file_type
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => files.push(entry.path()),
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        files.sort();
        Ok(files)
    }

    pub async fn remove(&self, path: &Path) -> std::io::Result<()> {
        fs::remove_file(path).await
    }
}
