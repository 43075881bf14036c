//! Where received files go.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::info;

use crate::TransferError;
use crate::validation::sanitize_file_name;

/// Highest numeric suffix tried when a file name is taken.
const MAX_NAME_SUFFIX: u32 = 9999;

/// A boxed future returned by [`FileSink::save`]; resolves to where the file
/// ended up.
pub type SaveFuture<'a> = Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>>;

/// Destination for a fully received file.
pub trait FileSink: Send + Sync {
    fn save<'a>(&'a self, name: &'a str, mime_type: &'a str, data: Vec<u8>) -> SaveFuture<'a>;
}

// ---------------------------------------------------------------------------
// DirectorySink
// ---------------------------------------------------------------------------

/// Writes received files into a directory, never overwriting.
///
/// `report.pdf` becomes `report (1).pdf` when the name is taken.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_path(&self, name: &str) -> Result<PathBuf, TransferError> {
        let candidate = self.dir.join(name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, ext) = match name.rfind('.') {
            Some(i) if i > 0 => (&name[..i], &name[i..]),
            _ => (name, ""),
        };
        for n in 1..=MAX_NAME_SUFFIX {
            let candidate = self.dir.join(format!("{stem} ({n}){ext}"));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(TransferError::InvalidName(format!(
            "no free name for {name} in {}",
            self.dir.display()
        )))
    }
}

impl FileSink for DirectorySink {
    fn save<'a>(&'a self, name: &'a str, _mime_type: &'a str, data: Vec<u8>) -> SaveFuture<'a> {
        Box::pin(async move {
            let name = sanitize_file_name(name)?;
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.free_path(&name).await?;
            tokio::fs::write(&path, &data).await?;
            info!(path = %path.display(), size = data.len(), "file saved");
            Ok(path.display().to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// A file kept by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Keeps received files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<StoredFile>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn files(&self) -> Vec<StoredFile> {
        self.files.lock().await.clone()
    }
}

impl FileSink for MemorySink {
    fn save<'a>(&'a self, name: &'a str, mime_type: &'a str, data: Vec<u8>) -> SaveFuture<'a> {
        Box::pin(async move {
            let name = sanitize_file_name(name)?;
            let mut files = self.files.lock().await;
            files.push(StoredFile {
                name: name.clone(),
                mime_type: mime_type.to_string(),
                data,
            });
            Ok(format!("memory:{name}"))
        })
    }
}

impl<T: FileSink + ?Sized> FileSink for std::sync::Arc<T> {
    fn save<'a>(&'a self, name: &'a str, mime_type: &'a str, data: Vec<u8>) -> SaveFuture<'a> {
        (**self).save(name, mime_type, data)
    }
}
