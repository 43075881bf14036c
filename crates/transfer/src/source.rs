//! Where outgoing file bytes come from.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::TransferError;

/// A boxed future returned by [`FileSource::read_at`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// A named, sized byte source read in slices.
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;

    fn size(&self) -> u64;

    fn mime_type(&self) -> &str;

    /// Reads up to `len` bytes at `offset`. Short only at end of file.
    fn read_at(&self, offset: u64, len: usize) -> ReadFuture<'_>;
}

/// A file on the local filesystem.
pub struct FsSource {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
    file: Mutex<tokio::fs::File>,
}

impl FsSource {
    /// Opens `path`; the MIME type is guessed from the extension.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(TransferError::InvalidName(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path,
            name,
            size: meta.len(),
            mime_type,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for FsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_at(&self, offset: u64, len: usize) -> ReadFuture<'_> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = Vec::with_capacity(len);
            (&mut *file).take(len as u64).read_to_end(&mut buf).await?;
            Ok(buf)
        })
    }
}

/// An in-memory file.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl FileSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_at(&self, offset: u64, len: usize) -> ReadFuture<'_> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        let slice = self.data[start..end].to_vec();
        Box::pin(async move { Ok(slice) })
    }
}
