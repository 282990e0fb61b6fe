//! Byte sources for uploads.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::trace;

use crate::error::{UploadError, UploadResult};

/// Where the bytes of an upload come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSource {
    /// A file on disk. Its file name is sent along with the bytes.
    Path(PathBuf),
    /// In-memory bytes with the file name to report.
    Bytes { name: String, data: Bytes },
}

impl ByteSource {
    /// Creates an in-memory source.
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Opens the source and reads its contents.
    ///
    /// A file that cannot be opened or read fails with
    /// [`UploadError::Transfer`]. In-memory sources share their buffer.
    pub async fn open(&self) -> UploadResult<OpenedSource> {
        let opened = match self {
            Self::Path(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    UploadError::Transfer(format!("failed to read {}: {e}", path.display()))
                })?;
                OpenedSource::new(file_name(path), Bytes::from(data))
            }
            Self::Bytes { name, data } => OpenedSource::new(name.clone(), data.clone()),
        };
        trace!(name = %opened.name, size = opened.len(), "Opened upload source");
        Ok(opened)
    }
}

impl From<PathBuf> for ByteSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ByteSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for ByteSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// The contents of an opened [`ByteSource`].
///
/// Handed to the [`Transfer`](crate::Transfer) by value and released when
/// dropped, whatever the transfer's outcome.
#[derive(Debug)]
pub struct OpenedSource {
    name: String,
    data: Bytes,
}

impl OpenedSource {
    fn new(name: String, data: Bytes) -> Self {
        Self { name, data }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Takes the buffer out without copying; the source is released.
    pub fn into_data(mut self) -> Bytes {
        std::mem::take(&mut self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for OpenedSource {
    fn drop(&mut self) {
        trace!(name = %self.name, "Released upload source");
        #[cfg(test)]
        released::record();
    }
}

/// Per-thread release counter for tests on the current-thread runtime.
#[cfg(test)]
pub(crate) mod released {
    use std::cell::Cell;

    thread_local! {
        static COUNT: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn record() {
        COUNT.with(|count| count.set(count.get() + 1));
    }

    pub(crate) fn count() -> usize {
        COUNT.with(Cell::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_bytes() {
        let opened = ByteSource::bytes("a.txt", b"hello".to_vec()).open().await.unwrap();
        assert_eq!(opened.name(), "a.txt");
        assert_eq!(opened.data(), b"hello");
    }

    #[tokio::test]
    async fn test_open_path() {
        let path = std::env::temp_dir().join(format!("bottle-upload-{}.txt", std::process::id()));
        tokio::fs::write(&path, b"on disk").await.unwrap();

        let opened = ByteSource::from(path.clone()).open().await.unwrap();
        assert_eq!(opened.data(), b"on disk");
        assert!(opened.name().starts_with("bottle-upload-"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_path_is_transfer_error() {
        let err = ByteSource::from("/nonexistent/bottle/file.bin").open().await.unwrap_err();
        assert!(matches!(err, UploadError::Transfer(ref msg) if msg.contains("file.bin")));
    }

    #[tokio::test]
    async fn test_into_data_shares_buffer_and_releases() {
        let data = Bytes::from_static(b"shared");
        let source = ByteSource::bytes("s.bin", data.clone());

        let before = released::count();
        let taken = source.open().await.unwrap().into_data();
        assert_eq!(released::count(), before + 1);
        assert_eq!(taken.as_ptr(), data.as_ptr());
    }
}
