//! File provider capability: where the file middleware gets its bytes.
//!
//! Providers are polymorphic so the middleware can serve from the local
//! filesystem, an in-memory tree (tests), or anything else that can produce
//! attributes and a byte stream for a path.

use std::cmp;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::HttpError;
use crate::response::ResponseBody;

/// Default read chunk for streamed files: 128 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Metadata the file middleware needs to build headers and validators.
#[derive(Clone, Copy, Debug)]
pub struct FileAttributes {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Whether the path names a directory.
    pub is_directory: bool,
}

/// A source of files addressed by request path.
pub trait FileProvider: Send + Sync + 'static {
    /// Maps a percent-decoded request path to the provider's full path.
    fn full_path(&self, request_path: &str) -> PathBuf;

    /// Attributes for a full path, or `None` when nothing exists there.
    fn attributes(&self, path: PathBuf) -> BoxFuture<'static, Option<FileAttributes>>;

    /// Streams `length` bytes starting at `start`. A vanished or unreadable
    /// file fails with `404 Not Found`.
    fn load_file(
        &self,
        path: PathBuf,
        start: u64,
        length: u64,
    ) -> BoxFuture<'static, Result<ResponseBody, HttpError>>;
}

/// Serves files from a directory on the local filesystem.
///
/// Symlinks are followed. Request paths are normalized to their `Normal`
/// components before being joined under the root, so absolute paths and
/// drive-relative tricks cannot escape it.
pub struct LocalFileProvider {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalFileProvider {
    /// A provider rooted at `root` using the default chunk size.
    pub fn new<P: Into<PathBuf>>(root: P) -> LocalFileProvider {
        LocalFileProvider {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the streaming chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> LocalFileProvider {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl FileProvider for LocalFileProvider {
    fn full_path(&self, request_path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for component in Path::new(request_path).components() {
            if let Component::Normal(part) = component {
                full.push(part);
            }
        }
        full
    }

    fn attributes(&self, path: PathBuf) -> BoxFuture<'static, Option<FileAttributes>> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(&path).await.ok()?;
            let modified = metadata.modified().ok()?;
            Some(FileAttributes {
                size: metadata.len(),
                modified,
                is_directory: metadata.is_dir(),
            })
        })
    }

    fn load_file(
        &self,
        path: PathBuf,
        start: u64,
        length: u64,
    ) -> BoxFuture<'static, Result<ResponseBody, HttpError>> {
        let chunk_size = self.chunk_size;
        Box::pin(async move {
            if length == 0 {
                return Ok(ResponseBody::Empty);
            }

            let mut file = File::open(&path).await.map_err(|_| HttpError::not_found())?;
            if start > 0 {
                file.seek(io::SeekFrom::Start(start))
                    .await
                    .map_err(|_| HttpError::not_found())?;
            }

            Ok(ResponseBody::stream(Some(length), move |mut writer| async move {
                let mut remaining = length;
                let mut buffer = vec![0u8; cmp::min(chunk_size as u64, length) as usize];
                while remaining > 0 {
                    let want = cmp::min(buffer.len() as u64, remaining) as usize;
                    let read = file.read(&mut buffer[..want]).await?;
                    if read == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "file shrank while being served",
                        )
                        .into());
                    }
                    writer.write(Bytes::copy_from_slice(&buffer[..read])).await?;
                    remaining -= read as u64;
                }
                writer.finish(None).await
            }))
        })
    }
}

/// An in-memory provider, primarily for tests.
pub struct MemoryFileProvider {
    files: HashMap<PathBuf, MemoryFile>,
}

struct MemoryFile {
    data: Bytes,
    modified: SystemTime,
}

impl Default for MemoryFileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileProvider {
    /// An empty in-memory tree.
    pub fn new() -> MemoryFileProvider {
        MemoryFileProvider {
            files: HashMap::new(),
        }
    }

    /// Adds a file at `path` (no leading slash required) with the given
    /// contents and modification time.
    pub fn insert<B: Into<Bytes>>(&mut self, path: &str, data: B, modified: SystemTime) {
        self.files.insert(
            PathBuf::from(path.trim_start_matches('/')),
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    fn is_directory(&self, path: &Path) -> bool {
        !self.files.contains_key(path) && self.files.keys().any(|k| k.starts_with(path))
    }
}

impl FileProvider for MemoryFileProvider {
    fn full_path(&self, request_path: &str) -> PathBuf {
        PathBuf::from(request_path.trim_start_matches('/'))
    }

    fn attributes(&self, path: PathBuf) -> BoxFuture<'static, Option<FileAttributes>> {
        let attributes = if let Some(file) = self.files.get(&path) {
            Some(FileAttributes {
                size: file.data.len() as u64,
                modified: file.modified,
                is_directory: false,
            })
        } else if self.is_directory(&path) {
            Some(FileAttributes {
                size: 0,
                modified: SystemTime::UNIX_EPOCH,
                is_directory: true,
            })
        } else {
            None
        };
        Box::pin(async move { attributes })
    }

    fn load_file(
        &self,
        path: PathBuf,
        start: u64,
        length: u64,
    ) -> BoxFuture<'static, Result<ResponseBody, HttpError>> {
        let result = match self.files.get(&path) {
            Some(file) => {
                let end = cmp::min(start + length, file.data.len() as u64) as usize;
                let start = cmp::min(start as usize, end);
                Ok(ResponseBody::Buffer(file.data.slice(start..end)))
            }
            None => Err(HttpError::not_found()),
        };
        Box::pin(async move { result })
    }
}
