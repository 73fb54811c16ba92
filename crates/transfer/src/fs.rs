//! File system collaborator.
//!
//! Workers only touch the disk through [`FileSystem`], so tests can swap in
//! a fake and embedders can route writes through their own storage layer.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Destination handle for downloaded bytes.
pub type FileWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Source handle for uploaded bytes.
pub type FileReader = Pin<Box<dyn AsyncRead + Send>>;

/// Narrow file system surface used by the manager.
pub trait FileSystem: Send + Sync {
    /// Returns `true` if anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` if `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Checks that `path` is a regular file that can be opened for
    /// reading and returns its size.
    fn check_readable(&self, path: &Path) -> io::Result<u64>;

    /// Opens `path` for writing. With `replace` an existing file is
    /// truncated; without it an existing file fails with
    /// [`io::ErrorKind::AlreadyExists`].
    fn create<'a>(
        &'a self,
        path: &'a Path,
        replace: bool,
    ) -> BoxFuture<'a, io::Result<FileWriter>>;

    /// Opens `path` for reading.
    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileReader>>;

    /// Deletes `path`. A missing file is not an error.
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn check_readable(&self, path: &Path) -> io::Result<u64> {
        let file = std::fs::File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(metadata.len())
    }

    fn create<'a>(
        &'a self,
        path: &'a Path,
        replace: bool,
    ) -> BoxFuture<'a, io::Result<FileWriter>> {
        Box::pin(async move {
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true);
            if replace {
                options.create(true).truncate(true);
            } else {
                options.create_new(true);
            }
            let file = options.open(path).await?;
            Ok(Box::pin(file) as FileWriter)
        })
    }

    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileReader>> {
        Box::pin(async move {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::pin(file) as FileReader)
        })
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        })
    }
}
