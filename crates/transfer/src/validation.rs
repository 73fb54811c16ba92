use std::io;
use std::path::{Component, Path};

use content_transfer_protocol::TransferError;

use crate::fs::FileSystem;

/// Validates an upload destination: a relative path that stays inside the
/// upload base.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_relative_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.is_empty() {
        return Err(TransferError::InvalidArg("empty path".into()));
    }

    let path = Path::new(file_path);

    if path.is_absolute() {
        return Err(TransferError::InvalidArg(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidArg(format!(
                    "parent directory traversal not allowed: {file_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidArg(format!(
                    "absolute path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Validates a download destination.
///
/// The path must be absolute, free of `..`, inside one of `allowed_roots`
/// (when any are configured), and its parent directory must exist. An
/// existing file is only accepted when `replace` is set.
pub fn validate_download_destination(
    dest: &Path,
    allowed_roots: &[impl AsRef<Path>],
    replace: bool,
    fs: &dyn FileSystem,
) -> Result<(), TransferError> {
    let display = dest.display().to_string();
    if dest.as_os_str().is_empty() {
        return Err(TransferError::InvalidArg("empty destination path".into()));
    }
    if !dest.is_absolute() {
        return Err(TransferError::InvalidArg(format!(
            "destination must be absolute: {display}"
        )));
    }
    if dest.components().any(|c| c == Component::ParentDir) {
        return Err(TransferError::InvalidArg(format!(
            "parent directory traversal not allowed: {display}"
        )));
    }
    if dest.file_name().is_none() {
        return Err(TransferError::InvalidArg(format!(
            "destination has no file name: {display}"
        )));
    }

    if !allowed_roots.is_empty() && !is_under_any(dest, allowed_roots) {
        return Err(TransferError::IllegalAccess(format!(
            "destination outside allowed roots: {display}"
        )));
    }

    match dest.parent() {
        Some(parent) if fs.is_dir(parent) => {}
        _ => {
            return Err(TransferError::InvalidArg(format!(
                "destination directory does not exist: {display}"
            )));
        }
    }

    if fs.is_dir(dest) {
        return Err(TransferError::InvalidArg(format!(
            "destination is a directory: {display}"
        )));
    }
    if !replace && fs.exists(dest) {
        return Err(TransferError::FileAlreadyExists(display));
    }

    Ok(())
}

/// Validates an upload source and returns its size.
pub fn validate_upload_source(src: &Path, fs: &dyn FileSystem) -> Result<u64, TransferError> {
    let display = src.display().to_string();
    if src.as_os_str().is_empty() {
        return Err(TransferError::InvalidArg("empty source path".into()));
    }
    if !fs.exists(src) {
        return Err(TransferError::InvalidArg(format!(
            "source does not exist: {display}"
        )));
    }
    fs.check_readable(src).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => TransferError::IllegalAccess(display.clone()),
        _ => TransferError::InvalidArg(format!("source not readable: {display}: {e}")),
    })
}

/// Returns `true` if `path` lies under one of `roots`.
pub fn is_under_any(path: &Path, roots: &[impl AsRef<Path>]) -> bool {
    roots.iter().any(|root| path.starts_with(root.as_ref()))
}

/// Joins an upload base URI and a validated relative path.
pub fn join_uri(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches("./").replace('\\', "/");
    format!("{}/{}", base.trim_end_matches('/'), relative)
}
