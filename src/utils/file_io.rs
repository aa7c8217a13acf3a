use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;
use tracing::debug;
use tracing::error;

use crate::HandlerError;

/// Runs blocking file work from async code.
///
/// On a multi-threaded runtime the worker hands its other tasks over first
/// (`block_in_place`); elsewhere `f` simply runs inline.
pub fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

pub fn create_dir_if_not_exist(path: &Path) -> Result<(), HandlerError> {
    if !path.exists() {
        if let Err(e) = create_dir_all(path) {
            error!("Failed to create log directory {:?}: {:?}", path, e);
            return Err(HandlerError::FileIo {
                path: path.to_path_buf(),
                source: e,
            });
        }
        debug!("created log directory: {:?}", path);
    }
    Ok(())
}

/// Creates `path` exclusively; an existing file is an error.
pub fn create_new_file(path: &Path) -> Result<File, HandlerError> {
    if let Some(parent) = path.parent() {
        create_dir_if_not_exist(parent)?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| HandlerError::FileIo {
            path: path.to_path_buf(),
            source: e,
        })
}

pub fn rename_file(
    from: &Path,
    to: &Path,
) -> Result<(), HandlerError> {
    std::fs::rename(from, to).map_err(|e| HandlerError::FileIo {
        path: from.to_path_buf(),
        source: e,
    })
}

/// Closed file found in a log directory.
#[derive(Debug, Clone)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub len: u64,
    pub modified: SystemTime,
}

/// Lists regular files of `dir` ending with `extension` (gzip variants
/// included), oldest first. Open files (temp suffix) are never listed.
pub fn list_closed_files(
    dir: &Path,
    extension: &str,
    open_suffix: &str,
) -> Result<Vec<LogFileInfo>, HandlerError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(HandlerError::FileIo {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let mut files = Vec::new();
    for entry in read_dir.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if name.ends_with(open_suffix) {
            continue;
        }
        if !(name.ends_with(extension) || name.ends_with(&format!("{extension}.gz"))) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        files.push(LogFileInfo {
            path,
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}
