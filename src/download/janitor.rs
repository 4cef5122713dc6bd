//! Scoped cleanup of scratch files.
//!
//! A [`ScratchFile`] is allocated before any bytes are written and removes
//! every file sharing its stem (final output, `.part`, `.ytdl`, per-format
//! fragments) when dropped. Converting it into a [`DownloadArtifact`] moves
//! the guard along with the path, so exactly one owner is ever responsible
//! for deleting the file.

use crate::download::request::MediaRequest;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Prefix of every scratch file name this crate creates.
pub const SCRATCH_PREFIX: &str = "mediadrop_";

/// Allocates uniquely named scratch locations inside one directory.
#[derive(Debug, Clone)]
pub struct Janitor {
    scratch_dir: PathBuf,
}

impl Janitor {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Reserves a fresh location for one attempt of `request`.
    ///
    /// Nothing is written yet; the returned guard owns the name from now on.
    pub fn allocate(&self, request: &MediaRequest, attempt: u32) -> io::Result<ScratchFile> {
        fs::create_dir_all(&self.scratch_dir)?;
        let nonce = Uuid::new_v4().simple().to_string();
        let stem = format!(
            "{}{}_{}_{}",
            SCRATCH_PREFIX,
            request.short_id(),
            attempt,
            &nonce[..8]
        );
        let path = self
            .scratch_dir
            .join(format!("{}.{}", stem, request.kind().extension()));
        log::debug!("[{}] allocated scratch {}", request.short_id(), path.display());
        Ok(ScratchFile {
            dir: self.scratch_dir.clone(),
            stem,
            path,
            armed: true,
        })
    }

    /// Files in the scratch directory that belong to `request`.
    pub fn leftovers(&self, request: &MediaRequest) -> Vec<PathBuf> {
        let prefix = format!("{}{}_", SCRATCH_PREFIX, request.short_id());
        files_with_prefix(&self.scratch_dir, &prefix)
    }

    /// Removes scratch files older than `max_age`, left behind by a crash or kill -9.
    ///
    /// Returns how many files were removed.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        for path in files_with_prefix(&self.scratch_dir, SCRATCH_PREFIX) {
            let is_stale = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age >= max_age)
                .unwrap_or(false);
            if !is_stale {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("Removed stale scratch file: {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("Failed to remove stale scratch file {}: {}", path.display(), e),
            }
        }
        removed
    }
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect()
}

/// Exclusive guard over one attempt's scratch location.
#[derive(Debug)]
pub struct ScratchFile {
    dir: PathBuf,
    stem: String,
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Where the attempt should write its output.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Whether `path` lives under this guard's name.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with(&self.stem))
                .unwrap_or(false)
    }

    /// Finds the finished output: the expected path, or a sibling with the same
    /// stem that is not an in-progress fragment.
    pub fn locate_output(&self) -> Option<PathBuf> {
        if self.path.is_file() {
            return Some(self.path.clone());
        }
        files_with_prefix(&self.dir, &self.stem)
            .into_iter()
            .find(|p| !is_partial(p))
    }

    /// Moves ownership of the scratch name into an artifact.
    ///
    /// The guard does not delete anything here; the artifact inherits the duty.
    pub fn into_artifact(self, path: PathBuf, size_bytes: u64) -> DownloadArtifact {
        DownloadArtifact {
            path,
            size_bytes,
            guard: self,
        }
    }

    /// Removes every file under this guard's name. Returns how many were removed.
    pub fn release(mut self) -> usize {
        self.armed = false;
        remove_all(&self.dir, &self.stem)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            remove_all(&self.dir, &self.stem);
        }
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
        || name.contains(".part-Frag")
        || name.ends_with(".tmp")
}

fn remove_all(dir: &Path, stem: &str) -> usize {
    let mut removed = 0;
    for path in files_with_prefix(dir, stem) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove scratch file {}: {}", path.display(), e),
        }
    }
    if removed > 0 {
        log::debug!("Removed {} scratch file(s) for {}", removed, stem);
    }
    removed
}

/// A finished, size-validated download.
///
/// Dropping it deletes the file and any siblings sharing its stem.
#[derive(Debug)]
pub struct DownloadArtifact {
    path: PathBuf,
    size_bytes: u64,
    guard: ScratchFile,
}

impl DownloadArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size measured on disk after the transfer finished.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.guard.stem.clone())
    }

    /// Deletes the artifact now. Returns how many files were removed.
    pub fn release(self) -> usize {
        self.guard.release()
    }
}
