use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Which stage of the pipeline a scratch file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Input,
    Normalized,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Normalized => "normalized",
        }
    }
}

#[derive(Debug)]
struct TempResource {
    path: PathBuf,
    deleted: bool,
}

/// Scratch files created while serving a single request.
///
/// Every path handed out by [`ScratchScope::acquire`] is registered for
/// deletion. The scope is owned by exactly one request; `release_all` runs
/// explicitly at the end of the pipeline and again from `Drop`, so files are
/// also removed when the request future is cancelled mid-flight.
pub struct ScratchScope {
    dir: PathBuf,
    entries: Vec<TempResource>,
    released: usize,
}

impl ScratchScope {
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: Vec::new(),
            released: 0,
        }
    }

    /// Reserves a uniquely named scratch path and registers it for cleanup.
    ///
    /// The file itself is created by whoever writes to the path; release is
    /// a no-op for paths that never materialized on disk.
    pub fn acquire(&mut self, stage: Stage, suffix: &str) -> PathBuf {
        let name = format!("{}-{}{}", stage.label(), Uuid::new_v4(), suffix);
        let path = self.dir.join(name);
        self.entries.push(TempResource {
            path: path.clone(),
            deleted: false,
        });
        path
    }

    /// Deletes the file behind `path` if this scope owns it. Idempotent:
    /// releasing twice, or releasing a path that was never written, is fine.
    pub fn release(&mut self, path: &Path) {
        for entry in self.entries.iter_mut().filter(|e| e.path == path) {
            Self::delete(entry, &mut self.released);
        }
    }

    /// Releases every resource the scope still holds.
    pub fn release_all(&mut self) {
        for entry in &mut self.entries {
            Self::delete(entry, &mut self.released);
        }
    }

    fn delete(entry: &mut TempResource, released: &mut usize) {
        if entry.deleted {
            return;
        }
        match std::fs::remove_file(&entry.path) {
            Ok(()) => debug!(path = %entry.path.display(), "deleted scratch file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %entry.path.display(), %err, "failed to delete scratch file"),
        }
        entry.deleted = true;
        *released += 1;
    }

    pub fn acquired(&self) -> usize {
        self.entries.len()
    }

    pub fn released(&self) -> usize {
        self.released
    }
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        self.release_all();
    }
}
