use crate::CoreError;
use fs2::FileExt;
use shipyard_runtime::Interrupt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = ".shipyard.lock";

/// Exit code used when a second interrupt forces termination.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exclusive lock serialising releases of one package root.
///
/// The lock file exists only while a release holds it; dropping the guard
/// removes it so it never ends up in a source distribution.
pub struct ReleaseLock {
    lock_file: File,
    path: PathBuf,
}

impl ReleaseLock {
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(LOCK_FILE_NAME)
    }

    /// `Ok(None)` when another process holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }
        // A holder that released between our open and our lock has already
        // unlinked this file; a lock on an orphaned inode excludes nobody.
        if !still_linked(&file, lock_path) {
            debug!("lock file {} was replaced while locking", lock_path.display());
            let _ = file.unlock();
            return Ok(None);
        }
        Ok(Some(Self {
            lock_file: file,
            path: lock_path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ReleaseLock {
    fn drop(&mut self) {
        // Unlink before unlocking so a waiter never locks a file we still own.
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove lock file {}: {e}", self.path.display());
        }
        let _ = self.lock_file.unlock();
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}

static HANDLER_FIRED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C into `interrupt`. A second Ctrl-C exits immediately.
pub fn install_signal_handler(interrupt: &Interrupt) {
    let interrupt = interrupt.clone();
    let _ = ctrlc::set_handler(move || {
        if HANDLER_FIRED.swap(true, Ordering::SeqCst) {
            std::process::exit(EXIT_INTERRUPTED);
        }
        interrupt.trigger();
        eprintln!("\ninterrupt received, stopping the current stage (press Ctrl-C again to force exit)...");
    });
}
