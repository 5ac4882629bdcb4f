//! Deferred removal of intermediate files.
//!
//! After a combine, the exported PDFs and working PNGs are no longer needed,
//! but the client may still be streaming the final artifact or re-fetching a
//! thumbnail. Removal is therefore scheduled after a delay, and the caller
//! gets a [`CleanupHandle`] that can cancel it — a session reset or a new
//! export reschedules cleanup with a fresh file list instead of racing the
//! old timer.
//!
//! Dropping the handle does NOT cancel the sweep; the spawned task keeps
//! running and removes the files once the delay elapses.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Handle to a scheduled removal.
#[derive(Debug)]
pub struct CleanupHandle {
    cancel: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CleanupHandle {
    /// Cancel the pending removal. The files stay on disk.
    pub fn cancel(self) {
        // An Err here means the sweep already ran; nothing left to do.
        let _ = self.cancel.send(());
    }

    /// Wait for the sweep to finish (test hook).
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

/// Schedule `paths` for removal after `delay`.
///
/// Files that are already gone are skipped silently; removal failures are
/// logged and do not abort the rest of the sweep.
pub fn schedule_removal(paths: Vec<PathBuf>, delay: Duration) -> CleanupHandle {
    let (tx, rx) = oneshot::channel::<()>();
    // Fix the deadline now, not at the task's first poll, so the delay is
    // measured from the moment the sweep was scheduled.
    let sleep = tokio::time::sleep(delay);
    let task = tokio::spawn(async move {
        tokio::pin!(sleep);

        // rx resolves Ok(()) only on an explicit cancel; a dropped sender
        // resolves Err, in which case we keep waiting out the delay.
        let cancelled = tokio::select! {
            _ = &mut sleep => false,
            cancel = rx => {
                if cancel.is_ok() {
                    true
                } else {
                    sleep.await;
                    false
                }
            }
        };

        if cancelled {
            debug!("Cleanup cancelled, keeping {} file(s)", paths.len());
            return;
        }

        let mut removed = 0usize;
        for path in &paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }
        info!("Cleanup removed {removed} of {} file(s)", paths.len());
    });

    CleanupHandle { cancel: tx, task }
}
