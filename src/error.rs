//! Error types for the dashstitch library.
//!
//! One taxonomy, [`ReportError`], covers the three layers of the system:
//!
//! * the **BI server client** (authentication, network, API failures),
//! * the **image pipeline** (rasterisation, cropping, merging),
//! * the **workflow state machine** (slot guards, the all-cropped gate).
//!
//! Nothing is retried automatically: every variant is raised at the point of
//! detection and surfaced to the caller with a human-readable message. The
//! one deliberate non-error is a listing for an unknown project name, which
//! returns an empty collection instead (see [`crate::client`]).

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the dashstitch library.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Auth & session ────────────────────────────────────────────────────
    /// The BI server rejected the supplied credentials.
    #[error("Authentication failed: {detail}")]
    Auth { detail: String },

    /// An authenticated call was attempted without a credential bundle.
    #[error("Not signed in. Authenticate before calling the server.")]
    NotAuthenticated,

    /// The request carried no session id, or one the store does not know.
    /// A stale token behaves the same way: the next API call fails.
    #[error("Unknown or expired session. Log in again.")]
    UnknownSession,

    // ── BI server ─────────────────────────────────────────────────────────
    /// Transport-level failure reaching the BI server (DNS, TLS, timeout).
    #[error("Network error reaching '{url}': {reason}")]
    Network { url: String, reason: String },

    /// The BI server answered with a non-2xx status.
    #[error("BI server returned HTTP {status}: {detail}")]
    Api { status: u16, detail: String },

    // ── Image pipeline ────────────────────────────────────────────────────
    /// PDF rasterisation failed or the PDF yielded zero pages.
    #[error("PDF conversion failed for '{path}': {detail}")]
    Conversion { path: PathBuf, detail: String },

    /// The crop rectangle collapsed to zero or negative area after clamping.
    #[error("Invalid crop rectangle: clamped to ({x1},{y1})–({x2},{y2}), which has no area")]
    InvalidCrop { x1: u32, y1: u32, x2: u32, y2: u32 },

    /// No embeddable images were left after skipping missing files.
    #[error("Nothing to combine: {detail}")]
    Merge { detail: String },

    // ── Workflow state machine ────────────────────────────────────────────
    /// Combine was attempted before every slot reached the cropped state.
    /// An empty `missing` list means the session has no slots at all.
    #[error("Cannot combine yet: {}", describe_missing(.missing))]
    IncompleteWorkflow { missing: Vec<usize> },

    /// Slot index outside the declared slot count.
    #[error("Slot {index} is out of range (session has {count} slots)")]
    SlotOutOfRange { index: usize, count: usize },

    /// Crop was submitted for a slot that has no exported image yet.
    #[error("Slot {index} has no exported image to crop. Export a dashboard first.")]
    SlotNotExported { index: usize },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Could not read or write a working file.
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// Shorthand for wrapping an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_missing(indices: &[usize]) -> String {
    if indices.is_empty() {
        return "no slots configured".to_string();
    }
    let list = indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("slot(s) {list} not cropped")
}
