//! # dashstitch
//!
//! Build combined dashboard reports from a BI server.
//!
//! ## Why this crate?
//!
//! Assembling a recurring report from live dashboards is tedious by hand:
//! export each view, screenshot it, trim the chrome, paste everything into a
//! document, repeat next week. dashstitch automates the loop — it signs in
//! to the BI server's REST API, exports the chosen dashboards as PDF,
//! rasterises them, lets the user crop each one to the region that matters,
//! and stitches the crops into a single PDF or Word report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BI server
//!  │
//!  ├─ 1. Login    sign in, hold a credential bundle per session
//!  ├─ 2. Select   browse projects → workbooks → views into N slots
//!  ├─ 3. Export   view → PDF → first page rasterised to PNG (pdfium)
//!  ├─ 4. Crop     clamp-and-crop each image, thumbnail for preview
//!  ├─ 5. Combine  all-cropped gate, then stitch into PDF or DOCX
//!  └─ 6. Cleanup  intermediates removed after a cancellable delay
//! ```
//!
//! Each slot moves through `Empty → Exported → Cropped`; combining requires
//! every slot to be cropped. Re-exporting a slot resets it to `Exported`
//! and discards the stale crop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashstitch::{serve, AppConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::builder()
//!         .upload_dir("uploads")
//!         .output_dir("output")
//!         .dpi(200)
//!         .build()?;
//!     serve(config, "127.0.0.1:5000".parse()?).await?;
//!     Ok(())
//! }
//! ```
//!
//! The library layers are usable on their own: [`client::ApiClient`] for
//! the REST calls, [`pipeline`] for the image transformations, and
//! [`session`] for the workflow state machine.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dashstitch` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ApiClient, Credentials, NamedRef, OneOrMany};
pub use config::{AppConfig, AppConfigBuilder};
pub use error::ReportError;
pub use pipeline::{CropRect, SlotSummary};
pub use server::{build_router, serve, AppState};
pub use session::{Session, SessionStore, SlotState, WorkbookSlot};
