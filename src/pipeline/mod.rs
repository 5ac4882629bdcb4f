//! Image pipeline: stateless transformations between files on disk.
//!
//! Each submodule implements exactly one transformation step. All stages
//! take and return file paths, never shared state, so each is independently
//! testable and the workflow layer composes them freely.
//!
//! ## Data Flow
//!
//! ```text
//! exported PDF ──▶ render ──▶ transform ──▶ merge / docx
//!                 (pdfium)   (crop,thumb)  (final artifact)
//! ```
//!
//! 1. [`render`]    — rasterise the first PDF page to PNG; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`transform`] — clamp-and-crop to the region of interest, plus
//!    thumbnail generation for the slot preview
//! 3. [`merge`]     — stitch the cropped PNGs into one multi-page PDF
//! 4. [`docx`]      — or into a Word report with per-dashboard metadata

pub mod docx;
pub mod merge;
pub mod render;
pub mod transform;

pub use docx::{merge_to_document, SlotSummary};
pub use merge::merge_to_pdf;
pub use render::rasterize_first_page;
pub use transform::{crop, thumbnail, CropRect, THUMB_MAX_HEIGHT, THUMB_MAX_WIDTH};
