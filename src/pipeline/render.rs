//! PDF rasterisation: render the first page of an exported dashboard to PNG.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so the Tokio worker threads never stall on a CPU-heavy
//! render.
//!
//! ## Why only the first page?
//!
//! A dashboard export is a single view; the server emits exactly one page.
//! Rendering only page 0 makes that assumption explicit and keeps a
//! malformed multi-page export from silently producing the wrong image.

use crate::error::ReportError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterise the first page of `pdf_path` at the given DPI.
///
/// The output path is derived deterministically: same directory, same stem,
/// `.png` extension.
///
/// # Errors
/// [`ReportError::Conversion`] if the PDF cannot be opened, has zero pages,
/// or the render/save fails.
pub async fn rasterize_first_page(pdf_path: &Path, dpi: u32) -> Result<PathBuf, ReportError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || rasterize_blocking(&path, dpi))
        .await
        .map_err(|e| ReportError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of first-page rendering.
fn rasterize_blocking(pdf_path: &Path, dpi: u32) -> Result<PathBuf, ReportError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ReportError::Conversion {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(ReportError::Conversion {
            path: pdf_path.to_path_buf(),
            detail: "PDF contains no pages".to_string(),
        });
    }
    debug!("PDF loaded: {} page(s), rendering first", pages.len());

    let page = pages.get(0).map_err(|e| ReportError::Conversion {
        path: pdf_path.to_path_buf(),
        detail: format!("failed to open first page: {e:?}"),
    })?;

    // Page dimensions come back in points (1/72 in); scale to pixels by DPI.
    let target_width = (page.width().value / 72.0 * dpi as f32).round().max(1.0) as i32;
    let target_height = (page.height().value / 72.0 * dpi as f32).round().max(1.0) as i32;
    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_maximum_height(target_height);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ReportError::Conversion {
            path: pdf_path.to_path_buf(),
            detail: format!("rasterisation failed: {e:?}"),
        })?;

    let image = bitmap.as_image();
    let png_path = pdf_path.with_extension("png");
    image.save(&png_path).map_err(|e| ReportError::Conversion {
        path: pdf_path.to_path_buf(),
        detail: format!("failed to write PNG: {e}"),
    })?;

    info!(
        "Rasterised {} → {} ({}x{} px @ {} DPI)",
        pdf_path.display(),
        png_path.display(),
        image.width(),
        image.height(),
        dpi
    );
    Ok(png_path)
}
