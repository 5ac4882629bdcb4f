//! Crop and thumbnail transforms on rasterised dashboard images.
//!
//! Both operations are pure path-in/path-out functions with deterministic
//! output names (`_cropped` / `_thumb` suffixes on the input stem). They are
//! synchronous and cheap; callers on the async path wrap them in
//! `spawn_blocking`.

use crate::error::ReportError;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::info;

/// A crop rectangle in image pixel space, as submitted by the crop UI.
///
/// Coordinates are `f64` because the selection widget reports fractional
/// pixels; they are truncated before clamping.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Crop `png_path` to `rect`, clamped to the image bounds.
///
/// Clamping applies to all four derived corners: `x1 = x`, `y1 = y`,
/// `x2 = x + width`, `y2 = y + height`, each forced into
/// `[0, image_width] × [0, image_height]`. A rectangle hanging off the
/// top-left therefore *shrinks* — `{x:-10, y:-10, w:50, h:50}` on a 100×100
/// image becomes `(0,0)–(40,40)` — rather than sliding inward.
///
/// # Errors
/// [`ReportError::InvalidCrop`] if the clamped rectangle has zero or
/// negative area.
pub fn crop(png_path: &Path, rect: CropRect) -> Result<PathBuf, ReportError> {
    let image = open_image(png_path)?;
    let (w, h) = (image.width() as i64, image.height() as i64);

    let x1 = (rect.x as i64).clamp(0, w);
    let y1 = (rect.y as i64).clamp(0, h);
    let x2 = ((rect.x + rect.width) as i64).clamp(0, w);
    let y2 = ((rect.y + rect.height) as i64).clamp(0, h);

    if x2 <= x1 || y2 <= y1 {
        return Err(ReportError::InvalidCrop {
            x1: x1 as u32,
            y1: y1 as u32,
            x2: x2 as u32,
            y2: y2 as u32,
        });
    }

    let cropped = image.crop_imm(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32);
    let out_path = suffixed(png_path, "_cropped");
    save_png(&cropped, &out_path)?;

    info!(
        "Cropped {} → {} ({}x{})",
        png_path.display(),
        out_path.display(),
        cropped.width(),
        cropped.height()
    );
    Ok(out_path)
}

/// Produce an aspect-ratio-preserving thumbnail bounded by both dimensions.
///
/// Images already within the bounds are written unchanged; a thumbnail
/// never enlarges its source.
pub fn thumbnail(
    png_path: &Path,
    max_width: u32,
    max_height: u32,
) -> Result<PathBuf, ReportError> {
    let image = open_image(png_path)?;
    let thumb = if image.width() <= max_width && image.height() <= max_height {
        image
    } else {
        image.resize(max_width, max_height, FilterType::Lanczos3)
    };

    let out_path = suffixed(png_path, "_thumb");
    save_png(&thumb, &out_path)?;

    info!(
        "Thumbnailed {} → {} ({}x{})",
        png_path.display(),
        out_path.display(),
        thumb.width(),
        thumb.height()
    );
    Ok(out_path)
}

/// Default thumbnail bounds used by the workflow (slot preview size).
pub const THUMB_MAX_WIDTH: u32 = 200;
pub const THUMB_MAX_HEIGHT: u32 = 120;

fn open_image(path: &Path) -> Result<image::DynamicImage, ReportError> {
    image::open(path).map_err(|e| ReportError::Conversion {
        path: path.to_path_buf(),
        detail: format!("failed to open image: {e}"),
    })
}

fn save_png(image: &image::DynamicImage, path: &Path) -> Result<(), ReportError> {
    image.save(path).map_err(|e| ReportError::Conversion {
        path: path.to_path_buf(),
        detail: format!("failed to write PNG: {e}"),
    })
}

/// `dir/stem.png` → `dir/stem{suffix}.png`
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.png"))
}
