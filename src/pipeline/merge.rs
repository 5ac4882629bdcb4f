//! Combine cropped dashboard images into a single multi-page PDF.
//!
//! Each image becomes one page whose media box matches the image's pixel
//! dimensions, so the report preserves every dashboard's aspect ratio with
//! no scaling artefacts. Images are re-encoded as JPEG and embedded as
//! `DCTDecode` XObjects, which keeps the output a fraction of the size a
//! flate-compressed RGB bitmap would be.
//!
//! Missing input files are skipped with a warning rather than failing the
//! whole combine; an empty result is an error.

use crate::error::ReportError;
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const JPEG_QUALITY: u8 = 90;

/// Stitch `image_paths` into `{output_dir}/{base_name}.pdf`, one page per
/// image, in slot order.
///
/// # Errors
/// [`ReportError::Merge`] if no input file could be embedded;
/// [`ReportError::Conversion`] on a decode/encode failure for a file that
/// exists; [`ReportError::Io`] if the output cannot be written.
pub fn merge_to_pdf(
    image_paths: &[PathBuf],
    output_dir: &Path,
    base_name: &str,
) -> Result<PathBuf, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut page_ids: Vec<Object> = Vec::new();

    for path in image_paths {
        if !path.exists() {
            warn!("Skipping missing image: {}", path.display());
            continue;
        }
        let page_id = embed_image_page(&mut doc, pages_id, path)?;
        page_ids.push(page_id.into());
    }

    if page_ids.is_empty() {
        return Err(ReportError::Merge {
            detail: "no input images could be embedded".to_string(),
        });
    }
    let page_count = page_ids.len();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let out_path = output_dir.join(format!("{base_name}.pdf"));
    doc.save(&out_path)
        .map_err(|e| ReportError::io(out_path.clone(), std::io::Error::other(e)))?;

    info!(
        "Combined {} image(s) into {}",
        page_count,
        out_path.display()
    );
    Ok(out_path)
}

/// Add one page to `doc` containing `path` as a full-bleed JPEG XObject.
fn embed_image_page(
    doc: &mut Document,
    pages_id: lopdf::ObjectId,
    path: &Path,
) -> Result<lopdf::ObjectId, ReportError> {
    let image = image::open(path).map_err(|e| ReportError::Conversion {
        path: path.to_path_buf(),
        detail: format!("failed to open image: {e}"),
    })?;
    let rgb = image.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ReportError::Conversion {
            path: path.to_path_buf(),
            detail: format!("JPEG encode failed: {e}"),
        })?;

    // DCTDecode data is already compressed; flate on top only adds overhead.
    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    (width as i64).into(),
                    0.into(),
                    0.into(),
                    (height as i64).into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|e| ReportError::Merge {
        detail: format!("content stream encoding failed: {e}"),
    })?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), (width as i64).into(), (height as i64).into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    Ok(page_id)
}
