//! Combine cropped dashboard images into a Word (`.docx`) report.
//!
//! A `.docx` file is a zip archive of OOXML parts. We write the four parts a
//! minimal word-processing document needs — `[Content_Types].xml`, the
//! package relationships, the document relationships (one per embedded
//! image), and `word/document.xml` — plus the PNG payloads under
//! `word/media/`. Building the XML by hand keeps the dependency surface to
//! the `zip` crate alone.
//!
//! ## Report layout
//!
//! A centred title and an export summary open the document. Dashboards then
//! follow two per page, each inside a bordered two-column table: the image
//! on the left at a fixed 3-inch width (height scaled to preserve aspect),
//! its metadata on the right with bold labels. Missing images are annotated
//! in italics instead of failing the whole report.

use crate::error::ReportError;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Per-slot metadata rendered next to each embedded image.
#[derive(Debug, Clone)]
pub struct SlotSummary {
    pub project: String,
    pub workbook: String,
    pub dashboard: String,
    pub exported_at: String,
}

/// Embedded image width: 3 inches (914400 EMU per inch).
const IMAGE_WIDTH_EMU: i64 = 2_743_200;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="png" ContentType="image/png"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

/// Assemble `{output_dir}/{base_name}.docx` from images and their metadata.
///
/// `image_paths[i]` pairs with `summaries[i]`; the two slices must have the
/// same length.
///
/// # Errors
/// [`ReportError::Merge`] if the inputs are empty or mismatched;
/// [`ReportError::Io`] on any write failure.
pub fn merge_to_document(
    image_paths: &[PathBuf],
    output_dir: &Path,
    base_name: &str,
    summaries: &[SlotSummary],
) -> Result<PathBuf, ReportError> {
    if image_paths.is_empty() {
        return Err(ReportError::Merge {
            detail: "no input images to embed".to_string(),
        });
    }
    if image_paths.len() != summaries.len() {
        return Err(ReportError::Merge {
            detail: format!(
                "{} image(s) but {} summaries",
                image_paths.len(),
                summaries.len()
            ),
        });
    }

    let out_path = output_dir.join(format!("{base_name}.docx"));
    let file = std::fs::File::create(&out_path)
        .map_err(|e| ReportError::io(out_path.clone(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let io_err = |e: zip::result::ZipError| ReportError::Merge {
        detail: format!("zip write failed: {e}"),
    };

    // Collect the images that actually exist; slots whose file vanished are
    // annotated in the document body instead of embedded.
    let mut media: Vec<(usize, &PathBuf)> = Vec::new();
    for (idx, path) in image_paths.iter().enumerate() {
        if path.exists() {
            media.push((idx, path));
        } else {
            warn!("Image missing, annotating in report: {}", path.display());
        }
    }

    zip.start_file("[Content_Types].xml", options).map_err(io_err)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())
        .map_err(|e| ReportError::io(out_path.clone(), e))?;

    zip.start_file("_rels/.rels", options).map_err(io_err)?;
    zip.write_all(RELS_XML.as_bytes())
        .map_err(|e| ReportError::io(out_path.clone(), e))?;

    zip.start_file("word/_rels/document.xml.rels", options)
        .map_err(io_err)?;
    zip.write_all(document_rels(media.len()).as_bytes())
        .map_err(|e| ReportError::io(out_path.clone(), e))?;

    for (rel_no, (_, path)) in media.iter().enumerate() {
        let bytes = std::fs::read(path).map_err(|e| ReportError::io((*path).clone(), e))?;
        zip.start_file(format!("word/media/image{}.png", rel_no + 1), options)
            .map_err(io_err)?;
        zip.write_all(&bytes)
            .map_err(|e| ReportError::io(out_path.clone(), e))?;
    }

    let body = document_xml(image_paths, summaries, &media)?;
    zip.start_file("word/document.xml", options).map_err(io_err)?;
    zip.write_all(body.as_bytes())
        .map_err(|e| ReportError::io(out_path.clone(), e))?;

    zip.finish().map_err(io_err)?;

    info!(
        "Wrote Word report with {} embedded image(s) to {}",
        media.len(),
        out_path.display()
    );
    Ok(out_path)
}

fn document_rels(image_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for n in 1..=image_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{n}.png"/>
"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn document_xml(
    image_paths: &[PathBuf],
    summaries: &[SlotSummary],
    media: &[(usize, &PathBuf)],
) -> Result<String, ReportError> {
    let mut body = String::new();

    body.push_str(&centered_title("Dashboard Report"));
    body.push_str(&heading("Export Summary"));
    body.push_str(&labelled_line(
        "Generated",
        &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
    ));
    body.push_str(&labelled_line(
        "Total Dashboards",
        &image_paths.len().to_string(),
    ));
    body.push_str(&labelled_line("Format", "Word Document (.docx)"));
    body.push_str(&page_break());

    // rId assignment follows media order, not slot order.
    let rel_for_slot = |slot: usize| -> Option<usize> {
        media.iter().position(|(s, _)| *s == slot).map(|p| p + 1)
    };

    for (pair_no, pair) in summaries.chunks(2).enumerate() {
        if pair_no > 0 {
            body.push_str(&page_break());
        }
        for (offset, summary) in pair.iter().enumerate() {
            let slot = pair_no * 2 + offset;
            let image_cell = match rel_for_slot(slot) {
                Some(rel) => {
                    let (w, h) = image::image_dimensions(&image_paths[slot]).map_err(|e| {
                        ReportError::Conversion {
                            path: image_paths[slot].clone(),
                            detail: format!("failed to read dimensions: {e}"),
                        }
                    })?;
                    inline_image(rel, w, h)
                }
                None => italic_paragraph("Image not found"),
            };
            body.push_str(&dashboard_table(&image_cell, summary));
            body.push_str("<w:p/>");
        }
    }

    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    ))
}

/// One bordered two-column table: image left, bold-labelled metadata right.
fn dashboard_table(image_cell: &str, summary: &SlotSummary) -> String {
    let meta = format!(
        "{}{}{}{}",
        labelled_line("Project", &summary.project),
        labelled_line("Workbook", &summary.workbook),
        labelled_line("Dashboard", &summary.dashboard),
        labelled_line("Exported", &summary.exported_at),
    );
    format!(
        r#"<w:tbl><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4"/><w:left w:val="single" w:sz="4"/><w:bottom w:val="single" w:sz="4"/><w:right w:val="single" w:sz="4"/><w:insideV w:val="single" w:sz="4"/></w:tblBorders></w:tblPr><w:tr><w:tc><w:tcPr><w:vAlign w:val="center"/></w:tcPr><w:p>{image_cell}</w:p></w:tc><w:tc><w:tcPr><w:vAlign w:val="center"/></w:tcPr>{meta}</w:tc></w:tr></w:tbl>"#
    )
}

/// A `wp:inline` drawing at fixed 3-inch width, height scaled by aspect.
fn inline_image(rel: usize, px_width: u32, px_height: u32) -> String {
    let cx = IMAGE_WIDTH_EMU;
    let cy = if px_width == 0 {
        IMAGE_WIDTH_EMU
    } else {
        (IMAGE_WIDTH_EMU as i128 * px_height as i128 / px_width as i128) as i64
    };
    format!(
        r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{rel}" name="image{rel}"/><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="{rel}" name="image{rel}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="rId{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
    )
}

fn centered_title(text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/><w:sz w:val="48"/></w:rPr><w:t>{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}

fn heading(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="32"/></w:rPr><w:t>{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}

/// `**Label:** value` as a single paragraph.
fn labelled_line(label: &str, value: &str) -> String {
    format!(
        r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}: </w:t></w:r><w:r><w:t>{}</w:t></w:r></w:p>"#,
        escape_xml(label),
        escape_xml(value)
    )
}

fn italic_paragraph(text: &str) -> String {
    format!(
        r#"<w:r><w:rPr><w:i/></w:rPr><w:t>{}</w:t></w:r>"#,
        escape_xml(text)
    )
}

fn page_break() -> String {
    r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#.to_string()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Read;
    use tempfile::TempDir;

    fn write_test_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb([10, 120, 60])))
            .save(&path)
            .unwrap();
        path
    }

    fn summary(n: usize) -> SlotSummary {
        SlotSummary {
            project: format!("Project {n}"),
            workbook: format!("Workbook {n}"),
            dashboard: format!("Dashboard {n}"),
            exported_at: "2026-01-15 09:30 UTC".to_string(),
        }
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut s = String::new();
        entry.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn archive_contains_expected_parts() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![
            write_test_png(dir.path(), "a.png", 120, 80),
            write_test_png(dir.path(), "b.png", 60, 40),
        ];
        let out =
            merge_to_document(&inputs, dir.path(), "report", &[summary(1), summary(2)]).unwrap();
        assert!(out.ends_with("report.docx"));

        let file = std::fs::File::open(&out).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"[Content_Types].xml"));
        assert!(names.contains(&"word/document.xml"));
        assert!(names.contains(&"word/media/image1.png"));
        assert!(names.contains(&"word/media/image2.png"));
        assert!(names.contains(&"word/_rels/document.xml.rels"));
    }

    #[test]
    fn document_body_carries_metadata_and_images() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![write_test_png(dir.path(), "a.png", 200, 100)];
        let out = merge_to_document(&inputs, dir.path(), "report", &[summary(7)]).unwrap();

        let doc = read_entry(&out, "word/document.xml");
        assert!(doc.contains("Dashboard Report"));
        assert!(doc.contains("Export Summary"));
        assert!(doc.contains("Dashboard 7"));
        assert!(doc.contains(r#"r:embed="rId1""#));
        // 200x100 at 3in wide: cy is half of cx.
        assert!(doc.contains(&format!(r#"cx="{IMAGE_WIDTH_EMU}" cy="{}""#, IMAGE_WIDTH_EMU / 2)));

        let rels = read_entry(&out, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="media/image1.png""#));
    }

    #[test]
    fn missing_image_is_annotated_not_fatal() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![
            write_test_png(dir.path(), "a.png", 100, 100),
            dir.path().join("vanished.png"),
        ];
        let out =
            merge_to_document(&inputs, dir.path(), "report", &[summary(1), summary(2)]).unwrap();

        let doc = read_entry(&out, "word/document.xml");
        assert!(doc.contains("Image not found"));
        // Only one relationship: the missing slot embeds nothing.
        let rels = read_entry(&out, "word/_rels/document.xml.rels");
        assert!(rels.contains("image1.png"));
        assert!(!rels.contains("image2.png"));
    }

    #[test]
    fn empty_and_mismatched_inputs_are_errors() {
        let dir = TempDir::new().unwrap();
        let err = merge_to_document(&[], dir.path(), "report", &[]).unwrap_err();
        assert!(matches!(err, ReportError::Merge { .. }));

        let inputs = vec![write_test_png(dir.path(), "a.png", 10, 10)];
        let err = merge_to_document(&inputs, dir.path(), "report", &[]).unwrap_err();
        assert!(matches!(err, ReportError::Merge { .. }));
    }

    #[test]
    fn metadata_is_xml_escaped() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![write_test_png(dir.path(), "a.png", 10, 10)];
        let mut s = summary(1);
        s.dashboard = "Sales <Q1 & Q2>".to_string();
        let out = merge_to_document(&inputs, dir.path(), "report", &[s]).unwrap();

        let doc = read_entry(&out, "word/document.xml");
        assert!(doc.contains("Sales &lt;Q1 &amp; Q2&gt;"));
    }
}
