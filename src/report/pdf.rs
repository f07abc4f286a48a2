//! Minimal PDF 1.4 writer.
//!
//! Pages come from the layout engine; text uses the standard Helvetica
//! fonts with WinAnsi encoding, charts are drawn as vector paths.

use super::chart::{ChartArtifact, Color, Primitive};
use super::layout::{self, DrawOp, Page, PAGE_HEIGHT, PAGE_WIDTH};
use super::DocumentWriter;
use crate::error::Result;
use crate::models::ReportDocument;
use std::fmt::Write as _;

const MM_TO_PT: f64 = 72.0 / 25.4;

/// Replace characters the standard fonts cannot show.
///
/// Typographic punctuation is mapped to ASCII; anything else outside
/// Latin-1 becomes `?`.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => out.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' | '\u{25cf}' => out.push('-'),
            '\u{2192}' => out.push_str("->"),
            '\u{00a0}' | '\u{2009}' | '\u{200b}' => out.push(' '),
            '\t' | '\r' | '\n' => out.push(' '),
            c if (c as u32) < 0x20 => {}
            c if (c as u32) <= 0xff => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Encode sanitized text as the body of a PDF literal string.
fn pdf_string(text: &str) -> String {
    let mut out = String::new();
    for c in sanitize_text(text).chars() {
        let code = c as u32;
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            _ if code > 126 => {
                let _ = write!(out, "\\{:03o}", code);
            }
            _ => out.push(c),
        }
    }
    out
}

fn x_pt(mm: f64) -> f64 {
    mm * MM_TO_PT
}

fn y_pt(mm: f64) -> f64 {
    (PAGE_HEIGHT - mm) * MM_TO_PT
}

fn rgb(color: Color) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        color.0 as f64 / 255.0,
        color.1 as f64 / 255.0,
        color.2 as f64 / 255.0
    )
}

fn text_op(out: &mut String, x_mm: f64, y_mm: f64, size: f64, bold: bool, text: &str) {
    let font = if bold { "F2" } else { "F1" };
    let _ = writeln!(
        out,
        "BT /{} {:.2} Tf {:.2} {:.2} Td ({}) Tj ET",
        font,
        size,
        x_pt(x_mm),
        y_pt(y_mm),
        pdf_string(text)
    );
}

/// Draw chart primitives scaled into a box given in millimetres.
fn chart_ops(out: &mut String, x: f64, y: f64, w: f64, artifact: &ChartArtifact) {
    let scale = w / artifact.width;
    let mm = |px: f64| px * scale;

    for primitive in &artifact.primitives {
        match primitive {
            Primitive::Rect {
                x: px,
                y: py,
                w: pw,
                h: ph,
                fill,
            } => {
                let _ = writeln!(
                    out,
                    "{} rg {:.2} {:.2} {:.2} {:.2} re f",
                    rgb(*fill),
                    x_pt(x + mm(*px)),
                    y_pt(y + mm(*py + *ph)),
                    x_pt(mm(*pw)),
                    x_pt(mm(*ph))
                );
            }
            Primitive::Line {
                x1,
                y1,
                x2,
                y2,
                stroke,
            } => {
                let _ = writeln!(
                    out,
                    "{} RG 0.4 w {:.2} {:.2} m {:.2} {:.2} l S",
                    rgb(*stroke),
                    x_pt(x + mm(*x1)),
                    y_pt(y + mm(*y1)),
                    x_pt(x + mm(*x2)),
                    y_pt(y + mm(*y2))
                );
            }
            Primitive::Text {
                x: px,
                y: py,
                size,
                text,
                bold,
            } => {
                // Pixel font sizes scale like any other length.
                out.push_str("0 0 0 rg\n");
                text_op(out, x + mm(*px), y + mm(*py), x_pt(mm(*size)), *bold, text);
            }
        }
    }
}

fn page_content(page: &Page) -> String {
    let mut out = String::new();

    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                bold,
                text,
            } => {
                out.push_str("0 0 0 rg\n");
                text_op(&mut out, *x, *y, *size, *bold, text);
            }
            DrawOp::Rect {
                x,
                y,
                w,
                h,
                fill,
                stroke,
            } => {
                let rect = format!(
                    "{:.2} {:.2} {:.2} {:.2} re",
                    x_pt(*x),
                    y_pt(*y + *h),
                    x_pt(*w),
                    x_pt(*h)
                );
                if let Some(color) = fill {
                    let _ = writeln!(out, "{} rg {} f", rgb(*color), rect);
                }
                if *stroke {
                    let _ = writeln!(out, "0 0 0 RG 0.3 w {} S", rect);
                }
            }
            DrawOp::Chart {
                x, y, w, artifact, ..
            } => chart_ops(&mut out, *x, *y, *w, artifact),
        }
    }

    out
}

/// Serialize laid-out pages into a PDF file.
pub fn write_pdf(title: &str, pages: &[Page]) -> Vec<u8> {
    let mut objects: Vec<Vec<u8>> = Vec::new();

    // 1 catalog, 2 page tree, 3-4 fonts, 5 info, then page/content pairs.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 6 + 2 * i).collect();
    let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        )
        .into_bytes(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        format!(
            "<< /Title ({}) /Producer (feedback-catalyst) >>",
            pdf_string(title)
        )
        .into_bytes(),
    );

    for (page, id) in pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                x_pt(PAGE_WIDTH),
                x_pt(PAGE_HEIGHT),
                id + 1
            )
            .into_bytes(),
        );

        let content = page_content(page);
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut pdf: Vec<u8> = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in &offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    pdf.extend_from_slice(xref.as_bytes());

    pdf
}

/// Production [`DocumentWriter`]: A4 PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfWriter;

impl DocumentWriter for PdfWriter {
    fn extension(&self) -> &str {
        "pdf"
    }

    fn write(&self, document: &ReportDocument) -> Result<Vec<u8>> {
        let pages = layout::layout(document);
        Ok(write_pdf(&document.header, &pages))
    }
}
