//! Archive packaging.
//!
//! Serializes each document with a [`DocumentWriter`] and bundles the
//! results into one deflate-compressed zip. A document that fails to
//! serialize is logged and left out.

use crate::error::{PipelineError, Result};
use crate::models::ReportDocument;
use crate::report::DocumentWriter;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A packaged bundle.
#[derive(Debug)]
pub struct Archive {
    pub bytes: Vec<u8>,
    /// Entry names, in archive order.
    pub entries: Vec<String>,
    /// Documents that could not be written, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Reduce a name to `[A-Za-z0-9_.-]`, collapsing runs of anything else to
/// a single underscore.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches(|c| c == '_' || c == '.').to_string();
    if out.is_empty() {
        "report".to_string()
    } else {
        out
    }
}

/// Pick a name not yet used in this archive.
fn unique_name(stem: &str, extension: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = format!("{}.{}", stem, extension);
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}.{}", stem, n, extension);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Package documents into a zip archive.
pub fn package<W: DocumentWriter + ?Sized>(
    documents: &[ReportDocument],
    writer: &W,
) -> Result<Archive> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut used = HashSet::new();
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for document in documents {
        let stem = format!("{}_report", sanitize_name(&document.file_stem));

        let bytes = match writer.write(document) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping document '{}': {}", document.file_stem, e);
                skipped.push((document.file_stem.clone(), e.to_string()));
                continue;
            }
        };

        let name = unique_name(&stem, writer.extension(), &mut used);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes)?;
        debug!("Added {} ({} bytes)", name, bytes.len());
        entries.push(name);
    }

    let bytes = zip.finish()?.into_inner();

    if entries.is_empty() && !documents.is_empty() {
        return Err(PipelineError::artifact(
            "archive",
            "every document failed to serialize",
        ));
    }

    Ok(Archive {
        bytes,
        entries,
        skipped,
    })
}
