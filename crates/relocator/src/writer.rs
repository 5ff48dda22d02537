//! Archive writing: serialize an ordered entry list into a new ZIP.

use crate::error::RelocateError;
use crate::types::{Compression, Entry, TransformOptions};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Serialize `entries` into a ZIP archive, in order.
///
/// Directories become zero-length directory markers; files carry their
/// payload with the configured compression. When two entries share a path,
/// the later one's content wins and is written at the position of the first.
pub fn write_archive(entries: Vec<Entry>, options: &TransformOptions) -> Result<Vec<u8>, RelocateError> {
    let entries = collapse_duplicates(entries);

    let (method, level) = match options.compression {
        Compression::Stored => (CompressionMethod::Stored, None),
        Compression::Deflated => (CompressionMethod::Deflated, options.compression_level),
    };

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in &entries {
        let mut file_options = SimpleFileOptions::default()
            .compression_method(method)
            .compression_level(level)
            .large_file(entry.size() >= u32::MAX as u64);
        if let Some(mode) = entry.unix_mode {
            file_options = file_options.unix_permissions(mode);
        }

        if entry.is_directory {
            zip.add_directory(entry.path.as_str(), file_options)
                .map_err(|e| write_failed(&entry.path, e))?;
        } else {
            zip.start_file(entry.path.as_str(), file_options)
                .map_err(|e| write_failed(&entry.path, e))?;
            zip.write_all(&entry.payload)
                .map_err(|e| write_failed(&entry.path, e))?;
        }
        debug!(path = %entry.path, size = entry.size(), "wrote entry");
    }

    let cursor = zip
        .finish()
        .map_err(|e| RelocateError::WriteFailed(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Merge entries sharing a path: the first occurrence keeps its position and
/// takes the content of the last.
fn collapse_duplicates(entries: Vec<Entry>) -> Vec<Entry> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<Entry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match slots.get(&entry.path) {
            Some(&slot) => {
                debug!(path = %entry.path, "replacing earlier entry");
                out[slot] = entry;
            }
            None => {
                slots.insert(entry.path.clone(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

fn write_failed(path: &str, e: impl std::fmt::Display) -> RelocateError {
    RelocateError::WriteFailed(format!("{}: {}", path, e))
}
