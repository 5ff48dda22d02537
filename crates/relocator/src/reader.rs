//! Archive reading: parse an in-memory ZIP into an ordered entry list.

use crate::classify::classify;
use crate::error::RelocateError;
use crate::rewrite::rewrite_path;
use crate::safety::check_size_limits;
use crate::types::{ArchiveInfo, Entry, PlannedEntry, RelocateConfig, TransformOptions};
use std::io::{Cursor, Read};
use tracing::debug;

/// Upper bound on the buffer reserved up front for one entry; the declared
/// size is untrusted.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Parse `bytes` as a ZIP archive and return every entry in central
/// directory order.
///
/// The declared uncompressed sizes are checked against
/// `options.size_limit_bytes` before anything is decompressed. Any structural
/// problem (bad signature, truncated directory, CRC mismatch, encrypted
/// entry) fails the whole read; no partial entry list is ever returned.
pub fn read_archive(bytes: &[u8], options: &TransformOptions) -> Result<Vec<Entry>, RelocateError> {
    let mut archive = open(bytes)?;

    let declared = declared_size(&mut archive)?;
    check_size_limits(declared, options.size_limit_bytes)?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| RelocateError::CorruptArchive(format!("entry #{}: {}", i, e)))?;

        let path = file.name().to_string();
        let is_directory = file.is_dir();
        let unix_mode = file.unix_mode();
        let compressed_size = Some(file.compressed_size());

        let mut payload = Vec::new();
        if !is_directory {
            payload.reserve(file.size().min(MAX_PREALLOC) as usize);
            file.read_to_end(&mut payload)
                .map_err(|e| RelocateError::CorruptArchive(format!("{}: {}", path, e)))?;
        }

        debug!(path = %path, is_directory, size = payload.len(), "read entry");

        entries.push(Entry {
            path,
            is_directory,
            payload,
            unix_mode,
            compressed_size,
        });
    }

    Ok(entries)
}

/// Describe an archive and how `config` would transform it, without
/// decompressing any payload.
pub fn inspect_archive(bytes: &[u8], config: &RelocateConfig) -> Result<ArchiveInfo, RelocateError> {
    let mut archive = open(bytes)?;

    let mut entry_list = Vec::with_capacity(archive.len());
    let mut uncompressed_estimate = 0u64;
    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| RelocateError::CorruptArchive(format!("entry #{}: {}", i, e)))?;

        let probe = Entry {
            path: file.name().to_string(),
            is_directory: file.is_dir(),
            payload: Vec::new(),
            unix_mode: None,
            compressed_size: None,
        };
        let kind = classify(&probe, &config.text_extensions);
        uncompressed_estimate = uncompressed_estimate.saturating_add(file.size());

        entry_list.push(PlannedEntry {
            destination: rewrite_path(&probe.path, &config.rule),
            path: probe.path,
            kind,
            size: file.size(),
            compressed_size: Some(file.compressed_size()),
        });
    }

    Ok(ArchiveInfo {
        entries: entry_list.len() as u64,
        compressed_bytes: bytes.len() as u64,
        uncompressed_estimate,
        entry_list,
        auxiliaries: config
            .auxiliaries
            .iter()
            .map(|aux| aux.dest_name.clone())
            .collect(),
    })
}

fn open(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>, RelocateError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RelocateError::CorruptArchive(e.to_string()))
}

fn declared_size(archive: &mut zip::ZipArchive<Cursor<&[u8]>>) -> Result<u64, RelocateError> {
    let mut total = 0u64;
    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| RelocateError::CorruptArchive(format!("entry #{}: {}", i, e)))?;
        total = total.saturating_add(file.size());
    }
    Ok(total)
}
