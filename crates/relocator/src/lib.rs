//! # Relocator
//!
//! Rewrites ZIP archives by moving one directory to another.
//!
//! Every entry under the rule's source prefix is moved under the destination
//! prefix, references to the source directory inside text entries are
//! rewritten (raw and percent-encoded forms), a fixed list of auxiliary
//! entries is fetched and appended, and the result is serialized as a new
//! archive. Entries the rule does not touch are carried through unchanged.
//!
//! ## Example
//!
//! ```rust,no_run
//! use relocator::{DefaultFetcher, RelocateConfig, Relocator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let input = std::fs::read("site.zip")?;
//!
//! // Default configuration: public/ -> img/, .html and .css rewritten
//! let relocator = Relocator::new(RelocateConfig::default(), DefaultFetcher::new()?)?;
//! let output = relocator.transform(input).await?;
//!
//! println!(
//!     "Relocated {} entries, rewrote {} references",
//!     output.stats.entries_relocated, output.stats.references_rewritten
//! );
//! std::fs::write("modified.zip", output.archive)?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod reader;
pub mod rewrite;
pub mod safety;
pub mod types;
pub mod writer;

// Re-export main types
pub use error::{FetchError, RelocateError};
pub use fetch::{DefaultFetcher, Fetch};
pub use pipeline::{Relocator, StageCallback};
pub use types::{
    ArchiveInfo, AuxiliarySpec, Compression, EncodingVariant, Entry, EntryKind, PlannedEntry,
    RelocateConfig, RewriteRule, Stage, TransformOptions, TransformOutput, TransformStats,
};

/// Transform an archive in one call.
///
/// # Arguments
///
/// * `archive` - Bytes of the input ZIP archive
/// * `config` - Rule, text extensions, encoding variants and auxiliaries
/// * `fetcher` - Retrieves the content of each auxiliary entry
///
/// # Returns
///
/// Returns the bytes of the output archive.
///
/// # Errors
///
/// Returns an error if:
/// - The input is not a valid archive (`CorruptArchive`)
/// - A text entry is not valid UTF-8 (`Decode`)
/// - Any auxiliary cannot be fetched (`FetchFailed`)
/// - The output cannot be serialized (`WriteFailed`)
///
/// No partial archive is returned on any error.
pub async fn transform<F: Fetch + 'static>(
    archive: Vec<u8>,
    config: &RelocateConfig,
    fetcher: F,
) -> Result<Vec<u8>, RelocateError> {
    let relocator = Relocator::new(config.clone(), fetcher)?;
    Ok(relocator.transform(archive).await?.archive)
}

/// Describe an archive and the transform `config` would apply, without
/// decompressing payloads, fetching or writing anything.
///
/// # Errors
///
/// Returns `CorruptArchive` if the input cannot be parsed.
pub fn inspect(archive: &[u8], config: &RelocateConfig) -> Result<ArchiveInfo, RelocateError> {
    reader::inspect_archive(archive, config)
}
