//! Type definitions for archive relocation.

use crate::error::RelocateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Individual entry read from (or destined for) an archive.
///
/// Entries are never mutated once read: every rewriting step consumes an
/// `Entry` and yields a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Slash-separated path of the entry within the archive
    pub path: String,

    /// Whether this entry is a directory marker
    pub is_directory: bool,

    /// Uncompressed content; always empty for directories
    pub payload: Vec<u8>,

    /// Unix permission bits, when the archive recorded them
    pub unix_mode: Option<u32>,

    /// Compressed size in bytes as declared by the input archive
    pub compressed_size: Option<u64>,
}

impl Entry {
    /// Build a file entry with no recorded metadata.
    pub fn file(path: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            payload: payload.into(),
            unix_mode: None,
            compressed_size: None,
        }
    }

    /// Build a directory marker.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            payload: Vec::new(),
            unix_mode: None,
            compressed_size: None,
        }
    }

    /// Uncompressed size in bytes.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// How an entry's payload is treated by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Zero-length directory marker
    Directory,
    /// Character data whose references are rewritten
    Text,
    /// Opaque bytes carried through untouched
    Binary,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Directory => write!(f, "directory"),
            EntryKind::Text => write!(f, "text"),
            EntryKind::Binary => write!(f, "binary"),
        }
    }
}

/// A single directory rename mapping, e.g. `public/` -> `img/`.
///
/// Both prefixes end in `/`, are relative, contain no `..` segment and no
/// `%`, and the destination never starts with the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleFields", into = "RuleFields")]
pub struct RewriteRule {
    source_prefix: String,
    dest_prefix: String,
}

impl RewriteRule {
    /// Validate and build a rule.
    pub fn new(
        source_prefix: impl Into<String>,
        dest_prefix: impl Into<String>,
    ) -> Result<Self, RelocateError> {
        let source_prefix = source_prefix.into();
        let dest_prefix = dest_prefix.into();
        crate::safety::validate_prefix(&source_prefix)?;
        crate::safety::validate_prefix(&dest_prefix)?;
        if dest_prefix.starts_with(&source_prefix) {
            return Err(RelocateError::InvalidRule(format!(
                "destination '{}' is nested under source '{}'",
                dest_prefix, source_prefix
            )));
        }
        Ok(Self {
            source_prefix,
            dest_prefix,
        })
    }

    pub fn source_prefix(&self) -> &str {
        &self.source_prefix
    }

    pub fn dest_prefix(&self) -> &str {
        &self.dest_prefix
    }
}

#[derive(Serialize, Deserialize)]
struct RuleFields {
    source_prefix: String,
    dest_prefix: String,
}

impl TryFrom<RuleFields> for RewriteRule {
    type Error = RelocateError;

    fn try_from(fields: RuleFields) -> Result<Self, Self::Error> {
        RewriteRule::new(fields.source_prefix, fields.dest_prefix)
    }
}

impl From<RewriteRule> for RuleFields {
    fn from(rule: RewriteRule) -> Self {
        RuleFields {
            source_prefix: rule.source_prefix,
            dest_prefix: rule.dest_prefix,
        }
    }
}

/// One literal form of a prefix that is searched for in text content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingVariant {
    /// The prefix exactly as written in paths (`public/`)
    Raw,
    /// Slashes percent-encoded with uppercase hex (`public%2F`)
    PercentEncoded,
    /// Slashes percent-encoded with lowercase hex (`public%2f`)
    PercentEncodedLower,
}

/// An externally retrieved entry injected into the output archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliarySpec {
    /// Where the content is fetched from (`https:`, `file:` or `data:`)
    pub locator: Url,

    /// Path of the injected entry inside the output archive
    pub dest_name: String,
}

impl AuxiliarySpec {
    pub fn new(locator: Url, dest_name: impl Into<String>) -> Self {
        Self {
            locator,
            dest_name: dest_name.into(),
        }
    }
}

/// Compression applied to file entries in the output archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    Stored,
    /// DEFLATE
    Deflated,
}

/// Options controlling how the archive is read and written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Compression used for file entries in the output
    pub compression: Compression,

    /// Compression level; `None` uses the codec default
    pub compression_level: Option<i64>,

    /// Maximum total declared uncompressed size of the input (default: 20 GB)
    pub size_limit_bytes: Option<u64>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Deflated,
            compression_level: None,
            size_limit_bytes: Some(20 * 1024 * 1024 * 1024), // 20 GB
        }
    }
}

/// Read-only configuration for one or many transform calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocateConfig {
    /// Directory rename mapping applied to paths and text content
    pub rule: RewriteRule,

    /// Extensions (with leading dot) whose entries are treated as text
    pub text_extensions: Vec<String>,

    /// Literal forms of the prefix rewritten in text, applied in order
    pub variants: Vec<EncodingVariant>,

    /// Entries appended after the rewritten input, in this order
    pub auxiliaries: Vec<AuxiliarySpec>,

    /// Codec options
    pub options: TransformOptions,
}

impl Default for RelocateConfig {
    fn default() -> Self {
        Self {
            rule: RewriteRule {
                source_prefix: "public/".to_string(),
                dest_prefix: "img/".to_string(),
            },
            text_extensions: vec![".html".to_string(), ".css".to_string()],
            variants: vec![EncodingVariant::PercentEncoded, EncodingVariant::Raw],
            auxiliaries: default_auxiliaries(),
            options: TransformOptions::default(),
        }
    }
}

fn default_auxiliaries() -> Vec<AuxiliarySpec> {
    [
        (
            "data:text/javascript,console.log(%22LLWebServerExtended%22);",
            "LLWebServerExtended.js",
        ),
        (
            "data:text/javascript,console.log(%22scriptcustom%22);",
            "scriptcustom.js",
        ),
        (
            "data:text/javascript,console.log(%22ew-log-viewer%22);",
            "ew-log-viewer.js",
        ),
    ]
    .into_iter()
    .filter_map(|(locator, name)| Url::parse(locator).ok().map(|u| AuxiliarySpec::new(u, name)))
    .collect()
}

impl RelocateConfig {
    /// Configuration with the given rule and nothing else: no text
    /// extensions and no auxiliaries.
    pub fn with_rule(rule: RewriteRule) -> Self {
        Self {
            rule,
            text_extensions: Vec::new(),
            variants: vec![EncodingVariant::PercentEncoded, EncodingVariant::Raw],
            auxiliaries: Vec::new(),
            options: TransformOptions::default(),
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RelocateError> {
        let config: RelocateConfig =
            serde_json::from_str(json).map_err(|e| RelocateError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything the type system cannot: extension syntax and
    /// auxiliary destination names.
    pub fn validate(&self) -> Result<(), RelocateError> {
        for ext in &self.text_extensions {
            if !ext.starts_with('.') || ext.len() < 2 || ext.contains('/') {
                return Err(RelocateError::InvalidConfig(format!(
                    "text extension '{}' must look like '.html'",
                    ext
                )));
            }
        }
        for aux in &self.auxiliaries {
            crate::safety::validate_entry_name(&aux.dest_name)?;
        }
        Ok(())
    }
}

/// Pipeline stages, in the order they are entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Reading,
    Transforming,
    Fetching,
    Writing,
    Done,
    /// Absorbing failure state carrying the rendered error
    Failed(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Reading => write!(f, "reading archive"),
            Stage::Transforming => write!(f, "rewriting entries"),
            Stage::Fetching => write!(f, "fetching auxiliaries"),
            Stage::Writing => write!(f, "writing archive"),
            Stage::Done => write!(f, "done"),
            Stage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Statistics about a completed transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformStats {
    /// Entries read from the input archive
    pub entries_read: u64,

    /// Entries whose path moved under the destination prefix
    pub entries_relocated: u64,

    /// Text entries whose content changed
    pub text_entries_rewritten: u64,

    /// Total prefix occurrences replaced inside text content
    pub references_rewritten: u64,

    /// Auxiliary entries injected
    pub auxiliaries_injected: u64,

    /// Size of the produced archive in bytes
    pub bytes_written: u64,

    /// Duration of the transform (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Result of a successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Serialized output archive
    pub archive: Vec<u8>,

    /// What the transform did
    pub stats: TransformStats,
}

/// Planned handling of one input entry, as reported by `inspect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEntry {
    /// Path in the input archive
    pub path: String,

    /// Path the entry will have in the output archive
    pub destination: String,

    /// How the payload will be treated
    pub kind: EntryKind,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes (if available)
    pub compressed_size: Option<u64>,
}

/// Metadata about an input archive and how it would be transformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Number of entries in the archive
    pub entries: u64,

    /// Size of the archive itself in bytes
    pub compressed_bytes: u64,

    /// Sum of declared uncompressed sizes
    pub uncompressed_estimate: u64,

    /// Every entry in archive order
    pub entry_list: Vec<PlannedEntry>,

    /// Names the configured auxiliaries will be injected as
    pub auxiliaries: Vec<String>,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
