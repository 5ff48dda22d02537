//! Validation of rule prefixes, injected entry names and size limits.
//!
//! Archive paths are plain slash-separated strings; nothing here touches the
//! filesystem.

use crate::error::RelocateError;
use std::path::{Component, Path};

/// Validates a rewrite-rule prefix such as `public/` or `static/img/`.
///
/// A valid prefix:
/// - is non-empty and ends with `/`, so `public/` never matches `publicx/`
/// - is relative (no leading `/`, no drive prefix)
/// - has no empty, `.` or `..` segments
/// - contains no `%` or `\`, so its raw and percent-encoded forms stay disjoint
///
/// # Examples
///
/// ```
/// use relocator::safety::validate_prefix;
///
/// assert!(validate_prefix("public/").is_ok());
/// assert!(validate_prefix("public").is_err());
/// assert!(validate_prefix("../public/").is_err());
/// ```
pub fn validate_prefix(prefix: &str) -> Result<(), RelocateError> {
    let body = prefix.strip_suffix('/').ok_or_else(|| {
        RelocateError::InvalidRule(format!("prefix '{}' must end with '/'", prefix))
    })?;

    if body.is_empty() {
        return Err(RelocateError::InvalidRule(
            "prefix must name at least one directory".to_string(),
        ));
    }

    if prefix.contains('%') || prefix.contains('\\') {
        return Err(RelocateError::InvalidRule(format!(
            "prefix '{}' contains '%' or '\\'",
            prefix
        )));
    }

    for segment in body.split('/') {
        match segment {
            "" => {
                return Err(RelocateError::InvalidRule(format!(
                    "prefix '{}' is absolute or has an empty segment",
                    prefix
                )))
            }
            "." | ".." => {
                return Err(RelocateError::InvalidRule(format!(
                    "prefix '{}' contains a '{}' segment",
                    prefix, segment
                )))
            }
            s if s.contains(':') => {
                // Drive-letter style prefixes ("C:/") are not archive paths
                return Err(RelocateError::InvalidRule(format!(
                    "prefix '{}' contains a drive or volume",
                    prefix
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Validates the destination name of an injected entry.
///
/// Names must be relative file paths without traversal; a trailing `/` would
/// turn the entry into a directory marker and is rejected too.
pub fn validate_entry_name(name: &str) -> Result<(), RelocateError> {
    if name.is_empty() || name.ends_with('/') {
        return Err(RelocateError::InvalidConfig(format!(
            "auxiliary name '{}' must name a file",
            name
        )));
    }

    let path = Path::new(name);
    if path.is_absolute() || name.starts_with('/') {
        return Err(RelocateError::InvalidConfig(format!(
            "auxiliary name '{}' is absolute",
            name
        )));
    }

    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir | Component::ParentDir => {
                return Err(RelocateError::InvalidConfig(format!(
                    "auxiliary name '{}' contains '.' or '..'",
                    name
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RelocateError::InvalidConfig(format!(
                    "auxiliary name '{}' is absolute",
                    name
                )));
            }
        }
    }

    Ok(())
}

/// Checks the declared uncompressed size against the configured limit.
///
/// # Examples
///
/// ```
/// use relocator::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)).is_ok());
/// assert!(check_size_limits(3000, Some(2000)).is_err());
/// assert!(check_size_limits(999_999_999, None).is_ok());
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), RelocateError> {
    if let Some(max_bytes) = limit {
        if current_bytes > max_bytes {
            return Err(RelocateError::SizeLimitExceeded {
                current: current_bytes,
                limit: max_bytes,
            });
        }
    }
    Ok(())
}
