//! Entry classification: directory marker, text payload or opaque binary.

use crate::types::{Entry, EntryKind};

/// Classify an entry by structure and file extension only.
///
/// Directories are recognised from the archive's directory flag or a trailing
/// slash. A file is `Text` when its name ends with one of `text_extensions`
/// (compared ASCII case-insensitively, so `INDEX.HTML` matches `.html`);
/// every other file is `Binary`. Content is never sniffed.
pub fn classify(entry: &Entry, text_extensions: &[String]) -> EntryKind {
    if entry.is_directory || entry.path.ends_with('/') {
        return EntryKind::Directory;
    }
    if is_text_path(&entry.path, text_extensions) {
        EntryKind::Text
    } else {
        EntryKind::Binary
    }
}

/// Whether `path` carries one of the text extensions.
pub fn is_text_path(path: &str, text_extensions: &[String]) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    text_extensions.iter().any(|ext| ends_with_ignore_case(name, ext))
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    // A bare ".html" file has no stem but still ends with the extension
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
