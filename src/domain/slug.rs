//! Filesystem-safe identifiers derived from user supplied titles.

use regex::Regex;
use std::sync::OnceLock;

fn separator_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// Derive the job identifier from a title.
///
/// Lossy and case-folded: every run of characters outside `[a-z0-9]` collapses
/// into a single `-`, and separators are trimmed from both ends. The result
/// never contains path separators, so it is always safe as a directory name.
/// An empty return value means the title had no usable characters.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    separator_runs()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Check an identifier received from outside before it is joined onto a path.
pub fn validate_id(id: &str) -> Result<(), InvalidId> {
    if id.is_empty() {
        return Err(InvalidId::Empty);
    }
    if id.contains("..") || id.contains('/') || id.contains('\\') || id.contains('\0') {
        return Err(InvalidId::Traversal(id.to_string()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidId {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {0:?} contains path traversal sequences")]
    Traversal(String),
}
