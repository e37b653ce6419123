//! Path namespace classification
//!
//! Gateways address content under `/ipfs/<cid>` or `/ipns/<name>`. The first
//! path segment decides which rule shape applies.

use crate::url::extract_path;

/// Recognized path namespaces.
pub const DEFAULT_NAMESPACES: [&str; 2] = ["ipfs", "ipns"];

/// Regex alternation over [`DEFAULT_NAMESPACES`].
pub const DEFAULT_NAMESPACES_REGEX: &str = "(ipfs|ipns)";

/// First non-empty path segment, as written. Empty if the path has none.
pub fn namespace_of(url: &str) -> String {
    extract_path(url)
        .split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Whether `segment` is one of [`DEFAULT_NAMESPACES`].
#[inline]
pub fn is_recognized(segment: &str) -> bool {
    DEFAULT_NAMESPACES.contains(&segment)
}
