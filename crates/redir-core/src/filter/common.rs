//! Fallback: capture the longest common suffix of origin and redirect.
//!
//! The match prefix never stops short of the origin's `host[:port]`. A prefix
//! that ends inside the scheme or host (`^https?\://a` for `a.example.com`
//! vs `b.example.com`) would also match every other host sharing those first
//! characters, so the capture boundary is pushed out to the end of the
//! authority. The suffix that remains is still common to both URLs.

use crate::escape::{escape, normalize};
use crate::types::{RedirectPair, RegexRule};
use crate::url::get_authority_end;

const COMMON_REGEX_ENDING: &str = "(.*)$";

pub(super) fn compute(pair: &RedirectPair) -> RegexRule {
    let origin = pair.origin_url.as_str();
    let redirect = pair.redirect_url.as_str();

    let common = common_suffix_len(origin, redirect);
    let boundary = match get_authority_end(origin) {
        Some(authority_end) => (origin.len() - common).max(authority_end),
        // Opaque URL: only the URL itself is safe to match.
        None => origin.len(),
    };
    let suffix_len = origin.len() - boundary;

    let pattern = format!(
        "^{}{}",
        normalize(&escape(&origin[..boundary])),
        COMMON_REGEX_ENDING
    );
    let substitution = format!("{}\\1", &redirect[..redirect.len() - suffix_len]);

    RegexRule::new(pattern, substitution)
}

/// Byte length of the longest common suffix, on char boundaries.
fn common_suffix_len(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}
