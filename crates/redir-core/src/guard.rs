//! Redirects that must not produce a rule

use std::fmt;

use crate::types::RedirectPair;
use crate::url::{is_loopback_url, is_served_by};

/// Why an observed redirect was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Origin and redirect are the same URL.
    SameUrl,
    /// Both ends are loopback addresses; the default local rules cover them.
    Loopback,
    /// The origin is the local gateway itself and the redirect is not the
    /// recovery page. A rule here would loop.
    OwnGateway,
}

impl SkipReason {
    pub fn name(self) -> &'static str {
        match self {
            SkipReason::SameUrl => "same-url",
            SkipReason::Loopback => "loopback",
            SkipReason::OwnGateway => "own-gateway",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check `pair` against the skip conditions, in order.
///
/// `recovery_page_url` is a prefix; an empty prefix never matches.
pub fn skip_reason(
    pair: &RedirectPair,
    gateway_url: &str,
    recovery_page_url: Option<&str>,
) -> Option<SkipReason> {
    if pair.origin_url == pair.redirect_url {
        return Some(SkipReason::SameUrl);
    }
    if is_loopback_url(&pair.origin_url) && is_loopback_url(&pair.redirect_url) {
        return Some(SkipReason::Loopback);
    }
    let to_recovery = recovery_page_url
        .map_or(false, |prefix| !prefix.is_empty() && pair.redirect_url.starts_with(prefix));
    if is_served_by(&pair.origin_url, gateway_url) && !to_recovery {
        return Some(SkipReason::OwnGateway);
    }
    None
}
