//! Path gateways: both URLs carry the same `/ipfs/` or `/ipns/` segment.

use crate::escape::{escape, normalize};
use crate::namespace::{is_recognized, namespace_of, DEFAULT_NAMESPACES_REGEX};
use crate::types::{RedirectPair, RegexRule};
use crate::url::{get_path_start, query_param};

/// Remainder after the namespace; must not start with a dot.
const NAMESPACE_REGEX_ENDING: &str = "((?:[^\\.]|$).*)$";

pub(super) fn compute(pair: &RedirectPair) -> Option<RegexRule> {
    let origin = pair.origin_url.as_str();
    let redirect = pair.redirect_url.as_str();

    let ns = namespace_of(origin);
    if !is_recognized(&ns) || namespace_of(redirect) != ns {
        return None;
    }
    // `?uri=` handlers need their own treatment.
    if query_param(origin, "uri").is_some() {
        return None;
    }

    let marker = format!("/{}/", ns);
    let (origin_first, origin_last) = split_at_namespace(origin, &marker)?;
    let (redirect_first, redirect_last) = split_at_namespace(redirect, &marker)?;
    if origin_last.starts_with('.') {
        return None;
    }
    let redirect_tail = redirect_last.strip_suffix(origin_last)?;

    let pattern = format!(
        "^{}\\/{}\\/{}",
        normalize(&escape(origin_first)),
        DEFAULT_NAMESPACES_REGEX,
        NAMESPACE_REGEX_ENDING,
    );
    let substitution = format!("{}/\\1/{}\\2", redirect_first, redirect_tail);

    Some(RegexRule::new(pattern, substitution))
}

/// Split around the leading `/<ns>/` of the path.
fn split_at_namespace<'a>(url: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let path_start = get_path_start(url)?;
    let head = url.get(path_start..path_start + marker.len())?;
    if head != marker {
        return None;
    }
    Some((&url[..path_start], &url[path_start + marker.len()..]))
}
