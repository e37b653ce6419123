//! Subdomain gateways: the identifier lives in a DNS label.
//!
//! `https://<id>.ipfs.dweb.link/path` redirected to `.../ipfs/<id>/path`
//! becomes a rule over every `*.ipfs.dweb.link` host.

use crate::escape::{escape, normalize};
use crate::namespace::{is_recognized, namespace_of};
use crate::types::{RedirectPair, RegexRule};
use crate::url::{
    extract_scheme, get_authority_end, get_host_position, get_path_start, get_scheme_end,
};

/// Identifier labels: anything up to the end of the host.
const IDENTIFIER_GROUP: &str = "([^\\/\\?#@]+)";

/// Path, query and fragment, or nothing at all.
const SUBDOMAIN_REGEX_ENDING: &str = "((?:[\\/\\?#]|$).*)$";

pub(super) fn compute(pair: &RedirectPair) -> Option<RegexRule> {
    let origin = pair.origin_url.as_str();
    let redirect = pair.redirect_url.as_str();

    let redirect_ns = namespace_of(redirect);
    if is_recognized(&namespace_of(origin)) || !is_recognized(&redirect_ns) {
        return None;
    }

    let scheme = extract_scheme(origin)?;
    let (host_start, host_end) = get_host_position(origin)?;
    let authority_end = get_authority_end(origin)?;
    if host_start != get_scheme_end(origin)? {
        // Userinfo would not survive generalization.
        return None;
    }

    // Peel static labels off the end until the redirect's namespace shows up.
    let mut labels: Vec<&str> = origin[host_start..host_end].split('.').collect();
    let mut static_labels = Vec::new();
    loop {
        let label = labels.pop()?;
        if label == redirect_ns {
            break;
        }
        static_labels.push(label);
    }
    if labels.is_empty() || static_labels.is_empty() || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    static_labels.reverse();
    let identifier = labels.join(".");

    // The redirect must address the same identifier under its namespace.
    let marker = format!("/{}/{}", redirect_ns, identifier);
    let path_start = get_path_start(redirect)?;
    let marker_pos = path_start + redirect[path_start..].find(&marker)?;
    let after = &redirect[marker_pos + marker.len()..];
    if !(after.is_empty() || after.starts_with(['/', '?', '#'])) {
        return None;
    }

    let pattern = format!(
        "^{}{}\\.({})\\.{}{}{}",
        normalize(&escape(&format!("{scheme}://"))),
        IDENTIFIER_GROUP,
        escape(&redirect_ns),
        escape(&static_labels.join(".")),
        escape(&origin[host_end..authority_end]),
        SUBDOMAIN_REGEX_ENDING,
    );
    let substitution = format!("{}/{}/\\1\\3", &redirect[..marker_pos], redirect_ns);

    Some(RegexRule::new(pattern, substitution))
}
