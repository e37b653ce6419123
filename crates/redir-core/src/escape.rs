//! Regex escaping for literal URLs
//!
//! Callers escape a literal exactly once, before concatenating it with
//! hand-written pattern fragments. Escaping is not idempotent.

/// Characters allowed in URLs that carry meaning in a regular expression,
/// plus the few unsafe ones that only appear in malformed URLs.
const URL_REGEX_META: &[char] = &[
    ':', '/', '?', '#', '[', ']', '@', '!', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '=',
    '-', '_', '.', '~', ' ', '|', '^', '{', '}', '\\',
];

/// Scheme token every normalized pattern starts with.
pub const HTTP_SCHEME_PATTERN: &str = "https?\\://";

/// Literal scheme prefixes [`normalize`] folds into [`HTTP_SCHEME_PATTERN`],
/// longest first so `https` is tried before `http`.
const SCHEME_VARIANTS: &[&str] = &[
    "https\\:\\/\\/",
    "http\\:\\/\\/",
    "https\\://",
    "http\\://",
    "https://",
    "http://",
    "https\\:",
    "http\\:",
    "https:",
    "http:",
];

/// Escape a literal URL string into a regex fragment.
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len() * 2);
    for c in literal.chars() {
        if URL_REGEX_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Rewrite a leading `http:`/`https:` scheme, escaped or not, into `https?\://`.
///
/// Only the scheme at the start of the pattern (after an optional `^`) is
/// touched; URLs embedded further along, e.g. in a query, are left alone.
pub fn normalize(pattern: &str) -> String {
    let (anchor, rest) = match pattern.strip_prefix('^') {
        Some(rest) => ("^", rest),
        None => ("", pattern),
    };

    for variant in SCHEME_VARIANTS {
        if let Some(tail) = rest.strip_prefix(variant) {
            if variant.ends_with('/') {
                return format!("{anchor}{HTTP_SCHEME_PATTERN}{tail}");
            }
            // No slashes after the colon; keep whatever follows verbatim.
            return format!("{anchor}https?\\:{tail}");
        }
    }

    pattern.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_escape_url() {
        assert_eq!(escape("https://ipfs.io"), "https\\:\\/\\/ipfs\\.io");
        assert_eq!(escape("a-b_c~d"), "a\\-b\\_c\\~d");
        assert_eq!(escape("?x=1&y=(2)"), "\\?x\\=1\\&y\\=\\(2\\)");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_escape_not_idempotent() {
        let once = escape("a.b");
        assert_ne!(escape(&once), once);
    }

    #[test]
    fn test_escape_round_trip() {
        let literals = [
            "https://ipfs.io/ipfs/QmZMxU?filename=a b.txt#frag",
            "http://[::1]:8080/ipns/en.wikipedia-on-ipfs.org/wiki/",
            "https://user@gw.example/~u/!$&'()*+,;=",
            "http://127.0.0.1:5001/api/v0/add?arg=x|y^z{1}\\",
        ];
        for literal in literals {
            let re = Regex::new(&format!("^{}$", escape(literal))).unwrap();
            assert!(re.is_match(literal), "{literal} did not match itself");
            assert!(!re.is_match(&format!("{literal}x")));
        }
    }

    #[test]
    fn test_escaped_dot_is_literal() {
        let re = Regex::new(&format!("^{}$", escape("ipfs.io"))).unwrap();
        assert!(!re.is_match("ipfsxio"));
    }

    #[test]
    fn test_normalize_schemes() {
        assert_eq!(normalize("^https\\:\\/\\/ipfs\\.io"), "^https?\\://ipfs\\.io");
        assert_eq!(normalize("^http\\:\\/\\/ipfs\\.io"), "^https?\\://ipfs\\.io");
        assert_eq!(normalize("http://ipfs.io"), "https?\\://ipfs.io");
        assert_eq!(normalize("https\\:x"), "https?\\:x");
        assert_eq!(normalize("^ftp\\:\\/\\/x"), "^ftp\\:\\/\\/x");
    }

    #[test]
    fn test_normalize_leaves_embedded_urls() {
        let pattern = "^https\\:\\/\\/a\\/\\?u\\=http\\:\\/\\/b";
        assert_eq!(normalize(pattern), "^https?\\://a\\/\\?u\\=http\\:\\/\\/b");
    }

    #[test]
    fn test_normalized_matches_both_schemes() {
        let re = Regex::new(&normalize(&format!("^{}$", escape("http://ipfs.io/")))).unwrap();
        assert!(re.is_match("http://ipfs.io/"));
        assert!(re.is_match("https://ipfs.io/"));
        assert!(!re.is_match("ftp://ipfs.io/"));
    }
}
