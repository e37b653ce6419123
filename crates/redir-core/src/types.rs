//! Core type definitions
//!
//! [`DynamicRule`] serializes to exactly the JSON shape the browser's
//! declarative rule engine consumes and returns.

use std::fmt;

use regex::Regex;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

// =============================================================================
// Redirect Pair
// =============================================================================

/// An observed origin -> redirect URL pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedirectPair {
    pub origin_url: String,
    pub redirect_url: String,
}

impl RedirectPair {
    pub fn new(origin_url: impl Into<String>, redirect_url: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            redirect_url: redirect_url.into(),
        }
    }
}

// =============================================================================
// Regex Rule
// =============================================================================

/// A derived match pattern and its substitution template.
///
/// The template uses `\0`..`\9` back-references into the pattern's groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegexRule {
    pub pattern: String,
    pub substitution: String,
}

impl RegexRule {
    pub fn new(pattern: impl Into<String>, substitution: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            substitution: substitution.into(),
        }
    }

    /// Compile the match pattern.
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.pattern)
    }

    /// Rewrite `url` the way the declarative engine would: the first match is
    /// replaced by the expanded substitution. `Ok(None)` if nothing matches.
    pub fn apply(&self, url: &str) -> Result<Option<String>, regex::Error> {
        let re = self.compile()?;
        Ok(apply_compiled(&re, &self.substitution, url))
    }
}

/// [`RegexRule::apply`] for an already compiled pattern.
pub fn apply_compiled(re: &Regex, substitution: &str, url: &str) -> Option<String> {
    let caps = re.captures(url)?;
    let whole = caps.get(0)?;

    let mut out = String::with_capacity(url.len() + substitution.len());
    out.push_str(&url[..whole.start()]);

    let mut chars = substitution.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let group = d as usize - '0' as usize;
                if let Some(m) = caps.get(group) {
                    out.push_str(m.as_str());
                }
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            _ => out.push('\\'),
        }
    }

    out.push_str(&url[whole.end()..]);
    Some(out)
}

// =============================================================================
// Resource Types
// =============================================================================

bitflags::bitflags! {
    /// Web request resource types a rule applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceTypes: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const OBJECT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const PING = 1 << 8;
        const CSP_REPORT = 1 << 9;
        const MEDIA = 1 << 10;
        const WEBSOCKET = 1 << 11;
        const WEBTRANSPORT = 1 << 12;
        const WEBBUNDLE = 1 << 13;
        const OTHER = 1 << 14;

        /// Every type a gateway-hosted asset can be requested as.
        const REDIRECTABLE = 0x7FFF;
    }
}

const RESOURCE_TYPE_NAMES: [(ResourceTypes, &str); 15] = [
    (ResourceTypes::CSP_REPORT, "csp_report"),
    (ResourceTypes::FONT, "font"),
    (ResourceTypes::IMAGE, "image"),
    (ResourceTypes::MAIN_FRAME, "main_frame"),
    (ResourceTypes::MEDIA, "media"),
    (ResourceTypes::OBJECT, "object"),
    (ResourceTypes::OTHER, "other"),
    (ResourceTypes::PING, "ping"),
    (ResourceTypes::SCRIPT, "script"),
    (ResourceTypes::STYLESHEET, "stylesheet"),
    (ResourceTypes::SUB_FRAME, "sub_frame"),
    (ResourceTypes::WEBBUNDLE, "webbundle"),
    (ResourceTypes::WEBSOCKET, "websocket"),
    (ResourceTypes::WEBTRANSPORT, "webtransport"),
    (ResourceTypes::XMLHTTPREQUEST, "xmlhttprequest"),
];

impl ResourceTypes {
    /// Parse from a browser resource type string.
    pub fn from_browser_name(name: &str) -> Option<Self> {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Browser names of the contained types, in alphabetical order.
    pub fn names(&self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ResourceTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ResourceTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamesVisitor;

        impl<'de> Visitor<'de> for NamesVisitor {
            type Value = ResourceTypes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of resource type names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut types = ResourceTypes::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let flag = ResourceTypes::from_browser_name(&name).ok_or_else(|| {
                        de::Error::custom(format!("unknown resource type: {name}"))
                    })?;
                    types |= flag;
                }
                Ok(types)
            }
        }

        deserializer.deserialize_seq(NamesVisitor)
    }
}

// =============================================================================
// Declarative Rule
// =============================================================================

/// Priority of every rule we install.
pub const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub regex_substitution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub regex_filter: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_initiator_domains: Vec<String>,
    pub resource_types: ResourceTypes,
}

/// A rule as stored in the declarative engine's dynamic rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl DynamicRule {
    /// A redirect rule scoped to [`ResourceTypes::REDIRECTABLE`].
    pub fn redirect(id: u32, rule: &RegexRule, excluded_initiator_domains: Vec<String>) -> Self {
        Self {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction {
                kind: ActionType::Redirect,
                redirect: Redirect {
                    regex_substitution: rule.substitution.clone(),
                },
            },
            condition: RuleCondition {
                regex_filter: rule.pattern.clone(),
                excluded_initiator_domains,
                resource_types: ResourceTypes::REDIRECTABLE,
            },
        }
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        &self.condition.regex_filter
    }

    #[inline]
    pub fn substitution(&self) -> &str {
        &self.action.redirect.regex_substitution
    }

    pub fn regex_rule(&self) -> RegexRule {
        RegexRule::new(self.pattern(), self.substitution())
    }
}
