//! Redir Core Library
//!
//! This crate derives declarative redirect rules from observed gateway
//! redirects. Given one concrete `origin -> redirect` pair it produces a
//! regex match pattern and substitution template general enough to catch
//! every URL of the same shape, without touching unrelated traffic.
//!
//! # Modules
//!
//! - `escape`: literal-to-regex escaping and scheme normalization
//! - `namespace`: `/ipfs/` and `/ipns/` path classification
//! - `filter`: the subdomain, namespace and common-suffix strategies
//! - `guard`: redirects that must not produce a rule
//! - `hash`: stable rule ids
//! - `local`: default loopback rules
//! - `url`: allocation-free URL slicing
//! - `types`: shared types and the declarative rule wire shape

pub mod escape;
pub mod filter;
pub mod guard;
pub mod hash;
pub mod local;
pub mod namespace;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use escape::{escape, normalize};
pub use filter::{derive_rule, DerivedRule, FilterError, FilterStrategy, RegexFilter};
pub use guard::{skip_reason, SkipReason};
pub use hash::rule_id;
pub use local::{default_local_rules, LocalEndpoints, LocalRule};
pub use namespace::namespace_of;
pub use types::{DynamicRule, RedirectPair, RegexRule, ResourceTypes};
