//! Regex filter strategies
//!
//! Each strategy turns one concrete origin -> redirect pair into a rule that
//! covers the whole family of URLs the pair belongs to. Strategies are tried
//! in a fixed order, narrowest first; [`FilterStrategy::CommonSuffix`] accepts
//! every pair, so derivation always produces a rule.

mod common;
mod namespace;
mod subdomain;

use std::fmt;

use crate::types::{RedirectPair, RegexRule};

/// Error returned when reading the rule of a filter that cannot handle its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("{0} filter cannot handle this redirect")]
    CannotHandle(FilterStrategy),
}

/// The closed set of rule shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStrategy {
    /// `https://<cid>.ipfs.gateway.tld/...` -> `.../ipfs/<cid>/...`
    Subdomain,
    /// `https://gateway.tld/ipfs/...` -> `http://local/ipfs/...`
    Namespace,
    /// Longest common suffix; accepts any pair.
    CommonSuffix,
}

impl FilterStrategy {
    /// Strategies in the order they are tried.
    pub const PRIORITY: [FilterStrategy; 3] = [
        FilterStrategy::Subdomain,
        FilterStrategy::Namespace,
        FilterStrategy::CommonSuffix,
    ];

    /// Strategies that may decline a pair, narrowest first. `CommonSuffix`
    /// is the catch-all after them.
    const NARROWING: [FilterStrategy; 2] = [FilterStrategy::Subdomain, FilterStrategy::Namespace];

    /// Compute this strategy's rule, or `None` if the pair has the wrong shape.
    pub fn compute(self, pair: &RedirectPair) -> Option<RegexRule> {
        match self {
            FilterStrategy::Subdomain => subdomain::compute(pair),
            FilterStrategy::Namespace => namespace::compute(pair),
            FilterStrategy::CommonSuffix => Some(common::compute(pair)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterStrategy::Subdomain => "subdomain",
            FilterStrategy::Namespace => "namespace",
            FilterStrategy::CommonSuffix => "common-suffix",
        }
    }
}

impl fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One strategy evaluated against one pair.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    strategy: FilterStrategy,
    rule: Option<RegexRule>,
}

impl RegexFilter {
    pub fn new(strategy: FilterStrategy, pair: &RedirectPair) -> Self {
        Self {
            strategy,
            rule: strategy.compute(pair),
        }
    }

    #[inline]
    pub fn strategy(&self) -> FilterStrategy {
        self.strategy
    }

    #[inline]
    pub fn can_handle(&self) -> bool {
        self.rule.is_some()
    }

    /// The computed rule. Only valid when [`can_handle`](Self::can_handle) is true.
    pub fn filter(&self) -> Result<&RegexRule, FilterError> {
        self.rule
            .as_ref()
            .ok_or(FilterError::CannotHandle(self.strategy))
    }

    pub fn into_rule(self) -> Result<RegexRule, FilterError> {
        self.rule.ok_or(FilterError::CannotHandle(self.strategy))
    }
}

/// A rule together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRule {
    pub strategy: FilterStrategy,
    pub rule: RegexRule,
}

/// Derive the narrowest rule that generalizes `pair`.
pub fn derive_rule(pair: &RedirectPair) -> DerivedRule {
    let (strategy, rule) = FilterStrategy::NARROWING
        .iter()
        .find_map(|&strategy| strategy.compute(pair).map(|rule| (strategy, rule)))
        .unwrap_or_else(|| (FilterStrategy::CommonSuffix, common::compute(pair)));

    log::debug!(
        "{} filter for {} -> {}: {} => {}",
        strategy,
        pair.origin_url,
        pair.redirect_url,
        rule.pattern,
        rule.substitution
    );

    DerivedRule { strategy, rule }
}
