//! External collaborators
//!
//! The browser's declarative rule table and its tab API are reached through
//! these traits. Futures are `?Send`: everything runs on one cooperative
//! event loop.

use async_trait::async_trait;

use redir_core::DynamicRule;

/// Error type for declarative engine calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Declarative rule engine is not available")]
    Unavailable,
    #[error("Duplicate rule id: {0}")]
    DuplicateId(u32),
    #[error("Rule {id} has an invalid regexFilter: {reason}")]
    InvalidRegex { id: u32, reason: String },
    #[error("Dynamic rule limit of {limit} exceeded")]
    RuleLimitExceeded { limit: usize },
    #[error("Rule update rejected: {0}")]
    Rejected(String),
}

/// Error type for tab calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TabError {
    #[error("No tab with id {0}")]
    NotFound(i32),
    #[error("Tab call rejected: {0}")]
    Rejected(String),
}

/// One batched mutation of the dynamic rule table. Removals apply first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub add_rules: Vec<DynamicRule>,
    pub remove_rule_ids: Vec<u32>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.add_rules.is_empty() && self.remove_rule_ids.is_empty()
    }
}

/// The browser's declarative rule engine.
#[async_trait(?Send)]
pub trait RuleEngine {
    /// Capability probe. When false every reconciler operation is a no-op.
    fn is_available(&self) -> bool {
        true
    }

    /// Installed dynamic rules, optionally restricted to `rule_ids`.
    async fn get_dynamic_rules(
        &self,
        rule_ids: Option<&[u32]>,
    ) -> Result<Vec<DynamicRule>, EngineError>;

    /// Apply one batch atomically.
    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), EngineError>;
}

/// A browser tab as seen by the tab API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: i32,
    pub url: String,
}

/// The browser's tab API.
#[async_trait(?Send)]
pub trait TabApi {
    /// Tabs whose URL starts with `url_prefix`.
    async fn query_tabs(&self, url_prefix: &str) -> Result<Vec<Tab>, TabError>;

    async fn update_tab(&self, tab_id: i32, url: &str) -> Result<(), TabError>;

    async fn reload_tab(&self, tab_id: i32) -> Result<(), TabError>;
}
