//! In-memory collaborators
//!
//! A rule table and tab set with the browser's observable behavior, for the
//! CLI simulator and tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use async_trait::async_trait;

use redir_core::types::apply_compiled;
use redir_core::DynamicRule;

use crate::config::DEFAULT_MAX_DYNAMIC_RULES;
use crate::engine::{EngineError, RuleEngine, RuleUpdate, Tab, TabApi, TabError};

// =============================================================================
// Rule Engine
// =============================================================================

/// Dynamic rule table kept in memory.
///
/// Updates are validated as a whole before any change is committed: duplicate
/// ids, regexes that do not compile and batches that would exceed the limit
/// reject the entire update.
#[derive(Debug)]
pub struct MemoryRuleEngine {
    rules: RefCell<BTreeMap<u32, DynamicRule>>,
    available: bool,
    limit: usize,
    update_calls: Cell<usize>,
}

impl Default for MemoryRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_DYNAMIC_RULES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            rules: RefCell::new(BTreeMap::new()),
            available: true,
            limit,
            update_calls: Cell::new(0),
        }
    }

    /// An engine that fails the capability probe.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Installed rules in id order.
    pub fn rules(&self) -> Vec<DynamicRule> {
        self.rules.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.borrow().is_empty()
    }

    /// Number of `update_dynamic_rules` calls that were accepted.
    pub fn update_calls(&self) -> usize {
        self.update_calls.get()
    }

    /// Put a rule in place without validation, as a previous session might
    /// have left it.
    pub fn insert_raw(&self, rule: DynamicRule) {
        self.rules.borrow_mut().insert(rule.id, rule);
    }

    /// Drop every rule, as a browser restart that loses the table would.
    pub fn clear(&self) {
        self.rules.borrow_mut().clear();
    }

    /// Redirect `url` with the first matching rule, in id order.
    pub fn apply(&self, url: &str) -> Option<String> {
        let rules = self.rules.borrow();
        rules.values().find_map(|rule| {
            let re = rule.regex_rule().compile().ok()?;
            apply_compiled(&re, rule.substitution(), url)
        })
    }
}

#[async_trait(?Send)]
impl RuleEngine for MemoryRuleEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn get_dynamic_rules(
        &self,
        rule_ids: Option<&[u32]>,
    ) -> Result<Vec<DynamicRule>, EngineError> {
        if !self.available {
            return Err(EngineError::Unavailable);
        }
        let rules = self.rules.borrow();
        Ok(match rule_ids {
            Some(ids) => ids.iter().filter_map(|id| rules.get(id).cloned()).collect(),
            None => rules.values().cloned().collect(),
        })
    }

    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), EngineError> {
        if !self.available {
            return Err(EngineError::Unavailable);
        }

        let mut next = self.rules.borrow().clone();
        for id in &update.remove_rule_ids {
            next.remove(id);
        }
        for rule in update.add_rules {
            if let Err(e) = rule.regex_rule().compile() {
                return Err(EngineError::InvalidRegex {
                    id: rule.id,
                    reason: e.to_string(),
                });
            }
            if next.contains_key(&rule.id) {
                return Err(EngineError::DuplicateId(rule.id));
            }
            next.insert(rule.id, rule);
        }
        if next.len() > self.limit {
            return Err(EngineError::RuleLimitExceeded { limit: self.limit });
        }

        *self.rules.borrow_mut() = next;
        self.update_calls.set(self.update_calls.get() + 1);
        Ok(())
    }
}

// =============================================================================
// Tabs
// =============================================================================

/// Tab set kept in memory.
///
/// Tabs can be scheduled to appear only after a number of queries, to model
/// a tab that has not finished navigating yet.
#[derive(Debug, Default)]
pub struct MemoryTabs {
    tabs: RefCell<Vec<Tab>>,
    pending: RefCell<Vec<(usize, Tab)>>,
    queries: Cell<usize>,
    updates: RefCell<Vec<(i32, String)>>,
    reloads: RefCell<Vec<i32>>,
}

impl MemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: i32, url: impl Into<String>) {
        self.tabs.borrow_mut().push(Tab { id, url: url.into() });
    }

    /// Open a tab that becomes visible once `after_queries` queries were made.
    pub fn open_later(&self, after_queries: usize, id: i32, url: impl Into<String>) {
        self.pending
            .borrow_mut()
            .push((after_queries, Tab { id, url: url.into() }));
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.tabs.borrow().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    pub fn updates(&self) -> Vec<(i32, String)> {
        self.updates.borrow().clone()
    }

    pub fn reloads(&self) -> Vec<i32> {
        self.reloads.borrow().clone()
    }
}

#[async_trait(?Send)]
impl TabApi for MemoryTabs {
    async fn query_tabs(&self, url_prefix: &str) -> Result<Vec<Tab>, TabError> {
        let count = self.queries.get() + 1;
        self.queries.set(count);

        let mut pending = self.pending.borrow_mut();
        let (ready, waiting): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|(after, _)| *after < count);
        *pending = waiting;
        self.tabs
            .borrow_mut()
            .extend(ready.into_iter().map(|(_, tab)| tab));

        Ok(self
            .tabs
            .borrow()
            .iter()
            .filter(|tab| tab.url.starts_with(url_prefix))
            .cloned()
            .collect())
    }

    async fn update_tab(&self, tab_id: i32, url: &str) -> Result<(), TabError> {
        let mut tabs = self.tabs.borrow_mut();
        let tab = tabs
            .iter_mut()
            .find(|tab| tab.id == tab_id)
            .ok_or(TabError::NotFound(tab_id))?;
        tab.url = url.to_string();
        self.updates.borrow_mut().push((tab_id, url.to_string()));
        Ok(())
    }

    async fn reload_tab(&self, tab_id: i32) -> Result<(), TabError> {
        if !self.tabs.borrow().iter().any(|tab| tab.id == tab_id) {
            return Err(TabError::NotFound(tab_id));
        }
        self.reloads.borrow_mut().push(tab_id);
        Ok(())
    }
}
