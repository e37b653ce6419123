//! Redirect request handling
//!
//! Entry point for every observed `origin -> redirect` pair:
//!
//! 1. Evaluate: skip pairs that must not produce a rule
//! 2. Derive: pick the narrowest strategy that handles the pair
//! 3. Install: hand the rule to the [`Reconciler`]
//! 4. Propagate: move tabs already showing the origin to the redirect
//!
//! Install and Propagate run concurrently. Failures in either are logged and
//! never abort the other.

use std::rc::Rc;
use std::time::Duration;

use redir_core::{derive_rule, skip_reason, DerivedRule, RedirectPair, SkipReason};

use crate::config::RedirectConfig;
use crate::engine::{RuleEngine, Tab, TabApi};
use crate::reconciler::Reconciler;

/// How long Propagate waits for a tab to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

/// Skip check for a pair under `config`.
pub fn evaluate(pair: &RedirectPair, config: &RedirectConfig) -> Option<SkipReason> {
    skip_reason(pair, &config.gw_url, config.recovery_page_url.as_deref())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Skipped(SkipReason),
    Handled {
        derived: DerivedRule,
        /// Whether a new or changed rule was sent to the engine.
        installed: bool,
        tabs_updated: usize,
    },
}

pub struct RedirectHandler<E, T> {
    reconciler: Rc<Reconciler<E>>,
    tabs: T,
    retry: RetryPolicy,
}

impl<E: RuleEngine, T: TabApi> RedirectHandler<E, T> {
    pub fn new(reconciler: Rc<Reconciler<E>>, tabs: T) -> Self {
        Self {
            reconciler,
            tabs,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn reconciler(&self) -> &Rc<Reconciler<E>> {
        &self.reconciler
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    /// Handle one observed redirect.
    pub async fn handle(&self, pair: &RedirectPair, config: &RedirectConfig) -> HandleOutcome {
        if let Some(reason) = evaluate(pair, config) {
            log::debug!(
                "skipping {} -> {}: {}",
                pair.origin_url,
                pair.redirect_url,
                reason
            );
            return HandleOutcome::Skipped(reason);
        }

        let derived = derive_rule(pair);
        let (installed, tabs_updated) =
            tokio::join!(self.install(&derived, config), self.propagate(pair));

        HandleOutcome::Handled {
            derived,
            installed,
            tabs_updated,
        }
    }

    async fn install(&self, derived: &DerivedRule, config: &RedirectConfig) -> bool {
        match self
            .reconciler
            .install_rule(&derived.rule, Vec::new(), config)
            .await
        {
            Ok(installed) => installed,
            Err(e) => {
                log::warn!("failed to install {} rule: {}", derived.strategy, e);
                false
            }
        }
    }

    /// Point every tab showing the origin at the redirect. Returns how many
    /// tabs were touched; gives up quietly once the attempts run out.
    async fn propagate(&self, pair: &RedirectPair) -> usize {
        for attempt in 1..=self.retry.attempts {
            match self.tabs.query_tabs(&pair.origin_url).await {
                Ok(tabs) if !tabs.is_empty() => return self.redirect_tabs(&tabs, pair).await,
                Ok(_) => {}
                Err(e) => log::warn!("tab query for {} failed: {}", pair.origin_url, e),
            }
            if attempt < self.retry.attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }
        log::debug!("no tab showed {}", pair.origin_url);
        0
    }

    async fn redirect_tabs(&self, tabs: &[Tab], pair: &RedirectPair) -> usize {
        let mut touched = 0;
        for tab in tabs {
            let result = if tab.url == pair.redirect_url {
                self.tabs.reload_tab(tab.id).await
            } else {
                self.tabs.update_tab(tab.id, &pair.redirect_url).await
            };
            match result {
                Ok(()) => touched += 1,
                Err(e) => log::warn!("failed to redirect tab {}: {}", tab.id, e),
            }
        }
        touched
    }
}
