//! Rule store reconciliation
//!
//! [`Reconciler`] owns the session cache of installed rules, keyed by match
//! pattern, and keeps the external declarative engine's dynamic rule table in
//! line with it. The cache is the authority during a session; the external
//! table is the authority after a restart, when the cache starts empty and
//! adopts what it finds.
//!
//! # Convergence
//!
//! After `reconcile` the external table holds exactly one rule per cached
//! pattern, with the cached id, substitution and excluded domains, as long as
//! the rule cap allows. Running it again with the same configuration issues no
//! update.
//!
//! The cache lives in a `RefCell`. Borrows never span an `.await`, so a second
//! task interleaving at a suspension point sees a consistent cache.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use redir_core::hash::next_rule_id;
use redir_core::{default_local_rules, rule_id, DynamicRule, RegexRule};

use crate::config::RedirectConfig;
use crate::engine::{EngineError, RuleEngine, RuleUpdate};

/// Cache entry for one installed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRule {
    pub id: u32,
    pub substitution: String,
    pub excluded_initiator_domains: Vec<String>,
}

impl CachedRule {
    fn matches(&self, rule: &DynamicRule) -> bool {
        self.id == rule.id
            && self.substitution == rule.substitution()
            && self.excluded_initiator_domains == rule.condition.excluded_initiator_domains
    }

    fn to_rule(&self, pattern: &str) -> DynamicRule {
        DynamicRule::redirect(
            self.id,
            &RegexRule::new(pattern, self.substitution.as_str()),
            self.excluded_initiator_domains.clone(),
        )
    }
}

/// What one `reconcile` pass sent to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
}

impl ReconcileReport {
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Mirror between the rule cache and the declarative engine.
#[derive(Debug)]
pub struct Reconciler<E> {
    engine: E,
    installed: RefCell<HashMap<String, CachedRule>>,
}

impl<E: RuleEngine> Reconciler<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            installed: RefCell::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    pub fn cached(&self, pattern: &str) -> Option<CachedRule> {
        self.installed.borrow().get(pattern).cloned()
    }

    /// Cached rules as they should appear in the engine, in id order.
    pub fn cached_rules(&self) -> Vec<DynamicRule> {
        let mut rules: Vec<DynamicRule> = self
            .installed
            .borrow()
            .iter()
            .map(|(pattern, cached)| cached.to_rule(pattern))
            .collect();
        rules.sort_by_key(|rule| rule.id);
        rules
    }

    pub fn len(&self) -> usize {
        self.installed.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.borrow().is_empty()
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Remove every installed rule. Returns how many were removed.
    pub async fn cleanup_all(&self, reset_cache: bool) -> Result<usize, EngineError> {
        if reset_cache {
            self.installed.borrow_mut().clear();
        }
        if !self.engine.is_available() {
            return Ok(0);
        }

        let ids: Vec<u32> = self
            .engine
            .get_dynamic_rules(None)
            .await?
            .iter()
            .map(|rule| rule.id)
            .collect();
        let removed = ids.len();
        if removed > 0 {
            self.engine
                .update_dynamic_rules(RuleUpdate {
                    add_rules: Vec::new(),
                    remove_rule_ids: ids,
                })
                .await?;
            log::info!("removed all {} dynamic rules", removed);
        }
        Ok(removed)
    }

    /// Remove the rule with `id` from the engine and the cache. Returns
    /// whether the engine had it.
    pub async fn cleanup_by_id(&self, id: u32) -> Result<bool, EngineError> {
        if !self.engine.is_available() {
            return Ok(false);
        }

        let found = self.engine.get_dynamic_rules(Some(&[id])).await?;
        {
            let mut installed = self.installed.borrow_mut();
            for rule in &found {
                installed.remove(rule.pattern());
            }
            installed.retain(|_, cached| cached.id != id);
        }

        if found.is_empty() {
            log::debug!("rule {} is not installed", id);
            return Ok(false);
        }
        self.engine
            .update_dynamic_rules(RuleUpdate {
                add_rules: Vec::new(),
                remove_rule_ids: vec![id],
            })
            .await?;
        log::info!("removed rule {}", id);
        Ok(true)
    }

    // =========================================================================
    // Install
    // =========================================================================

    /// Record a rule in the cache and return its engine form.
    ///
    /// The id is the stable hash of the rule. If another cached pattern already
    /// owns it, the next free id is taken instead.
    pub fn save_and_install(
        &self,
        pattern: &str,
        substitution: &str,
        excluded_initiator_domains: Vec<String>,
    ) -> DynamicRule {
        let mut installed = self.installed.borrow_mut();

        let hashed = rule_id(pattern, substitution, &excluded_initiator_domains);
        let mut id = hashed;
        while installed
            .iter()
            .any(|(other, cached)| cached.id == id && other != pattern)
        {
            id = next_rule_id(id);
        }
        if id != hashed {
            log::warn!(
                "rule id {} is taken, using {} for pattern {}",
                hashed,
                id,
                pattern
            );
        }

        let cached = CachedRule {
            id,
            substitution: substitution.to_string(),
            excluded_initiator_domains,
        };
        let rule = cached.to_rule(pattern);
        installed.insert(pattern.to_string(), cached);
        rule
    }

    /// Make sure `rule` is installed, replacing whatever the cache holds for
    /// its pattern. Returns false when nothing had to change.
    pub async fn install_rule(
        &self,
        rule: &RegexRule,
        excluded_initiator_domains: Vec<String>,
        config: &RedirectConfig,
    ) -> Result<bool, EngineError> {
        if !self.engine.is_available() {
            return Ok(false);
        }

        let unchanged = self.cached(&rule.pattern).map_or(false, |cached| {
            cached.substitution == rule.substitution
                && cached.excluded_initiator_domains == excluded_initiator_domains
        });
        if unchanged {
            log::debug!("rule for {} is already installed", rule.pattern);
            return Ok(false);
        }

        let installed =
            self.save_and_install(&rule.pattern, &rule.substitution, excluded_initiator_domains);
        log::info!(
            "installing rule {}: {} => {}",
            installed.id,
            installed.pattern(),
            installed.substitution()
        );
        self.reconcile(config).await?;
        Ok(true)
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Bring the engine's rule table in line with the cache and `config`.
    pub async fn reconcile(&self, config: &RedirectConfig) -> Result<ReconcileReport, EngineError> {
        if !self.engine.is_available() {
            return Ok(ReconcileReport::default());
        }

        let external = self.engine.get_dynamic_rules(None).await?;
        let mut remove_rule_ids = Vec::new();
        let mut kept = HashSet::new();
        {
            let mut installed = self.installed.borrow_mut();
            let mut owners: HashMap<u32, String> = installed
                .iter()
                .map(|(pattern, cached)| (cached.id, pattern.clone()))
                .collect();

            for rule in &external {
                match installed.get(rule.pattern()) {
                    Some(cached) if cached.matches(rule) && !kept.contains(&rule.id) => {
                        kept.insert(rule.id);
                    }
                    Some(_) => remove_rule_ids.push(rule.id),
                    None if owners.contains_key(&rule.id) => remove_rule_ids.push(rule.id),
                    None => {
                        // Left by a previous session.
                        owners.insert(rule.id, rule.pattern().to_string());
                        installed.insert(
                            rule.pattern().to_string(),
                            CachedRule {
                                id: rule.id,
                                substitution: rule.substitution().to_string(),
                                excluded_initiator_domains: rule
                                    .condition
                                    .excluded_initiator_domains
                                    .clone(),
                            },
                        );
                        kept.insert(rule.id);
                    }
                }
            }
        }

        if !config.active {
            let removed = self.cleanup_all(false).await?;
            return Ok(ReconcileReport { added: 0, removed });
        }

        let mut default_patterns = HashSet::new();
        for local in default_local_rules(&config.endpoints()) {
            let current = self.cached(&local.rule.pattern);
            if current.map_or(true, |c| c.substitution != local.rule.substitution) {
                self.save_and_install(&local.rule.pattern, &local.rule.substitution, Vec::new());
            }
            default_patterns.insert(local.rule.pattern);
        }

        let mut add_rules: Vec<DynamicRule> = self
            .cached_rules()
            .into_iter()
            .filter(|rule| !kept.contains(&rule.id))
            .collect();
        add_rules.sort_by_key(|rule| (!default_patterns.contains(rule.pattern()), rule.id));

        let room = config.max_dynamic_rules.saturating_sub(kept.len());
        if add_rules.len() > room {
            log::warn!(
                "rule cap of {} reached, deferring {} rules",
                config.max_dynamic_rules,
                add_rules.len() - room
            );
            add_rules.truncate(room);
        }

        let report = ReconcileReport {
            added: add_rules.len(),
            removed: remove_rule_ids.len(),
        };
        if report.is_noop() {
            return Ok(report);
        }

        self.engine
            .update_dynamic_rules(RuleUpdate {
                add_rules,
                remove_rule_ids,
            })
            .await?;
        log::info!(
            "reconciled dynamic rules: {} added, {} removed",
            report.added,
            report.removed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRuleEngine;

    fn config() -> RedirectConfig {
        RedirectConfig::default()
    }

    fn public_rule() -> RegexRule {
        RegexRule::new(
            "^https?\\://ipfs\\.io\\/(ipfs|ipns)\\/((?:[^\\.]|$).*)$",
            "http://localhost:8080/\\1/\\2",
        )
    }

    /// Engine and cache hold the same rules.
    fn assert_converged(reconciler: &Reconciler<MemoryRuleEngine>) {
        assert_eq!(reconciler.engine().rules(), reconciler.cached_rules());
    }

    #[tokio::test]
    async fn installs_default_local_rules() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        let report = reconciler.reconcile(&config()).await.unwrap();
        assert_eq!(report, ReconcileReport { added: 3, removed: 0 });
        assert_converged(&reconciler);
        assert_eq!(
            reconciler.engine().apply("http://127.0.0.1:8080/ipfs/bafy").as_deref(),
            Some("http://localhost:8080/ipfs/bafy")
        );
    }

    #[tokio::test]
    async fn second_pass_is_noop() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler.reconcile(&config()).await.unwrap();
        let calls = reconciler.engine().update_calls();

        let report = reconciler.reconcile(&config()).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(reconciler.engine().update_calls(), calls);
    }

    #[tokio::test]
    async fn install_rule_is_idempotent() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        assert!(reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap());
        assert!(!reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap());

        let matching: Vec<_> = reconciler
            .engine()
            .rules()
            .into_iter()
            .filter(|r| r.pattern() == public_rule().pattern)
            .collect();
        assert_eq!(matching.len(), 1);
        assert_converged(&reconciler);
    }

    #[tokio::test]
    async fn changed_substitution_replaces_rule() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap();
        let old_id = reconciler.cached(&public_rule().pattern).unwrap().id;

        let moved = RegexRule::new(public_rule().pattern, "http://localhost:48080/\\1/\\2");
        reconciler.install_rule(&moved, Vec::new(), &config()).await.unwrap();

        let rules = reconciler.engine().rules();
        assert!(rules.iter().all(|r| r.id != old_id));
        assert_eq!(
            rules.iter().filter(|r| r.pattern() == moved.pattern).count(),
            1
        );
        assert_eq!(
            reconciler.engine().apply("https://ipfs.io/ipfs/bafy").as_deref(),
            Some("http://localhost:48080/ipfs/bafy")
        );
        assert_converged(&reconciler);
    }

    #[tokio::test]
    async fn readds_rules_after_engine_is_cleared() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap();
        reconciler.engine().clear();

        let report = reconciler.reconcile(&config()).await.unwrap();
        assert_eq!(report.added, 4);
        assert_converged(&reconciler);
    }

    #[tokio::test]
    async fn adopts_rules_after_restart() {
        let engine = MemoryRuleEngine::new();
        let previous = DynamicRule::redirect(
            rule_id(&public_rule().pattern, &public_rule().substitution, &[]),
            &public_rule(),
            Vec::new(),
        );
        engine.insert_raw(previous.clone());

        let reconciler = Reconciler::new(engine);
        let report = reconciler.reconcile(&config()).await.unwrap();
        assert_eq!(report, ReconcileReport { added: 3, removed: 0 });
        assert_eq!(reconciler.cached(previous.pattern()).unwrap().id, previous.id);
        assert_converged(&reconciler);
    }

    #[tokio::test]
    async fn removes_duplicate_patterns() {
        let engine = MemoryRuleEngine::new();
        engine.insert_raw(DynamicRule::redirect(10, &public_rule(), Vec::new()));
        engine.insert_raw(DynamicRule::redirect(
            11,
            &RegexRule::new(public_rule().pattern, "http://localhost:9090/\\1/\\2"),
            Vec::new(),
        ));

        let reconciler = Reconciler::new(engine);
        let report = reconciler.reconcile(&config()).await.unwrap();
        assert_eq!(report.removed, 1);
        let ids: Vec<u32> = reconciler
            .engine()
            .rules()
            .iter()
            .filter(|r| r.pattern() == public_rule().pattern)
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![10]);
        assert_converged(&reconciler);
    }

    #[tokio::test]
    async fn interleaved_installs_converge() {
        const ORDERS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        let rules = [
            public_rule(),
            RegexRule::new("^https?\\://dweb\\.link(.*)$", "http://localhost:8080\\1"),
            RegexRule::new(public_rule().pattern, "http://localhost:9090/\\1/\\2"),
        ];

        // Every order of saves, with a reconcile after any subset of them.
        for order in ORDERS {
            for mask in 0..8u8 {
                let reconciler = Reconciler::new(MemoryRuleEngine::new());
                for (step, &i) in order.iter().enumerate() {
                    let rule = &rules[i];
                    reconciler.save_and_install(&rule.pattern, &rule.substitution, Vec::new());
                    if mask & (1 << step) != 0 {
                        reconciler.reconcile(&config()).await.unwrap();
                    }
                }
                reconciler.reconcile(&config()).await.unwrap();

                assert_converged(&reconciler);
                assert_eq!(reconciler.len(), 5, "order {:?} mask {}", order, mask);
                let last_public = order.iter().rev().find(|&&i| i != 1).map(|&i| &rules[i]);
                assert_eq!(
                    reconciler.cached(&public_rule().pattern).map(|c| c.substitution),
                    last_public.map(|r| r.substitution.clone()),
                    "order {:?} mask {}",
                    order,
                    mask
                );
                assert!(reconciler.reconcile(&config()).await.unwrap().is_noop());
            }
        }
    }

    #[tokio::test]
    async fn concurrent_installs_converge() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        let dweb = RegexRule::new("^https?\\://dweb\\.link(.*)$", "http://localhost:8080\\1");

        let public = public_rule();
        let (config_a, config_b) = (config(), config());
        let (a, b) = tokio::join!(
            reconciler.install_rule(&public, Vec::new(), &config_a),
            reconciler.install_rule(&dweb, Vec::new(), &config_b),
        );
        assert!(a.unwrap());
        assert!(b.unwrap());
        reconciler.reconcile(&config()).await.unwrap();

        assert_converged(&reconciler);
        assert_eq!(reconciler.len(), 5);
    }

    #[tokio::test]
    async fn inactive_config_removes_everything() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap();

        let inactive = RedirectConfig {
            active: false,
            ..config()
        };
        let report = reconciler.reconcile(&inactive).await.unwrap();
        assert_eq!(report.removed, 4);
        assert!(reconciler.engine().is_empty());
        assert!(!reconciler.is_empty());
    }

    #[tokio::test]
    async fn cleanup_by_id_drops_cache_entry() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap();
        let id = reconciler.cached(&public_rule().pattern).unwrap().id;

        assert!(reconciler.cleanup_by_id(id).await.unwrap());
        assert!(reconciler.cached(&public_rule().pattern).is_none());
        assert!(reconciler.engine().rules().iter().all(|r| r.id != id));
        assert!(!reconciler.cleanup_by_id(id).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_all_resets_cache_on_request() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler.reconcile(&config()).await.unwrap();

        assert_eq!(reconciler.cleanup_all(false).await.unwrap(), 3);
        assert_eq!(reconciler.len(), 3);
        reconciler.reconcile(&config()).await.unwrap();
        assert_eq!(reconciler.cleanup_all(true).await.unwrap(), 3);
        assert!(reconciler.is_empty());
    }

    #[tokio::test]
    async fn respects_rule_cap() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        reconciler.save_and_install("^a(.*)$", "b\\1", Vec::new());
        reconciler.save_and_install("^c(.*)$", "d\\1", Vec::new());

        let capped = RedirectConfig {
            max_dynamic_rules: 3,
            ..config()
        };
        let report = reconciler.reconcile(&capped).await.unwrap();
        assert_eq!(report.added, 3);

        let defaults = default_local_rules(&capped.endpoints());
        let installed = reconciler.engine().rules();
        assert!(defaults
            .iter()
            .all(|d| installed.iter().any(|r| r.pattern() == d.rule.pattern)));
    }

    #[test]
    fn probes_past_taken_id() {
        let reconciler = Reconciler::new(MemoryRuleEngine::new());
        let first = reconciler.save_and_install("^a(.*)$", "b\\1", Vec::new());
        reconciler.installed.borrow_mut().insert(
            "^z(.*)$".to_string(),
            CachedRule {
                id: rule_id("^y(.*)$", "x\\1", &[]),
                substitution: "w\\1".to_string(),
                excluded_initiator_domains: Vec::new(),
            },
        );

        let second = reconciler.save_and_install("^y(.*)$", "x\\1", Vec::new());
        assert_eq!(second.id, next_rule_id(rule_id("^y(.*)$", "x\\1", &[])));
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn unavailable_engine_is_noop() {
        let reconciler = Reconciler::new(MemoryRuleEngine::unavailable());
        assert!(!reconciler.is_available());
        assert!(reconciler.reconcile(&config()).await.unwrap().is_noop());
        assert!(!reconciler
            .install_rule(&public_rule(), Vec::new(), &config())
            .await
            .unwrap());
        assert_eq!(reconciler.cleanup_all(true).await.unwrap(), 0);
        assert!(!reconciler.cleanup_by_id(1).await.unwrap());
        assert!(reconciler.is_empty());
    }
}
