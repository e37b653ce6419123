//! Redir Rule Store
//!
//! The stateful half of redirect handling: keeps the browser's declarative
//! rule table in sync with derived rules and drives tabs to their redirect
//! targets.
//!
//! # Modules
//!
//! - `engine`: traits for the declarative engine and the tab API
//! - `config`: the options slice rule handling depends on
//! - `reconciler`: the rule cache and its mirror in the engine
//! - `handler`: evaluate, derive, install and propagate one redirect
//! - `events`: option change and delete request bus
//! - `memory`: in-memory engine and tabs
//!
//! Everything runs on a single cooperative event loop; futures are not `Send`.

pub mod config;
pub mod engine;
pub mod events;
pub mod handler;
pub mod memory;
pub mod reconciler;

pub use config::RedirectConfig;
pub use engine::{EngineError, RuleEngine, RuleUpdate, Tab, TabApi, TabError};
pub use events::{channel, RuleEvent, RuleEventListener, RuleEventSender};
pub use handler::{evaluate, HandleOutcome, RedirectHandler, RetryPolicy};
pub use memory::{MemoryRuleEngine, MemoryTabs};
pub use reconciler::{CachedRule, ReconcileReport, Reconciler};
