//! In-process rule event bus
//!
//! Option changes and rule deletion requests reach the [`Reconciler`] as
//! events instead of direct calls, so the code that observes them does not
//! need a handle to the reconciler. Events are only sent when the
//! declarative engine is available.

use std::rc::Rc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::RedirectConfig;
use crate::engine::{EngineError, RuleEngine};
use crate::reconciler::Reconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvent {
    /// Options changed: drop every rule and rebuild from `config`.
    GlobalStateOptionChange(RedirectConfig),
    /// Remove one rule, or every rule when no id is given.
    DeleteRuleRequest(Option<u32>),
}

impl RuleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RuleEvent::GlobalStateOptionChange(_) => "GLOBAL_STATE_OPTION_CHANGE",
            RuleEvent::DeleteRuleRequest(_) => "DELETE_RULE_REQUEST",
        }
    }
}

/// Sending half of the bus.
#[derive(Debug, Clone)]
pub struct RuleEventSender {
    tx: UnboundedSender<RuleEvent>,
    enabled: bool,
}

impl RuleEventSender {
    /// Queue `event`. Returns false if it was dropped, either because the
    /// engine is unavailable or the listener is gone.
    pub fn send(&self, event: RuleEvent) -> bool {
        if !self.enabled {
            log::debug!("declarative engine unavailable, dropping {}", event.name());
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

/// Receiving half of the bus. Applies events to the reconciler.
pub struct RuleEventListener<E> {
    rx: UnboundedReceiver<RuleEvent>,
    reconciler: Rc<Reconciler<E>>,
}

/// Create a bus bound to `reconciler`.
pub fn channel<E: RuleEngine>(
    reconciler: Rc<Reconciler<E>>,
) -> (RuleEventSender, RuleEventListener<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = RuleEventSender {
        tx,
        enabled: reconciler.is_available(),
    };
    (sender, RuleEventListener { rx, reconciler })
}

impl<E: RuleEngine> RuleEventListener<E> {
    pub async fn dispatch(&self, event: RuleEvent) -> Result<(), EngineError> {
        log::debug!("handling {}", event.name());
        match event {
            RuleEvent::GlobalStateOptionChange(config) => {
                self.reconciler.cleanup_all(true).await?;
                self.reconciler.reconcile(&config).await?;
            }
            RuleEvent::DeleteRuleRequest(Some(id)) => {
                self.reconciler.cleanup_by_id(id).await?;
            }
            RuleEvent::DeleteRuleRequest(None) => {
                self.reconciler.cleanup_all(true).await?;
            }
        }
        Ok(())
    }

    /// Handle events until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            let name = event.name();
            if let Err(e) = self.dispatch(event).await {
                log::warn!("{} failed: {}", name, e);
            }
        }
    }

    /// Handle the events already queued. Returns how many were handled.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            let name = event.name();
            if let Err(e) = self.dispatch(event).await {
                log::warn!("{} failed: {}", name, e);
            }
            handled += 1;
        }
        handled
    }
}
