use std::fs;
use std::rc::Rc;

use redir_core::{DynamicRule, RedirectPair};
use redir_store::{
    channel, HandleOutcome, MemoryRuleEngine, MemoryTabs, RedirectConfig, RedirectHandler,
    Reconciler, RuleEvent,
};

#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    pub handled: usize,
    pub skipped: usize,
    pub installed: usize,
    pub tabs_updated: usize,
}

#[derive(Debug)]
pub struct Simulation {
    pub stats: SimulationStats,
    pub rules: Vec<DynamicRule>,
    pub reconciler: Rc<Reconciler<MemoryRuleEngine>>,
}

/// Parse `origin redirect` pairs, one per line. Blank lines and `#` comments
/// are ignored.
pub fn parse_pairs(content: &str) -> Result<Vec<RedirectPair>, String> {
    let mut pairs = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(origin), Some(redirect), None) => pairs.push(RedirectPair::new(origin, redirect)),
            _ => {
                return Err(format!(
                    "line {}: expected '<origin> <redirect>', got '{}'",
                    line_no + 1,
                    line
                ))
            }
        }
    }
    Ok(pairs)
}

pub fn load_pairs(path: &str) -> Result<Vec<RedirectPair>, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    parse_pairs(&content)
}

/// Replay `pairs` against an in-memory engine, the way the extension would
/// see them after startup. Each origin gets an open tab.
pub async fn run_simulation(
    pairs: &[RedirectPair],
    config: &RedirectConfig,
    verbose: bool,
) -> Result<Simulation, String> {
    let reconciler = Rc::new(Reconciler::new(MemoryRuleEngine::with_limit(
        config.max_dynamic_rules,
    )));
    let (events, mut listener) = channel(Rc::clone(&reconciler));

    events.send(RuleEvent::GlobalStateOptionChange(config.clone()));
    listener.drain().await;

    let tabs = MemoryTabs::new();
    for (i, pair) in pairs.iter().enumerate() {
        tabs.open(i as i32 + 1, pair.origin_url.as_str());
    }
    let handler = RedirectHandler::new(Rc::clone(&reconciler), tabs);

    let mut stats = SimulationStats::default();
    for pair in pairs {
        match handler.handle(pair, config).await {
            HandleOutcome::Skipped(reason) => {
                stats.skipped += 1;
                if verbose {
                    println!("  skip  {} ({})", pair.origin_url, reason);
                }
            }
            HandleOutcome::Handled {
                derived,
                installed,
                tabs_updated,
            } => {
                stats.handled += 1;
                stats.tabs_updated += tabs_updated;
                if installed {
                    stats.installed += 1;
                }
                if verbose {
                    println!(
                        "  {:<13} {} => {}",
                        derived.strategy.name(),
                        derived.rule.pattern,
                        derived.rule.substitution
                    );
                }
            }
        }
    }

    let report = reconciler
        .reconcile(config)
        .await
        .map_err(|e| format!("Final reconcile failed: {}", e))?;
    if !report.is_noop() {
        log::warn!(
            "final reconcile was not a no-op: {} added, {} removed",
            report.added,
            report.removed
        );
    }

    Ok(Simulation {
        stats,
        rules: reconciler.engine().rules(),
        reconciler,
    })
}
