//! Redir CLI
//!
//! CLI tool for deriving redirect rules and replaying redirects against an
//! in-memory rule engine.

mod simulate;

use std::fs;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use redir_core::{default_local_rules, derive_rule, rule_id, DynamicRule, RedirectPair, RegexRule};
use redir_store::{evaluate, RedirectConfig};

use crate::simulate::{load_pairs, run_simulation};

#[derive(Parser)]
#[command(name = "redir-cli")]
#[command(about = "Redirect rule derivation and simulation tools")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON options file (gwURLString, apiURL, ...)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Local gateway URL
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// RPC API URL
    #[arg(long, global = true)]
    api: Option<String>,

    /// Recovery page URL prefix
    #[arg(long, global = true)]
    recovery_page: Option<String>,

    /// Dynamic rule cap
    #[arg(long, global = true)]
    max_rules: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the rule for one observed redirect
    Derive {
        origin: String,
        redirect: String,

        /// Print the declarative rule as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default loopback rules for the configured endpoints
    Defaults {
        /// Print the declarative rules as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a URL with a rule
    Apply {
        #[arg(short, long)]
        pattern: String,

        #[arg(short, long)]
        substitution: String,

        url: String,
    },

    /// Replay a file of `<origin> <redirect>` lines
    Simulate {
        #[arg(short, long)]
        input: String,

        /// Write the resulting rule table as JSON
        #[arg(short, long)]
        output: Option<String>,

        /// URLs to run through the resulting rule table
        #[arg(long)]
        check: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = load_config(&cli.config).and_then(|config| match cli.command {
        Commands::Derive {
            origin,
            redirect,
            json,
        } => cmd_derive(&origin, &redirect, json, &config),
        Commands::Defaults { json } => cmd_defaults(json, &config),
        Commands::Apply {
            pattern,
            substitution,
            url,
        } => cmd_apply(&pattern, &substitution, &url),
        Commands::Simulate {
            input,
            output,
            check,
        } => cmd_simulate(&input, output.as_deref(), &check, cli.verbose, &config),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(args: &ConfigArgs) -> Result<RedirectConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let content =
                fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("Invalid config '{}': {}", path, e))?
        }
        None => RedirectConfig::default(),
    };

    if let Some(gateway) = &args.gateway {
        config.gw_url = gateway.clone();
    }
    if let Some(api) = &args.api {
        config.api_url = api.clone();
    }
    if let Some(recovery) = &args.recovery_page {
        config.recovery_page_url = Some(recovery.clone());
    }
    if let Some(max_rules) = args.max_rules {
        config.max_dynamic_rules = max_rules;
    }
    log::debug!("config: {:?}", config);
    Ok(config)
}

fn to_json(rules: &[DynamicRule]) -> Result<String, String> {
    serde_json::to_string_pretty(rules).map_err(|e| format!("Failed to serialize rules: {}", e))
}

fn cmd_derive(origin: &str, redirect: &str, json: bool, config: &RedirectConfig) -> Result<(), String> {
    let pair = RedirectPair::new(origin, redirect);
    if let Some(reason) = evaluate(&pair, config) {
        println!("No rule needed ({})", reason);
        return Ok(());
    }

    let derived = derive_rule(&pair);
    let rule = &derived.rule;
    let id = rule_id(&rule.pattern, &rule.substitution, &[]);

    if json {
        println!("{}", to_json(&[DynamicRule::redirect(id, rule, Vec::new())])?);
        return Ok(());
    }

    let check = rule
        .apply(origin)
        .map_err(|e| format!("Derived pattern does not compile: {}", e))?;

    println!("Strategy:      {}", derived.strategy);
    println!("Id:            {}", id);
    println!("Pattern:       {}", rule.pattern);
    println!("Substitution:  {}", rule.substitution);
    match check {
        Some(rewritten) => println!("Origin ->      {}", rewritten),
        None => return Err("Derived pattern does not match the origin URL".to_string()),
    }
    Ok(())
}

fn cmd_defaults(json: bool, config: &RedirectConfig) -> Result<(), String> {
    let local = default_local_rules(&config.endpoints());

    if json {
        let rules: Vec<DynamicRule> = local
            .iter()
            .map(|entry| {
                let id = rule_id(&entry.rule.pattern, &entry.rule.substitution, &[]);
                DynamicRule::redirect(id, &entry.rule, Vec::new())
            })
            .collect();
        println!("{}", to_json(&rules)?);
        return Ok(());
    }

    for entry in &local {
        println!("{} -> {}", entry.pair.origin_url, entry.pair.redirect_url);
        println!("  Pattern:       {}", entry.rule.pattern);
        println!("  Substitution:  {}", entry.rule.substitution);
    }
    Ok(())
}

fn cmd_apply(pattern: &str, substitution: &str, url: &str) -> Result<(), String> {
    let rule = RegexRule::new(pattern, substitution);
    match rule.apply(url).map_err(|e| format!("Invalid pattern: {}", e))? {
        Some(rewritten) => println!("{}", rewritten),
        None => println!("No match"),
    }
    Ok(())
}

fn cmd_simulate(
    input: &str,
    output: Option<&str>,
    check: &[String],
    verbose: bool,
    config: &RedirectConfig,
) -> Result<(), String> {
    let pairs = load_pairs(input)?;
    let start = Instant::now();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;
    let sim = runtime.block_on(run_simulation(&pairs, config, verbose))?;

    let total_time = start.elapsed();

    println!("Replayed {} redirects from '{}'", pairs.len(), input);
    println!("  Handled:  {} ({} skipped)", sim.stats.handled, sim.stats.skipped);
    println!("  Installs: {}", sim.stats.installed);
    println!("  Tabs:     {}", sim.stats.tabs_updated);
    println!("  Rules:    {} (cap {})", sim.rules.len(), config.max_dynamic_rules);
    println!("  Time:     {:.1}ms", total_time.as_secs_f64() * 1000.0);

    for url in check {
        match sim.reconciler.engine().apply(url) {
            Some(rewritten) => println!("  {} -> {}", url, rewritten),
            None => println!("  {} (no rule)", url),
        }
    }

    if let Some(path) = output {
        fs::write(path, to_json(&sim.rules)?)
            .map_err(|e| format!("Failed to write '{}': {}", path, e))?;
        println!("Wrote rule table to '{}'", path);
    }
    Ok(())
}
