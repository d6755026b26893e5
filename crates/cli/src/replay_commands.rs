use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::Args,
    herald_config::HeraldConfig,
    herald_engine::{DeliveryMode, Engine},
    herald_events::DomainEvent,
    herald_metrics::{MetricsRecorderConfig, init_metrics},
    herald_repository::{Fixture, MemoryRepository},
    tracing::{debug, warn},
};

#[derive(Args)]
pub struct ReplayArgs {
    /// World to load into the in-memory repository (.json, .toml or .yaml).
    #[arg(long)]
    fixture: PathBuf,
    /// Events to publish, one JSON object per line.
    #[arg(long)]
    events: PathBuf,
    /// Log webhook bodies and notifications instead of sending them.
    #[arg(long)]
    dry_run: bool,
    /// Print a Prometheus snapshot of the engine metrics when done.
    #[arg(long)]
    print_metrics: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub published: usize,
    pub dropped: usize,
    pub bot_events: usize,
    pub push_events: usize,
    pub webhooks: usize,
    pub webhooks_delivered: usize,
    pub state_changes: usize,
}

pub async fn handle_replay(config: HeraldConfig, args: ReplayArgs) -> Result<()> {
    let metrics = if args.print_metrics {
        if !config.metrics.enabled {
            warn!("metrics.enabled is false, --print-metrics will print nothing");
        }
        Some(init_metrics(MetricsRecorderConfig {
            enabled: config.metrics.enabled,
            ..Default::default()
        })?)
    } else {
        None
    };

    let fixture = Fixture::from_path(&args.fixture)?;
    let raw = std::fs::read_to_string(&args.events)
        .with_context(|| format!("failed to read events {}", args.events.display()))?;
    let events = parse_events(&raw)?;

    let mode = if args.dry_run {
        DeliveryMode::DryRun
    } else {
        DeliveryMode::Live
    };
    let summary = run_replay(&config, MemoryRepository::from_fixture(fixture), events, mode).await?;

    println!("published:          {}", summary.published);
    println!("dropped:            {}", summary.dropped);
    println!("bot events:         {}", summary.bot_events);
    println!("push events:        {}", summary.push_events);
    println!(
        "webhooks delivered: {}/{}",
        summary.webhooks_delivered, summary.webhooks
    );
    println!("bot state changes:  {}", summary.state_changes);

    if let Some(handle) = metrics {
        println!();
        print!("{}", handle.render());
    }
    Ok(())
}

/// Parse one event per line. Blank lines and `#` comments are skipped.
pub fn parse_events(raw: &str) -> Result<Vec<DomainEvent>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid event on line {}", i + 1))
        })
        .collect()
}

pub async fn run_replay(
    config: &HeraldConfig,
    repo: MemoryRepository,
    events: Vec<DomainEvent>,
    mode: DeliveryMode,
) -> Result<ReplaySummary> {
    let repo = Arc::new(repo);
    let mut engine = Engine::from_config(config, repo.clone(), mode)?;
    engine.start()?;

    let mut summary = ReplaySummary::default();
    for event in events {
        let report = engine.publish(event).await?;
        debug!(topic = %report.topic, matched = report.matched, "event published");
        summary.published += 1;
        summary.dropped += report.dropped;
    }

    let stopped = engine.shutdown().await;
    let logs = repo.event_logs();
    summary.bot_events = stopped.bot_events;
    summary.push_events = stopped.push_events;
    summary.webhooks = logs.len();
    summary.webhooks_delivered = logs.iter().filter(|l| l.delivered).count();
    summary.state_changes = repo.state_changes().len();
    Ok(summary)
}
