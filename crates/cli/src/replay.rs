//! `watchpost match`: replay a JSONL event file through the alert pipeline.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use watchpost_alerts::{
    load_policies, AlertMatchPipeline, ChannelSink, PgThrottleStore, ThrottleManager,
};
use watchpost_core::{Config, Event};

use crate::cli::MatchArgs;

/// Counters reported after a replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub skipped_lines: usize,
    pub alerts: usize,
}

pub async fn run(args: &MatchArgs, config: &Config, out: &mut impl Write) -> Result<ReplaySummary> {
    let yaml = std::fs::read_to_string(&args.policies)
        .with_context(|| format!("failed to read policies from {}", args.policies.display()))?;
    let policies = load_policies(&yaml).context("failed to load policies")?;
    let events = std::fs::read_to_string(&args.events)
        .with_context(|| format!("failed to read events from {}", args.events.display()))?;

    let throttle = if args.postgres {
        if !config.postgres.is_configured() {
            bail!("--postgres given but PG_USERNAME is not set");
        }
        let store = PgThrottleStore::connect(&config.postgres)
            .await
            .context("failed to open throttle store")?;
        ThrottleManager::new(Arc::new(store), config.throttle.clone())
    } else {
        ThrottleManager::in_memory(config.throttle.clone())
    };

    // Each event yields at most one signal per policy; drained after every event.
    let (sink, mut rx) = ChannelSink::channel(policies.len().max(1));
    let pipeline = AlertMatchPipeline::new(policies, throttle, Arc::new(sink));

    let mut summary = ReplaySummary::default();
    for (n, line) in events.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event = match Event::from_json_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping unreadable event");
                summary.skipped_lines += 1;
                continue;
            }
        };
        summary.events += 1;

        let now = if args.live { Utc::now() } else { event.timestamp };
        let outcomes = pipeline.process_at(&event, now).await;
        if args.outcomes {
            for outcome in &outcomes {
                writeln!(out, "{}", serde_json::to_string(outcome)?)?;
            }
        }

        while let Ok(signal) = rx.try_recv() {
            summary.alerts += 1;
            if !args.outcomes {
                writeln!(out, "{}", serde_json::to_string(&signal)?)?;
            }
        }
    }

    info!(
        events = summary.events,
        skipped = summary.skipped_lines,
        alerts = summary.alerts,
        "replay finished"
    );
    Ok(summary)
}
