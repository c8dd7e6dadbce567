//! Replays recorded `mining.notify` templates through the service.
//!
//! Reads one template JSON object per line from stdin and prints one line
//! per template:
//!
//! ```text
//! <pool> <job_id> <change-indicator>
//! ```
//!
//! followed by the final lineage graph as JSON.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use stratum_watch::changes::ChangeKind;
use stratum_watch::tracing::prelude::*;
use stratum_watch::{ServiceConfig, StratumTemplate, StreamReconciliationCache};

/// How long to wait for outstanding fee rate lookups before exiting.
const FEE_RATE_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    stratum_watch::tracing::init();

    let mut config = ServiceConfig::default();
    if let Ok(url) = env::var("STRATUM_WATCH_FEE_API") {
        config.fee_rate_api_url = Some(url);
    }

    let mut service =
        StreamReconciliationCache::new(config).context("failed to build fee rate client")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let template: StratumTemplate = match serde_json::from_str(&line) {
            Ok(t) => t,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable template");
                continue;
            }
        };

        match service.ingest(template) {
            Ok(outcome) => {
                let indicator = match outcome.change.kind {
                    ChangeKind::First => "new".to_string(),
                    ChangeKind::Duplicate => "=".to_string(),
                    ChangeKind::Updated => outcome.indicator(),
                };
                println!(
                    "{} {} {}",
                    outcome.change.pool, outcome.change.job_id, indicator
                );
            }
            Err(e) => warn!(line = line_no, error = %e, "Template rejected"),
        }

        service.apply_fee_rate_updates();
    }

    if service.fee_rates_in_flight() > 0 {
        drain_fee_rates(&mut service).await;
    }

    for template in service.live_view() {
        if let (Some(txid), Some(state)) = (&template.first_txid, &template.first_tx_fee_rate) {
            debug!(
                pool = %template.pool_name(),
                txid = %txid,
                state = ?state,
                "First transaction fee rate"
            );
        }
    }

    let snapshot = service.graph_snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

/// Apply lookups as they resolve until none remain or the grace period ends.
async fn drain_fee_rates(service: &mut StreamReconciliationCache) {
    let deadline = tokio::time::Instant::now() + FEE_RATE_GRACE;
    while service.fee_rates_in_flight() > 0 {
        match tokio::time::timeout_at(deadline, service.next_fee_rate_update()).await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                warn!(
                    pending = service.fee_rates_in_flight(),
                    "Gave up waiting for fee rate lookups"
                );
                break;
            }
        }
    }
}
