//! Long-running background task that polls the Soroban RPC and feeds
//! decoded `funded` events into the contribution ledger.
//!
//! Chain entries go through [`FundingService::record_contribution`] like any
//! other contribution, so the same per-campaign serialization and
//! validation apply. Replays after a restart are harmless: the ledger
//! ignores a transaction hash it has already seen.

use std::sync::Arc;
use std::time::Duration;

use gated_funding::FundingService;
use reqwest::Client;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ChainConfig;
use crate::db;
use crate::errors::Result;
use crate::rpc;

pub struct IndexerState {
    pub service: FundingService,
    pub pool: SqlitePool,
    pub config: ChainConfig,
    pub client: Client,
}

/// Run the indexer loop until `shutdown` is cancelled.
pub async fn run(state: Arc<IndexerState>, shutdown: CancellationToken) {
    info!("Indexer starting, contract: {}", state.config.contract_id);

    // Load the cursor from the DB; fall back to config start_ledger.
    let last_ledger = db::get_last_ledger(&state.pool).await.unwrap_or(0);
    let cursor_str = db::get_cursor_string(&state.pool).await.unwrap_or(None);

    let mut current_ledger = if last_ledger > 0 {
        last_ledger as u32
    } else {
        state.config.start_ledger
    };
    let mut cursor: Option<String> = cursor_str;

    info!("Resuming from ledger {current_ledger}");

    loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Indexer stopping");
                return;
            }
            polled = poll_once(&state, current_ledger, cursor.as_deref()) => polled,
        };
        match polled {
            Ok((next_ledger, next_cursor)) => {
                current_ledger = next_ledger;
                cursor = next_cursor;
            }
            Err(e) => error!("Indexer poll error: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Indexer stopping");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(state.config.poll_interval_secs)) => {}
        }
    }
}

/// Perform a single poll iteration.
///
/// Returns `(next_start_ledger, next_cursor)`.
async fn poll_once(
    state: &IndexerState,
    start_ledger: u32,
    cursor: Option<&str>,
) -> Result<(u32, Option<String>)> {
    let config = &state.config;
    let (raw_events, next_cursor, latest_ledger) = rpc::fetch_events(
        &state.client,
        &config.rpc_url,
        &config.contract_id,
        start_ledger,
        cursor,
        config.events_per_page,
    )
    .await?;

    if !raw_events.is_empty() {
        let (decoded, skipped) = rpc::decode_contributions(&raw_events);
        // A storage failure aborts before the cursor moves, so the batch is replayed.
        let recorded = ingest(&state.service, decoded, config.amount_decimals).await?;
        info!(
            "Polled {} raw events → {} contributions recorded, {} skipped",
            raw_events.len(),
            recorded,
            skipped
        );
    }

    // Advance the ledger cursor:
    // - If there is a next_cursor string, keep the same start_ledger so the next
    //   call paginates within the same ledger range.
    // - Otherwise advance to the latest known ledger.
    let next_ledger = latest_ledger
        .map(|l| (l as u32).max(start_ledger))
        .unwrap_or(start_ledger);

    // Persist cursor so restarts are deterministic.
    db::save_cursor(&state.pool, next_ledger as i64, next_cursor.as_deref()).await?;

    Ok((next_ledger, next_cursor))
}

/// Record decoded contributions.
///
/// Events the ledger rejects for good (unknown campaign, closed funding,
/// bad amount) are logged and skipped. A retryable failure stops the batch
/// and is returned, leaving the rest to be replayed on the next poll.
///
/// Returns how many new ledger entries were appended.
pub async fn ingest(
    service: &FundingService,
    events: Vec<crate::events::ChainContribution>,
    decimals: u32,
) -> Result<usize> {
    let mut recorded = 0;
    for event in events {
        let tx_hash = event.tx_hash.clone();
        let Some((campaign, request)) = event.into_request(decimals) else {
            warn!(tx = %tx_hash, "amount out of range, skipping");
            continue;
        };
        match service.record_contribution(campaign, request).await {
            Ok(receipt) if receipt.contribution.is_some() => recorded += 1,
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                error!(
                    tx = %tx_hash,
                    campaign = %campaign,
                    recorded,
                    "chain contribution not stored, batch will be replayed: {e}"
                );
                return Err(e.into());
            }
            Err(e) => warn!(
                tx = %tx_hash,
                campaign = %campaign,
                kind = e.kind(),
                "chain contribution rejected: {e}"
            ),
        }
    }
    Ok(recorded)
}
