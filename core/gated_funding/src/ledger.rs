//! # Contribution ledger derivations
//!
//! Pure functions over slices of [`Contribution`]s. The store owns the
//! append-only entries; every aggregate shown to users is recomputed from
//! them here, so there is no second counter that could disagree.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{CampaignId, Contribution, DonorId};

/// Aggregates over one campaign's ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub raised: Decimal,
    pub backers: u64,
    pub contributions: u64,
}

/// Sum of all amounts, or `None` if the sum overflows [`Decimal`].
pub fn raised_amount(entries: &[Contribution]) -> Option<Decimal> {
    entries
        .iter()
        .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.amount))
}

/// Distinct identified donors, plus one per anonymous contribution.
pub fn backer_count(entries: &[Contribution]) -> u64 {
    let mut donors = HashSet::new();
    let mut anonymous = 0u64;
    for entry in entries {
        match &entry.donor {
            Some(donor) => {
                donors.insert(donor);
            }
            None => anonymous += 1,
        }
    }
    donors.len() as u64 + anonymous
}

/// `None` when the raised amount overflows; see [`raised_amount`].
pub fn summarize(entries: &[Contribution]) -> Option<LedgerTotals> {
    Some(LedgerTotals {
        raised: raised_amount(entries)?,
        backers: backer_count(entries),
        contributions: entries.len() as u64,
    })
}

/// One row of a campaign's donor leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub donor: DonorId,
    pub total: Decimal,
    pub contributions: u64,
}

/// Top `limit` identified donors by total amount.
///
/// Anonymous contributions are left out. Ties go to whoever gave first.
pub fn leaderboard(entries: &[Contribution], limit: usize) -> Vec<LeaderboardEntry> {
    struct Tally<'a> {
        donor: &'a DonorId,
        total: Decimal,
        count: u64,
        first_seen: (DateTime<Utc>, u64),
    }

    let mut tallies: HashMap<&DonorId, Tally<'_>> = HashMap::new();
    for entry in entries {
        let Some(donor) = entry.donor.as_ref() else {
            continue;
        };
        let seen = (entry.timestamp, entry.id.0);
        let tally = tallies.entry(donor).or_insert(Tally {
            donor,
            total: Decimal::ZERO,
            count: 0,
            first_seen: seen,
        });
        // Display totals cap at Decimal::MAX instead of failing the board.
        tally.total = tally.total.saturating_add(entry.amount);
        tally.count += 1;
        tally.first_seen = tally.first_seen.min(seen);
    }

    let mut ranked: Vec<Tally<'_>> = tallies.into_values().collect();
    ranked.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, t)| LeaderboardEntry {
            rank: i + 1,
            donor: t.donor.clone(),
            total: t.total,
            contributions: t.count,
        })
        .collect()
}

/// What one donor has given across all campaigns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DonorSummary {
    pub donor: DonorId,
    pub total_donated: Decimal,
    pub contributions: u64,
    /// Campaign ids in ascending order.
    pub campaigns_supported: Vec<CampaignId>,
}

pub fn donor_summary(donor: DonorId, entries: &[Contribution]) -> DonorSummary {
    let mine: Vec<&Contribution> = entries
        .iter()
        .filter(|c| c.donor.as_ref() == Some(&donor))
        .collect();

    let mut campaigns: Vec<CampaignId> = mine.iter().map(|c| c.campaign_id).collect();
    campaigns.sort();
    campaigns.dedup();

    DonorSummary {
        total_donated: mine
            .iter()
            .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.amount)),
        contributions: mine.len() as u64,
        campaigns_supported: campaigns,
        donor,
    }
}
