//! Read models: campaign overviews, explore filtering and creator dashboards.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{InvariantViolation, ViolationKind};
use crate::ledger::{self, LedgerTotals};
use crate::types::{Campaign, CampaignStatus, Category, Checkpoint, Contribution, CreatorId};
use crate::unlock::{self, CheckpointPhase, UnlockReport};

/// A checkpoint together with its derived phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckpointView {
    pub index: usize,
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub phase: CheckpointPhase,
}

/// Everything a campaign page shows, derived in one pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CampaignOverview {
    pub campaign: Campaign,
    pub totals: LedgerTotals,
    pub percent_funded: Decimal,
    pub checkpoints: Vec<CheckpointView>,
    pub current_checkpoint: Option<usize>,
    pub violation: Option<InvariantViolation>,
}

impl CampaignOverview {
    pub fn build(campaign: Campaign, totals: LedgerTotals) -> Self {
        let report = unlock::evaluate(&campaign, totals.raised);
        Self::from_report(campaign, totals, report)
    }

    /// Overview straight from ledger entries.
    ///
    /// A ledger whose sum overflows yields a fail-closed overview with the
    /// raised amount capped at [`Decimal::MAX`].
    pub fn from_entries(campaign: Campaign, entries: &[Contribution]) -> Self {
        match ledger::summarize(entries) {
            Some(totals) => Self::build(campaign, totals),
            None => {
                let totals = LedgerTotals {
                    raised: Decimal::MAX,
                    backers: ledger::backer_count(entries),
                    contributions: entries.len() as u64,
                };
                let violation = InvariantViolation {
                    campaign: campaign.id,
                    kind: ViolationKind::LedgerOverflow,
                };
                let report = unlock::fail_closed(&campaign, totals.raised, violation);
                Self::from_report(campaign, totals, report)
            }
        }
    }

    fn from_report(campaign: Campaign, totals: LedgerTotals, report: UnlockReport) -> Self {
        let checkpoints = campaign
            .checkpoints
            .iter()
            .cloned()
            .zip(report.phases)
            .enumerate()
            .map(|(index, (checkpoint, phase))| CheckpointView {
                index,
                checkpoint,
                phase,
            })
            .collect();

        Self {
            percent_funded: report.percent_funded,
            current_checkpoint: report.current,
            violation: report.violation,
            checkpoints,
            totals,
            campaign,
        }
    }

    pub fn count_phase(&self, phase: CheckpointPhase) -> usize {
        self.checkpoints.iter().filter(|c| c.phase == phase).count()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    MostFunded,
    MostBackers,
    /// Campaigns with a deadline first, soonest first.
    EndingSoon,
}

/// Explore-page filter. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExploreFilter {
    pub categories: Vec<Category>,
    pub min_percent_funded: Option<Decimal>,
    pub max_percent_funded: Option<Decimal>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub include_archived: bool,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl ExploreFilter {
    pub fn matches(&self, overview: &CampaignOverview) -> bool {
        let campaign = &overview.campaign;
        if !self.include_archived && campaign.status == CampaignStatus::Archived {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&campaign.category) {
            return false;
        }
        if let Some(min) = self.min_percent_funded {
            if overview.percent_funded < min {
                return false;
            }
        }
        if let Some(max) = self.max_percent_funded {
            if overview.percent_funded > max {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(str::trim) {
            if !needle.is_empty() {
                let needle = needle.to_lowercase();
                let hit = campaign.title.to_lowercase().contains(&needle)
                    || campaign.description.to_lowercase().contains(&needle);
                if !hit {
                    return false;
                }
            }
        }
        true
    }
}

fn compare(sort: SortOrder, a: &CampaignOverview, b: &CampaignOverview) -> Ordering {
    let newest = || {
        b.campaign
            .created_at
            .cmp(&a.campaign.created_at)
            .then_with(|| b.campaign.id.cmp(&a.campaign.id))
    };
    match sort {
        SortOrder::Newest => newest(),
        SortOrder::MostFunded => b
            .percent_funded
            .cmp(&a.percent_funded)
            .then_with(newest),
        SortOrder::MostBackers => b
            .totals
            .backers
            .cmp(&a.totals.backers)
            .then_with(newest),
        SortOrder::EndingSoon => match (a.campaign.ends_at, b.campaign.ends_at) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(newest),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => newest(),
        },
    }
}

pub fn explore(overviews: Vec<CampaignOverview>, filter: &ExploreFilter) -> Vec<CampaignOverview> {
    let mut hits: Vec<CampaignOverview> = overviews
        .into_iter()
        .filter(|o| filter.matches(o))
        .collect();
    hits.sort_by(|a, b| compare(filter.sort, a, b));
    if let Some(limit) = filter.limit {
        hits.truncate(limit);
    }
    hits
}

/// Creator-facing summary across all of their campaigns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatorDashboard {
    pub creator: CreatorId,
    pub total_raised: Decimal,
    pub total_backers: u64,
    pub active_campaigns: usize,
    pub completed_checkpoints: usize,
    /// Checkpoints waiting on the approval collaborator.
    pub pending_approvals: usize,
    pub campaigns: Vec<CampaignOverview>,
}

impl CreatorDashboard {
    pub fn build(creator: CreatorId, campaigns: Vec<CampaignOverview>) -> Self {
        Self {
            creator,
            total_raised: campaigns
                .iter()
                .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.totals.raised)),
            total_backers: campaigns.iter().map(|c| c.totals.backers).sum(),
            active_campaigns: campaigns.iter().filter(|c| c.campaign.is_active()).count(),
            completed_checkpoints: campaigns
                .iter()
                .map(|c| c.count_phase(CheckpointPhase::Completed))
                .sum(),
            pending_approvals: campaigns
                .iter()
                .map(|c| c.count_phase(CheckpointPhase::ProofSubmitted))
                .sum(),
            campaigns,
        }
    }
}
