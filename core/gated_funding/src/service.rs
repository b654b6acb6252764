//! # Funding service
//!
//! Entry points used by the service layer. Each operation loads plain
//! records from the injected [`CampaignStore`], applies the rules from
//! [`crate::campaign`], [`crate::unlock`] and [`crate::ledger`], and writes
//! the result back.
//!
//! ## Serialization per campaign
//!
//! Every mutating operation on a campaign (contributions, checkpoint edits,
//! proof submission, approval, archival) runs while holding that campaign's
//! mutex from [`CampaignLocks`]. Two contributions racing on the same
//! campaign are therefore both appended before either one's totals are
//! read, and a checkpoint edit never interleaves with a contribution.
//! Operations on different campaigns do not contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::campaign::build_campaign;
use crate::discovery::{explore, CampaignOverview, CreatorDashboard, ExploreFilter};
use crate::errors::{
    FundingError, InvariantViolation, Result, StateTransitionError, ValidationError, ViolationKind,
};
use crate::ledger::{self, DonorSummary, LeaderboardEntry, LedgerTotals};
use crate::storage::CampaignStore;
use crate::types::{
    Campaign, CampaignId, CampaignStatus, CampaignUpdate, Contribution, ContributionSource,
    CreatorId, DonorId, NewCampaign, NewContribution, Proof,
};
use crate::unlock::{self, CheckpointPhase, UnlockReport};

/// One async mutex per campaign, created on first use.
#[derive(Default)]
pub struct CampaignLocks {
    inner: Mutex<HashMap<CampaignId, Arc<Mutex<()>>>>,
}

impl CampaignLocks {
    pub async fn acquire(&self, id: CampaignId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Contribution input from the donor or payment collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContributionRequest {
    pub donor: Option<DonorId>,
    pub amount: Decimal,
    pub source: ContributionSource,
}

impl ContributionRequest {
    pub fn direct(donor: Option<DonorId>, amount: Decimal) -> Self {
        Self {
            donor,
            amount,
            source: ContributionSource::Direct,
        }
    }
}

/// Outcome of [`FundingService::record_contribution`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContributionReceipt {
    /// `None` when the entry was a duplicate chain transaction.
    pub contribution: Option<Contribution>,
    /// Totals after the append, recounted from the ledger.
    pub totals: LedgerTotals,
}

#[derive(Clone)]
pub struct FundingService {
    store: Arc<dyn CampaignStore>,
    locks: Arc<CampaignLocks>,
}

impl FundingService {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self {
            store,
            locks: Arc::new(CampaignLocks::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────
    // Campaigns
    // ─────────────────────────────────────────────────────────

    /// Validate and persist a new campaign. Nothing is persisted when
    /// validation fails.
    pub async fn create_campaign(&self, input: NewCampaign) -> Result<Campaign> {
        crate::campaign::validate_new_campaign(&input)?;

        let id = self.store.allocate_campaign_id().await?;
        let campaign = build_campaign(id, input, Utc::now())?;
        self.store.save_campaign(&campaign).await?;

        info!(
            campaign = %campaign.id,
            creator = %campaign.creator.0,
            checkpoints = campaign.checkpoints.len(),
            "campaign created"
        );
        Ok(campaign)
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign> {
        self.store
            .load_campaign(id)
            .await?
            .ok_or(FundingError::CampaignNotFound(id))
    }

    pub async fn overview(&self, id: CampaignId) -> Result<CampaignOverview> {
        let campaign = self.campaign(id).await?;
        self.overview_of(campaign).await
    }

    pub async fn list_overviews(&self) -> Result<Vec<CampaignOverview>> {
        let campaigns = self.store.list_campaigns().await?;
        self.overviews_of(campaigns).await
    }

    pub async fn explore(&self, filter: &ExploreFilter) -> Result<Vec<CampaignOverview>> {
        Ok(explore(self.list_overviews().await?, filter))
    }

    /// Freeze a campaign. Archived campaigns stay readable for audit.
    pub async fn archive_campaign(&self, id: CampaignId) -> Result<Campaign> {
        let _guard = self.locks.acquire(id).await;
        let mut campaign = self.campaign(id).await?;
        if campaign.status == CampaignStatus::Archived {
            return Err(StateTransitionError::Archived(id).into());
        }
        campaign.status = CampaignStatus::Archived;
        self.store.save_campaign(&campaign).await?;
        info!(campaign = %id, "campaign archived");
        Ok(campaign)
    }

    // ─────────────────────────────────────────────────────────
    // Checkpoint edits
    // ─────────────────────────────────────────────────────────

    /// Load the campaign, apply `edit` to a copy, persist only on success.
    async fn edit_checkpoints<F, T>(&self, id: CampaignId, edit: F) -> Result<(Campaign, T)>
    where
        F: FnOnce(&mut Campaign) -> Result<T>,
    {
        let _guard = self.locks.acquire(id).await;
        let mut campaign = self.campaign(id).await?;
        campaign.ensure_editable()?;
        if !self.store.contributions(id).await?.is_empty() {
            return Err(StateTransitionError::FundingStarted(id).into());
        }

        let value = edit(&mut campaign)?;
        self.store.save_campaign(&campaign).await?;
        Ok((campaign, value))
    }

    /// Append a checkpoint; percentages are re-split evenly.
    pub async fn add_checkpoint(
        &self,
        id: CampaignId,
        title: String,
        description: String,
    ) -> Result<Campaign> {
        let (campaign, index) = self
            .edit_checkpoints(id, |c| c.add_checkpoint(title, description))
            .await?;
        debug!(campaign = %id, index, "checkpoint added");
        Ok(campaign)
    }

    /// Remove a checkpoint; percentages are re-split evenly.
    pub async fn remove_checkpoint(&self, id: CampaignId, index: usize) -> Result<Campaign> {
        let (campaign, _) = self
            .edit_checkpoints(id, |c| c.remove_checkpoint(index))
            .await?;
        debug!(campaign = %id, index, "checkpoint removed");
        Ok(campaign)
    }

    pub async fn update_checkpoint_percentage(
        &self,
        id: CampaignId,
        index: usize,
        percentage: u8,
    ) -> Result<Campaign> {
        let (campaign, _) = self
            .edit_checkpoints(id, |c| c.update_checkpoint_percentage(index, percentage))
            .await?;
        Ok(campaign)
    }

    pub async fn set_checkpoint_percentages(
        &self,
        id: CampaignId,
        percentages: Vec<u8>,
    ) -> Result<Campaign> {
        let (campaign, _) = self
            .edit_checkpoints(id, |c| c.set_checkpoint_percentages(&percentages))
            .await?;
        Ok(campaign)
    }

    // ─────────────────────────────────────────────────────────
    // Unlock policy and checkpoint progression
    // ─────────────────────────────────────────────────────────

    /// Current unlock state. A corrupted campaign comes back fully locked
    /// with its violation attached.
    pub async fn unlock_status(&self, id: CampaignId) -> Result<UnlockReport> {
        let campaign = self.campaign(id).await?;
        let report = match ledger::raised_amount(&self.store.contributions(id).await?) {
            Some(raised) => unlock::evaluate(&campaign, raised),
            None => unlock::fail_closed(&campaign, Decimal::MAX, ledger_overflow(id)),
        };
        if let Some(violation) = &report.violation {
            report_violation(violation);
        }
        Ok(report)
    }

    /// Creator submits evidence for the current checkpoint.
    ///
    /// Only valid when the checkpoint is `Unlocked`.
    pub async fn submit_proof(
        &self,
        id: CampaignId,
        index: usize,
        uri: String,
        note: Option<String>,
    ) -> Result<Campaign> {
        if uri.trim().is_empty() {
            return Err(ValidationError::Empty { field: "proof uri" }.into());
        }

        let _guard = self.locks.acquire(id).await;
        let mut campaign = self.campaign(id).await?;
        ensure_active(&campaign)?;
        let phase = self.phase_of(&campaign, index).await?;
        if phase != CheckpointPhase::Unlocked {
            return Err(StateTransitionError::Checkpoint {
                index,
                phase,
                action: "submit proof",
            }
            .into());
        }

        campaign.checkpoint_mut(index)?.proof = Some(Proof {
            uri,
            note,
            submitted_at: Utc::now(),
        });
        self.store.save_campaign(&campaign).await?;
        info!(campaign = %id, index, "checkpoint proof submitted");
        Ok(campaign)
    }

    /// Approval collaborator marks a checkpoint with pending proof as completed.
    pub async fn approve_checkpoint(&self, id: CampaignId, index: usize) -> Result<Campaign> {
        let _guard = self.locks.acquire(id).await;
        let mut campaign = self.campaign(id).await?;
        ensure_active(&campaign)?;
        let phase = self.phase_of(&campaign, index).await?;
        if phase != CheckpointPhase::ProofSubmitted {
            return Err(StateTransitionError::Checkpoint {
                index,
                phase,
                action: "approve",
            }
            .into());
        }

        campaign.checkpoint_mut(index)?.completed = true;
        self.store.save_campaign(&campaign).await?;
        info!(campaign = %id, index, "checkpoint completed");
        Ok(campaign)
    }

    /// Phase of one checkpoint, failing closed on corrupted campaigns.
    async fn phase_of(&self, campaign: &Campaign, index: usize) -> Result<CheckpointPhase> {
        campaign.checkpoint(index)?;
        let raised = self.totals(campaign.id).await?.raised;
        let report = unlock::evaluate(campaign, raised);
        let report = report.into_result().map_err(|violation| {
            report_violation(&violation);
            FundingError::from(violation)
        })?;
        report.phase(index).ok_or(FundingError::CheckpointNotFound {
            campaign: campaign.id,
            index,
        })
    }

    // ─────────────────────────────────────────────────────────
    // Contributions
    // ─────────────────────────────────────────────────────────

    /// Append a contribution and return the recounted totals.
    pub async fn record_contribution(
        &self,
        id: CampaignId,
        request: ContributionRequest,
    ) -> Result<ContributionReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount.into());
        }

        let _guard = self.locks.acquire(id).await;
        let campaign = self.campaign(id).await?;
        ensure_active(&campaign)?;
        let now = Utc::now();
        if campaign.ends_at.is_some_and(|end| now > end) {
            return Err(StateTransitionError::FundingClosed(id).into());
        }
        // Held under the campaign lock, so no other append can land in between.
        let raised = self.totals(id).await?.raised;
        if raised.checked_add(request.amount).is_none() {
            return Err(ValidationError::AmountOverflow {
                amount: request.amount,
            }
            .into());
        }

        let appended = self
            .store
            .append_contribution(NewContribution {
                campaign_id: id,
                donor: request.donor,
                amount: request.amount,
                timestamp: now,
                source: request.source,
            })
            .await?;
        let totals = self.totals(id).await?;

        match &appended {
            Some(entry) => info!(
                campaign = %id,
                contribution = entry.id.0,
                amount = %entry.amount,
                raised = %totals.raised,
                backers = totals.backers,
                "contribution recorded"
            ),
            None => warn!(campaign = %id, "duplicate chain contribution ignored"),
        }

        Ok(ContributionReceipt {
            contribution: appended,
            totals,
        })
    }

    /// Ledger aggregates. An overflowing ledger is an [`InvariantViolation`].
    pub async fn totals(&self, id: CampaignId) -> Result<LedgerTotals> {
        ledger::summarize(&self.store.contributions(id).await?).ok_or_else(|| {
            let violation = ledger_overflow(id);
            report_violation(&violation);
            violation.into()
        })
    }

    pub async fn raised_amount(&self, id: CampaignId) -> Result<Decimal> {
        self.campaign(id).await?;
        Ok(self.totals(id).await?.raised)
    }

    pub async fn backer_count(&self, id: CampaignId) -> Result<u64> {
        self.campaign(id).await?;
        Ok(self.totals(id).await?.backers)
    }

    pub async fn contributions(&self, id: CampaignId) -> Result<Vec<Contribution>> {
        self.campaign(id).await?;
        self.store.contributions(id).await
    }

    pub async fn leaderboard(&self, id: CampaignId, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let entries = self.contributions(id).await?;
        Ok(ledger::leaderboard(&entries, limit))
    }

    pub async fn donor_summary(&self, donor: DonorId) -> Result<DonorSummary> {
        let entries = self.store.contributions_by_donor(&donor).await?;
        Ok(ledger::donor_summary(donor, &entries))
    }

    pub async fn creator_dashboard(&self, creator: CreatorId) -> Result<CreatorDashboard> {
        let campaigns = self.store.campaigns_by_creator(&creator).await?;
        let overviews = self.overviews_of(campaigns).await?;
        Ok(CreatorDashboard::build(creator, overviews))
    }

    // ─────────────────────────────────────────────────────────
    // Creator updates
    // ─────────────────────────────────────────────────────────

    pub async fn post_update(
        &self,
        id: CampaignId,
        title: String,
        content: String,
    ) -> Result<CampaignUpdate> {
        if title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "update title" }.into());
        }
        let campaign = self.campaign(id).await?;
        ensure_active(&campaign)?;

        let update = CampaignUpdate {
            campaign_id: id,
            title,
            content,
            posted_at: Utc::now(),
        };
        self.store.append_update(&update).await?;
        Ok(update)
    }

    pub async fn updates(&self, id: CampaignId) -> Result<Vec<CampaignUpdate>> {
        self.campaign(id).await?;
        self.store.updates(id).await
    }

    async fn overviews_of(&self, campaigns: Vec<Campaign>) -> Result<Vec<CampaignOverview>> {
        let mut overviews = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            overviews.push(self.overview_of(campaign).await?);
        }
        Ok(overviews)
    }

    async fn overview_of(&self, campaign: Campaign) -> Result<CampaignOverview> {
        let entries = self.store.contributions(campaign.id).await?;
        let overview = CampaignOverview::from_entries(campaign, &entries);
        if let Some(violation) = &overview.violation {
            report_violation(violation);
        }
        Ok(overview)
    }
}

fn ensure_active(campaign: &Campaign) -> Result<()> {
    if campaign.status == CampaignStatus::Archived {
        return Err(StateTransitionError::Archived(campaign.id).into());
    }
    Ok(())
}

fn ledger_overflow(campaign: CampaignId) -> InvariantViolation {
    InvariantViolation {
        campaign,
        kind: ViolationKind::LedgerOverflow,
    }
}

/// Corrupted state is an operator concern; it is logged, never repaired.
fn report_violation(violation: &InvariantViolation) {
    error!(campaign = %violation.campaign, "{violation}");
}
