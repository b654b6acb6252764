//! # Storage
//!
//! The persistence boundary. The service never touches a database directly;
//! it talks to a [`CampaignStore`] injected at construction.
//!
//! ## Persisted shape
//!
//! | Record             | Keyed by                      | Mutability                     |
//! |--------------------|-------------------------------|--------------------------------|
//! | `Campaign`         | `CampaignId`                  | Rewritten whole on every edit  |
//! | `Checkpoint`       | `(CampaignId, position)`      | Stored with its campaign       |
//! | `Contribution`     | `ContributionId`              | Append-only                    |
//! | `CampaignUpdate`   | `(CampaignId, posted order)`  | Append-only                    |
//!
//! ## Contract for implementors
//!
//! - `save_campaign` replaces the campaign and its full checkpoint list
//!   atomically.
//! - `append_contribution` never rewrites an existing entry. Chain
//!   contributions are unique on `tx_hash`; a second append with the same
//!   hash returns `Ok(None)` instead of a new entry.
//! - Ids are allocated monotonically and never reused.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{
    Campaign, CampaignId, CampaignUpdate, Contribution, CreatorId, DonorId, NewContribution,
};

#[async_trait]
pub trait CampaignStore: Send + Sync {
    // ── Campaigns ───────────────────────────────────────────────────

    /// Reserve the id for a campaign about to be saved.
    async fn allocate_campaign_id(&self) -> Result<CampaignId>;

    async fn save_campaign(&self, campaign: &Campaign) -> Result<()>;

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// All campaigns, ordered by id.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    async fn campaigns_by_creator(&self, creator: &CreatorId) -> Result<Vec<Campaign>>;

    // ── Ledger ──────────────────────────────────────────────────────

    /// Append an immutable entry. `Ok(None)` when a chain entry with the
    /// same `tx_hash` is already recorded.
    async fn append_contribution(&self, entry: NewContribution) -> Result<Option<Contribution>>;

    /// Entries for one campaign in append order.
    async fn contributions(&self, campaign: CampaignId) -> Result<Vec<Contribution>>;

    async fn contributions_by_donor(&self, donor: &DonorId) -> Result<Vec<Contribution>>;

    // ── Updates ─────────────────────────────────────────────────────

    async fn append_update(&self, update: &CampaignUpdate) -> Result<()>;

    /// Updates for one campaign, oldest first.
    async fn updates(&self, campaign: CampaignId) -> Result<Vec<CampaignUpdate>>;
}
