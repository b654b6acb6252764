//! # Types
//!
//! Plain data records shared by every module of the crate. Nothing in here
//! enforces rules; validation lives in [`crate::campaign`] and the service.
//!
//! ## Design decisions
//!
//! ### Raised amount is never stored
//!
//! A [`Campaign`] carries its goal but not its raised amount or backer count.
//! Both are derived from the contribution ledger on every read (see
//! [`crate::ledger::summarize`]) so the aggregate can never drift from the
//! entries it summarises.
//!
//! ### Checkpoint lifecycle
//!
//! A [`Checkpoint`] only persists two facts: its `proof` and its `completed`
//! flag. The phase shown to donors is derived by the unlock policy:
//!
//! ```text
//! Locked ──► Unlocked ──► ProofSubmitted ──► Completed
//! ```
//!
//! No transition goes backwards. `completed` flips once, from `false` to `true`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unique campaign identifier (auto-incremented by the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(pub u64);

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checkpoint identifier, unique within one campaign only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub u32);

/// Ledger entry identifier (auto-incremented by the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContributionId(pub u64);

/// Opaque reference to the campaign owner.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatorId(pub String);

/// Opaque donor identity (wallet address, account id, ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DonorId(pub String);

impl fmt::Display for DonorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Campaign category tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Education,
    Healthcare,
    Environment,
    Community,
    Technology,
    Arts,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Education,
        Category::Healthcare,
        Category::Environment,
        Category::Community,
        Category::Technology,
        Category::Arts,
    ];

    /// Short identifier used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Education => "education",
            Self::Healthcare => "healthcare",
            Self::Environment => "environment",
            Self::Community => "community",
            Self::Technology => "technology",
            Self::Arts => "arts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Lifecycle status of a campaign. Campaigns are archived, never deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Accepting contributions and checkpoint activity.
    Active,
    /// Frozen for audit; read-only.
    Archived,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Evidence submitted by the creator for a checkpoint. Content is not inspected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Location of the evidence (URL, IPFS CID, document reference).
    pub uri: String,
    pub note: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// A funding milestone claiming a share of the campaign goal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub title: String,
    pub description: String,
    /// Share of the goal, in whole percent (1..=100).
    pub percentage: u8,
    /// Set by the approval collaborator. Never reverts.
    pub completed: bool,
    pub proof: Option<Proof>,
}

/// Creator input for a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckpoint {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub percentage: u8,
}

/// A fundraising campaign and its ordered checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub creator: CreatorId,
    pub title: String,
    pub description: String,
    pub story: String,
    pub category: Category,
    /// Target amount, always positive.
    pub goal: Decimal,
    /// Order is unlock precedence.
    pub checkpoints: Vec<Checkpoint>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    /// Contributions are refused after this instant, when set.
    pub ends_at: Option<DateTime<Utc>>,
    /// Next value handed out as a [`CheckpointId`].
    pub next_checkpoint_id: u32,
}

impl Campaign {
    /// Sum of all checkpoint percentages, widened so corrupted data cannot overflow.
    pub fn percentage_total(&self) -> u32 {
        self.checkpoints.iter().map(|c| u32::from(c.percentage)).sum()
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

/// Creator input for a new campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub creator: CreatorId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story: String,
    pub category: Category,
    pub goal: Decimal,
    pub checkpoints: Vec<NewCheckpoint>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

/// Where a contribution was observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContributionSource {
    /// Reported by the payment collaborator.
    Direct,
    /// Observed on-chain. `tx_hash` is unique across the ledger.
    Chain { tx_hash: String, ledger: u64 },
}

impl ContributionSource {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::Chain { tx_hash, .. } => Some(tx_hash),
        }
    }
}

/// Immutable ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub campaign_id: CampaignId,
    /// `None` for anonymous donations.
    pub donor: Option<DonorId>,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: ContributionSource,
}

/// Contribution as handed to the store; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewContribution {
    pub campaign_id: CampaignId,
    pub donor: Option<DonorId>,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: ContributionSource,
}

impl NewContribution {
    pub fn into_contribution(self, id: ContributionId) -> Contribution {
        Contribution {
            id,
            campaign_id: self.campaign_id,
            donor: self.donor,
            amount: self.amount,
            timestamp: self.timestamp,
            source: self.source,
        }
    }
}

/// News post from the creator to donors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignUpdate {
    pub campaign_id: CampaignId,
    pub title: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}
