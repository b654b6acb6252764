//! # Gated Funding
//!
//! Core rules for **checkpoint-gated campaign funding**: a campaign has a
//! goal split into ordered checkpoints, each claiming a share of the goal.
//! Checkpoints unlock one at a time as contributions accumulate, and the
//! creator must submit proof (approved by a reviewer) before moving on.
//!
//! | Phase         | Entry point(s) on [`FundingService`]                                  |
//! |---------------|-----------------------------------------------------------------------|
//! | Creation      | `create_campaign`                                                     |
//! | Editing       | `add_checkpoint`, `remove_checkpoint`, `update_checkpoint_percentage`, `set_checkpoint_percentages` |
//! | Funding       | `record_contribution`                                                 |
//! | Progression   | `unlock_status`, `submit_proof`, `approve_checkpoint`                 |
//! | Archival      | `archive_campaign`                                                    |
//! | Queries       | `overview`, `explore`, `raised_amount`, `backer_count`, `leaderboard`, `donor_summary`, `creator_dashboard` |
//!
//! ## Architecture
//!
//! Persistence is delegated to a [`CampaignStore`] implementation. The rule
//! modules ([`campaign`], [`unlock`], [`ledger`], [`discovery`]) are pure
//! functions over plain records; [`service`] wires them to the store and
//! serializes mutations per campaign.

pub mod campaign;
pub mod discovery;
pub mod errors;
pub mod ledger;
pub mod memory;
pub mod service;
pub mod storage;
pub mod types;
pub mod unlock;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_contributions;
#[cfg(test)]
mod test_lifecycle;

pub use errors::{
    FundingError, InvariantViolation, Result, StateTransitionError, ValidationError, ViolationKind,
};
pub use memory::MemoryStore;
pub use service::{ContributionReceipt, ContributionRequest, FundingService};
pub use storage::CampaignStore;
pub use types::{
    Campaign, CampaignId, CampaignStatus, CampaignUpdate, Category, Checkpoint, CheckpointId,
    Contribution, ContributionId, ContributionSource, CreatorId, DonorId, NewCampaign,
    NewCheckpoint, NewContribution, Proof,
};
pub use unlock::{CheckpointPhase, UnlockReport};
