//! Error taxonomy for campaign, checkpoint and ledger operations.
//!
//! Every error is returned to the immediate caller. Nothing here is retried.

use serde::Serialize;
use thiserror::Error;

use crate::types::CampaignId;
use crate::unlock::CheckpointPhase;

/// Malformed caller input. Fixed by correcting the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("goal amount must be positive")]
    NonPositiveGoal,

    #[error("contribution amount must be positive")]
    NonPositiveAmount,

    #[error("a campaign needs at least one checkpoint")]
    NoCheckpoints,

    #[error("a campaign cannot have more than {max} checkpoints")]
    TooManyCheckpoints { max: usize },

    #[error("checkpoint {index}: percentage {value} is outside 1..=100")]
    PercentageOutOfRange { index: usize, value: u32 },

    #[error("checkpoint percentages must add up to 100%, got {total}%")]
    PercentageSum { total: u32 },

    #[error("expected {expected} percentages, got {actual}")]
    PercentageCount { expected: usize, actual: usize },

    #[error("removing the last checkpoint would leave the campaign without checkpoints")]
    LastCheckpoint,

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: cannot parse {value:?}")]
    Malformed { field: &'static str, value: String },

    #[error("malformed request: {0}")]
    Request(String),

    #[error("contribution of {amount} would overflow the campaign total")]
    AmountOverflow { amount: rust_decimal::Decimal },
}

/// Corrupted state detected while reading a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    #[error("checkpoint percentages sum to {total}%, not 100%")]
    PercentageSum { total: u32 },

    #[error("checkpoint {index} is completed without proof")]
    CompletedWithoutProof { index: usize },

    #[error("checkpoint {index} is completed while an earlier checkpoint is not")]
    CompletedOutOfOrder { index: usize },

    #[error("contribution amounts overflow the ledger total")]
    LedgerOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("invariant violated on campaign {campaign}: {kind}")]
pub struct InvariantViolation {
    pub campaign: CampaignId,
    pub kind: ViolationKind,
}

/// Operation attempted in the wrong lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTransitionError {
    #[error("checkpoint {index} is {phase}; cannot {action}")]
    Checkpoint {
        index: usize,
        phase: CheckpointPhase,
        action: &'static str,
    },

    #[error("campaign {0} is archived")]
    Archived(CampaignId),

    #[error("checkpoints of campaign {0} cannot change once funding has started")]
    FundingStarted(CampaignId),

    #[error("campaign {0} is no longer accepting contributions")]
    FundingClosed(CampaignId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundingError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The edit was rolled back; `total` is what the edit would have produced.
    #[error("checkpoint percentages must add up to 100%. Current total: {total}%")]
    PercentageMismatch { total: u32 },

    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("state transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    #[error("campaign {0} not found")]
    CampaignNotFound(CampaignId),

    #[error("campaign {campaign} has no checkpoint at index {index}")]
    CheckpointNotFound { campaign: CampaignId, index: usize },

    #[error("storage error: {0}")]
    Storage(String),
}

impl FundingError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PercentageMismatch { .. } => "percentage_mismatch",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::StateTransition(_) => "state_transition_error",
            Self::CampaignNotFound(_) | Self::CheckpointNotFound { .. } => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// Only storage failures qualify; every other error is a verdict on the
    /// input or the campaign state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, FundingError>;
