//! # Campaign aggregate
//!
//! Construction and checkpoint-list edits. Every function here either leaves
//! the campaign with checkpoint percentages summing to exactly 100 or leaves
//! it untouched and returns an error.
//!
//! ## Redistribution
//!
//! Adding or removing a checkpoint splits 100% evenly over the resulting
//! list using integer arithmetic only:
//!
//! ```text
//! base      = 100 / n
//! remainder = 100 - base * n        (0 <= remainder < n)
//! first     = base + remainder
//! others    = base
//! ```
//!
//! So three checkpoints become 34/33/33, two become 50/50, seven become
//! 16/14/14/14/14/14/14.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::{FundingError, Result, StateTransitionError, ValidationError};
use crate::types::{
    Campaign, CampaignId, CampaignStatus, Checkpoint, CheckpointId, NewCampaign, NewCheckpoint,
};

/// Total every campaign's checkpoint percentages must add up to.
pub const FULL_ALLOCATION: u32 = 100;

/// Each checkpoint keeps at least 1%, so 100 is the hard ceiling.
pub const MAX_CHECKPOINTS: usize = 100;

/// Check creator input before anything is allocated or persisted.
pub fn validate_new_campaign(input: &NewCampaign) -> std::result::Result<(), ValidationError> {
    if input.title.trim().is_empty() {
        return Err(ValidationError::Empty { field: "title" });
    }
    if input.goal <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveGoal);
    }
    if input.checkpoints.is_empty() {
        return Err(ValidationError::NoCheckpoints);
    }
    if input.checkpoints.len() > MAX_CHECKPOINTS {
        return Err(ValidationError::TooManyCheckpoints {
            max: MAX_CHECKPOINTS,
        });
    }

    for (index, checkpoint) in input.checkpoints.iter().enumerate() {
        if checkpoint.title.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "checkpoint title",
            });
        }
        check_percentage(index, checkpoint.percentage)?;
    }

    let total: u32 = input
        .checkpoints
        .iter()
        .map(|c| u32::from(c.percentage))
        .sum();
    if total != FULL_ALLOCATION {
        return Err(ValidationError::PercentageSum { total });
    }

    Ok(())
}

/// Validate `input` and build the campaign it describes. No contributions,
/// no proofs, status `Active`.
pub fn build_campaign(
    id: CampaignId,
    input: NewCampaign,
    now: DateTime<Utc>,
) -> std::result::Result<Campaign, ValidationError> {
    validate_new_campaign(&input)?;

    let checkpoints: Vec<Checkpoint> = input
        .checkpoints
        .into_iter()
        .enumerate()
        .map(|(i, c)| draft_checkpoint(CheckpointId(i as u32), c))
        .collect();
    let next_checkpoint_id = checkpoints.len() as u32;

    Ok(Campaign {
        id,
        creator: input.creator,
        title: input.title,
        description: input.description,
        story: input.story,
        category: input.category,
        goal: input.goal,
        checkpoints,
        status: CampaignStatus::Active,
        created_at: now,
        ends_at: input.ends_at,
        next_checkpoint_id,
    })
}

/// Even split of 100% over `n` checkpoints, remainder to the first.
///
/// `n` must be in `1..=MAX_CHECKPOINTS`.
pub fn even_split(n: usize) -> Vec<u8> {
    debug_assert!((1..=MAX_CHECKPOINTS).contains(&n));
    let n32 = n as u32;
    let base = FULL_ALLOCATION / n32;
    let remainder = FULL_ALLOCATION - base * n32;

    (0..n)
        .map(|i| {
            let share = if i == 0 { base + remainder } else { base };
            share as u8
        })
        .collect()
}

fn check_percentage(index: usize, value: u8) -> std::result::Result<(), ValidationError> {
    if value == 0 || u32::from(value) > FULL_ALLOCATION {
        return Err(ValidationError::PercentageOutOfRange {
            index,
            value: u32::from(value),
        });
    }
    Ok(())
}

fn draft_checkpoint(id: CheckpointId, input: NewCheckpoint) -> Checkpoint {
    Checkpoint {
        id,
        title: input.title,
        description: input.description,
        percentage: input.percentage,
        completed: false,
        proof: None,
    }
}

impl Campaign {
    /// Checkpoint edits are only valid on an active campaign whose
    /// checkpoints have seen no proof or approval.
    pub fn ensure_editable(&self) -> Result<()> {
        if self.status == CampaignStatus::Archived {
            return Err(StateTransitionError::Archived(self.id).into());
        }
        if self
            .checkpoints
            .iter()
            .any(|c| c.completed || c.proof.is_some())
        {
            return Err(StateTransitionError::FundingStarted(self.id).into());
        }
        Ok(())
    }

    pub fn checkpoint(&self, index: usize) -> Result<&Checkpoint> {
        self.checkpoints
            .get(index)
            .ok_or(FundingError::CheckpointNotFound {
                campaign: self.id,
                index,
            })
    }

    pub(crate) fn checkpoint_mut(&mut self, index: usize) -> Result<&mut Checkpoint> {
        let campaign = self.id;
        self.checkpoints
            .get_mut(index)
            .ok_or(FundingError::CheckpointNotFound { campaign, index })
    }

    /// Append a checkpoint and re-split 100% evenly across the list.
    ///
    /// Returns the index of the new checkpoint.
    pub fn add_checkpoint(&mut self, title: String, description: String) -> Result<usize> {
        self.ensure_editable()?;
        if title.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "checkpoint title",
            }
            .into());
        }
        if self.checkpoints.len() >= MAX_CHECKPOINTS {
            return Err(ValidationError::TooManyCheckpoints {
                max: MAX_CHECKPOINTS,
            }
            .into());
        }

        let id = CheckpointId(self.next_checkpoint_id);
        self.next_checkpoint_id += 1;
        self.checkpoints.push(draft_checkpoint(
            id,
            NewCheckpoint {
                title,
                description,
                percentage: 0,
            },
        ));
        self.redistribute();
        Ok(self.checkpoints.len() - 1)
    }

    /// Remove the checkpoint at `index` and re-split 100% evenly across
    /// the remaining ones.
    pub fn remove_checkpoint(&mut self, index: usize) -> Result<Checkpoint> {
        self.ensure_editable()?;
        self.checkpoint(index)?;
        if self.checkpoints.len() <= 1 {
            return Err(ValidationError::LastCheckpoint.into());
        }

        let removed = self.checkpoints.remove(index);
        self.redistribute();
        Ok(removed)
    }

    /// Change one percentage. Rejected with [`FundingError::PercentageMismatch`]
    /// if the resulting total is not 100; the campaign is left as it was.
    pub fn update_checkpoint_percentage(&mut self, index: usize, percentage: u8) -> Result<()> {
        self.ensure_editable()?;
        let current = u32::from(self.checkpoint(index)?.percentage);
        check_percentage(index, percentage)?;

        let total = self.percentage_total() - current + u32::from(percentage);
        if total != FULL_ALLOCATION {
            return Err(FundingError::PercentageMismatch { total });
        }

        self.checkpoint_mut(index)?.percentage = percentage;
        Ok(())
    }

    /// Replace every percentage at once, in checkpoint order.
    pub fn set_checkpoint_percentages(&mut self, percentages: &[u8]) -> Result<()> {
        self.ensure_editable()?;
        if percentages.len() != self.checkpoints.len() {
            return Err(ValidationError::PercentageCount {
                expected: self.checkpoints.len(),
                actual: percentages.len(),
            }
            .into());
        }
        for (index, value) in percentages.iter().enumerate() {
            check_percentage(index, *value)?;
        }

        let total: u32 = percentages.iter().map(|p| u32::from(*p)).sum();
        if total != FULL_ALLOCATION {
            return Err(FundingError::PercentageMismatch { total });
        }

        for (checkpoint, value) in self.checkpoints.iter_mut().zip(percentages) {
            checkpoint.percentage = *value;
        }
        Ok(())
    }

    fn redistribute(&mut self) {
        let split = even_split(self.checkpoints.len());
        for (checkpoint, share) in self.checkpoints.iter_mut().zip(split) {
            checkpoint.percentage = share;
        }
    }
}
