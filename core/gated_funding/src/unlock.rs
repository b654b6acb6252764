//! # Checkpoint unlock policy
//!
//! Decides, from the checkpoint list and the amount raised so far, which
//! checkpoint a creator may submit proof for.
//!
//! Checkpoints are walked in order with a running cumulative percentage.
//! Completed checkpoints form a prefix. The first incomplete checkpoint after
//! that prefix is the only candidate; it is unlocked when the cumulative
//! percentage through it is covered by the percent funded. Everything after
//! it is locked no matter how much has been raised.
//!
//! Corrupted campaigns fail closed: the report carries the violation and no
//! checkpoint is reported as eligible.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::campaign::FULL_ALLOCATION;
use crate::errors::{InvariantViolation, ViolationKind};
use crate::types::Campaign;

/// Derived phase of a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPhase {
    Locked,
    /// Eligible for proof submission.
    Unlocked,
    /// Proof received, waiting for approval.
    ProofSubmitted,
    Completed,
}

impl CheckpointPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::ProofSubmitted => "proof_submitted",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for CheckpointPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating the policy for one campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnlockReport {
    /// One entry per checkpoint, in order.
    pub phases: Vec<CheckpointPhase>,
    /// Index of the checkpoint currently open for proof or approval.
    pub current: Option<usize>,
    /// `raised / goal * 100`, unrounded.
    pub percent_funded: Decimal,
    pub violation: Option<InvariantViolation>,
}

impl UnlockReport {
    pub fn phase(&self, index: usize) -> Option<CheckpointPhase> {
        self.phases.get(index).copied()
    }

    pub fn is_fail_closed(&self) -> bool {
        self.violation.is_some()
    }

    /// Error out when the campaign failed closed.
    pub fn into_result(self) -> Result<Self, InvariantViolation> {
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(self),
        }
    }
}

/// Percent of `goal` covered by `raised`.
pub fn percent_funded(raised: Decimal, goal: Decimal) -> Decimal {
    if goal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    raised
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(goal))
        .unwrap_or(Decimal::MAX)
}

/// Whether `raised` covers `cumulative` percent of `goal`.
///
/// Compared as `cumulative * goal <= raised * 100` to stay exact.
fn covers(raised: Decimal, goal: Decimal, cumulative: u32) -> bool {
    let needed = goal.checked_mul(Decimal::from(cumulative));
    let have = raised.checked_mul(Decimal::ONE_HUNDRED);
    match (needed, have) {
        (Some(needed), Some(have)) => needed <= have,
        // `raised * 100` overflowing means raised dwarfs any goal.
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Report for a campaign that cannot be evaluated safely.
///
/// Completed checkpoints keep their phase; everything else is `Locked`.
pub fn fail_closed(
    campaign: &Campaign,
    raised: Decimal,
    violation: InvariantViolation,
) -> UnlockReport {
    UnlockReport {
        phases: campaign
            .checkpoints
            .iter()
            .map(|c| {
                if c.completed {
                    CheckpointPhase::Completed
                } else {
                    CheckpointPhase::Locked
                }
            })
            .collect(),
        current: None,
        percent_funded: percent_funded(raised, campaign.goal),
        violation: Some(violation),
    }
}

/// Evaluate the unlock policy for `campaign` given the ledger's raised amount.
pub fn evaluate(campaign: &Campaign, raised: Decimal) -> UnlockReport {
    let percent_funded = percent_funded(raised, campaign.goal);
    let total = campaign.percentage_total();

    if total != FULL_ALLOCATION {
        let violation = InvariantViolation {
            campaign: campaign.id,
            kind: ViolationKind::PercentageSum { total },
        };
        return fail_closed(campaign, raised, violation);
    }

    let mut phases = Vec::with_capacity(campaign.checkpoints.len());
    let mut current = None;
    let mut violation = None;
    let mut cumulative = 0u32;
    let mut chain_intact = true;

    for (index, checkpoint) in campaign.checkpoints.iter().enumerate() {
        cumulative += u32::from(checkpoint.percentage);

        if violation.is_some() {
            phases.push(if checkpoint.completed {
                CheckpointPhase::Completed
            } else {
                CheckpointPhase::Locked
            });
            continue;
        }

        if checkpoint.completed {
            let kind = if checkpoint.proof.is_none() {
                Some(ViolationKind::CompletedWithoutProof { index })
            } else if !chain_intact {
                Some(ViolationKind::CompletedOutOfOrder { index })
            } else {
                None
            };
            if let Some(kind) = kind {
                violation = Some(InvariantViolation {
                    campaign: campaign.id,
                    kind,
                });
                current = None;
                // Everything already reported as open is closed again.
                for phase in phases.iter_mut() {
                    if matches!(
                        phase,
                        CheckpointPhase::Unlocked | CheckpointPhase::ProofSubmitted
                    ) {
                        *phase = CheckpointPhase::Locked;
                    }
                }
                // The flag itself is never rolled back in the read model.
                phases.push(CheckpointPhase::Completed);
                continue;
            }
            phases.push(CheckpointPhase::Completed);
            continue;
        }

        if !chain_intact {
            phases.push(CheckpointPhase::Locked);
            continue;
        }
        chain_intact = false;

        let phase = if checkpoint.proof.is_some() {
            CheckpointPhase::ProofSubmitted
        } else if covers(raised, campaign.goal, cumulative) {
            CheckpointPhase::Unlocked
        } else {
            CheckpointPhase::Locked
        };
        if phase != CheckpointPhase::Locked {
            current = Some(index);
        }
        phases.push(phase);
    }

    UnlockReport {
        phases,
        current,
        percent_funded,
        violation,
    }
}
