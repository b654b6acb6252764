#![allow(dead_code)]

use rust_decimal::Decimal;

use crate::campaign::FULL_ALLOCATION;
use crate::ledger::LedgerTotals;
use crate::types::{Campaign, Contribution};
use crate::unlock::{CheckpointPhase, UnlockReport};

/// INV-1: Checkpoint percentages add up to exactly 100.
pub fn assert_percentages_sum_to_100(campaign: &Campaign) {
    assert_eq!(
        campaign.percentage_total(),
        FULL_ALLOCATION,
        "INV-1 violated: campaign {} percentages sum to {}",
        campaign.id,
        campaign.percentage_total()
    );
}

/// INV-2: Goal is positive.
pub fn assert_goal_positive(campaign: &Campaign) {
    assert!(
        campaign.goal > Decimal::ZERO,
        "INV-2 violated: campaign {} has non-positive goal ({})",
        campaign.id,
        campaign.goal
    );
}

/// INV-3: Raised amount equals the sum of ledger entries.
pub fn assert_raised_matches_ledger(totals: &LedgerTotals, entries: &[Contribution]) {
    let sum: Decimal =
        crate::ledger::raised_amount(entries).expect("INV-3 violated: ledger sum overflows");
    assert_eq!(
        totals.raised, sum,
        "INV-3 violated: raised {} != ledger sum {}",
        totals.raised, sum
    );
    assert_eq!(totals.contributions, entries.len() as u64);
}

/// INV-4: Completed checkpoints carry proof.
pub fn assert_completed_have_proof(campaign: &Campaign) {
    for (i, checkpoint) in campaign.checkpoints.iter().enumerate() {
        if checkpoint.completed {
            assert!(
                checkpoint.proof.is_some(),
                "INV-4 violated: checkpoint {} of campaign {} completed without proof",
                i,
                campaign.id
            );
        }
    }
}

/// INV-5: A completed checkpoint stays completed.
pub fn assert_completion_monotonic(before: &Campaign, after: &Campaign) {
    for (b, a) in before.checkpoints.iter().zip(&after.checkpoints) {
        if b.completed {
            assert!(
                a.completed,
                "INV-5 violated: checkpoint {:?} reverted from completed",
                b.id
            );
        }
    }
}

/// INV-6: At most one checkpoint is open, and nothing after it is.
pub fn assert_sequential_gating(report: &UnlockReport) {
    let open: Vec<usize> = report
        .phases
        .iter()
        .enumerate()
        .filter(|(_, p)| matches!(p, CheckpointPhase::Unlocked | CheckpointPhase::ProofSubmitted))
        .map(|(i, _)| i)
        .collect();
    assert!(open.len() <= 1, "INV-6 violated: open checkpoints {open:?}");
    if let Some(&index) = open.first() {
        assert!(
            report.phases[..index]
                .iter()
                .all(|p| *p == CheckpointPhase::Completed),
            "INV-6 violated: checkpoint {index} open before its predecessors completed"
        );
        assert!(
            report.phases[index + 1..]
                .iter()
                .all(|p| *p == CheckpointPhase::Locked),
            "INV-6 violated: checkpoints after {index} are not locked"
        );
    }
}

/// Run all stateless campaign invariants.
pub fn assert_all_campaign_invariants(campaign: &Campaign) {
    assert_percentages_sum_to_100(campaign);
    assert_goal_positive(campaign);
    assert_completed_have_proof(campaign);
}
