use std::sync::Arc;

use rust_decimal::Decimal;

use crate::invariants::{
    assert_all_campaign_invariants, assert_completion_monotonic, assert_sequential_gating,
};
use crate::{
    CampaignId, CampaignStatus, Category, CheckpointPhase, ContributionRequest, CreatorId,
    DonorId, FundingError, FundingService, MemoryStore, NewCampaign, NewCheckpoint,
    StateTransitionError, ValidationError, ViolationKind,
};

fn setup() -> FundingService {
    FundingService::new(Arc::new(MemoryStore::new()))
}

fn new_campaign(percentages: &[u8]) -> NewCampaign {
    NewCampaign {
        creator: CreatorId("foundation".to_string()),
        title: "Education for All".to_string(),
        description: "Three schools for rural communities".to_string(),
        story: String::new(),
        category: Category::Education,
        goal: Decimal::from(1_000),
        checkpoints: percentages
            .iter()
            .enumerate()
            .map(|(i, p)| NewCheckpoint {
                title: format!("Checkpoint {}", i + 1),
                description: String::new(),
                percentage: *p,
            })
            .collect(),
        ends_at: None,
    }
}

async fn fund(service: &FundingService, id: CampaignId, donor: &str, amount: i64) {
    service
        .record_contribution(
            id,
            ContributionRequest::direct(Some(DonorId(donor.to_string())), Decimal::from(amount)),
        )
        .await
        .unwrap();
}

async fn prove_and_approve(service: &FundingService, id: CampaignId, index: usize) {
    service
        .submit_proof(id, index, format!("ipfs://proof-{index}"), None)
        .await
        .unwrap();
    service.approve_checkpoint(id, index).await.unwrap();
}

#[tokio::test]
async fn test_create_campaign_starts_unfunded() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[20, 30, 50])).await.unwrap();

    assert_all_campaign_invariants(&campaign);
    assert_eq!(campaign.status, CampaignStatus::Active);
    assert_eq!(service.raised_amount(campaign.id).await.unwrap(), Decimal::ZERO);
    assert_eq!(service.backer_count(campaign.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_campaign_rejects_sum_90_and_persists_nothing() {
    let service = setup();
    let err = service
        .create_campaign(new_campaign(&[30, 30, 30]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FundingError::Validation(ValidationError::PercentageSum { total: 90 })
    );
    assert!(service.list_overviews().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_campaign_ids_are_sequential() {
    let service = setup();
    let a = service.create_campaign(new_campaign(&[100])).await.unwrap();
    let b = service.create_campaign(new_campaign(&[100])).await.unwrap();
    assert_eq!(a.id, CampaignId(0));
    assert_eq!(b.id, CampaignId(1));
}

#[tokio::test]
async fn test_unknown_campaign_is_not_found() {
    let service = setup();
    assert_eq!(
        service.overview(CampaignId(42)).await.unwrap_err(),
        FundingError::CampaignNotFound(CampaignId(42))
    );
}

#[tokio::test]
async fn test_remove_checkpoint_redistributes() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[25, 25, 50])).await.unwrap();

    let campaign = service.remove_checkpoint(campaign.id, 2).await.unwrap();
    let shares: Vec<u8> = campaign.checkpoints.iter().map(|c| c.percentage).collect();
    assert_eq!(shares, vec![50, 50]);
    assert_all_campaign_invariants(&campaign);

    let stored = service.campaign(campaign.id).await.unwrap();
    assert_eq!(stored, campaign);
}

#[tokio::test]
async fn test_add_checkpoint_redistributes() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[60, 40])).await.unwrap();

    let campaign = service
        .add_checkpoint(campaign.id, "Reporting".to_string(), "Publish results".to_string())
        .await
        .unwrap();
    let shares: Vec<u8> = campaign.checkpoints.iter().map(|c| c.percentage).collect();
    assert_eq!(shares, vec![34, 33, 33]);
    assert_eq!(campaign.checkpoints[2].title, "Reporting");
}

#[tokio::test]
async fn test_percentage_mismatch_keeps_previous_state() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[20, 30, 50])).await.unwrap();

    let err = service
        .update_checkpoint_percentage(campaign.id, 0, 25)
        .await
        .unwrap_err();
    assert_eq!(err, FundingError::PercentageMismatch { total: 105 });
    assert_eq!(service.campaign(campaign.id).await.unwrap(), campaign);

    let updated = service
        .set_checkpoint_percentages(campaign.id, vec![25, 25, 50])
        .await
        .unwrap();
    assert_eq!(updated.checkpoints[0].percentage, 25);
    assert_all_campaign_invariants(&updated);
}

#[tokio::test]
async fn test_edits_rejected_once_funding_started() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[50, 50])).await.unwrap();
    fund(&service, campaign.id, "alice", 10).await;

    let err = service.remove_checkpoint(campaign.id, 1).await.unwrap_err();
    assert_eq!(
        err,
        FundingError::StateTransition(StateTransitionError::FundingStarted(campaign.id))
    );
    assert_eq!(service.campaign(campaign.id).await.unwrap().checkpoints.len(), 2);
}

#[tokio::test]
async fn test_sequential_gating_at_full_funding() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[20, 30, 50])).await.unwrap();
    let id = campaign.id;
    fund(&service, id, "alice", 1_000).await;

    prove_and_approve(&service, id, 0).await;

    let report = service.unlock_status(id).await.unwrap();
    assert_eq!(
        report.phases,
        vec![
            CheckpointPhase::Completed,
            CheckpointPhase::Unlocked,
            CheckpointPhase::Locked
        ]
    );
    assert_sequential_gating(&report);

    let err = service
        .submit_proof(id, 2, "ipfs://too-early".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FundingError::StateTransition(StateTransitionError::Checkpoint {
            index: 2,
            phase: CheckpointPhase::Locked,
            action: "submit proof",
        })
    );
}

#[tokio::test]
async fn test_full_progression_to_completion() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[20, 30, 50])).await.unwrap();
    let id = campaign.id;

    fund(&service, id, "alice", 200).await;
    prove_and_approve(&service, id, 0).await;
    let before = service.campaign(id).await.unwrap();

    // 20% funded: checkpoint 1 needs 50% cumulative.
    assert_eq!(
        service.unlock_status(id).await.unwrap().phases[1],
        CheckpointPhase::Locked
    );

    fund(&service, id, "bob", 800).await;
    prove_and_approve(&service, id, 1).await;
    prove_and_approve(&service, id, 2).await;

    let after = service.campaign(id).await.unwrap();
    assert_completion_monotonic(&before, &after);
    assert!(after.checkpoints.iter().all(|c| c.completed));
    assert_all_campaign_invariants(&after);

    let overview = service.overview(id).await.unwrap();
    assert_eq!(overview.current_checkpoint, None);
    assert_eq!(overview.percent_funded, Decimal::from(100));
}

#[tokio::test]
async fn test_approve_requires_submitted_proof() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[100])).await.unwrap();
    fund(&service, campaign.id, "alice", 1_000).await;

    let err = service.approve_checkpoint(campaign.id, 0).await.unwrap_err();
    assert_eq!(
        err,
        FundingError::StateTransition(StateTransitionError::Checkpoint {
            index: 0,
            phase: CheckpointPhase::Unlocked,
            action: "approve",
        })
    );

    prove_and_approve(&service, campaign.id, 0).await;

    // Approving again is rejected; the checkpoint stays completed.
    let err = service.approve_checkpoint(campaign.id, 0).await.unwrap_err();
    assert!(matches!(
        err,
        FundingError::StateTransition(StateTransitionError::Checkpoint {
            phase: CheckpointPhase::Completed,
            ..
        })
    ));
    assert!(service.campaign(campaign.id).await.unwrap().checkpoints[0].completed);
}

#[tokio::test]
async fn test_submit_proof_twice_is_rejected() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[100])).await.unwrap();
    fund(&service, campaign.id, "alice", 1_000).await;

    service
        .submit_proof(campaign.id, 0, "https://example.org/a".to_string(), None)
        .await
        .unwrap();
    let err = service
        .submit_proof(campaign.id, 0, "https://example.org/b".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FundingError::StateTransition(StateTransitionError::Checkpoint {
            phase: CheckpointPhase::ProofSubmitted,
            ..
        })
    ));

    let stored = service.campaign(campaign.id).await.unwrap();
    assert_eq!(
        stored.checkpoints[0].proof.as_ref().map(|p| p.uri.as_str()),
        Some("https://example.org/a")
    );
}

#[tokio::test]
async fn test_empty_proof_uri_is_invalid() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[100])).await.unwrap();
    let err = service
        .submit_proof(campaign.id, 0, "   ".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FundingError::Validation(ValidationError::Empty { field: "proof uri" })
    );
}

#[tokio::test]
async fn test_corrupted_campaign_fails_closed() {
    let store = Arc::new(MemoryStore::new());
    let service = FundingService::new(store.clone());
    let mut campaign = service.create_campaign(new_campaign(&[50, 50])).await.unwrap();
    fund(&service, campaign.id, "alice", 1_000).await;

    // Simulate corrupted persisted state.
    campaign.checkpoints[1].percentage = 10;
    crate::CampaignStore::save_campaign(store.as_ref(), &campaign)
        .await
        .unwrap();

    let report = service.unlock_status(campaign.id).await.unwrap();
    assert!(report.phases.iter().all(|p| *p == CheckpointPhase::Locked));
    assert_eq!(
        report.violation.map(|v| v.kind),
        Some(ViolationKind::PercentageSum { total: 60 })
    );

    let err = service
        .submit_proof(campaign.id, 0, "ipfs://proof".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FundingError::InvariantViolation(_)));
}

#[tokio::test]
async fn test_archived_campaign_is_frozen() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign(&[100])).await.unwrap();
    let archived = service.archive_campaign(campaign.id).await.unwrap();
    assert_eq!(archived.status, CampaignStatus::Archived);

    let err = service
        .record_contribution(
            campaign.id,
            ContributionRequest::direct(None, Decimal::from(5)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FundingError::StateTransition(StateTransitionError::Archived(campaign.id))
    );
    assert!(service.archive_campaign(campaign.id).await.is_err());

    // Still readable.
    assert_eq!(
        service.overview(campaign.id).await.unwrap().campaign.status,
        CampaignStatus::Archived
    );
}
