use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::discovery::ExploreFilter;
use crate::invariants::assert_raised_matches_ledger;
use crate::{
    CampaignId, CampaignStore, Category, CheckpointPhase, ContributionRequest, ContributionSource,
    CreatorId, DonorId, FundingError, FundingService, MemoryStore, NewCampaign, NewCheckpoint,
    NewContribution, StateTransitionError, ValidationError, ViolationKind,
};

fn setup() -> FundingService {
    FundingService::new(Arc::new(MemoryStore::new()))
}

fn new_campaign(creator: &str, goal: i64) -> NewCampaign {
    NewCampaign {
        creator: CreatorId(creator.to_string()),
        title: "Medical Supplies for Rural Clinic".to_string(),
        description: String::new(),
        story: String::new(),
        category: Category::Healthcare,
        goal: Decimal::from(goal),
        checkpoints: vec![
            NewCheckpoint {
                title: "Equipment".to_string(),
                description: String::new(),
                percentage: 40,
            },
            NewCheckpoint {
                title: "Staffing".to_string(),
                description: String::new(),
                percentage: 60,
            },
        ],
        ends_at: None,
    }
}

fn donor(name: &str) -> Option<DonorId> {
    Some(DonorId(name.to_string()))
}

async fn give(service: &FundingService, id: CampaignId, who: Option<DonorId>, amount: Decimal) {
    service
        .record_contribution(id, ContributionRequest::direct(who, amount))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_record_contribution_updates_totals() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign("c", 500)).await.unwrap();

    let receipt = service
        .record_contribution(
            campaign.id,
            ContributionRequest::direct(donor("alice"), Decimal::new(1050, 2)),
        )
        .await
        .unwrap();
    assert_eq!(receipt.totals.raised, Decimal::new(1050, 2));
    assert_eq!(receipt.totals.backers, 1);
    assert_eq!(
        receipt.contribution.map(|c| c.amount),
        Some(Decimal::new(1050, 2))
    );
}

#[tokio::test]
async fn test_non_positive_amount_rejected() {
    let service = setup();
    let campaign = service.create_campaign(new_campaign("c", 500)).await.unwrap();

    for amount in [Decimal::ZERO, Decimal::from(-3)] {
        let err = service
            .record_contribution(campaign.id, ContributionRequest::direct(None, amount))
            .await
            .unwrap_err();
        assert_eq!(err, FundingError::Validation(ValidationError::NonPositiveAmount));
    }
    assert!(service.contributions(campaign.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backer_count_rules() {
    let service = setup();
    let id = service.create_campaign(new_campaign("c", 500)).await.unwrap().id;

    give(&service, id, donor("alice"), Decimal::from(10)).await;
    give(&service, id, donor("alice"), Decimal::from(10)).await;
    give(&service, id, None, Decimal::from(1)).await;
    give(&service, id, None, Decimal::from(1)).await;
    give(&service, id, donor("bob"), Decimal::from(3)).await;

    assert_eq!(service.backer_count(id).await.unwrap(), 4);
    assert_eq!(service.raised_amount(id).await.unwrap(), Decimal::from(25));

    let entries = service.contributions(id).await.unwrap();
    assert_raised_matches_ledger(&service.totals(id).await.unwrap(), &entries);
}

#[tokio::test]
async fn test_contributions_are_scoped_per_campaign() {
    let service = setup();
    let a = service.create_campaign(new_campaign("c", 500)).await.unwrap().id;
    let b = service.create_campaign(new_campaign("c", 500)).await.unwrap().id;

    give(&service, a, donor("alice"), Decimal::from(10)).await;
    give(&service, b, donor("alice"), Decimal::from(99)).await;

    assert_eq!(service.raised_amount(a).await.unwrap(), Decimal::from(10));
    assert_eq!(service.raised_amount(b).await.unwrap(), Decimal::from(99));
}

#[tokio::test]
async fn test_overfunding_is_accepted() {
    let service = setup();
    let id = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;
    give(&service, id, donor("whale"), Decimal::from(400)).await;

    let overview = service.overview(id).await.unwrap();
    assert_eq!(overview.totals.raised, Decimal::from(400));
    assert_eq!(overview.percent_funded, Decimal::from(400));
}

#[tokio::test]
async fn test_contribution_after_deadline_rejected() {
    let service = setup();
    let mut input = new_campaign("c", 100);
    input.ends_at = Some(Utc::now() - Duration::hours(1));
    let id = service.create_campaign(input).await.unwrap().id;

    let err = service
        .record_contribution(id, ContributionRequest::direct(None, Decimal::ONE))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FundingError::StateTransition(StateTransitionError::FundingClosed(id))
    );
}

#[tokio::test]
async fn test_duplicate_chain_transaction_recorded_once() {
    let service = setup();
    let id = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;
    let request = ContributionRequest {
        donor: donor("GABC123"),
        amount: Decimal::from(5),
        source: ContributionSource::Chain {
            tx_hash: "TX1".to_string(),
            ledger: 1_000,
        },
    };

    let first = service.record_contribution(id, request.clone()).await.unwrap();
    let second = service.record_contribution(id, request).await.unwrap();

    assert!(first.contribution.is_some());
    assert!(second.contribution.is_none());
    assert_eq!(second.totals.raised, Decimal::from(5));
    assert_eq!(second.totals.contributions, 1);
}

#[tokio::test]
async fn test_leaderboard_and_donor_summary() {
    let service = setup();
    let a = service.create_campaign(new_campaign("c", 500)).await.unwrap().id;
    let b = service.create_campaign(new_campaign("c", 500)).await.unwrap().id;

    give(&service, a, donor("alice"), Decimal::from(30)).await;
    give(&service, a, donor("bob"), Decimal::from(50)).await;
    give(&service, a, None, Decimal::from(90)).await;
    give(&service, b, donor("alice"), Decimal::from(5)).await;

    let board = service.leaderboard(a, 5).await.unwrap();
    let names: Vec<&str> = board.iter().map(|e| e.donor.0.as_str()).collect();
    assert_eq!(names, vec!["bob", "alice"]);

    let summary = service
        .donor_summary(DonorId("alice".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.total_donated, Decimal::from(35));
    assert_eq!(summary.campaigns_supported, vec![a, b]);
}

#[tokio::test]
async fn test_creator_dashboard_and_explore() {
    let service = setup();
    let mine = service.create_campaign(new_campaign("me", 100)).await.unwrap().id;
    let other = service.create_campaign(new_campaign("you", 100)).await.unwrap().id;
    give(&service, mine, donor("alice"), Decimal::from(50)).await;
    give(&service, other, donor("bob"), Decimal::from(10)).await;

    service
        .submit_proof(mine, 0, "ipfs://receipts".to_string(), None)
        .await
        .unwrap();

    let dashboard = service
        .creator_dashboard(CreatorId("me".to_string()))
        .await
        .unwrap();
    assert_eq!(dashboard.campaigns.len(), 1);
    assert_eq!(dashboard.total_raised, Decimal::from(50));
    assert_eq!(dashboard.pending_approvals, 1);

    let funded = service
        .explore(&ExploreFilter {
            min_percent_funded: Some(Decimal::from(40)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(funded.len(), 1);
    assert_eq!(funded[0].campaign.id, mine);
}

#[tokio::test]
async fn test_updates_are_listed_in_order() {
    let service = setup();
    let id = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;

    service
        .post_update(id, "Construction Begins!".to_string(), "Site cleared.".to_string())
        .await
        .unwrap();
    service
        .post_update(id, "Materials Purchased".to_string(), String::new())
        .await
        .unwrap();

    let titles: Vec<String> = service
        .updates(id)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.title)
        .collect();
    assert_eq!(titles, vec!["Construction Begins!", "Materials Purchased"]);

    assert!(service
        .post_update(id, " ".to_string(), String::new())
        .await
        .is_err());
}

#[tokio::test]
async fn test_contribution_that_would_overflow_is_rejected() {
    let service = setup();
    let id = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;
    let other = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;
    give(&service, id, None, Decimal::MAX).await;
    give(&service, other, donor("alice"), Decimal::from(5)).await;

    let err = service
        .record_contribution(id, ContributionRequest::direct(None, Decimal::ONE))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FundingError::Validation(ValidationError::AmountOverflow {
            amount: Decimal::ONE
        })
    );

    // Ledger untouched; every read still works.
    assert_eq!(service.contributions(id).await.unwrap().len(), 1);
    assert_eq!(service.raised_amount(id).await.unwrap(), Decimal::MAX);
    assert!(service.overview(id).await.unwrap().violation.is_none());
    assert_eq!(service.list_overviews().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_overflowing_ledger_fails_closed_without_hiding_other_campaigns() {
    let store = Arc::new(MemoryStore::new());
    let service = FundingService::new(store.clone());
    let id = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;
    let other = service.create_campaign(new_campaign("c", 100)).await.unwrap().id;

    // Entries written behind the service's back.
    for amount in [Decimal::MAX, Decimal::ONE] {
        store
            .append_contribution(NewContribution {
                campaign_id: id,
                donor: None,
                amount,
                timestamp: Utc::now(),
                source: ContributionSource::Direct,
            })
            .await
            .unwrap();
    }

    let overview = service.overview(id).await.unwrap();
    assert_eq!(
        overview.violation.map(|v| v.kind),
        Some(ViolationKind::LedgerOverflow)
    );
    assert!(overview
        .checkpoints
        .iter()
        .all(|c| c.phase == CheckpointPhase::Locked));

    let report = service.unlock_status(id).await.unwrap();
    assert!(report.is_fail_closed());

    let listed = service.list_overviews().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed
        .iter()
        .any(|o| o.campaign.id == other && o.violation.is_none()));

    assert!(matches!(
        service.raised_amount(id).await.unwrap_err(),
        FundingError::InvariantViolation(_)
    ));
    assert!(matches!(
        service
            .submit_proof(id, 0, "ipfs://proof".to_string(), None)
            .await
            .unwrap_err(),
        FundingError::InvariantViolation(_)
    ));
}
