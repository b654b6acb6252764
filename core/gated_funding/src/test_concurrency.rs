use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::invariants::{assert_percentages_sum_to_100, assert_raised_matches_ledger};
use crate::{
    Category, ContributionRequest, CreatorId, DonorId, FundingError, FundingService, MemoryStore,
    NewCampaign, NewCheckpoint, StateTransitionError, ValidationError,
};

fn setup() -> FundingService {
    FundingService::new(Arc::new(MemoryStore::new()))
}

fn new_campaign() -> NewCampaign {
    NewCampaign {
        creator: CreatorId("creator".to_string()),
        title: "Community Garden".to_string(),
        description: String::new(),
        story: String::new(),
        category: Category::Community,
        goal: Decimal::from(10_000),
        checkpoints: vec![
            NewCheckpoint {
                title: "Land".to_string(),
                description: String::new(),
                percentage: 50,
            },
            NewCheckpoint {
                title: "Planting".to_string(),
                description: String::new(),
                percentage: 50,
            },
        ],
        ends_at: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_concurrent_contributions_both_count() {
    let service = setup();
    let id = service.create_campaign(new_campaign()).await.unwrap().id;

    let a = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .record_contribution(
                    id,
                    ContributionRequest::direct(
                        Some(DonorId("donorA".to_string())),
                        Decimal::from(10),
                    ),
                )
                .await
        })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .record_contribution(
                    id,
                    ContributionRequest::direct(
                        Some(DonorId("donorB".to_string())),
                        Decimal::from(15),
                    ),
                )
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(service.raised_amount(id).await.unwrap(), Decimal::from(25));
    assert_eq!(service.backer_count(id).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_contributions_match_ledger() {
    let service = setup();
    let id = service.create_campaign(new_campaign()).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..64u32 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let donor = Some(DonorId(format!("donor-{}", i % 16)));
            service
                .record_contribution(
                    id,
                    ContributionRequest::direct(donor, Decimal::from(i + 1)),
                )
                .await
        }));
    }

    // Each receipt reflects at least its own append.
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert!(receipt.totals.contributions >= 1);
    }

    let totals = service.totals(id).await.unwrap();
    assert_eq!(totals.raised, Decimal::from((1..=64).sum::<u32>()));
    assert_eq!(totals.backers, 16);
    assert_raised_matches_ledger(&totals, &service.contributions(id).await.unwrap());
}

#[derive(Clone, Copy, Debug)]
enum Edit {
    Add,
    RemoveFirst,
    FirstTakesAll,
    SetSingle,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_edits_keep_sum_at_100() {
    let service = setup();
    let id = service.create_campaign(new_campaign()).await.unwrap().id;

    let edits = [
        Edit::Add,
        Edit::RemoveFirst,
        Edit::FirstTakesAll,
        Edit::Add,
        Edit::SetSingle,
        Edit::RemoveFirst,
        Edit::Add,
        Edit::Add,
    ];
    let mut handles = Vec::new();
    for (i, edit) in edits.into_iter().enumerate() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let result = match edit {
                Edit::Add => service.add_checkpoint(id, format!("Extra {i}"), String::new()).await,
                Edit::RemoveFirst => service.remove_checkpoint(id, 0).await,
                Edit::FirstTakesAll => service.update_checkpoint_percentage(id, 0, 100).await,
                Edit::SetSingle => service.set_checkpoint_percentages(id, vec![100]).await,
            };
            (edit, result)
        }));
    }

    let mut added = 0;
    let mut removed = 0;
    for handle in handles {
        let (edit, result) = handle.await.unwrap();
        match (edit, result) {
            (Edit::Add, Ok(_)) => added += 1,
            (Edit::RemoveFirst, Ok(_)) => removed += 1,
            // Only valid when a single checkpoint was left at that moment.
            (Edit::FirstTakesAll | Edit::SetSingle, Ok(campaign)) => {
                assert_eq!(campaign.checkpoints.len(), 1)
            }
            (Edit::RemoveFirst, Err(FundingError::Validation(ValidationError::LastCheckpoint))) => {}
            (Edit::FirstTakesAll, Err(FundingError::PercentageMismatch { total })) => {
                assert!(total > 100)
            }
            (Edit::SetSingle, Err(FundingError::Validation(ValidationError::PercentageCount { .. }))) => {}
            (edit, result) => panic!("{edit:?} returned {result:?}"),
        }
    }

    let campaign = service.campaign(id).await.unwrap();
    assert_eq!(campaign.checkpoints.len(), 2 + added - removed);
    assert_percentages_sum_to_100(&campaign);
    let ids: HashSet<_> = campaign.checkpoints.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), campaign.checkpoints.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_batch_edits_apply_whole() {
    let service = setup();
    let id = service.create_campaign(new_campaign()).await.unwrap().id;

    let handles: Vec<_> = [vec![70, 30], vec![30, 70]]
        .into_iter()
        .map(|percentages| {
            let service = service.clone();
            tokio::spawn(async move { service.set_checkpoint_percentages(id, percentages).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let campaign = service.campaign(id).await.unwrap();
    let split: Vec<u8> = campaign.checkpoints.iter().map(|c| c.percentage).collect();
    assert!(split == [70, 30] || split == [30, 70], "mixed split {split:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_edit_racing_contribution_never_splits_state() {
    let service = setup();
    let id = service.create_campaign(new_campaign()).await.unwrap().id;

    let edit = {
        let service = service.clone();
        tokio::spawn(async move { service.remove_checkpoint(id, 1).await })
    };
    let give = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .record_contribution(id, ContributionRequest::direct(None, Decimal::from(5)))
                .await
        })
    };

    let edit = edit.await.unwrap();
    give.await.unwrap().unwrap();

    let campaign = service.campaign(id).await.unwrap();
    match edit {
        // Edit ran first: one checkpoint at 100%.
        Ok(_) => assert_eq!(campaign.checkpoints.len(), 1),
        // Contribution ran first: edit refused, list untouched.
        Err(err) => {
            assert_eq!(
                err,
                FundingError::StateTransition(StateTransitionError::FundingStarted(id))
            );
            assert_eq!(campaign.checkpoints.len(), 2);
        }
    }
    assert_percentages_sum_to_100(&campaign);
}
