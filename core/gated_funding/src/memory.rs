//! In-memory [`CampaignStore`] for tests and embedding.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::storage::CampaignStore;
use crate::types::{
    Campaign, CampaignId, CampaignUpdate, Contribution, ContributionId, CreatorId, DonorId,
    NewContribution,
};

#[derive(Default)]
struct Ledger {
    entries: Vec<Contribution>,
    tx_hashes: HashSet<String>,
}

/// Thread-safe store backed by maps behind tokio `RwLock`s.
#[derive(Default)]
pub struct MemoryStore {
    next_campaign_id: AtomicU64,
    campaigns: RwLock<BTreeMap<CampaignId, Campaign>>,
    ledger: RwLock<Ledger>,
    updates: RwLock<Vec<CampaignUpdate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn allocate_campaign_id(&self) -> Result<CampaignId> {
        Ok(CampaignId(
            self.next_campaign_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(&id).cloned())
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        Ok(self.campaigns.read().await.values().cloned().collect())
    }

    async fn campaigns_by_creator(&self, creator: &CreatorId) -> Result<Vec<Campaign>> {
        Ok(self
            .campaigns
            .read()
            .await
            .values()
            .filter(|c| &c.creator == creator)
            .cloned()
            .collect())
    }

    async fn append_contribution(&self, entry: NewContribution) -> Result<Option<Contribution>> {
        let mut ledger = self.ledger.write().await;
        if let Some(hash) = entry.source.tx_hash() {
            if !ledger.tx_hashes.insert(hash.to_string()) {
                return Ok(None);
            }
        }
        let id = ContributionId(ledger.entries.len() as u64);
        let contribution = entry.into_contribution(id);
        ledger.entries.push(contribution.clone());
        Ok(Some(contribution))
    }

    async fn contributions(&self, campaign: CampaignId) -> Result<Vec<Contribution>> {
        Ok(self
            .ledger
            .read()
            .await
            .entries
            .iter()
            .filter(|c| c.campaign_id == campaign)
            .cloned()
            .collect())
    }

    async fn contributions_by_donor(&self, donor: &DonorId) -> Result<Vec<Contribution>> {
        Ok(self
            .ledger
            .read()
            .await
            .entries
            .iter()
            .filter(|c| c.donor.as_ref() == Some(donor))
            .cloned()
            .collect())
    }

    async fn append_update(&self, update: &CampaignUpdate) -> Result<()> {
        self.updates.write().await.push(update.clone());
        Ok(())
    }

    async fn updates(&self, campaign: CampaignId) -> Result<Vec<CampaignUpdate>> {
        Ok(self
            .updates
            .read()
            .await
            .iter()
            .filter(|u| u.campaign_id == campaign)
            .cloned()
            .collect())
    }
}
