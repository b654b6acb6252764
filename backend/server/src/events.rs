//! Chain event types consumed by the contribution indexer.
//!
//! Only the `funded` topic feeds the ledger. Everything else the campaign
//! contract emits is decoded far enough to be counted and skipped.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gated_funding::{CampaignId, ContributionRequest, ContributionSource, DonorId};

/// Recognised event kinds from the campaign contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A donor paid into a campaign (`funded` topic).
    Funded,
    /// Anything else emitted by the contract.
    Unknown,
}

impl EventKind {
    /// Parse the leading topic symbol string produced by Soroban into an [`EventKind`].
    pub fn from_topic(topic: &str) -> Self {
        match topic {
            "funded" => Self::Funded,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funded => "funded",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded `funded` event, still in raw on-chain units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContribution {
    pub campaign_id: CampaignId,
    pub donor: Option<DonorId>,
    /// Integer amount in the asset's smallest unit.
    pub raw_amount: i128,
    pub tx_hash: String,
    pub ledger: u64,
}

impl ChainContribution {
    /// Scale the raw amount by `decimals` and build a ledger request.
    ///
    /// Returns `None` when the scale is out of range for [`Decimal`].
    pub fn into_request(self, decimals: u32) -> Option<(CampaignId, ContributionRequest)> {
        let amount = Decimal::try_from_i128_with_scale(self.raw_amount, decimals).ok()?;
        Some((
            self.campaign_id,
            ContributionRequest {
                donor: self.donor,
                amount,
                source: ContributionSource::Chain {
                    tx_hash: self.tx_hash,
                    ledger: self.ledger,
                },
            },
        ))
    }
}
