//! Campaign trigger dispatch
//!
//! When a lead qualifies into warm or hot, an external campaign system is
//! told about it. Dispatch is fire-and-forget from the engine's point of view:
//! failures come back as a typed [`TriggerError`] which the engine logs and
//! publishes, but never propagates or retries.

use async_trait::async_trait;
use leadgen_common::{Partition, Tier};
use serde::Serialize;
use thiserror::Error;

use crate::store::Lead;

pub mod logging;
pub mod moengage;

pub use logging::LoggingTrigger;
pub use moengage::MoEngageTrigger;

/// Campaign dispatch errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Campaign API error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Tier {0} does not start a campaign")]
    NotQualifying(Tier),
}

/// Attribute snapshot sent with a trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadSnapshot {
    pub name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub icp_score: f64,
    pub segment: Partition,
}

impl From<&Lead> for LeadSnapshot {
    fn from(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            title: lead.title.clone(),
            company: lead.company.clone(),
            industry: lead.industry.clone(),
            city: lead.city.clone(),
            icp_score: lead.icp_score,
            segment: lead.partition,
        }
    }
}

/// Everything a campaign system needs to start a tier campaign for one lead
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignTriggerRequest {
    pub email: String,
    pub tier: Tier,
    pub campaign_name: String,
    pub attributes: LeadSnapshot,
}

impl CampaignTriggerRequest {
    /// Build a request for a lead that just entered `tier`
    ///
    /// Fails for tiers that do not start a campaign.
    pub fn for_lead(lead: &Lead, tier: Tier) -> Result<Self, TriggerError> {
        if !tier.triggers_campaign() {
            return Err(TriggerError::NotQualifying(tier));
        }

        Ok(Self {
            email: lead.email.clone(),
            tier,
            campaign_name: campaign_name(tier, lead.partition),
            attributes: LeadSnapshot::from(lead),
        })
    }
}

/// `Auto-Warm Campaign - hni`, `Auto-Hot Campaign - partners`, ...
pub fn campaign_name(tier: Tier, partition: Partition) -> String {
    let label = match tier {
        Tier::Cold => "Cold",
        Tier::Warm => "Warm",
        Tier::Hot => "Hot",
    };
    format!("Auto-{} Campaign - {}", label, partition)
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerReceipt {
    /// Whether the request actually left the process
    pub delivered: bool,
    /// Name of the dispatch backend ("moengage", "log")
    pub backend: &'static str,
}

/// Outbound campaign notification
#[async_trait]
pub trait CampaignTrigger: Send + Sync {
    async fn trigger(&self, request: &CampaignTriggerRequest) -> Result<TriggerReceipt, TriggerError>;
}
