//! Log-only campaign trigger
//!
//! Used when no campaign backend is configured. Records the trigger in the
//! log and reports it as not delivered.

use super::{CampaignTrigger, CampaignTriggerRequest, TriggerError, TriggerReceipt};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LoggingTrigger;

#[async_trait]
impl CampaignTrigger for LoggingTrigger {
    async fn trigger(&self, request: &CampaignTriggerRequest) -> Result<TriggerReceipt, TriggerError> {
        info!(
            email = %request.email,
            tier = %request.tier,
            campaign = %request.campaign_name,
            "Campaign trigger (no campaign backend configured)"
        );

        Ok(TriggerReceipt {
            delivered: false,
            backend: "log",
        })
    }
}
