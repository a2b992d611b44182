//! MoEngage campaign trigger
//!
//! Publishes a `lead_qualified_<tier>` event for the lead through the MoEngage
//! Data API. Campaigns configured in MoEngage react to that event.

use super::{CampaignTrigger, CampaignTriggerRequest, TriggerError, TriggerReceipt};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("leadgen-tp/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// MoEngage Data API client used for campaign triggering
pub struct MoEngageTrigger {
    http_client: reqwest::Client,
    base_url: String,
    workspace_id: String,
    data_api_key: String,
}

impl MoEngageTrigger {
    pub fn new(
        base_url: impl Into<String>,
        workspace_id: impl Into<String>,
        data_api_key: impl Into<String>,
    ) -> Result<Self, TriggerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TriggerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            workspace_id: workspace_id.into(),
            data_api_key: data_api_key.into(),
        })
    }

    fn events_url(&self) -> String {
        format!("{}/v1/events", self.base_url)
    }
}

/// Event name published for a tier qualification
pub fn action_name(request: &CampaignTriggerRequest) -> String {
    format!("lead_qualified_{}", request.tier)
}

/// Data API payload for one trigger
pub fn build_payload(request: &CampaignTriggerRequest, timestamp: i64) -> Value {
    let snapshot = &request.attributes;

    json!({
        "type": "event",
        "customer_id": request.email,
        "actions": [{
            "action": action_name(request),
            "timestamp": timestamp,
            "attributes": {
                "campaign_name": request.campaign_name,
                "tier": request.tier,
                "segment": snapshot.segment,
                "name": snapshot.name,
                "title": snapshot.title,
                "company": snapshot.company,
                "industry": snapshot.industry,
                "city": snapshot.city,
                "icp_score": snapshot.icp_score,
            }
        }]
    })
}

#[async_trait]
impl CampaignTrigger for MoEngageTrigger {
    async fn trigger(&self, request: &CampaignTriggerRequest) -> Result<TriggerReceipt, TriggerError> {
        let payload = build_payload(request, leadgen_common::time::now().timestamp());

        tracing::debug!(
            email = %request.email,
            action = %action_name(request),
            "Publishing MoEngage qualification event"
        );

        let response = self
            .http_client
            .post(self.events_url())
            .basic_auth(&self.workspace_id, Some(&self.data_api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TriggerError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TriggerError::Unauthorized);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TriggerError::Api(status.as_u16(), error_text));
        }

        tracing::info!(
            email = %request.email,
            campaign = %request.campaign_name,
            "MoEngage campaign trigger accepted"
        );

        Ok(TriggerReceipt {
            delivered: true,
            backend: "moengage",
        })
    }
}
