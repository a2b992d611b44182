//! Lead tier progression engine
//!
//! Turns engagement callbacks into tier changes:
//! classify → look up lead → compute next tier → CAS write → append
//! progression → publish → trigger campaign (warm/hot only).
//!
//! Every failure is local to its event. A batch always runs to completion and
//! reports what happened to each event.

use std::sync::Arc;

use leadgen_common::events::{EventBus, LeadEvent};
use leadgen_common::tier::{classify_event, next_tier};
use leadgen_common::{time, Tier};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::campaign::{CampaignTrigger, CampaignTriggerRequest};
use crate::ingest::{DeliveredEvent, WebhookEvent};
use crate::locks::LeadLocks;
use crate::store::{Lead, LeadStore, ProgressionLog, ProgressionRecord, TierWrite};

/// CAS retries before an event is reported as failed
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Why an event was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Element of the delivery could not be decoded as an event
    MalformedEvent,
    /// Neither `email` nor `user_id` was present
    MissingEmail,
    /// No partition holds the email
    LeadNotFound,
}

/// What happened to one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Tier increased; the record was produced
    Progressed(ProgressionRecord),
    /// Lead already at or above the implied tier
    Unchanged { email: String, tier: Tier },
    /// Event name is not an engagement signal
    Ignored { event_name: String },
    Skipped { reason: SkipReason, email: Option<String> },
    /// Storage error; no progression was recorded
    Failed { email: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    pub index: usize,
    pub email: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEvent {
    pub index: usize,
    pub email: String,
    pub error: String,
}

/// Result of processing one webhook delivery
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub events_received: usize,
    /// Events that reached the transition rule (progressed or unchanged)
    pub events_processed: usize,
    pub events_skipped: usize,
    pub events_ignored: usize,
    pub events_failed: usize,
    pub progressions: Vec<ProgressionRecord>,
    pub skipped: Vec<SkippedEvent>,
    pub failed: Vec<FailedEvent>,
}

impl BatchSummary {
    fn record(&mut self, index: usize, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Progressed(record) => {
                self.events_processed += 1;
                self.progressions.push(record);
            }
            EventOutcome::Unchanged { .. } => self.events_processed += 1,
            EventOutcome::Ignored { .. } => self.events_ignored += 1,
            EventOutcome::Skipped { reason, email } => {
                self.events_skipped += 1;
                self.skipped.push(SkippedEvent { index, email, reason });
            }
            EventOutcome::Failed { email, error } => {
                self.events_failed += 1;
                self.failed.push(FailedEvent { index, email, error });
            }
        }
    }
}

/// Tier progression state machine over pluggable storage and dispatch
pub struct ProgressionEngine {
    leads: Arc<dyn LeadStore>,
    log: Arc<dyn ProgressionLog>,
    trigger: Arc<dyn CampaignTrigger>,
    locks: LeadLocks,
    event_bus: EventBus,
}

impl ProgressionEngine {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        log: Arc<dyn ProgressionLog>,
        trigger: Arc<dyn CampaignTrigger>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            leads,
            log,
            trigger,
            locks: LeadLocks::new(),
            event_bus,
        }
    }

    /// Process a delivery in order; never fails as a whole
    pub async fn process_batch(&self, events: Vec<DeliveredEvent>) -> BatchSummary {
        let mut summary = BatchSummary {
            events_received: events.len(),
            ..Default::default()
        };

        for (index, delivered) in events.into_iter().enumerate() {
            let outcome = match delivered {
                Ok(event) => self.process_event(&event).await,
                Err(reason) => {
                    warn!(index, error = %reason, "Skipping malformed webhook event");
                    EventOutcome::Skipped {
                        reason: SkipReason::MalformedEvent,
                        email: None,
                    }
                }
            };
            summary.record(index, outcome);
        }

        info!(
            received = summary.events_received,
            processed = summary.events_processed,
            progressions = summary.progressions.len(),
            skipped = summary.events_skipped,
            ignored = summary.events_ignored,
            failed = summary.events_failed,
            "Webhook batch processed"
        );

        summary
    }

    /// Process a delivery on its own task
    ///
    /// The batch runs to completion even if the caller is dropped, so a tier
    /// write is never left without its progression record and campaign.
    pub async fn process_batch_detached(
        self: Arc<Self>,
        events: Vec<DeliveredEvent>,
    ) -> Result<BatchSummary, JoinError> {
        tokio::spawn(async move { self.process_batch(events).await }).await
    }

    /// Apply one engagement event
    ///
    /// Cancelling this future mid-way can leave a tier write without its log
    /// entry; callers that may be dropped go through
    /// [`process_batch_detached`](Self::process_batch_detached).
    pub async fn process_event(&self, event: &WebhookEvent) -> EventOutcome {
        let Some(email) = event.lead_email() else {
            warn!(event_name = %event.event_name, "Event missing email/user_id");
            return EventOutcome::Skipped {
                reason: SkipReason::MissingEmail,
                email: None,
            };
        };

        let Some(engagement) = classify_event(&event.event_name) else {
            debug!(event_name = %event.event_name, "Ignoring non-engagement event");
            return EventOutcome::Ignored {
                event_name: event.event_name.clone(),
            };
        };

        let guard = self.locks.lock(email).await;

        let mut applied: Option<(Lead, Tier)> = None;
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let lead = match self.leads.find_by_email(email).await {
                Ok(Some(lead)) => lead,
                Ok(None) => {
                    warn!(email, "Lead not found in any partition");
                    return EventOutcome::Skipped {
                        reason: SkipReason::LeadNotFound,
                        email: Some(email.to_string()),
                    };
                }
                Err(e) => {
                    error!(email, error = %e, "Lead lookup failed");
                    return EventOutcome::Failed {
                        email: email.to_string(),
                        error: e.to_string(),
                    };
                }
            };

            let new_tier = next_tier(lead.tier, engagement);
            if new_tier == lead.tier {
                debug!(email, tier = %lead.tier, engagement = %engagement, "Tier unchanged");
                return EventOutcome::Unchanged {
                    email: email.to_string(),
                    tier: lead.tier,
                };
            }

            match self
                .leads
                .compare_and_set_tier(lead.partition, email, lead.tier, new_tier, time::now())
                .await
            {
                Ok(TierWrite::Applied) => {
                    applied = Some((lead, new_tier));
                    break;
                }
                Ok(TierWrite::Conflict { current }) => {
                    warn!(email, expected = %lead.tier, current = %current, attempt, "Tier changed concurrently, re-reading");
                }
                Ok(TierWrite::Missing) => {
                    warn!(email, partition = %lead.partition, attempt, "Lead vanished during update, re-reading");
                }
                Err(e) => {
                    error!(email, error = %e, "Tier update failed");
                    return EventOutcome::Failed {
                        email: email.to_string(),
                        error: e.to_string(),
                    };
                }
            }
        }

        let Some((lead, new_tier)) = applied else {
            return EventOutcome::Failed {
                email: email.to_string(),
                error: format!("Tier update conflicted {} times", MAX_WRITE_ATTEMPTS),
            };
        };

        info!(
            email,
            partition = %lead.partition,
            from = %lead.tier,
            to = %new_tier,
            engagement = %engagement,
            "Lead tier progressed"
        );

        let record = ProgressionRecord {
            email: email.to_string(),
            event_type: engagement,
            previous_tier: lead.tier,
            new_tier,
            icp_score: lead.icp_score,
            timestamp: event.occurred_at(),
            campaign_id: event.campaign_id.clone(),
            campaign_name: event.campaign_name.clone(),
        };

        // The tier write is already durable; a log failure does not undo it
        if let Err(e) = self.log.append(&record).await {
            error!(
                email,
                error = %e,
                "Progression log append failed; tier update stands without an audit entry"
            );
        }

        self.event_bus.emit_lossy(LeadEvent::LeadTierProgressed {
            email: email.to_string(),
            partition: lead.partition,
            event_type: engagement,
            previous_tier: lead.tier,
            new_tier,
            timestamp: record.timestamp,
        });

        drop(guard);

        if new_tier.triggers_campaign() {
            self.dispatch_campaign(&lead, new_tier).await;
        }

        EventOutcome::Progressed(record)
    }

    async fn dispatch_campaign(&self, lead: &Lead, tier: Tier) {
        let request = match CampaignTriggerRequest::for_lead(lead, tier) {
            Ok(request) => request,
            Err(e) => {
                warn!(email = %lead.email, error = %e, "Campaign trigger not built");
                return;
            }
        };

        info!(email = %request.email, campaign = %request.campaign_name, "Triggering {} campaign", tier);

        match self.trigger.trigger(&request).await {
            Ok(receipt) => {
                self.event_bus.emit_lossy(LeadEvent::CampaignTriggered {
                    email: request.email,
                    tier,
                    campaign_name: request.campaign_name,
                    delivered: receipt.delivered,
                    timestamp: time::now(),
                });
            }
            Err(e) => {
                warn!(email = %request.email, error = %e, "Campaign trigger failed (not retried)");
                self.event_bus.emit_lossy(LeadEvent::CampaignTriggerFailed {
                    email: request.email,
                    tier,
                    error: e.to_string(),
                    timestamp: time::now(),
                });
            }
        }
    }
}
