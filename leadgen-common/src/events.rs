//! Lead event types and the in-process event bus
//!
//! Services publish [`LeadEvent`]s on an [`EventBus`]; SSE handlers and other
//! in-process listeners subscribe to it.

use crate::{EngagementType, Partition, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the lead tier services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LeadEvent {
    /// A lead moved to a higher tier
    LeadTierProgressed {
        email: String,
        partition: Partition,
        event_type: EngagementType,
        previous_tier: Tier,
        new_tier: Tier,
        timestamp: DateTime<Utc>,
    },

    /// A campaign trigger was handed to the dispatch collaborator
    CampaignTriggered {
        email: String,
        tier: Tier,
        campaign_name: String,
        delivered: bool,
        timestamp: DateTime<Utc>,
    },

    /// Campaign dispatch failed (not retried)
    CampaignTriggerFailed {
        email: String,
        tier: Tier,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl LeadEvent {
    /// Event name used for SSE `event:` lines
    pub fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::LeadTierProgressed { .. } => "LeadTierProgressed",
            LeadEvent::CampaignTriggered { .. } => "CampaignTriggered",
            LeadEvent::CampaignTriggerFailed { .. } => "CampaignTriggerFailed",
        }
    }

    pub fn email(&self) -> &str {
        match self {
            LeadEvent::LeadTierProgressed { email, .. }
            | LeadEvent::CampaignTriggered { email, .. }
            | LeadEvent::CampaignTriggerFailed { email, .. } => email,
        }
    }
}

/// Broadcast bus for [`LeadEvent`]s
///
/// Publishing never blocks; slow subscribers observe `Lagged` instead of
/// holding up producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LeadEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LeadEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: LeadEvent,
    ) -> Result<usize, broadcast::error::SendError<LeadEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LeadEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
