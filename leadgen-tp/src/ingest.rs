//! Webhook delivery parsing
//!
//! A delivery is either a single event object or an array of them. Each
//! element is decoded on its own so one malformed element does not reject the
//! rest of the batch.

use chrono::{DateTime, TimeZone, Utc};
use leadgen_common::{time, Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Epoch values above this are taken as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Engagement callback as delivered by the messaging platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Platform customer id; used as the lead identifier when `email` is absent
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
    /// RFC 3339 string or epoch seconds/milliseconds
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub campaign_name: Option<String>,
}

/// One element of a delivery: decoded event or the reason it could not be
pub type DeliveredEvent = std::result::Result<WebhookEvent, String>;

impl WebhookEvent {
    /// Identifier used to look up the lead
    pub fn lead_email(&self) -> Option<&str> {
        [self.email.as_deref(), self.user_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }

    /// Time the engagement happened, or now when absent or unreadable
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match &self.timestamp {
            Some(Value::String(s)) => time::parse_or_now(Some(s)),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(from_epoch)
                .unwrap_or_else(time::now),
            _ => time::now(),
        }
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value > EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Split a webhook body into per-event decode results, in delivery order
///
/// Fails only when the body is not JSON or is neither an object nor an array.
pub fn parse_delivery(body: &[u8]) -> Result<Vec<DeliveredEvent>> {
    let value: Value = serde_json::from_slice(body)?;

    let elements = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => {
            return Err(Error::InvalidInput(
                "Webhook body must be an event object or an array of events".to_string(),
            ))
        }
    };

    Ok(elements
        .into_iter()
        .map(|element| serde_json::from_value::<WebhookEvent>(element).map_err(|e| e.to_string()))
        .collect())
}
