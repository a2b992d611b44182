//! Lead tier domain
//!
//! Tiers are totally ordered `Cold < Warm < Hot`. Engagement signals only ever
//! move a lead forward along that axis; `Hot` is absorbing.
//!
//! Both [`classify_event`] and [`next_tier`] are pure functions so they can be
//! shared by every service that reacts to engagement callbacks.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Qualification bucket of a lead
///
/// Variant order defines the tier ordering used by `Ord`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Cold,
    Warm,
    Hot,
}

impl Tier {
    /// All tiers in ascending order
    pub const ALL: [Tier; 3] = [Tier::Cold, Tier::Warm, Tier::Hot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cold => "cold",
            Tier::Warm => "warm",
            Tier::Hot => "hot",
        }
    }

    /// Whether entering this tier starts an automated campaign
    pub fn triggers_campaign(&self) -> bool {
        matches!(self, Tier::Warm | Tier::Hot)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cold" => Ok(Tier::Cold),
            "warm" => Ok(Tier::Warm),
            "hot" => Ok(Tier::Hot),
            other => Err(Error::InvalidInput(format!("Unknown tier: '{}'", other))),
        }
    }
}

/// Canonical engagement signal derived from a vendor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementType {
    EmailOpened,
    EmailClicked,
    EmailReplied,
    CallBooked,
}

impl EngagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementType::EmailOpened => "email_opened",
            EngagementType::EmailClicked => "email_clicked",
            EngagementType::EmailReplied => "email_replied",
            EngagementType::CallBooked => "call_booked",
        }
    }

    /// Tier implied by this signal on its own
    ///
    /// Opens and clicks are medium-intent; replies and bookings are high-intent.
    pub fn implied_tier(&self) -> Tier {
        match self {
            EngagementType::EmailOpened | EngagementType::EmailClicked => Tier::Warm,
            EngagementType::EmailReplied | EngagementType::CallBooked => Tier::Hot,
        }
    }
}

impl fmt::Display for EngagementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "email_opened" => Ok(EngagementType::EmailOpened),
            "email_clicked" => Ok(EngagementType::EmailClicked),
            "email_replied" => Ok(EngagementType::EmailReplied),
            "call_booked" => Ok(EngagementType::CallBooked),
            other => Err(Error::InvalidInput(format!("Unknown engagement type: '{}'", other))),
        }
    }
}

/// Keyword table checked in order; the first group with a matching keyword wins
const KEYWORDS: &[(&[&str], EngagementType)] = &[
    (&["open"], EngagementType::EmailOpened),
    (&["click"], EngagementType::EmailClicked),
    (&["repl", "response"], EngagementType::EmailReplied),
    (&["book", "call"], EngagementType::CallBooked),
];

/// Map a vendor event name to a canonical engagement type
///
/// Case-insensitive substring match. Returns `None` for names that are not an
/// engagement signal (e.g. "delivered", "bounced").
pub fn classify_event(event_name: &str) -> Option<EngagementType> {
    let name = event_name.to_lowercase();

    KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| name.contains(k)))
        .map(|(_, engagement)| *engagement)
}

/// Tier transition rule
///
/// Never returns a tier lower than `current`.
pub fn next_tier(current: Tier, engagement: EngagementType) -> Tier {
    current.max(engagement.implied_tier())
}
