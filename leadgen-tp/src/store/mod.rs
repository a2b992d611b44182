//! Lead storage adapter and progression log
//!
//! The engine only sees the two narrow traits here, so the backing medium can
//! change without touching the state machine. [`SqliteStore`] implements both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadgen_common::{EngagementType, Partition, Result, Tier};
use serde::{Deserialize, Serialize};

pub mod import;
pub mod sqlite;

pub use import::{import_partition_dir, ImportSummary, PartitionImport};
pub use sqlite::SqliteStore;

/// A prospect known to the system
///
/// Only `tier` and `tier_updated_at` are ever written by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub email: String,
    pub partition: Partition,
    pub name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub icp_score: f64,
    pub tier: Tier,
    pub tier_updated_at: Option<DateTime<Utc>>,
}

/// Immutable audit entry for one tier change
///
/// Always satisfies `previous_tier < new_tier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub email: String,
    pub event_type: EngagementType,
    pub previous_tier: Tier,
    pub new_tier: Tier,
    pub icp_score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
}

/// Outcome of a compare-and-set tier write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierWrite {
    /// Stored tier matched the expected value and was replaced
    Applied,
    /// Stored tier no longer matched; carries the value found
    Conflict { current: Tier },
    /// The lead disappeared from the partition
    Missing,
}

/// One page of the progression log, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressionPage {
    pub records: Vec<ProgressionRecord>,
    /// Number of records matching the filter, ignoring the limit
    pub total: u64,
}

/// Read/CAS access to lead partitions
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Locate a lead by email, searching partitions in [`Partition::ALL`] order
    ///
    /// Returns the first match.
    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>>;

    /// Replace the stored tier only if it still equals `expected`
    async fn compare_and_set_tier(
        &self,
        partition: Partition,
        email: &str,
        expected: Tier,
        new_tier: Tier,
        updated_at: DateTime<Utc>,
    ) -> Result<TierWrite>;
}

/// Append-only ordered log of tier changes
#[async_trait]
pub trait ProgressionLog: Send + Sync {
    async fn append(&self, record: &ProgressionRecord) -> Result<()>;

    /// Most recent `limit` records, optionally only those whose new tier is `tier`
    async fn recent(&self, limit: u32, tier: Option<Tier>) -> Result<ProgressionPage>;
}
