//! SQLite-backed lead store and progression log
//!
//! Leads are indexed by email; a tier write is a single conditional UPDATE so
//! two writers racing on the same lead cannot both apply a change computed
//! from the same stale tier.

use super::{Lead, LeadStore, ProgressionLog, ProgressionPage, ProgressionRecord, TierWrite};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadgen_common::{time, EngagementType, Error, Partition, Result, Tier};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// Lead store and progression log over one SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a lead unless `(partition, email)` already exists
    ///
    /// Returns `true` when a row was inserted. Existing rows (and their tier)
    /// are left untouched.
    pub async fn insert_lead(&self, lead: &Lead) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO leads
                (segment, email, name, title, company, industry, city, icp_score, tier, tier_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lead.partition.as_str())
        .bind(&lead.email)
        .bind(&lead.name)
        .bind(&lead.title)
        .bind(&lead.company)
        .bind(&lead.industry)
        .bind(&lead.city)
        .bind(lead.icp_score)
        .bind(lead.tier.as_str())
        .bind(lead.tier_updated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Load one lead from a specific partition
    pub async fn get_lead(&self, partition: Partition, email: &str) -> Result<Option<Lead>> {
        let row = sqlx::query(
            r#"
            SELECT segment, email, name, title, company, industry, city, icp_score, tier, tier_updated_at
            FROM leads
            WHERE segment = ? AND email = ?
            "#,
        )
        .bind(partition.as_str())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| lead_from_row(&r)).transpose()
    }

    /// Partitions holding `email`, in lookup order
    pub async fn partitions_for(&self, email: &str) -> Result<Vec<Partition>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT segment FROM leads WHERE email = ?")
            .bind(email)
            .fetch_all(&self.pool)
            .await?;

        let mut partitions: Vec<Partition> = rows
            .iter()
            .filter_map(|(segment,)| segment.parse().ok())
            .collect();
        partitions.sort_by_key(Partition::rank);
        Ok(partitions)
    }
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let segment: String = row.try_get("segment")?;
    let partition: Partition = segment.parse()?;

    let tier: Option<String> = row.try_get("tier")?;
    let tier = match tier {
        Some(t) => t.parse()?,
        None => Tier::Cold,
    };

    let tier_updated_at: Option<String> = row.try_get("tier_updated_at")?;

    Ok(Lead {
        email: row.try_get("email")?,
        partition,
        name: row.try_get("name")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        industry: row.try_get("industry")?,
        city: row.try_get("city")?,
        icp_score: row.try_get("icp_score")?,
        tier,
        tier_updated_at: tier_updated_at.as_deref().and_then(time::parse_rfc3339),
    })
}

fn progression_from_row(row: &SqliteRow) -> Result<ProgressionRecord> {
    let event_type: String = row.try_get("event_type")?;
    let previous_tier: String = row.try_get("previous_tier")?;
    let new_tier: String = row.try_get("new_tier")?;
    let timestamp: String = row.try_get("timestamp")?;

    let timestamp: DateTime<Utc> = time::parse_rfc3339(&timestamp)
        .ok_or_else(|| Error::Internal(format!("Corrupt progression timestamp: {}", timestamp)))?;

    Ok(ProgressionRecord {
        email: row.try_get("email")?,
        event_type: event_type.parse::<EngagementType>()?,
        previous_tier: previous_tier.parse()?,
        new_tier: new_tier.parse()?,
        icp_score: row.try_get("icp_score")?,
        timestamp,
        campaign_id: row.try_get("campaign_id")?,
        campaign_name: row.try_get("campaign_name")?,
    })
}

#[async_trait]
impl LeadStore for SqliteStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>> {
        let rows = sqlx::query(
            r#"
            SELECT segment, email, name, title, company, industry, city, icp_score, tier, tier_updated_at
            FROM leads
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        let mut leads = Vec::with_capacity(rows.len());
        for row in &rows {
            match lead_from_row(row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!(email, error = %e, "Skipping unreadable lead row"),
            }
        }

        if leads.len() > 1 {
            debug!(email, matches = leads.len(), "Email present in several partitions, first wins");
        }

        Ok(leads.into_iter().min_by_key(|lead| lead.partition.rank()))
    }

    async fn compare_and_set_tier(
        &self,
        partition: Partition,
        email: &str,
        expected: Tier,
        new_tier: Tier,
        updated_at: DateTime<Utc>,
    ) -> Result<TierWrite> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET tier = ?, tier_updated_at = ?
            WHERE segment = ? AND email = ? AND COALESCE(tier, 'cold') = ?
            "#,
        )
        .bind(new_tier.as_str())
        .bind(updated_at.to_rfc3339())
        .bind(partition.as_str())
        .bind(email)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(TierWrite::Applied);
        }

        let current: Option<(Option<String>,)> =
            sqlx::query_as("SELECT tier FROM leads WHERE segment = ? AND email = ?")
                .bind(partition.as_str())
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Ok(TierWrite::Missing),
            Some((tier,)) => {
                let current = match tier {
                    Some(t) => t.parse()?,
                    None => Tier::Cold,
                };
                Ok(TierWrite::Conflict { current })
            }
        }
    }
}

#[async_trait]
impl ProgressionLog for SqliteStore {
    async fn append(&self, record: &ProgressionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lead_progressions
                (email, event_type, previous_tier, new_tier, icp_score, timestamp, campaign_id, campaign_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.email)
        .bind(record.event_type.as_str())
        .bind(record.previous_tier.as_str())
        .bind(record.new_tier.as_str())
        .bind(record.icp_score)
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.campaign_id)
        .bind(&record.campaign_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: u32, tier: Option<Tier>) -> Result<ProgressionPage> {
        const COLUMNS: &str = "email, event_type, previous_tier, new_tier, icp_score, timestamp, campaign_id, campaign_name";

        let (total, rows): (i64, Vec<SqliteRow>) = match tier {
            Some(tier) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM lead_progressions WHERE new_tier = ?",
                )
                .bind(tier.as_str())
                .fetch_one(&self.pool)
                .await?;

                let rows = sqlx::query(&format!(
                    "SELECT {} FROM lead_progressions WHERE new_tier = ? ORDER BY id DESC LIMIT ?",
                    COLUMNS
                ))
                .bind(tier.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;

                (total, rows)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead_progressions")
                    .fetch_one(&self.pool)
                    .await?;

                let rows = sqlx::query(&format!(
                    "SELECT {} FROM lead_progressions ORDER BY id DESC LIMIT ?",
                    COLUMNS
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;

                (total, rows)
            }
        };

        let records = rows
            .iter()
            .map(progression_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ProgressionPage {
            records,
            total: total.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        leadgen_common::db::init_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn lead(email: &str, partition: Partition, tier: Tier) -> Lead {
        Lead {
            email: email.to_string(),
            partition,
            name: Some("Asha Rao".to_string()),
            title: Some("Wealth Manager".to_string()),
            company: Some("Elevate Capital".to_string()),
            industry: Some("Finance".to_string()),
            city: Some("Pune".to_string()),
            icp_score: 72.5,
            tier,
            tier_updated_at: None,
        }
    }

    fn progression(email: &str, new_tier: Tier) -> ProgressionRecord {
        ProgressionRecord {
            email: email.to_string(),
            event_type: EngagementType::EmailOpened,
            previous_tier: Tier::Cold,
            new_tier,
            icp_score: 50.0,
            timestamp: Utc::now(),
            campaign_id: Some("cmp-1".to_string()),
            campaign_name: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_email_round_trip() {
        let store = setup_store().await;
        let original = lead("asha@example.com", Partition::Hni, Tier::Warm);
        assert!(store.insert_lead(&original).await.unwrap());

        let found = store.find_by_email("asha@example.com").await.unwrap().unwrap();
        assert_eq!(found, original);

        assert!(store.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_prefers_first_partition() {
        let store = setup_store().await;
        store.insert_lead(&lead("dup@example.com", Partition::MassAffluent, Tier::Cold)).await.unwrap();
        store.insert_lead(&lead("dup@example.com", Partition::Hni, Tier::Hot)).await.unwrap();

        let found = store.find_by_email("dup@example.com").await.unwrap().unwrap();
        assert_eq!(found.partition, Partition::Hni);
        assert_eq!(found.tier, Tier::Hot);

        assert_eq!(
            store.partitions_for("dup@example.com").await.unwrap(),
            vec![Partition::Hni, Partition::MassAffluent]
        );
    }

    #[tokio::test]
    async fn test_insert_does_not_overwrite_existing() {
        let store = setup_store().await;
        store.insert_lead(&lead("keep@example.com", Partition::Uhni, Tier::Hot)).await.unwrap();

        let inserted = store
            .insert_lead(&lead("keep@example.com", Partition::Uhni, Tier::Cold))
            .await
            .unwrap();
        assert!(!inserted);

        let found = store.get_lead(Partition::Uhni, "keep@example.com").await.unwrap().unwrap();
        assert_eq!(found.tier, Tier::Hot);
    }

    #[tokio::test]
    async fn test_null_tier_reads_as_cold() {
        let store = setup_store().await;
        sqlx::query("INSERT INTO leads (segment, email) VALUES ('partners', 'bare@example.com')")
            .execute(store.pool())
            .await
            .unwrap();

        let found = store.find_by_email("bare@example.com").await.unwrap().unwrap();
        assert_eq!(found.tier, Tier::Cold);
        assert_eq!(found.icp_score, 0.0);

        // CAS from cold applies to a NULL tier
        let write = store
            .compare_and_set_tier(Partition::Partners, "bare@example.com", Tier::Cold, Tier::Warm, Utc::now())
            .await
            .unwrap();
        assert_eq!(write, TierWrite::Applied);
    }

    #[tokio::test]
    async fn test_compare_and_set_outcomes() {
        let store = setup_store().await;
        store.insert_lead(&lead("cas@example.com", Partition::Hni, Tier::Cold)).await.unwrap();

        let now = Utc::now();
        let first = store
            .compare_and_set_tier(Partition::Hni, "cas@example.com", Tier::Cold, Tier::Warm, now)
            .await
            .unwrap();
        assert_eq!(first, TierWrite::Applied);

        // Stale expectation loses
        let stale = store
            .compare_and_set_tier(Partition::Hni, "cas@example.com", Tier::Cold, Tier::Hot, now)
            .await
            .unwrap();
        assert_eq!(stale, TierWrite::Conflict { current: Tier::Warm });

        let missing = store
            .compare_and_set_tier(Partition::Uhni, "cas@example.com", Tier::Cold, Tier::Warm, now)
            .await
            .unwrap();
        assert_eq!(missing, TierWrite::Missing);

        let found = store.get_lead(Partition::Hni, "cas@example.com").await.unwrap().unwrap();
        assert_eq!(found.tier, Tier::Warm);
        assert!(found.tier_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_with_filter() {
        let store = setup_store().await;
        store.append(&progression("a@example.com", Tier::Warm)).await.unwrap();
        store.append(&progression("b@example.com", Tier::Hot)).await.unwrap();
        store.append(&progression("c@example.com", Tier::Warm)).await.unwrap();

        let all = store.recent(10, None).await.unwrap();
        assert_eq!(all.total, 3);
        let emails: Vec<&str> = all.records.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["c@example.com", "b@example.com", "a@example.com"]);

        let warm = store.recent(1, Some(Tier::Warm)).await.unwrap();
        assert_eq!(warm.total, 2);
        assert_eq!(warm.records.len(), 1);
        assert_eq!(warm.records[0].email, "c@example.com");
        assert_eq!(warm.records[0].campaign_id.as_deref(), Some("cmp-1"));

        let cold = store.recent(10, Some(Tier::Cold)).await.unwrap();
        assert_eq!(cold.total, 0);
        assert!(cold.records.is_empty());
    }

    #[tokio::test]
    async fn test_recent_zero_limit_still_counts() {
        let store = setup_store().await;
        store.append(&progression("a@example.com", Tier::Warm)).await.unwrap();

        let page = store.recent(0, None).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 1);
    }
}
