//! Import of legacy per-partition lead files
//!
//! The upstream scraping pipeline writes each partition as a JSON array in
//! `<dir>/<partition>_leads.json`. Importing seeds the database from those
//! files; rows already in the database keep their tier.

use super::{Lead, SqliteStore};
use leadgen_common::{time, Partition, Result, Tier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Lead object as written by the upstream pipeline (extra fields ignored)
#[derive(Debug, Deserialize)]
struct LegacyLead {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    icp_score: Option<f64>,
    /// Written by the scoring stage alongside `icp_score`; takes precedence
    #[serde(default)]
    lead_score: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    tier_updated_at: Option<String>,
}

impl LegacyLead {
    fn into_lead(self, partition: Partition) -> Option<Lead> {
        let email = self.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty())?;

        let name = self.name.filter(|n| !n.trim().is_empty()).or_else(|| {
            let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        });

        let tier = match self.tier.as_deref() {
            None => Tier::Cold,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(email = %email, tier = raw, "Unrecognized tier in legacy file, using cold");
                Tier::Cold
            }),
        };

        Some(Lead {
            email,
            partition,
            name,
            title: self.title,
            company: self.company,
            industry: self.industry,
            city: self.city,
            icp_score: self.lead_score.or(self.icp_score).or(self.score).unwrap_or(0.0),
            tier,
            tier_updated_at: self.tier_updated_at.as_deref().and_then(time::parse_rfc3339),
        })
    }
}

/// Per-partition import counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionImport {
    pub partition: Partition,
    pub file_found: bool,
    pub inserted: usize,
    pub already_present: usize,
    /// Entries without an email or not shaped like a lead
    pub rejected: usize,
}

impl PartitionImport {
    fn empty(partition: Partition) -> Self {
        Self {
            partition,
            file_found: false,
            inserted: 0,
            already_present: 0,
            rejected: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub partitions: Vec<PartitionImport>,
}

impl ImportSummary {
    pub fn total_inserted(&self) -> usize {
        self.partitions.iter().map(|p| p.inserted).sum()
    }

    pub fn total_rejected(&self) -> usize {
        self.partitions.iter().map(|p| p.rejected).sum()
    }
}

/// Import every `<partition>_leads.json` found in `dir`
///
/// A missing file skips that partition. A file that is not a JSON array is
/// logged and skipped. Database errors abort the import.
pub async fn import_partition_dir(store: &SqliteStore, dir: &Path) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for partition in Partition::ALL {
        let path = dir.join(partition.legacy_file_name());
        let mut counts = PartitionImport::empty(partition);

        if !path.exists() {
            info!(partition = %partition, "No legacy file at {}", path.display());
            summary.partitions.push(counts);
            continue;
        }
        counts.file_found = true;

        let content = tokio::fs::read_to_string(&path).await?;
        let entries = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!(partition = %partition, "Legacy file {} is not a JSON array, skipping", path.display());
                summary.partitions.push(counts);
                continue;
            }
            Err(e) => {
                warn!(partition = %partition, error = %e, "Invalid JSON in {}, skipping", path.display());
                summary.partitions.push(counts);
                continue;
            }
        };

        for entry in entries {
            let lead = serde_json::from_value::<LegacyLead>(entry)
                .ok()
                .and_then(|legacy| legacy.into_lead(partition));

            let Some(lead) = lead else {
                counts.rejected += 1;
                continue;
            };

            if store.insert_lead(&lead).await? {
                counts.inserted += 1;

                let owners = store.partitions_for(&lead.email).await?;
                if owners.len() > 1 {
                    warn!(
                        email = %lead.email,
                        partitions = ?owners,
                        "Lead present in several partitions; lookups resolve to {}",
                        owners[0]
                    );
                }
            } else {
                counts.already_present += 1;
            }
        }

        info!(
            partition = %partition,
            inserted = counts.inserted,
            already_present = counts.already_present,
            rejected = counts.rejected,
            "Imported legacy partition file"
        );
        summary.partitions.push(counts);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LeadStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn setup_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        leadgen_common::db::init_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_import_reads_partition_files() {
        let store = setup_store().await;
        let dir = TempDir::new().unwrap();

        std::fs::write(
            dir.path().join("hni_leads.json"),
            r#"[
                {"email": "rohan@example.com", "first_name": "Rohan", "last_name": "Mehta",
                 "title": "Founder", "company": "NorthStar Investments", "score": 84,
                 "tier": "Warm", "linkedinUrl": "https://linkedin.com/in/rohan"},
                {"name": "No Email"},
                {"email": "   "},
                "not an object"
            ]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("partners_leads.json"),
            r#"[{"email": "ifa@example.com", "name": "Priya Iyer", "icp_score": 61.5}]"#,
        )
        .unwrap();

        let summary = import_partition_dir(&store, dir.path()).await.unwrap();
        assert_eq!(summary.partitions.len(), Partition::ALL.len());
        assert_eq!(summary.total_inserted(), 2);
        assert_eq!(summary.total_rejected(), 3);

        let hni = &summary.partitions[1];
        assert_eq!(hni.partition, Partition::Hni);
        assert!(hni.file_found);
        assert_eq!(hni.inserted, 1);
        assert_eq!(hni.rejected, 3);

        assert!(!summary.partitions[2].file_found);

        let rohan = store.find_by_email("rohan@example.com").await.unwrap().unwrap();
        assert_eq!(rohan.partition, Partition::Hni);
        assert_eq!(rohan.name.as_deref(), Some("Rohan Mehta"));
        assert_eq!(rohan.icp_score, 84.0);
        assert_eq!(rohan.tier, Tier::Warm);

        let priya = store.find_by_email("ifa@example.com").await.unwrap().unwrap();
        assert_eq!(priya.tier, Tier::Cold);
        assert_eq!(priya.icp_score, 61.5);
    }

    #[tokio::test]
    async fn test_reimport_keeps_existing_tier() {
        let store = setup_store().await;
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("uhni_leads.json");
        std::fs::write(&file, r#"[{"email": "vip@example.com", "tier": "cold"}]"#).unwrap();

        import_partition_dir(&store, dir.path()).await.unwrap();
        store
            .compare_and_set_tier(Partition::Uhni, "vip@example.com", Tier::Cold, Tier::Hot, chrono::Utc::now())
            .await
            .unwrap();

        let summary = import_partition_dir(&store, dir.path()).await.unwrap();
        assert_eq!(summary.total_inserted(), 0);
        assert_eq!(summary.partitions[2].already_present, 1);

        let vip = store.find_by_email("vip@example.com").await.unwrap().unwrap();
        assert_eq!(vip.tier, Tier::Hot);
    }

    #[tokio::test]
    async fn test_lead_with_both_scores_is_imported() {
        let store = setup_store().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("hni_leads.json"),
            r#"[
                {"email": "both@example.com", "icp_score": 72, "lead_score": 72.5, "tier": "warm"},
                {"email": "icp@example.com", "icp_score": 55, "score": 10}
            ]"#,
        )
        .unwrap();

        let summary = import_partition_dir(&store, dir.path()).await.unwrap();
        assert_eq!(summary.total_inserted(), 2);
        assert_eq!(summary.total_rejected(), 0);

        let both = store.find_by_email("both@example.com").await.unwrap().unwrap();
        assert_eq!(both.icp_score, 72.5);
        assert_eq!(both.tier, Tier::Warm);

        let icp = store.find_by_email("icp@example.com").await.unwrap().unwrap();
        assert_eq!(icp.icp_score, 55.0);
    }

    #[tokio::test]
    async fn test_invalid_file_is_skipped() {
        let store = setup_store().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mass_affluent_leads.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("hni_leads.json"), r#"{"email": "obj@example.com"}"#).unwrap();

        let summary = import_partition_dir(&store, dir.path()).await.unwrap();
        assert_eq!(summary.total_inserted(), 0);
        assert!(summary.partitions[3].file_found);
        assert_eq!(summary.partitions[3].rejected, 0);
    }
}
