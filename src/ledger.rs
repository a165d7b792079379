//! Domain lifecycle ledger
//!
//! Tracks every domain that ever made it into the canonical list: when it
//! was first admitted, when a source last reported it, and whether it is
//! still reported (`active`), still listed but unreported (`stale`) or gone
//! from the list (`removed`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{LoadError, Result, UpdaterError};
use crate::orchestrator::DomainIndex;
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Active,
    Stale,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub first_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub status: DomainStatus,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

impl DomainRecord {
    fn admitted(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: None,
            status: DomainStatus::Active,
            sources: Vec::new(),
            removed_at: None,
        }
    }
}

/// Per-status totals after an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub active: usize,
    pub stale: usize,
    pub removed: usize,
}

pub struct DomainLedger {
    file_path: PathBuf,
    records: BTreeMap<String, DomainRecord>,
}

impl DomainLedger {
    pub fn empty(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Loads the ledger; a missing or malformed file starts an empty one
    pub async fn load(file_path: &Path) -> Result<Self> {
        let records = match storage::read_text(file_path).await {
            Ok(content) => match Self::parse(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, path = %file_path.display(), "Corrupt domain ledger, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(LoadError::Missing) => BTreeMap::new(),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Unreadable domain ledger, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(UpdaterError::LoadFailed {
                    path: file_path.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            file_path: file_path.to_path_buf(),
            records,
        })
    }

    /// Parses the ledger document, dropping records that do not conform
    pub fn parse(content: &str) -> std::result::Result<BTreeMap<String, DomainRecord>, LoadError> {
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let document: Value =
            serde_json::from_str(content).map_err(|e| LoadError::Malformed(e.to_string()))?;
        let Value::Object(map) = document else {
            return Err(LoadError::Malformed("ledger root is not an object".to_string()));
        };

        let mut records = BTreeMap::new();
        for (domain, value) in map {
            match serde_json::from_value::<DomainRecord>(value) {
                Ok(record) => {
                    records.insert(domain, record);
                }
                Err(e) => debug!(domain = %domain, error = %e, "Dropping malformed ledger record"),
            }
        }
        Ok(records)
    }

    /// Folds one run into the ledger.
    ///
    /// `merged` is the canonical list after the run, `index` the domains
    /// reported by sources this run.
    pub fn apply(&mut self, merged: &[String], index: &DomainIndex, now: DateTime<Utc>) {
        for domain in merged {
            let record = self
                .records
                .entry(domain.clone())
                .or_insert_with(|| DomainRecord::admitted(now));

            record.removed_at = None;
            if index.contains(domain) {
                record.last_seen = Some(now);
                record.status = DomainStatus::Active;
                record.sources = index.source_names(domain);
            } else {
                record.last_seen = record.last_seen.or(Some(record.first_seen));
                record.status = DomainStatus::Stale;
            }
        }

        let listed: BTreeSet<&str> = merged.iter().map(String::as_str).collect();
        for (domain, record) in self.records.iter_mut() {
            if listed.contains(domain.as_str()) {
                continue;
            }
            if record.status != DomainStatus::Removed || record.removed_at.is_none() {
                record.removed_at = Some(now);
            }
            record.status = DomainStatus::Removed;
        }

        let counts = self.counts();
        info!(
            active = counts.active,
            stale = counts.stale,
            removed = counts.removed,
            "Domain ledger updated"
        );
    }

    pub fn counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for record in self.records.values() {
            match record.status {
                DomainStatus::Active => counts.active += 1,
                DomainStatus::Stale => counts.stale += 1,
                DomainStatus::Removed => counts.removed += 1,
            }
        }
        counts
    }

    pub fn get(&self, domain: &str) -> Option<&DomainRecord> {
        self.records.get(domain)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub async fn save(&self) -> Result<()> {
        storage::write_json(&self.file_path, &self.records).await?;
        debug!(path = %self.file_path.display(), records = self.records.len(), "Domain ledger saved");
        Ok(())
    }
}
