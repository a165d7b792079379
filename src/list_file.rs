//! Canonical list file
//!
//! One normalized domain per line, sorted, no blank lines, trailing newline.
//! Reading the existing file re-normalizes every line and keeps track of what
//! had to be fixed, so the run can report it and rewrite the file.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::dedup::Preview;
use crate::error::{LoadError, Result, UpdaterError};
use crate::normalize::normalize_domain;
use crate::storage;

/// Maximum number of examples kept per diagnostic
pub const PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedExample {
    pub original: String,
    pub normalized: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedInfo {
    pub total: usize,
    pub preview: Vec<NormalizedExample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicatesInfo {
    pub total: usize,
    pub unique: usize,
    pub preview: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidInfo {
    pub total: usize,
    pub preview: Vec<String>,
}

/// What was fixed while re-reading the list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListDiagnostics {
    pub normalized: NormalizedInfo,
    pub duplicates: DuplicatesInfo,
    pub invalid: InvalidInfo,
}

impl ListDiagnostics {
    pub fn needs_rewrite(&self) -> bool {
        self.normalized.total > 0 || self.duplicates.total > 0 || self.invalid.total > 0
    }
}

/// The canonical list as read at the start of a run
#[derive(Debug, Clone, Default)]
pub struct CanonicalList {
    pub domains: BTreeSet<String>,
    pub diagnostics: ListDiagnostics,
}

impl CanonicalList {
    /// Parses list content, normalizing and deduplicating every line
    pub fn parse(content: &str) -> Self {
        let mut domains = BTreeSet::new();
        let mut normalized_total = 0;
        let mut normalized_preview = Preview::new(PREVIEW_LIMIT);
        let mut duplicate_total = 0;
        let mut duplicate_domains = BTreeSet::new();
        let mut duplicate_preview = Preview::new(PREVIEW_LIMIT);
        let mut invalid_total = 0;
        let mut invalid_preview = Preview::new(PREVIEW_LIMIT);

        for line in content.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }

            let Some(domain) = normalize_domain(stripped) else {
                invalid_total += 1;
                invalid_preview.record(stripped.to_string());
                continue;
            };

            if domain != stripped {
                normalized_total += 1;
                normalized_preview.record(NormalizedExample {
                    original: stripped.to_string(),
                    normalized: domain.clone(),
                });
            }

            if domains.contains(&domain) {
                duplicate_total += 1;
                duplicate_preview.record(domain.clone());
                duplicate_domains.insert(domain);
            } else {
                domains.insert(domain);
            }
        }

        let mut normalized_preview = normalized_preview.into_inner();
        normalized_preview.sort_by(|a, b| a.normalized.cmp(&b.normalized));
        let mut duplicate_preview = duplicate_preview.into_inner();
        duplicate_preview.sort();
        let mut invalid_preview = invalid_preview.into_inner();
        invalid_preview.sort();

        Self {
            domains,
            diagnostics: ListDiagnostics {
                normalized: NormalizedInfo {
                    total: normalized_total,
                    preview: normalized_preview,
                },
                duplicates: DuplicatesInfo {
                    total: duplicate_total,
                    unique: duplicate_domains.len(),
                    preview: duplicate_preview,
                },
                invalid: InvalidInfo {
                    total: invalid_total,
                    preview: invalid_preview,
                },
            },
        }
    }

    /// Loads the list; a missing file is an empty list
    pub async fn load(path: &Path) -> Result<Self> {
        match storage::read_text(path).await {
            Ok(content) => {
                let list = Self::parse(&content);
                info!(
                    domains = list.domains.len(),
                    normalized = list.diagnostics.normalized.total,
                    duplicates = list.diagnostics.duplicates.total,
                    invalid = list.diagnostics.invalid.total,
                    "Loaded canonical list"
                );
                Ok(list)
            }
            Err(LoadError::Missing) => {
                debug!(path = %path.display(), "No canonical list yet");
                Ok(Self::default())
            }
            Err(e) => Err(UpdaterError::LoadFailed {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

/// Renders a sorted domain list in the canonical file format
pub fn render(domains: &[String]) -> String {
    if domains.is_empty() {
        return String::new();
    }
    let mut content = domains.join("\n");
    content.push('\n');
    content
}

/// Writes the canonical list
pub async fn write(path: &Path, domains: &[String]) -> Result<()> {
    storage::write_atomic(path, render(domains).as_bytes()).await?;
    info!(path = %path.display(), domains = domains.len(), "Canonical list written");
    Ok(())
}
