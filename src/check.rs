//! Static checks of the published lists
//!
//! Validates the canonical domain list against the hostname grammar and the
//! regex list against the `regex` engine, and reports duplicates in both.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::error::LoadError;
use crate::storage;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("Domain grammar must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckIssue {
    MissingFile(String),
    UnreadableFile { path: String, reason: String },
    DuplicateDomains(Vec<String>),
    InvalidDomains(Vec<String>),
    DuplicatePatterns(Vec<String>),
    InvalidPatterns(Vec<String>),
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckIssue::MissingFile(path) => write!(f, "Missing file: {path}"),
            CheckIssue::UnreadableFile { path, reason } => {
                write!(f, "Cannot read {path}: {reason}")
            }
            CheckIssue::DuplicateDomains(items) => {
                write!(f, "Duplicate domains: {}", items.join(", "))
            }
            CheckIssue::InvalidDomains(items) => write!(f, "Invalid domains: {}", items.join(", ")),
            CheckIssue::DuplicatePatterns(items) => {
                write!(f, "Duplicate patterns: {}", items.join(", "))
            }
            CheckIssue::InvalidPatterns(items) => {
                write!(f, "Invalid patterns: {}", items.join(", "))
            }
        }
    }
}

pub fn is_valid_domain(domain: &str) -> bool {
    DOMAIN_RE.is_match(domain)
}

/// Non-empty, non-comment lines, trimmed
fn entries(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn duplicates(items: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    for item in items {
        if !seen.insert(*item) {
            repeated.insert(item.to_string());
        }
    }
    repeated.into_iter().collect()
}

pub fn check_domains(content: &str) -> Vec<CheckIssue> {
    let domains = entries(content);
    let mut issues = Vec::new();

    let repeated = duplicates(&domains);
    if !repeated.is_empty() {
        issues.push(CheckIssue::DuplicateDomains(repeated));
    }

    let mut invalid: Vec<String> = domains
        .iter()
        .filter(|d| !is_valid_domain(d))
        .map(|d| d.to_string())
        .collect();
    if !invalid.is_empty() {
        invalid.sort();
        issues.push(CheckIssue::InvalidDomains(invalid));
    }
    issues
}

pub fn check_patterns(content: &str) -> Vec<CheckIssue> {
    let patterns = entries(content);
    let mut issues = Vec::new();

    let repeated = duplicates(&patterns);
    if !repeated.is_empty() {
        issues.push(CheckIssue::DuplicatePatterns(repeated));
    }

    let mut invalid: Vec<String> = patterns
        .iter()
        .filter(|p| Regex::new(p).is_err())
        .map(|p| p.to_string())
        .collect();
    if !invalid.is_empty() {
        invalid.sort();
        issues.push(CheckIssue::InvalidPatterns(invalid));
    }
    issues
}

async fn read_for_check(path: &Path, issues: &mut Vec<CheckIssue>) -> Option<String> {
    match storage::read_text(path).await {
        Ok(content) => Some(content),
        Err(LoadError::Missing) => {
            issues.push(CheckIssue::MissingFile(path.display().to_string()));
            None
        }
        Err(e) => {
            issues.push(CheckIssue::UnreadableFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Checks both lists; an empty result means they are clean
pub async fn run_checks(domains_path: &Path, regex_path: &Path) -> Vec<CheckIssue> {
    let mut issues = Vec::new();

    if let Some(content) = read_for_check(domains_path, &mut issues).await {
        issues.extend(check_domains(&content));
    }
    if let Some(content) = read_for_check(regex_path, &mut issues).await {
        issues.extend(check_patterns(&content));
    }

    info!(issues = issues.len(), "List check finished");
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_grammar() {
        for valid in ["example.com", "a.b.c.io", "xn--80ak6aa92e.com", "ads-1.tracker.net"] {
            assert!(is_valid_domain(valid), "{valid} should be valid");
        }
        for invalid in ["-bad.com", "bad-.com", "nodot", "example.c", "exa mple.com", "example.123"] {
            assert!(!is_valid_domain(invalid), "{invalid} should be invalid");
        }
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(!is_valid_domain(&long_label));
    }

    #[test]
    fn test_check_domains() {
        let issues = check_domains("# header\na.com\nb.com\na.com\n-bad.com\n\n");
        assert_eq!(
            issues,
            vec![
                CheckIssue::DuplicateDomains(vec!["a.com".into()]),
                CheckIssue::InvalidDomains(vec!["-bad.com".into()]),
            ]
        );
        assert!(check_domains("a.com\nb.org\n").is_empty());
    }

    #[test]
    fn test_check_patterns() {
        let issues = check_patterns("^ads\\.\n(unclosed\n^ads\\.\n");
        assert_eq!(
            issues,
            vec![
                CheckIssue::DuplicatePatterns(vec!["^ads\\.".into()]),
                CheckIssue::InvalidPatterns(vec!["(unclosed".into()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_files_are_issues() {
        let temp_dir = tempfile::tempdir().unwrap();
        let domains = temp_dir.path().join("domains.txt");
        tokio::fs::write(&domains, "a.com\n").await.unwrap();

        let issues = run_checks(&domains, &temp_dir.path().join("regex.list")).await;
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], CheckIssue::MissingFile(_)));
    }
}
