//! Candidate ranking and merging
//!
//! New domains compete for a bounded number of slots per run. Each candidate
//! scores the best `weight × trust` of the sources reporting it; ties fall
//! back to lexicographic order so the outcome is reproducible.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::orchestrator::DomainIndex;

/// A domain not yet in the canonical list
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub domain: String,
    pub score: f64,
}

/// Result of merging one run's candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Sorted canonical list after the merge
    pub merged: Vec<String>,
    /// Domains admitted this run, in rank order
    pub added: Vec<String>,
    /// Candidates that did not fit into this run's batch
    pub deferred: usize,
}

/// Ranks observed domains missing from `existing`, best first
pub fn rank_candidates(existing: &BTreeSet<String>, index: &DomainIndex) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = index
        .domains()
        .filter(|domain| !existing.contains(*domain))
        .map(|domain| Candidate {
            domain: domain.clone(),
            score: index.score(domain),
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.domain.cmp(&b.domain))
}

/// Admits at most `chunk_size` top-ranked candidates into the list
pub fn merge(existing: &BTreeSet<String>, index: &DomainIndex, chunk_size: usize) -> MergeOutcome {
    let candidates = rank_candidates(existing, index);
    let deferred = candidates.len().saturating_sub(chunk_size);

    let added: Vec<String> = candidates
        .into_iter()
        .take(chunk_size)
        .map(|c| c.domain)
        .collect();

    let merged: BTreeSet<String> = existing
        .iter()
        .map(|d| d.to_lowercase())
        .chain(added.iter().cloned())
        .collect();

    MergeOutcome {
        merged: merged.into_iter().collect(),
        added,
        deferred,
    }
}
