//! Markdown rendering of an update report

use std::path::Path;
use tracing::debug;

use super::UpdateReport;
use crate::error::Result;
use crate::list_file::PREVIEW_LIMIT;
use crate::storage;

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn push_rest(lines: &mut Vec<String>, total: usize, shown: usize, noun: &str) {
    let rest = total.saturating_sub(shown);
    if rest > 0 {
        lines.push(format!("... {rest} more {noun}"));
    }
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(format!("## {title}"));
    lines.push(String::new());
}

fn format_trust(trust: f64) -> String {
    format!("{trust:.2}")
}

fn format_sla(sla_days: Option<u32>) -> String {
    sla_days.map_or_else(|| "-".to_string(), |days| days.to_string())
}

/// Renders the report as Markdown
pub fn render(report: &UpdateReport) -> String {
    let mut lines = vec![
        "# Domain update report".to_string(),
        String::new(),
        format!("- Generated: {}", report.generated_at.to_rfc3339()),
        format!("- Run: {}", report.run_id),
        format!("- New domains added: {}", report.added.len()),
        format!("- Total domains: {}", report.total_after_update),
        format!("- Normalized entries: {}", report.normalized.total),
        format!("- Duplicates removed: {}", report.duplicates_removed.total),
        format!("- Unique duplicates: {}", report.duplicates_removed.unique),
        format!("- Invalid lines dropped: {}", report.invalid_lines.total),
        format!("- Stale candidates: {}", report.stale_total),
        format!("- Active sources: {}", report.sources.len()),
        format!("- Skipped sources: {}", report.skipped_sources.len()),
        format!("- Fetch errors: {}", yes_no(report.fetch_errors)),
    ];

    if !report.added.is_empty() {
        section(&mut lines, "New domains");
        let preview = &report.added[..report.added.len().min(PREVIEW_LIMIT)];
        lines.extend(preview.iter().map(|d| format!("- {d}")));
        push_rest(&mut lines, report.added.len(), preview.len(), "domains");
    }

    let normalized = &report.normalized.preview;
    if !normalized.is_empty() {
        section(&mut lines, "Normalized entries");
        lines.extend(
            normalized
                .iter()
                .take(PREVIEW_LIMIT)
                .map(|e| format!("- {} <- `{}`", e.normalized, e.original)),
        );
        push_rest(&mut lines, report.normalized.total, normalized.len(), "entries");
    }

    let duplicates = &report.duplicates_removed.preview;
    if !duplicates.is_empty() {
        section(&mut lines, "Duplicates");
        lines.extend(duplicates.iter().take(PREVIEW_LIMIT).map(|d| format!("- {d}")));
        push_rest(
            &mut lines,
            report.duplicates_removed.unique,
            duplicates.len(),
            "duplicates",
        );
    }

    let invalid = &report.invalid_lines.preview;
    if !invalid.is_empty() {
        section(&mut lines, "Invalid lines");
        lines.extend(invalid.iter().take(PREVIEW_LIMIT).map(|l| format!("- `{l}`")));
        push_rest(&mut lines, report.invalid_lines.total, invalid.len(), "lines");
    }

    if !report.stale_candidates.is_empty() {
        section(&mut lines, "Stale candidates");
        let preview = &report.stale_candidates
            [..report.stale_candidates.len().min(PREVIEW_LIMIT)];
        lines.extend(preview.iter().map(|d| format!("- {d}")));
        push_rest(&mut lines, report.stale_total, preview.len(), "domains");
    }

    if !report.skipped_sources.is_empty() {
        section(&mut lines, "Sources skipped for SLA");
        let preview = &report.skipped_sources
            [..report.skipped_sources.len().min(PREVIEW_LIMIT)];
        for source in preview {
            lines.push(format!(
                "- {} ({}): SLA {} days, trust {}",
                source.name,
                source.url,
                format_sla(source.sla_days),
                format_trust(source.trust)
            ));
        }
        push_rest(
            &mut lines,
            report.skipped_sources.len(),
            preview.len(),
            "sources",
        );
    }

    if !report.source_health.is_empty() {
        section(&mut lines, "Source health");
        lines.push("| Source | Status | Trust | SLA (days) | Last success | Auto-disabled |".to_string());
        lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
        for health in report.source_health.iter().take(PREVIEW_LIMIT) {
            let last_success = health
                .last_success_at
                .or(health.fetched_at)
                .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
            lines.push(format!(
                "| [{}]({}) | {} | {} | {} | {} | {} |",
                health.name,
                health.url,
                health.status,
                format_trust(health.trust),
                format_sla(health.sla_days),
                last_success,
                yes_no(health.auto_disabled)
            ));
        }
        push_rest(
            &mut lines,
            report.source_health.len(),
            report.source_health.len().min(PREVIEW_LIMIT),
            "sources",
        );
    }

    let mut content = lines.join("\n").trim_end().to_string();
    content.push('\n');
    content
}

/// Writes the Markdown rendering of `report`
pub async fn write(path: &Path, report: &UpdateReport) -> Result<()> {
    storage::write_atomic(path, render(report).as_bytes()).await?;
    debug!(path = %path.display(), "Markdown report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list_file::{DuplicatesInfo, InvalidInfo, NormalizedExample, NormalizedInfo};
    use crate::report::SourceHealth;
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> UpdateReport {
        UpdateReport {
            generated_at: Utc::now(),
            run_id: Uuid::new_v4(),
            added: (0..25).map(|i| format!("n{i:02}.com")).collect(),
            total_after_update: 30,
            sources: vec!["feed".into()],
            normalized: NormalizedInfo {
                total: 1,
                preview: vec![NormalizedExample {
                    original: "0.0.0.0 Ads.com".into(),
                    normalized: "ads.com".into(),
                }],
            },
            duplicates_removed: DuplicatesInfo::default(),
            invalid_lines: InvalidInfo {
                total: 2,
                preview: vec!["127.0.0.1".into()],
            },
            stale_candidates: vec![],
            stale_total: 0,
            skipped_sources: vec![],
            source_health: vec![SourceHealth {
                name: "feed".into(),
                url: "https://feed.example".into(),
                status: "ok".into(),
                trust: 0.9,
                sla_days: None,
                auto_disabled: false,
                fetched_at: None,
                last_success_at: None,
                sla_breached: false,
            }],
            fetch_errors: true,
        }
    }

    #[test]
    fn test_render_sections() {
        let text = render(&report());

        assert!(text.starts_with("# Domain update report\n"));
        assert!(text.ends_with('\n'));
        assert!(text.contains("- New domains added: 25"));
        assert!(text.contains("- Fetch errors: yes"));
        assert!(text.contains("## New domains"));
        assert!(text.contains("- n19.com"));
        assert!(!text.contains("- n20.com"));
        assert!(text.contains("... 5 more domains"));
        assert!(text.contains("- ads.com <- `0.0.0.0 Ads.com`"));
        assert!(text.contains("... 1 more lines"));
        assert!(!text.contains("## Duplicates"));
        assert!(!text.contains("## Stale candidates"));
        assert!(text.contains("| [feed](https://feed.example) | ok | 0.90 | - | - | no |"));
    }
}
