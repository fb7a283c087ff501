//! CLI output formatting for every command.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Routes
//! 001 [lang]/blog/[slug] (dynamic, skipped)
//! 002 [lang]/contact
//!     nl/contact
//!     en/contact
//!
//! 2 routes, 2 pages
//! ```
//!
//! ## Sync
//!
//! ```text
//! Adopted
//!     nl: over-ons → (marketing)/over-ons
//!     en: over-ons → (marketing)/over-ons (prefix stripped)
//! Inserted
//!     nl: nl/contact
//! Conflicts
//!     nl: nl/fue (row 12 belongs to behandelingen/fue)
//!
//! Scanned 8 routes: 12 pages, 9 in sync, 2 adopted, 1 new, 1 conflict
//! ```
//!
//! ## Grid
//!
//! ```text
//! Review grid for 2025-03-14
//! 001 large  video        *r7 Anna
//! 002 small  static        r2 "Heel tevreden over de be..."
//! ```

use crate::grid::{CellSize, GridCell};
use crate::naming::{Segment, route_segments};
use crate::reconcile::{MatchKind, PageCandidate, component_key};
use crate::scan::RouteManifest;
use crate::sync::SyncReport;
use crate::types::ServiceKey;
use chrono::NaiveDate;
use std::collections::BTreeMap;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Scan output
// ============================================================================

/// Format discovered routes with the slugs each one produces.
pub fn format_scan_output(
    manifest: &RouteManifest,
    candidates: &[PageCandidate],
    placeholder: &str,
) -> Vec<String> {
    let mut lines = vec!["Routes".to_string()];

    for (i, route) in manifest.routes.iter().enumerate() {
        let shown = if route.is_empty() { "/" } else { route.as_str() };
        let key = component_key(route, placeholder);
        let pages: Vec<&PageCandidate> = candidates
            .iter()
            .filter(|c| c.component_key == key)
            .collect();

        if pages.is_empty() {
            let segments = route_segments(route, placeholder);
            let reason = if segments.iter().any(|s| matches!(s, Segment::Dynamic(_))) {
                "dynamic, skipped"
            } else if segments.iter().all(|s| matches!(s, Segment::Group(_))) {
                "no slug"
            } else {
                "excluded"
            };
            lines.push(format!("{} {} ({})", format_index(i + 1), shown, reason));
            continue;
        }

        lines.push(format!("{} {}", format_index(i + 1), shown));
        for page in pages {
            lines.push(format!("{}{}", indent(1), page.slug));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{}, {}",
        plural(manifest.len(), "route"),
        plural(candidates.len(), "page")
    ));
    lines
}

pub fn print_scan_output(manifest: &RouteManifest, candidates: &[PageCandidate], placeholder: &str) {
    print_lines(format_scan_output(manifest, candidates, placeholder));
}

// ============================================================================
// Sync output
// ============================================================================

/// Format a sync report: adoptions, inserts and conflicts, then a summary.
pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.adoptions.is_empty() {
        lines.push("Adopted".to_string());
        for adoption in &report.adoptions {
            let note = match adoption.kind {
                MatchKind::Exact => "",
                MatchKind::PrefixStripped => " (prefix stripped)",
            };
            lines.push(format!(
                "{}{}: {} → {}{}",
                indent(1),
                adoption.language,
                adoption.row_slug,
                adoption.component_key,
                note
            ));
        }
    }

    let (heading, inserts): (&str, Vec<(&str, &str)>) = if report.dry_run {
        (
            "Would insert",
            report
                .pending_inserts
                .iter()
                .map(|p| (p.language.as_str(), p.slug.as_str()))
                .collect(),
        )
    } else {
        (
            "Inserted",
            report
                .inserted
                .iter()
                .map(|p| (p.language.as_str(), p.slug.as_str()))
                .collect(),
        )
    };
    if !inserts.is_empty() {
        lines.push(heading.to_string());
        for (language, slug) in inserts {
            lines.push(format!("{}{}: {}", indent(1), language, slug));
        }
    }

    if !report.conflicts.is_empty() {
        lines.push("Conflicts".to_string());
        for conflict in &report.conflicts {
            let owner = conflict
                .row_component_key
                .as_deref()
                .unwrap_or("another route in this run");
            lines.push(format!(
                "{}{}: {} (row {} belongs to {})",
                indent(1),
                conflict.language,
                conflict.slug,
                conflict.row_id,
                owner
            ));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let new_pages = if report.dry_run {
        report.pending_inserts.len()
    } else {
        report.new_pages()
    };
    lines.push(format!(
        "{}Scanned {}: {}, {} in sync, {} adopted, {} new, {}",
        if report.dry_run { "[dry run] " } else { "" },
        plural(report.total_scanned, "route"),
        plural(report.candidates, "page"),
        report.in_sync,
        report.adoptions.len(),
        new_pages,
        plural(report.conflicts.len(), "conflict")
    ));
    lines
}

pub fn print_sync_report(report: &SyncReport) {
    print_lines(format_sync_report(report));
}

// ============================================================================
// Grid output
// ============================================================================

fn size_label(size: CellSize) -> &'static str {
    match size {
        CellSize::Small => "small",
        CellSize::Tall => "tall",
        CellSize::Large => "large",
    }
}

/// Format the review mosaic one cell per line.
pub fn format_grid(cells: &[GridCell], date: NaiveDate) -> Vec<String> {
    let mut lines = vec![format!("Review grid for {date}")];
    for (i, cell) in cells.iter().enumerate() {
        let label = match (&cell.review.author_name, &cell.review.quote) {
            (Some(author), _) => author.clone(),
            (None, Some(quote)) => format!("\"{}\"", truncate(quote, 24)),
            (None, None) => String::new(),
        };
        let star = if cell.review.is_featured { "*" } else { " " };
        lines.push(
            format!(
                "{} {:<6} {:<13}{}{} {}",
                format_index(i + 1),
                size_label(cell.size),
                cell.kind.to_string(),
                star,
                cell.review.id,
                label
            )
            .trim_end()
            .to_string(),
        );
    }
    let big = cells.iter().filter(|c| c.size.is_big()).count();
    lines.push(String::new());
    lines.push(format!("{}, {} big", plural(cells.len(), "cell"), big));
    lines
}

pub fn print_grid(cells: &[GridCell], date: NaiveDate) {
    print_lines(format_grid(cells, date));
}

// ============================================================================
// Availability output
// ============================================================================

/// Format per-day availability for one service and month.
pub fn format_availability(
    service: &ServiceKey,
    month: &str,
    days: &BTreeMap<NaiveDate, bool>,
) -> Vec<String> {
    let mut lines = vec![format!("{service} {month}")];
    for (date, open) in days {
        lines.push(format!(
            "{}{} {}",
            indent(1),
            date.format("%a %d"),
            if *open { "open" } else { "full" }
        ));
    }
    let open = days.values().filter(|open| **open).count();
    lines.push(String::new());
    lines.push(format!("{open} of {} open", plural(days.len(), "day")));
    lines
}

pub fn print_availability(service: &ServiceKey, month: &str, days: &BTreeMap<NaiveDate, bool>) {
    print_lines(format_availability(service, month, days));
}

// ============================================================================
// Preferences output
// ============================================================================

/// Format the stored key/value pairs, sorted by key.
pub fn format_preferences(entries: &[(String, String)]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No preferences stored".to_string()];
    }
    let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(k, v)| format!("{:<width$}  {}", k, v))
        .collect()
}

pub fn print_preferences(entries: &[(String, String)]) {
    print_lines(format_preferences(entries));
}
