//! Apply a page reconciliation plan to the database.
//!
//! ```text
//! RouteManifest ─► derive_candidates ─► fetch rows ─► reconcile ─► patch ─► insert
//! ```
//!
//! Patches run before inserts so a legacy row adopted in this run is never
//! also inserted under its new slug. Both writes are upserts, so a run that
//! dies halfway can simply be repeated.
//!
//! A failed run is logged through `tracing` and, when an error log path is
//! given, appended there with a timestamp, the full error chain and a
//! backtrace.

use crate::config::SiteConfig;
use crate::http::UpstreamError;
use crate::reconcile::{self, Adoption, Conflict, ReconcileOptions, SyncPlan};
use crate::scan::RouteManifest;
use crate::store::PageStore;
use crate::types::{NewPage, PageRow};
use serde::Serialize;
use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to fetch existing pages: {0}")]
    Fetch(#[source] UpstreamError),
    #[error("failed to adopt legacy pages: {0}")]
    Patch(#[source] UpstreamError),
    #[error("failed to insert new pages: {0}")]
    Insert(#[source] UpstreamError),
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute and report the plan without writing.
    pub dry_run: bool,
    /// File that failed runs are appended to.
    pub error_log: Option<PathBuf>,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Routes in the manifest.
    pub total_scanned: usize,
    /// `(route, language)` pairs that should exist as rows.
    pub candidates: usize,
    pub in_sync: usize,
    pub adoptions: Vec<Adoption>,
    pub conflicts: Vec<Conflict>,
    /// Rows the database actually created.
    pub inserted: Vec<PageRow>,
    /// Rows whose `component_key` was written.
    pub updated: Vec<PageRow>,
    /// Inserts planned but not written (dry run), or skipped by the database
    /// because the slug appeared concurrently.
    pub pending_inserts: Vec<NewPage>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn new_pages(&self) -> usize {
        self.inserted.len()
    }
}

/// Run the full sync against `store`.
pub async fn sync_pages(
    manifest: &RouteManifest,
    config: &SiteConfig,
    store: &dyn PageStore,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let result = run(manifest, config, store, options.dry_run).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "page sync failed");
        if let Some(path) = &options.error_log
            && let Err(io_err) = append_error_log(path, err)
        {
            tracing::warn!(path = %path.display(), error = %io_err, "could not write sync error log");
        }
    }
    result
}

async fn run(
    manifest: &RouteManifest,
    config: &SiteConfig,
    store: &dyn PageStore,
    dry_run: bool,
) -> Result<SyncReport, SyncError> {
    let candidates =
        reconcile::derive_candidates(manifest, &config.site.languages, &config.pages);
    let existing = store.fetch_pages().await.map_err(SyncError::Fetch)?;
    tracing::debug!(
        routes = manifest.len(),
        candidates = candidates.len(),
        existing = existing.len(),
        "reconciling pages"
    );

    let plan = reconcile::reconcile(
        &candidates,
        &existing,
        ReconcileOptions::from(&config.pages),
    );
    let new_pages: Vec<NewPage> = plan
        .inserts
        .iter()
        .map(|c| c.to_new_page(&config.pages.default_status))
        .collect();

    let SyncPlan {
        adoptions,
        conflicts,
        in_sync,
        ..
    } = plan;
    let mut report = SyncReport {
        total_scanned: manifest.len(),
        candidates: candidates.len(),
        in_sync,
        adoptions,
        conflicts,
        dry_run,
        ..Default::default()
    };

    if dry_run {
        report.pending_inserts = new_pages;
        return Ok(report);
    }

    let patches: Vec<_> = report.adoptions.iter().map(Adoption::to_patch).collect();
    report.updated = store
        .patch_component_keys(&patches)
        .await
        .map_err(SyncError::Patch)?;

    report.inserted = store
        .insert_pages(&new_pages)
        .await
        .map_err(SyncError::Insert)?;
    report.pending_inserts = new_pages
        .into_iter()
        .filter(|page| {
            !report
                .inserted
                .iter()
                .any(|row| row.language == page.language && row.slug == page.slug)
        })
        .collect();

    tracing::info!(
        inserted = report.inserted.len(),
        updated = report.updated.len(),
        conflicts = report.conflicts.len(),
        "page sync complete"
    );
    Ok(report)
}

/// Append a timestamped entry with the error chain and a backtrace.
pub fn append_error_log(path: &Path, err: &(dyn std::error::Error + 'static)) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{}] {}", chrono::Utc::now().to_rfc3339(), err)?;
    let mut source = err.source();
    while let Some(cause) = source {
        writeln!(file, "  caused by: {cause}")?;
        source = cause.source();
    }
    writeln!(file, "{}", Backtrace::force_capture())?;
    writeln!(file)?;
    Ok(())
}
