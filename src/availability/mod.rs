//! Per-day booking availability, fetched in chunks and cached in memory.
//!
//! Loading a month asks the scheduling API for one day at a time. To keep the
//! first paint fast, [`AvailabilityCache::load_month`] awaits only the first
//! chunk of days and hands the rest to a background task:
//!
//! ```text
//! month ─► weekdays from today ─► chunks of `chunk_days`
//!            chunk 0: awaited, days requested concurrently
//!            chunk 1..n: spawned task, one chunk after another
//! ```
//!
//! Every result is merged into one map keyed by date (last write wins). A day
//! whose request failed is stored as having no slots. A day invalidated after
//! a load started is not put back by that load. Which months have been
//! loaded is remembered in a [`KeyValueStore`] so a second load is free.

pub mod calendar;
pub mod zoho;

pub use calendar::{YearMonth, bookable_days};
pub use zoho::ZohoClient;

use crate::config::{ConfigError, SiteConfig};
use crate::http::UpstreamError;
use crate::kv::{KeyValueStore, KvError};
use crate::store::SlotStore;
use crate::types::{AvailabilityRow, ServiceKey};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Upstream that knows the open time slots of a service on a day.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn available_slots(
        &self,
        service: &BookableService,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError>;
}

/// A service key resolved to its upstream ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookableService {
    pub key: ServiceKey,
    pub service_id: String,
    pub staff_id: String,
}

impl BookableService {
    pub fn from_config(config: &SiteConfig, key: &ServiceKey) -> Result<Self, ConfigError> {
        let ids = config.service(&key.to_string())?;
        Ok(Self {
            key: key.clone(),
            service_id: ids.service_id.clone(),
            staff_id: ids.staff_id.clone(),
        })
    }
}

/// What a [`AvailabilityCache::load_month`] call did.
#[derive(Debug)]
pub struct MonthLoad {
    pub month: YearMonth,
    /// The month was already marked loaded; nothing was fetched.
    pub already_loaded: bool,
    /// Days fetched before returning.
    pub first_chunk: Vec<NaiveDate>,
    /// Days handed to the background task.
    pub background_days: usize,
    /// Background task, if any days remained after the first chunk.
    pub remaining: Option<JoinHandle<()>>,
}

impl MonthLoad {
    /// Wait for the background chunks to finish.
    pub async fn finish(self) {
        if let Some(handle) = self.remaining
            && let Err(e) = handle.await
        {
            tracing::warn!(month = %self.month, error = %e, "background availability load aborted");
        }
    }
}

type DayMap = Arc<RwLock<BTreeMap<NaiveDate, Vec<String>>>>;

/// Invalidation epochs: the counter at the time each date was last forgotten.
#[derive(Debug, Default)]
struct Invalidations {
    epoch: u64,
    dates: HashMap<NaiveDate, u64>,
}

impl Invalidations {
    fn invalidated_since(&self, date: NaiveDate, epoch: u64) -> bool {
        self.dates.get(&date).is_some_and(|at| *at > epoch)
    }
}

type Stale = Arc<std::sync::Mutex<Invalidations>>;

fn lock_stale(stale: &Stale) -> std::sync::MutexGuard<'_, Invalidations> {
    stale.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory availability for one service.
#[derive(Clone)]
pub struct AvailabilityCache {
    service: BookableService,
    source: Arc<dyn AvailabilitySource>,
    session: Arc<dyn KeyValueStore>,
    days: DayMap,
    stale: Stale,
    chunk_days: usize,
}

impl AvailabilityCache {
    pub fn new(
        service: BookableService,
        source: Arc<dyn AvailabilitySource>,
        session: Arc<dyn KeyValueStore>,
        chunk_days: usize,
    ) -> Self {
        Self {
            service,
            source,
            session,
            days: Arc::default(),
            stale: Arc::default(),
            chunk_days: chunk_days.max(1),
        }
    }

    pub fn service(&self) -> &BookableService {
        &self.service
    }

    fn marker_key(&self, month: YearMonth) -> String {
        format!("availability_loaded:{}:{}", self.service.key, month)
    }

    /// Fetch the bookable days of `month` not yet loaded in this session.
    ///
    /// Returns once the first chunk is merged. The month is marked loaded
    /// before any request goes out, so overlapping calls do not fetch twice.
    pub async fn load_month(
        &self,
        month: YearMonth,
        today: NaiveDate,
    ) -> Result<MonthLoad, KvError> {
        let marker = self.marker_key(month);
        if self.session.get(&marker)?.is_some() {
            tracing::debug!(service = %self.service.key, %month, "month already loaded");
            return Ok(MonthLoad {
                month,
                already_loaded: true,
                first_chunk: Vec::new(),
                background_days: 0,
                remaining: None,
            });
        }
        self.session.set(&marker, "1")?;

        let days = bookable_days(month, today);
        let mut chunks: Vec<Vec<NaiveDate>> =
            days.chunks(self.chunk_days).map(<[_]>::to_vec).collect();
        let first_chunk = if chunks.is_empty() {
            Vec::new()
        } else {
            chunks.remove(0)
        };
        tracing::info!(
            service = %self.service.key,
            %month,
            days = days.len(),
            chunks = chunks.len() + usize::from(!first_chunk.is_empty()),
            "loading availability"
        );

        let started = lock_stale(&self.stale).epoch;
        fetch_chunk(
            &*self.source,
            &self.service,
            &self.days,
            &self.stale,
            started,
            &first_chunk,
        )
        .await;

        let background_days = chunks.iter().map(Vec::len).sum();
        let remaining = if chunks.is_empty() {
            None
        } else {
            let source = Arc::clone(&self.source);
            let service = self.service.clone();
            let days = Arc::clone(&self.days);
            let stale = Arc::clone(&self.stale);
            Some(tokio::spawn(async move {
                for chunk in chunks {
                    fetch_chunk(&*source, &service, &days, &stale, started, &chunk).await;
                }
                tracing::debug!(service = %service.key, %month, "background availability load done");
            }))
        };

        Ok(MonthLoad {
            month,
            already_loaded: false,
            first_chunk,
            background_days,
            remaining,
        })
    }

    /// `Some(true)` if the date has open slots, `None` if it was never fetched.
    pub async fn has_availability(&self, date: NaiveDate) -> Option<bool> {
        self.days.read().await.get(&date).map(|s| !s.is_empty())
    }

    pub async fn slots(&self, date: NaiveDate) -> Option<Vec<String>> {
        self.days.read().await.get(&date).cloned()
    }

    /// Fetched days of `month` and whether each has open slots.
    pub async fn month_summary(&self, month: YearMonth) -> BTreeMap<NaiveDate, bool> {
        self.days
            .read()
            .await
            .range(month.first_day()..=month.last_day())
            .map(|(date, slots)| (*date, !slots.is_empty()))
            .collect()
    }

    /// Forget a date and its month's loaded marker, so the next load refetches.
    ///
    /// Loads already in flight skip the date when they merge.
    pub async fn invalidate(&self, date: NaiveDate) -> Result<(), KvError> {
        {
            let mut stale = lock_stale(&self.stale);
            stale.epoch += 1;
            let epoch = stale.epoch;
            stale.dates.insert(date, epoch);
        }
        self.days.write().await.remove(&date);
        self.session.remove(&self.marker_key(YearMonth::of(date)))
    }

    /// Re-ask upstream whether `time` on `date` is still open.
    ///
    /// Upstream failure answers `true`; the appointment call is the final check.
    pub async fn is_slot_still_available(&self, date: NaiveDate, time: &str) -> bool {
        match self.source.available_slots(&self.service, date).await {
            Ok(slots) => {
                let open = slots.iter().any(|s| s == time);
                self.days.write().await.insert(date, slots);
                open
            }
            Err(e) => {
                tracing::warn!(
                    service = %self.service.key,
                    %date,
                    error = %e,
                    "slot recheck failed, assuming still available"
                );
                true
            }
        }
    }

    /// Snapshot as table rows.
    pub async fn to_rows(&self) -> Vec<AvailabilityRow> {
        self.days
            .read()
            .await
            .iter()
            .map(|(date, slots)| AvailabilityRow {
                service_key: self.service.key.to_string(),
                date: *date,
                staff_id: self.service.staff_id.clone(),
                time_slots: slots.clone(),
            })
            .collect()
    }

    /// Write every cached day to the availability table.
    pub async fn persist(&self, store: &dyn SlotStore) -> Result<usize, UpstreamError> {
        let rows = self.to_rows().await;
        store.upsert_slots(&rows).await?;
        Ok(rows.len())
    }
}

/// One [`AvailabilityCache`] per service, created on first use and shared by
/// every caller in the process.
pub struct AvailabilityRegistry {
    source: Arc<dyn AvailabilitySource>,
    session: Arc<dyn KeyValueStore>,
    chunk_days: usize,
    caches: std::sync::Mutex<HashMap<ServiceKey, AvailabilityCache>>,
}

impl AvailabilityRegistry {
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        session: Arc<dyn KeyValueStore>,
        chunk_days: usize,
    ) -> Self {
        Self {
            source,
            session,
            chunk_days,
            caches: std::sync::Mutex::default(),
        }
    }

    pub fn cache(&self, service: &BookableService) -> AvailabilityCache {
        let mut caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        caches
            .entry(service.key.clone())
            .or_insert_with(|| {
                AvailabilityCache::new(
                    service.clone(),
                    Arc::clone(&self.source),
                    Arc::clone(&self.session),
                    self.chunk_days,
                )
            })
            .clone()
    }
}

/// Request every day of `chunk` concurrently and merge the results, except
/// days invalidated after epoch `started`.
async fn fetch_chunk(
    source: &dyn AvailabilitySource,
    service: &BookableService,
    days: &DayMap,
    stale: &Stale,
    started: u64,
    chunk: &[NaiveDate],
) {
    if chunk.is_empty() {
        return;
    }
    let results = join_all(chunk.iter().map(|date| async move {
        (*date, source.available_slots(service, *date).await)
    }))
    .await;

    let mut map = days.write().await;
    let stale = lock_stale(stale);
    for (date, result) in results {
        if stale.invalidated_since(date, started) {
            tracing::debug!(service = %service.key, %date, "skipping day invalidated during load");
            continue;
        }
        let slots = result.unwrap_or_else(|e| {
            tracing::warn!(service = %service.key, %date, error = %e, "availability request failed");
            Vec::new()
        });
        map.insert(date, slots);
    }
}
