//! # Clinic Site
//!
//! Back-office engine for a bilingual (Dutch/English) clinic website. The site
//! itself is rendered elsewhere; this crate owns the parts with real logic in
//! them:
//!
//! ```text
//! 1. Page sync     route tree  →  pages table      (one row per route × language)
//! 2. Review grid   reviews     →  mosaic layout    (same layout all day, new one tomorrow)
//! 3. Availability  scheduling  →  per-day cache    (first week now, rest in background)
//! 4. Booking       checkout    →  paid appointment (payment first, then the slot)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the route tree and lists every directory holding a page marker |
//! | [`naming`] | Route segment grammar: language placeholder, `(group)`, `[param]` |
//! | [`reconcile`] | Pure slug derivation and row matching, produces a [`reconcile::SyncPlan`] |
//! | [`sync`] | Applies a plan through a [`store::PageStore`], logs failures |
//! | [`rng`] | Seeded pseudo-random streams (daily seed, LCG, shuffle) |
//! | [`grid`] | Review mosaic: interleaved slot pattern and content placement |
//! | [`availability`] | Scheduling client, month calendar and chunked availability cache |
//! | [`payment`] | Checkout sessions with the payment provider |
//! | [`booking`] | Checkout → payment check → slot recheck → appointment |
//! | [`store`] | Database traits with a hosted REST backend and an in-memory backend |
//! | [`kv`] | String key/value stores and the typed visitor [`kv::Preferences`] |
//! | [`server`] | HTTP endpoints for admin sync, availability and booking |
//! | [`config`] | `site.toml` loading, validation, merging; secrets from the environment |
//! | [`http`] | Shared HTTP client and upstream error type |
//! | [`types`] | Row types shared across modules |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Rows Are Matched, Never Renamed
//!
//! Editors change slugs in the admin UI. A sync run must never undo that, so a
//! row is matched by the route it came from (`component_key`) before it is
//! matched by slug, and an adopted legacy row only gains a key. Nothing is ever
//! deleted: a route that disappears leaves its rows behind for an editor to
//! retire.
//!
//! ## Randomness Is an Input
//!
//! The grid takes its random streams as a parameter. Production passes a
//! [`rng::DailySeed`] so every visitor sees the same mosaic for a day; tests
//! pass a [`rng::FixedSequence`] and assert exact layouts.
//!
//! ## Backends Behind Traits
//!
//! Every outside system (database, scheduling API, payment provider,
//! key/value storage) sits behind a trait. The CLI and server wire in the real
//! clients; the test suites wire in [`store::MemoryDatabase`] and small fakes.

pub mod availability;
pub mod booking;
pub mod config;
pub mod grid;
pub mod http;
pub mod kv;
pub mod naming;
pub mod output;
pub mod payment;
pub mod reconcile;
pub mod rng;
pub mod scan;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
