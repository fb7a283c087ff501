//! Slug derivation and pure page reconciliation.
//!
//! Two pure steps sit between the route manifest and the database:
//!
//! ```text
//! RouteManifest ──derive_candidates──► Vec<PageCandidate>
//! (candidates, existing rows) ──reconcile──► SyncPlan { adoptions, inserts, conflicts }
//! ```
//!
//! Neither step performs I/O; [`crate::sync`] fetches rows and applies the plan.
//!
//! # Matching policy
//!
//! For each candidate, in priority order:
//!
//! 1. A row with the same `(language, component_key)` exists: in sync.
//! 2. A row with the same `(language, lowercase slug)` exists:
//!    - without a `component_key`: adopt it, patching only the key
//!    - with another key (or already adopted in this batch): conflict
//! 3. Prefix-stripped lookup: drop a leading `"{language}/"` from the
//!    candidate slug and retry step 2's lookup. A keyless row found this way is
//!    adopted with [`MatchKind::PrefixStripped`]. This repairs rows seeded
//!    without language prefixes; it is a heuristic and can be switched off.
//! 4. Otherwise the candidate is inserted.

use crate::config::PagesConfig;
use crate::naming::{Segment, display_title, route_segments};
use crate::scan::RouteManifest;
use crate::types::{NewPage, PagePatch, PageRow};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Key given to the route at the root of the routes directory.
pub const ROOT_COMPONENT_KEY: &str = "root";

/// One `(route, language)` pair that should exist as a page row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCandidate {
    pub language: String,
    pub slug: String,
    pub component_key: String,
    pub category: String,
    pub title: String,
}

impl PageCandidate {
    pub fn to_new_page(&self, status: &str) -> NewPage {
        NewPage {
            slug: self.slug.clone(),
            component_key: self.component_key.clone(),
            language: self.language.clone(),
            category: self.category.clone(),
            status: status.to_string(),
            title: self.title.clone(),
        }
    }
}

/// Derive the candidate rows for every route in every language.
///
/// Routes with dynamic segments and slugs hitting `config.excluded` are
/// skipped. Candidates are deduplicated by `(language, lowercase slug)`,
/// first one wins.
pub fn derive_candidates(
    manifest: &RouteManifest,
    languages: &[String],
    config: &PagesConfig,
) -> Vec<PageCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for route in &manifest.routes {
        let segments = route_segments(route, &config.language_placeholder);
        if let Some(Segment::Dynamic(param)) =
            segments.iter().find(|s| matches!(s, Segment::Dynamic(_)))
        {
            tracing::debug!(route = %route, param = %param, "skipping dynamic route");
            continue;
        }
        if !segments
            .iter()
            .any(|s| matches!(s, Segment::Language | Segment::Static(_)))
        {
            tracing::debug!(route = %route, "skipping route with no slug segments");
            continue;
        }
        let component_key = component_key(route, &config.language_placeholder);

        for language in languages {
            let slug = slug_for(&segments, language);
            if is_excluded(&slug, &config.excluded) {
                continue;
            }
            if !seen.insert((language.clone(), slug.to_lowercase())) {
                continue;
            }
            candidates.push(PageCandidate {
                language: language.clone(),
                category: category_for(&segments),
                title: title_for(&segments),
                component_key: component_key.clone(),
                slug,
            });
        }
    }

    candidates
}

/// Slug for one language: static segments and the substituted language code,
/// groups dropped. An empty route maps to `/`.
pub fn slug_for(segments: &[Segment<'_>], language: &str) -> String {
    let parts: Vec<&str> = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Language => Some(language),
            Segment::Static(name) => Some(*name),
            Segment::Group(_) | Segment::Dynamic(_) => None,
        })
        .collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        parts.join("/")
    }
}

/// Language-independent identity of a route: every segment except the
/// language placeholder, groups included.
pub fn component_key(route: &str, placeholder: &str) -> String {
    let key = route
        .split('/')
        .filter(|s| !s.is_empty() && *s != placeholder)
        .collect::<Vec<_>>()
        .join("/");
    if key.is_empty() {
        ROOT_COMPONENT_KEY.to_string()
    } else {
        key
    }
}

fn is_excluded(slug: &str, excluded: &[String]) -> bool {
    let padded = format!("/{}/", slug.trim_matches('/'));
    excluded.iter().any(|pattern| padded.contains(pattern.as_str()))
}

fn category_for(segments: &[Segment<'_>]) -> String {
    segments
        .iter()
        .find_map(|s| match s {
            Segment::Static(name) => Some(name.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "general".to_string())
}

fn title_for(segments: &[Segment<'_>]) -> String {
    segments
        .iter()
        .rev()
        .find_map(|s| match s {
            Segment::Static(name) => Some(display_title(name)),
            _ => None,
        })
        .unwrap_or_else(|| "Home".to_string())
}

// =============================================================================
// Reconciliation
// =============================================================================

/// How an adopted legacy row was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The row's slug equals the candidate slug.
    Exact,
    /// The row's slug equals the candidate slug minus its `{language}/` prefix.
    PrefixStripped,
}

/// A keyless legacy row that will receive a `component_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adoption {
    pub row_id: String,
    /// The row's current slug, left untouched.
    pub row_slug: String,
    pub language: String,
    pub component_key: String,
    pub kind: MatchKind,
}

impl Adoption {
    pub fn to_patch(&self) -> PagePatch {
        PagePatch {
            id: self.row_id.clone(),
            component_key: self.component_key.clone(),
        }
    }
}

/// A candidate whose slug is owned by a row bound to another component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub language: String,
    pub slug: String,
    pub component_key: String,
    pub row_id: String,
    pub row_component_key: Option<String>,
}

/// Work needed to bring the table in line with the candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub adoptions: Vec<Adoption>,
    pub inserts: Vec<PageCandidate>,
    pub conflicts: Vec<Conflict>,
    /// Candidates already bound to a row.
    pub in_sync: usize,
}

impl SyncPlan {
    /// True when applying the plan would not write anything.
    pub fn is_noop(&self) -> bool {
        self.adoptions.is_empty() && self.inserts.is_empty()
    }

    pub fn patches(&self) -> Vec<PagePatch> {
        self.adoptions.iter().map(Adoption::to_patch).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Enable the prefix-stripped second lookup.
    pub adopt_unprefixed_slugs: bool,
}

impl From<&PagesConfig> for ReconcileOptions {
    fn from(config: &PagesConfig) -> Self {
        Self {
            adopt_unprefixed_slugs: config.adopt_unprefixed_slugs,
        }
    }
}

/// Compare candidates against the existing rows and decide what to write.
pub fn reconcile(
    candidates: &[PageCandidate],
    existing: &[PageRow],
    options: ReconcileOptions,
) -> SyncPlan {
    let mut by_key: HashSet<(&str, &str)> = HashSet::new();
    let mut by_slug: HashMap<(&str, String), &PageRow> = HashMap::new();
    for row in existing {
        if let Some(key) = row.component_key.as_deref() {
            by_key.insert((row.language.as_str(), key));
        }
        by_slug
            .entry((row.language.as_str(), row.slug.to_lowercase()))
            .or_insert(row);
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut plan = SyncPlan::default();

    for candidate in candidates {
        let language = candidate.language.as_str();
        if by_key.contains(&(language, candidate.component_key.as_str())) {
            plan.in_sync += 1;
            continue;
        }

        let slug = candidate.slug.to_lowercase();
        if let Some(row) = by_slug.get(&(language, slug.clone())) {
            if row.component_key.is_none() && claimed.insert(row.id.as_str()) {
                plan.adoptions
                    .push(adopt(row, candidate, MatchKind::Exact));
            } else {
                tracing::warn!(
                    language,
                    slug = %candidate.slug,
                    row_id = %row.id,
                    "slug already bound to another component"
                );
                plan.conflicts.push(Conflict {
                    language: candidate.language.clone(),
                    slug: candidate.slug.clone(),
                    component_key: candidate.component_key.clone(),
                    row_id: row.id.clone(),
                    row_component_key: row.component_key.clone(),
                });
            }
            continue;
        }

        if options.adopt_unprefixed_slugs
            && let Some(row) = prefix_stripped_match(&by_slug, language, &slug)
            && claimed.insert(row.id.as_str())
        {
            plan.adoptions
                .push(adopt(row, candidate, MatchKind::PrefixStripped));
            continue;
        }

        plan.inserts.push(candidate.clone());
    }

    plan
}

/// Second lookup: the candidate slug without its `{language}/` prefix, only
/// accepted when the row found has no key yet.
fn prefix_stripped_match<'a>(
    by_slug: &HashMap<(&str, String), &'a PageRow>,
    language: &str,
    slug: &str,
) -> Option<&'a PageRow> {
    let prefix = format!("{}/", language.to_lowercase());
    let stripped = slug.strip_prefix(&prefix)?;
    by_slug
        .get(&(language, stripped.to_string()))
        .copied()
        .filter(|row| row.component_key.is_none())
}

fn adopt(row: &PageRow, candidate: &PageCandidate, kind: MatchKind) -> Adoption {
    Adoption {
        row_id: row.id.clone(),
        row_slug: row.slug.clone(),
        language: candidate.language.clone(),
        component_key: candidate.component_key.clone(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::page_row;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn langs() -> Vec<String> {
        vec!["nl".to_string(), "en".to_string()]
    }

    fn candidates_for(routes: &[&str]) -> Vec<PageCandidate> {
        derive_candidates(
            &RouteManifest::new(routes.iter().copied()),
            &langs(),
            &PagesConfig::default(),
        )
    }

    fn candidate(language: &str, slug: &str, key: &str) -> PageCandidate {
        PageCandidate {
            language: language.to_string(),
            slug: slug.to_string(),
            component_key: key.to_string(),
            category: "general".to_string(),
            title: "T".to_string(),
        }
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            adopt_unprefixed_slugs: true,
        }
    }

    // =========================================================================
    // Slug derivation
    // =========================================================================

    #[rstest]
    #[case("[lang]/(marketing)/over-ons", "nl", "nl/over-ons")]
    #[case("[lang]/(marketing)/over-ons", "en", "en/over-ons")]
    #[case("[lang]", "en", "en")]
    #[case("", "nl", "/")]
    #[case("(site)/privacy", "nl", "privacy")]
    #[case("[lang]/(a)/(b)/faq", "nl", "nl/faq")]
    fn slug_substitutes_language_and_drops_groups(
        #[case] route: &str,
        #[case] language: &str,
        #[case] expected: &str,
    ) {
        let segments = route_segments(route, "[lang]");
        assert_eq!(slug_for(&segments, language), expected);
    }

    #[rstest]
    #[case("[lang]/(marketing)/over-ons", "(marketing)/over-ons")]
    #[case("[lang]", ROOT_COMPONENT_KEY)]
    #[case("", ROOT_COMPONENT_KEY)]
    #[case("privacy", "privacy")]
    fn component_key_ignores_language(#[case] route: &str, #[case] expected: &str) {
        assert_eq!(component_key(route, "[lang]"), expected);
    }

    #[test]
    fn candidates_per_language_share_component_key() {
        let candidates = candidates_for(&["[lang]/(marketing)/behandelingen/fue"]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].slug, "nl/behandelingen/fue");
        assert_eq!(candidates[1].slug, "en/behandelingen/fue");
        assert_eq!(candidates[0].component_key, candidates[1].component_key);
        assert_eq!(candidates[0].category, "behandelingen");
        assert_eq!(candidates[0].title, "Fue");
    }

    #[test]
    fn bare_root_and_group_only_routes_are_skipped() {
        let candidates = candidates_for(&["", "(marketing)", "[lang]"]);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.component_key == ROOT_COMPONENT_KEY));
        assert_eq!(candidates[0].slug, "nl");
    }

    #[test]
    fn language_home_gets_home_title() {
        let candidates = candidates_for(&["[lang]"]);
        assert_eq!(candidates[0].slug, "nl");
        assert_eq!(candidates[0].title, "Home");
        assert_eq!(candidates[0].category, "general");
    }

    #[test]
    fn dynamic_routes_are_skipped() {
        let candidates = candidates_for(&["[lang]/blog/[slug]", "[lang]/blog"]);
        let slugs: Vec<&str> = candidates.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["nl/blog", "en/blog"]);
    }

    #[test]
    fn excluded_namespaces_are_skipped() {
        let candidates = candidates_for(&["admin/pages", "api/sync", "[lang]/administratie"]);
        let slugs: Vec<&str> = candidates.iter().map(|c| c.slug.as_str()).collect();
        // "/administratie/" contains "/admin" as a substring
        assert!(slugs.is_empty(), "unexpected {slugs:?}");
    }

    #[test]
    fn api_substring_needs_segment_boundary() {
        let candidates = candidates_for(&["[lang]/rapid-herstel", "[lang]/api"]);
        let slugs: Vec<&str> = candidates.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["nl/rapid-herstel", "en/rapid-herstel"]);
    }

    #[test]
    fn routes_without_placeholder_exist_per_language() {
        let candidates = candidates_for(&["privacy"]);
        // Same slug for both languages, but identity includes the language.
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].language, "nl");
        assert_eq!(candidates[1].language, "en");
    }

    #[test]
    fn dedup_is_case_insensitive_within_language() {
        let candidates = candidates_for(&["[lang]/FAQ", "[lang]/faq"]);
        let nl: Vec<&str> = candidates
            .iter()
            .filter(|c| c.language == "nl")
            .map(|c| c.slug.as_str())
            .collect();
        assert_eq!(nl.len(), 1);
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    #[test]
    fn empty_table_inserts_everything() {
        let candidates = vec![candidate("nl", "nl/faq", "faq"), candidate("en", "en/faq", "faq")];
        let plan = reconcile(&candidates, &[], options());
        assert_eq!(plan.inserts, candidates);
        assert!(plan.adoptions.is_empty());
        assert_eq!(plan.in_sync, 0);
    }

    #[test]
    fn keyed_row_is_in_sync_even_after_slug_edit() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "nl", "nl/veelgestelde-vragen", Some("faq"))];
        let plan = reconcile(&candidates, &existing, options());
        assert!(plan.is_noop());
        assert_eq!(plan.in_sync, 1);
    }

    #[test]
    fn keyless_row_with_exact_slug_is_adopted() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "nl", "nl/FAQ", None)];
        let plan = reconcile(&candidates, &existing, options());

        assert_eq!(
            plan.adoptions,
            vec![Adoption {
                row_id: "1".into(),
                row_slug: "nl/FAQ".into(),
                language: "nl".into(),
                component_key: "faq".into(),
                kind: MatchKind::Exact,
            }]
        );
        assert!(plan.inserts.is_empty());
        assert_eq!(
            plan.patches(),
            vec![PagePatch {
                id: "1".into(),
                component_key: "faq".into()
            }]
        );
    }

    #[test]
    fn keyless_row_without_prefix_is_adopted_separately() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "nl", "faq", None)];
        let plan = reconcile(&candidates, &existing, options());

        assert_eq!(plan.adoptions.len(), 1);
        assert_eq!(plan.adoptions[0].kind, MatchKind::PrefixStripped);
        assert_eq!(plan.adoptions[0].row_slug, "faq");
    }

    #[test]
    fn prefix_stripped_lookup_can_be_disabled() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "nl", "faq", None)];
        let plan = reconcile(
            &candidates,
            &existing,
            ReconcileOptions {
                adopt_unprefixed_slugs: false,
            },
        );
        assert!(plan.adoptions.is_empty());
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn prefix_stripped_lookup_respects_language() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "en", "faq", None)];
        let plan = reconcile(&candidates, &existing, options());
        assert!(plan.adoptions.is_empty());
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn prefix_stripped_match_with_key_falls_through_to_insert() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![page_row("1", "nl", "faq", Some("legacy/faq"))];
        let plan = reconcile(&candidates, &existing, options());
        assert!(plan.adoptions.is_empty());
        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn exact_slug_bound_to_other_key_is_conflict() {
        let candidates = vec![candidate("nl", "nl/faq", "(site)/faq")];
        let existing = vec![page_row("9", "nl", "nl/faq", Some("faq"))];
        let plan = reconcile(&candidates, &existing, options());

        assert!(plan.is_noop());
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].row_id, "9");
        assert_eq!(plan.conflicts[0].row_component_key.as_deref(), Some("faq"));
    }

    #[test]
    fn legacy_row_is_not_adopted_twice() {
        // "nl/faq" adopts row 1 via the stripped prefix; the root-level "faq"
        // candidate then finds the same row already claimed.
        let candidates = vec![
            candidate("nl", "nl/faq", "faq"),
            candidate("nl", "faq", "(legacy)/faq"),
        ];
        let existing = vec![page_row("1", "nl", "faq", None)];
        let plan = reconcile(&candidates, &existing, options());

        assert_eq!(plan.adoptions.len(), 1);
        assert_eq!(plan.adoptions[0].component_key, "faq");
        assert_eq!(plan.conflicts.len(), 1);
    }

    #[test]
    fn exact_match_preferred_over_prefix_stripped() {
        let candidates = vec![candidate("nl", "nl/faq", "faq")];
        let existing = vec![
            page_row("1", "nl", "faq", None),
            page_row("2", "nl", "nl/faq", None),
        ];
        let plan = reconcile(&candidates, &existing, options());
        assert_eq!(plan.adoptions.len(), 1);
        assert_eq!(plan.adoptions[0].row_id, "2");
        assert_eq!(plan.adoptions[0].kind, MatchKind::Exact);
    }

    #[test]
    fn mixed_batch() {
        let candidates = candidates_for(&["[lang]", "[lang]/contact", "[lang]/(marketing)/over-ons"]);
        let existing = vec![
            page_row("1", "nl", "nl", Some(ROOT_COMPONENT_KEY)),
            page_row("2", "en", "en", Some(ROOT_COMPONENT_KEY)),
            page_row("3", "nl", "contact", None),
            page_row("4", "en", "en/about-us", Some("(marketing)/over-ons")),
        ];
        let plan = reconcile(&candidates, &existing, options());

        assert_eq!(plan.in_sync, 3);
        assert_eq!(plan.adoptions.len(), 1);
        assert_eq!(plan.adoptions[0].row_id, "3");
        let inserted: Vec<&str> = plan.inserts.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(inserted, vec!["nl/over-ons", "en/contact"]);
        assert_eq!(plan.adoptions[0].kind, MatchKind::PrefixStripped);
    }
}
