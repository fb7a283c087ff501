//! Route segment classification for the page directory convention.
//!
//! Every page lives in its own directory under the routes root, and the
//! directory names encode the URL:
//!
//! - `[lang]` (configurable) is the language placeholder, replaced by each
//!   language code when slugs are derived
//! - `(marketing)` and other parenthesised names group routes without
//!   appearing in the URL
//! - `[id]`, `[...slug]` and other bracketed names are dynamic parameters
//! - anything else is a literal URL segment
//!
//! ## Display Titles
//!
//! Dashes in a literal segment become spaces and the first letter is
//! capitalised, so `haartransplantatie-kosten` is shown as
//! "Haartransplantatie kosten".

/// One directory name of a route path, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// The language placeholder segment.
    Language,
    /// `(name)`: grouping only, excluded from URLs.
    Group(&'a str),
    /// `[name]` or `[...name]`: a dynamic parameter that cannot be enumerated.
    Dynamic(&'a str),
    /// A literal URL segment.
    Static(&'a str),
}

/// Classify a single directory name.
///
/// The placeholder is matched exactly, so with the default `[lang]`:
/// - `"[lang]"` → `Language`
/// - `"(marketing)"` → `Group("marketing")`
/// - `"[id]"` → `Dynamic("id")`, `"[...slug]"` → `Dynamic("slug")`
/// - `"over-ons"` → `Static("over-ons")`
pub fn parse_segment<'a>(segment: &'a str, placeholder: &str) -> Segment<'a> {
    if segment == placeholder {
        return Segment::Language;
    }
    if let Some(inner) = segment
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        return Segment::Group(inner);
    }
    if let Some(inner) = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    {
        return Segment::Dynamic(inner.trim_start_matches("..."));
    }
    Segment::Static(segment)
}

/// Split a `/`-separated route path into classified segments, ignoring
/// empty components.
pub fn route_segments<'a>(route: &'a str, placeholder: &str) -> Vec<Segment<'a>> {
    route
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| parse_segment(s, placeholder))
        .collect()
}

/// Human title for a literal segment: dashes → spaces, first letter upper-cased.
pub fn display_title(segment: &str) -> String {
    let spaced = segment.replace(['-', '_'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
