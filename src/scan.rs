//! Route tree scanning and the route manifest.
//!
//! First step of page sync. Walks the routes directory, finds every page
//! marker file and records the directory it lives in. The result is a plain
//! [`RouteManifest`]: a sorted list of `/`-separated route paths, relative to
//! the routes root. Everything downstream (slug derivation, reconciliation)
//! works from the manifest, never from the filesystem, so the manifest can
//! equally be written by hand or generated by another build tool.
//!
//! ## Directory Structure
//!
//! ```text
//! app/                                   # Routes root
//! ├── page.tsx                           # → ""            (site root)
//! ├── [lang]/
//! │   ├── page.tsx                       # → "[lang]"      (language home)
//! │   ├── (marketing)/
//! │   │   ├── over-ons/page.tsx          # → "[lang]/(marketing)/over-ons"
//! │   │   └── behandelingen/
//! │   │       └── fue/page.tsx           # → "[lang]/(marketing)/behandelingen/fue"
//! │   └── blog/[slug]/page.tsx           # → "[lang]/blog/[slug]"
//! ├── admin/pages/page.tsx               # → "admin/pages"
//! └── api/...                            # route handlers, no marker file
//! ```
//!
//! Hidden directories and `node_modules` are never descended.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Routes root does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// Declarative list of routable page directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteManifest {
    /// Route paths relative to the routes root, `/`-separated, sorted.
    /// The root page itself is the empty string.
    pub routes: Vec<String>,
}

impl RouteManifest {
    pub fn new(routes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut routes: Vec<String> = routes.into_iter().map(Into::into).collect();
        routes.sort();
        routes.dedup();
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Read a manifest previously written with [`RouteManifest::save`].
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let content = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(Self::new(manifest.routes))
    }

    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Walk `root` and collect the directory of every file named `marker_file`.
pub fn scan(root: &Path, marker_file: &str) -> Result<RouteManifest, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let mut routes = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != marker_file {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        routes.push(relative_route(dir, root));
    }

    tracing::debug!(root = %root.display(), routes = routes.len(), "scanned route tree");
    Ok(RouteManifest::new(routes))
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

/// `/`-joined path of `dir` below `root`; empty for `root` itself.
fn relative_route(dir: &Path, root: &Path) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_fixtures, touch};
    use tempfile::TempDir;

    #[test]
    fn scan_finds_all_marker_files() {
        let tmp = setup_fixtures();
        let manifest = scan(&tmp.path().join("app"), "page.tsx").unwrap();

        assert_eq!(
            manifest.routes,
            vec![
                "",
                "[lang]",
                "[lang]/(marketing)/behandelingen/fue",
                "[lang]/(marketing)/behandelingen/haartransplantatie",
                "[lang]/(marketing)/over-ons",
                "[lang]/blog/[slug]",
                "[lang]/contact",
                "admin/pages",
            ]
        );
    }

    #[test]
    fn scan_ignores_other_files() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("prijzen/page.tsx"));
        touch(&tmp.path().join("prijzen/layout.tsx"));
        touch(&tmp.path().join("api/route.ts"));

        let manifest = scan(tmp.path(), "page.tsx").unwrap();
        assert_eq!(manifest.routes, vec!["prijzen"]);
    }

    #[test]
    fn scan_skips_hidden_and_node_modules() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("contact/page.tsx"));
        touch(&tmp.path().join(".next/server/page.tsx"));
        touch(&tmp.path().join("node_modules/pkg/page.tsx"));

        let manifest = scan(tmp.path(), "page.tsx").unwrap();
        assert_eq!(manifest.routes, vec!["contact"]);
    }

    #[test]
    fn scan_respects_custom_marker() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a/page.tsx"));
        touch(&tmp.path().join("b/page.jsx"));

        let manifest = scan(tmp.path(), "page.jsx").unwrap();
        assert_eq!(manifest.routes, vec!["b"]);
    }

    #[test]
    fn scan_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan(&tmp.path().join("nope"), "page.tsx");
        assert!(matches!(result, Err(ScanError::MissingRoot(_))));
    }

    #[test]
    fn manifest_new_sorts_and_dedups() {
        let manifest = RouteManifest::new(["b", "a", "b"]);
        assert_eq!(manifest.routes, vec!["a", "b"]);
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn manifest_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/routes.json");
        let manifest = RouteManifest::new(["[lang]/contact", "[lang]"]);

        manifest.save(&path).unwrap();
        let loaded = RouteManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn manifest_load_sorts_hand_written_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("routes.json");
        fs::write(&path, r#"{"routes": ["z", "a"]}"#).unwrap();

        let loaded = RouteManifest::load(&path).unwrap();
        assert_eq!(loaded.routes, vec!["a", "z"]);
    }
}
