//! Shared test utilities for the clinic-site test suite.
//!
//! Provides the fixture route tree plus small builders for database rows so
//! unit tests can state their inputs in one line.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let manifest = scan(&tmp.path().join("app"), "page.tsx").unwrap();
//!
//! let existing = vec![page_row("1", "nl", "faq", None)];
//! let reviews = vec![review("r1", ReviewType::Video, true)];
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::types::{PageRow, Review, ReviewType};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Create an empty file, including any missing parent directories.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "").unwrap();
}

// =========================================================================
// Row builders
// =========================================================================

/// A `pages` row with only the identity columns set.
pub fn page_row(id: &str, language: &str, slug: &str, component_key: Option<&str>) -> PageRow {
    PageRow {
        id: id.to_string(),
        slug: slug.to_string(),
        component_key: component_key.map(str::to_string),
        language: language.to_string(),
        category: None,
        status: None,
        title: None,
        meta_title: None,
        meta_description: None,
        og_image: None,
        updated_at: None,
    }
}

/// A review with no content columns set.
pub fn review(id: &str, review_type: ReviewType, is_featured: bool) -> Review {
    Review {
        id: id.to_string(),
        review_type,
        is_featured,
        author_name: None,
        quote: None,
        rating: None,
        video_url: None,
        thumbnail_url: None,
        before_image_url: None,
        after_image_url: None,
        image_url: None,
    }
}

/// `count` non-featured reviews of one type, with ids `{prefix}1..`.
pub fn reviews(prefix: &str, review_type: ReviewType, count: usize) -> Vec<Review> {
    (1..=count)
        .map(|n| review(&format!("{prefix}{n}"), review_type, false))
        .collect()
}
