//! Shared test utilities for the inkpress test suite.
//!
//! Provides a fixture site copied into a temp directory, a build context
//! over it, and small helpers for editing sources and reading output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = setup_site();
//! let ctx = build_context(site.path());
//! ctx.run().unwrap();
//!
//! append(site.path(), "content/pages/about.md", "\nMore.\n");
//! let summary = ctx.run().unwrap();
//! assert!(read_output(&ctx, "about/index.html").contains("More."));
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use crate::build::BuildContext;
use crate::config::{BuildConfig, SiteConfig};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// A build context over `root` with a fixed config, independent of any
/// `site.toml` in the fixture.
pub fn build_context(root: &Path) -> BuildContext {
    let config = SiteConfig {
        title_suffix: " - Test Site".into(),
        build: BuildConfig {
            concurrency: Some(4),
            ..BuildConfig::default()
        },
        ..SiteConfig::default()
    };
    BuildContext::new(root, config).unwrap()
}

// =========================================================================
// Source edits and output reads
// =========================================================================

/// Write `text` to `root/rel`, creating parent directories.
pub fn write_file_at(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Append `text` to an existing source.
pub fn append(root: &Path, rel: &str, text: &str) {
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(root.join(rel))
        .unwrap_or_else(|e| panic!("cannot append to {rel}: {e}"));
    file.write_all(text.as_bytes()).unwrap();
}

/// Contents of `rel` under the build's target directory. Panics with the
/// missing path if absent.
pub fn read_output(ctx: &BuildContext, rel: &str) -> String {
    let path = ctx.target_dir().join(rel);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}
