//! Static files that go to the output tree as they are.
//!
//! ```text
//! web/stylesheets/            → <target>/content/stylesheets   (symlink)
//! web/javascripts/            → <target>/content/javascripts   (symlink)
//! content/images/**           → <target>/content/images/**
//! content/articles/<dir>/x.png → <target>/content/images/<dir>/x.png
//! content/pages/<dir>/x.pdf   → <target>/content/images/<dir>/x.pdf
//! ```
//!
//! Files next to markdown sources land in the same directory the document's
//! `img_dir` points to, so `![](./x.png)` resolves. Markdown files are never
//! copied. Copies only happen for files the change detector reports as
//! changed or that are missing from the output.
//!
//! Stylesheet and script directories are symlinked so edits show up without
//! a rebuild. Where symlinks are unavailable they are copied instead.

use crate::error::BuildError;
use crate::freshness::ChangeDetector;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Make `link` point at `target`. Returns `false` when it already did.
pub fn ensure_symlink(target: &Path, link: &Path) -> Result<bool, BuildError> {
    let target = fs::canonicalize(target).map_err(BuildError::io(target))?;
    if let Ok(existing) = fs::read_link(link) {
        if existing == target {
            return Ok(false);
        }
    }
    if fs::symlink_metadata(link).is_ok() {
        remove_any(link)?;
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(BuildError::io(parent))?;
    }
    create_link(&target, link)?;
    Ok(true)
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<(), BuildError> {
    std::os::unix::fs::symlink(target, link).map_err(BuildError::io(link))
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> Result<(), BuildError> {
    copy_dir_recursive(target, link)
}

#[cfg(not(unix))]
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), BuildError> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(walk_error(src))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let out = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).map_err(BuildError::io(&out))?;
        } else {
            fs::copy(entry.path(), &out).map_err(BuildError::io(&out))?;
        }
    }
    Ok(())
}

fn remove_any(path: &Path) -> Result<(), BuildError> {
    let meta = fs::symlink_metadata(path).map_err(BuildError::io(path))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(BuildError::io(path))
    } else {
        fs::remove_file(path).map_err(BuildError::io(path))
    }
}

/// Copy every non-markdown file under `src` to the same relative path under
/// `dst`. Returns how many files were copied.
pub fn copy_media(src: &Path, dst: &Path, detector: &dyn ChangeDetector) -> Result<u32, BuildError> {
    if !src.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(walk_error(src))?;
        let path = entry.path();
        if !entry.file_type().is_file() || is_markdown(path) || is_hidden(path) {
            continue;
        }
        let rel = path.strip_prefix(src).unwrap_or(path);
        let out = dst.join(rel);
        if copy_if_changed(path, &out, detector)? {
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy `src` to `dst` when the source changed or the copy is missing.
pub fn copy_if_changed(
    src: &Path,
    dst: &Path,
    detector: &dyn ChangeDetector,
) -> Result<bool, BuildError> {
    // Ask the detector first so the file is fingerprinted every run.
    let changed = detector.changed(src);
    if !changed && dst.exists() {
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(BuildError::io(parent))?;
    }
    fs::copy(src, dst).map_err(BuildError::io(src))?;
    Ok(true)
}

/// Markdown sources under `dir`, recursively, sorted by path.
pub fn list_markdown(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(walk_error(dir))?;
        if entry.file_type().is_file() && is_markdown(entry.path()) && !is_hidden(entry.path()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Attach the failing path, or the walk root when walkdir has none.
fn walk_error(root: &Path) -> impl FnOnce(walkdir::Error) -> BuildError {
    let root = root.to_path_buf();
    move |e| {
        let path = e.path().map_or(root, Path::to_path_buf);
        BuildError::io(&path)(e.into())
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
