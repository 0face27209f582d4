//! CLI output formatting for builds and checks.
//!
//! Output is job-centric: a build lists the jobs that did work, then a
//! totals line with per-phase stats as indented context. Jobs that found
//! nothing to do are only counted.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Rebuilt
//!     article: hello-world.md
//!     home
//!     index
//! Removed
//!     old-post
//! Built 3 articles, 1 page, 4 tags in 38ms
//!     render: 1 rebuilt, 5 unchanged (6 total)
//!     aggregate: 2 rebuilt, 4 unchanged (6 total)
//! ```
//!
//! ## Failure
//!
//! ```text
//! Phase render failed (2 errors)
//!     article: broken.md
//!         validation error in content/articles/broken.md: missing required field `title`
//!     page: about.md
//!         panicked: index out of bounds
//! ```
//!
//! ## Check
//!
//! ```text
//! Checked 3 articles, 1 page, 5 templates
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout or stderr.
//! Format functions are pure.

use crate::build::{BuildSummary, CheckReport};
use crate::error::error_chain;
use crate::scheduler::{JobError, PhaseFailure};
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Milliseconds below ten seconds, seconds with one decimal above.
fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 10 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_summary(summary: &BuildSummary) -> Vec<String> {
    let mut lines = Vec::new();

    if !summary.rebuilt.is_empty() {
        lines.push("Rebuilt".to_string());
        for job in &summary.rebuilt {
            lines.push(format!("{}{}", indent(1), job));
        }
    }
    if !summary.pruned.is_empty() {
        lines.push("Removed".to_string());
        for slug in &summary.pruned {
            lines.push(format!("{}{}", indent(1), slug));
        }
    }

    lines.push(format!(
        "Built {}, {}, {} in {}",
        plural(summary.articles, "article"),
        plural(summary.pages, "page"),
        plural(summary.tags, "tag"),
        format_duration(summary.elapsed)
    ));
    lines.push(format!("{}render: {}", indent(1), summary.render));
    lines.push(format!("{}aggregate: {}", indent(1), summary.aggregate));
    lines
}

pub fn print_build_summary(summary: &BuildSummary) {
    for line in format_build_summary(summary) {
        println!("{}", line);
    }
}

/// Every job error of a failed phase, grouped under the job name.
pub fn format_phase_failure(failure: &PhaseFailure) -> Vec<String> {
    let mut lines = vec![format!(
        "Phase {} failed ({})",
        failure.phase,
        plural(failure.errors.len(), "error")
    )];
    for error in &failure.errors {
        lines.push(format!("{}{}", indent(1), error.job()));
        let detail = match error {
            JobError::Failed { source, .. } => error_chain(source),
            JobError::Panicked { message, .. } => format!("panicked: {message}"),
        };
        lines.push(format!("{}{}", indent(2), detail));
    }
    lines
}

pub fn print_phase_failure(failure: &PhaseFailure) {
    for line in format_phase_failure(failure) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    vec![format!(
        "Checked {}, {}, {}",
        plural(report.articles, "article"),
        plural(report.pages, "page"),
        plural(report.templates, "template")
    )]
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}
