//! Job-level error taxonomy.
//!
//! Every variant is fatal for the job that produced it. Nothing is retried:
//! the scheduler collects the errors of a phase and the orchestrator stops
//! before the next phase.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    /// Malformed frontmatter, template, or inclusion directive.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    /// A required field is missing or invalid.
    #[error("validation error in {path}: {message}")]
    Validation { path: PathBuf, message: String },
    /// Template execution or markdown transform failure.
    #[error("render error in {path}: {message}")]
    Render { path: PathBuf, message: String },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error writing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl BuildError {
    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn validation(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn render(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Render {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Returns a closure for `map_err` that attaches `path` to an IO error.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }

    /// The file the error is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::Parse { path, .. }
            | Self::Validation { path, .. }
            | Self::Render { path, .. }
            | Self::Io { path, .. }
            | Self::Json { path, .. } => path,
        }
    }
}

/// Flatten an error and its `source()` chain into one line.
///
/// Tera nests the useful part of a failure several sources deep.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "inner")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }
    impl std::error::Error for Inner {}

    #[test]
    fn chain_joins_sources() {
        assert_eq!(error_chain(&Outer(Inner)), "outer: inner");
    }

    #[test]
    fn io_helper_keeps_path() {
        let err = BuildError::io("a/b.md")(std::io::Error::other("boom"));
        assert_eq!(err.path(), Path::new("a/b.md"));
        assert!(err.to_string().contains("a/b.md"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn display_names_kind_and_path() {
        let err = BuildError::validation("x.md", "missing title");
        assert_eq!(err.to_string(), "validation error in x.md: missing title");
    }
}
