//! Template dependency registry.
//!
//! Templates include other templates; a partial shared by every page must
//! trigger a rebuild of all of them even though their own sources did not
//! change. The registry discovers those edges by scanning template text and
//! resolves the transitive closure per template, memoized for one run.
//!
//! ## Inclusion directives
//!
//! The scanner recognizes exactly these tags (Tera syntax). The quoted paths
//! are relative to the site root and are also the names templates are
//! registered under when rendering:
//!
//! ```text
//! {% extends "web/html/layouts/main.tmpl.html" %}
//! {% include "web/html/_header.tmpl.html" %}
//! {% include ["web/html/_a.tmpl.html", "web/html/_b.tmpl.html"] ignore missing %}
//! {% import "web/html/macros.tmpl.html" as macros %}
//! ```
//!
//! Whitespace-control dashes (`{%-`, `-%}`) and all three Tera quote styles
//! are accepted. Paths are returned in order of first appearance,
//! deduplicated. Anything inside `{% raw %}…{% endraw %}` is ignored.
//!
//! A template is rejected with a parse error when a `{{`, `{%` or `{#` is
//! never closed, when an inclusion tag has no string literal (a computed
//! include cannot be tracked), or when a literal is unterminated. Everything
//! else is left to the template engine at render time.
//!
//! An included template that does not exist is kept in the closure as a
//! leaf. Its absence only fails the render when the include is not marked
//! `ignore missing`, and creating it later counts as a change.
//!
//! ## Cycles
//!
//! The graph is not assumed to be acyclic. Closure resolution tracks visited
//! paths, so `A → B → A` terminates with `closure(A) = {A, B}`: the start
//! path only appears in its own closure when a real cycle leads back to it.

use crate::error::BuildError;
use crate::freshness::ChangeDetector;
use dashmap::DashMap;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

const INCLUSION_KEYWORDS: &[&str] = &["include", "extends", "import"];

static END_RAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?\s*endraw\s*-?%\}").expect("valid regex"));

/// A template read from disk together with its direct inclusions.
#[derive(Debug)]
pub struct ParsedTemplate {
    /// Path relative to the site root, also used as the template name.
    pub name: PathBuf,
    pub source: String,
    pub includes: Vec<PathBuf>,
}

/// Memoizing registry of template inclusion edges.
///
/// Both caches tolerate concurrent lookups from Phase-1 jobs; writes only
/// happen on first touch of a template within a run.
pub struct DependencyRegistry {
    root: PathBuf,
    parsed: DashMap<PathBuf, Arc<ParsedTemplate>>,
    closures: DashMap<PathBuf, Arc<BTreeSet<PathBuf>>>,
}

impl DependencyRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            parsed: DashMap::new(),
            closures: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of a template.
    pub fn path_of(&self, name: &Path) -> PathBuf {
        self.root.join(name)
    }

    /// Drop every memoized result. Called at the start of each run since the
    /// underlying files may have changed.
    pub fn reset(&self) {
        self.parsed.clear();
        self.closures.clear();
    }

    /// Read and scan a template (cached for the run).
    pub fn load(&self, name: &Path) -> Result<Arc<ParsedTemplate>, BuildError> {
        if let Some(parsed) = self.parsed.get(name) {
            return Ok(Arc::clone(&parsed));
        }

        let path = self.path_of(name);
        let source = std::fs::read_to_string(&path).map_err(BuildError::io(&path))?;
        let includes = find_inclusions(&source)
            .map_err(|message| BuildError::parse(&path, message))?
            .into_iter()
            .map(PathBuf::from)
            .collect();

        let parsed = Arc::new(ParsedTemplate {
            name: name.to_path_buf(),
            source,
            includes,
        });
        Ok(Arc::clone(
            &self
                .parsed
                .entry(name.to_path_buf())
                .or_insert(parsed),
        ))
    }

    /// Direct inclusions of a template, in order of first appearance.
    pub fn parse_template(&self, name: &Path) -> Result<Vec<PathBuf>, BuildError> {
        Ok(self.load(name)?.includes.clone())
    }

    /// Every template reachable from `name` through inclusion edges.
    pub fn resolve_closure(&self, name: &Path) -> Result<Arc<BTreeSet<PathBuf>>, BuildError> {
        if let Some(closure) = self.closures.get(name) {
            return Ok(Arc::clone(&closure));
        }

        let mut closure = BTreeSet::new();
        let mut visited: HashSet<PathBuf> = HashSet::from([name.to_path_buf()]);
        let mut stack: Vec<PathBuf> = self.load(name)?.includes.iter().rev().cloned().collect();

        while let Some(dep) = stack.pop() {
            if dep == name {
                closure.insert(dep);
                continue;
            }
            if !visited.insert(dep.clone()) {
                continue;
            }
            if let Some(parsed) = self.load_dependency(&dep)? {
                stack.extend(parsed.includes.iter().rev().cloned());
            }
            closure.insert(dep);
        }

        let closure = Arc::new(closure);
        self.closures
            .insert(name.to_path_buf(), Arc::clone(&closure));
        Ok(closure)
    }

    /// True when the template or anything it (transitively) includes changed.
    ///
    /// Every member of the closure is checked so the detector's baseline
    /// covers all of them after a successful run.
    pub fn is_any_changed(
        &self,
        name: &Path,
        detector: &dyn ChangeDetector,
    ) -> Result<bool, BuildError> {
        let closure = self.resolve_closure(name)?;
        let mut paths = vec![self.path_of(name)];
        paths.extend(closure.iter().map(|dep| self.path_of(dep)));
        Ok(detector.changed_any(&paths))
    }

    /// The template followed by every member of its closure, ready to be
    /// registered with a template engine.
    pub fn sources(&self, name: &Path) -> Result<Vec<Arc<ParsedTemplate>>, BuildError> {
        let mut out = vec![self.load(name)?];
        for dep in self.resolve_closure(name)?.iter() {
            if dep == name {
                continue;
            }
            if let Some(parsed) = self.load_dependency(dep)? {
                out.push(parsed);
            }
        }
        Ok(out)
    }

    /// Like [`load`](Self::load), but a dependency that does not exist is a
    /// leaf rather than an error. It stays in the closure so that creating
    /// it later counts as a change; whether its absence is fatal is up to
    /// the template engine (`ignore missing`).
    fn load_dependency(&self, name: &Path) -> Result<Option<Arc<ParsedTemplate>>, BuildError> {
        match self.load(name) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(BuildError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Template name for a relative path: components joined with `/`.
pub fn template_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Scan template text for inclusion directives.
///
/// Returns the referenced paths in document order, deduplicated, or a
/// message describing the first syntax problem.
pub fn find_inclusions(text: &str) -> Result<Vec<String>, String> {
    let mut found: Vec<String> = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let open = pos + offset;
        let Some(kind) = text[open + 1..].chars().next() else {
            break;
        };
        let close = match kind {
            '{' => "}}",
            '#' => "#}",
            '%' => "%}",
            _ => {
                pos = open + 1;
                continue;
            }
        };

        let body_start = open + 2;
        let Some(body_len) = find_tag_end(&text[body_start..], close, kind == '%') else {
            return Err(format!(
                "unterminated `{{{kind}` opened on line {}",
                line_of(text, open)
            ));
        };
        let body_end = body_start + body_len;
        pos = body_end + close.len();

        if kind != '%' {
            continue;
        }

        let body = text[body_start..body_end]
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim();
        let keyword = body.split_whitespace().next().unwrap_or("");

        if keyword == "raw" {
            match END_RAW.find(&text[pos..]) {
                Some(m) => pos += m.end(),
                None => {
                    return Err(format!(
                        "`raw` block opened on line {} is never closed",
                        line_of(text, open)
                    ));
                }
            }
            continue;
        }

        if !INCLUSION_KEYWORDS.contains(&keyword) {
            continue;
        }

        let args = &body[keyword.len()..];
        let literals = string_literals(args).map_err(|message| {
            format!("{message} in `{keyword}` on line {}", line_of(text, open))
        })?;
        if literals.is_empty() {
            return Err(format!(
                "`{keyword}` on line {} needs a literal template path",
                line_of(text, open)
            ));
        }

        // `extends` and `import` take exactly one path; any later literal
        // belongs to something else.
        let take = if keyword == "include" { literals.len() } else { 1 };
        for literal in literals.into_iter().take(take) {
            if !found.contains(&literal) {
                found.push(literal);
            }
        }
    }

    Ok(found)
}

/// Length of a tag body up to (not including) `close`. For statement tags
/// the closing marker is ignored inside string literals.
fn find_tag_end(rest: &str, close: &str, quote_aware: bool) -> Option<usize> {
    if !quote_aware {
        return rest.find(close);
    }
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '"' | '\'' | '`') => quote = Some(c),
            None if rest[i..].starts_with(close) => return Some(i),
            None => {}
        }
    }
    None
}

/// Every quoted string in a tag's argument text.
fn string_literals(args: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut chars = args.char_indices();
    while let Some((start, c)) = chars.next() {
        if !matches!(c, '"' | '\'' | '`') {
            continue;
        }
        let mut end = None;
        for (i, next) in chars.by_ref() {
            if next == c {
                end = Some(i);
                break;
            }
        }
        match end {
            Some(end) => out.push(args[start + 1..end].to_string()),
            None => return Err("unterminated string literal".to_string()),
        }
    }
    Ok(out)
}

fn line_of(text: &str, byte: usize) -> usize {
    text[..byte].matches('\n').count() + 1
}
