//! # Inkpress
//!
//! An incremental static site generator for markdown blogs. Articles and
//! pages are markdown with TOML frontmatter, templates are Tera files on
//! disk, and a long-running build loop re-renders only what a change
//! actually affects.
//!
//! # Architecture: Two Phases and a Barrier
//!
//! Every build runs the same sequence, whether it is the first build of a
//! fresh process or the hundredth iteration of `loop`:
//!
//! ```text
//! Phase 0  setup and pruning            (sequential)
//! Phase 1  articles, pages, assets      (parallel jobs)
//!          ── barrier ──
//! Phase 2  home, tags, search index     (parallel jobs)
//!          ── commit change detection ──
//! ```
//!
//! Phase 2 pages are derived from the complete article collection, so they
//! can only run after every Phase 1 job has finished. Any Phase 1 error
//! stops the build before Phase 2 and nothing is committed, so the next run
//! sees the same changes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`build`] | The orchestrator: phases, jobs, rebuild rules |
//! | [`scheduler`] | Fixed worker pool, phases, and the barrier between them |
//! | [`deps`] | Template inclusion graph and its transitive closures |
//! | [`freshness`] | Per-run change detection by content hash or mtime |
//! | [`store`] | Slug-keyed article and page collections |
//! | [`markdown`] | Markdown rendering with the site's extensions |
//! | [`frontmatter`] | `+++` TOML frontmatter splitting and parsing |
//! | [`aggregate`] | Tag grouping, ranking, and the search index |
//! | [`render`] | Tera rendering from registry-cached sources |
//! | [`template_helpers`] | Date filters for templates |
//! | [`assets`] | Media copies and stylesheet/script links |
//! | [`serve`] | The `loop` command: watcher and development server |
//! | [`config`] | `site.toml` loading, layering, and validation |
//! | [`types`] | Articles, pages, and derived values |
//! | [`naming`] | Slugs, tag URLs, and media paths |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Templates On Disk
//!
//! Templates are Tera files read at build time rather than compiled into the
//! binary. The `include`, `extends` and `import` tags are the edges of the
//! dependency graph: editing a partial rebuilds exactly the pages whose
//! templates reach it, and nothing else.
//!
//! ## In-Memory Change Detection
//!
//! Fingerprints live only as long as the process. A fresh `build` renders
//! everything; `loop` is where incremental builds pay off. There is no cache
//! file that can go stale or disagree with the output directory.
//!
//! ## Failed Runs Are Not Committed
//!
//! A run either commits every fingerprint it observed or none. Fixing the
//! error that broke a build retries exactly the work that run would have
//! done, plus whatever changed since.

pub mod logger;

pub mod aggregate;
pub mod assets;
pub mod build;
pub mod config;
pub mod deps;
pub mod error;
pub mod freshness;
pub mod frontmatter;
pub mod markdown;
pub mod naming;
pub mod output;
pub mod render;
pub mod scheduler;
pub mod serve;
pub mod store;
pub mod template_helpers;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
