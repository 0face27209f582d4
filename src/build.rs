//! Build orchestration.
//!
//! A [`BuildContext`] owns everything that survives between runs of the
//! build loop: configuration, the change detector, the template dependency
//! registry and the article and page collections. Each call to
//! [`BuildContext::run`] is one incremental build:
//!
//! ```text
//! Phase 0  reset registry, open a detection run, create output dirs,
//!          list sources, prune entities whose source is gone
//! Phase 1  one job per article and page, plus asset jobs
//!          ── barrier: any error stops the build here ──
//! Phase 2  home, one job per tag, tag index, search index
//!          ── on success: commit change detection ──
//! ```
//!
//! ## Rebuild rules
//!
//! An article or page is rendered when its source changed or its template
//! (or anything the template includes) changed. Aggregate pages are
//! rendered when any article was rendered or pruned this run, or their
//! template changed. The search index is regenerated when either collection
//! changed or the file is missing from the output.
//!
//! A run that fails is not committed, so the next run sees the same changes
//! and retries the same work.

use crate::aggregate::{search_index, tag_counts, tag_map, to_index_json, top_tags};
use crate::assets::{copy_media, ensure_symlink, list_markdown};
use crate::config::{SiteConfig, SiteEnv, effective_threads};
use crate::deps::DependencyRegistry;
use crate::error::{BuildError, error_chain};
use crate::freshness::{ChangeDetector, FileChangeDetector};
use crate::frontmatter;
use crate::markdown::{self, RenderOptions};
use crate::naming::{extract_slug, img_dir, join_url, tag_to_url, youtube_embed_link};
use crate::render::{render_to_dir, site_context, write_file};
use crate::scheduler::{JobStats, PhaseFailure, Scheduler};
use crate::store::EntityStore;
use crate::types::{
    Article, ArticleFrontmatter, Page, PageFrontmatter, SourceDocument, TagCount, by_slug,
    newest_first,
};
use crate::{debug, log};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const ARTICLES_DIR: &str = "content/articles";
pub const PAGES_DIR: &str = "content/pages";
pub const SITE_IMAGES_DIR: &str = "content/images";
pub const JAVASCRIPTS_DIR: &str = "web/javascripts";
pub const STYLESHEETS_DIR: &str = "web/stylesheets";

pub const ARTICLE_TEMPLATE: &str = "web/html/article.tmpl.html";
pub const PAGE_TEMPLATE: &str = "web/html/page.tmpl.html";
pub const HOME_TEMPLATE: &str = "web/html/index.tmpl.html";
pub const TAG_TEMPLATE: &str = "web/html/tags/tag.tmpl.html";
pub const TAGS_TEMPLATE: &str = "web/html/tags/tags.tmpl.html";

pub const INDEX_FILE: &str = "index.json";

/// Top-level output directories written by aggregate and asset jobs.
pub const RESERVED_SLUGS: &[&str] = &["content", "tags"];

#[derive(Error, Debug)]
pub enum RunError {
    #[error("could not start build workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// Phase 0 failed before any job was scheduled.
    #[error(transparent)]
    Setup(#[from] BuildError),
    #[error(transparent)]
    Phase(#[from] PhaseFailure),
}

/// What a successful run did.
#[derive(Debug)]
pub struct BuildSummary {
    pub render: JobStats,
    pub aggregate: JobStats,
    /// Names of every job that did work, Phase 1 first.
    pub rebuilt: Vec<String>,
    /// Slugs dropped because their source disappeared.
    pub pruned: Vec<String>,
    pub articles: usize,
    pub pages: usize,
    pub tags: usize,
    pub elapsed: Duration,
}

/// How many sources and templates [`BuildContext::check`] validated.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub articles: usize,
    pub pages: usize,
    pub templates: usize,
}

pub struct BuildContext {
    root: PathBuf,
    config: SiteConfig,
    live_reload: bool,
    scheduler: Scheduler,
    detector: FileChangeDetector,
    registry: DependencyRegistry,
    articles: EntityStore<Article>,
    pages: EntityStore<Page>,
    /// Set while a run is in progress and left set when it fails, so the
    /// next run regenerates aggregates even if nothing else changed.
    unsettled: AtomicBool,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>, config: SiteConfig) -> Result<Self, RunError> {
        // Absolute, so watcher events can be matched against output paths
        let root = root.into();
        let root = fs::canonicalize(&root).map_err(BuildError::io(&root))?;
        let scheduler = Scheduler::new(effective_threads(&config.build))?;
        Ok(Self {
            detector: FileChangeDetector::new(config.build.freshness),
            registry: DependencyRegistry::new(&root),
            articles: EntityStore::new(newest_first),
            pages: EntityStore::new(by_slug),
            unsettled: AtomicBool::new(false),
            live_reload: false,
            scheduler,
            config,
            root,
        })
    }

    /// Inject the live reload script into rendered pages. Only honored in
    /// the development environment.
    pub fn with_live_reload(mut self, enabled: bool) -> Self {
        self.live_reload = enabled && self.config.env == SiteEnv::Development;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn target_dir(&self) -> PathBuf {
        self.config.target_path(&self.root)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.config.temp_path(&self.root)
    }

    /// Forget all change-detection state so the next run rebuilds
    /// everything.
    pub fn invalidate(&self) {
        self.detector.forget_all();
    }

    /// One incremental build.
    ///
    /// On failure every path the run saw as changed is dropped from the
    /// detector's baseline, so reverting an edit made during a failed run
    /// still re-renders whatever that run wrote.
    pub fn run(&self) -> Result<BuildSummary, RunError> {
        let force_aggregates = self.unsettled.swap(true, Ordering::SeqCst);
        let summary = self
            .run_phases(force_aggregates)
            .inspect_err(|_| self.detector.abandon())?;

        self.detector.commit();
        self.unsettled.store(false, Ordering::SeqCst);
        Ok(summary)
    }

    fn run_phases(&self, force_aggregates: bool) -> Result<BuildSummary, RunError> {
        let started = Instant::now();

        // Phase 0
        self.registry.reset();
        self.detector.begin_run();
        self.articles.reset_changed();
        self.pages.reset_changed();

        let target = self.target_dir();
        let content_dir = target.join("content");
        for dir in [target.join("tags"), content_dir.clone(), self.temp_dir()] {
            fs::create_dir_all(&dir).map_err(BuildError::io(&dir))?;
        }

        let article_sources = list_markdown(&self.root.join(ARTICLES_DIR))?;
        let page_sources = list_markdown(&self.root.join(PAGES_DIR))?;

        let mut pruned = self.articles.retain_sources(&article_sources);
        pruned.extend(self.pages.retain_sources(&page_sources));
        for slug in &pruned {
            log!("build"; "removed {slug} (source deleted)");
            let dir = target.join(slug);
            if dir.is_dir() {
                fs::remove_dir_all(&dir).map_err(BuildError::io(&dir))?;
            }
        }

        let locals = site_context(&self.config, self.live_reload);

        // Phase 1
        let mut phase = self.scheduler.phase("render");
        for source in &article_sources {
            let locals = &locals;
            phase.add_job(job_name("article", source), move || {
                self.render_article(source, locals)
            });
        }
        for source in &page_sources {
            let locals = &locals;
            phase.add_job(job_name("page", source), move || self.render_page(source, locals));
        }
        phase.add_job("assets: links", || self.link_assets(&content_dir));
        phase.add_job("assets: images", || self.copy_images(&content_dir));

        let rendered = phase.wait().inspect_err(|failure| {
            debug!("build"; "{failure}; skipping aggregates");
        })?;

        // Phase 2
        let articles = self.articles.snapshot(&rendered);
        let pages = self.pages.snapshot(&rendered);
        let articles_changed = self.articles.changed() || force_aggregates;
        let pages_changed = self.pages.changed() || force_aggregates;

        let tags = tag_map(&articles);
        let counts = tag_counts(&tags);
        let (top_n, top_m) = top_tags(&counts, self.config.tags.top_n, self.config.tags.top_m);

        let mut phase = self.scheduler.phase("aggregate");
        phase.add_job("home", || {
            self.render_home(&articles, &top_n, &top_m, &locals, articles_changed)
        });
        for (tag, tagged) in &tags {
            let locals = &locals;
            phase.add_job(format!("tag: {tag}"), move || {
                self.render_tag(tag, tagged, locals, articles_changed)
            });
        }
        phase.add_job("tags", || self.render_all_tags(&counts, &locals, articles_changed));
        phase.add_job("index", || {
            self.generate_index(&articles, &pages, articles_changed || pages_changed)
        });
        let aggregated = phase.wait()?;

        let mut rebuilt = rendered.ran().to_vec();
        rebuilt.extend(aggregated.ran().iter().cloned());
        Ok(BuildSummary {
            render: rendered.stats(),
            aggregate: aggregated.stats(),
            rebuilt,
            pruned,
            articles: articles.len(),
            pages: pages.len(),
            tags: counts.len(),
            elapsed: started.elapsed(),
        })
    }

    /// Parse and validate every source and template without writing
    /// anything.
    pub fn check(&self) -> Result<CheckReport, RunError> {
        self.registry.reset();
        let article_sources = list_markdown(&self.root.join(ARTICLES_DIR))?;
        let page_sources = list_markdown(&self.root.join(PAGES_DIR))?;
        let templates = [
            ARTICLE_TEMPLATE,
            PAGE_TEMPLATE,
            HOME_TEMPLATE,
            TAG_TEMPLATE,
            TAGS_TEMPLATE,
        ];

        let mut phase = self.scheduler.phase("check");
        for source in &article_sources {
            phase.add_job(job_name("article", source), move || {
                let doc = SourceDocument::read(source, true)?;
                let (meta, _): (ArticleFrontmatter, _) = frontmatter::parse(source, &doc.text)?;
                meta.validate(source)?;
                output_slug(source)?;
                Ok(true)
            });
        }
        for source in &page_sources {
            phase.add_job(job_name("page", source), move || {
                let doc = SourceDocument::read(source, true)?;
                let (meta, _): (PageFrontmatter, _) = frontmatter::parse(source, &doc.text)?;
                meta.validate(source)?;
                output_slug(source)?;
                Ok(true)
            });
        }
        for template in templates {
            phase.add_job(format!("template: {template}"), move || {
                self.registry.sources(Path::new(template))?;
                Ok(true)
            });
        }
        phase.wait()?;

        Ok(CheckReport {
            articles: article_sources.len(),
            pages: page_sources.len(),
            templates: templates.len(),
        })
    }

    // =========================================================================
    // Phase 1 jobs
    // =========================================================================

    fn render_article(&self, source: &Path, locals: &tera::Context) -> Result<bool, BuildError> {
        let template = Path::new(ARTICLE_TEMPLATE);
        let source_changed = self.detector.changed(source);
        let template_changed = self.registry.is_any_changed(template, &self.detector)?;
        if !source_changed && !template_changed {
            return Ok(false);
        }

        let doc = SourceDocument::read(source, source_changed)?;
        let (meta, body): (ArticleFrontmatter, _) = frontmatter::parse(source, &doc.text)?;
        let (title, published_at) = meta.validate(source)?;

        let slug = output_slug(source)?;
        let img_dir = img_dir(&self.relative_dir(source), "articles");

        let mut tags: Vec<String> = meta
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        if let Some(tag) = tags.iter().find(|t| tag_to_url(t).is_empty()) {
            return Err(BuildError::validation(
                source,
                format!("tag {tag:?} has no letters or digits to build a URL from"),
            ));
        }
        let tag_links = tags
            .iter()
            .map(|tag| TagCount {
                tag: tag.clone(),
                count: 0,
                url_tag: tag_to_url(tag),
            })
            .collect();

        let html = markdown::render(
            body,
            &RenderOptions {
                template_data: Some(locals),
                img_dir: &img_dir,
            },
        )
        .map_err(|e| BuildError::render(source, error_chain(&e)))?;
        let (content, footnotes) = markdown::split_footnotes(&html);
        let toc = markdown::render_toc(&content);

        let hook = if meta.hook.trim().is_empty() {
            String::new()
        } else {
            markdown::render_inline(&meta.hook)
                .map_err(|e| BuildError::render(source, error_chain(&e)))?
        };
        let search_body = format!(
            "{} {}",
            markdown::strip_markdown(&meta.hook),
            markdown::strip_markdown(body)
        )
        .trim()
        .to_string();

        let article = Article {
            image: meta
                .image
                .as_deref()
                .filter(|i| !i.is_empty())
                .map(|i| media_url(&img_dir, i)),
            youtube_embed: meta.youtube.as_deref().map(youtube_embed_link),
            youtube: meta.youtube,
            attributions: meta.attributions,
            tag_counts: tag_links,
            body: search_body,
            source: source.to_path_buf(),
            slug,
            title,
            published_at,
            hook,
            tags,
            content,
            footnotes,
            toc,
            img_dir,
        };

        let mut ctx = locals.clone();
        ctx.insert("article", &article);
        render_to_dir(&self.registry, template, &ctx, &self.target_dir().join(&article.slug))?;

        self.articles.upsert(article);
        Ok(true)
    }

    fn render_page(&self, source: &Path, locals: &tera::Context) -> Result<bool, BuildError> {
        let template = Path::new(PAGE_TEMPLATE);
        let source_changed = self.detector.changed(source);
        let template_changed = self.registry.is_any_changed(template, &self.detector)?;
        if !source_changed && !template_changed {
            return Ok(false);
        }

        let doc = SourceDocument::read(source, source_changed)?;
        let (meta, body): (PageFrontmatter, _) = frontmatter::parse(source, &doc.text)?;
        let (title, description) = meta.validate(source)?;

        let slug = output_slug(source)?;
        let img_dir = img_dir(&self.relative_dir(source), "pages");
        let content = markdown::render(
            body,
            &RenderOptions {
                template_data: Some(locals),
                img_dir: &img_dir,
            },
        )
        .map_err(|e| BuildError::render(source, error_chain(&e)))?;

        let page = Page {
            slug,
            body: markdown::strip_markdown(body),
            source: source.to_path_buf(),
            title,
            description,
            content,
            img_dir,
        };

        let mut ctx = locals.clone();
        ctx.insert("page", &page);
        render_to_dir(&self.registry, template, &ctx, &self.target_dir().join(&page.slug))?;

        self.pages.upsert(page);
        Ok(true)
    }

    fn link_assets(&self, content_dir: &Path) -> Result<bool, BuildError> {
        let mut linked = false;
        for (dir, name) in [(JAVASCRIPTS_DIR, "javascripts"), (STYLESHEETS_DIR, "stylesheets")] {
            let src = self.root.join(dir);
            if src.is_dir() {
                linked |= ensure_symlink(&src, &content_dir.join(name))?;
            }
        }
        Ok(linked)
    }

    fn copy_images(&self, content_dir: &Path) -> Result<bool, BuildError> {
        // All three trees merge into one; media keeps its path below the
        // collection directory, which is where img_dir points.
        let images = content_dir.join("images");
        let mut copied = 0;
        for dir in [ARTICLES_DIR, PAGES_DIR, SITE_IMAGES_DIR] {
            copied += copy_media(&self.root.join(dir), &images, &self.detector)?;
        }
        if copied > 0 {
            debug!("build"; "copied {copied} media file(s)");
        }
        Ok(copied > 0)
    }

    // =========================================================================
    // Phase 2 jobs
    // =========================================================================

    fn render_home(
        &self,
        articles: &[Article],
        top_n: &[TagCount],
        top_m: &[TagCount],
        locals: &tera::Context,
        articles_changed: bool,
    ) -> Result<bool, BuildError> {
        let template = Path::new(HOME_TEMPLATE);
        let template_changed = self.registry.is_any_changed(template, &self.detector)?;
        if !articles_changed && !template_changed {
            return Ok(false);
        }

        let mut ctx = locals.clone();
        ctx.insert("articles", articles);
        ctx.insert("top_n_tags", top_n);
        ctx.insert("top_m_tags", top_m);
        render_to_dir(&self.registry, template, &ctx, &self.target_dir())?;
        Ok(true)
    }

    fn render_tag(
        &self,
        tag: &str,
        articles: &[Article],
        locals: &tera::Context,
        articles_changed: bool,
    ) -> Result<bool, BuildError> {
        let template = Path::new(TAG_TEMPLATE);
        let template_changed = self.registry.is_any_changed(template, &self.detector)?;
        if !articles_changed && !template_changed {
            return Ok(false);
        }

        let url_tag = tag_to_url(tag);
        let mut ctx = locals.clone();
        ctx.insert("tag", tag);
        ctx.insert("url_tag", &url_tag);
        ctx.insert("articles", articles);
        render_to_dir(
            &self.registry,
            template,
            &ctx,
            &self.target_dir().join("tags").join(&url_tag),
        )?;
        Ok(true)
    }

    fn render_all_tags(
        &self,
        counts: &[TagCount],
        locals: &tera::Context,
        articles_changed: bool,
    ) -> Result<bool, BuildError> {
        let template = Path::new(TAGS_TEMPLATE);
        let template_changed = self.registry.is_any_changed(template, &self.detector)?;
        if !articles_changed && !template_changed {
            return Ok(false);
        }

        let tags_dir = self.target_dir().join("tags");
        prune_stale_tag_pages(&tags_dir, counts)?;

        let mut ctx = locals.clone();
        ctx.insert("tag_counts", counts);
        render_to_dir(&self.registry, template, &ctx, &tags_dir)?;
        Ok(true)
    }

    /// Stage the search index in the temp dir, then publish it.
    fn generate_index(
        &self,
        articles: &[Article],
        pages: &[Page],
        changed: bool,
    ) -> Result<bool, BuildError> {
        let published = self.target_dir().join("content").join(INDEX_FILE);
        if !changed && published.exists() {
            return Ok(false);
        }

        let staged = self.temp_dir().join(INDEX_FILE);
        let json = to_index_json(&search_index(articles, pages)).map_err(|source| {
            BuildError::Json {
                path: staged.clone(),
                source,
            }
        })?;
        write_file(&staged, &json)?;
        fs::copy(&staged, &published).map_err(BuildError::io(&published))?;
        Ok(true)
    }

    fn relative_dir(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or(Path::new(""));
        dir.strip_prefix(&self.root).unwrap_or(dir).to_path_buf()
    }
}

/// `article: hello.md`
fn job_name(kind: &str, source: &Path) -> String {
    let file = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{kind}: {file}")
}

/// The slug of `source`, unless it would land on a directory the build
/// itself owns.
fn output_slug(source: &Path) -> Result<String, BuildError> {
    let slug = extract_slug(source);
    if slug.is_empty() || RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(BuildError::validation(
            source,
            format!("slug {slug:?} is reserved for generated output"),
        ));
    }
    Ok(slug)
}

/// Header images given as a bare file name live next to the article.
fn media_url(img_dir: &str, image: &str) -> String {
    if image.starts_with('/') || image.contains("://") {
        image.to_string()
    } else {
        join_url(img_dir, image)
    }
}

/// Remove tag page directories for tags no article carries anymore.
fn prune_stale_tag_pages(tags_dir: &Path, counts: &[TagCount]) -> Result<(), BuildError> {
    let entries = match fs::read_dir(tags_dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        entries => entries.map_err(BuildError::io(tags_dir))?,
    };
    for entry in entries {
        let entry = entry.map_err(BuildError::io(tags_dir))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !counts.iter().any(|c| c.url_tag == name) {
            debug!("build"; "removing stale tag page {name}");
            fs::remove_dir_all(&path).map_err(BuildError::io(&path))?;
        }
    }
    Ok(())
}
