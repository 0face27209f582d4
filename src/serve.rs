//! The `loop` command: watch sources, rebuild, and serve the output.
//!
//! ```text
//! initial build
//!   └─▶ wait for a file event under content/ or web/
//!         └─▶ collect events until DEBOUNCE_MS of quiet
//!               └─▶ BuildContext::run ─▶ bump build generation
//! ```
//!
//! A failed rebuild is reported and the loop keeps waiting; the change
//! detector was not committed, so the next event retries the same work.
//! Events under the output and temp directories are ignored, otherwise
//! every build would trigger the next one.
//!
//! The HTTP server runs on its own thread and serves the output directory.
//! Pages rendered with `live_reload` poll [`LIVE_RELOAD_PATH`], which
//! returns the build generation; the page reloads when it changes.

use crate::build::{BuildContext, RunError};
use crate::output;
use crate::{debug, log};
use notify::{EventKind, RecursiveMode, Watcher};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server};

pub const DEBOUNCE_MS: u64 = 200;
pub const LIVE_RELOAD_PATH: &str = "/__livereload";
pub const LIVE_RELOAD_SCRIPT_PATH: &str = "/__livereload.js";

const LIVE_RELOAD_JS: &str = "(function () {
  var seen = null;
  setInterval(function () {
    fetch('/__livereload', { cache: 'no-store' })
      .then(function (r) { return r.text(); })
      .then(function (g) {
        if (seen !== null && g !== seen) { location.reload(); }
        seen = g;
      })
      .catch(function () {});
  }, 1000);
})();
";

/// Directories under the site root that are watched for changes.
const WATCHED_DIRS: [&str; 2] = ["content", "web"];

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("could not listen on port {port}: {message}")]
    Bind { port: u16, message: String },
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("nothing to watch: none of content/ or web/ exist under {0}")]
    NothingToWatch(PathBuf),
}

pub struct LoopOptions {
    /// Serve the output directory on this port. `None` only watches.
    pub port: Option<u16>,
}

/// Build once, then rebuild on every batch of source changes until the
/// process is stopped.
pub fn run_loop(ctx: &BuildContext, options: &LoopOptions) -> Result<(), ServeError> {
    let generation = Arc::new(AtomicU64::new(0));
    rebuild(ctx, &generation);

    if let Some(port) = options.port {
        let server = Server::http(("127.0.0.1", port)).map_err(|e| ServeError::Bind {
            port,
            message: e.to_string(),
        })?;
        log!("serve"; "http://localhost:{port}");
        let root = ctx.target_dir();
        let generation = Arc::clone(&generation);
        thread::spawn(move || serve_requests(&server, &root, &generation));
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;

    let mut watching = 0;
    for dir in WATCHED_DIRS {
        let path = ctx.root().join(dir);
        if path.is_dir() {
            watcher.watch(&path, RecursiveMode::Recursive)?;
            debug!("watch"; "{}", path.display());
            watching += 1;
        }
    }
    if watching == 0 {
        return Err(ServeError::NothingToWatch(ctx.root().to_path_buf()));
    }
    log!("watch"; "waiting for changes");

    let ignored = [ctx.target_dir(), ctx.temp_dir()];
    let debounce = Duration::from_millis(DEBOUNCE_MS);
    loop {
        // Block for the first relevant event, then drain until quiet.
        let Ok(first) = rx.recv() else {
            return Ok(());
        };
        let mut changed = event_paths(first, &ignored);
        loop {
            match rx.recv_timeout(debounce) {
                Ok(event) => changed.extend(event_paths(event, &ignored)),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
        if changed.is_empty() {
            continue;
        }
        changed.sort();
        changed.dedup();
        for path in &changed {
            debug!("watch"; "changed {}", path.display());
        }
        log!("watch"; "{} file(s) changed, rebuilding", changed.len());
        rebuild(ctx, &generation);
    }
}

fn rebuild(ctx: &BuildContext, generation: &AtomicU64) {
    match ctx.run() {
        Ok(summary) => {
            output::print_build_summary(&summary);
            generation.fetch_add(1, Ordering::SeqCst);
        }
        Err(RunError::Phase(failure)) => output::print_phase_failure(&failure),
        Err(e) => log!("error"; "{e}"),
    }
}

/// Watcher errors are reported and the loop keeps waiting.
fn event_paths(event: notify::Result<notify::Event>, ignored: &[PathBuf]) -> Vec<PathBuf> {
    match event {
        Ok(event) => relevant_paths(event, ignored),
        Err(e) => {
            log!("watch"; "error: {e}");
            Vec::new()
        }
    }
}

/// Paths of a watcher event worth rebuilding for.
fn relevant_paths(event: notify::Event, ignored: &[PathBuf]) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => {}
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => {}
        _ => return Vec::new(),
    }
    event
        .paths
        .into_iter()
        .filter(|p| !is_temp_file(p) && !ignored.iter().any(|dir| p.starts_with(dir)))
        .collect()
}

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(ext, "swp" | "swo" | "tmp" | "bak") || name.ends_with('~') || name.starts_with(".#")
}

// ============================================================================
// HTTP
// ============================================================================

fn serve_requests(server: &Server, root: &Path, generation: &AtomicU64) {
    for request in server.incoming_requests() {
        let url = request.url().to_string();
        if let Err(e) = handle_request(request, root, generation) {
            log!("serve"; "{url}: {e}");
        }
    }
}

fn handle_request(request: Request, root: &Path, generation: &AtomicU64) -> std::io::Result<()> {
    let path = request.url().split(['?', '#']).next().unwrap_or("/").to_string();

    if path == LIVE_RELOAD_PATH {
        let body = generation.load(Ordering::SeqCst).to_string();
        return request.respond(with_type(Response::from_string(body), "text/plain"));
    }
    if path == LIVE_RELOAD_SCRIPT_PATH {
        return request.respond(with_type(
            Response::from_string(LIVE_RELOAD_JS),
            "application/javascript",
        ));
    }

    match resolve_path(&path, root) {
        Some(file) => {
            let body = fs::read(&file)?;
            request.respond(with_type(Response::from_data(body), content_type(&file)))
        }
        None => request.respond(
            with_type(Response::from_string("404 Not Found"), "text/plain").with_status_code(404),
        ),
    }
}

fn with_type<R: std::io::Read>(response: Response<R>, content_type: &str) -> Response<R> {
    match Header::from_bytes("Content-Type", content_type) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

/// Map a URL path to a file under `root`. Directories resolve to their
/// `index.html`. Paths that try to leave `root` resolve to nothing.
fn resolve_path(url_path: &str, root: &Path) -> Option<PathBuf> {
    let relative = Path::new(url_path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local = root.join(relative);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    index.is_file().then_some(index)
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
