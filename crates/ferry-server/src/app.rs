//! Application discovery.
//!
//! An app consists of realm directories. The frontend and backend directory
//! may each hold one entrypoint file; without a backend entrypoint, a pages
//! directory can be served file by file through a [`PageProvider`].

use crate::config::AppConfig;
use async_trait::async_trait;
use ferry_core::{
    BoxError, Content, ContentGenerator, Context, Entrypoint, Html, Params, RawContent,
    RouteHandler,
};
use ferry_protocol::Route;
use ferry_realm::{Realm, RealmRoots};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// File names accepted as realm entrypoints.
pub const ENTRYPOINT_FILE_NAMES: [&str; 8] = [
    "entrypoint.ts",
    "entrypoint.tsx",
    "entrypoint.js",
    "entrypoint.jsx",
    "entrypoint.dx",
    "entrypoint.dxb",
    "entrypoint.html",
    "entrypoint.md",
];

/// Page file extensions, in lookup order.
const PAGE_EXTENSIONS: [&str; 3] = ["html", "md", "txt"];

/// Application layout errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// More than one entrypoint file in a realm directory.
    #[error(
        "Only one entrypoint file can exist in {}, found {}",
        .dir.display(),
        .found.join(", ")
    )]
    AmbiguousEntrypoint {
        /// Realm directory.
        dir: PathBuf,
        /// Entrypoint files found.
        found: Vec<String>,
    },

    /// A configured directory does not exist.
    #[error("Directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// Find the single entrypoint file in `dir`.
///
/// A missing directory has no entrypoint.
///
/// # Errors
///
/// Returns [`AppError::AmbiguousEntrypoint`] if several entrypoint files
/// exist.
pub fn find_entrypoint(dir: &Path) -> Result<Option<PathBuf>, AppError> {
    let found = ENTRYPOINT_FILE_NAMES
        .iter()
        .filter(|name| dir.join(name).is_file())
        .map(|name| (*name).to_string())
        .collect::<Vec<_>>();

    match found.as_slice() {
        [] => Ok(None),
        [name] => Ok(Some(dir.join(name))),
        _ => Err(AppError::AmbiguousEntrypoint {
            dir: dir.to_path_buf(),
            found,
        }),
    }
}

/// A discovered application.
#[derive(Debug)]
pub struct App {
    roots: RealmRoots,
    frontend_dir: PathBuf,
    frontend_entrypoint: Option<PathBuf>,
    backend_entrypoint: Option<PathBuf>,
    backend: Entrypoint,
}

impl App {
    /// Discover the application described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a realm directory holds several entrypoints or the
    /// configured pages directory is missing.
    pub fn discover(config: &AppConfig) -> Result<Self, AppError> {
        let frontend_dir = config.frontend();
        let backend_dir = config.backend();
        let roots = RealmRoots::new()
            .with_root(&frontend_dir, Realm::Frontend)
            .with_root(&backend_dir, Realm::Backend)
            .with_root(config.common(), Realm::Common);

        let frontend_entrypoint = find_entrypoint(&frontend_dir)?;
        let backend_entrypoint = find_entrypoint(&backend_dir)?;

        let backend = match (&backend_entrypoint, config.pages()) {
            (Some(path), _) => file_entrypoint(path),
            (None, Some(pages)) => {
                if !pages.is_dir() {
                    return Err(AppError::MissingDirectory(pages));
                }
                debug!(pages = %pages.display(), "Using pages directory as backend entrypoint");
                Entrypoint::handler(PageProvider::new(pages))
            }
            (None, None) => Entrypoint::Null,
        };

        Ok(Self {
            roots,
            frontend_dir,
            frontend_entrypoint,
            backend_entrypoint,
            backend,
        })
    }

    /// Realm roots of the app.
    #[must_use]
    pub fn roots(&self) -> &RealmRoots {
        &self.roots
    }

    /// Frontend realm directory.
    #[must_use]
    pub fn frontend_dir(&self) -> &Path {
        &self.frontend_dir
    }

    /// Frontend entrypoint file.
    #[must_use]
    pub fn frontend_entrypoint(&self) -> Option<&Path> {
        self.frontend_entrypoint.as_deref()
    }

    /// Backend entrypoint file.
    #[must_use]
    pub fn backend_entrypoint(&self) -> Option<&Path> {
        self.backend_entrypoint.as_deref()
    }

    /// Entrypoint resolved for server-rendered requests.
    #[must_use]
    pub fn backend(&self) -> &Entrypoint {
        &self.backend
    }
}

/// Entrypoint for a backend entrypoint file. Markup and markdown files are
/// served directly; script modules are evaluated by the module runtime.
fn file_entrypoint(path: &Path) -> Entrypoint {
    match extension(path) {
        "html" | "md" => Entrypoint::generator(FileContent::new(path)),
        _ => {
            debug!(entrypoint = %path.display(), "Backend entrypoint is a script module");
            Entrypoint::Null
        }
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

/// Load a file as content according to its extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn load_file(path: &Path) -> std::io::Result<Content> {
    let content = match extension(path) {
        "html" => Content::markup(Html::new(fs::read_to_string(path).await?)),
        "md" => Content::Markdown(fs::read_to_string(path).await?),
        "txt" => Content::Text(fs::read_to_string(path).await?),
        ext => Content::Raw(RawContent::new(fs::read(path).await?, content_type(ext))),
    };
    Ok(content)
}

/// MIME type for a file extension.
#[must_use]
pub fn content_type(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "txt" | "md" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Serves one file, re-read on every resolution.
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
}

impl FileContent {
    /// Create a generator for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentGenerator for FileContent {
    async fn generate(&self, _ctx: &Context, _params: &Params) -> Result<Entrypoint, BoxError> {
        Ok(load_file(&self.path).await?.into())
    }
}

/// Maps routes to files below a pages directory.
///
/// `/a/b` serves `a/b`, `a/b.html`, `a/b.md` or `a/b.txt`; a directory
/// serves its `index.*` file.
#[derive(Debug, Clone)]
pub struct PageProvider {
    root: PathBuf,
}

impl PageProvider {
    /// Create a provider for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the file serving `route`.
    pub async fn locate(&self, route: &Route) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in route.segments() {
            if !is_safe_segment(segment) {
                return None;
            }
            path.push(segment);
        }

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => return Some(path),
            Ok(meta) if meta.is_dir() => return find_index(&path).await,
            _ => {}
        }

        for ext in PAGE_EXTENSIONS {
            let mut candidate = path.clone().into_os_string();
            candidate.push(".");
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if fs::metadata(&candidate).await.is_ok_and(|meta| meta.is_file()) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl RouteHandler for PageProvider {
    async fn get_route(&self, route: &Route, _ctx: &Context) -> Result<Entrypoint, BoxError> {
        match self.locate(route).await {
            Some(path) => {
                debug!(route = %route, page = %path.display(), "Serving page");
                Ok(load_file(&path).await?.into())
            }
            None => Ok(Entrypoint::Null),
        }
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !matches!(segment, "." | "..") && !segment.contains(['/', '\\'])
}

async fn find_index(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_index = path.file_stem().and_then(|stem| stem.to_str()) == Some("index");
        if is_index && entry.file_type().await.is_ok_and(|ty| ty.is_file()) {
            candidates.push(path);
        }
    }
    candidates.sort_by_key(|path| {
        let rank = PAGE_EXTENSIONS
            .iter()
            .position(|ext| *ext == extension(path))
            .unwrap_or(PAGE_EXTENSIONS.len());
        (rank, path.clone())
    });
    candidates.into_iter().next()
}
