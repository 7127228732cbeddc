//! HTTP handlers for the Ferry server.
//!
//! This module serves rendered pages, generated cross-realm stubs and the
//! live channel used for hot reloading and value updates.

use crate::app::App;
use crate::config::Config;
use crate::metrics::{self, LiveChannelGuard};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path as UrlPath, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use ferry_core::{Content, Context, Resolution, Resolver, SerializeOptions, SpecialContent};
use ferry_live::{AttachOutcome, Broker, ChannelSender, SenderId, SessionParams, ValueStore};
use ferry_protocol::{parse_route, Command, RenderMethod, StartId};
use ferry_realm::{ExportTable, Exposer, ImportResolution, ImportSet, MemoryFiles, StubEvent};
use futures_util::stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Path of the live channel endpoint.
pub const LIVE_PATH: &str = "/@ferry/sse";

/// Module loaded by pages that use the client runtime.
pub const CLIENT_RUNTIME: &str = "/@ferry/runtime/client.ts";

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The discovered application.
    pub app: App,
    /// Route resolver.
    pub resolver: Resolver,
    /// Live update broker.
    pub broker: Broker,
    /// Cross-realm import exposer.
    pub exposer: Exposer,
    /// Generated stub files.
    pub files: Arc<MemoryFiles>,
    /// Exports of backend modules.
    pub exports: Arc<ExportTable>,
    backend_stub: Option<String>,
}

impl AppState {
    /// Discover the app and create the server state.
    ///
    /// # Errors
    ///
    /// Returns an error if the app layout is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let app = App::discover(&config.app)?;
        let files = Arc::new(MemoryFiles::new());
        let exports = Arc::new(ExportTable::new());
        let values: Arc<ValueStore> = Arc::new(ValueStore::new());

        let exposer = Exposer::new(
            app.roots().clone(),
            config.exposer_config(),
            exports.clone(),
            files.clone(),
        );
        let broker = Broker::with_registry(
            StartId::generate(),
            config.broker_config(),
            values,
        );

        Ok(Self {
            resolver: Resolver::new(config.resolver_config()),
            config,
            app,
            broker,
            exposer,
            files,
            exports,
            backend_stub: None,
        })
    }

    /// Give the frontend an interface stub of the backend entrypoint.
    ///
    /// Returns the web path of the stub, if the app has both a frontend and
    /// a backend entrypoint file.
    ///
    /// # Errors
    ///
    /// Returns an error if the entrypoint cannot be read or the import is
    /// rejected.
    pub async fn expose_backend_entrypoint(&mut self) -> Result<Option<String>> {
        let Some(backend) = self.app.backend_entrypoint().map(std::path::Path::to_path_buf) else {
            return Ok(None);
        };
        if !self.app.frontend_dir().is_dir() {
            return Ok(None);
        }

        let source = tokio::fs::read_to_string(&backend).await?;
        let module = self.exposer.module_id(&backend);
        let exports = crate::exports::scan_exports(&backend, &source)?;
        self.exports.set_exports(module, exports);

        let importer = self
            .app
            .frontend_entrypoint()
            .unwrap_or(self.app.frontend_dir())
            .to_path_buf();
        let resolution = self
            .exposer
            .resolve_import(&importer, backend.as_path(), ImportSet::all())
            .await?;

        if let ImportResolution::Remote { web_path } = resolution {
            debug!(stub = %web_path, "Exposed backend entrypoint to frontend");
            self.backend_stub = Some(web_path);
        }
        Ok(self.backend_stub.clone())
    }

    /// Web path of the backend entrypoint stub.
    #[must_use]
    pub fn backend_stub(&self) -> Option<&str> {
        self.backend_stub.as_deref()
    }

    /// Web path of the frontend entrypoint module.
    #[must_use]
    pub fn frontend_module(&self) -> Option<String> {
        self.app
            .frontend_entrypoint()
            .map(|path| format!("/{}", self.exposer.module_id(path)))
    }
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the app is invalid or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let mut state = AppState::new(config.clone())?;
    match state.expose_backend_entrypoint().await {
        Ok(Some(stub)) => info!("Backend entrypoint exposed at {}", stub),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Cannot expose backend entrypoint"),
    }
    let state = Arc::new(state);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    if config.live.enabled {
        tokio::spawn(forward_stub_events(
            state.exposer.subscribe(),
            state.broker.clone(),
        ));
    }

    let app = router(state, &config);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Ferry server listening on {}", addr);
    if config.live.enabled {
        info!("Live channel: http://{}{}", addr, LIVE_PATH);
    }

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    let src = format!("{}*path", config.expose.src_prefix);
    let external = format!("{}*path", config.expose.external_prefix);

    let mut router = Router::new()
        .route(&src, get(src_stub_handler))
        .route(&external, get(external_stub_handler))
        .route("/health", get(health_handler));
    if config.live.enabled {
        router = router.route(LIVE_PATH, get(live_handler));
    }
    router.fallback(page_handler).with_state(state)
}

/// Broadcast `RELOAD` after every stub regeneration.
async fn forward_stub_events(mut events: broadcast::Receiver<StubEvent>, broker: Broker) {
    loop {
        match events.recv().await {
            Ok(event) => {
                metrics::record_stub_regeneration();
                let recipients = broker.broadcast(&Command::Reload);
                metrics::record_broadcast(Command::Reload.name());
                debug!(stub = %event.web_path, recipients, "Stub changed, reloading clients");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Stub events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Query parameters of the live channel.
#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    /// Start id the page was rendered with.
    pub usid: Option<String>,
    /// JSON array of value ids to observe.
    pub observe: Option<String>,
}

/// Removes a live channel from the broker when its response body is dropped.
struct Detach {
    broker: Broker,
    id: SenderId,
    _metrics: LiveChannelGuard,
}

impl Drop for Detach {
    fn drop(&mut self) {
        if self.broker.remove_sender(&self.id) {
            debug!(sender = %self.id, "Live channel closed");
        }
    }
}

/// Live channel handler.
async fn live_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
) -> Response {
    let params = SessionParams::from_query(query.usid.as_deref(), query.observe.as_deref());
    let id = SenderId::generate();
    let (sender, rx) = ChannelSender::channel();

    match state.broker.attach(id.clone(), Arc::new(sender), &params) {
        AttachOutcome::Registered { observed } => {
            debug!(sender = %id, observed, "Live channel opened");
            state
                .broker
                .spawn_keepalive(id.clone(), state.broker.config().ping_interval);
        }
        AttachOutcome::Reloading => {
            debug!(sender = %id, "Live channel of outdated page");
        }
    }

    let detach = Detach {
        broker: state.broker.clone(),
        id,
        _metrics: LiveChannelGuard::new(),
    };
    event_stream(rx, detach)
}

fn event_stream(rx: UnboundedReceiver<Bytes>, detach: Detach) -> Response {
    let events = stream::unfold((rx, detach), |(mut rx, detach)| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(event), (rx, detach)))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(events),
    )
        .into_response()
}

async fn src_stub_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    let prefix = state.config.expose.src_prefix.clone();
    serve_stub(&state, &prefix, &path)
}

async fn external_stub_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    let prefix = state.config.expose.external_prefix.clone();
    serve_stub(&state, &prefix, &path)
}

/// Serve a generated stub. Interface stubs are stored with an added `.ts`.
fn serve_stub(state: &AppState, prefix: &str, path: &str) -> Response {
    let web_path = format!("{prefix}{path}");
    let stub = state
        .files
        .get(&web_path)
        .or_else(|| state.files.get(&format!("{web_path}.ts")));

    match stub {
        Some(source) => (
            [(header::CONTENT_TYPE, "application/typescript; charset=utf-8")],
            source,
        )
            .into_response(),
        None => {
            debug!(web_path = %web_path, "Unknown stub");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Render the page for any other route.
async fn page_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let route = match parse_route(target.as_str()) {
        Ok(route) => route,
        Err(e) => {
            metrics::record_error("invalid_route");
            return error_page(&state, StatusCode::BAD_REQUEST, &e.to_string(), "en");
        }
    };

    let mut builder = Context::builder(route.clone());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            builder = builder.header(name.as_str(), value);
        }
    }
    let ctx = builder.build();

    let start = Instant::now();
    match state
        .resolver
        .resolve(state.app.backend(), &route, &ctx, true)
        .await
    {
        Ok(resolution) => {
            metrics::record_resolution(resolution.render_method, start.elapsed().as_secs_f64());
            render(&state, &ctx, resolution)
        }
        Err(e) => {
            error!(route = %route, error = %e, "Resolution failed");
            metrics::record_error(e.kind());
            error_page(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                &e.message(),
                ctx.language(),
            )
        }
    }
}

fn render(state: &AppState, ctx: &Context, resolution: Resolution) -> Response {
    let lang = ctx.language();
    let method = resolution.render_method;
    let status = resolution
        .status_code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let body = match &resolution.content {
        None if state.app.frontend_entrypoint().is_some() => {
            // the frontend entrypoint gets its turn on the client
            String::new()
        }
        None => {
            return error_page(
                state,
                StatusCode::NOT_FOUND,
                &format!("Not found: {}", ctx.route()),
                lang,
            );
        }
        Some(Content::Raw(raw)) => {
            let mut response = Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, raw.content_type.as_str());
            for (name, value) in &raw.headers {
                response = response.header(name.as_str(), value.as_str());
            }
            return finish(state, response.body(Body::from(raw.body.clone())), lang);
        }
        Some(Content::Special(SpecialContent::Redirect { location, .. })) => {
            let response = Response::builder()
                .status(status)
                .header(header::LOCATION, location.as_str());
            return finish(state, response.body(Body::empty()), lang);
        }
        Some(Content::Special(special)) => {
            let message = resolution
                .content
                .as_ref()
                .and_then(Content::as_text)
                .unwrap_or_else(|| status.to_string());
            let code = StatusCode::from_u16(special.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return error_page(state, code, &message, lang);
        }
        Some(Content::Markup(node)) => node.serialize(&SerializeOptions::for_method(method, lang)),
        Some(Content::Managed(manager)) => {
            manager.serialize(&SerializeOptions::for_method(method, lang))
        }
        Some(Content::Markdown(source)) => {
            format!("<pre class=\"markdown\">{}</pre>", escape_html(source))
        }
        Some(content @ (Content::Text(_) | Content::Scalar(_))) => {
            escape_html(&content.as_text().unwrap_or_default())
        }
    };

    let method = if resolution.content.is_none() {
        RenderMethod::Dynamic
    } else {
        method
    };
    let live_values = match (&resolution.content, method) {
        (Some(content), RenderMethod::Backend) => content.live_values(),
        _ => Vec::new(),
    };
    let html = page(state, lang, method, &body, &live_values);

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8");
    for (name, value) in &resolution.headers {
        response = response.header(name.as_str(), value.as_str());
    }
    finish(state, response.body(Body::from(html)), lang)
}

/// Turn a built response into the final one, falling back to an error page.
fn finish(
    state: &AppState,
    response: Result<Response, axum::http::Error>,
    lang: &str,
) -> Response {
    response.unwrap_or_else(|e| {
        error!(error = %e, "Invalid response");
        metrics::record_error("response");
        error_page(
            state,
            StatusCode::INTERNAL_SERVER_ERROR,
            &e.to_string(),
            lang,
        )
    })
}

/// Error page with `message`. A failure while building it yields a bare 500.
fn error_page(state: &AppState, status: StatusCode, message: &str, lang: &str) -> Response {
    let body = format!(
        "<h1>{}</h1>\n<pre class=\"error\">{}</pre>",
        status.as_u16(),
        escape_html(message)
    );
    let html = page(state, lang, RenderMethod::Static, &body, &[]);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(html))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Wrap `body` in an HTML document.
fn page(
    state: &AppState,
    lang: &str,
    method: RenderMethod,
    body: &str,
    live_values: &[String],
) -> String {
    let mut head = String::from("<meta charset=\"utf-8\">\n");

    if method.injects_client_runtime() {
        head.push_str(&module_script(CLIENT_RUNTIME));
        if let Some(frontend) = state.frontend_module() {
            head.push_str(&module_script(&frontend));
        }
        if method.requires_frontend_entrypoint() {
            if let Some(stub) = state.backend_stub() {
                head.push_str(&module_script(stub));
            }
        }
    }
    if state.config.live.enabled && method != RenderMethod::Static {
        head.push_str(&format!(
            "<meta name=\"ferry-usid\" content=\"{}\">\n",
            escape_html(state.broker.start_id().as_str())
        ));
    }
    if !live_values.is_empty() {
        let ids = serde_json::to_string(live_values)
            .unwrap_or_else(|_| "[]".to_string())
            .replace("</", "<\\/");
        head.push_str(&format!(
            "<script type=\"application/json\" id=\"ferry-observe\">{ids}</script>\n"
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n{}</head>\n<body data-render-method=\"{}\">\n{}\n</body>\n</html>\n",
        escape_html(lang),
        head,
        method,
        body
    )
}

fn module_script(src: &str) -> String {
    format!(
        "<script type=\"module\" src=\"{}\"></script>\n",
        escape_html(src)
    )
}

/// Escape text for HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use ferry_protocol::codec;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    struct TestApp {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    async fn setup(files: &[(&str, &str)], pages: bool) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        for realm in ["frontend", "backend", "common", "pages"] {
            fs::create_dir_all(dir.path().join(realm)).unwrap();
        }
        for (path, content) in files {
            fs::write(dir.path().join(path), content).unwrap();
        }

        let mut config = Config {
            app: AppConfig {
                base_dir: dir.path().to_path_buf(),
                pages_dir: pages.then(|| PathBuf::from("pages")),
                ..AppConfig::default()
            },
            ..Config::default()
        };
        config.expose.debounce_ms = 10;

        let mut state = AppState::new(config).unwrap();
        state.expose_backend_entrypoint().await.unwrap();
        TestApp {
            _dir: dir,
            state: Arc::new(state),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> Response {
        page_handler(
            State(state.clone()),
            uri.parse().unwrap(),
            HeaderMap::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_markdown_page() {
        let app = setup(&[("pages/index.md", "# <Hi>")], true).await;
        let response = get(&app.state, "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("<pre class=\"markdown\"># &lt;Hi&gt;</pre>"));
        assert!(html.contains("data-render-method=\"BACKEND\""));
        assert!(html.contains(CLIENT_RUNTIME));
    }

    #[tokio::test]
    async fn test_markup_page_is_serialized() {
        let app = setup(&[("pages/about.html", "<main>About</main>")], true).await;
        let response = get(&app.state, "/about").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("<main>About</main>"));
    }

    #[tokio::test]
    async fn test_raw_content_is_served_verbatim() {
        let app = setup(&[("pages/data.json", "{\"a\":1}")], true).await;
        let response = get(&app.state, "/data.json").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(body_text(response).await, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_not_found() {
        let app = setup(&[], true).await;
        let response = get(&app.state, "/missing").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Not found: /missing"));
    }

    #[tokio::test]
    async fn test_frontend_entrypoint_gets_shell() {
        let app = setup(&[("frontend/entrypoint.ts", "")], false).await;
        let response = get(&app.state, "/anything").await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("data-render-method=\"DYNAMIC\""));
        assert!(html.contains("src=\"/frontend/entrypoint.ts\""));
    }

    #[tokio::test]
    async fn test_backend_entrypoint_stub() {
        let app = setup(
            &[
                ("frontend/entrypoint.ts", ""),
                (
                    "backend/entrypoint.ts",
                    "export function load(id) {}\nexport default {};\n",
                ),
            ],
            false,
        )
        .await;

        let stub = app.state.backend_stub().unwrap().to_string();
        assert_eq!(stub, "/@ferry/src/backend/entrypoint.ts");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = serve_stub(&app.state, "/@ferry/src/", "backend/entrypoint.ts");
        assert_eq!(response.status(), StatusCode::OK);
        let source = body_text(response).await;
        assert!(source.contains("export const load = exports[\"load\"];"));
        assert!(source.contains("export default exports[\"default\"];"));

        let missing = serve_stub(&app.state, "/@ferry/src/", "backend/other.ts");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_page() {
        let app = setup(&[], false).await;
        let response = error_page(
            &app.state,
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom <script>",
            "en",
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let html = body_text(response).await;
        assert!(html.contains("boom &lt;script&gt;"));
        assert!(!html.contains(CLIENT_RUNTIME));
    }

    #[tokio::test]
    async fn test_live_channel_handshake() {
        let app = setup(&[], false).await;
        let usid = app.state.broker.start_id().as_str().to_string();

        let response = live_handler(
            State(app.state.clone()),
            Query(LiveQuery {
                usid: Some(usid),
                observe: None,
            }),
        )
        .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(app.state.broker.stats().sender_count, 1);

        assert_eq!(app.state.broker.broadcast(&Command::Reload), 1);
        drop(response);
        assert_eq!(app.state.broker.stats().sender_count, 0);
    }

    #[tokio::test]
    async fn test_outdated_page_is_reloaded() {
        let app = setup(&[], false).await;
        let response = live_handler(
            State(app.state.clone()),
            Query(LiveQuery {
                usid: Some("outdated".to_string()),
                observe: None,
            }),
        )
        .await;

        assert_eq!(app.state.broker.stats().sender_count, 0);
        let mut body = response.into_body().into_data_stream();
        let event = futures_util::StreamExt::next(&mut body).await.unwrap().unwrap();
        assert_eq!(codec::decode(&event).unwrap(), Command::Reload);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
