//! Route resolution.
//!
//! The resolver walks an [`Entrypoint`] depth-first, one boxed future per
//! layer, until it reaches terminal content or runs out of matches. Render
//! presets fix the method on the way down; the outermost one wins.

use crate::content::Content;
use crate::context::{Context, Params};
use crate::entrypoint::Entrypoint;
use ferry_protocol::{parse_route, IntoRoute, InvalidRouteError, RenderMethod, Route};
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tracing::{debug, trace};

/// Default maximum nesting of entrypoint layers.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Route representation could not be parsed.
    #[error("Invalid route: {0}")]
    InvalidRoute(#[from] InvalidRouteError),

    /// A content generator failed.
    #[error("Generator failed: {0}")]
    Generator(String),

    /// A route handler failed.
    #[error("Route handler failed: {0}")]
    Handler(String),

    /// A route manager failed.
    #[error("Route manager failed: {0}")]
    Manager(String),

    /// Entrypoints nest deeper than the configured limit.
    #[error("Entrypoint nesting exceeds maximum depth {0}")]
    DepthExceeded(usize),
}

impl ResolveError {
    /// The message of the underlying failure.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ResolveError::Generator(message)
            | ResolveError::Handler(message)
            | ResolveError::Manager(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Short error type name, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ResolveError::InvalidRoute(_) => "invalid_route",
            ResolveError::Generator(_) => "generator",
            ResolveError::Handler(_) => "handler",
            ResolveError::Manager(_) => "manager",
            ResolveError::DepthExceeded(_) => "depth_exceeded",
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum number of nested entrypoint layers.
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Outcome of resolving an entrypoint for a route.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Terminal content, `None` if nothing matched.
    pub content: Option<Content>,
    /// Effective render method.
    pub render_method: RenderMethod,
    /// Status code implied by the content.
    pub status_code: Option<u16>,
    /// Headers implied by the content.
    pub headers: Vec<(String, String)>,
    /// Route segments consumed by maps and managers.
    pub consumed: Route,
    /// Number of map, handler, generator and manager layers visited.
    ///
    /// Presets, deferred entrypoints and terminal content are transparent.
    pub dispatches: usize,
}

impl Resolution {
    /// Check if any content was found.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

#[derive(Debug, Clone)]
struct Frame {
    remaining: Route,
    consumed: Route,
    params: Params,
    fixed: Option<RenderMethod>,
    depth: usize,
}

impl Frame {
    fn deeper(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    fn terminal(self, content: Option<Content>) -> Resolution {
        let render_method = content
            .as_ref()
            .and_then(Content::forced_render_method)
            .unwrap_or(RenderMethod::choose(self.fixed, RenderMethod::Backend));
        Resolution {
            status_code: content.as_ref().and_then(Content::status_code),
            headers: content.as_ref().map(Content::headers).unwrap_or_default(),
            content,
            render_method,
            consumed: self.consumed,
            dispatches: 0,
        }
    }
}

/// Resolves entrypoints to content.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `entrypoint` for `route`.
    ///
    /// With `static_only`, request-dependent generators and handlers are not
    /// invoked; their static fallback is resolved instead.
    ///
    /// # Errors
    ///
    /// Returns an error if a generator, handler or manager fails or the
    /// entrypoint graph nests too deep. A route nothing matches is not an
    /// error, it yields a resolution without content.
    pub async fn resolve(
        &self,
        entrypoint: &Entrypoint,
        route: &Route,
        ctx: &Context,
        static_only: bool,
    ) -> Result<Resolution, ResolveError> {
        let frame = Frame {
            remaining: route.clone(),
            consumed: Route::root(),
            params: Params::new(),
            fixed: None,
            depth: 0,
        };
        let resolution = self
            .dispatch(entrypoint.clone(), frame, ctx, static_only)
            .await?;

        debug!(
            route = %route,
            method = %resolution.render_method,
            found = resolution.has_content(),
            dispatches = resolution.dispatches,
            "Route resolved"
        );
        Ok(resolution)
    }

    /// Recompute the route an entrypoint actually accepts for `route`.
    ///
    /// Map keys contribute their matched segments and managers their
    /// internal route. Terminal content contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler, generator or manager fails.
    pub async fn refetch_route(
        &self,
        entrypoint: &Entrypoint,
        route: &Route,
        ctx: &Context,
    ) -> Result<Route, ResolveError> {
        self.refetch(entrypoint.clone(), route.clone(), Params::new(), ctx, 0)
            .await
    }

    fn dispatch<'a>(
        &'a self,
        entrypoint: Entrypoint,
        frame: Frame,
        ctx: &'a Context,
        static_only: bool,
    ) -> BoxFuture<'a, Result<Resolution, ResolveError>> {
        async move {
            if frame.depth >= self.config.max_depth {
                return Err(ResolveError::DepthExceeded(self.config.max_depth));
            }
            trace!(
                kind = ?entrypoint.kind(),
                depth = frame.depth,
                route = %frame.remaining,
                "Dispatching entrypoint"
            );

            let layer = matches!(
                entrypoint,
                Entrypoint::Map(_)
                    | Entrypoint::Handler(_)
                    | Entrypoint::Generator(_)
                    | Entrypoint::Manager(_)
            );
            let mut next = frame.deeper();
            let mut resolution = match entrypoint {
                Entrypoint::Null => frame.terminal(None),
                Entrypoint::Content(content) => frame.terminal(Some(content)),
                Entrypoint::Deferred(deferred) => {
                    let inner = deferred.await;
                    self.dispatch(inner, next, ctx, static_only).await?
                }
                Entrypoint::Preset(preset) => {
                    next.fixed = next.fixed.or(Some(preset.method()));
                    self.dispatch(preset.entrypoint().clone(), next, ctx, static_only)
                        .await?
                }
                Entrypoint::Map(map) => match map.lookup(&frame.remaining, ctx) {
                    None => frame.terminal(None),
                    Some(found) => {
                        next.consumed = frame
                            .consumed
                            .join(&frame.remaining.prefix(found.consumed));
                        next.remaining = frame.remaining.skip(found.consumed);
                        next.params.extend(found.params);
                        let inner = found.entrypoint.clone();
                        self.dispatch(inner, next, ctx, static_only).await?
                    }
                },
                Entrypoint::Handler(handler) => {
                    if static_only && handler.is_request_dependent() {
                        match handler.static_fallback() {
                            Some(fallback) => {
                                self.dispatch(fallback, next, ctx, static_only).await?
                            }
                            None => frame.terminal(None),
                        }
                    } else {
                        let inner = handler
                            .get_route(&frame.remaining, ctx)
                            .await
                            .map_err(|e| ResolveError::Handler(e.to_string()))?;
                        self.dispatch(inner, next, ctx, static_only).await?
                    }
                }
                Entrypoint::Generator(generator) => {
                    if static_only && generator.is_request_dependent() {
                        match generator.static_fallback() {
                            Some(fallback) => {
                                self.dispatch(fallback, next, ctx, static_only).await?
                            }
                            None => frame.terminal(None),
                        }
                    } else {
                        let inner = generator
                            .generate(ctx, &frame.params)
                            .await
                            .map_err(|e| ResolveError::Generator(e.to_string()))?;
                        self.dispatch(inner, next, ctx, static_only).await?
                    }
                }
                Entrypoint::Manager(manager) => {
                    let accepted = manager
                        .resolve_route(&frame.remaining, ctx)
                        .await
                        .map_err(|e| ResolveError::Manager(e.to_string()))?;
                    let mut frame = frame;
                    frame.consumed = frame.consumed.join(&accepted.prefix(accepted.len()));
                    frame.terminal(Some(Content::Managed(manager)))
                }
            };

            if layer {
                resolution.dispatches += 1;
            }
            Ok(resolution)
        }
        .boxed()
    }

    fn refetch<'a>(
        &'a self,
        entrypoint: Entrypoint,
        route: Route,
        mut params: Params,
        ctx: &'a Context,
        depth: usize,
    ) -> BoxFuture<'a, Result<Route, ResolveError>> {
        async move {
            if depth >= self.config.max_depth {
                return Err(ResolveError::DepthExceeded(self.config.max_depth));
            }
            match entrypoint {
                Entrypoint::Null | Entrypoint::Content(_) => Ok(Route::root()),
                Entrypoint::Deferred(deferred) => {
                    self.refetch(deferred.await, route, params, ctx, depth + 1)
                        .await
                }
                Entrypoint::Preset(preset) => {
                    let inner = preset.entrypoint().clone();
                    self.refetch(inner, route, params, ctx, depth + 1).await
                }
                Entrypoint::Map(map) => {
                    let Some(found) = map.lookup(&route, ctx) else {
                        return Ok(Route::root());
                    };
                    let head = route.prefix(found.consumed);
                    let inner = found.entrypoint.clone();
                    params.extend(found.params);
                    let tail = self
                        .refetch(inner, route.skip(found.consumed), params, ctx, depth + 1)
                        .await?;
                    Ok(head.join(&tail))
                }
                Entrypoint::Handler(handler) => {
                    let inner = handler
                        .get_route(&route, ctx)
                        .await
                        .map_err(|e| ResolveError::Handler(e.to_string()))?;
                    self.refetch(inner, route, params, ctx, depth + 1).await
                }
                Entrypoint::Generator(generator) => {
                    let inner = generator
                        .generate(ctx, &params)
                        .await
                        .map_err(|e| ResolveError::Generator(e.to_string()))?;
                    self.refetch(inner, route, params, ctx, depth + 1).await
                }
                Entrypoint::Manager(manager) => Ok(manager.internal_route()),
            }
        }
        .boxed()
    }
}

/// Resolve `entrypoint` for a route representation with default settings.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidRoute`] if the representation cannot be
/// parsed, otherwise see [`Resolver::resolve`].
pub async fn resolve_entrypoint_route(
    entrypoint: &Entrypoint,
    route: impl IntoRoute,
    ctx: &Context,
    static_only: bool,
) -> Result<Resolution, ResolveError> {
    let route = parse_route(route)?;
    Resolver::default()
        .resolve(entrypoint, &route, ctx, static_only)
        .await
}

/// Recompute the accepted route with default settings.
///
/// # Errors
///
/// See [`Resolver::refetch_route`].
pub async fn refetch_route(
    entrypoint: &Entrypoint,
    route: impl IntoRoute,
    ctx: &Context,
) -> Result<Route, ResolveError> {
    let route = parse_route(route)?;
    Resolver::default().refetch_route(entrypoint, &route, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Html, MarkupNode, RawContent, SerializeOptions};
    use crate::entrypoint::{BoxError, FnGenerator, RouteHandler, RouteManager, RouteMap};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new(Route::root())
    }

    fn text(resolution: &Resolution) -> Option<String> {
        resolution.content.as_ref().and_then(Content::as_text)
    }

    #[tokio::test]
    async fn test_map_lookup() {
        let map: Entrypoint = RouteMap::new().route("/a", "A").route("/b", "B").into();

        let a = resolve_entrypoint_route(&map, "/a", &ctx(), false).await.unwrap();
        assert_eq!(text(&a).as_deref(), Some("A"));
        assert_eq!(a.consumed, Route::new(["a"], []));

        let c = resolve_entrypoint_route(&map, "/c", &ctx(), false).await.unwrap();
        assert!(c.content.is_none());
        assert_eq!(c.render_method, RenderMethod::Backend);
    }

    #[tokio::test]
    async fn test_outer_preset_wins() {
        let inner = Entrypoint::preset(RenderMethod::Dynamic, "x");
        let outer = Entrypoint::preset(RenderMethod::Static, RouteMap::new().route("/p", inner));

        let resolution = resolve_entrypoint_route(&outer, "/p", &ctx(), false)
            .await
            .unwrap();
        assert_eq!(resolution.render_method, RenderMethod::Static);
    }

    #[tokio::test]
    async fn test_raw_content_forces_method() {
        let raw = RawContent::new("{}", "application/json").with_status(201);
        let ep = Entrypoint::preset(RenderMethod::Hybrid, Content::from(raw));

        let resolution = resolve_entrypoint_route(&ep, "/", &ctx(), false).await.unwrap();
        assert_eq!(resolution.render_method, RenderMethod::RawContent);
        assert_eq!(resolution.status_code, Some(201));
    }

    #[tokio::test]
    async fn test_special_values() {
        let map: Entrypoint = RouteMap::new()
            .route("/err", Content::error("boom"))
            .route("/gone", Content::status(410))
            .route("/old", Content::redirect("/new"))
            .into();

        let err = resolve_entrypoint_route(&map, "/err", &ctx(), false).await.unwrap();
        assert_eq!(err.status_code, Some(500));
        let gone = resolve_entrypoint_route(&map, "/gone", &ctx(), false).await.unwrap();
        assert_eq!(gone.status_code, Some(410));
        let old = resolve_entrypoint_route(&map, "/old", &ctx(), false).await.unwrap();
        assert_eq!(old.status_code, Some(302));
        assert_eq!(old.render_method, RenderMethod::RawContent);
        assert_eq!(old.headers, vec![("location".to_string(), "/new".to_string())]);
    }

    #[tokio::test]
    async fn test_pattern_params_reach_generator() {
        let generator = FnGenerator::new(|_ctx: Context, params: Params| async move {
            let id = params.get("id").cloned().unwrap_or_default();
            Ok::<_, BoxError>(Entrypoint::from(format!("user {id}")))
        });
        let map: Entrypoint = RouteMap::new()
            .route("/users/:id", Entrypoint::generator(generator))
            .into();

        let resolution = resolve_entrypoint_route(&map, "/users/7", &ctx(), false)
            .await
            .unwrap();
        assert_eq!(text(&resolution).as_deref(), Some("user 7"));
        assert_eq!(resolution.dispatches, 2);
    }

    #[tokio::test]
    async fn test_nested_map_depth() {
        let leaf: Entrypoint = RouteMap::new().route("/c", "deep").into();
        let mid: Entrypoint = RouteMap::new().route("/b", leaf).into();
        let root: Entrypoint = RouteMap::new().route("/a", mid).into();

        let resolution = resolve_entrypoint_route(&root, "/a/b/c", &ctx(), false)
            .await
            .unwrap();
        assert_eq!(text(&resolution).as_deref(), Some("deep"));
        assert_eq!(resolution.dispatches, 3);
        assert_eq!(resolution.consumed, Route::new(["a", "b", "c"], []));
    }

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn get_route(&self, route: &Route, _ctx: &Context) -> Result<Entrypoint, BoxError> {
            Ok(Entrypoint::from(route.routename()))
        }
    }

    struct Cycle(Arc<AtomicUsize>);

    #[async_trait]
    impl RouteHandler for Cycle {
        async fn get_route(&self, _route: &Route, _ctx: &Context) -> Result<Entrypoint, BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Entrypoint::handler(Cycle(self.0.clone())))
        }
    }

    struct Failing;

    #[async_trait]
    impl RouteHandler for Failing {
        async fn get_route(&self, _route: &Route, _ctx: &Context) -> Result<Entrypoint, BoxError> {
            Err("database offline".into())
        }
    }

    #[tokio::test]
    async fn test_handler_sees_remaining_route() {
        let map: Entrypoint = RouteMap::new()
            .route("/api", Entrypoint::handler(Echo))
            .into();

        let resolution = resolve_entrypoint_route(&map, "/api/v1/items", &ctx(), false)
            .await
            .unwrap();
        assert_eq!(text(&resolution).as_deref(), Some("/v1/items"));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = Resolver::new(ResolverConfig { max_depth: 8 });
        let ep = Entrypoint::handler(Cycle(calls.clone()));

        let err = resolver
            .resolve(&ep, &Route::root(), &ctx(), false)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::DepthExceeded(8));
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_message() {
        let err = resolve_entrypoint_route(&Entrypoint::handler(Failing), "/", &ctx(), false)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "database offline");
        assert_eq!(err.kind(), "handler");
    }

    #[tokio::test]
    async fn test_static_only_skips_request_dependent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = FnGenerator::new(move |_ctx: Context, _params: Params| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BoxError>(Entrypoint::from("dynamic")) }
        })
        .request_dependent();
        let ep = Entrypoint::generator(generator);

        let skipped = resolve_entrypoint_route(&ep, "/", &ctx(), true).await.unwrap();
        assert!(skipped.content.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let full = resolve_entrypoint_route(&ep, "/", &ctx(), false).await.unwrap();
        assert_eq!(text(&full).as_deref(), Some("dynamic"));
    }

    #[tokio::test]
    async fn test_deferred_entrypoint() {
        let ep = Entrypoint::deferred(async { Entrypoint::from(Content::from(Html::new("<p>late</p>"))) });

        let first = resolve_entrypoint_route(&ep, "/", &ctx(), false).await.unwrap();
        let second = resolve_entrypoint_route(&ep, "/", &ctx(), false).await.unwrap();
        assert!(first.has_content() && second.has_content());
        assert_eq!(first.dispatches, 0);
    }

    #[tokio::test]
    async fn test_invalid_route() {
        let err = resolve_entrypoint_route(&Entrypoint::Null, "/%zz", &ctx(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidRoute(_)));
    }

    #[derive(Debug)]
    struct Tabs;

    impl MarkupNode for Tabs {
        fn serialize(&self, _options: &SerializeOptions) -> String {
            "<tabs></tabs>".to_string()
        }
    }

    #[async_trait]
    impl RouteManager for Tabs {
        async fn resolve_route(&self, route: &Route, _ctx: &Context) -> Result<Route, BoxError> {
            Ok(route.prefix(1))
        }

        fn internal_route(&self) -> Route {
            Route::new(["settings"], [])
        }
    }

    #[tokio::test]
    async fn test_manager_and_refetch() {
        let map: Entrypoint = RouteMap::new()
            .route("/app", Entrypoint::manager(Tabs))
            .into();

        let resolution = resolve_entrypoint_route(&map, "/app/settings/x", &ctx(), false)
            .await
            .unwrap();
        assert!(matches!(resolution.content, Some(Content::Managed(_))));
        assert_eq!(resolution.consumed, Route::new(["app", "settings"], []));

        let refetched = refetch_route(&map, "/app/profile", &ctx()).await.unwrap();
        assert_eq!(refetched, Route::new(["app", "settings"], []));
    }

    struct Mount;

    #[async_trait]
    impl RouteHandler for Mount {
        async fn get_route(&self, _route: &Route, _ctx: &Context) -> Result<Entrypoint, BoxError> {
            let panel = Entrypoint::preset(RenderMethod::Hybrid, Entrypoint::manager(Tabs));
            Ok(RouteMap::new().route("/panel", panel).into())
        }
    }

    #[tokio::test]
    async fn test_dispatches_bounded_by_layers() {
        let inner: Entrypoint = RouteMap::new().route("/admin", Entrypoint::handler(Mount)).into();
        let root: Entrypoint = RouteMap::new()
            .route("/app", Entrypoint::preset(RenderMethod::Static, inner))
            .into();

        let route = "/app/admin/panel/settings";
        let resolution = resolve_entrypoint_route(&root, route, &ctx(), false)
            .await
            .unwrap();
        assert!(matches!(resolution.content, Some(Content::Managed(_))));
        assert_eq!(resolution.render_method, RenderMethod::Static);

        // map depth 3, one handler, one manager
        let (map_depth, handlers, managers) = (3, 1, 1);
        assert!(resolution.dispatches <= map_depth + handlers + managers);
        assert_eq!(resolution.dispatches, 5);

        let miss = resolve_entrypoint_route(&root, "/app/nowhere", &ctx(), false)
            .await
            .unwrap();
        assert!(miss.content.is_none());
        assert_eq!(miss.dispatches, 2);
    }

    #[tokio::test]
    async fn test_refetch_passes_pattern_params() {
        let generator = FnGenerator::new(|_ctx: Context, params: Params| async move {
            let tabs: Entrypoint = match params.get("id") {
                Some(_) => RouteMap::new().route("/tab", "x").into(),
                None => Entrypoint::Null,
            };
            Ok::<_, BoxError>(tabs)
        });
        let map: Entrypoint = RouteMap::new()
            .route("/users/:id", Entrypoint::generator(generator))
            .into();

        let refetched = refetch_route(&map, "/users/7/tab", &ctx()).await.unwrap();
        assert_eq!(refetched, Route::new(["users", "7", "tab"], []));
    }
}
