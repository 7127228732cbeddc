//! The entrypoint model.
//!
//! An [`Entrypoint`] is anything that can eventually produce content for a
//! route: terminal content, an async generator, a route map, a handler that
//! picks another entrypoint, a manager that routes itself, a render preset,
//! or a deferred value that yields one of the above.

use crate::content::{Content, MarkupNode};
use crate::context::{Context, Params};
use async_trait::async_trait;
use ferry_protocol::{parse_route, RenderMethod, Route};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type returned by user-provided generators, handlers and managers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future type of deferred entrypoints.
pub type DeferredEntrypoint = Shared<BoxFuture<'static, Entrypoint>>;

/// Produces content from the request context.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate the entrypoint for this request.
    async fn generate(&self, ctx: &Context, params: &Params) -> Result<Entrypoint, BoxError>;

    /// Check if the output depends on the individual request.
    ///
    /// Request-dependent generators are skipped during static resolution.
    fn is_request_dependent(&self) -> bool {
        false
    }

    /// Entrypoint used instead when a static resolution skips this generator.
    fn static_fallback(&self) -> Option<Entrypoint> {
        None
    }
}

/// Picks an entrypoint for the remaining route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Return the entrypoint serving `route`.
    async fn get_route(&self, route: &Route, ctx: &Context) -> Result<Entrypoint, BoxError>;

    /// Check if the returned entrypoint depends on the individual request.
    fn is_request_dependent(&self) -> bool {
        false
    }

    /// Entrypoint used instead when a static resolution skips this handler.
    fn static_fallback(&self) -> Option<Entrypoint> {
        None
    }
}

/// A markup node that manages its own internal route.
#[async_trait]
pub trait RouteManager: MarkupNode {
    /// Route to `route` and return the portion that was consumed.
    async fn resolve_route(&self, route: &Route, ctx: &Context) -> Result<Route, BoxError>;

    /// The route currently displayed by the manager.
    fn internal_route(&self) -> Route;
}

/// A [`ContentGenerator`] backed by an async closure.
pub struct FnGenerator<F> {
    f: F,
    request_dependent: bool,
}

impl<F, Fut> FnGenerator<F>
where
    F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Entrypoint, BoxError>> + Send + 'static,
{
    /// Wrap a closure. The generator is treated as request-independent.
    pub fn new(f: F) -> Self {
        Self {
            f,
            request_dependent: false,
        }
    }

    /// Mark the generator as depending on the individual request.
    #[must_use]
    pub fn request_dependent(mut self) -> Self {
        self.request_dependent = true;
        self
    }
}

#[async_trait]
impl<F, Fut> ContentGenerator for FnGenerator<F>
where
    F: Fn(Context, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Entrypoint, BoxError>> + Send + 'static,
{
    async fn generate(&self, ctx: &Context, params: &Params) -> Result<Entrypoint, BoxError> {
        (self.f)(ctx.clone(), params.clone()).await
    }

    fn is_request_dependent(&self) -> bool {
        self.request_dependent
    }
}

/// An entrypoint paired with a fixed render method.
#[derive(Clone)]
pub struct RenderPreset {
    method: RenderMethod,
    entrypoint: Arc<Entrypoint>,
}

impl RenderPreset {
    /// Create a preset.
    #[must_use]
    pub fn new(method: RenderMethod, entrypoint: impl Into<Entrypoint>) -> Self {
        Self {
            method,
            entrypoint: Arc::new(entrypoint.into()),
        }
    }

    /// The fixed render method.
    #[must_use]
    pub fn method(&self) -> RenderMethod {
        self.method
    }

    /// The wrapped entrypoint.
    #[must_use]
    pub fn entrypoint(&self) -> &Entrypoint {
        &self.entrypoint
    }
}

impl fmt::Debug for RenderPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPreset")
            .field("method", &self.method)
            .field("entrypoint", &self.entrypoint)
            .finish()
    }
}

/// Predicate-based map key. Filters never consume route segments.
pub trait RouteFilter: Send + Sync {
    /// Check if the filter accepts the request.
    fn matches(&self, route: &Route, ctx: &Context) -> bool;
}

impl<F> RouteFilter for F
where
    F: Fn(&Route, &Context) -> bool + Send + Sync,
{
    fn matches(&self, route: &Route, ctx: &Context) -> bool {
        self(route, ctx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
    Rest(String),
}

/// A path pattern with `:name` parameters and an optional trailing `*rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<PatternSegment>,
}

impl RoutePattern {
    /// Parse a pattern such as `/users/:id/*`.
    ///
    /// A bare `*` binds the rest under the name `*`. Segments after a rest
    /// capture are ignored.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = part.strip_prefix(':') {
                segments.push(PatternSegment::Param(name.to_string()));
            } else if let Some(name) = part.strip_prefix('*') {
                let name = if name.is_empty() { "*" } else { name };
                segments.push(PatternSegment::Rest(name.to_string()));
                break;
            } else {
                segments.push(PatternSegment::Literal(literal_segment(part)));
            }
        }
        Self { segments }
    }

    /// Check if a key string needs pattern matching.
    #[must_use]
    pub fn is_pattern(key: &str) -> bool {
        key.split('/')
            .any(|part| part.starts_with(':') || part.starts_with('*'))
    }

    /// Match against the start of `route`, returning consumed segments and
    /// bound parameters.
    #[must_use]
    pub fn match_prefix(&self, route: &Route) -> Option<(usize, Params)> {
        let input = route.segments();
        let mut params = Params::new();
        let mut consumed = 0;

        for segment in &self.segments {
            match segment {
                PatternSegment::Literal(literal) => {
                    if input.get(consumed)? != literal {
                        return None;
                    }
                    consumed += 1;
                }
                PatternSegment::Param(name) => {
                    params.insert(name.clone(), input.get(consumed)?.clone());
                    consumed += 1;
                }
                PatternSegment::Rest(name) => {
                    params.insert(name.clone(), input[consumed..].join("/"));
                    consumed = input.len();
                }
            }
        }
        Some((consumed, params))
    }
}

fn literal_segment(part: &str) -> String {
    parse_route(part)
        .ok()
        .and_then(|route| route.segments().first().cloned())
        .unwrap_or_else(|| part.to_string())
}

/// A key of a [`RouteMap`].
#[derive(Clone)]
pub enum RouteKey {
    /// Literal segments.
    Literal(Route),
    /// Segment pattern.
    Pattern(RoutePattern),
    /// Request predicate.
    Filter(Arc<dyn RouteFilter>),
}

impl fmt::Debug for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKey::Literal(route) => write!(f, "Literal({route})"),
            RouteKey::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            RouteKey::Filter(_) => f.write_str("Filter"),
        }
    }
}

/// Result of a map lookup.
#[derive(Debug)]
pub struct MapMatch<'a> {
    /// The entrypoint stored under the matching key.
    pub entrypoint: &'a Entrypoint,
    /// Number of route segments the key consumed.
    pub consumed: usize,
    /// Parameters bound by a pattern key.
    pub params: Params,
}

/// An ordered mapping from keys to entrypoints.
#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    entries: Arc<Vec<(RouteKey, Entrypoint)>>,
}

impl RouteMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string key. Keys containing `:name` or `*` segments become
    /// patterns, everything else a literal.
    #[must_use]
    pub fn route(self, key: &str, entrypoint: impl Into<Entrypoint>) -> Self {
        let key = if RoutePattern::is_pattern(key) {
            RouteKey::Pattern(RoutePattern::parse(key))
        } else {
            // keys that fail to decode are matched verbatim
            let literal = parse_route(key).unwrap_or_else(|_| {
                Route::new(key.split('/'), std::iter::empty::<(String, String)>())
            });
            RouteKey::Literal(literal.prefix(literal.len()))
        };
        self.insert(key, entrypoint)
    }

    /// Add a filter key.
    #[must_use]
    pub fn filter(self, filter: impl RouteFilter + 'static, entrypoint: impl Into<Entrypoint>) -> Self {
        self.insert(RouteKey::Filter(Arc::new(filter)), entrypoint)
    }

    /// Add an arbitrary key.
    #[must_use]
    pub fn insert(mut self, key: RouteKey, entrypoint: impl Into<Entrypoint>) -> Self {
        Arc::make_mut(&mut self.entries).push((key, entrypoint.into()));
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&RouteKey, &Entrypoint)> {
        self.entries.iter().map(|(key, entrypoint)| (key, entrypoint))
    }

    /// Find the entry serving `route`.
    ///
    /// An exact literal match wins. Otherwise keys are tried in insertion
    /// order and the first prefix, pattern or filter match is taken.
    #[must_use]
    pub fn lookup(&self, route: &Route, ctx: &Context) -> Option<MapMatch<'_>> {
        let exact = self.entries.iter().find_map(|(key, entrypoint)| match key {
            RouteKey::Literal(literal) if literal.segments_equal(route) => Some(MapMatch {
                entrypoint,
                consumed: literal.len(),
                params: Params::new(),
            }),
            _ => None,
        });
        if exact.is_some() {
            return exact;
        }

        self.entries.iter().find_map(|(key, entrypoint)| {
            let (consumed, params) = match key {
                RouteKey::Literal(literal) => {
                    if literal.is_empty() || !route.starts_with(literal.segments()) {
                        return None;
                    }
                    (literal.len(), Params::new())
                }
                RouteKey::Pattern(pattern) => pattern.match_prefix(route)?,
                RouteKey::Filter(filter) => {
                    if !filter.matches(route, ctx) {
                        return None;
                    }
                    (0, Params::new())
                }
            };
            Some(MapMatch {
                entrypoint,
                consumed,
                params,
            })
        })
    }
}

impl<K, E> FromIterator<(K, E)> for RouteMap
where
    K: AsRef<str>,
    E: Into<Entrypoint>,
{
    fn from_iter<T: IntoIterator<Item = (K, E)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(RouteMap::new(), |map, (key, entrypoint)| map.route(key.as_ref(), entrypoint))
    }
}

/// Kind of an entrypoint, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrypointKind {
    /// No content.
    Null,
    /// Terminal content.
    Content,
    /// Async generator.
    Generator,
    /// Route map.
    Map,
    /// Route handler.
    Handler,
    /// Route manager.
    Manager,
    /// Render preset.
    Preset,
    /// Deferred value.
    Deferred,
}

/// A value that can be resolved to content for a route.
#[derive(Clone, Default)]
pub enum Entrypoint {
    /// Nothing to render.
    #[default]
    Null,
    /// Terminal content.
    Content(Content),
    /// Generates content per request.
    Generator(Arc<dyn ContentGenerator>),
    /// Maps route keys to entrypoints.
    Map(RouteMap),
    /// Picks an entrypoint for the remaining route.
    Handler(Arc<dyn RouteHandler>),
    /// Routes itself and renders as content.
    Manager(Arc<dyn RouteManager>),
    /// Fixes the render method of the wrapped entrypoint.
    Preset(RenderPreset),
    /// Resolves to another entrypoint later.
    Deferred(DeferredEntrypoint),
}

impl Entrypoint {
    /// Wrap a future yielding an entrypoint.
    pub fn deferred(future: impl Future<Output = Entrypoint> + Send + 'static) -> Self {
        Entrypoint::Deferred(future.boxed().shared())
    }

    /// Wrap an entrypoint in a render preset.
    #[must_use]
    pub fn preset(method: RenderMethod, entrypoint: impl Into<Entrypoint>) -> Self {
        Entrypoint::Preset(RenderPreset::new(method, entrypoint))
    }

    /// Wrap a generator.
    pub fn generator(generator: impl ContentGenerator + 'static) -> Self {
        Entrypoint::Generator(Arc::new(generator))
    }

    /// Wrap a handler.
    pub fn handler(handler: impl RouteHandler + 'static) -> Self {
        Entrypoint::Handler(Arc::new(handler))
    }

    /// Wrap a route manager.
    pub fn manager(manager: impl RouteManager + 'static) -> Self {
        Entrypoint::Manager(Arc::new(manager))
    }

    /// Classify this entrypoint.
    #[must_use]
    pub fn kind(&self) -> EntrypointKind {
        match self {
            Entrypoint::Null => EntrypointKind::Null,
            Entrypoint::Content(_) => EntrypointKind::Content,
            Entrypoint::Generator(_) => EntrypointKind::Generator,
            Entrypoint::Map(_) => EntrypointKind::Map,
            Entrypoint::Handler(_) => EntrypointKind::Handler,
            Entrypoint::Manager(_) => EntrypointKind::Manager,
            Entrypoint::Preset(_) => EntrypointKind::Preset,
            Entrypoint::Deferred(_) => EntrypointKind::Deferred,
        }
    }

    /// Check if this is [`Entrypoint::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Entrypoint::Null)
    }
}

impl fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entrypoint::Content(content) => f.debug_tuple("Content").field(content).finish(),
            Entrypoint::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Entrypoint::Manager(manager) => f.debug_tuple("Manager").field(manager).finish(),
            Entrypoint::Preset(preset) => f.debug_tuple("Preset").field(preset).finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

impl From<Content> for Entrypoint {
    fn from(content: Content) -> Self {
        Entrypoint::Content(content)
    }
}

impl From<&str> for Entrypoint {
    fn from(text: &str) -> Self {
        Entrypoint::Content(text.into())
    }
}

impl From<String> for Entrypoint {
    fn from(text: String) -> Self {
        Entrypoint::Content(text.into())
    }
}

impl From<RouteMap> for Entrypoint {
    fn from(map: RouteMap) -> Self {
        Entrypoint::Map(map)
    }
}

impl From<RenderPreset> for Entrypoint {
    fn from(preset: RenderPreset) -> Self {
        Entrypoint::Preset(preset)
    }
}

impl<T: Into<Entrypoint>> From<Option<T>> for Entrypoint {
    fn from(value: Option<T>) -> Self {
        value.map_or(Entrypoint::Null, Into::into)
    }
}
