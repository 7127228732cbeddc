//! Client-side navigation.
//!
//! The navigator decides what happens when the client moves to a new route:
//! render content from the frontend or backend entrypoint, accept content
//! that is already on the page, or fall back to a full reload.

use crate::context::Context;
use crate::entrypoint::Entrypoint;
use crate::resolver::{Resolution, ResolveError, Resolver};
use ferry_protocol::{RenderMethod, Route};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Path prefix reserved for runtime endpoints. Never intercepted.
pub const INTERNAL_PATH_PREFIX: &str = "/@ferry/";

/// Which entrypoint produced the current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrypointSource {
    /// The frontend entrypoint.
    Frontend,
    /// The backend entrypoint, loaded on the client.
    Backend,
    /// An entrypoint inferred from content already on the page.
    Inferred,
}

/// Identifies one navigation. Only the latest ticket may update the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NavigationTicket(u64);

/// Result of a navigation.
#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    /// Render the resolved content.
    Render {
        /// The entrypoint that produced the content.
        source: EntrypointSource,
        /// The resolution to render.
        resolution: Resolution,
    },
    /// The content already on the page serves the route.
    Accepted {
        /// The route the inferred entrypoint accepts.
        route: Route,
    },
    /// Reload the page from the server.
    Reload,
    /// No content and reloads are not allowed.
    NoContent,
    /// A newer navigation started while this one was in flight.
    Stale,
}

/// Outcome of comparing a requested route with the accepted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Same segments. Query differences are accepted.
    Agrees,
    /// The entrypoint accepts a different route.
    Diverges(Route),
}

/// The page currently shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPage {
    /// Route of the page.
    pub route: Route,
    /// Entrypoint the content came from.
    pub source: EntrypointSource,
    /// Render method of the content.
    pub render_method: RenderMethod,
}

/// Client navigation state.
#[derive(Debug)]
pub struct Navigator {
    frontend: Option<Entrypoint>,
    backend: Option<Entrypoint>,
    inferred: Option<Entrypoint>,
    allow_reload: bool,
    resolver: Resolver,
    latest: AtomicU64,
    current: Mutex<Option<CurrentPage>>,
}

impl Navigator {
    /// Create a navigator. Reloads are allowed by default.
    #[must_use]
    pub fn new(frontend: Option<Entrypoint>, backend: Option<Entrypoint>) -> Self {
        Self {
            frontend,
            backend,
            inferred: None,
            allow_reload: true,
            resolver: Resolver::default(),
            latest: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Use an entrypoint inferred from content already on the page.
    #[must_use]
    pub fn with_inferred(mut self, inferred: Entrypoint) -> Self {
        self.inferred = Some(inferred);
        self
    }

    /// Allow or forbid full page reloads.
    #[must_use]
    pub fn allow_reload(mut self, allow: bool) -> Self {
        self.allow_reload = allow;
        self
    }

    /// Use a custom resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Start a navigation, superseding all earlier ones.
    pub fn begin(&self) -> NavigationTicket {
        NavigationTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Check if `ticket` belongs to the most recent navigation.
    #[must_use]
    pub fn is_latest(&self, ticket: NavigationTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// The page currently shown.
    pub async fn current(&self) -> Option<CurrentPage> {
        self.current.lock().await.clone()
    }

    /// Navigate to `route` as a new navigation.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving an entrypoint fails.
    pub async fn handle_route(
        &self,
        route: &Route,
        ctx: &Context,
    ) -> Result<NavigationOutcome, ResolveError> {
        let ticket = self.begin();
        self.navigate(ticket, route, ctx).await
    }

    /// Navigate to `route` under an existing ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving an entrypoint fails.
    pub async fn navigate(
        &self,
        ticket: NavigationTicket,
        route: &Route,
        ctx: &Context,
    ) -> Result<NavigationOutcome, ResolveError> {
        let outcome = self.decide(route, ctx).await?;

        if !self.is_latest(ticket) {
            debug!(route = %route, ticket = ticket.0, "Discarding stale navigation");
            return Ok(NavigationOutcome::Stale);
        }

        let mut current = self.current.lock().await;
        match &outcome {
            NavigationOutcome::Render { source, resolution } => {
                *current = Some(CurrentPage {
                    route: route.clone(),
                    source: *source,
                    render_method: resolution.render_method,
                });
            }
            NavigationOutcome::Accepted { .. } => {
                if let Some(page) = current.as_mut() {
                    page.route = route.clone();
                }
            }
            _ => {}
        }
        debug!(route = %route, outcome = outcome.name(), "Navigation finished");
        Ok(outcome)
    }

    async fn decide(&self, route: &Route, ctx: &Context) -> Result<NavigationOutcome, ResolveError> {
        let configured = [
            (EntrypointSource::Frontend, self.frontend.as_ref()),
            (EntrypointSource::Backend, self.backend.as_ref()),
        ];

        let mut any_configured = false;
        for (source, entrypoint) in configured {
            let Some(entrypoint) = entrypoint else {
                continue;
            };
            any_configured = true;
            let resolution = self.resolver.resolve(entrypoint, route, ctx, false).await?;
            if resolution.has_content() {
                return Ok(NavigationOutcome::Render { source, resolution });
            }
        }

        if !any_configured {
            if let Some(inferred) = &self.inferred {
                return match self.reconcile(route, inferred, ctx).await? {
                    Reconciliation::Agrees => Ok(NavigationOutcome::Accepted {
                        route: route.clone(),
                    }),
                    Reconciliation::Diverges(actual) => {
                        debug!(expected = %route, actual = %actual, "Inferred entrypoint disagrees");
                        Ok(self.no_content())
                    }
                };
            }
        }

        Ok(self.no_content())
    }

    /// Compare `expected` with the route `entrypoint` actually accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if refetching the route fails.
    pub async fn reconcile(
        &self,
        expected: &Route,
        entrypoint: &Entrypoint,
        ctx: &Context,
    ) -> Result<Reconciliation, ResolveError> {
        let actual = self.resolver.refetch_route(entrypoint, expected, ctx).await?;
        if actual.segments_equal(expected) {
            Ok(Reconciliation::Agrees)
        } else {
            Ok(Reconciliation::Diverges(actual))
        }
    }

    fn no_content(&self) -> NavigationOutcome {
        if self.allow_reload {
            NavigationOutcome::Reload
        } else {
            NavigationOutcome::NoContent
        }
    }
}

impl NavigationOutcome {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            NavigationOutcome::Render { .. } => "render",
            NavigationOutcome::Accepted { .. } => "accepted",
            NavigationOutcome::Reload => "reload",
            NavigationOutcome::NoContent => "no_content",
            NavigationOutcome::Stale => "stale",
        }
    }
}

/// Check if a link to `target` clicked on a page at `origin` should be
/// handled by client navigation instead of the browser.
#[must_use]
pub fn should_intercept(target: &Url, origin: &Url) -> bool {
    target.origin() == origin.origin() && !target.path().starts_with(INTERNAL_PATH_PREFIX)
}
