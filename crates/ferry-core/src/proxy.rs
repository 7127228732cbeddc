//! Entrypoint proxies.
//!
//! An [`EntrypointProxy`] wraps another entrypoint and lets [`ProxyHooks`]
//! rewrite the route, replace the wrapped entrypoint or transform the
//! resolved content. Hooks left at their defaults pass everything through.

use crate::content::Content;
use crate::context::Context;
use crate::entrypoint::{BoxError, Entrypoint, RenderPreset, RouteHandler};
use crate::resolver::{Resolver, ResolverConfig};
use async_trait::async_trait;
use ferry_protocol::{RenderMethod, Route};
use tracing::debug;

/// Hooks applied by an [`EntrypointProxy`].
#[async_trait]
pub trait ProxyHooks: Send + Sync {
    /// Return a different route to resolve instead of `route`.
    async fn redirect(&self, _route: &Route, _ctx: &Context) -> Result<Option<Route>, BoxError> {
        Ok(None)
    }

    /// Return an entrypoint that replaces the wrapped one for this request.
    async fn intercept(
        &self,
        _route: &Route,
        _ctx: &Context,
    ) -> Result<Option<Entrypoint>, BoxError> {
        Ok(None)
    }

    /// Return an entrypoint that replaces the resolved content.
    ///
    /// `route` is the route after any redirect.
    async fn transform(
        &self,
        _content: Option<&Content>,
        _render_method: RenderMethod,
        _route: &Route,
        _ctx: &Context,
    ) -> Result<Option<Entrypoint>, BoxError> {
        Ok(None)
    }
}

/// A [`RouteHandler`] that resolves a wrapped entrypoint through hooks.
pub struct EntrypointProxy<H> {
    entrypoint: Entrypoint,
    hooks: H,
    resolver: Resolver,
}

impl<H: ProxyHooks> EntrypointProxy<H> {
    /// Wrap `entrypoint`.
    pub fn new(entrypoint: impl Into<Entrypoint>, hooks: H) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            hooks,
            resolver: Resolver::default(),
        }
    }

    /// Use a custom resolver configuration for the wrapped entrypoint.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.resolver = Resolver::new(config);
        self
    }

    /// Get the hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

#[async_trait]
impl<H: ProxyHooks> RouteHandler for EntrypointProxy<H> {
    async fn get_route(&self, route: &Route, ctx: &Context) -> Result<Entrypoint, BoxError> {
        let route = match self.hooks.redirect(route, ctx).await? {
            Some(redirected) => {
                debug!(from = %route, to = %redirected, "Proxy redirected route");
                redirected
            }
            None => route.clone(),
        };

        let target = self
            .hooks
            .intercept(&route, ctx)
            .await?
            .unwrap_or_else(|| self.entrypoint.clone());

        let resolution = self.resolver.resolve(&target, &route, ctx, false).await?;

        if let Some(transformed) = self
            .hooks
            .transform(resolution.content.as_ref(), resolution.render_method, &route, ctx)
            .await?
        {
            return Ok(transformed);
        }

        Ok(RenderPreset::new(resolution.render_method, Entrypoint::from(resolution.content)).into())
    }
}
