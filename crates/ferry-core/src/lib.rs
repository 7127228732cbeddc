//! # ferry-core
//!
//! Entrypoint model and route resolution for Ferry.
//!
//! This crate turns a route into renderable content:
//!
//! - **Entrypoint** - content, generators, maps, handlers, managers, presets
//! - **Resolver** - recursive async resolution with render method negotiation
//! - **EntrypointProxy** - redirect, intercept and transform hooks
//! - **Navigator** - client-side navigation fallback chain
//!
//! ## Example
//!
//! ```rust
//! use ferry_core::{resolve_entrypoint_route, Context, Entrypoint, RouteMap};
//! use ferry_protocol::{RenderMethod, Route};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let site: Entrypoint = RouteMap::new()
//!     .route("/", "home")
//!     .route("/about", Entrypoint::preset(RenderMethod::Static, "about"))
//!     .into();
//!
//! let ctx = Context::new(Route::root());
//! let resolution = resolve_entrypoint_route(&site, "/about", &ctx, false).await.unwrap();
//! assert_eq!(resolution.render_method, RenderMethod::Static);
//! # }
//! ```

pub mod content;
pub mod context;
pub mod entrypoint;
pub mod navigation;
pub mod proxy;
pub mod resolver;

pub use content::{
    Content, ContentKind, Html, MarkupNode, RawContent, Scalar, SerializeOptions, SpecialContent,
};
pub use context::{Context, ContextBuilder, Params};
pub use entrypoint::{
    BoxError, ContentGenerator, Entrypoint, EntrypointKind, FnGenerator, RenderPreset, RouteFilter,
    RouteHandler, RouteKey, RouteManager, RouteMap, RoutePattern,
};
pub use navigation::{should_intercept, NavigationOutcome, Navigator, Reconciliation};
pub use proxy::{EntrypointProxy, ProxyHooks};
pub use resolver::{
    refetch_route, resolve_entrypoint_route, Resolution, ResolveError, Resolver, ResolverConfig,
};
