//! Render methods.
//!
//! A render method decides where content is produced and who owns it once it
//! reaches the client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A render method name that matches none of the known methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown render method: {0}")]
pub struct UnknownRenderMethod(pub String);

/// Strategy used to produce and deliver content for a resolved route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderMethod {
    /// Fixed, cacheable markup without client-side reactivity.
    Static,
    /// Markup computed per request on the server, no client takeover.
    Backend,
    /// Server-rendered markup that the client runtime hydrates.
    #[default]
    Hybrid,
    /// Content assembled entirely on the client.
    Dynamic,
    /// An opaque response body that bypasses rendering.
    RawContent,
}

impl RenderMethod {
    /// All render methods.
    pub const ALL: [RenderMethod; 5] = [
        RenderMethod::Static,
        RenderMethod::Backend,
        RenderMethod::Hybrid,
        RenderMethod::Dynamic,
        RenderMethod::RawContent,
    ];

    /// Pick the effective method.
    ///
    /// A method fixed by an outer preset always wins over the inner default.
    #[must_use]
    pub fn choose(outer: Option<RenderMethod>, inner: RenderMethod) -> RenderMethod {
        outer.unwrap_or(inner)
    }

    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RenderMethod::Static => "STATIC",
            RenderMethod::Backend => "BACKEND",
            RenderMethod::Hybrid => "HYBRID",
            RenderMethod::Dynamic => "DYNAMIC",
            RenderMethod::RawContent => "RAW_CONTENT",
        }
    }

    /// Check if the page must load the client runtime.
    #[must_use]
    pub const fn injects_client_runtime(&self) -> bool {
        !matches!(self, RenderMethod::Static | RenderMethod::RawContent)
    }

    /// Check if the client runtime takes ownership of the content.
    #[must_use]
    pub const fn client_takes_over(&self) -> bool {
        matches!(self, RenderMethod::Hybrid | RenderMethod::Dynamic)
    }

    /// Check if the markup is produced on the server.
    #[must_use]
    pub const fn is_server_rendered(&self) -> bool {
        matches!(
            self,
            RenderMethod::Static | RenderMethod::Backend | RenderMethod::Hybrid
        )
    }

    /// Check if the frontend needs the backend's web entrypoint module.
    ///
    /// Content pinned to the server never runs its entrypoint on the client.
    #[must_use]
    pub const fn requires_frontend_entrypoint(&self) -> bool {
        !matches!(self, RenderMethod::Static | RenderMethod::Backend)
    }
}

impl fmt::Display for RenderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMethod {
    type Err = UnknownRenderMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RenderMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRenderMethod(s.to_string()))
    }
}
