//! Per-request context handed to generators, handlers and managers.

use ferry_protocol::Route;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Parameters bound by route patterns (`:name` segments and `*` rests).
pub type Params = BTreeMap<String, String>;

/// Language used when a request does not name one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Information about the request being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    route: Route,
    language: String,
    headers: Vec<(String, String)>,
    endpoint: Option<String>,
    remote_addr: Option<SocketAddr>,
}

impl Context {
    /// Create a context for a route with default values.
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            language: DEFAULT_LANGUAGE.to_string(),
            headers: Vec::new(),
            endpoint: None,
            remote_addr: None,
        }
    }

    /// Start building a context.
    #[must_use]
    pub fn builder(route: Route) -> ContextBuilder {
        ContextBuilder {
            context: Self::new(route),
        }
    }

    /// The full requested route.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Preferred language of the client.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All request headers.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Identity of the requesting endpoint, if authenticated.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Remote socket address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Builder for [`Context`].
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    context: Context,
}

impl ContextBuilder {
    /// Set the language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.context.language = language.into();
        self
    }

    /// Add a header. `accept-language` also sets the language.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("accept-language") {
            if let Some(language) = request_language(&value) {
                self.context.language = language;
            }
        }
        self.context.headers.push((name, value));
        self
    }

    /// Set the endpoint identity.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.context.endpoint = Some(endpoint.into());
        self
    }

    /// Set the remote address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.context.remote_addr = Some(addr);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Context {
        self.context
    }
}

/// Pick the primary language of an `Accept-Language` header.
///
/// Only the first listed language is considered, quality values are ignored.
#[must_use]
pub fn request_language(accept_language: &str) -> Option<String> {
    let first = accept_language.split(',').next()?;
    let tag = first.split(';').next()?.trim();
    let primary = tag.split('-').next()?.trim();
    if primary.is_empty() || primary == "*" {
        return None;
    }
    Some(primary.to_ascii_lowercase())
}
