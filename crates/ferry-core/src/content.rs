//! Terminal content values.
//!
//! Whatever an entrypoint finally reduces to is a [`Content`]. Each kind of
//! content carries a default render method; raw responses and redirects force
//! [`RenderMethod::RawContent`] no matter what an outer preset asked for.

use crate::entrypoint::RouteManager;
use bytes::Bytes;
use ferry_protocol::RenderMethod;
use std::fmt;
use std::sync::Arc;

/// Options passed to the markup collaborator when serializing a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Serialize shadow roots as declarative templates.
    pub include_shadow_roots: bool,
    /// Inject scripts for standalone client behaviour.
    pub inject_standalone_js: bool,
    /// Allow functions the client runtime will take over to be skipped.
    pub allow_ignored_functions: bool,
    /// Document language.
    pub lang: String,
}

impl SerializeOptions {
    /// Options matching a render method.
    #[must_use]
    pub fn for_method(method: RenderMethod, lang: impl Into<String>) -> Self {
        Self {
            include_shadow_roots: true,
            inject_standalone_js: method != RenderMethod::Static,
            allow_ignored_functions: method == RenderMethod::Hybrid,
            lang: lang.into(),
        }
    }
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self::for_method(RenderMethod::default(), "en")
    }
}

/// A markup node produced by the DOM layer.
pub trait MarkupNode: Send + Sync + fmt::Debug {
    /// Serialize the node to an HTML string.
    fn serialize(&self, options: &SerializeOptions) -> String;

    /// Identifiers of live values rendered inside this node.
    ///
    /// Backend-rendered pages subscribe to these over the live channel.
    fn live_values(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Pre-serialized markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Html {
    markup: String,
    live_values: Vec<String>,
}

impl Html {
    /// Wrap a markup string.
    #[must_use]
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            live_values: Vec::new(),
        }
    }

    /// Declare a live value rendered inside this markup.
    #[must_use]
    pub fn with_live_value(mut self, id: impl Into<String>) -> Self {
        self.live_values.push(id.into());
        self
    }

    /// Get the markup.
    #[must_use]
    pub fn markup(&self) -> &str {
        &self.markup
    }
}

impl MarkupNode for Html {
    fn serialize(&self, _options: &SerializeOptions) -> String {
        self.markup.clone()
    }

    fn live_values(&self) -> Vec<String> {
        self.live_values.clone()
    }
}

/// An opaque response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Response body.
    pub body: Bytes,
    /// MIME type of the body.
    pub content_type: String,
    /// Status code override.
    pub status: Option<u16>,
    /// Additional response headers.
    pub headers: Vec<(String, String)>,
}

impl RawContent {
    /// Create raw content.
    #[must_use]
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
            status: None,
            headers: Vec::new(),
        }
    }

    /// Set the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Values that turn into a status, an error or a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialContent {
    /// A bare HTTP status with an optional message.
    Status {
        /// Status code.
        code: u16,
        /// Message shown on the status page.
        message: Option<String>,
    },
    /// An error value; defaults to status 500.
    Error {
        /// Error message.
        message: String,
        /// Status code, if not 500.
        code: Option<u16>,
    },
    /// A redirect to another location.
    Redirect {
        /// Target location.
        location: String,
        /// Use 301 instead of 302.
        permanent: bool,
    },
}

impl SpecialContent {
    /// Status code this value produces.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            SpecialContent::Status { code, .. } => *code,
            SpecialContent::Error { code, .. } => code.unwrap_or(500),
            SpecialContent::Redirect { permanent: true, .. } => 301,
            SpecialContent::Redirect { .. } => 302,
        }
    }
}

/// A plain scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Classification of terminal content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Markup or structured node.
    Markup,
    /// Plain text.
    Text,
    /// Markdown source.
    Markdown,
    /// Raw byte stream or response.
    Raw,
    /// Status, error or redirect value.
    Special,
    /// Boolean or number.
    Scalar,
    /// A route manager that routed itself.
    Managed,
}

/// Terminal content produced by resolving an entrypoint.
#[derive(Clone)]
pub enum Content {
    /// A markup node.
    Markup(Arc<dyn MarkupNode>),
    /// Plain text.
    Text(String),
    /// Markdown source.
    Markdown(String),
    /// An opaque response.
    Raw(RawContent),
    /// Status, error or redirect.
    Special(SpecialContent),
    /// A scalar value.
    Scalar(Scalar),
    /// A route manager rendered as content.
    Managed(Arc<dyn RouteManager>),
}

impl Content {
    /// Wrap a markup node.
    #[must_use]
    pub fn markup(node: impl MarkupNode + 'static) -> Self {
        Content::Markup(Arc::new(node))
    }

    /// Build an error value with status 500.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Content::Special(SpecialContent::Error {
            message: message.into(),
            code: None,
        })
    }

    /// Build a bare status value.
    #[must_use]
    pub fn status(code: u16) -> Self {
        Content::Special(SpecialContent::Status { code, message: None })
    }

    /// Build a temporary redirect.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Content::Special(SpecialContent::Redirect {
            location: location.into(),
            permanent: false,
        })
    }

    /// Classify this content.
    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Markup(_) => ContentKind::Markup,
            Content::Text(_) => ContentKind::Text,
            Content::Markdown(_) => ContentKind::Markdown,
            Content::Raw(_) => ContentKind::Raw,
            Content::Special(_) => ContentKind::Special,
            Content::Scalar(_) => ContentKind::Scalar,
            Content::Managed(_) => ContentKind::Managed,
        }
    }

    /// Render method this content forces regardless of presets.
    #[must_use]
    pub fn forced_render_method(&self) -> Option<RenderMethod> {
        match self {
            Content::Raw(_) | Content::Special(SpecialContent::Redirect { .. }) => {
                Some(RenderMethod::RawContent)
            }
            _ => None,
        }
    }

    /// Render method used when no preset fixed one.
    #[must_use]
    pub fn default_render_method(&self) -> RenderMethod {
        self.forced_render_method().unwrap_or(RenderMethod::Backend)
    }

    /// Status code implied by the content.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Content::Special(special) => Some(special.status_code()),
            Content::Raw(raw) => raw.status,
            _ => None,
        }
    }

    /// Response headers implied by the content.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            Content::Raw(raw) => raw.headers.clone(),
            Content::Special(SpecialContent::Redirect { location, .. }) => {
                vec![("location".to_string(), location.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Live values referenced by markup content.
    #[must_use]
    pub fn live_values(&self) -> Vec<String> {
        match self {
            Content::Markup(node) => node.live_values(),
            Content::Managed(manager) => manager.live_values(),
            _ => Vec::new(),
        }
    }

    /// Text form of textual and scalar content.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Content::Text(text) | Content::Markdown(text) => Some(text.clone()),
            Content::Scalar(scalar) => Some(scalar.to_string()),
            Content::Special(SpecialContent::Status { message, .. }) => message.clone(),
            Content::Special(SpecialContent::Error { message, .. }) => Some(message.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Markup(node) => f.debug_tuple("Markup").field(node).finish(),
            Content::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Content::Markdown(text) => f.debug_tuple("Markdown").field(text).finish(),
            Content::Raw(raw) => f.debug_tuple("Raw").field(raw).finish(),
            Content::Special(special) => f.debug_tuple("Special").field(special).finish(),
            Content::Scalar(scalar) => f.debug_tuple("Scalar").field(scalar).finish(),
            Content::Managed(manager) => f.debug_tuple("Managed").field(manager).finish(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<bool> for Content {
    fn from(value: bool) -> Self {
        Content::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Content::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        Content::Scalar(Scalar::Float(value))
    }
}

impl From<RawContent> for Content {
    fn from(raw: RawContent) -> Self {
        Content::Raw(raw)
    }
}

impl From<Html> for Content {
    fn from(html: Html) -> Self {
        Content::markup(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_methods() {
        assert_eq!(Content::from("hi").default_render_method(), RenderMethod::Backend);
        assert_eq!(Content::from(7i64).default_render_method(), RenderMethod::Backend);
        assert_eq!(
            Content::from(Html::new("<p>x</p>")).default_render_method(),
            RenderMethod::Backend
        );
        assert_eq!(
            Content::from(RawContent::new("x", "text/plain")).default_render_method(),
            RenderMethod::RawContent
        );
        assert_eq!(
            Content::redirect("/login").forced_render_method(),
            Some(RenderMethod::RawContent)
        );
    }

    #[test]
    fn test_status_and_headers() {
        assert_eq!(Content::error("boom").status_code(), Some(500));
        assert_eq!(Content::status(404).status_code(), Some(404));
        assert_eq!(Content::redirect("/login").status_code(), Some(302));
        assert_eq!(
            Content::redirect("/login").headers(),
            vec![("location".to_string(), "/login".to_string())]
        );
        assert_eq!(Content::from("x").status_code(), None);
    }

    #[test]
    fn test_serialize_options_follow_method() {
        let options = SerializeOptions::for_method(RenderMethod::Static, "de");
        assert!(!options.inject_standalone_js);
        assert!(!options.allow_ignored_functions);
        assert!(SerializeOptions::for_method(RenderMethod::Hybrid, "en").allow_ignored_functions);
    }

    #[test]
    fn test_live_values() {
        let content = Content::from(Html::new("<b>0</b>").with_live_value("counter"));
        assert_eq!(content.live_values(), vec!["counter".to_string()]);
        assert_eq!(content.kind(), ContentKind::Markup);
    }
}
