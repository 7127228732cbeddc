//! Route model for Ferry.
//!
//! A route is an ordered list of percent-decoded path segments plus a set of
//! query parameters. Strings, URLs and segment lists all normalize to the same
//! [`Route`] before they are compared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors produced while parsing a route representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRouteError {
    /// A `%` was not followed by two hex digits.
    #[error("Malformed percent-encoding at byte {position} in {input:?}")]
    MalformedEncoding {
        /// The offending component.
        input: String,
        /// Byte offset of the `%`.
        position: usize,
    },

    /// Percent-decoded bytes are not valid UTF-8.
    #[error("Decoded route component is not valid UTF-8: {0:?}")]
    InvalidUtf8(String),

    /// The representation looked like an absolute URL but could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// A canonical route.
///
/// Routes are immutable value objects. Empty segments are dropped during
/// parsing, so `/a/`, `/a` and `//a` are the same route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Route {
    segments: Vec<String>,
    query: BTreeSet<(String, String)>,
}

impl Route {
    /// Create a route from already decoded segments and query pairs.
    #[must_use]
    pub fn new<S, I, Q>(segments: I, query: Q) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
        Q: IntoIterator<Item = (String, String)>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
            query: query.into_iter().collect(),
        }
    }

    /// The root route `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Decoded path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Query pairs, sorted.
    #[must_use]
    pub fn query(&self) -> &BTreeSet<(String, String)> {
        &self.query
    }

    /// Number of path segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the route has no path segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The route left after dropping the first `n` segments.
    ///
    /// The query is carried over unchanged.
    #[must_use]
    pub fn skip(&self, n: usize) -> Self {
        Self {
            segments: self.segments.iter().skip(n).cloned().collect(),
            query: self.query.clone(),
        }
    }

    /// The first `n` segments, without query.
    #[must_use]
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            segments: self.segments.iter().take(n).cloned().collect(),
            query: BTreeSet::new(),
        }
    }

    /// Append the segments of `other`, merging both query sets.
    #[must_use]
    pub fn join(&self, other: &Route) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        let mut query = self.query.clone();
        query.extend(other.query.iter().cloned());
        Self { segments, query }
    }

    /// Append a single decoded segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        let mut route = self.clone();
        if !segment.is_empty() {
            route.segments.push(segment);
        }
        route
    }

    /// Replace the query set.
    #[must_use]
    pub fn with_query(mut self, query: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query = query.into_iter().collect();
        self
    }

    /// Check if this route lies strictly below `parent`.
    ///
    /// Query parameters are ignored; a route is not a child of itself.
    #[must_use]
    pub fn is_child_of(&self, parent: &Route) -> bool {
        self.segments.len() > parent.segments.len()
            && self.segments.starts_with(&parent.segments)
    }

    /// Compare path segments only.
    #[must_use]
    pub fn segments_equal(&self, other: &Route) -> bool {
        self.segments == other.segments
    }

    /// Check if `prefix` matches the beginning of this route segment-wise.
    #[must_use]
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        self.segments.starts_with(prefix)
    }

    /// Canonical string form, e.g. `/users/42?tab=info`.
    #[must_use]
    pub fn routename(&self) -> String {
        let mut out = String::from("/");
        let path = self
            .segments
            .iter()
            .map(|s| encode_component(s, false))
            .collect::<Vec<_>>()
            .join("/");
        out.push_str(&path);
        if !self.query.is_empty() {
            out.push('?');
            let query = self
                .query
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        encode_component(k, true)
                    } else {
                        format!("{}={}", encode_component(k, true), encode_component(v, true))
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            out.push_str(&query);
        }
        out
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.routename())
    }
}

impl From<Route> for String {
    fn from(route: Route) -> String {
        route.routename()
    }
}

impl TryFrom<String> for Route {
    type Error = InvalidRouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_route(value.as_str())
    }
}

impl std::str::FromStr for Route {
    type Err = InvalidRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_route(s)
    }
}

/// Anything that can be normalized into a [`Route`].
pub trait IntoRoute {
    /// Normalize into a canonical route.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed percent-encoding.
    fn into_route(self) -> Result<Route, InvalidRouteError>;
}

impl IntoRoute for Route {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        Ok(self)
    }
}

impl IntoRoute for &Route {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        Ok(self.clone())
    }
}

impl IntoRoute for &str {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        if is_absolute_url(self) {
            let url = Url::parse(self).map_err(|e| InvalidRouteError::InvalidUrl(e.to_string()))?;
            return (&url).into_route();
        }
        let without_fragment = self.split('#').next().unwrap_or_default();
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (without_fragment, None),
        };
        from_parts(path, query)
    }
}

impl IntoRoute for String {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        self.as_str().into_route()
    }
}

impl IntoRoute for &String {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        self.as_str().into_route()
    }
}

impl IntoRoute for &Url {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        from_parts(self.path(), self.query())
    }
}

impl IntoRoute for Url {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        (&self).into_route()
    }
}

/// Segment lists are taken as already decoded.
impl IntoRoute for Vec<String> {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        Ok(Route::new(self, std::iter::empty()))
    }
}

impl IntoRoute for &[&str] {
    fn into_route(self) -> Result<Route, InvalidRouteError> {
        Ok(Route::new(self.iter().copied(), std::iter::empty()))
    }
}

/// Parse a route representation.
///
/// # Errors
///
/// Returns an error if the representation contains malformed percent-encoding
/// or is an unparsable absolute URL.
pub fn parse_route(repr: impl IntoRoute) -> Result<Route, InvalidRouteError> {
    repr.into_route()
}

/// Compare two route representations after normalization.
///
/// A representation that cannot be parsed is never equal to anything.
#[must_use]
pub fn routes_equal(a: impl IntoRoute, b: impl IntoRoute) -> bool {
    match (a.into_route(), b.into_route()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Check if route `a` lies strictly below route `b`.
#[must_use]
pub fn is_child_of(a: impl IntoRoute, b: impl IntoRoute) -> bool {
    match (a.into_route(), b.into_route()) {
        (Ok(a), Ok(b)) => a.is_child_of(&b),
        _ => false,
    }
}

/// An absolute URL carries its scheme before any path, query or fragment delimiter.
fn is_absolute_url(input: &str) -> bool {
    let Some(scheme_end) = input.find("://") else {
        return false;
    };
    let scheme = &input[..scheme_end];
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn from_parts(path: &str, query: Option<&str>) -> Result<Route, InvalidRouteError> {
    let segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| decode_component(s, false))
        .collect::<Result<Vec<_>, _>>()?;

    let mut pairs = BTreeSet::new();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        pairs.insert((decode_component(key, true)?, decode_component(value, true)?));
    }

    Ok(Route {
        segments,
        query: pairs,
    })
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

fn decode_component(input: &str, plus_as_space: bool) -> Result<String, InvalidRouteError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        return Err(InvalidRouteError::MalformedEncoding {
                            input: input.to_string(),
                            position: i,
                        })
                    }
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|_| InvalidRouteError::InvalidUtf8(input.to_string()))
}

fn encode_component(input: &str, query: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b',' | b';' | b':' | b'@')
            || (!query && matches!(byte, b'&' | b'=' | b'+'));
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_ignored() {
        assert!(routes_equal("/a/", "/a"));
        assert!(routes_equal("//a//b", "/a/b"));
        assert!(routes_equal("/", ""));
    }

    #[test]
    fn test_representations_normalize_to_same_route() {
        let url = Url::parse("https://example.org/docs/getting%20started?lang=en#intro").unwrap();
        let segments: &[&str] = &["docs", "getting started"];

        let from_url = parse_route(&url).unwrap();
        let from_str = parse_route("/docs/getting%20started?lang=en").unwrap();
        let from_segments = parse_route(segments).unwrap().with_query([("lang".to_string(), "en".to_string())]);

        assert_eq!(from_url, from_str);
        assert_eq!(from_str, from_segments);
        assert!(routes_equal("https://example.org/docs/getting%20started/?lang=en", &from_str));
    }

    #[test]
    fn test_query_is_a_set() {
        assert!(routes_equal("/a?x=1&y=2", "/a?y=2&x=1"));
        assert!(!routes_equal("/a?x=1", "/a?x=2"));
        assert!(!routes_equal("/a?x=1", "/a"));
        assert!(routes_equal("/search?q=hello+world", "/search?q=hello%20world"));
    }

    #[test]
    fn test_malformed_percent_encoding() {
        assert!(matches!(
            parse_route("/a/%zz"),
            Err(InvalidRouteError::MalformedEncoding { position: 0, .. })
        ));
        assert!(parse_route("/a/%4").is_err());
        assert!(parse_route("/a?k=%").is_err());
        assert!(matches!(parse_route("/%ff"), Err(InvalidRouteError::InvalidUtf8(_))));
        assert!(!routes_equal("/a/%zz", "/a/%zz"));
    }

    #[test]
    fn test_url_inside_query_is_not_a_scheme() {
        let route = parse_route("/login?next=https://example.org/home").unwrap();
        assert_eq!(route.segments(), ["login"]);
        assert_eq!(route.query_value("next"), Some("https://example.org/home"));

        let route = parse_route("/redirect/https://example.org").unwrap();
        assert_eq!(route.segments(), ["redirect", "https:", "example.org"]);

        let route = parse_route("docs#see=http://x").unwrap();
        assert_eq!(route.segments(), ["docs"]);

        assert!(routes_equal("git+ssh://host/repo?x=1", "/repo?x=1"));
        assert!(matches!(parse_route("https://[::1"), Err(InvalidRouteError::InvalidUrl(_))));
    }

    #[test]
    fn test_is_child_of() {
        let parent = parse_route("/users").unwrap();
        let child = parse_route("/users/42?tab=info").unwrap();

        assert!(child.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
        assert!(!parent.is_child_of(&parent));
        assert!(is_child_of("/a/b", "/"));
        assert!(!is_child_of("/ab", "/a"));
    }

    #[test]
    fn test_routename_roundtrip() {
        let route = parse_route("/files/a%2Fb/x y?q=a%26b").unwrap();
        assert_eq!(route.segments(), ["files", "a/b", "x y"]);
        assert_eq!(route.query_value("q"), Some("a&b"));
        assert_eq!(route.routename(), "/files/a%2Fb/x%20y?q=a%26b");
        assert_eq!(parse_route(route.routename()).unwrap(), route);
    }

    #[test]
    fn test_skip_and_join() {
        let route = parse_route("/a/b/c?x=1").unwrap();
        let rest = route.skip(1);
        assert_eq!(rest.routename(), "/b/c?x=1");
        assert_eq!(route.prefix(1).join(&rest), route);
        assert_eq!(Route::root().child("a").routename(), "/a");
    }

    #[test]
    fn test_serde_as_string() {
        let route = parse_route("/a/b?k=v").unwrap();
        let json = serde_json::to_string(&route).unwrap();
        assert_eq!(json, "\"/a/b?k=v\"");
        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back, route);
    }
}
