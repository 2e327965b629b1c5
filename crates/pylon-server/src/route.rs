//! Route registration and matching.
//!
//! Routes are matched in registration order and the first match wins.
//! Registering the same pattern twice is allowed; the earlier entry shadows
//! the later one.
//!
//! Patterns are `/`-separated. A segment may be:
//!
//! - static text (`users`)
//! - a parameter (`:id` or `{id}`) matching any one segment
//! - a trailing `*` matching the rest of the path, including nothing

use std::fmt;
use std::str::FromStr;

use http::Method;
use serde::{Deserialize, Serialize};

/// What a route answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i32)]
pub enum Verb {
    /// GET requests.
    Get = 0,
    /// POST requests.
    Post = 1,
    /// PUT requests.
    Put = 2,
    /// PATCH requests.
    Patch = 3,
    /// DELETE requests.
    Delete = 4,
    /// OPTIONS requests.
    Options = 5,
    /// HEAD requests.
    Head = 6,
    /// Any HTTP method.
    Any = 7,
    /// WebSocket upgrade requests.
    Ws = 8,
}

impl Verb {
    /// All verbs in discriminant order.
    pub const ALL: [Self; 9] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Any,
        Self::Ws,
    ];

    /// Returns the upper-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Any => "ANY",
            Self::Ws => "WS",
        }
    }

    /// Maps an HTTP method onto its specific verb, if there is one.
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::PATCH => Some(Self::Patch),
            Method::DELETE => Some(Self::Delete),
            Method::OPTIONS => Some(Self::Options),
            Method::HEAD => Some(Self::Head),
            _ => None,
        }
    }

    /// Returns `true` if a route registered for `self` accepts this request.
    pub fn accepts(self, method: &Method, websocket: bool) -> bool {
        match self {
            Self::Ws => websocket,
            Self::Any => !websocket,
            verb => !websocket && Self::from_method(method) == Some(verb),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown verb '{s}'"))
    }
}

impl TryFrom<i32> for Verb {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|verb| *verb as i32 == value)
            .ok_or_else(|| format!("unknown verb discriminant {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parses a pattern. Parsing never fails; a `*` that is not the last
    /// segment is treated as static text.
    pub fn parse(pattern: &str) -> Self {
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let last = parts.len().saturating_sub(1);
        let segments = parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                if let Some(name) = part.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = part.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else if *part == "*" && index == last {
                    Segment::Wildcard
                } else {
                    Segment::Static((*part).to_string())
                }
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// Returns the pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a request path, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return Some(params),
                Segment::Static(expected) => {
                    if parts.next()? != expected {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.push((name.clone(), parts.next()?.to_string()));
                }
            }
        }

        parts.next().is_none().then_some(params)
    }
}

/// A successful route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The verb of the matching registration.
    pub verb: Verb,
    /// The pattern that matched, as registered.
    pub pattern: String,
    /// Captured parameters in pattern order.
    pub params: Vec<(String, String)>,
}

/// Ordered list of route registrations.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(Verb, RoutePattern)>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration. Duplicates are kept.
    pub fn add(&mut self, verb: Verb, pattern: &str) {
        self.routes.push((verb, RoutePattern::parse(pattern)));
    }

    /// Finds the first registration accepting this request.
    pub fn find(&self, method: &Method, path: &str, websocket: bool) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|(verb, _)| verb.accepts(method, websocket))
            .find_map(|(verb, pattern)| {
                pattern.matches(path).map(|params| RouteMatch {
                    verb: *verb,
                    pattern: pattern.as_str().to_string(),
                    params,
                })
            })
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
