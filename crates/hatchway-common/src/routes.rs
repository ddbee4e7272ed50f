//! Route Table
//!
//! This module provides the static route table that maps request paths to
//! page identifiers. Routes are declared once at process startup and never
//! change afterwards.
//!
//! # Matching Policy
//!
//! Patterns are tested in declaration order and the **first** match wins.
//! A pattern segment starting with `:` captures the corresponding path
//! segment as a named parameter, so `/user/:userId` matches `/user/123`
//! and produces `params.userId = "123"`. Routes marked `exact` must match
//! the full path; non-exact routes match any path they are a prefix of.
//!
//! There is no generic 404 page in the routing layer: a path with no
//! matching route resolves to [`HatchwayError::RouteNotFound`], which the
//! pipeline logs as an operational fault before rendering an empty match.

use std::collections::HashMap;

use crate::error::{HatchwayError, Result};

/// Identifier of a registered page, shared between the route table and the
/// hatch registry.
pub type PageId = String;

/// A single route declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path pattern, e.g. `/user/:userId`
    pub pattern: String,
    /// Page identifier bound to this route, if any
    pub page_id: Option<PageId>,
    /// Whether the pattern must match the full path
    pub exact: bool,
}

/// A route resolved against a concrete request path.
///
/// Created per request and discarded when the request ends.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub route: Route,
    /// Captured `:param` values from the path
    pub params: HashMap<String, String>,
    /// Parsed query string values
    pub query: HashMap<String, String>,
}

/// Static ordered list of routes.
///
/// Built once at startup with the [`RouteTable::route`] builder and shared
/// read-only across all requests.
///
/// # Example
///
/// ```
/// use hatchway_common::routes::RouteTable;
///
/// let table = RouteTable::new()
///     .route("/", Some("home"), true)
///     .route("/user/:userId", Some("user-view"), true);
///
/// let matched = table.resolve("/user/123?tab=cards").unwrap();
/// assert_eq!(matched.params["userId"], "123");
/// assert_eq!(matched.query["tab"], "cards");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Appends a route. Declaration order is matching order.
    pub fn route(mut self, pattern: impl Into<String>, page_id: Option<&str>, exact: bool) -> Self {
        self.routes.push(Route {
            pattern: pattern.into(),
            page_id: page_id.map(str::to_string),
            exact,
        });
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolves a request path (with optional query string) against the
    /// table.
    ///
    /// # Errors
    ///
    /// Returns [`HatchwayError::RouteNotFound`] if no pattern matches the
    /// path portion of `path`.
    pub fn resolve(&self, path: &str) -> Result<MatchedRoute> {
        let (path_part, query_part) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let query = parse_query(query_part);

        for route in &self.routes {
            if let Some(params) = match_pattern(&route.pattern, path_part, route.exact) {
                return Ok(MatchedRoute {
                    route: route.clone(),
                    params,
                    query,
                });
            }
        }

        Err(HatchwayError::RouteNotFound(path_part.to_string()))
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_pattern(pattern: &str, path: &str, exact: bool) -> Option<HashMap<String, String>> {
    let pattern_segments = segments(pattern);
    let path_segments = segments(path);

    if exact {
        if path_segments.len() != pattern_segments.len() {
            return None;
        }
    } else if path_segments.len() < pattern_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pat, got) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = pat.strip_prefix(':') {
            params.insert(name.to_string(), (*got).to_string());
        } else if pat != got {
            return None;
        }
    }

    Some(params)
}

fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(query) = raw else {
        return out;
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(key.to_string(), value.to_string());
    }
    out
}
