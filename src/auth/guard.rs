//! Method/route guard.
//!
//! One declarative table of allowed methods per route, checked before any flow
//! runs. The guard only looks at the method and the path.

use anyhow::{anyhow, Result};
use axum::http::Method;
use std::collections::{HashMap, HashSet};

use super::error::AuthError;

#[derive(Debug, Clone)]
struct Route {
    pattern: &'static str,
    segments: Vec<Segment>,
    methods: Vec<Method>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Param(&'static str),
}

/// A route that passed the guard, with its captured path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub pattern: &'static str,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Routes served by the gateway.
    ///
    /// # Errors
    /// Never fails for the built-in table; kept fallible for symmetry with [`RouteTable::new`].
    pub fn standard() -> Result<Self> {
        Self::new(&[
            ("/auth", &[Method::GET, Method::POST, Method::PUT]),
            ("/user", &[Method::PUT, Method::DELETE]),
            ("/user/:username", &[Method::GET]),
            ("/github", &[Method::POST]),
        ])
    }

    /// # Errors
    /// Returns an error for duplicate patterns, empty method lists, or patterns
    /// not starting with `/`.
    pub fn new(routes: &[(&'static str, &[Method])]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut table = Vec::with_capacity(routes.len());

        for (pattern, methods) in routes {
            if !pattern.starts_with('/') {
                return Err(anyhow!("route `{pattern}` must start with `/`"));
            }
            if methods.is_empty() {
                return Err(anyhow!("route `{pattern}` allows no methods"));
            }
            let segments = parse(pattern);
            if !seen.insert(shape(&segments)) {
                return Err(anyhow!("route `{pattern}` is declared twice"));
            }
            table.push(Route {
                pattern,
                segments,
                methods: methods.to_vec(),
            });
        }

        Ok(Self { routes: table })
    }

    /// Allowed methods of a declared pattern.
    #[must_use]
    pub fn methods(&self, pattern: &str) -> Option<&[Method]> {
        self.routes
            .iter()
            .find(|route| route.pattern == pattern)
            .map(|route| route.methods.as_slice())
    }

    /// Match `path` (query string ignored) and check `method` against the allow-list.
    ///
    /// # Errors
    /// `RouteNotFound` if no route matches, `MethodNotAllowed` with the allow-list otherwise.
    pub fn check(&self, method: &Method, path: &str) -> Result<ResolvedRoute, AuthError> {
        let path = path.split('?').next().unwrap_or_default();
        let parts: Vec<&str> = path.trim_end_matches('/').split('/').skip(1).collect();

        // Literal routes win over parameterized ones.
        let mut candidates: Vec<(&Route, HashMap<String, String>)> = self
            .routes
            .iter()
            .filter_map(|route| route.capture(&parts).map(|params| (route, params)))
            .collect();
        candidates.sort_by_key(|(route, _)| route.param_count());

        let Some((route, params)) = candidates.into_iter().next() else {
            return Err(AuthError::RouteNotFound);
        };

        if route.methods.contains(method) {
            Ok(ResolvedRoute {
                pattern: route.pattern,
                params,
            })
        } else {
            Err(AuthError::MethodNotAllowed {
                allow: route.methods.clone(),
            })
        }
    }
}

impl Route {
    fn capture(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Param(name) if !part.is_empty() => {
                    params.insert((*name).to_string(), (*part).to_string());
                }
                _ => return None,
            }
        }
        Some(params)
    }

    fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Param(_)))
            .count()
    }
}

fn parse(pattern: &'static str) -> Vec<Segment> {
    pattern
        .trim_end_matches('/')
        .split('/')
        .skip(1)
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => Segment::Param(name),
            None => Segment::Literal(segment),
        })
        .collect()
}

// Two patterns that differ only in parameter names match the same paths.
fn shape(segments: &[Segment]) -> Vec<Option<&'static str>> {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(literal) => Some(*literal),
            Segment::Param(_) => None,
        })
        .collect()
}
