//! Request routing and path matching.
//!
//! Maps method + path to an operation ID. Templates use `:name` or `{name}`
//! parameter segments; both are reported in `:name` form so route labels
//! stay uniform. Routers can be nested under a mount path, which is kept
//! apart from the template so the metrics stage can join the two.
//!
//! # Example
//!
//! ```rust
//! use storefront_server::{RouteLookup, Router};
//! use http::Method;
//!
//! let mut orders = Router::new();
//! orders.add_route(Method::GET, "/orders/:id", "getOrder");
//!
//! let mut router = Router::new();
//! router.nest("/api", orders);
//!
//! let RouteLookup::Matched(m) = router.lookup(&Method::GET, "/api/orders/42") else {
//!     panic!("expected a match");
//! };
//! assert_eq!(m.operation_id(), "getOrder");
//! assert_eq!(m.template(), "/orders/:id");
//! assert_eq!(m.mount_path(), Some("/api"));
//! assert_eq!(m.param("id"), Some("42"));
//! ```

use std::collections::HashMap;

use http::Method;
use storefront_middleware::route::join_paths;

/// A matched route with extracted path parameters.
///
/// Also inserted into the request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation_id: String,
    template: String,
    mount_path: Option<String>,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the operation ID for this route.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Returns the template relative to the mount path, in `:name` form.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the mount path the route was nested under.
    #[must_use]
    pub fn mount_path(&self) -> Option<&str> {
        self.mount_path.as_deref()
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Result of looking up a request in the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    /// A route matched method and path.
    Matched(RouteMatch),
    /// The path matched, but only for other methods.
    MethodNotAllowed(Vec<Method>),
    /// Nothing matched the path.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    mount_path: Option<String>,
    mount_segments: Vec<String>,
    segments: Vec<PathSegment>,
    template: String,
    operation_id: String,
}

impl Route {
    fn new(method: Method, pattern: &str, operation_id: impl Into<String>) -> Self {
        let segments = parse_segments(pattern);
        let template = render_template(&segments);
        Self {
            method,
            mount_path: None,
            mount_segments: Vec::new(),
            segments,
            template,
            operation_id: operation_id.into(),
        }
    }

    fn mount_under(&mut self, mount_path: &str) {
        let joined = match self.mount_path.take() {
            Some(inner) => join_paths(mount_path, &inner),
            None => join_paths(mount_path, "/"),
        };
        self.mount_segments = split(&joined).map(ToString::to_string).collect();
        self.mount_path = if self.mount_segments.is_empty() {
            None
        } else {
            Some(joined)
        };
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = split(path).collect();

        if path_segments.len() != self.mount_segments.len() + self.segments.len() {
            return None;
        }

        let (mount, rest) = path_segments.split_at(self.mount_segments.len());
        if mount.iter().zip(&self.mount_segments).any(|(a, b)| a != b) {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(rest) {
            match pattern {
                PathSegment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }

        Some(params)
    }

    fn to_match(&self, params: HashMap<String, String>) -> RouteMatch {
        RouteMatch {
            operation_id: self.operation_id.clone(),
            template: self.template.clone(),
            mount_path: self.mount_path.clone(),
            params,
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_segments(pattern: &str) -> Vec<PathSegment> {
    split(pattern)
        .map(|s| {
            if let Some(name) = s.strip_prefix(':') {
                PathSegment::Param(name.to_string())
            } else if let Some(name) = s.strip_prefix('{').and_then(|n| n.strip_suffix('}')) {
                PathSegment::Param(name.to_string())
            } else {
                PathSegment::Literal(s.to_string())
            }
        })
        .collect()
}

fn render_template(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Literal(s) => format!("/{s}"),
            PathSegment::Param(name) => format!("/:{name}"),
        })
        .collect()
}

/// HTTP request router.
///
/// Routes are checked in registration order; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: impl AsRef<str>,
        operation_id: impl Into<String>,
    ) {
        self.routes
            .push(Route::new(method, pattern.as_ref(), operation_id));
    }

    /// Adds a route, builder style.
    #[must_use]
    pub fn route(
        mut self,
        method: Method,
        pattern: impl AsRef<str>,
        operation_id: impl Into<String>,
    ) -> Self {
        self.add_route(method, pattern, operation_id);
        self
    }

    /// Moves every route of `router` under `mount_path`.
    pub fn nest(&mut self, mount_path: &str, router: Self) {
        for mut route in router.routes {
            route.mount_under(mount_path);
            self.routes.push(route);
        }
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Looks up a request. HEAD falls back to the GET route for the path
    /// when no HEAD route is registered.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        let mut allowed = Vec::new();
        let mut head_fallback = None;

        for route in &self.routes {
            let Some(params) = route.match_path(path) else {
                continue;
            };
            if route.method == *method {
                return RouteLookup::Matched(route.to_match(params));
            }
            if *method == Method::HEAD && route.method == Method::GET && head_fallback.is_none() {
                head_fallback = Some(route.to_match(params));
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if let Some(matched) = head_fallback {
            RouteLookup::Matched(matched)
        } else if allowed.is_empty() {
            RouteLookup::NotFound
        } else {
            RouteLookup::MethodNotAllowed(allowed)
        }
    }

    /// Matches a request, ignoring why a miss happened.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        match self.lookup(method, path) {
            RouteLookup::Matched(m) => Some(m),
            _ => None,
        }
    }

    /// Checks if a specific operation ID is registered.
    #[must_use]
    pub fn has_operation(&self, operation_id: &str) -> bool {
        self.routes.iter().any(|r| r.operation_id == operation_id)
    }

    /// Returns all registered operation IDs.
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.operation_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(router: &Router, method: &Method, path: &str) -> RouteMatch {
        router.match_route(method, path).unwrap()
    }

    #[test]
    fn test_router_match_simple_path() {
        let router = Router::new().route(Method::GET, "/products", "listProducts");

        let m = matched(&router, &Method::GET, "/products");
        assert_eq!(m.operation_id(), "listProducts");
        assert_eq!(m.template(), "/products");
        assert!(m.mount_path().is_none());
        assert!(m.params().is_empty());
    }

    #[test]
    fn test_colon_and_brace_params() {
        let router = Router::new()
            .route(Method::GET, "/users/{userId}/orders/:orderId", "getUserOrder");

        let m = matched(&router, &Method::GET, "/users/7/orders/99");
        assert_eq!(m.param("userId"), Some("7"));
        assert_eq!(m.param("orderId"), Some("99"));
        assert_eq!(m.template(), "/users/:userId/orders/:orderId");
    }

    #[test]
    fn test_trailing_slash_matches() {
        let router = Router::new().route(Method::GET, "/cart", "getCart");
        assert!(router.match_route(&Method::GET, "/cart/").is_some());
    }

    #[test]
    fn test_root_template() {
        let router = Router::new().route(Method::GET, "/", "index");
        assert_eq!(matched(&router, &Method::GET, "/").template(), "/");
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let router = Router::new()
            .route(Method::GET, "/orders", "listOrders")
            .route(Method::POST, "/orders", "createOrder");

        assert_eq!(
            router.lookup(&Method::DELETE, "/orders"),
            RouteLookup::MethodNotAllowed(vec![Method::GET, Method::POST])
        );
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let router = Router::new()
            .route(Method::GET, "/orders/:id", "getOrder")
            .route(Method::POST, "/orders", "createOrder");

        let m = matched(&router, &Method::HEAD, "/orders/7");
        assert_eq!(m.operation_id(), "getOrder");
        assert_eq!(m.param("id"), Some("7"));
        assert_eq!(
            router.lookup(&Method::HEAD, "/orders"),
            RouteLookup::MethodNotAllowed(vec![Method::POST])
        );

        let explicit = router.route(Method::HEAD, "/orders/:id", "headOrder");
        assert_eq!(matched(&explicit, &Method::HEAD, "/orders/7").operation_id(), "headOrder");
    }

    #[test]
    fn test_not_found() {
        let router = Router::new().route(Method::GET, "/orders/:id", "getOrder");
        assert_eq!(router.lookup(&Method::GET, "/orders"), RouteLookup::NotFound);
        assert_eq!(router.lookup(&Method::GET, "/orders/1/items"), RouteLookup::NotFound);
    }

    #[test]
    fn test_nested_router_keeps_mount_apart() {
        let games = Router::new().route(Method::GET, "/games/{slug}", "getGame");
        let mut router = Router::new();
        router.nest("/api/", games);

        let m = matched(&router, &Method::GET, "/api/games/zelda");
        assert_eq!(m.mount_path(), Some("/api"));
        assert_eq!(m.template(), "/games/:slug");
        assert!(router.match_route(&Method::GET, "/games/zelda").is_none());
    }

    #[test]
    fn test_double_nesting_joins_mounts() {
        let inner = Router::new().route(Method::GET, "/items", "listItems");
        let mut v1 = Router::new();
        v1.nest("/v1", inner);
        let mut router = Router::new();
        router.nest("/api", v1);

        let m = matched(&router, &Method::GET, "/api/v1/items");
        assert_eq!(m.mount_path(), Some("/api/v1"));
    }

    #[test]
    fn test_first_registered_route_wins() {
        let router = Router::new()
            .route(Method::GET, "/orders/recent", "recentOrders")
            .route(Method::GET, "/orders/:id", "getOrder");

        assert_eq!(
            matched(&router, &Method::GET, "/orders/recent").operation_id(),
            "recentOrders"
        );
        assert_eq!(
            matched(&router, &Method::GET, "/orders/12").operation_id(),
            "getOrder"
        );
    }

    #[test]
    fn test_operation_ids() {
        let router = Router::new()
            .route(Method::GET, "/users", "listUsers")
            .route(Method::POST, "/users", "createUser");

        assert!(router.has_operation("createUser"));
        assert!(!router.has_operation("deleteUser"));
        assert_eq!(router.operation_ids().count(), 2);
        assert_eq!(router.route_count(), 2);
    }
}
