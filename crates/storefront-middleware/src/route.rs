//! Low-cardinality route labels.
//!
//! Metrics are tagged with a route *template* (`/orders/:id`), never the raw
//! path, so the number of distinct tag values stays bounded. When the router
//! matched a template it is used as is; otherwise identifier-looking path
//! segments are collapsed by [`normalize_route`].

use regex::Regex;
use std::sync::OnceLock;

/// Placeholder substituted for identifier segments.
pub const ID_PLACEHOLDER: &str = ":id";

/// Minimum length of an opaque (non-numeric) identifier segment.
pub const MIN_OPAQUE_ID_LEN: usize = 10;

fn hex_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Fa-f-]{10,}$").expect("valid regex"))
}

fn alnum_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z-]{10,}$").expect("valid regex"))
}

/// Returns true if a path segment looks like an identifier.
///
/// A segment is an identifier when it is all ASCII digits, or when it is at
/// least [`MIN_OPAQUE_ID_LEN`] characters long and is either made of hex
/// digits and `-` (UUIDs, hashes) or made of ASCII alphanumerics and `-`
/// with at least one digit for every two letters (`a1b2c3d4e5f6g7h8`, but
/// not `playstation5`).
pub fn is_identifier(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    if segment.len() < MIN_OPAQUE_ID_LEN {
        return false;
    }

    let digits = segment.bytes().filter(u8::is_ascii_digit).count();
    let letters = segment.bytes().filter(u8::is_ascii_alphabetic).count();

    (hex_id().is_match(segment) && digits + letters > 0)
        || (alnum_id().is_match(segment) && digits > 0 && letters > 0 && digits * 2 >= letters)
}

/// Normalizes a raw request path into a route label.
///
/// Strips the query string, drops empty segments, replaces identifier
/// segments with `:id` and rejoins with `/`. The empty path becomes `/`.
///
/// ```
/// use storefront_middleware::route::normalize_route;
///
/// assert_eq!(normalize_route("/orders/123/items/456"), "/orders/:id/items/:id");
/// assert_eq!(normalize_route("/orders/user"), "/orders/user");
/// assert_eq!(normalize_route("/a1b2c3d4e5f6g7h8"), "/:id");
/// assert_eq!(normalize_route("/search?q=42"), "/search");
/// ```
pub fn normalize_route(path: &str) -> String {
    let path = path.split_once('?').map_or(path, |(p, _)| p);

    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| if is_identifier(s) { ID_PLACEHOLDER } else { s })
        .collect();

    format!("/{}", segments.join("/"))
}

/// Joins a mount path and a route relative to it.
pub fn join_paths(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    match (base.is_empty(), rest.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{rest}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rest}"),
    }
}

/// Resolves the route label for a request.
///
/// 1. A matched template wins, prefixed with the mount path if any.
/// 2. Otherwise, if the path lies under the mount path, the mount path is
///    kept literally and only the remainder is normalized.
/// 3. Otherwise the whole path is normalized.
pub fn resolve_route(path: &str, matched: Option<&str>, mount_path: Option<&str>) -> String {
    if let Some(template) = matched {
        return join_paths(mount_path.unwrap_or(""), template);
    }

    if let Some(mount) = mount_path {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let mount = mount.trim_end_matches('/');
        if let Some(rest) = path.strip_prefix(mount) {
            if rest.is_empty() || rest.starts_with('/') {
                return join_paths(mount, &normalize_route(rest));
            }
        }
    }

    normalize_route(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_numeric_segments() {
        assert_eq!(normalize_route("/orders/123/items/456"), "/orders/:id/items/:id");
        assert_eq!(normalize_route("/orders/0"), "/orders/:id");
    }

    #[test]
    fn test_literal_segments_kept() {
        assert_eq!(normalize_route("/orders/user"), "/orders/user");
        assert_eq!(normalize_route("/api/v1/products"), "/api/v1/products");
        assert_eq!(normalize_route("/users/me/wishlist"), "/users/me/wishlist");
    }

    #[test]
    fn test_opaque_identifiers() {
        assert_eq!(normalize_route("/a1b2c3d4e5f6g7h8"), "/:id");
        assert_eq!(
            normalize_route("/orders/550e8400-e29b-41d4-a716-446655440000"),
            "/orders/:id"
        );
        assert_eq!(normalize_route("/games/5f2b9c0e1a7d"), "/games/:id");
        assert_eq!(normalize_route("/games/deadbeefcafe"), "/games/:id");
    }

    #[test]
    fn test_short_or_wordy_segments_kept() {
        assert_eq!(normalize_route("/v2/ab12"), "/v2/ab12");
        assert_eq!(normalize_route("/products/playstation"), "/products/playstation");
        assert_eq!(normalize_route("/products/best-sellers"), "/products/best-sellers");
        assert!(!is_identifier("----------"));
    }

    #[test]
    fn test_slugs_with_a_few_digits_kept() {
        assert_eq!(normalize_route("/products/playstation5"), "/products/playstation5");
        assert_eq!(normalize_route("/products/iphone15-pro"), "/products/iphone15-pro");
        assert_eq!(normalize_route("/sales/black-friday-2024"), "/sales/black-friday-2024");
        assert_eq!(normalize_route("/carts/x7k2m9q4w1z8"), "/carts/:id");
    }

    #[test]
    fn test_empty_and_root() {
        assert_eq!(normalize_route(""), "/");
        assert_eq!(normalize_route("/"), "/");
        assert_eq!(normalize_route("//orders//"), "/orders");
    }

    #[test]
    fn test_query_string_stripped() {
        assert_eq!(normalize_route("/orders/42?expand=items"), "/orders/:id");
    }

    #[test]
    fn test_resolve_prefers_matched_template() {
        assert_eq!(
            resolve_route("/api/orders/42", Some("/orders/:id"), Some("/api")),
            "/api/orders/:id"
        );
        assert_eq!(resolve_route("/orders/42", Some("/orders/{id}"), None), "/orders/{id}");
        assert_eq!(resolve_route("/api", Some("/"), Some("/api")), "/api");
    }

    #[test]
    fn test_resolve_mount_path_with_heuristic() {
        assert_eq!(
            resolve_route("/api/orders/42", None, Some("/api")),
            "/api/orders/:id"
        );
        assert_eq!(resolve_route("/api", None, Some("/api/")), "/api");
        // A mount path that is only a textual prefix does not apply.
        assert_eq!(resolve_route("/apiary/7", None, Some("/api")), "/apiary/:id");
    }

    #[test]
    fn test_resolve_falls_back_to_heuristic() {
        assert_eq!(resolve_route("/cart/99", None, None), "/cart/:id");
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/api/", "/orders"), "/api/orders");
        assert_eq!(join_paths("", "orders"), "/orders");
        assert_eq!(join_paths("/api", "/"), "/api");
    }

    proptest! {
        #[test]
        fn prop_normalized_route_is_well_formed(path in "[/a-z0-9?=-]{0,40}") {
            let route = normalize_route(&path);
            prop_assert!(route.starts_with('/'));
            prop_assert!(!route.contains("//"));
            prop_assert!(!route.contains('?'));
        }

        #[test]
        fn prop_normalization_is_idempotent(path in "[/a-zA-Z0-9-]{0,40}") {
            let once = normalize_route(&path);
            prop_assert_eq!(normalize_route(&once), once);
        }

        #[test]
        fn prop_numeric_segments_always_collapse(n in any::<u64>()) {
            prop_assert_eq!(normalize_route(&format!("/orders/{n}")), "/orders/:id");
        }
    }
}
