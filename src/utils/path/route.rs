//! Route processing utilities.
//!
//! Routes arrive from markup (`href="/css/site.css?v=3"`), so they may carry
//! a query, a fragment and percent-escapes. Everything here is pure.

use std::borrow::Cow;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;

/// Strip leading slashes from a route
///
/// # Examples
/// ```
/// use tola_bundle::utils::path::route::strip_leading_slash;
/// assert_eq!(strip_leading_slash("/css/site.css"), "css/site.css");
/// assert_eq!(strip_leading_slash("/"), "");
/// ```
#[inline]
pub fn strip_leading_slash(route: &str) -> &str {
    route.trim_start_matches('/')
}

/// Cut a route at the first `?` or `#`
///
/// # Examples
/// ```
/// use tola_bundle::utils::path::route::strip_query_fragment;
/// assert_eq!(strip_query_fragment("/site.css?v=3"), "/site.css");
/// assert_eq!(strip_query_fragment("/app.js#main"), "/app.js");
/// assert_eq!(strip_query_fragment("/app.js"), "/app.js");
/// ```
#[inline]
pub fn strip_query_fragment(route: &str) -> &str {
    route
        .find(['?', '#'])
        .map_or(route, |index| &route[..index])
}

/// Normalize a route for display and registration.
///
/// Drops query and fragment, decodes percent-escapes, turns backslashes into
/// slashes and guarantees a single leading `/`. Case is preserved.
pub fn normalize_route(route: &str) -> String {
    let path = strip_query_fragment(route.trim());
    let decoded: Cow<'_, str> = percent_decode_str(path).decode_utf8_lossy();
    let path = decoded.replace('\\', "/");
    format!("/{}", strip_leading_slash(&path))
}

/// Registry key for a route: normalized and case-folded.
pub fn route_key(route: &str) -> String {
    normalized_key(&normalize_route(route))
}

/// Registry key for a route that already went through [`normalize_route`].
///
/// Normalizing twice would decode escapes twice (`%2541` → `%41` → `A`).
#[inline]
pub fn normalized_key(normalized: &str) -> String {
    normalized.to_lowercase()
}

/// Map a route onto a path relative to a file provider's root.
///
/// Returns `None` for the root itself and for routes that would escape it.
pub fn route_to_relative_path(route: &str) -> Option<PathBuf> {
    normalized_to_relative_path(&normalize_route(route))
}

/// [`route_to_relative_path`] for a route that is already normalized.
pub fn normalized_to_relative_path(normalized: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains(':') => return None,
            s => path.push(s),
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_leading_slash() {
        assert_eq!(strip_leading_slash("/css/site.css"), "css/site.css");
        assert_eq!(strip_leading_slash("css/site.css"), "css/site.css");
        assert_eq!(strip_leading_slash("//x"), "x");
        assert_eq!(strip_leading_slash(""), "");
    }

    #[test]
    fn test_strip_query_fragment() {
        assert_eq!(strip_query_fragment("/a.css?v=1#x"), "/a.css");
        assert_eq!(strip_query_fragment("/a.css#x?v=1"), "/a.css");
        assert_eq!(strip_query_fragment("?v=1"), "");
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("/site.css"), "/site.css");
        assert_eq!(normalize_route("site.css"), "/site.css");
        assert_eq!(normalize_route("  /Site.css?v=2 "), "/Site.css");
        assert_eq!(normalize_route("/my%20file.js"), "/my file.js");
        assert_eq!(normalize_route("\\css\\a.css"), "/css/a.css");
        assert_eq!(normalize_route(""), "/");
    }

    #[test]
    fn test_route_key_is_case_insensitive() {
        assert_eq!(route_key("/Site.CSS"), route_key("/site.css?v=9"));
        assert_ne!(route_key("/site.css"), route_key("/site.js"));
    }

    #[test]
    fn test_route_to_relative_path() {
        assert_eq!(
            route_to_relative_path("/css/site.css?v=1"),
            Some(PathBuf::from("css").join("site.css"))
        );
        assert_eq!(
            route_to_relative_path("/./css//a.css"),
            Some(PathBuf::from("css").join("a.css"))
        );
        assert_eq!(route_to_relative_path("/../etc/passwd"), None);
        assert_eq!(route_to_relative_path("/css/%2e%2e/x"), None);
        assert_eq!(route_to_relative_path("/C:/x"), None);
        assert_eq!(route_to_relative_path("/"), None);
    }

    #[test]
    fn test_escapes_are_decoded_once() {
        let normalized = normalize_route("/x%2541.css");
        assert_eq!(normalized, "/x%41.css");
        assert_eq!(normalized_key(&normalized), route_key("/X%2541.css"));
        assert_eq!(
            normalized_to_relative_path(&normalized),
            Some(PathBuf::from("x%41.css"))
        );

        let normalized = normalize_route("/a%3Fx.css");
        assert_eq!(normalized, "/a?x.css");
        assert_eq!(normalized_key(&normalized), "/a?x.css");
        assert_eq!(
            normalized_to_relative_path(&normalized),
            Some(PathBuf::from("a?x.css"))
        );
    }
}
