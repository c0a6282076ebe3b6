//! Route-level access control
//!
//! Paths are classified as protected (need a session) or auth-only (must not
//! be visited with one). Redirects to the login page carry the original path
//! in a `redirect` query parameter so sign-in can return there.

use url::Url;
use url::form_urlencoded;

pub const LOGIN_PATH: &str = "/login";
pub const WELCOME_PATH: &str = "/welcome";
pub const HOME_PATH: &str = "/products";

/// Query parameter carrying the post-login destination
pub const REDIRECT_PARAM: &str = "redirect";

pub const PROTECTED_ROUTES: &[&str] = &["/products", "/cart", "/orders", "/profile"];
pub const AUTH_ROUTES: &[&str] = &["/login", "/register", "/welcome"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Root,
    Protected,
    AuthOnly,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(String),
}

/// Classify a path (without query string)
pub fn classify(path: &str) -> RouteClass {
    if path == "/" || path.is_empty() {
        RouteClass::Root
    } else if PROTECTED_ROUTES.iter().any(|route| matches_route(path, route)) {
        RouteClass::Protected
    } else if AUTH_ROUTES.iter().any(|route| matches_route(path, route)) {
        RouteClass::AuthOnly
    } else {
        RouteClass::Public
    }
}

/// Decide whether `target` (a path with optional query) may be visited.
pub fn evaluate(target: &str, authenticated: bool) -> RouteDecision {
    let Some(url) = parse_target(target) else {
        return RouteDecision::Allow;
    };
    let path = url.path();

    match (classify(path), authenticated) {
        (RouteClass::Root, true) => RouteDecision::Redirect(HOME_PATH.to_string()),
        (RouteClass::Root, false) => RouteDecision::Redirect(WELCOME_PATH.to_string()),
        (RouteClass::Protected, false) => RouteDecision::Redirect(login_redirect(path)),
        (RouteClass::AuthOnly, true) => {
            let destination = url
                .query_pairs()
                .find(|(key, _)| key == REDIRECT_PARAM)
                .map(|(_, value)| value.into_owned())
                .filter(|value| is_local_path(value))
                .unwrap_or_else(|| HOME_PATH.to_string());
            RouteDecision::Redirect(destination)
        }
        _ => RouteDecision::Allow,
    }
}

/// Login URL that returns to `path` after sign-in
pub fn login_redirect(path: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{LOGIN_PATH}?{REDIRECT_PARAM}={encoded}")
}

fn matches_route(path: &str, route: &str) -> bool {
    path.strip_prefix(route)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Only same-origin absolute paths are honoured as redirect targets.
fn is_local_path(value: &str) -> bool {
    value.starts_with('/') && !value.starts_with("//") && !value.contains('\\')
}

fn parse_target(target: &str) -> Option<Url> {
    let base = Url::parse("http://localhost").ok()?;
    base.join(target).ok()
}
