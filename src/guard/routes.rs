use std::fmt;

/// Parent login entry point
pub const PARENT_LOGIN_PATH: &str = "/login";

/// Kid login / child picker entry point
pub const KID_LOGIN_PATH: &str = "/kid/login";

/// Pages anyone may open, signed in or not
const PUBLIC_PATHS: &[&str] = &[
    "/",
    PARENT_LOGIN_PATH,
    KID_LOGIN_PATH,
    "/signup",
    "/join",
    "/reset-password",
    "/privacy",
    "/terms",
];

const KID_PREFIX: &str = "/kid";

/// Who may open a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Parent,
    Child,
}

/// Where the guard sends a navigation it refuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    ParentLogin,
    KidLogin,
}

impl Redirect {
    pub fn path(self) -> &'static str {
        match self {
            Redirect::ParentLogin => PARENT_LOGIN_PATH,
            Redirect::KidLogin => KID_LOGIN_PATH,
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Strip query string, fragment and trailing slashes
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Classify a route.
///
/// Anything under `/kid` is kid-only, a short list of pages is public, and
/// every other path is treated as a parent admin page.
pub fn classify(path: &str) -> RouteAccess {
    let path = normalize(path);

    if PUBLIC_PATHS.contains(&path) {
        return RouteAccess::Public;
    }

    if path == KID_PREFIX || path.starts_with("/kid/") {
        return RouteAccess::Child;
    }

    RouteAccess::Parent
}
