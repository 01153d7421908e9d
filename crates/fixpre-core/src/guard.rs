//! Pages of the client and the navigation guard.
//!
//! Every navigation is checked against the target page's requirement and
//! whether a token is present. The decision is stateless: nothing about the
//! previous page is consulted.

use serde::Serialize;

use crate::auth::Session;

/// What a page demands of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum RouteRequirement {
    None,
    /// Only for signed-in users
    RequiresAuth,
    /// Only for signed-out users
    RequiresGuest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

impl GuardDecision {
    /// Where a redirect leads, `None` for `Allow`.
    pub fn redirect(&self) -> Option<Page> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin => Some(Page::Login),
            GuardDecision::RedirectToHome => Some(Page::Home),
        }
    }
}

/// Decide a navigation from the target's requirement and token presence.
pub fn check(requirement: RouteRequirement, logged_in: bool) -> GuardDecision {
    match requirement {
        RouteRequirement::RequiresGuest if logged_in => GuardDecision::RedirectToHome,
        RouteRequirement::RequiresAuth if !logged_in => GuardDecision::RedirectToLogin,
        _ => GuardDecision::Allow,
    }
}

/// Pages of the client application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Login,
    Register,
    History,
    Dashboard,
    ForgotPassword,
    ResetPassword,
    GoogleCallback,
}

impl Page {
    pub const ALL: [Page; 8] = [
        Page::Home,
        Page::Login,
        Page::Register,
        Page::History,
        Page::Dashboard,
        Page::ForgotPassword,
        Page::ResetPassword,
        Page::GoogleCallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Login => "login",
            Page::Register => "register",
            Page::History => "history",
            Page::Dashboard => "dashboard",
            Page::ForgotPassword => "forgot_password",
            Page::ResetPassword => "reset_password",
            Page::GoogleCallback => "google-callback",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::Login => "/login",
            Page::Register => "/register",
            Page::History => "/history",
            Page::Dashboard => "/dashboard",
            Page::ForgotPassword => "/forgot-password",
            Page::ResetPassword => "/reset-password",
            Page::GoogleCallback => "/auth/callback",
        }
    }

    pub fn requirement(&self) -> RouteRequirement {
        match self {
            Page::Login | Page::Register => RouteRequirement::RequiresGuest,
            Page::History | Page::Dashboard => RouteRequirement::RequiresAuth,
            _ => RouteRequirement::None,
        }
    }

    /// Resolve a path, ignoring any query string and trailing slash.
    pub fn from_path(path: &str) -> Option<Page> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Self::ALL.into_iter().find(|page| page.path() == path)
    }
}

/// The outcome of navigating to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub target: Page,
    pub decision: GuardDecision,
}

impl Navigation {
    /// The page actually shown after the guard ran
    pub fn destination(&self) -> Page {
        self.decision.redirect().unwrap_or(self.target)
    }
}

/// Runs the guard against a session on every navigation.
#[derive(Clone)]
pub struct Router {
    session: Session,
}

impl Router {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn navigate_to(&self, target: Page) -> Navigation {
        Navigation {
            target,
            decision: check(target.requirement(), self.session.is_logged_in()),
        }
    }

    /// The page at `path`, without running the guard
    pub fn resolve(&self, path: &str) -> Option<Page> {
        Page::from_path(path)
    }

    /// `None` when no page has this path
    pub fn navigate(&self, path: &str) -> Option<Navigation> {
        self.resolve(path).map(|page| self.navigate_to(page))
    }
}
