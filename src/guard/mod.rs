// Route guard
//
// Decides on every navigation whether the requested route is open to the
// current role. The role is read from the session store on each evaluation;
// the guard keeps no state of its own.

pub mod menu;
pub mod routes;

pub use menu::{menu_for, MenuItem};
use menu::resolve;
pub use routes::{classify, Redirect, RouteAccess, KID_LOGIN_PATH, PARENT_LOGIN_PATH};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{AuthBackend, BackendError};
use crate::session::{ParentSessionData, Role, SessionManager, SessionState};

/// Performs redirects decided by the guard or by session invalidation
pub trait Navigator: Send + Sync {
    fn navigate(&self, to: Redirect);
}

/// Role information handed to whatever renders the allowed route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleContext {
    pub role: Role,
    pub actor_id: Option<String>,
    pub family_id: Option<String>,
}

impl RoleContext {
    fn from_state(state: &SessionState) -> Self {
        Self {
            role: state.role(),
            actor_id: state.actor_id().map(String::from),
            family_id: state.family_id.clone(),
        }
    }

    /// Context for a session whose parent could not be verified
    fn signed_out(state: &SessionState) -> Self {
        Self {
            role: Role::None,
            actor_id: None,
            family_id: state.family_id.clone(),
        }
    }

    /// Navigation menu for the resolved role
    pub fn menu(&self) -> &'static [MenuItem] {
        menu_for(self.role)
    }

    /// Path behind the menu entry `label` for the resolved role
    pub fn link(&self, label: &str) -> Option<&'static str> {
        resolve(self.role, label)
    }
}

/// Outcome of evaluating a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed(RoleContext),
    RedirectParentLogin,
    RedirectKidLogin,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allowed(_))
    }

    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            GuardDecision::Allowed(_) => None,
            GuardDecision::RedirectParentLogin => Some(Redirect::ParentLogin),
            GuardDecision::RedirectKidLogin => Some(Redirect::KidLogin),
        }
    }
}

/// Why a parent session was not trusted; only used for logging
#[derive(Debug)]
enum ParentCheck {
    Verified,
    NoSession,
    Expired,
    AccountMismatch,
    TimedOut,
    Failed(BackendError),
}

pub struct RouteGuard<B: AuthBackend> {
    manager: Arc<SessionManager<B>>,
    navigator: Arc<dyn Navigator>,
    auth_check_timeout: Duration,
}

impl<B: AuthBackend> RouteGuard<B> {
    pub fn new(
        manager: Arc<SessionManager<B>>,
        navigator: Arc<dyn Navigator>,
        auth_check_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            navigator,
            auth_check_timeout,
        }
    }

    /// Evaluate `path` and perform the redirect, if any
    pub async fn navigate(&self, path: &str) -> GuardDecision {
        let (decision, redirected) = self.decide(path).await;

        if let Some(target) = decision.redirect() {
            if !redirected {
                self.navigator.navigate(target);
            }
        }

        decision
    }

    /// Evaluate `path` without redirecting
    pub async fn evaluate(&self, path: &str) -> GuardDecision {
        self.decide(path).await.0
    }

    /// Role context for rendering outside any particular route.
    ///
    /// A parent session is re-verified first; one that fails verification
    /// is reported as signed out.
    pub async fn context(&self) -> RoleContext {
        let state = self.manager.store().snapshot();
        match state.parent() {
            Some(parent) => match self.verify_parent("role context", parent).await {
                Ok(context) => context,
                Err(_) => RoleContext::signed_out(&self.manager.store().snapshot()),
            },
            None => RoleContext::from_state(&state),
        }
    }

    /// Returns the decision and whether a redirect already happened
    /// (session invalidation redirects on its own)
    async fn decide(&self, path: &str) -> (GuardDecision, bool) {
        let access = classify(path);
        let state = self.manager.store().snapshot();
        debug!("Evaluating {} ({:?}) as {}", path, access, state.role());

        match access {
            RouteAccess::Public => match state.parent() {
                // Public pages stay open; an unverified parent just sees the signed-out menu
                Some(parent) => match self.verify_parent(path, parent).await {
                    Ok(context) => (GuardDecision::Allowed(context), false),
                    Err(invalidated) => (
                        GuardDecision::Allowed(RoleContext::signed_out(
                            &self.manager.store().snapshot(),
                        )),
                        invalidated,
                    ),
                },
                None => (GuardDecision::Allowed(RoleContext::from_state(&state)), false),
            },
            RouteAccess::Child => {
                if state.role() == Role::Child {
                    (GuardDecision::Allowed(RoleContext::from_state(&state)), false)
                } else {
                    debug!("Kid route {} refused for role {}", path, state.role());
                    (GuardDecision::RedirectKidLogin, false)
                }
            }
            RouteAccess::Parent => {
                let Some(parent) = state.parent() else {
                    debug!("Parent route {} refused for role {}", path, state.role());
                    return (GuardDecision::RedirectParentLogin, false);
                };
                match self.verify_parent(path, parent).await {
                    Ok(context) => (GuardDecision::Allowed(context), false),
                    Err(invalidated) => (GuardDecision::RedirectParentLogin, invalidated),
                }
            }
        }
    }

    /// Check the stored parent against a live backend session.
    ///
    /// On success returns the context from a fresh snapshot. On failure
    /// returns whether the failure invalidated the session.
    async fn verify_parent(
        &self,
        path: &str,
        parent: &ParentSessionData,
    ) -> Result<RoleContext, bool> {
        let check = match tokio::time::timeout(
            self.auth_check_timeout,
            self.manager.backend().current_session(),
        )
        .await
        {
            Err(_) => ParentCheck::TimedOut,
            Ok(Err(e)) => ParentCheck::Failed(e),
            Ok(Ok(None)) => ParentCheck::NoSession,
            Ok(Ok(Some(session))) if session.is_expired() => ParentCheck::Expired,
            Ok(Ok(Some(session))) if session.account_id != parent.user_id => {
                ParentCheck::AccountMismatch
            }
            Ok(Ok(Some(_))) => ParentCheck::Verified,
        };

        match check {
            ParentCheck::Verified => {
                // The session may have changed while the backend was queried
                let fresh = self.manager.store().snapshot();
                if fresh.parent().map(|p| &p.user_id) == Some(&parent.user_id) {
                    Ok(RoleContext::from_state(&fresh))
                } else {
                    debug!("Session changed during auth check for {}", path);
                    Err(false)
                }
            }
            ParentCheck::Failed(e) => {
                warn!("Auth session check failed for {}: {}", path, e);
                Err(self.manager.handle_backend_error(&e).await)
            }
            other => {
                warn!("Parent session not trusted for {}: {:?}", path, other);
                Err(false)
            }
        }
    }
}
