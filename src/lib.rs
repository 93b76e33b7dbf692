//! Dual-role session store and route guard for the Family Growth System.
//!
//! A device is either in parent mode or kid mode. [`session::SessionManager`]
//! moves the persisted [`store::SessionStore`] between modes. On every
//! navigation [`guard::RouteGuard`] decides whether the current role may open
//! a route.

pub mod backend;
pub mod config;
pub mod guard;
pub mod session;
pub mod store;

pub use backend::{AuthBackend, AuthSession, BackendError, KidLogin, LoginError, SupabaseAuth};
pub use config::AppConfig;
pub use guard::{GuardDecision, Navigator, Redirect, RoleContext, RouteGuard};
pub use session::{Role, SessionError, SessionManager, SessionState};
pub use store::{SessionEvent, SessionKey, SessionStore};
