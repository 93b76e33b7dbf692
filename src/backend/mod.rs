// Auth backend collaborators
//
// The session subsystem never talks HTTP directly; it drives an `AuthBackend`.
// `SupabaseAuth` is the production implementation.

pub mod supabase;

pub use supabase::SupabaseAuth;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An authenticated parent account session held by the auth backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub account_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Child record returned by the kid-login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KidProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "familyId", alias = "family_id")]
    pub family_id: String,
}

/// Successful kid PIN verification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KidLogin {
    #[serde(rename = "kidAccessToken", alias = "kid_access_token")]
    pub kid_access_token: String,
    pub child: KidProfile,
}

/// Failures talking to the auth backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The authenticated principal no longer exists (e.g. deleted user)
    #[error("account no longer exists")]
    AccountNotFound,

    #[error("not authorized")]
    Unauthorized,

    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Rejections from a login endpoint
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("incorrect PIN")]
    InvalidPin,

    #[error("unknown family code")]
    InvalidFamilyCode,

    #[error("too many attempts, try again later")]
    RateLimited,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Operations the session subsystem needs from the auth backend
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current parent session, verified with the backend.
    ///
    /// `Ok(None)` means there is no usable session.
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError>;

    /// Password sign-in for a parent account
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, LoginError>;

    /// End the backend session (best effort)
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Verify a kid's PIN within a family
    async fn kid_login(
        &self,
        family_code: &str,
        child_id: &str,
        pin: &str,
    ) -> Result<KidLogin, LoginError>;
}
