use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::{AuthBackend, AuthSession, BackendError, KidLogin, LoginError};
use crate::config::BackendConfig;

/// Supabase Auth + Edge Functions client
pub struct SupabaseAuth {
    client: Client,
    base_url: url::Url,
    anon_key: String,
    kid_login_function: String,
    session: RwLock<Option<AuthSession>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl UserResponse {
    fn display_name(&self) -> Option<String> {
        ["full_name", "name", "display_name"]
            .iter()
            .find_map(|field| self.user_metadata.get(field).and_then(Value::as_str))
            .map(String::from)
    }
}

impl SupabaseAuth {
    /// Create a client for the project configured in `config`
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = url::Url::parse(&config.url).context("Invalid backend URL")?;

        let client = Client::builder()
            .user_agent(format!("family-growth/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            anon_key: config.anon_key.clone(),
            kid_login_function: config.kid_login_function.clone(),
            session: RwLock::new(None),
        })
    }

    /// Seed the client with a previously issued access token.
    ///
    /// The token is verified on the next `current_session` call.
    pub fn restore_session(&self, access_token: &str, account_id: &str) {
        let restored = AuthSession {
            access_token: access_token.to_string(),
            account_id: account_id.to_string(),
            email: None,
            display_name: None,
            expires_at: None,
        };
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(restored);
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    fn cached_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_session(&self) -> Option<AuthSession> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn store_session(&self, session: Option<AuthSession>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, BackendError> {
        request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))
    }
}

/// Pull an error code out of a Supabase / edge function error body
fn error_code(body: &Value) -> Option<String> {
    ["error_code", "error", "code"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_ascii_lowercase)
}

fn error_message(body: &Value) -> String {
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .unwrap_or("no details")
        .to_string()
}

async fn read_error_body(response: Response) -> Value {
    response.json::<Value>().await.unwrap_or(Value::Null)
}

/// Map a failed kid-login response onto a login error
fn classify_kid_login_failure(status: StatusCode, body: &Value) -> LoginError {
    match error_code(body).as_deref() {
        Some("rate_limited") | Some("too_many_attempts") => return LoginError::RateLimited,
        Some("invalid_pin") => return LoginError::InvalidPin,
        Some("invalid_code") | Some("invalid_family_code") => {
            return LoginError::InvalidFamilyCode;
        }
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => LoginError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LoginError::InvalidPin,
        StatusCode::NOT_FOUND => LoginError::InvalidFamilyCode,
        status => LoginError::Backend(BackendError::Http {
            status: status.as_u16(),
            message: error_message(body),
        }),
    }
}

/// Map a failed password sign-in response onto a login error
fn classify_sign_in_failure(status: StatusCode, body: &Value) -> LoginError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LoginError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => LoginError::InvalidCredentials,
        status => LoginError::Backend(BackendError::Http {
            status: status.as_u16(),
            message: error_message(body),
        }),
    }
}

/// Map a failed user lookup; `Ok(None)` means the token is simply not usable
fn classify_user_failure(status: StatusCode, body: &Value) -> Result<Option<AuthSession>, BackendError> {
    if status == StatusCode::NOT_FOUND || error_code(body).as_deref() == Some("user_not_found") {
        return Err(BackendError::AccountNotFound);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
        status => Err(BackendError::Http {
            status: status.as_u16(),
            message: error_message(body),
        }),
    }
}

#[async_trait]
impl AuthBackend for SupabaseAuth {
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let Some(session) = self.cached_session() else {
            return Ok(None);
        };

        if session.is_expired() {
            tracing::debug!("Cached auth session expired");
            return Ok(None);
        }

        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .send(self.client.get(url).bearer_auth(&session.access_token))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return classify_user_failure(status, &body);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let verified = AuthSession {
            access_token: session.access_token,
            account_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name(),
            expires_at: session.expires_at,
        };
        self.store_session(Some(verified.clone()));

        Ok(Some(verified))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, LoginError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        tracing::debug!("Signing in {}", email);

        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(classify_sign_in_failure(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let session = AuthSession {
            account_id: token.user.id.clone(),
            email: token.user.email.clone(),
            display_name: token.user.display_name(),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            access_token: token.access_token,
        };
        self.store_session(Some(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // Forget locally first; the remote call is best effort
        let Some(session) = self.take_session() else {
            return Ok(());
        };

        let url = self.endpoint("auth/v1/logout")?;
        let response = self
            .send(self.client.post(url).bearer_auth(&session.access_token))
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        let body = read_error_body(response).await;
        Err(BackendError::Http {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn kid_login(
        &self,
        family_code: &str,
        child_id: &str,
        pin: &str,
    ) -> Result<KidLogin, LoginError> {
        let url = self.endpoint(&format!("functions/v1/{}", self.kid_login_function))?;

        let response = self
            .send(
                self.client
                    .post(url)
                    .bearer_auth(&self.anon_key)
                    .json(&json!({ "familyCode": family_code, "childId": child_id, "pin": pin })),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(classify_kid_login_failure(status, &body));
        }

        response
            .json::<KidLogin>()
            .await
            .map_err(|e| LoginError::Backend(BackendError::Decode(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
            kid_login_function: "kid-login".to_string(),
            request_timeout: 10,
        }
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(SupabaseAuth::new(&config("not-a-url")).is_err());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let auth = SupabaseAuth::new(&config("https://abc.supabase.co/")).unwrap();
        assert_eq!(
            auth.endpoint("auth/v1/user").unwrap().as_str(),
            "https://abc.supabase.co/auth/v1/user"
        );
    }

    #[tokio::test]
    async fn test_no_cached_session_is_none() {
        let auth = SupabaseAuth::new(&config("https://abc.supabase.co/")).unwrap();
        assert!(auth.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_noop() {
        let auth = SupabaseAuth::new(&config("https://abc.supabase.co/")).unwrap();
        assert!(auth.sign_out().await.is_ok());
    }

    #[test]
    fn test_kid_login_failure_prefers_error_code() {
        let body = json!({ "error": "invalid_code" });
        assert!(matches!(
            classify_kid_login_failure(StatusCode::BAD_REQUEST, &body),
            LoginError::InvalidFamilyCode
        ));
    }

    #[test]
    fn test_kid_login_failure_by_status() {
        assert!(matches!(
            classify_kid_login_failure(StatusCode::TOO_MANY_REQUESTS, &Value::Null),
            LoginError::RateLimited
        ));
        assert!(matches!(
            classify_kid_login_failure(StatusCode::UNAUTHORIZED, &Value::Null),
            LoginError::InvalidPin
        ));
        assert!(matches!(
            classify_kid_login_failure(StatusCode::NOT_FOUND, &Value::Null),
            LoginError::InvalidFamilyCode
        ));
        assert!(matches!(
            classify_kid_login_failure(StatusCode::INTERNAL_SERVER_ERROR, &Value::Null),
            LoginError::Backend(BackendError::Http { status: 500, .. })
        ));
    }

    #[test]
    fn test_sign_in_failure() {
        let body = json!({ "error_code": "invalid_credentials", "msg": "Invalid login credentials" });
        assert!(matches!(
            classify_sign_in_failure(StatusCode::BAD_REQUEST, &body),
            LoginError::InvalidCredentials
        ));
        assert!(matches!(
            classify_sign_in_failure(StatusCode::TOO_MANY_REQUESTS, &body),
            LoginError::RateLimited
        ));
    }

    #[test]
    fn test_user_failure_detects_deleted_account() {
        let body = json!({ "error_code": "user_not_found" });
        assert!(matches!(
            classify_user_failure(StatusCode::FORBIDDEN, &body),
            Err(BackendError::AccountNotFound)
        ));
        assert!(matches!(
            classify_user_failure(StatusCode::UNAUTHORIZED, &Value::Null),
            Ok(None)
        ));
    }
}
