use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::Role;
use crate::backend::{AuthBackend, AuthSession, BackendError, KidLogin, LoginError};
use crate::guard::{Navigator, Redirect};
use crate::store::{Change, KeyScope, SessionEvent, SessionKey, SessionStore};

/// Errors surfaced by session transitions
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session belongs to family {current}, cannot log in to family {requested} without switching")]
    FamilyMismatch { current: String, requested: String },

    #[error(transparent)]
    Login(#[from] LoginError),
}

/// Resets the invalidation flag however `force_invalidate` exits
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives every session transition against the store and the auth backend
pub struct SessionManager<B: AuthBackend> {
    store: Arc<SessionStore>,
    backend: Arc<B>,
    navigator: Arc<dyn Navigator>,
    invalidating: AtomicBool,
}

impl<B: AuthBackend> SessionManager<B> {
    pub fn new(store: Arc<SessionStore>, backend: Arc<B>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            backend,
            navigator,
            invalidating: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Enter parent mode.
    ///
    /// Child keys are cleared before anything is written, so a kid access
    /// token can never outlive a parent login. `family_id` is left alone.
    pub fn begin_parent_session(
        &self,
        actor_id: &str,
        display_name: &str,
        email: &str,
        auth_token: &str,
    ) {
        let previous = self.store.role();

        self.store.clear(&SessionKey::in_scope(KeyScope::Child));
        self.store.apply(vec![
            Change::Set(SessionKey::ParentUserId, actor_id.to_string()),
            Change::Set(SessionKey::ParentName, display_name.to_string()),
            Change::Set(SessionKey::ParentEmail, email.to_string()),
            Change::Set(SessionKey::AuthToken, auth_token.to_string()),
            Change::Set(SessionKey::SessionId, Uuid::new_v4().to_string()),
            Change::Set(SessionKey::Role, Role::Parent.as_str().to_string()),
        ]);

        info!("Parent session started for {}", actor_id);
        self.announce(previous);
    }

    /// Enter kid mode for `child_id` within `family_id`.
    ///
    /// Parent keys are left in storage; routing trusts `role`, not tokens.
    pub fn begin_child_session(
        &self,
        child_id: &str,
        child_name: &str,
        family_id: &str,
    ) -> Result<(), SessionError> {
        self.commit_child_session(child_id, child_name, family_id, Vec::new())
    }

    fn commit_child_session(
        &self,
        child_id: &str,
        child_name: &str,
        family_id: &str,
        extra: Vec<Change>,
    ) -> Result<(), SessionError> {
        let current_family = self.store.get(SessionKey::FamilyId);
        if let Some(current) = current_family.as_deref() {
            if current != family_id {
                warn!(
                    "Refusing kid login into family {} while session belongs to {}",
                    family_id, current
                );
                return Err(SessionError::FamilyMismatch {
                    current: current.to_string(),
                    requested: family_id.to_string(),
                });
            }
        }

        let previous = self.store.role();

        // A different kid's residue must not carry over
        if self.store.get(SessionKey::ChildId).as_deref() != Some(child_id) {
            self.store.clear(&SessionKey::in_scope(KeyScope::Child));
        }

        let mut changes = vec![
            Change::Set(SessionKey::ChildId, child_id.to_string()),
            Change::Set(SessionKey::ChildName, child_name.to_string()),
            Change::Remove(SessionKey::SelectedChildId),
            Change::Set(SessionKey::SessionId, Uuid::new_v4().to_string()),
        ];
        if current_family.is_none() {
            changes.push(Change::Set(SessionKey::FamilyId, family_id.to_string()));
        }
        changes.extend(extra);
        changes.push(Change::Set(SessionKey::Role, Role::Child.as_str().to_string()));
        self.store.apply(changes);

        info!("Kid session started for {} in family {}", child_id, family_id);
        self.announce(previous);
        Ok(())
    }

    /// Sign a parent in with email and password.
    ///
    /// Rejected credentials leave the session untouched.
    pub async fn login_parent(&self, email: &str, password: &str) -> Result<AuthSession, SessionError> {
        let session = self.backend.sign_in(email, password).await?;

        let display_name = session.display_name.as_deref().unwrap_or(email);
        let account_email = session.email.as_deref().unwrap_or(email);
        self.begin_parent_session(
            &session.account_id,
            display_name,
            account_email,
            &session.access_token,
        );

        Ok(session)
    }

    /// Verify a kid's PIN and enter kid mode
    pub async fn login_kid(
        &self,
        family_code: &str,
        child_id: &str,
        pin: &str,
    ) -> Result<KidLogin, SessionError> {
        let login = self.backend.kid_login(family_code, child_id, pin).await?;

        self.commit_child_session(
            &login.child.id,
            &login.child.name,
            &login.child.family_id,
            vec![
                Change::Set(SessionKey::KidAccessToken, login.kid_access_token.clone()),
                Change::Set(SessionKey::KidPinSession, Utc::now().to_rfc3339()),
            ],
        )?;

        Ok(login)
    }

    /// Move the device to another family; ends any kid session
    pub fn switch_family(&self, family_id: &str) {
        let previous = self.store.role();

        let mut keys = BTreeSet::new();
        if previous == Role::Child {
            keys = SessionKey::in_scope(KeyScope::Child);
            keys.insert(SessionKey::Role);
            keys.insert(SessionKey::SessionId);
        }
        self.store.clear(&keys);
        self.store.set(SessionKey::FamilyId, family_id);

        info!("Switched to family {}", family_id);
        self.announce(previous);
    }

    /// Log out.
    ///
    /// Local state is cleared before the remote sign-out starts and stays
    /// cleared whatever the backend answers. `family_id` is kept.
    pub async fn end_session(&self) {
        let previous = self.store.role();

        let mut keys = SessionKey::in_scope(KeyScope::Parent);
        keys.extend(SessionKey::in_scope(KeyScope::Child));
        keys.insert(SessionKey::Role);
        keys.insert(SessionKey::SessionId);
        self.store.clear(&keys);

        info!("Session ended");
        self.announce(previous);

        self.sign_out_best_effort().await;
    }

    /// Tear the session down because the backend no longer recognises the
    /// account.
    ///
    /// Clears every key including `family_id`, signs out and redirects to the
    /// parent login. Returns `false` when another invalidation was already in
    /// flight and this call did nothing.
    pub async fn force_invalidate(&self, reason: &str) -> bool {
        if self
            .invalidating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Invalidation already in progress, ignoring: {}", reason);
            return false;
        }
        let _in_flight = InFlight(&self.invalidating);

        error!("Forcing session invalidation: {}", reason);

        let previous = self.store.role();
        self.store.clear(&SessionKey::ALL.into_iter().collect());
        self.announce(previous);

        self.sign_out_best_effort().await;

        self.navigator.navigate(Redirect::ParentLogin);
        true
    }

    /// React to a backend failure seen anywhere in the app.
    ///
    /// Returns `true` if the error invalidated the session.
    pub async fn handle_backend_error(&self, err: &BackendError) -> bool {
        match err {
            BackendError::AccountNotFound => {
                self.force_invalidate("account no longer exists").await;
                true
            }
            _ => false,
        }
    }

    async fn sign_out_best_effort(&self) {
        if let Err(e) = self.backend.sign_out().await {
            warn!("Remote sign-out failed (local session already cleared): {}", e);
        }
    }

    /// Publish `RoleChanged` if the committed role differs from `previous`.
    ///
    /// The role is read back from the store; a write the storage refused
    /// leaves it unchanged and nothing is announced.
    fn announce(&self, previous: Role) {
        let current = self.store.role();
        if current == previous {
            return;
        }
        self.store
            .publish(&SessionEvent::RoleChanged { previous, current });
    }
}
