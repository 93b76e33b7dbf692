use std::collections::BTreeSet;
use std::fmt;

/// Which role a persisted key belongs to.
///
/// Parent and child scopes are disjoint, so clearing one can never touch
/// the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// Survives role changes (role discriminator, family context)
    Shared,
    Parent,
    Child,
}

/// Every key the session store knows how to persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionKey {
    Role,
    FamilyId,
    SessionId,
    ParentUserId,
    ParentName,
    ParentEmail,
    AuthToken,
    ChildId,
    ChildName,
    KidAccessToken,
    SelectedChildId,
    KidPinSession,
}

impl SessionKey {
    pub const ALL: [SessionKey; 12] = [
        SessionKey::Role,
        SessionKey::FamilyId,
        SessionKey::SessionId,
        SessionKey::ParentUserId,
        SessionKey::ParentName,
        SessionKey::ParentEmail,
        SessionKey::AuthToken,
        SessionKey::ChildId,
        SessionKey::ChildName,
        SessionKey::KidAccessToken,
        SessionKey::SelectedChildId,
        SessionKey::KidPinSession,
    ];

    /// Name used in the persisted document
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKey::Role => "role",
            SessionKey::FamilyId => "family_id",
            SessionKey::SessionId => "session_id",
            SessionKey::ParentUserId => "parent_user_id",
            SessionKey::ParentName => "parent_name",
            SessionKey::ParentEmail => "parent_email",
            SessionKey::AuthToken => "auth_token",
            SessionKey::ChildId => "child_id",
            SessionKey::ChildName => "child_name",
            SessionKey::KidAccessToken => "kid_access_token",
            SessionKey::SelectedChildId => "selected_child_id",
            SessionKey::KidPinSession => "kid_pin_session",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    pub fn scope(self) -> KeyScope {
        match self {
            SessionKey::Role | SessionKey::FamilyId | SessionKey::SessionId => KeyScope::Shared,
            SessionKey::ParentUserId
            | SessionKey::ParentName
            | SessionKey::ParentEmail
            | SessionKey::AuthToken => KeyScope::Parent,
            SessionKey::ChildId
            | SessionKey::ChildName
            | SessionKey::KidAccessToken
            | SessionKey::SelectedChildId
            | SessionKey::KidPinSession => KeyScope::Child,
        }
    }

    /// All keys belonging to `scope`
    pub fn in_scope(scope: KeyScope) -> BTreeSet<SessionKey> {
        Self::ALL
            .into_iter()
            .filter(|key| key.scope() == scope)
            .collect()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
