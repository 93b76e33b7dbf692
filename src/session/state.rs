use serde::Serialize;
use std::fmt;

use crate::store::{SessionEntries, SessionKey};

/// Who is acting in the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    None,
    Parent,
    Child,
}

impl Role {
    /// Decode the persisted `role` value; anything unrecognised is `None`
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("parent") => Role::Parent,
            Some("child") => Role::Child,
            _ => Role::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Parent => "parent",
            Role::Child => "child",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent-only session data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSessionData {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub auth_token: String,
}

/// Child-only session data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSessionData {
    pub child_id: String,
    pub child_name: Option<String>,
    pub kid_access_token: Option<String>,
}

/// The session that is authoritative for routing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveSession {
    #[default]
    None,
    Parent(ParentSessionData),
    Child(ChildSessionData),
}

impl ActiveSession {
    pub fn role(&self) -> Role {
        match self {
            ActiveSession::None => Role::None,
            ActiveSession::Parent(_) => Role::Parent,
            ActiveSession::Child(_) => Role::Child,
        }
    }

    pub fn actor_id(&self) -> Option<&str> {
        match self {
            ActiveSession::None => None,
            ActiveSession::Parent(parent) => Some(&parent.user_id),
            ActiveSession::Child(child) => Some(&child.child_id),
        }
    }
}

/// Typed view of the session store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub family_id: Option<String>,
    pub session_id: Option<String>,
    pub active: ActiveSession,
}

impl SessionState {
    /// Decode the active session from raw entries.
    ///
    /// `role` selects which scope is read; keys belonging to the other role
    /// are ignored even when present. A role whose required keys are missing
    /// decodes to `ActiveSession::None`.
    pub fn from_entries(entries: &SessionEntries) -> Self {
        let get = |key: SessionKey| entries.get(&key).cloned();

        let active = match Role::from_stored(entries.get(&SessionKey::Role).map(String::as_str)) {
            Role::None => ActiveSession::None,
            Role::Parent => match (get(SessionKey::ParentUserId), get(SessionKey::AuthToken)) {
                (Some(user_id), Some(auth_token)) => ActiveSession::Parent(ParentSessionData {
                    user_id,
                    display_name: get(SessionKey::ParentName),
                    email: get(SessionKey::ParentEmail),
                    auth_token,
                }),
                _ => {
                    tracing::debug!("Parent role recorded without credentials");
                    ActiveSession::None
                }
            },
            Role::Child => match get(SessionKey::ChildId) {
                Some(child_id) => ActiveSession::Child(ChildSessionData {
                    child_id,
                    child_name: get(SessionKey::ChildName),
                    kid_access_token: get(SessionKey::KidAccessToken),
                }),
                None => {
                    tracing::debug!("Child role recorded without a child id");
                    ActiveSession::None
                }
            },
        };

        Self {
            family_id: get(SessionKey::FamilyId),
            session_id: get(SessionKey::SessionId),
            active,
        }
    }

    pub fn role(&self) -> Role {
        self.active.role()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.active.actor_id()
    }

    pub fn parent(&self) -> Option<&ParentSessionData> {
        match &self.active {
            ActiveSession::Parent(parent) => Some(parent),
            _ => None,
        }
    }

    pub fn child(&self) -> Option<&ChildSessionData> {
        match &self.active {
            ActiveSession::Child(child) => Some(child),
            _ => None,
        }
    }
}
