// Session transitions
//
// Parent login, kid login, logout and forced invalidation all go through
// `SessionManager`, which keeps the store's parent and child data from ever
// both being authoritative.

mod manager;
mod selection;
mod state;

pub use manager::{SessionError, SessionManager};
pub use selection::SelectedChildCache;
pub use state::{ActiveSession, ChildSessionData, ParentSessionData, Role, SessionState};
