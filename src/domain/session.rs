//! Per-browser session state: who is logged in and which flash messages are waiting
//! to be shown on the next rendered page.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Sessions expire this many seconds after they are issued, regardless of activity
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Lifetime of a newly issued session
pub fn session_ttl() -> chrono::Duration {
    chrono::Duration::seconds(SESSION_TTL_SECS)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

/// A notification delivered exactly once, on the next page rendered for the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        FlashMessage {
            kind: FlashKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        FlashMessage {
            kind: FlashKind::Error,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: Option<Uuid>,
    pub flash: Vec<FlashMessage>,
}

impl SessionState {
    fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.flash.is_empty()
    }
}

/// Session state as kept in the session store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub mod driven_ports {
    use super::*;

    /// Keyed storage for sessions. Tokens are opaque strings handed to the browser.
    pub trait SessionStore {
        /// Looks up a live session. Expired sessions are reported as missing.
        async fn load(&self, token: &str) -> Result<Option<SessionRecord>, anyhow::Error>;
        async fn save(&self, token: &str, record: &SessionRecord) -> Result<(), anyhow::Error>;
        async fn destroy(&self, token: &str) -> Result<(), anyhow::Error>;
    }
}

/// What has to happen to the stored session once a request is done with it
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing changed, leave the store and cookie alone
    Unchanged,
    /// Overwrite the record stored under the existing token
    Save(SessionRecord),
    /// Drop the existing token (if any) and store the record under a brand new one
    Issue(SessionRecord),
    /// Drop the existing token (if any) and don't replace it
    Discard,
}

struct ContextState {
    state: SessionState,
    expires_at: Option<DateTime<Utc>>,
    changed: bool,
    renew: bool,
}

/// The session as seen by a single request. Handlers read and modify it freely; the session
/// layer turns the accumulated changes into a [SessionOutcome] after the handler finishes.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Mutex<ContextState>>,
}

impl SessionContext {
    /// Context for a request that arrived without a usable session
    pub fn fresh() -> Self {
        Self::from_parts(SessionState::default(), None)
    }

    /// Context for a request whose session was found in the store
    pub fn restored(record: SessionRecord) -> Self {
        Self::from_parts(record.state, Some(record.expires_at))
    }

    fn from_parts(state: SessionState, expires_at: Option<DateTime<Utc>>) -> Self {
        SessionContext {
            inner: Arc::new(Mutex::new(ContextState {
                state,
                expires_at,
                changed: false,
                renew: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.lock().state.user_id
    }

    /// Binds the session to a user. The session token is replaced so a token handed out
    /// before login can't be reused to ride the authenticated session.
    pub fn log_in(&self, user_id: Uuid) {
        let mut inner = self.lock();
        inner.state.user_id = Some(user_id);
        inner.changed = true;
        inner.renew = true;
    }

    /// Throws away everything in the session. Anything queued afterwards lands in a new session.
    pub fn log_out(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::default();
        inner.changed = true;
        inner.renew = true;
    }

    /// Unbinds the user without replacing the token, for sessions pointing at a user that no longer resolves
    pub fn forget_user(&self) {
        let mut inner = self.lock();
        if inner.state.user_id.take().is_some() {
            inner.changed = true;
        }
    }

    pub fn push_flash(&self, message: FlashMessage) {
        let mut inner = self.lock();
        inner.state.flash.push(message);
        inner.changed = true;
    }

    /// Removes and returns every pending flash message
    pub fn take_flash(&self) -> Vec<FlashMessage> {
        let mut inner = self.lock();
        if inner.state.flash.is_empty() {
            return Vec::new();
        }

        inner.changed = true;
        std::mem::take(&mut inner.state.flash)
    }

    /// Works out how the session store has to be updated. New sessions expire [ttl] after [now].
    pub fn finish(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> SessionOutcome {
        let inner = self.lock();
        if !inner.changed {
            return SessionOutcome::Unchanged;
        }

        match inner.expires_at {
            Some(expires_at) if !inner.renew => SessionOutcome::Save(SessionRecord {
                state: inner.state.clone(),
                expires_at,
            }),
            _ if inner.state.is_empty() => SessionOutcome::Discard,
            _ => SessionOutcome::Issue(SessionRecord {
                state: inner.state.clone(),
                expires_at: now + ttl,
            }),
        }
    }
}
