//! Browser sessions and their authentication state
//!
//! A session only ever moves from `Unauthenticated` to `Authenticated`.
//! Unknown or missing session ids read as `Unauthenticated`, so nothing is
//! stored until a license key has been accepted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::licensing::LicenseGrant;
use crate::types::SessionId;

/// Authentication state threaded through request handling
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated {
        license_key_hint: String,
        since: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn authenticated(grant: &LicenseGrant) -> Self {
        SessionState::Authenticated {
            license_key_hint: grant.key_hint.clone(),
            since: grant.verified_at,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// In-memory session table keyed by the session cookie
pub struct SessionStore {
    cookie_name: String,
    sessions: DashMap<SessionId, SessionState>,
}

impl SessionStore {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions: DashMap::new(),
        }
    }

    /// Current state of a session; unknown ids are unauthenticated
    pub fn state(&self, id: Option<&SessionId>) -> SessionState {
        id.and_then(|id| self.sessions.get(id).map(|entry| entry.value().clone()))
            .unwrap_or_default()
    }

    /// Record a successful login and return the id the browser should carry.
    ///
    /// A fresh id is issued on every login and the previous one is dropped.
    pub fn login(&self, previous: Option<&SessionId>, grant: &LicenseGrant) -> SessionId {
        if let Some(previous) = previous {
            self.sessions.remove(previous);
        }
        let id = SessionId::new();
        self.sessions.insert(id, SessionState::authenticated(grant));
        tracing::info!("Session {} authenticated with license {}", id, grant.key_hint);
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Extract this store's session id from a `Cookie` header value
    pub fn session_from_cookie(&self, header: &str) -> Option<SessionId> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .and_then(|(_, value)| value.trim().parse().ok())
    }

    /// `Set-Cookie` value binding the browser to `id`
    pub fn set_cookie(&self, id: &SessionId) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, id
        )
    }
}
