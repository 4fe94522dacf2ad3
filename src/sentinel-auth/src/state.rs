//! Observable session state.

use std::fmt;

use crate::claims::DecodedClaims;
use crate::storage::CredentialPair;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Stored credentials have not been read yet.
    Initializing,
    Unauthenticated,
    /// A login or registration is in progress.
    Authenticating,
    Authenticated,
    /// Logout is revoking the session and clearing credentials.
    Terminating,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Initializing => write!(f, "initializing"),
            SessionPhase::Unauthenticated => write!(f, "unauthenticated"),
            SessionPhase::Authenticating => write!(f, "authenticating"),
            SessionPhase::Authenticated => write!(f, "authenticated"),
            SessionPhase::Terminating => write!(f, "terminating"),
        }
    }
}

/// Snapshot of the client's session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub credentials: Option<CredentialPair>,
    /// Identity decoded from the access credential; absent if unreadable.
    pub identity: Option<DecodedClaims>,
}

impl SessionState {
    pub fn initializing() -> Self {
        Self {
            phase: SessionPhase::Initializing,
            credentials: None,
            identity: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            ..Self::initializing()
        }
    }

    pub fn authenticated(credentials: CredentialPair, identity: Option<DecodedClaims>) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            credentials: Some(credentials),
            identity,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn is_initializing(&self) -> bool {
        self.phase == SessionPhase::Initializing
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}
