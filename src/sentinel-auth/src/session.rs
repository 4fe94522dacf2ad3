//! Session lifecycle: bootstrap, login, registration and logout.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::claims::DecodedClaims;
use crate::coordinator::{RenewalCoordinator, TerminationReason};
use crate::error::{ApiError, AuthError, Result};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};
use crate::navigation::Destination;
use crate::state::{SessionPhase, SessionState};
use crate::storage::CredentialPair;

/// Public entry point for signing in and out.
///
/// State transitions:
/// - `initializing -> authenticated | unauthenticated` on construction
/// - `unauthenticated -> authenticating -> authenticated` on login/register
/// - `authenticating -> unauthenticated` when the server rejects them
/// - `authenticated -> terminating -> unauthenticated` on logout or when
///   renewal fails
#[derive(Debug, Clone)]
pub struct SessionManager {
    coordinator: Arc<RenewalCoordinator>,
}

impl SessionManager {
    /// Create the manager and bootstrap from stored credentials.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(coordinator: Arc<RenewalCoordinator>) -> Self {
        let manager = Self { coordinator };
        manager.bootstrap();
        manager
    }

    /// Read the credential store and enter the matching state.
    ///
    /// Returns whether a stored session was found.
    pub fn bootstrap(&self) -> bool {
        let restored = self.coordinator.restore();
        if restored {
            info!("Restored session from stored credentials");
        } else {
            debug!("No stored session");
        }
        restored
    }

    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    pub fn state(&self) -> SessionState {
        self.coordinator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.coordinator.subscribe_state()
    }

    pub fn identity(&self) -> Option<DecodedClaims> {
        self.coordinator.state().identity
    }

    pub fn is_authenticated(&self) -> bool {
        self.coordinator.state().is_authenticated()
    }

    /// Sign in with email and password.
    ///
    /// On rejection returns [`AuthError::AuthFailure`] with the server's
    /// message and leaves stored credentials untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let _attempt = AuthenticationAttempt::begin(&self.coordinator);
        let result = self.coordinator.api().login(&request).await;
        self.complete_authentication("login", result)
    }

    /// Create an account and sign in with it.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let request = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let _attempt = AuthenticationAttempt::begin(&self.coordinator);
        let result = self.coordinator.api().register(&request).await;
        self.complete_authentication("register", result)
    }

    fn complete_authentication(
        &self,
        action: &'static str,
        result: std::result::Result<AuthResponse, ApiError>,
    ) -> Result<()> {
        let response = result.map_err(|e| {
            warn!(action, error = %e, "Authentication rejected");
            AuthError::AuthFailure {
                message: e.user_message(),
            }
        })?;

        let pair = CredentialPair::new(response.access_token, response.refresh_token);
        self.coordinator.establish(pair)?;

        info!(action, "Authenticated");
        self.coordinator
            .navigator()
            .navigate(Destination::Authenticated);
        Ok(())
    }

    /// End the session.
    ///
    /// Revocation of the server-side session is best effort. Local teardown
    /// always happens, including when this future is dropped mid-revocation.
    pub async fn logout(&self) {
        let _teardown = Teardown {
            coordinator: &self.coordinator,
        };

        let mut revoke_with = None;
        self.coordinator.update_state(|state| {
            if state.phase == SessionPhase::Authenticated {
                state.phase = SessionPhase::Terminating;
            }
            let session_id = state.identity.as_ref().and_then(|c| c.session_id.clone());
            let access_token = state.credentials.as_ref().map(|c| c.access_token().to_string());
            revoke_with = access_token.zip(session_id);
        });

        let Some((access_token, session_id)) = revoke_with else {
            debug!("No session identifier, skipping remote revocation");
            return;
        };

        match self
            .coordinator
            .api()
            .revoke_session(&access_token, &session_id)
            .await
        {
            Ok(response) => debug!(message = %response.message, "Server session revoked"),
            Err(e) => {
                let failure = AuthError::RevocationFailure(e.to_string());
                warn!(error = %failure, "Continuing with local logout");
            }
        }
    }

    /// Guard for views that need a signed-in user.
    ///
    /// Waits for bootstrap to finish. When unauthenticated, signals
    /// navigation to the entry view and returns [`AuthError::NotAuthenticated`].
    pub async fn require_authenticated(&self) -> Result<SessionState> {
        let mut receiver = self.coordinator.subscribe_state();
        let state = match receiver.wait_for(|s| !s.is_initializing()).await {
            Ok(state) => state.clone(),
            Err(_) => SessionState::unauthenticated(),
        };

        if state.is_authenticated() {
            return Ok(state);
        }

        self.coordinator.navigator().navigate(Destination::Entry);
        Err(AuthError::NotAuthenticated)
    }
}

/// Marks the session as authenticating; restores the prior phase unless the
/// attempt succeeded.
struct AuthenticationAttempt<'a> {
    coordinator: &'a RenewalCoordinator,
    previous: SessionPhase,
}

impl<'a> AuthenticationAttempt<'a> {
    fn begin(coordinator: &'a RenewalCoordinator) -> Self {
        let mut previous = SessionPhase::Unauthenticated;
        coordinator.update_state(|state| {
            previous = state.phase;
            if matches!(
                state.phase,
                SessionPhase::Unauthenticated | SessionPhase::Initializing
            ) {
                state.phase = SessionPhase::Authenticating;
            }
        });
        Self {
            coordinator,
            previous,
        }
    }
}

impl Drop for AuthenticationAttempt<'_> {
    fn drop(&mut self) {
        let previous = self.previous;
        self.coordinator.update_state(|state| {
            if state.phase == SessionPhase::Authenticating {
                state.phase = previous;
            }
        });
    }
}

/// Runs local session teardown when dropped.
struct Teardown<'a> {
    coordinator: &'a RenewalCoordinator,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.coordinator.terminate(TerminationReason::Logout);
    }
}
