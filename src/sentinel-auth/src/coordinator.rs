//! Credential renewal coordination.
//!
//! [`RenewalCoordinator`] owns the session state and is the only place that
//! exchanges a refresh credential for a new access credential. It guarantees:
//! - at most one refresh call in flight; concurrent requests coalesce
//! - renewed credentials are persisted before subscribers hear about them
//! - a failed renewal ends the session, it is never retried on its own
//!
//! Renewal is triggered proactively by a recurring expiry check (see
//! [`RenewalCoordinator::schedule_proactive_check`]) and reactively by the
//! transport when a request comes back 401.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::claims::{DecodedClaims, decode, decode_identity};
use crate::clock::{Clock, SystemClock};
use crate::constants::{CHECK_INTERVAL, REFRESH_BUFFER};
use crate::error::{ApiError, AuthError, StorageError};
use crate::navigation::{Destination, Navigator, NoopNavigator};
use crate::state::{SessionPhase, SessionState};
use crate::storage::{CredentialPair, CredentialStore};

/// Timing knobs for renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalSettings {
    /// Renew once the access credential expires within this window.
    pub refresh_buffer: Duration,
    /// How often the proactive check re-evaluates expiry.
    pub check_interval: Duration,
    /// Give up on a refresh call after this long. `None` waits indefinitely.
    pub renewal_timeout: Option<Duration>,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            refresh_buffer: REFRESH_BUFFER,
            check_interval: CHECK_INTERVAL,
            renewal_timeout: None,
        }
    }
}

/// What a call to [`RenewalCoordinator::renew`] did.
#[derive(Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    /// This call performed the renewal; carries the new access credential.
    Renewed(String),
    /// Another renewal was in flight; its subscribers will be notified.
    Coalesced,
    /// Renewal was impossible or failed, and the session was ended.
    Terminated,
    /// The session was replaced or ended while the refresh call was running.
    Superseded,
}

impl fmt::Debug for RenewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewOutcome::Renewed(_) => write!(f, "Renewed([REDACTED])"),
            RenewOutcome::Coalesced => write!(f, "Coalesced"),
            RenewOutcome::Terminated => write!(f, "Terminated"),
            RenewOutcome::Superseded => write!(f, "Superseded"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TerminationReason {
    Logout,
    MissingRefreshCredential,
    RenewalFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Logout => write!(f, "logout"),
            TerminationReason::MissingRefreshCredential => write!(f, "missing refresh credential"),
            TerminationReason::RenewalFailed => write!(f, "renewal failed"),
        }
    }
}

type RenewalCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct SubscriberRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, RenewalCallback>>,
}

impl SubscriberRegistry {
    fn insert(&self, callback: RenewalCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, callback);
        id
    }

    fn remove(&self, id: u64) {
        self.callbacks.lock().remove(&id);
    }

    fn notify(&self, access_token: &str) {
        // Snapshot so callbacks may subscribe or unsubscribe.
        let callbacks: Vec<RenewalCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback(access_token);
        }
    }
}

/// Registration of a renewal callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Handle to a recurring expiry check. Dropping it cancels the check.
#[must_use = "dropping a ProactiveCheck cancels it immediately"]
#[derive(Debug)]
pub struct ProactiveCheck {
    cancel: CancellationToken,
}

impl ProactiveCheck {
    fn inert() -> Self {
        let cancel = CancellationToken::new();
        cancel.cancel();
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for ProactiveCheck {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Holds the in-flight flag for the life of one renewal.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owner of session state and the single path for credential renewal.
pub struct RenewalCoordinator {
    api: Arc<dyn AuthApi>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    navigator: Arc<dyn Navigator>,
    settings: RenewalSettings,
    state: watch::Sender<SessionState>,
    subscribers: Arc<SubscriberRegistry>,
    in_flight: AtomicBool,
    /// Bumped whenever a session is established or torn down.
    epoch: AtomicU64,
    /// Serializes session writes: establish, teardown and applying a renewal.
    session_lock: Mutex<()>,
    proactive: Mutex<Option<ProactiveCheck>>,
}

impl RenewalCoordinator {
    pub fn new(api: Arc<dyn AuthApi>, store: CredentialStore) -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        Self {
            api,
            store,
            clock: Arc::new(SystemClock),
            navigator: Arc::new(NoopNavigator),
            settings: RenewalSettings::default(),
            state,
            subscribers: Arc::new(SubscriberRegistry::default()),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            session_lock: Mutex::new(()),
            proactive: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_settings(mut self, settings: RenewalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RenewalSettings {
        &self.settings
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub(crate) fn api(&self) -> &Arc<dyn AuthApi> {
        &self.api
    }

    pub(crate) fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every session state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn update_state(&self, update: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(update);
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_renewing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the active session has a running expiry check.
    pub fn has_proactive_check(&self) -> bool {
        self.proactive
            .lock()
            .as_ref()
            .is_some_and(ProactiveCheck::is_active)
    }

    /// The access credential to present on outgoing requests.
    pub fn current_access_token(&self) -> Option<String> {
        let in_memory = self
            .state
            .borrow()
            .credentials
            .as_ref()
            .map(|c| c.access_token().to_string());
        in_memory.or_else(|| self.store.access_token())
    }

    /// Stored refresh credential, falling back to the in-memory session.
    fn current_refresh_token(&self) -> Option<String> {
        if let Some(token) = self.store.refresh_token() {
            return Some(token);
        }
        self.state
            .borrow()
            .credentials
            .as_ref()
            .map(|c| c.refresh_token().to_string())
    }

    /// Register `callback` to receive every renewed access credential.
    pub fn on_renewed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.subscribers.insert(Arc::new(callback));
        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Whether `claims` expire within the refresh buffer.
    pub fn needs_renewal(&self, claims: &DecodedClaims) -> bool {
        claims.expires_within(self.clock.now(), self.settings.refresh_buffer)
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// Calls made while a renewal is in flight return
    /// [`RenewOutcome::Coalesced`] without touching the network; they learn
    /// the result through [`RenewalCoordinator::on_renewed`].
    pub async fn renew(&self) -> RenewOutcome {
        let Some(_in_flight) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("Renewal already in flight, coalescing");
            return RenewOutcome::Coalesced;
        };

        let Some(refresh_token) = self.current_refresh_token() else {
            warn!("No refresh credential available, ending session");
            self.terminate(TerminationReason::MissingRefreshCredential);
            return RenewOutcome::Terminated;
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        debug!("Renewing access credential");

        let result = match self.settings.renewal_timeout {
            Some(limit) => tokio::time::timeout(limit, self.api.refresh(&refresh_token))
                .await
                .unwrap_or_else(|_| {
                    Err(ApiError::Network(format!(
                        "renewal timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
            None => self.api.refresh(&refresh_token).await,
        };

        let renewed = {
            // Teardown cannot interleave between the epoch check and the writes.
            let session = self.session_lock.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!("Session changed while renewing, discarding result");
                return RenewOutcome::Superseded;
            }

            match result {
                Ok(response) => {
                    self.apply_renewed(&response.access_token, &refresh_token);
                    response.access_token
                }
                Err(e) => {
                    let failure = AuthError::RenewalFailure(e.to_string());
                    warn!(error = %failure, "Ending session");
                    self.terminate_locked(TerminationReason::RenewalFailed);
                    drop(session);
                    self.navigator.navigate(Destination::Entry);
                    return RenewOutcome::Terminated;
                }
            }
        };

        info!("Access credential renewed");
        self.subscribers.notify(&renewed);
        RenewOutcome::Renewed(renewed)
    }

    /// Persist a renewed access credential and publish it in the session state.
    ///
    /// Caller holds `session_lock`.
    fn apply_renewed(&self, access_token: &str, refresh_token: &str) {
        if let Err(e) = self.store.set_access(access_token) {
            warn!(error = %e, "Failed to persist renewed access credential");
        }

        let identity = decode_identity(access_token);
        let identity_lost = identity.is_none();
        self.update_state(|state| {
            if state.phase != SessionPhase::Terminating {
                state.phase = SessionPhase::Authenticated;
            }
            state.credentials = Some(CredentialPair::new(access_token, refresh_token));
            state.identity = identity;
        });

        if identity_lost {
            self.cancel_proactive_check();
        }
    }

    /// Start a recurring expiry check seeded with `access_token`.
    ///
    /// Renews at once if the credential is inside the refresh buffer, then
    /// re-checks the current credential every `check_interval` until the
    /// returned handle is cancelled or dropped. A credential without a
    /// readable expiry yields an inactive handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_proactive_check(self: &Arc<Self>, access_token: &str) -> ProactiveCheck {
        let claims = match decode(access_token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "No readable expiry, proactive renewal disabled");
                return ProactiveCheck::inert();
            }
        };

        let renew_now = self.needs_renewal(&claims);
        let period = self.settings.check_interval;
        debug!(
            expires_in = claims.time_until_expiry(self.clock.now()),
            renew_now,
            period_secs = period.as_secs(),
            "Scheduling proactive renewal check"
        );

        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let coordinator = Arc::downgrade(self);

        tokio::spawn(async move {
            if renew_now && !cancelled.is_cancelled() {
                match coordinator.upgrade() {
                    Some(c) => {
                        c.renew().await;
                    }
                    None => return,
                }
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(c) = coordinator.upgrade() else { break };
                        c.check_expiry().await;
                    }
                }
            }
            debug!("Proactive renewal check stopped");
        });

        ProactiveCheck { cancel }
    }

    async fn check_expiry(&self) {
        let Some(access_token) = self.current_access_token() else {
            return;
        };
        match decode(&access_token) {
            Ok(claims) if self.needs_renewal(&claims) => {
                debug!(
                    expires_in = claims.time_until_expiry(self.clock.now()),
                    "Access credential expiring, renewing"
                );
                self.renew().await;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Current access credential unreadable"),
        }
    }

    fn install_proactive_check(self: &Arc<Self>, access_token: &str) {
        let check = self.schedule_proactive_check(access_token);
        // The replaced handle cancels on drop.
        let _previous = self.proactive.lock().replace(check);
    }

    fn cancel_proactive_check(&self) {
        if let Some(check) = self.proactive.lock().take() {
            check.cancel();
        }
    }

    /// Persist `pair` and make it the authenticated session.
    pub(crate) fn establish(self: &Arc<Self>, pair: CredentialPair) -> Result<(), StorageError> {
        let _session = self.session_lock.lock();
        self.store.set_pair(&pair)?;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.activate(pair);
        Ok(())
    }

    /// Load the session from storage. Returns whether one was found.
    pub(crate) fn restore(self: &Arc<Self>) -> bool {
        let _session = self.session_lock.lock();
        match self.store.get() {
            Some(pair) => {
                self.activate(pair);
                true
            }
            None => {
                self.state.send_replace(SessionState::unauthenticated());
                false
            }
        }
    }

    fn activate(self: &Arc<Self>, pair: CredentialPair) {
        let identity = decode_identity(pair.access_token());
        let access_token = pair.access_token().to_string();
        self.state
            .send_replace(SessionState::authenticated(pair, identity));
        self.install_proactive_check(&access_token);
    }

    /// Clear credentials and state and send the user to the entry view.
    pub(crate) fn terminate(&self, reason: TerminationReason) {
        {
            let _session = self.session_lock.lock();
            self.terminate_locked(reason);
        }
        self.navigator.navigate(Destination::Entry);
    }

    /// Teardown without navigation. Caller holds `session_lock`.
    fn terminate_locked(&self, reason: TerminationReason) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_proactive_check();
        self.store.clear();
        self.state.send_replace(SessionState::unauthenticated());
        info!(%reason, "Session ended");
    }
}

impl fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .field("phase", &self.state.borrow().phase)
            .field("renewing", &self.is_renewing())
            .finish()
    }
}
