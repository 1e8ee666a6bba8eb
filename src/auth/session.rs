// Session manager
//
// Owns the process-wide auth state and mediates between the provider and
// consumers. Consumers read snapshots through a watch channel and never
// mutate state directly; every state change flows through bootstrap
// resolution, the provider event path, or the explicit local-only sign-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::provider::SupabaseAuthClient;
use super::store::SessionStore;
use super::suppression::SuppressionWindow;
use super::types::{AuthChange, Session, User};
use crate::error::ApiError;

/// Snapshot of auth state visible to consumers.
///
/// The user is reached through the session, so a user without a session
/// (or the reverse) cannot be represented.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub loading: bool,
}

impl AuthSnapshot {
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Process-wide session manager
pub struct SessionManager {
    provider: Arc<SupabaseAuthClient>,
    store: Option<SessionStore>,

    /// Observable state, published to consumers
    state: watch::Sender<AuthSnapshot>,

    /// Last session reported by the provider, tracked even while the
    /// suppression window hides it from observable state. Needed so the
    /// sign-up flow's subsequent sign_out can invalidate the transient
    /// session the provider handed out.
    provider_session: Mutex<Option<Session>>,

    suppression: SuppressionWindow,
    bootstrapped: AtomicBool,
}

impl SessionManager {
    pub fn new(provider: Arc<SupabaseAuthClient>, store: Option<SessionStore>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot {
            session: None,
            loading: true,
        });

        Self {
            provider,
            store,
            state,
            provider_session: Mutex::new(None),
            suppression: SuppressionWindow::new(),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// Bearer token of the live session, if authenticated
    pub fn access_token(&self) -> Option<String> {
        self.state
            .borrow()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    fn set_state(&self, session: Option<Session>, loading: bool) {
        self.state.send_replace(AuthSnapshot { session, loading });
    }

    fn persist(&self, session: Option<&Session>) {
        if let Some(store) = &self.store {
            let result = match session {
                Some(s) => store.save(s),
                None => store.clear(),
            };
            if let Err(e) = result {
                tracing::warn!("Failed to persist session state: {:#}", e);
            }
        }
    }

    /// Restore the current session from the provider. Runs at most once;
    /// every failure is treated as "no session" and never surfaced, since a
    /// failed restore is indistinguishable from not being signed in.
    pub async fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return;
        }

        let restored = self.restore_session().await;

        // The restore may resolve after sign-up armed the window;
        // its result is discarded in that case
        if self.suppression.is_suppressed(Instant::now()) {
            tracing::debug!("Bootstrap resolved inside the suppression window, discarding");
            self.set_state(None, false);
            return;
        }

        match restored {
            Some(session) => {
                tracing::info!(user = %session.user.email, "Restored session");
                *self.provider_session.lock().unwrap() = Some(session.clone());
                self.persist(Some(&session));
                self.set_state(Some(session), false);
            }
            None => {
                tracing::info!("Starting unauthenticated");
                self.set_state(None, false);
            }
        }
    }

    async fn restore_session(&self) -> Option<Session> {
        let store = self.store.as_ref()?;

        let persisted = match store.load() {
            Ok(session) => session?,
            Err(e) => {
                tracing::warn!("Failed to load persisted session: {:#}", e);
                return None;
            }
        };

        if !persisted.is_expired() {
            match self.provider.get_user(&persisted.access_token).await {
                Ok(_) => return Some(persisted),
                Err(e) => tracing::debug!("Persisted token rejected: {}", e),
            }
        }

        match self.provider.refresh(&persisted.refresh_token).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::info!("Session restore failed: {}", e);
                None
            }
        }
    }

    /// Entry point for provider push events (sign-in, sign-out, token
    /// refresh). The suppression check happens here, at application time, so
    /// events already in flight when the window was armed are still caught.
    pub fn apply_provider_event(&self, change: AuthChange) {
        *self.provider_session.lock().unwrap() = change.session.clone();

        if self.suppression.is_suppressed(Instant::now()) {
            tracing::debug!(event = ?change.event, "Auth event suppressed after sign-up");
            self.set_state(None, false);
            return;
        }

        tracing::debug!(
            event = ?change.event,
            authenticated = change.session.is_some(),
            "Applying auth event"
        );
        self.persist(change.session.as_ref());
        self.set_state(change.session, false);
    }

    /// Delegate the credential check to the provider. Local state is not
    /// touched here; it arrives through the provider event path.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.provider.sign_in(email, password).await.map(|_| ())
    }

    /// Delegate account creation to the provider, attaching profile
    /// metadata. Callers arm the suppression window first and force a local
    /// sign-out afterward, so a transient session from the provider is never
    /// shown (see the signup route handler).
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(), ApiError> {
        self.provider
            .sign_up(email, password, first_name, last_name)
            .await
            .map(|_| ())
    }

    /// Request session invalidation from the provider. Observable state
    /// converges through the event path once the provider acknowledges.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let token = self
            .provider_session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone());

        if let Some(token) = token {
            self.provider.sign_out(&token).await?;
        }

        // The persisted copy goes away even when the matching SIGNED_OUT
        // event lands inside the suppression window
        self.persist(None);
        Ok(())
    }

    /// Synchronous local-only transition to unauthenticated, independent of
    /// any provider round-trip
    pub fn force_sign_out_ui(&self) {
        self.set_state(None, false);
    }

    /// Arm the sign-up suppression window (deadline = now + 3000 ms,
    /// last-write-wins)
    pub fn mark_just_signed_up(&self) {
        self.suppression.mark(Instant::now());
    }

    /// Refresh the session after the database rejected the bearer token.
    /// Returns the fresh access token; adoption happens via the event path.
    pub async fn refresh_session(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .provider_session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or_else(|| ApiError::Auth("No active session to refresh".to_string()))?;

        let session = self.provider.refresh(&refresh_token).await?;
        Ok(session.access_token)
    }

    /// Start consuming the provider push channel. The returned handle owns
    /// the pump; dropping it stops the pump so no further updates are
    /// applied into a torn-down manager. In-flight provider requests are
    /// not cancelled.
    pub fn spawn_event_pump(self: Arc<Self>) -> AuthEventPump {
        let manager = self;
        let mut events = manager.provider.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => manager.apply_provider_event(change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        AuthEventPump { handle }
    }
}

/// Handle owning the provider event pump task
pub struct AuthEventPump {
    handle: JoinHandle<()>,
}

impl Drop for AuthEventPump {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
