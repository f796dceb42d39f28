//! Client-side session ownership.
//!
//! [`SessionGuard`] is the only reader and writer of the persisted session
//! record. Its lifecycle is:
//!
//! 1. **Init**: a stored session is revalidated against the server. Success
//!    replaces the stored copy with the server's canonical one (the token may
//!    rotate). Any failure clears it. Without a stored session no request is
//!    made.
//!
//! 2. **Sign-in**: `login` and `register` are mutually exclusive. A second
//!    submission while one is in flight is rejected with
//!    [`SessionError::Pending`].
//!
//! 3. **Sign-out**: `logout` tells the server on a best-effort basis and
//!    always clears local state. `force_logout` is the reaction to a 401 and
//!    acts at most once per session token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portal_storage::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::error::{ApiError, SessionError};

/// Storage key of the persisted session record.
pub const SESSION_STORE_KEY: &str = "portal.session";

/// Notice shown on the sign-in screen after a forced logout.
pub const SESSION_ENDED_NOTICE: &str = "Your dashboard session ended. Please sign in again.";

/// Failure text when the server accepts credentials but returns no session.
pub const SESSION_MISSING_MESSAGE: &str = "Session login failed";

/// Minimum accepted password length on the sign-in form.
pub const MIN_PASSWORD_LEN: usize = 8;

/// An authenticated session as issued by the server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub tenant_id: String,
}

impl Session {
    #[must_use]
    pub fn new(token: impl Into<String>, email: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: email.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Whether the server actually issued a token.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Whether every field is present. Stored records missing any field are
    /// treated as absent.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.has_token() && !self.email.is_empty() && !self.tenant_id.is_empty()
    }
}

// The token never appears in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("email", &self.email)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Authentication state machine: `Checking -> {Authenticated, Unauthenticated}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Checking,
    Authenticated(Session),
    /// `notice` is the message for the sign-in screen, if any.
    Unauthenticated { notice: Option<String> },
}

impl AuthState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Clears the pending flag when the sign-in attempt ends, however it ends.
struct PendingFlag<'a>(&'a AtomicBool);

impl<'a> PendingFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PendingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy)]
enum SignIn {
    Login,
    Register,
}

/// Owner of the single client-side session.
pub struct SessionGuard {
    api: Arc<dyn DashboardApi>,
    store: Arc<dyn StateStore>,
    state: Mutex<AuthState>,
    pending: AtomicBool,
}

impl SessionGuard {
    /// Create a guard in the `Checking` state. Call [`init`](Self::init)
    /// before reading the session.
    #[must_use]
    pub fn new(api: Arc<dyn DashboardApi>, store: Arc<dyn StateStore>) -> Self {
        Self {
            api,
            store,
            state: Mutex::new(AuthState::Checking),
            pending: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore and revalidate the persisted session.
    ///
    /// Never fails: unreadable or corrupt records are treated as absent, and
    /// any revalidation failure (including a 401) ends unauthenticated with
    /// the stored record removed.
    pub async fn init(&self) -> AuthState {
        let Some(stored) = self.read_stored().await else {
            debug!("no stored session");
            return self.transition(AuthState::Unauthenticated { notice: None });
        };

        match self.api.current_session(&stored).await {
            Ok(canonical) if canonical.is_complete() => {
                self.persist(&canonical).await;
                info!(email = %canonical.email, tenant = %canonical.tenant_id, "session restored");
                self.transition(AuthState::Authenticated(canonical))
            }
            Ok(_) => {
                warn!("session revalidation returned no session");
                self.clear_stored().await;
                self.transition(AuthState::Unauthenticated { notice: None })
            }
            Err(e) => {
                debug!(error = %e, "session revalidation failed");
                self.clear_stored().await;
                self.transition(AuthState::Unauthenticated { notice: None })
            }
        }
    }

    /// Sign in with existing credentials.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Pending`] if another sign-in is in flight.
    /// - [`SessionError::Validation`] if the email or password is malformed.
    /// - [`SessionError::Api`] with the server's message on rejection.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        self.sign_in(SignIn::Login, email, password).await
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        self.sign_in(SignIn::Register, email, password).await
    }

    async fn sign_in(&self, kind: SignIn, email: &str, password: &str) -> Result<Session, SessionError> {
        let Some(_pending) = PendingFlag::acquire(&self.pending) else {
            return Err(SessionError::Pending);
        };

        let email = email.trim();
        let result = match validate_credentials(email, password) {
            Ok(()) => {
                let response = match kind {
                    SignIn::Login => self.api.login(email, password).await,
                    SignIn::Register => self.api.register(email, password).await,
                };
                response.map_err(SessionError::from).and_then(|session| {
                    if session.has_token() {
                        Ok(session)
                    } else {
                        Err(SessionError::Api(ApiError::InvalidResponse {
                            reason: SESSION_MISSING_MESSAGE.to_owned(),
                        }))
                    }
                })
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(session) => {
                self.persist(&session).await;
                info!(email = %session.email, tenant = %session.tenant_id, "signed in");
                self.transition(AuthState::Authenticated(session.clone()));
                Ok(session)
            }
            Err(e) => {
                // a failed sign-in ends any earlier session, on disk too
                self.transition(AuthState::Unauthenticated {
                    notice: Some(e.to_string()),
                });
                debug!(error = %e, "sign-in failed");
                self.clear_stored().await;
                Err(e)
            }
        }
    }

    /// Sign out. Server failures are logged and ignored; the local session
    /// is always cleared.
    pub async fn logout(&self) {
        let session = self.current();
        self.transition(AuthState::Unauthenticated { notice: None });
        if let Some(session) = session {
            if let Err(e) = self.api.logout(&session).await {
                warn!(error = %e, "server logout failed, clearing local session anyway");
            }
        }
        self.clear_stored().await;
        info!("signed out");
    }

    /// React to an authorization failure of a request made with `token`.
    ///
    /// Acts only if `token` still belongs to the current session, so every
    /// 401 from the same session after the first is a no-op. Returns whether
    /// this call ended the session.
    pub async fn force_logout(&self, token: &str, reason: &str) -> bool {
        {
            let mut state = self.lock();
            let owns_token = state.session().is_some_and(|s| s.token == token);
            if !owns_token {
                return false;
            }
            *state = AuthState::Unauthenticated {
                notice: Some(SESSION_ENDED_NOTICE.to_owned()),
            };
        }
        warn!(reason, "session ended by server");
        self.clear_stored().await;
        true
    }

    /// The current session, if authenticated.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.lock().session().cloned()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.lock().clone()
    }

    /// Message for the sign-in screen.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        match &*self.lock() {
            AuthState::Unauthenticated { notice } => notice.clone(),
            _ => None,
        }
    }

    /// Whether a login or register request is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn transition(&self, next: AuthState) -> AuthState {
        let mut state = self.lock();
        *state = next;
        state.clone()
    }

    async fn read_stored(&self) -> Option<Session> {
        let raw = match self.store.get(SESSION_STORE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "stored session unreadable, ignoring");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.is_complete() => Some(session),
            Ok(_) => {
                warn!("stored session incomplete, ignoring");
                self.clear_stored().await;
                None
            }
            Err(e) => {
                warn!(error = %e, "stored session corrupt, ignoring");
                self.clear_stored().await;
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode session");
                return;
            }
        };
        if let Err(e) = self.store.put(SESSION_STORE_KEY, &raw).await {
            warn!(error = %e, "failed to persist session");
        }
    }

    async fn clear_stored(&self) {
        if let Err(e) = self.store.delete(SESSION_STORE_KEY).await {
            warn!(error = %e, "failed to clear stored session");
        }
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("state", &*self.lock())
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

/// Sign-in form checks made before any request is sent.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] naming the first problem found.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), SessionError> {
    if !email.contains('@') {
        return Err(SessionError::Validation("Enter a valid email address.".to_owned()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SessionError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    Ok(())
}
