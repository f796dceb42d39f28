//! Keys view: the key list plus serialized lifecycle mutations.
//!
//! At most one mutation (create, rotate, revoke, activate) is outstanding at
//! a time; a second one is rejected with [`MutationOutcome::Busy`] rather than
//! queued. A successful mutation invalidates the list by refetching it, never
//! by patching local data.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::api::{ApiKeyRecord, DashboardApi, Environment, KeyAction};
use crate::controller::{Settled, Ticket, ViewDataController, ViewState};
use crate::error::ApiError;
use crate::filters::KeyFilters;
use crate::session::{Session, SessionGuard};
use crate::views::KeysSource;

/// Confirmation text shown before a revoke is sent.
pub const REVOKE_PROMPT: &str =
    "Revoke this key now? Existing integrations using this key will stop working.";

pub const KEY_CREATED_MESSAGE: &str = "Key created.";

/// Longest label accepted for a new key.
pub const MAX_LABEL_LEN: usize = 80;

/// Asks the user to confirm an irreversible action.
#[async_trait::async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait::async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

#[async_trait::async_trait]
impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Rotate,
    Revoke,
    Activate,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Rotate => "rotate",
            Self::Revoke => "revoke",
            Self::Activate => "activate",
        }
    }
}

impl From<KeyAction> for ActionKind {
    fn from(action: KeyAction) -> Self {
        match action {
            KeyAction::Rotate => Self::Rotate,
            KeyAction::Revoke => Self::Revoke,
            KeyAction::Activate => Self::Activate,
        }
    }
}

/// The outstanding mutation. `key_id` is `None` for a create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub key_id: Option<String>,
    pub kind: ActionKind,
}

impl PendingAction {
    /// Whether this marks `kind` on `key_id` as in flight.
    #[must_use]
    pub fn is(&self, key_id: &str, kind: ActionKind) -> bool {
        self.kind == kind && self.key_id.as_deref() == Some(key_id)
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_id {
            Some(id) => write!(f, "{id}:{}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Completed,
    /// The user declined the confirmation; nothing was sent.
    Cancelled,
    /// Another mutation is outstanding; nothing was sent.
    Busy,
    Failed,
    LoggedOut,
}

/// Transient result text of the last mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeysFeedback {
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Counts over the unfiltered key list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySummary {
    pub active: usize,
    pub revoked: usize,
    pub live: usize,
    pub test: usize,
}

impl KeySummary {
    #[must_use]
    pub fn of(keys: &[ApiKeyRecord]) -> Self {
        let active = keys.iter().filter(|k| k.active).count();
        let live = keys.iter().filter(|k| k.env == Environment::Live).count();
        Self {
            active,
            revoked: keys.len() - active,
            live,
            test: keys.len() - live,
        }
    }
}

/// Frees the pending slot when the mutation ends, however it ends.
struct PendingSlot<'a>(&'a Mutex<Option<PendingAction>>);

impl<'a> PendingSlot<'a> {
    fn acquire(slot: &'a Mutex<Option<PendingAction>>, action: PendingAction) -> Option<Self> {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return None;
        }
        *current = Some(action);
        Some(Self(slot))
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

enum Mutation<'a> {
    Create { label: &'a str, env: Environment },
    Act { id: &'a str, action: KeyAction },
}

impl Mutation<'_> {
    fn pending(&self) -> PendingAction {
        match self {
            Self::Create { .. } => PendingAction {
                key_id: None,
                kind: ActionKind::Create,
            },
            Self::Act { id, action } => PendingAction {
                key_id: Some((*id).to_owned()),
                kind: (*action).into(),
            },
        }
    }

    fn success_message(&self) -> String {
        match self {
            Self::Create { .. } => KEY_CREATED_MESSAGE.to_owned(),
            Self::Act { action, .. } => format!("Key {action} complete."),
        }
    }

    async fn send(&self, api: &dyn DashboardApi, session: &Session) -> Result<(), ApiError> {
        match self {
            Self::Create { label, env } => api.create_key(session, label, *env).await,
            Self::Act { id, action } => api.key_action(session, id, *action).await,
        }
    }
}

/// Controller of the keys view.
pub struct KeysController {
    view: ViewDataController<KeysSource>,
    pending: Mutex<Option<PendingAction>>,
    feedback: Mutex<KeysFeedback>,
}

impl KeysController {
    #[must_use]
    pub fn new(api: Arc<dyn DashboardApi>, session: Arc<SessionGuard>) -> Self {
        Self {
            view: ViewDataController::new(KeysSource, api, session, ()),
            pending: Mutex::new(None),
            feedback: Mutex::new(KeysFeedback::default()),
        }
    }

    /// The underlying list controller.
    #[must_use]
    pub fn view(&self) -> &ViewDataController<KeysSource> {
        &self.view
    }

    pub fn mount(&self) -> Ticket<()> {
        self.view.mount()
    }

    pub fn refresh(&self) -> Option<Ticket<()>> {
        self.view.refresh()
    }

    pub fn unmount(&self) {
        self.view.unmount();
    }

    pub async fn load(&self, ticket: Ticket<()>) -> Settled {
        self.view.load(ticket).await
    }

    #[must_use]
    pub fn state(&self) -> ViewState<Vec<ApiKeyRecord>> {
        self.view.state()
    }

    /// Create a key. The label is trimmed and must be 1 to 80 characters.
    pub async fn create_key(&self, label: &str, env: Environment) -> MutationOutcome {
        let label = label.trim();
        let len = label.chars().count();
        if len == 0 || len > MAX_LABEL_LEN {
            self.set_feedback(KeysFeedback {
                message: None,
                error: Some(format!("Label must be between 1 and {MAX_LABEL_LEN} characters.")),
            });
            return MutationOutcome::Failed;
        }
        self.mutate(Mutation::Create { label, env }).await
    }

    pub async fn rotate(&self, id: &str) -> MutationOutcome {
        self.mutate(Mutation::Act {
            id,
            action: KeyAction::Rotate,
        })
        .await
    }

    /// Revoke a key after the user confirms [`REVOKE_PROMPT`]. Declining
    /// sends nothing and changes nothing.
    pub async fn revoke(&self, id: &str, confirm: &dyn Confirm) -> MutationOutcome {
        if self.pending().is_some() {
            return MutationOutcome::Busy;
        }
        if !confirm.confirm(REVOKE_PROMPT).await {
            debug!(key = id, "revoke declined");
            return MutationOutcome::Cancelled;
        }
        self.mutate(Mutation::Act {
            id,
            action: KeyAction::Revoke,
        })
        .await
    }

    pub async fn activate(&self, id: &str) -> MutationOutcome {
        self.mutate(Mutation::Act {
            id,
            action: KeyAction::Activate,
        })
        .await
    }

    async fn mutate(&self, mutation: Mutation<'_>) -> MutationOutcome {
        let action = mutation.pending();
        let Some(_slot) = PendingSlot::acquire(&self.pending, action.clone()) else {
            debug!(action = %action, "mutation rejected, another is pending");
            return MutationOutcome::Busy;
        };
        self.set_feedback(KeysFeedback::default());

        let Some(session) = self.view.session_guard().current() else {
            self.set_feedback(KeysFeedback {
                message: None,
                error: Some("Sign in to manage keys.".to_owned()),
            });
            return MutationOutcome::Failed;
        };

        match mutation.send(self.view.api().as_ref(), &session).await {
            Ok(()) => {
                info!(action = %action, "key mutation complete");
                self.set_feedback(KeysFeedback {
                    message: Some(mutation.success_message()),
                    error: None,
                });
                if let Some(ticket) = self.view.refresh() {
                    self.view.load(ticket).await;
                }
                MutationOutcome::Completed
            }
            Err(e) if e.is_unauthorized() => {
                let reason = format!("key {action} unauthorized: {e}");
                self.view.session_guard().force_logout(&session.token, &reason).await;
                MutationOutcome::LoggedOut
            }
            Err(e) => {
                debug!(action = %action, error = %e, "key mutation failed");
                self.set_feedback(KeysFeedback {
                    message: None,
                    error: Some(e.to_string()),
                });
                MutationOutcome::Failed
            }
        }
    }

    /// The outstanding mutation, if any.
    #[must_use]
    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn feedback(&self) -> KeysFeedback {
        self.lock_feedback().clone()
    }

    /// Keys passing `filters`, in server order.
    #[must_use]
    pub fn visible_keys(&self, filters: &KeyFilters) -> Vec<ApiKeyRecord> {
        self.view
            .state()
            .data
            .unwrap_or_default()
            .into_iter()
            .filter(|k| filters.matches(k))
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> KeySummary {
        KeySummary::of(&self.view.state().data.unwrap_or_default())
    }

    fn set_feedback(&self, next: KeysFeedback) {
        *self.lock_feedback() = next;
    }

    fn lock_feedback(&self) -> MutexGuard<'_, KeysFeedback> {
        self.feedback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for KeysController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeysController")
            .field("view", &self.view)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use portal_storage::MemoryStore;

    use super::*;
    use crate::filters::{EnvFilter, StatusFilter};
    use crate::session::SESSION_ENDED_NOTICE;
    use crate::testing::{Endpoint, ScriptedApi};

    async fn mounted() -> (Arc<ScriptedApi>, Arc<SessionGuard>, Arc<KeysController>) {
        let api = Arc::new(ScriptedApi::new());
        let guard = Arc::new(SessionGuard::new(api.clone(), Arc::new(MemoryStore::new())));
        guard.login("owner@example.com", "long enough").await.unwrap();
        let keys = Arc::new(KeysController::new(api.clone(), guard.clone()));
        let ticket = keys.mount();
        assert_eq!(keys.load(ticket).await, Settled::Applied);
        (api, guard, keys)
    }

    #[tokio::test]
    async fn create_refetches_and_reports() {
        let (api, _guard, keys) = mounted().await;

        let outcome = keys.create_key("  CI runner  ", Environment::Live).await;
        assert_eq!(outcome, MutationOutcome::Completed);
        assert_eq!(keys.feedback().message.as_deref(), Some(KEY_CREATED_MESSAGE));
        assert_eq!(api.call_count(Endpoint::ListKeys), 2);
        assert!(keys.state().data.unwrap().iter().any(|k| k.label == "CI runner"));
        assert!(keys.pending().is_none());
    }

    #[tokio::test]
    async fn invalid_label_sends_nothing() {
        let (api, _guard, keys) = mounted().await;

        assert_eq!(keys.create_key("   ", Environment::Test).await, MutationOutcome::Failed);
        assert_eq!(
            keys.create_key(&"x".repeat(81), Environment::Test).await,
            MutationOutcome::Failed
        );
        assert!(keys.feedback().error.is_some());
        assert_eq!(api.call_count(Endpoint::CreateKey), 0);
    }

    #[tokio::test]
    async fn declined_revoke_sends_nothing() {
        let (api, _guard, keys) = mounted().await;
        let before = keys.state();
        let feedback = keys.feedback();

        let outcome = keys.revoke("key_live_primary", &AutoConfirm(false)).await;
        assert_eq!(outcome, MutationOutcome::Cancelled);
        assert_eq!(api.call_count(Endpoint::KeyAction), 0);
        assert_eq!(api.call_count(Endpoint::ListKeys), 1);
        assert_eq!(keys.state(), before);
        assert_eq!(keys.feedback(), feedback);
    }

    #[tokio::test]
    async fn confirmed_revoke_sends_once_and_refetches() {
        let (api, _guard, keys) = mounted().await;
        let prompts = AtomicUsize::new(0);
        let confirm = |prompt: &str| {
            assert_eq!(prompt, REVOKE_PROMPT);
            prompts.fetch_add(1, Ordering::SeqCst);
            true
        };

        let outcome = keys.revoke("key_live_primary", &confirm).await;
        assert_eq!(outcome, MutationOutcome::Completed);
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert_eq!(api.call_count(Endpoint::KeyAction), 1);
        assert_eq!(api.call_count(Endpoint::ListKeys), 2);
        assert_eq!(keys.feedback().message.as_deref(), Some("Key revoke complete."));

        let revoked = KeyFilters {
            status: StatusFilter::Revoked,
            ..KeyFilters::default()
        };
        let visible = keys.visible_keys(&revoked);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "key_live_primary");
    }

    #[tokio::test]
    async fn second_mutation_is_busy_while_first_is_pending() {
        let (api, _guard, keys) = mounted().await;
        let gate = api.gate_next(Endpoint::KeyAction);

        let first = tokio::spawn({
            let keys = keys.clone();
            async move { keys.rotate("key_test_zapier").await }
        });
        while keys.pending().is_none() {
            tokio::task::yield_now().await;
        }
        assert!(keys.pending().unwrap().is("key_test_zapier", ActionKind::Rotate));

        assert_eq!(keys.activate("key_live_primary").await, MutationOutcome::Busy);
        assert_eq!(
            keys.revoke("key_live_primary", &AutoConfirm(true)).await,
            MutationOutcome::Busy
        );

        gate.release();
        assert_eq!(first.await.unwrap(), MutationOutcome::Completed);
        assert!(keys.pending().is_none());
        assert_eq!(api.call_count(Endpoint::KeyAction), 1);
    }

    #[tokio::test]
    async fn failed_mutation_sets_error_and_clears_pending() {
        let (api, _guard, keys) = mounted().await;

        assert_eq!(keys.rotate("key_missing").await, MutationOutcome::Failed);
        assert_eq!(
            keys.feedback().error.as_deref(),
            Some("Key 'key_missing' was not found.")
        );
        assert!(keys.pending().is_none());
        assert_eq!(api.call_count(Endpoint::ListKeys), 1);
    }

    #[tokio::test]
    async fn unauthorized_mutation_logs_out() {
        let (api, guard, keys) = mounted().await;
        api.expire_sessions();

        assert_eq!(keys.activate("key_live_primary").await, MutationOutcome::LoggedOut);
        assert!(keys.feedback().error.is_none());
        assert_eq!(guard.notice().as_deref(), Some(SESSION_ENDED_NOTICE));
        assert!(keys.pending().is_none());
    }

    #[tokio::test]
    async fn summary_counts_unfiltered_keys() {
        let (_api, _guard, keys) = mounted().await;
        keys.create_key("Staging", Environment::Test).await;
        keys.revoke("key_test_zapier", &AutoConfirm(true)).await;

        assert_eq!(
            keys.summary(),
            KeySummary {
                active: 2,
                revoked: 1,
                live: 1,
                test: 2,
            }
        );
        let live = KeyFilters {
            env: EnvFilter::Live,
            ..KeyFilters::default()
        };
        assert_eq!(keys.visible_keys(&live).len(), 1);
    }

    #[test]
    fn pending_action_display() {
        let action = PendingAction {
            key_id: Some("key_1".to_owned()),
            kind: ActionKind::Revoke,
        };
        assert_eq!(action.to_string(), "key_1:revoke");
    }
}
