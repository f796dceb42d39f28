//! The process-wide state container.
//!
//! [`Console`] wires the router, the session guard, the synchronizers and
//! the four view controllers together. It has one reconciliation step,
//! [`pump`](Console::pump), which every intent ends with:
//!
//! 1. Read the route and let each synchronizer adopt it.
//! 2. Unmount the controller of the view we left, push the current filters
//!    into every controller, and mount the active view's controller.
//! 3. Resolve the fetches this started, outside of any lock.
//! 4. Repeat while the router reported a change (synchronizers may rewrite
//!    the route) or the session state changed, up to a fixed bound.
//!
//! Writes back to the route only happen when the canonical query differs,
//! so the loop settles after at most a couple of rounds.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portal_storage::StateStore;
use tracing::{debug, warn};

use crate::api::{DashboardApi, Environment};
use crate::controller::{Settled, Ticket};
use crate::error::SessionError;
use crate::filters::{ActivityFilters, AnalyticsRange, KeyFilters, RouteFilters};
use crate::keys::{Confirm, KeysController, MutationOutcome};
use crate::prefs::Preferences;
use crate::route::{QueryParams, Route, View};
use crate::router::{HashRouter, ListenerId, NavigateOptions};
use crate::session::{AuthState, Session, SessionGuard};
use crate::sync::{DraftApplySync, LiveSync, RangeSync};
use crate::views::{
    ActivityController, ActivitySource, MetricsController, MetricsSource, OverviewController,
    OverviewSource,
};

/// Upper bound on reconciliation rounds per [`Console::pump`].
const MAX_PUMP_ROUNDS: usize = 8;

/// A fetch started during reconciliation.
enum PendingLoad {
    Overview(Ticket<AnalyticsRange>),
    Metrics(Ticket<AnalyticsRange>),
    Keys(Ticket<()>),
    Activity(Ticket<ActivityFilters>),
}

/// Values last written to the preference store.
#[derive(Default)]
struct Persisted {
    range: Option<AnalyticsRange>,
    key_filters: Option<String>,
    activity_filters: Option<String>,
}

/// Preference writes decided under the lock, performed after it.
#[derive(Default)]
struct PrefWrites {
    range: Option<AnalyticsRange>,
    key_filters: Option<KeyFilters>,
    activity_filters: Option<ActivityFilters>,
}

struct ConsoleState {
    range: RangeSync,
    key_filters: LiveSync<KeyFilters>,
    activity_filters: DraftApplySync<ActivityFilters>,
    mounted: Option<View>,
    persisted: Persisted,
}

/// The dashboard engine.
pub struct Console {
    router: Arc<HashRouter>,
    session: Arc<SessionGuard>,
    prefs: Preferences,
    overview: OverviewController,
    metrics: MetricsController,
    keys: KeysController,
    activity: ActivityController,
    state: Mutex<ConsoleState>,
    route_dirty: Arc<AtomicBool>,
    listener: ListenerId,
}

impl Console {
    /// Build a console over `api` and `store`, navigating with `router`.
    /// Nothing is fetched until [`start`](Self::start).
    #[must_use]
    pub fn new(api: Arc<dyn DashboardApi>, store: Arc<dyn StateStore>, router: Arc<HashRouter>) -> Self {
        let session = Arc::new(SessionGuard::new(api.clone(), store.clone()));
        let route_dirty = Arc::new(AtomicBool::new(true));
        let listener = {
            let dirty = route_dirty.clone();
            router.on_change(move |_| dirty.store(true, Ordering::Release))
        };

        Self {
            overview: OverviewController::new(OverviewSource, api.clone(), session.clone(), AnalyticsRange::default()),
            metrics: MetricsController::new(MetricsSource, api.clone(), session.clone(), AnalyticsRange::default()),
            keys: KeysController::new(api.clone(), session.clone()),
            activity: ActivityController::new(ActivitySource, api, session.clone(), ActivityFilters::default()),
            prefs: Preferences::new(store),
            session,
            state: Mutex::new(ConsoleState {
                range: RangeSync::default(),
                key_filters: LiveSync::new(View::Keys),
                activity_filters: DraftApplySync::new(View::Activity),
                mounted: None,
                persisted: Persisted::default(),
            }),
            route_dirty,
            listener,
            router,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore preferences, revalidate the session and load the active view.
    pub async fn start(&self) -> AuthState {
        let range = self.prefs.range().await;
        let key_filters = self.prefs.key_filters().await;
        let activity_filters = self.prefs.activity_filters().await;
        {
            let mut state = self.lock();
            state.persisted = Persisted {
                range: Some(range),
                key_filters: Some(key_filters.to_query().to_string()),
                activity_filters: Some(activity_filters.to_query().to_string()),
            };
            state.range = RangeSync::new(range);
            state.key_filters = LiveSync::with_state(View::Keys, key_filters);
            state.activity_filters = DraftApplySync::with_applied(View::Activity, activity_filters);
        }

        let auth = self.session.init().await;
        self.pump().await;
        auth
    }

    /// Reconcile every component with the current route and session, and
    /// resolve the fetches that starts. Returns each load's outcome.
    pub async fn pump(&self) -> Vec<(View, Settled)> {
        let mut outcomes = Vec::new();
        for round in 0..MAX_PUMP_ROUNDS {
            self.route_dirty.store(false, Ordering::Release);
            let authenticated = self.session.state().is_authenticated();

            let (loads, writes) = self.reconcile(authenticated);
            self.persist(writes).await;
            for load in loads {
                outcomes.push(self.resolve(load).await);
            }

            let auth_changed = self.session.state().is_authenticated() != authenticated;
            if !self.route_dirty.load(Ordering::Acquire) && !auth_changed {
                return outcomes;
            }
            debug!(round, auth_changed, "reconciling again");
        }
        warn!(rounds = MAX_PUMP_ROUNDS, route = %self.router.fragment(), "reconciliation did not settle");
        outcomes
    }

    fn reconcile(&self, authenticated: bool) -> (Vec<PendingLoad>, PrefWrites) {
        let route = self.router.read();
        let mut state = self.lock();
        let mut loads = Vec::new();

        if !authenticated {
            if state.mounted.take().is_some() {
                debug!("signed out, unmounting views");
            }
            self.overview.unmount();
            self.metrics.unmount();
            self.keys.unmount();
            self.activity.unmount();
            return (loads, PrefWrites::default());
        }

        state.range.on_route_change(&route, &self.router);
        state.key_filters.on_route_change(&route);
        state.activity_filters.on_route_change(&route);

        let previous = state.mounted;
        if previous != Some(route.view) {
            match previous {
                Some(View::Overview) => self.overview.unmount(),
                Some(View::Metrics) => self.metrics.unmount(),
                Some(View::Keys) => self.keys.unmount(),
                Some(View::Activity) => self.activity.unmount(),
                None => {}
            }
        }

        let range = state.range.range();
        loads.extend(self.overview.set_filters(range).map(PendingLoad::Overview));
        loads.extend(self.metrics.set_filters(range).map(PendingLoad::Metrics));
        loads.extend(
            self.activity
                .set_filters(state.activity_filters.applied().clone())
                .map(PendingLoad::Activity),
        );

        if previous != Some(route.view) {
            debug!(view = %route.view, "mounting view");
            loads.push(match route.view {
                View::Overview => PendingLoad::Overview(self.overview.mount()),
                View::Metrics => PendingLoad::Metrics(self.metrics.mount()),
                View::Keys => PendingLoad::Keys(self.keys.mount()),
                View::Activity => PendingLoad::Activity(self.activity.mount()),
            });
            state.mounted = Some(route.view);
        }

        let writes = Self::pending_writes(&mut state);
        (loads, writes)
    }

    fn pending_writes(state: &mut ConsoleState) -> PrefWrites {
        let mut writes = PrefWrites::default();

        let range = state.range.range();
        if state.persisted.range != Some(range) {
            state.persisted.range = Some(range);
            writes.range = Some(range);
        }

        let keys = state.key_filters.state().normalize();
        let encoded = keys.to_query().to_string();
        if state.persisted.key_filters.as_deref() != Some(encoded.as_str()) {
            state.persisted.key_filters = Some(encoded);
            writes.key_filters = Some(keys);
        }

        let activity = state.activity_filters.applied().clone();
        let encoded = activity.to_query().to_string();
        if state.persisted.activity_filters.as_deref() != Some(encoded.as_str()) {
            state.persisted.activity_filters = Some(encoded);
            writes.activity_filters = Some(activity);
        }

        writes
    }

    async fn persist(&self, writes: PrefWrites) {
        if let Some(range) = writes.range {
            self.prefs.set_range(range).await;
        }
        if let Some(filters) = writes.key_filters {
            self.prefs.set_key_filters(&filters).await;
        }
        if let Some(filters) = writes.activity_filters {
            self.prefs.set_activity_filters(&filters).await;
        }
    }

    async fn resolve(&self, load: PendingLoad) -> (View, Settled) {
        match load {
            PendingLoad::Overview(t) => (View::Overview, self.overview.load(t).await),
            PendingLoad::Metrics(t) => (View::Metrics, self.metrics.load(t).await),
            PendingLoad::Keys(t) => (View::Keys, self.keys.load(t).await),
            PendingLoad::Activity(t) => (View::Activity, self.activity.load(t).await),
        }
    }

    // ── Intents ──────────────────────────────────────────────────────

    /// Menu navigation. Analytics views carry the current range; Keys and
    /// Activity restore their last-used filters.
    pub async fn open(&self, view: View) -> Vec<(View, Settled)> {
        let query = {
            let state = self.lock();
            match view {
                View::Overview | View::Metrics => state.range.carry(QueryParams::new()),
                View::Keys => state.key_filters.state().to_query(),
                View::Activity => state.activity_filters.applied().to_query(),
            }
        };
        self.router.navigate(view, query, NavigateOptions::PUSH);
        self.pump().await
    }

    /// Jump to an address, as if typed into the address bar.
    pub async fn open_location(&self, fragment: &str) -> Vec<(View, Settled)> {
        self.router.set_fragment(fragment);
        self.pump().await
    }

    pub async fn set_range(&self, range: AnalyticsRange) -> Vec<(View, Settled)> {
        self.lock().range.set(range, &self.router);
        self.pump().await
    }

    /// Live edit of the key filters.
    pub async fn edit_key_filters(&self, next: KeyFilters) -> Vec<(View, Settled)> {
        self.lock().key_filters.edit(next, &self.router);
        self.pump().await
    }

    /// Edit the activity draft. Nothing is fetched or navigated.
    pub fn edit_activity_draft(&self, edit: impl FnOnce(&mut ActivityFilters)) {
        self.lock().activity_filters.edit_draft(edit);
    }

    pub async fn apply_activity_filters(&self) -> Vec<(View, Settled)> {
        self.lock().activity_filters.apply(&self.router);
        self.pump().await
    }

    pub async fn reset_activity_filters(&self) -> Vec<(View, Settled)> {
        self.lock().activity_filters.reset(&self.router);
        self.pump().await
    }

    /// Refetch the active view.
    pub async fn refresh(&self) -> Option<Settled> {
        let view = self.lock().mounted?;
        let load = match view {
            View::Overview => self.overview.refresh().map(PendingLoad::Overview),
            View::Metrics => self.metrics.refresh().map(PendingLoad::Metrics),
            View::Keys => self.keys.refresh().map(PendingLoad::Keys),
            View::Activity => self.activity.refresh().map(PendingLoad::Activity),
        }?;
        let (_, settled) = self.resolve(load).await;
        if settled == Settled::LoggedOut {
            self.pump().await;
        }
        Some(settled)
    }

    /// Sign in and load the active view.
    ///
    /// # Errors
    ///
    /// See [`SessionGuard::login`].
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let result = self.session.login(email, password).await;
        self.pump().await;
        result
    }

    /// Create an account, sign in and load the active view.
    ///
    /// # Errors
    ///
    /// See [`SessionGuard::register`].
    pub async fn register(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let result = self.session.register(email, password).await;
        self.pump().await;
        result
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.pump().await;
    }

    pub async fn create_key(&self, label: &str, env: Environment) -> MutationOutcome {
        let outcome = self.keys.create_key(label, env).await;
        self.after_mutation(outcome).await
    }

    pub async fn rotate_key(&self, id: &str) -> MutationOutcome {
        let outcome = self.keys.rotate(id).await;
        self.after_mutation(outcome).await
    }

    pub async fn revoke_key(&self, id: &str, confirm: &dyn Confirm) -> MutationOutcome {
        let outcome = self.keys.revoke(id, confirm).await;
        self.after_mutation(outcome).await
    }

    pub async fn activate_key(&self, id: &str) -> MutationOutcome {
        let outcome = self.keys.activate(id).await;
        self.after_mutation(outcome).await
    }

    /// A mutation can succeed while its refetch ends the session, so this
    /// checks the session rather than the outcome alone.
    async fn after_mutation(&self, outcome: MutationOutcome) -> MutationOutcome {
        let signed_out = !self.session.state().is_authenticated();
        if outcome == MutationOutcome::LoggedOut || (signed_out && self.active_view().is_some()) {
            self.pump().await;
        }
        outcome
    }

    /// Persist the current address so the next run resumes there.
    pub async fn save_location(&self) {
        self.prefs.set_location(&self.router.fragment()).await;
    }

    // ── Accessors ────────────────────────────────────────────────────

    #[must_use]
    pub fn route(&self) -> Route {
        self.router.read()
    }

    #[must_use]
    pub fn router(&self) -> &Arc<HashRouter> {
        &self.router
    }

    #[must_use]
    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.session.state()
    }

    /// The view whose controller is mounted, if signed in.
    #[must_use]
    pub fn active_view(&self) -> Option<View> {
        self.lock().mounted
    }

    #[must_use]
    pub fn range(&self) -> AnalyticsRange {
        self.lock().range.range()
    }

    #[must_use]
    pub fn key_filters(&self) -> KeyFilters {
        self.lock().key_filters.state().clone()
    }

    #[must_use]
    pub fn activity_draft(&self) -> ActivityFilters {
        self.lock().activity_filters.draft().clone()
    }

    #[must_use]
    pub fn activity_applied(&self) -> ActivityFilters {
        self.lock().activity_filters.applied().clone()
    }

    #[must_use]
    pub fn has_pending_activity_changes(&self) -> bool {
        self.lock().activity_filters.has_pending_changes()
    }

    #[must_use]
    pub fn overview(&self) -> &OverviewController {
        &self.overview
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricsController {
        &self.metrics
    }

    #[must_use]
    pub fn keys(&self) -> &KeysController {
        &self.keys
    }

    #[must_use]
    pub fn activity(&self) -> &ActivityController {
        &self.activity
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.router.remove_listener(self.listener);
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("route", &self.router.fragment())
            .field("auth", &self.session.state())
            .field("mounted", &self.active_view())
            .finish_non_exhaustive()
    }
}
