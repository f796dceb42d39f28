//! Reconciliation between editable filter state and the route query.
//!
//! Every write-back is guarded by a comparison of canonical query encodings,
//! so a write that would not change the route never happens and an incoming
//! route that matches local state never overwrites it. That guard is what
//! keeps the route-change/state-change cycle from looping.

use crate::filters::{AnalyticsRange, RouteFilters};
use crate::route::{QueryParams, Route, View};
use crate::router::{HashRouter, NavigateOptions};

/// Query parameter carrying the analytics range.
pub const RANGE_PARAM: &str = "range";

/// Live policy: every local edit is written to the route immediately with
/// `replace`, so typing does not flood history.
#[derive(Debug, Clone)]
pub struct LiveSync<F> {
    view: View,
    state: F,
}

impl<F: RouteFilters> LiveSync<F> {
    #[must_use]
    pub fn new(view: View) -> Self {
        Self::with_state(view, F::default())
    }

    #[must_use]
    pub fn with_state(view: View, state: F) -> Self {
        Self { view, state }
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    /// Local state as the user entered it (not normalized).
    #[must_use]
    pub fn state(&self) -> &F {
        &self.state
    }

    /// Adopt a local edit and write it through. Returns whether the route
    /// was written.
    pub fn edit(&mut self, next: F, router: &HashRouter) -> bool {
        self.state = next;
        self.reconcile_to_route(router)
    }

    /// Write the normalized local state to the route if the route is on this
    /// view and its canonical query differs.
    pub fn reconcile_to_route(&self, router: &HashRouter) -> bool {
        let route = router.read();
        if route.view != self.view {
            return false;
        }
        let desired = self.state.to_query();
        if desired == F::from_query(&route.query).to_query() {
            return false;
        }
        router.navigate(self.view, desired, NavigateOptions::REPLACE);
        true
    }

    /// Adopt an incoming route unless it already matches local state.
    /// Returns whether local state changed.
    pub fn on_route_change(&mut self, route: &Route) -> bool {
        if route.view != self.view {
            return false;
        }
        let incoming = F::from_query(&route.query);
        if self.state.same_as(&incoming) {
            return false;
        }
        self.state = incoming;
        true
    }
}

/// Draft/apply policy: edits stay in the draft until an explicit apply.
/// Only the applied copy drives fetches.
#[derive(Debug, Clone)]
pub struct DraftApplySync<F> {
    view: View,
    draft: F,
    applied: F,
}

impl<F: RouteFilters> DraftApplySync<F> {
    #[must_use]
    pub fn new(view: View) -> Self {
        Self::with_applied(view, F::default())
    }

    /// Start with both copies set to the normalized `applied`.
    #[must_use]
    pub fn with_applied(view: View, applied: F) -> Self {
        let applied = applied.normalize();
        Self {
            view,
            draft: applied.clone(),
            applied,
        }
    }

    #[must_use]
    pub fn draft(&self) -> &F {
        &self.draft
    }

    #[must_use]
    pub fn applied(&self) -> &F {
        &self.applied
    }

    /// Modify the draft. Never touches the applied copy or the route.
    pub fn edit_draft(&mut self, edit: impl FnOnce(&mut F)) {
        edit(&mut self.draft);
    }

    /// Whether the draft differs from what is applied.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.draft.same_as(&self.applied)
    }

    /// Normalize the draft, make it the applied state and push it to the
    /// route. Returns whether the applied state changed.
    pub fn apply(&mut self, router: &HashRouter) -> bool {
        let next = self.draft.normalize();
        self.draft = next.clone();
        let changed = !self.applied.same_as(&next);
        router.navigate(self.view, next.to_query(), NavigateOptions::PUSH);
        self.applied = next;
        changed
    }

    /// Restore defaults in both copies and clear the route query.
    /// Returns whether the applied state changed.
    pub fn reset(&mut self, router: &HashRouter) -> bool {
        let changed = !self.applied.same_as(&F::default());
        self.draft = F::default();
        self.applied = F::default();
        router.navigate(self.view, QueryParams::new(), NavigateOptions::PUSH);
        changed
    }

    /// Adopt an incoming route into each copy that differs from it.
    /// Returns whether the applied copy changed.
    pub fn on_route_change(&mut self, route: &Route) -> bool {
        if route.view != self.view {
            return false;
        }
        let incoming = F::from_query(&route.query);
        if !self.draft.same_as(&incoming) {
            self.draft = incoming.clone();
        }
        if self.applied.same_as(&incoming) {
            return false;
        }
        self.applied = incoming;
        true
    }
}

/// The `range` parameter shared by the analytics views.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeSync {
    range: AnalyticsRange,
}

impl RangeSync {
    #[must_use]
    pub fn new(range: AnalyticsRange) -> Self {
        Self { range }
    }

    #[must_use]
    pub fn range(&self) -> AnalyticsRange {
        self.range
    }

    /// On an analytics route, adopt a valid range that differs from ours, or
    /// rewrite a missing or invalid one in place. Returns whether the range
    /// changed.
    pub fn on_route_change(&mut self, route: &Route, router: &HashRouter) -> bool {
        if !route.view.is_analytics() {
            return false;
        }
        match route.query.get(RANGE_PARAM).and_then(AnalyticsRange::parse) {
            Some(range) if range != self.range => {
                self.range = range;
                true
            }
            Some(_) => false,
            None => {
                self.write_back(route, router);
                false
            }
        }
    }

    /// Choose a range. On an analytics route the new value is written with
    /// `replace`. Returns whether the range changed.
    pub fn set(&mut self, range: AnalyticsRange, router: &HashRouter) -> bool {
        if range == self.range {
            return false;
        }
        self.range = range;
        let route = router.read();
        if route.view.is_analytics() {
            self.write_back(&route, router);
        }
        true
    }

    /// Query for menu navigation to an analytics view: `base` with our range.
    #[must_use]
    pub fn carry(&self, base: QueryParams) -> QueryParams {
        base.with(RANGE_PARAM, self.range.as_str())
    }

    fn write_back(&self, route: &Route, router: &HashRouter) {
        router.navigate(route.view, self.carry(route.query.clone()), NavigateOptions::REPLACE);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::filters::{
        ActivityFilters, ActivityStatus, EnvFilter, KeyFilters, StatusFilter,
    };

    fn counting(router: &HashRouter) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        router.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn live_edit_writes_with_replace() {
        let router = HashRouter::new("#/keys");
        let mut sync = LiveSync::<KeyFilters>::new(View::Keys);

        let wrote = sync.edit(
            KeyFilters {
                query: "zap".to_owned(),
                ..KeyFilters::default()
            },
            &router,
        );
        assert!(wrote);
        assert_eq!(router.fragment(), "#/keys?q=zap");
        assert_eq!(router.history_len(), 1);
    }

    #[test]
    fn live_edit_that_normalizes_to_current_route_is_not_written() {
        let router = HashRouter::new("#/keys?q=zap");
        let changes = counting(&router);
        let mut sync = LiveSync::with_state(
            View::Keys,
            KeyFilters {
                query: "zap".to_owned(),
                ..KeyFilters::default()
            },
        );

        // trailing space typed by the user
        let wrote = sync.edit(
            KeyFilters {
                query: "zap ".to_owned(),
                ..KeyFilters::default()
            },
            &router,
        );
        assert!(!wrote);
        assert_eq!(sync.state().query, "zap ");
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn live_sync_adopts_route_only_on_difference() {
        let mut sync = LiveSync::with_state(
            View::Keys,
            KeyFilters {
                query: "zap ".to_owned(),
                ..KeyFilters::default()
            },
        );
        assert!(!sync.on_route_change(&Route::parse("#/keys?q=zap")));
        assert_eq!(sync.state().query, "zap ");

        assert!(sync.on_route_change(&Route::parse("#/keys?status=revoked&env=live")));
        assert_eq!(
            sync.state(),
            &KeyFilters {
                query: String::new(),
                status: StatusFilter::Revoked,
                env: EnvFilter::Live,
            }
        );
        assert!(!sync.on_route_change(&Route::parse("#/activity?status=error")));
    }

    #[test]
    fn live_sync_stays_quiet_on_other_views() {
        let router = HashRouter::new("#/overview");
        let sync = LiveSync::with_state(
            View::Keys,
            KeyFilters {
                status: StatusFilter::Active,
                ..KeyFilters::default()
            },
        );
        assert!(!sync.reconcile_to_route(&router));
        assert_eq!(router.fragment(), "#/overview");
    }

    #[test]
    fn live_sync_rewrites_messy_route_only_after_local_edit() {
        let router = HashRouter::new("#/keys?status=bogus&q=%20x%20");
        let mut sync = LiveSync::<KeyFilters>::new(View::Keys);
        assert!(sync.on_route_change(&router.read()));
        assert!(!sync.reconcile_to_route(&router));
        assert_eq!(router.fragment(), "#/keys?status=bogus&q=%20x%20");

        let next = KeyFilters {
            query: " y ".to_owned(),
            ..sync.state().clone()
        };
        assert!(sync.edit(next, &router));
        assert_eq!(router.fragment(), "#/keys?q=y");
        assert!(!sync.reconcile_to_route(&router));
    }

    #[test]
    fn draft_edits_do_not_touch_applied_or_route() {
        let router = HashRouter::new("#/activity");
        let changes = counting(&router);
        let mut sync = DraftApplySync::<ActivityFilters>::new(View::Activity);

        sync.edit_draft(|d| d.action = "deploy".to_owned());
        assert!(sync.has_pending_changes());
        assert_eq!(sync.applied(), &ActivityFilters::default());
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn apply_normalizes_and_pushes() {
        let router = HashRouter::new("#/activity");
        let mut sync = DraftApplySync::with_applied(
            View::Activity,
            ActivityFilters {
                status: ActivityStatus::Error,
                action: "deploy".to_owned(),
                limit: "10".to_owned(),
            },
        );
        sync.edit_draft(|d| d.limit = "999".to_owned());

        assert!(sync.apply(&router));
        let expected = ActivityFilters {
            status: ActivityStatus::Error,
            action: "deploy".to_owned(),
            limit: "100".to_owned(),
        };
        assert_eq!(sync.applied(), &expected);
        assert_eq!(sync.draft(), &expected);
        assert!(!sync.has_pending_changes());
        assert_eq!(router.fragment(), "#/activity?status=error&action=deploy&limit=100");
        assert_eq!(router.history_len(), 2);
    }

    #[test]
    fn reapplying_same_filters_reports_no_change() {
        let router = HashRouter::new("#/activity");
        let mut sync = DraftApplySync::<ActivityFilters>::new(View::Activity);
        sync.edit_draft(|d| d.action = "  ".to_owned());
        assert!(!sync.apply(&router));
        assert_eq!(router.history_len(), 1);
    }

    #[test]
    fn reset_restores_defaults_and_clears_query() {
        let router = HashRouter::new("#/activity?status=info&limit=5");
        let mut sync = DraftApplySync::<ActivityFilters>::new(View::Activity);
        assert!(sync.on_route_change(&router.read()));
        sync.edit_draft(|d| d.action = "key".to_owned());

        assert!(sync.reset(&router));
        assert_eq!(sync.draft(), &ActivityFilters::default());
        assert_eq!(sync.applied(), &ActivityFilters::default());
        assert_eq!(router.fragment(), "#/activity");
    }

    #[test]
    fn incoming_route_updates_both_copies() {
        let mut sync = DraftApplySync::<ActivityFilters>::new(View::Activity);
        sync.edit_draft(|d| d.action = "deploy".to_owned());

        assert!(sync.on_route_change(&Route::parse("#/activity?status=success")));
        assert_eq!(sync.applied().status, ActivityStatus::Success);
        assert_eq!(sync.draft(), sync.applied());

        // same filters again: nothing changes
        assert!(!sync.on_route_change(&Route::parse("#/activity?status=success&limit=25")));
    }

    #[test]
    fn range_adopts_valid_route_value() {
        let router = HashRouter::new("#/metrics?range=7d");
        let mut sync = RangeSync::default();
        assert!(sync.on_route_change(&router.read(), &router));
        assert_eq!(sync.range(), AnalyticsRange::Last7d);
        assert_eq!(router.fragment(), "#/metrics?range=7d");
    }

    #[test]
    fn range_rewrites_missing_or_invalid_value_in_place() {
        let router = HashRouter::new("#/overview?range=1y&x=1");
        let mut sync = RangeSync::new(AnalyticsRange::Last30d);
        assert!(!sync.on_route_change(&router.read(), &router));
        assert_eq!(router.fragment(), "#/overview?range=30d&x=1");
        assert_eq!(router.history_len(), 1);
    }

    #[test]
    fn range_ignores_non_analytics_routes() {
        let router = HashRouter::new("#/keys?range=7d");
        let mut sync = RangeSync::default();
        assert!(!sync.on_route_change(&router.read(), &router));
        assert_eq!(sync.range(), AnalyticsRange::Last24h);
    }

    #[test]
    fn setting_range_writes_back_on_analytics_views_only() {
        let router = HashRouter::new("#/overview?range=24h");
        let mut sync = RangeSync::default();
        assert!(sync.set(AnalyticsRange::Last7d, &router));
        assert_eq!(router.fragment(), "#/overview?range=7d");
        assert!(!sync.set(AnalyticsRange::Last7d, &router));

        let router = HashRouter::new("#/keys");
        assert!(sync.set(AnalyticsRange::Last30d, &router));
        assert_eq!(router.fragment(), "#/keys");
    }
}
