//! The four dashboard views as [`ViewSource`]s.

use crate::api::{ActivityEvent, ApiKeyRecord, DashboardApi, Metrics, Overview};
use crate::controller::{ViewDataController, ViewSource};
use crate::error::ApiError;
use crate::filters::{ActivityFilters, AnalyticsRange, RouteFilters};
use crate::route::View;
use crate::session::Session;

/// Aggregate counters for the selected range.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverviewSource;

#[async_trait::async_trait]
impl ViewSource for OverviewSource {
    type Filters = AnalyticsRange;
    type Data = Overview;

    const VIEW: View = View::Overview;

    async fn fetch(
        &self,
        api: &dyn DashboardApi,
        session: &Session,
        range: &AnalyticsRange,
    ) -> Result<Overview, ApiError> {
        api.overview(session, *range).await
    }
}

/// Trend and breakdowns for the selected range.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSource;

#[async_trait::async_trait]
impl ViewSource for MetricsSource {
    type Filters = AnalyticsRange;
    type Data = Metrics;

    const VIEW: View = View::Metrics;

    async fn fetch(
        &self,
        api: &dyn DashboardApi,
        session: &Session,
        range: &AnalyticsRange,
    ) -> Result<Metrics, ApiError> {
        api.metrics(session, *range).await
    }
}

/// The full key list. Key filters apply client-side, so they are not part
/// of the dependency key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeysSource;

#[async_trait::async_trait]
impl ViewSource for KeysSource {
    type Filters = ();
    type Data = Vec<ApiKeyRecord>;

    const VIEW: View = View::Keys;

    async fn fetch(
        &self,
        api: &dyn DashboardApi,
        session: &Session,
        _filters: &(),
    ) -> Result<Vec<ApiKeyRecord>, ApiError> {
        api.list_keys(session).await
    }
}

/// Activity events for the applied filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitySource;

#[async_trait::async_trait]
impl ViewSource for ActivitySource {
    type Filters = ActivityFilters;
    type Data = Vec<ActivityEvent>;

    const VIEW: View = View::Activity;

    fn canonical(filters: ActivityFilters) -> ActivityFilters {
        filters.normalize()
    }

    async fn fetch(
        &self,
        api: &dyn DashboardApi,
        session: &Session,
        filters: &ActivityFilters,
    ) -> Result<Vec<ActivityEvent>, ApiError> {
        api.activity(session, filters).await
    }
}

pub type OverviewController = ViewDataController<OverviewSource>;
pub type MetricsController = ViewDataController<MetricsSource>;
pub type ActivityController = ViewDataController<ActivitySource>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use portal_storage::MemoryStore;

    use super::*;
    use crate::controller::Settled;
    use crate::session::SessionGuard;
    use crate::testing::{ApiCall, Endpoint, ScriptedApi};

    async fn signed_in() -> (Arc<ScriptedApi>, Arc<SessionGuard>) {
        let api = Arc::new(ScriptedApi::new());
        let guard = Arc::new(SessionGuard::new(api.clone(), Arc::new(MemoryStore::new())));
        guard.login("owner@example.com", "long enough").await.unwrap();
        (api, guard)
    }

    #[tokio::test]
    async fn range_change_refetches_overview() {
        let (api, guard) = signed_in().await;
        let ctrl = OverviewController::new(OverviewSource, api.clone(), guard, AnalyticsRange::Last24h);
        assert_eq!(ctrl.mount_and_load().await, Settled::Applied);
        assert_eq!(ctrl.state().data.unwrap().range, "24h");

        let ticket = ctrl.set_filters(AnalyticsRange::Last30d).unwrap();
        assert_eq!(ctrl.load(ticket).await, Settled::Applied);
        assert_eq!(ctrl.state().data.unwrap().range, "30d");
        assert_eq!(api.call_count(Endpoint::Overview), 2);
    }

    #[tokio::test]
    async fn metrics_source_passes_range() {
        let (api, guard) = signed_in().await;
        let ctrl = MetricsController::new(MetricsSource, api.clone(), guard, AnalyticsRange::Last7d);
        assert_eq!(ctrl.mount_and_load().await, Settled::Applied);
        let last: ApiCall = api.calls().pop().unwrap();
        assert_eq!(last.endpoint, Endpoint::Metrics);
        assert_eq!(last.detail, "range=7d");
    }

    #[tokio::test]
    async fn activity_source_sends_applied_filters() {
        let (api, guard) = signed_in().await;
        let filters = ActivityFilters {
            action: " key ".to_owned(),
            limit: "2".to_owned(),
            ..ActivityFilters::default()
        };
        let ctrl = ActivityController::new(ActivitySource, api.clone(), guard, filters);
        assert_eq!(ctrl.mount_and_load().await, Settled::Applied);

        let events = ctrl.state().data.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.action.contains("key")));
        assert_eq!(api.calls().pop().unwrap().detail, "action=key&limit=2");
    }
}
