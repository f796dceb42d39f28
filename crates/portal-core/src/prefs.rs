//! Persisted view preferences: the analytics range, the last-used filters
//! and the last location.
//!
//! Reads are total (missing or corrupt values give defaults) and writes are
//! best-effort (failures are logged). Filters are stored in their query
//! string form so the stored and shared representations are the same.

use std::sync::Arc;

use portal_storage::StateStore;
use tracing::warn;

use crate::filters::{ActivityFilters, AnalyticsRange, KeyFilters, RouteFilters};
use crate::route::QueryParams;

pub const RANGE_KEY: &str = "portal.analytics.range";
pub const KEY_FILTERS_KEY: &str = "portal.filters.keys";
pub const ACTIVITY_FILTERS_KEY: &str = "portal.filters.activity";
pub const LOCATION_KEY: &str = "portal.location";

#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn StateStore>,
}

impl Preferences {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn range(&self) -> AnalyticsRange {
        let Some(raw) = self.read(RANGE_KEY).await else {
            return AnalyticsRange::default();
        };
        AnalyticsRange::parse(raw.trim()).unwrap_or_else(|| {
            warn!(value = %raw, "stored range invalid, using default");
            AnalyticsRange::default()
        })
    }

    pub async fn set_range(&self, range: AnalyticsRange) {
        self.write(RANGE_KEY, range.as_str()).await;
    }

    pub async fn key_filters(&self) -> KeyFilters {
        self.filters(KEY_FILTERS_KEY).await
    }

    pub async fn set_key_filters(&self, filters: &KeyFilters) {
        self.write(KEY_FILTERS_KEY, &filters.to_query().to_string()).await;
    }

    pub async fn activity_filters(&self) -> ActivityFilters {
        self.filters(ACTIVITY_FILTERS_KEY).await
    }

    pub async fn set_activity_filters(&self, filters: &ActivityFilters) {
        self.write(ACTIVITY_FILTERS_KEY, &filters.to_query().to_string())
            .await;
    }

    /// Last address fragment, if one was saved.
    pub async fn location(&self) -> Option<String> {
        self.read(LOCATION_KEY)
            .await
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
    }

    pub async fn set_location(&self, fragment: &str) {
        self.write(LOCATION_KEY, fragment).await;
    }

    async fn filters<F: RouteFilters>(&self, key: &str) -> F {
        self.read(key)
            .await
            .map(|raw| F::from_query(&QueryParams::parse(&raw)))
            .unwrap_or_default()
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "preference unreadable, using default");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.put(key, value).await {
            warn!(key, error = %e, "failed to persist preference");
        }
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}
