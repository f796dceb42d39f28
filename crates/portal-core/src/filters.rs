//! Per-view filter state and its total normalization.
//!
//! Every filter type maps any raw input (absent, malformed, out of range) to
//! a valid value, and encodes to query parameters that omit defaults, so the
//! all-defaults state is the empty query. Normalization is idempotent and
//! filter equality is always taken after normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{ApiKeyRecord, Environment};
use crate::route::QueryParams;

/// Default page size of the activity feed.
pub const DEFAULT_LIMIT: &str = "25";
/// Largest activity page the client will request.
pub const MAX_LIMIT: u32 = 100;

/// Filter state that lives in a route's query parameters.
pub trait RouteFilters: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Map to the canonical member of the type.
    #[must_use]
    fn normalize(&self) -> Self;

    /// Decode from query parameters. Absent parameters take their default;
    /// the result is already normalized.
    fn from_query(query: &QueryParams) -> Self;

    /// Encode the normalized state, omitting default-valued fields.
    fn to_query(&self) -> QueryParams;

    /// Field-wise equality after normalization.
    fn same_as(&self, other: &Self) -> bool {
        self.normalize() == other.normalize()
    }
}

// ── Analytics range ──────────────────────────────────────────────────

/// Time window shared by the overview and metrics views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalyticsRange {
    #[default]
    #[serde(rename = "24h")]
    Last24h,
    #[serde(rename = "7d")]
    Last7d,
    #[serde(rename = "30d")]
    Last30d,
}

impl AnalyticsRange {
    pub const ALL: [Self; 3] = [Self::Last24h, Self::Last7d, Self::Last30d];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last24h => "24h",
            Self::Last7d => "7d",
            Self::Last30d => "30d",
        }
    }

    /// `None` for anything that is not a known range.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw)
    }
}

impl fmt::Display for AnalyticsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Keys ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Revoked,
}

impl StatusFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Unknown values snap to [`StatusFilter::All`].
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "revoked" => Self::Revoked,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvFilter {
    #[default]
    All,
    Live,
    Test,
}

impl EnvFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Live => "live",
            Self::Test => "test",
        }
    }

    /// Unknown values snap to [`EnvFilter::All`].
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "live" => Self::Live,
            "test" => Self::Test,
            _ => Self::All,
        }
    }
}

/// Keys view filters. `query` keeps the user's raw text (trailing spaces
/// included) until it is normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilters {
    pub query: String,
    pub status: StatusFilter,
    pub env: EnvFilter,
}

impl KeyFilters {
    /// Whether a key passes these filters. The text query is a
    /// case-insensitive substring match over label, prefix and id.
    #[must_use]
    pub fn matches(&self, key: &ApiKeyRecord) -> bool {
        let needle = self.query.trim().to_lowercase();
        let matches_query = needle.is_empty()
            || [&key.label, &key.prefix, &key.id]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
        let matches_status = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => key.active,
            StatusFilter::Revoked => !key.active,
        };
        let matches_env = match self.env {
            EnvFilter::All => true,
            EnvFilter::Live => key.env == Environment::Live,
            EnvFilter::Test => key.env == Environment::Test,
        };
        matches_query && matches_status && matches_env
    }

    /// Whether every field is at its default.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.normalize() == Self::default()
    }
}

impl RouteFilters for KeyFilters {
    fn normalize(&self) -> Self {
        Self {
            query: self.query.trim().to_owned(),
            status: self.status,
            env: self.env,
        }
    }

    fn from_query(query: &QueryParams) -> Self {
        Self {
            query: query.get("q").unwrap_or_default().trim().to_owned(),
            status: query
                .get("status")
                .map_or(StatusFilter::All, StatusFilter::parse_or_default),
            env: query.get("env").map_or(EnvFilter::All, EnvFilter::parse_or_default),
        }
    }

    fn to_query(&self) -> QueryParams {
        let normalized = self.normalize();
        let mut params = QueryParams::new();
        if !normalized.query.is_empty() {
            params.set("q", normalized.query);
        }
        if normalized.status != StatusFilter::All {
            params.set("status", normalized.status.as_str());
        }
        if normalized.env != EnvFilter::All {
            params.set("env", normalized.env.as_str());
        }
        params
    }
}

// ── Activity ─────────────────────────────────────────────────────────

/// Activity outcome filter; [`ActivityStatus::Any`] is the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[default]
    #[serde(rename = "")]
    Any,
    Success,
    Info,
    Error,
}

impl ActivityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Success => "success",
            Self::Info => "info",
            Self::Error => "error",
        }
    }

    /// Unknown values snap to [`ActivityStatus::Any`].
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "success" => Self::Success,
            "info" => Self::Info,
            "error" => Self::Error,
            _ => Self::Any,
        }
    }
}

/// Activity view filters. `limit` is kept as text because the draft copy
/// holds whatever the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilters {
    pub status: ActivityStatus,
    pub action: String,
    pub limit: String,
}

impl Default for ActivityFilters {
    fn default() -> Self {
        Self {
            status: ActivityStatus::Any,
            action: String::new(),
            limit: DEFAULT_LIMIT.to_owned(),
        }
    }
}

impl ActivityFilters {
    /// The normalized limit as a number in `1..=100`.
    #[must_use]
    pub fn limit_value(&self) -> u32 {
        normalize_limit(&self.limit)
            .parse()
            .unwrap_or(25)
    }

    /// Parameters for the remote `activity` call. Unlike
    /// [`to_query`](RouteFilters::to_query), `limit` is always sent.
    #[must_use]
    pub fn api_query(&self) -> QueryParams {
        let normalized = self.normalize();
        let mut params = QueryParams::new();
        if normalized.status != ActivityStatus::Any {
            params.set("status", normalized.status.as_str());
        }
        if !normalized.action.is_empty() {
            params.set("action", normalized.action);
        }
        params.set("limit", normalized.limit);
        params
    }

    /// Human-readable description of the applied filters.
    #[must_use]
    pub fn summary(&self) -> ActivitySummary {
        let normalized = self.normalize();
        ActivitySummary {
            status: if normalized.status == ActivityStatus::Any {
                "all".to_owned()
            } else {
                normalized.status.as_str().to_owned()
            },
            action: if normalized.action.is_empty() {
                "any".to_owned()
            } else {
                normalized.action
            },
            limit: normalized.limit,
        }
    }
}

impl RouteFilters for ActivityFilters {
    fn normalize(&self) -> Self {
        Self {
            status: self.status,
            action: self.action.trim().to_owned(),
            limit: normalize_limit(&self.limit),
        }
    }

    fn from_query(query: &QueryParams) -> Self {
        Self {
            status: query
                .get("status")
                .map_or(ActivityStatus::Any, ActivityStatus::parse_or_default),
            action: query.get("action").unwrap_or_default().trim().to_owned(),
            limit: normalize_limit(query.get("limit").unwrap_or(DEFAULT_LIMIT)),
        }
    }

    fn to_query(&self) -> QueryParams {
        let normalized = self.normalize();
        let mut params = QueryParams::new();
        if normalized.status != ActivityStatus::Any {
            params.set("status", normalized.status.as_str());
        }
        if !normalized.action.is_empty() {
            params.set("action", normalized.action);
        }
        if normalized.limit != DEFAULT_LIMIT {
            params.set("limit", normalized.limit);
        }
        params
    }
}

/// Display form of applied activity filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySummary {
    pub status: String,
    pub action: String,
    pub limit: String,
}

impl fmt::Display for ActivitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={}, action={}, limit={}",
            self.status, self.action, self.limit
        )
    }
}

/// Clamp a raw limit into `1..=100`. Empty, unparsable, non-finite and
/// sub-one inputs fall back to the default; fractions are floored.
#[must_use]
pub fn normalize_limit(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 1.0 => {
            let clamped = n.floor().min(f64::from(MAX_LIMIT));
            // clamped is a whole number in 1..=100
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let whole = clamped as u32;
            whole.to_string()
        }
        _ => DEFAULT_LIMIT.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(status: ActivityStatus, action: &str, limit: &str) -> ActivityFilters {
        ActivityFilters {
            status,
            action: action.to_owned(),
            limit: limit.to_owned(),
        }
    }

    fn key(id: &str, label: &str, env: Environment, active: bool) -> ApiKeyRecord {
        ApiKeyRecord {
            id: id.to_owned(),
            label: label.to_owned(),
            prefix: format!("yf_{env}_••ab12"),
            env,
            active,
            last_used: "never".to_owned(),
        }
    }

    #[test]
    fn limit_normalization_table() {
        let cases = [
            ("25", "25"),
            ("1", "1"),
            ("100", "100"),
            ("150", "100"),
            ("999", "100"),
            ("10.9", "10"),
            (" 42 ", "42"),
            ("0", "25"),
            ("-3", "25"),
            ("0.5", "25"),
            ("abc", "25"),
            ("", "25"),
            ("inf", "25"),
            ("NaN", "25"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_limit(raw), expected, "limit {raw:?}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let activity_inputs = [
            activity(ActivityStatus::Error, "  deploy ", "999"),
            activity(ActivityStatus::Any, "", "abc"),
            activity(ActivityStatus::Info, "key.create", "0"),
            activity(ActivityStatus::Success, "\tx\n", "7.7"),
        ];
        for f in activity_inputs {
            let once = f.normalize();
            assert_eq!(once.normalize(), once, "{f:?}");
        }

        let key_inputs = [
            KeyFilters::default(),
            KeyFilters {
                query: "  Prod  ".to_owned(),
                status: StatusFilter::Revoked,
                env: EnvFilter::Live,
            },
        ];
        for f in key_inputs {
            let once = f.normalize();
            assert_eq!(once.normalize(), once, "{f:?}");
        }
    }

    #[test]
    fn defaults_encode_to_empty_query() {
        assert!(KeyFilters::default().to_query().is_empty());
        assert!(ActivityFilters::default().to_query().is_empty());
        assert_eq!(KeyFilters::from_query(&QueryParams::new()), KeyFilters::default());
        assert_eq!(
            ActivityFilters::from_query(&QueryParams::new()),
            ActivityFilters::default()
        );
    }

    #[test]
    fn key_filters_round_trip_through_query() {
        let filters = KeyFilters {
            query: "zapier trial".to_owned(),
            status: StatusFilter::Active,
            env: EnvFilter::Test,
        };
        let query = filters.to_query();
        assert_eq!(query.to_string(), "q=zapier%20trial&status=active&env=test");
        let reparsed = QueryParams::parse(&query.to_string());
        assert_eq!(KeyFilters::from_query(&reparsed), filters.normalize());
    }

    #[test]
    fn activity_filters_round_trip_through_query() {
        let filters = activity(ActivityStatus::Info, "usage.alert", "50").normalize();
        let reparsed = QueryParams::parse(&filters.to_query().to_string());
        assert_eq!(ActivityFilters::from_query(&reparsed), filters);
    }

    #[test]
    fn unknown_enum_values_snap_to_default() {
        let query = QueryParams::parse("status=deleted&env=staging&q=%20x%20");
        let filters = KeyFilters::from_query(&query);
        assert_eq!(filters.status, StatusFilter::All);
        assert_eq!(filters.env, EnvFilter::All);
        assert_eq!(filters.query, "x");

        let activity = ActivityFilters::from_query(&QueryParams::parse("status=warn&limit=500"));
        assert_eq!(activity.status, ActivityStatus::Any);
        assert_eq!(activity.limit, "100");
    }

    #[test]
    fn apply_scenario_clamps_limit_and_orders_query() {
        let mut draft = activity(ActivityStatus::Error, "deploy", "10");
        draft.limit = "999".to_owned();
        let applied = draft.normalize();
        assert_eq!(applied, activity(ActivityStatus::Error, "deploy", "100"));
        assert_eq!(
            applied.to_query().to_string(),
            "status=error&action=deploy&limit=100"
        );
    }

    #[test]
    fn equality_is_after_normalization() {
        let a = activity(ActivityStatus::Any, "deploy ", "25");
        let b = activity(ActivityStatus::Any, "deploy", "abc");
        assert_ne!(a, b);
        assert!(a.same_as(&b));
    }

    #[test]
    fn api_query_always_carries_limit() {
        assert_eq!(ActivityFilters::default().api_query().to_string(), "limit=25");
        assert_eq!(
            activity(ActivityStatus::Success, " key ", "5").api_query().to_string(),
            "status=success&action=key&limit=5"
        );
    }

    #[test]
    fn summary_names_wildcards() {
        assert_eq!(
            ActivityFilters::default().summary().to_string(),
            "status=all, action=any, limit=25"
        );
        assert_eq!(activity(ActivityStatus::Error, "x", "3").summary().status, "error");
    }

    #[test]
    fn key_matching_combines_all_fields() {
        let live = key("key_live_primary", "Primary production", Environment::Live, true);
        let test = key("key_test_zapier", "Zapier trial", Environment::Test, false);

        let by_text = KeyFilters {
            query: "  ZAPIER ".to_owned(),
            ..KeyFilters::default()
        };
        assert!(!by_text.matches(&live));
        assert!(by_text.matches(&test));

        let revoked = KeyFilters {
            status: StatusFilter::Revoked,
            ..KeyFilters::default()
        };
        assert!(revoked.matches(&test));
        assert!(!revoked.matches(&live));

        let live_only = KeyFilters {
            env: EnvFilter::Live,
            ..KeyFilters::default()
        };
        assert!(live_only.matches(&live));
        assert!(!live_only.matches(&test));

        let by_prefix = KeyFilters {
            query: "yf_live".to_owned(),
            ..KeyFilters::default()
        };
        assert!(by_prefix.matches(&live));
    }

    #[test]
    fn analytics_range_parse_is_strict() {
        assert_eq!(AnalyticsRange::parse("7d"), Some(AnalyticsRange::Last7d));
        assert_eq!(AnalyticsRange::parse("1y"), None);
        assert_eq!(AnalyticsRange::default().as_str(), "24h");
    }
}
