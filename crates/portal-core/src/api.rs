//! The remote dashboard API contract.
//!
//! The engine never talks HTTP directly; it depends on [`DashboardApi`]. The
//! production implementation is [`HttpApi`](crate::http::HttpApi); tests use
//! [`ScriptedApi`](crate::testing::ScriptedApi).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::filters::{ActivityFilters, AnalyticsRange};
use crate::session::Session;

/// Deployment environment of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    #[default]
    Test,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "live" => Some(Self::Live),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle transition applied to an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Rotate,
    Revoke,
    Activate,
}

impl KeyAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Revoke => "revoke",
            Self::Activate => "activate",
        }
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API key as listed by the remote store. `prefix` is already masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    pub id: String,
    pub label: String,
    pub prefix: String,
    pub env: Environment,
    pub active: bool,
    #[serde(default)]
    pub last_used: String,
}

/// One row of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub status: String,
    pub target: String,
}

/// Per-endpoint traffic line shared by overview and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub path: String,
    pub requests: u64,
    pub error_pct: f64,
    pub p95_ms: f64,
}

/// Aggregate counters for the overview view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub range: String,
    pub requests: u64,
    pub five_xx: u64,
    pub error_rate_pct: f64,
    pub p95_latency_ms: f64,
    #[serde(default)]
    pub top_endpoints: Vec<EndpointStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub requests: u64,
    pub error_rate_pct: f64,
    pub p95_latency_ms: f64,
    pub five_xx: u64,
}

/// Requests in one time bucket of the trend line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub requests: u64,
}

/// Share of requests per status class (`2xx`, `4xx`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusShare {
    pub status: String,
    pub requests: u64,
    pub pct: f64,
}

/// Share of requests per latency bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyShare {
    pub bucket: String,
    pub requests: u64,
    pub pct: f64,
}

/// Full analytics payload for the metrics view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub range: String,
    pub summary: MetricsSummary,
    #[serde(default)]
    pub request_trend: Vec<TrendPoint>,
    #[serde(default)]
    pub status_breakdown: Vec<StatusShare>,
    #[serde(default)]
    pub latency_buckets: Vec<LatencyShare>,
    #[serde(default)]
    pub top_endpoints: Vec<EndpointStat>,
}

/// Request/response contract of the remote dashboard API.
///
/// Every authenticated call receives the session whose token it must send;
/// a 401 must surface as [`ApiError::Unauthorized`].
#[async_trait::async_trait]
pub trait DashboardApi: Send + Sync + 'static {
    /// `POST auth/register`.
    async fn register(&self, email: &str, password: &str) -> Result<Session, ApiError>;

    /// `POST session/login`.
    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError>;

    /// `POST session/logout`.
    async fn logout(&self, session: &Session) -> Result<(), ApiError>;

    /// `GET session/me`: the server's canonical copy of the session.
    async fn current_session(&self, session: &Session) -> Result<Session, ApiError>;

    /// `GET overview?range=`.
    async fn overview(&self, session: &Session, range: AnalyticsRange) -> Result<Overview, ApiError>;

    /// `GET metrics?range=`.
    async fn metrics(&self, session: &Session, range: AnalyticsRange) -> Result<Metrics, ApiError>;

    /// `GET keys`.
    async fn list_keys(&self, session: &Session) -> Result<Vec<ApiKeyRecord>, ApiError>;

    /// `POST keys/create`.
    async fn create_key(&self, session: &Session, label: &str, env: Environment) -> Result<(), ApiError>;

    /// `POST keys/{id}/{action}`.
    async fn key_action(&self, session: &Session, id: &str, action: KeyAction) -> Result<(), ApiError>;

    /// `GET activity?status=&action=&limit=`, newest relevant first.
    async fn activity(
        &self,
        session: &Session,
        filters: &ActivityFilters,
    ) -> Result<Vec<ActivityEvent>, ApiError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_record_reads_camel_case() {
        let record: ApiKeyRecord = serde_json::from_str(
            r#"{"id":"key_live_primary","label":"Primary production","prefix":"yf_live_••••","env":"live","active":true,"lastUsed":"5m ago"}"#,
        )
        .unwrap();
        assert_eq!(record.env, Environment::Live);
        assert_eq!(record.last_used, "5m ago");
    }

    #[test]
    fn metrics_tolerates_missing_breakdowns() {
        let metrics: Metrics = serde_json::from_str(
            r#"{"range":"7d","summary":{"requests":90587,"errorRatePct":0.58,"p95LatencyMs":191,"fiveXx":55}}"#,
        )
        .unwrap();
        assert_eq!(metrics.summary.five_xx, 55);
        assert!(metrics.request_trend.is_empty());
    }

    #[test]
    fn overview_endpoints_have_optional_method() {
        let overview: Overview = serde_json::from_str(
            r#"{"range":"24h","requests":12842,"fiveXx":9,"errorRatePct":0.62,"p95LatencyMs":184,
                "topEndpoints":[{"path":"/v1/quotes","requests":1732,"errorPct":0.78,"p95Ms":201}]}"#,
        )
        .unwrap();
        assert_eq!(overview.top_endpoints[0].method, None);
    }
}
