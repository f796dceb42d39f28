//! An in-process [`DashboardApi`] for tests and demos.
//!
//! [`ScriptedApi`] behaves like the real dashboard backend's mock store (two
//! seeded keys, fixed analytics per range, four activity events) and adds
//! hooks for tests: every call is recorded, failures can be queued per
//! endpoint, and a [`Gate`] holds the next response of an endpoint until the
//! test releases it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::oneshot;

use crate::api::{
    ActivityEvent, ApiKeyRecord, DashboardApi, EndpointStat, Environment, KeyAction, LatencyShare,
    Metrics, MetricsSummary, Overview, StatusShare, TrendPoint,
};
use crate::error::ApiError;
use crate::filters::{ActivityFilters, ActivityStatus, AnalyticsRange, RouteFilters};
use crate::keys::MAX_LABEL_LEN;
use crate::session::Session;

/// Tenant assigned to every session the fake issues.
pub const DEMO_TENANT: &str = "tenant_demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Register,
    Login,
    Logout,
    CurrentSession,
    Overview,
    Metrics,
    ListKeys,
    CreateKey,
    KeyAction,
    Activity,
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub endpoint: Endpoint,
    /// Bearer token sent, for authenticated endpoints.
    pub token: Option<String>,
    /// Endpoint-specific summary of the arguments, e.g. `range=7d`.
    pub detail: String,
}

/// Holds one response until released. Dropping the gate releases it too.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        // the request may already be gone
        let _ = self.0.send(());
    }
}

struct Inner {
    calls: Vec<ApiCall>,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    gates: HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>,
    scripted_sessions: VecDeque<Session>,
    valid_tokens: HashSet<String>,
    token_seq: u64,
    key_seq: u64,
    keys: Vec<ApiKeyRecord>,
}

/// Scriptable fake of the dashboard backend.
pub struct ScriptedApi {
    inner: Mutex<Inner>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: Vec::new(),
                failures: HashMap::new(),
                gates: HashMap::new(),
                scripted_sessions: VecDeque::new(),
                valid_tokens: HashSet::new(),
                token_seq: 0,
                key_seq: 0,
                keys: seed_keys(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a valid session without recording a call.
    pub fn issue_session(&self, email: &str) -> Session {
        let mut inner = self.lock();
        issue(&mut inner, email)
    }

    /// The next login, register or session lookup returns `session` instead
    /// of the usual one.
    pub fn next_session(&self, session: Session) {
        self.lock().scripted_sessions.push_back(session);
    }

    /// Invalidate every issued token; authenticated calls then answer 401.
    pub fn expire_sessions(&self) {
        self.lock().valid_tokens.clear();
    }

    /// The next call to `endpoint` fails with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        self.lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Hold the next response of `endpoint` until the gate is released.
    pub fn gate_next(&self, endpoint: Endpoint) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.lock().gates.entry(endpoint).or_default().push_back(rx);
        Gate(tx)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    /// Current server-side key store.
    #[must_use]
    pub fn keys(&self) -> Vec<ApiKeyRecord> {
        self.lock().keys.clone()
    }

    /// Record the call, then wait on any gate, then report a queued failure
    /// or an invalid token.
    async fn enter(&self, endpoint: Endpoint, token: Option<&str>, detail: String) -> Result<(), ApiError> {
        let (failure, gate) = {
            let mut inner = self.lock();
            inner.calls.push(ApiCall {
                endpoint,
                token: token.map(str::to_owned),
                detail,
            });
            let failure = inner.failures.get_mut(&endpoint).and_then(VecDeque::pop_front);
            let gate = inner.gates.get_mut(&endpoint).and_then(VecDeque::pop_front);
            (failure, gate)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        if let Some(token) = token {
            if !self.lock().valid_tokens.contains(token) {
                return Err(ApiError::Unauthorized {
                    message: "Session expired or invalid.".to_owned(),
                });
            }
        }
        Ok(())
    }

    fn sign_in(&self, email: &str) -> Session {
        let mut inner = self.lock();
        match inner.scripted_sessions.pop_front() {
            Some(session) => {
                if session.has_token() {
                    inner.valid_tokens.insert(session.token.clone());
                }
                session
            }
            None => issue(&mut inner, email),
        }
    }
}

fn issue(inner: &mut Inner, email: &str) -> Session {
    inner.token_seq += 1;
    let token = format!("tok-{}", inner.token_seq);
    inner.valid_tokens.insert(token.clone());
    Session::new(token, email, DEMO_TENANT)
}

fn seed_keys() -> Vec<ApiKeyRecord> {
    vec![
        ApiKeyRecord {
            id: "key_live_primary".to_owned(),
            label: "Primary production".to_owned(),
            prefix: "yf_live_••••".to_owned(),
            env: Environment::Live,
            active: true,
            last_used: "5m ago".to_owned(),
        },
        ApiKeyRecord {
            id: "key_test_zapier".to_owned(),
            label: "Zapier trial".to_owned(),
            prefix: "yf_test_••••".to_owned(),
            env: Environment::Test,
            active: true,
            last_used: "42m ago".to_owned(),
        },
    ]
}

fn masked_prefix(env: Environment, seq: u64) -> String {
    format!("yf_{env}_••{:04x}", seq & 0xffff)
}

fn endpoints(scale: u64, with_method: bool) -> Vec<EndpointStat> {
    [
        ("/v1/quote/{symbol}", 8120, 0.41, 142.0),
        ("/v1/history/{symbol}", 2990, 0.95, 246.0),
        ("/v1/quotes", 1732, 0.78, 201.0),
    ]
    .into_iter()
    .map(|(path, requests, error_pct, p95_ms)| EndpointStat {
        method: with_method.then(|| "GET".to_owned()),
        path: path.to_owned(),
        requests: requests * scale,
        error_pct,
        p95_ms,
    })
    .collect()
}

fn scale(range: AnalyticsRange) -> u64 {
    match range {
        AnalyticsRange::Last24h => 1,
        AnalyticsRange::Last7d => 7,
        AnalyticsRange::Last30d => 30,
    }
}

fn summary(range: AnalyticsRange) -> MetricsSummary {
    match range {
        AnalyticsRange::Last24h => MetricsSummary {
            requests: 12_842,
            error_rate_pct: 0.62,
            p95_latency_ms: 184.0,
            five_xx: 9,
        },
        AnalyticsRange::Last7d => MetricsSummary {
            requests: 90_587,
            error_rate_pct: 0.58,
            p95_latency_ms: 191.0,
            five_xx: 55,
        },
        AnalyticsRange::Last30d => MetricsSummary {
            requests: 381_204,
            error_rate_pct: 0.71,
            p95_latency_ms: 203.0,
            five_xx: 320,
        },
    }
}

fn trend(range: AnalyticsRange) -> Vec<TrendPoint> {
    let buckets: &[&str] = match range {
        AnalyticsRange::Last24h => &["00:00", "04:00", "08:00", "12:00", "16:00", "20:00"],
        AnalyticsRange::Last7d => &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"],
        AnalyticsRange::Last30d => &["Week 1", "Week 2", "Week 3", "Week 4"],
    };
    let total = summary(range).requests;
    let per_bucket = total / u64::try_from(buckets.len()).unwrap_or(1);
    buckets
        .iter()
        .map(|bucket| TrendPoint {
            bucket: (*bucket).to_owned(),
            requests: per_bucket,
        })
        .collect()
}

fn activity_events() -> Vec<ActivityEvent> {
    let now = Utc::now().to_rfc3339();
    [
        ("system", "key.rotate", "success", "key_live_primary"),
        ("owner@example.com", "key.create", "success", "Zapier sandbox"),
        ("system", "usage.alert", "info", "p95 latency spike"),
        ("system", "key.rotate", "error", "key_test_zapier"),
    ]
    .into_iter()
    .map(|(actor, action, status, target)| ActivityEvent {
        timestamp: now.clone(),
        actor: actor.to_owned(),
        action: action.to_owned(),
        status: status.to_owned(),
        target: target.to_owned(),
    })
    .collect()
}

#[async_trait::async_trait]
impl DashboardApi for ScriptedApi {
    async fn register(&self, email: &str, _password: &str) -> Result<Session, ApiError> {
        self.enter(Endpoint::Register, None, email.to_owned()).await?;
        Ok(self.sign_in(email))
    }

    async fn login(&self, email: &str, _password: &str) -> Result<Session, ApiError> {
        self.enter(Endpoint::Login, None, email.to_owned()).await?;
        Ok(self.sign_in(email))
    }

    async fn logout(&self, session: &Session) -> Result<(), ApiError> {
        self.enter(Endpoint::Logout, Some(&session.token), String::new()).await?;
        self.lock().valid_tokens.remove(&session.token);
        Ok(())
    }

    async fn current_session(&self, session: &Session) -> Result<Session, ApiError> {
        self.enter(Endpoint::CurrentSession, Some(&session.token), String::new())
            .await?;
        let mut inner = self.lock();
        match inner.scripted_sessions.pop_front() {
            Some(next) => {
                if next.has_token() {
                    inner.valid_tokens.insert(next.token.clone());
                }
                Ok(next)
            }
            None => Ok(session.clone()),
        }
    }

    async fn overview(&self, session: &Session, range: AnalyticsRange) -> Result<Overview, ApiError> {
        self.enter(Endpoint::Overview, Some(&session.token), format!("range={range}"))
            .await?;
        let summary = summary(range);
        Ok(Overview {
            range: range.to_string(),
            requests: summary.requests,
            five_xx: summary.five_xx,
            error_rate_pct: summary.error_rate_pct,
            p95_latency_ms: summary.p95_latency_ms,
            top_endpoints: endpoints(scale(range), false),
        })
    }

    async fn metrics(&self, session: &Session, range: AnalyticsRange) -> Result<Metrics, ApiError> {
        self.enter(Endpoint::Metrics, Some(&session.token), format!("range={range}"))
            .await?;
        let summary = summary(range);
        let total = summary.requests.max(1);
        #[allow(clippy::cast_precision_loss)]
        let pct = |n: u64| (n as f64 * 10_000.0 / total as f64).round() / 100.0;
        let four_xx = total / 40;
        let two_xx = total.saturating_sub(four_xx + summary.five_xx);
        Ok(Metrics {
            range: range.to_string(),
            request_trend: trend(range),
            status_breakdown: [("2xx", two_xx), ("4xx", four_xx), ("5xx", summary.five_xx)]
                .into_iter()
                .map(|(status, requests)| StatusShare {
                    status: status.to_owned(),
                    requests,
                    pct: pct(requests),
                })
                .collect(),
            latency_buckets: [("0-100ms", 47), ("101-250ms", 39), ("251-500ms", 12), (">500ms", 2)]
                .into_iter()
                .map(|(bucket, share)| LatencyShare {
                    bucket: bucket.to_owned(),
                    requests: total * share / 100,
                    pct: pct(total * share / 100),
                })
                .collect(),
            top_endpoints: endpoints(scale(range), true),
            summary,
        })
    }

    async fn list_keys(&self, session: &Session) -> Result<Vec<ApiKeyRecord>, ApiError> {
        self.enter(Endpoint::ListKeys, Some(&session.token), String::new())
            .await?;
        Ok(self.keys())
    }

    async fn create_key(&self, session: &Session, label: &str, env: Environment) -> Result<(), ApiError> {
        self.enter(
            Endpoint::CreateKey,
            Some(&session.token),
            format!("label={label}&env={env}"),
        )
        .await?;
        let label = label.trim();
        let len = label.chars().count();
        if len == 0 || len > MAX_LABEL_LEN {
            return Err(ApiError::from_status(
                422,
                format!("Label must be between 1 and {MAX_LABEL_LEN} characters."),
            ));
        }
        let mut inner = self.lock();
        inner.key_seq += 1;
        let seq = inner.key_seq;
        inner.keys.push(ApiKeyRecord {
            id: format!("key_{seq:010x}"),
            label: label.to_owned(),
            prefix: masked_prefix(env, seq),
            env,
            active: true,
            last_used: "never".to_owned(),
        });
        Ok(())
    }

    async fn key_action(&self, session: &Session, id: &str, action: KeyAction) -> Result<(), ApiError> {
        self.enter(Endpoint::KeyAction, Some(&session.token), format!("{id}/{action}"))
            .await?;
        let mut inner = self.lock();
        inner.key_seq += 1;
        let seq = inner.key_seq;
        let Some(key) = inner.keys.iter_mut().find(|k| k.id == id) else {
            return Err(ApiError::from_status(404, format!("Key '{id}' was not found.")));
        };
        match action {
            KeyAction::Rotate => key.prefix = masked_prefix(key.env, seq),
            KeyAction::Revoke => key.active = false,
            KeyAction::Activate => key.active = true,
        }
        key.last_used = "just now".to_owned();
        Ok(())
    }

    async fn activity(
        &self,
        session: &Session,
        filters: &ActivityFilters,
    ) -> Result<Vec<ActivityEvent>, ApiError> {
        self.enter(
            Endpoint::Activity,
            Some(&session.token),
            filters.api_query().to_string(),
        )
        .await?;
        let filters = filters.normalize();
        let needle = filters.action.to_lowercase();
        let limit = usize::try_from(filters.limit_value()).unwrap_or(usize::MAX);
        Ok(activity_events()
            .into_iter()
            .filter(|e| filters.status == ActivityStatus::Any || e.status == filters.status.as_str())
            .filter(|e| needle.is_empty() || e.action.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }
}
