//! reqwest implementation of [`DashboardApi`].
//!
//! Paths are relative to the configured base URL (for example
//! `http://127.0.0.1:8000/dashboard/api`). Authenticated calls send the
//! session token as a bearer token. Failed responses are turned into
//! [`ApiError`] with the server's message extracted by
//! [`extract_error_message`]; there are no automatic retries.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::{
    ActivityEvent, ApiKeyRecord, DashboardApi, Environment, KeyAction, Metrics, Overview,
};
use crate::config::{ConsoleConfig, normalize_api_url};
use crate::error::{ApiError, GENERIC_FAILURE_MESSAGE};
use crate::filters::{ActivityFilters, AnalyticsRange};
use crate::route::QueryParams;
use crate::session::Session;

#[derive(Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    session: Option<Session>,
}

#[derive(Deserialize)]
struct KeysEnvelope {
    #[serde(default)]
    keys: Vec<ApiKeyRecord>,
}

#[derive(Deserialize)]
struct ActivityEnvelope {
    #[serde(default)]
    events: Vec<ActivityEvent>,
}

/// Dashboard API client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApi {
    /// Create a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("portal/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: normalize_api_url(base_url),
            client,
        })
    }

    /// Create a client from console configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.timeout)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, query: Option<&QueryParams>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{path}?{q}", self.base_url),
            _ => format!("{}{path}", self.base_url),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        debug!(method = %method, url = %url, "dashboard request");
        let mut req = self.client.request(method, &url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(map_transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(map_transport)?;

        if !status.is_success() {
            let message = extract_error_message(&text);
            debug!(status = status.as_u16(), message = %message, "dashboard request failed");
            return Err(ApiError::from_status(status.as_u16(), message));
        }

        if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn map_transport(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e)
    }
}

/// JavaScript-style truthiness of a JSON value.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Pull the human-readable message out of a failed response body.
///
/// Looks at `detail.error.message`, then `detail`, then `message`, taking
/// the first that is set. Non-string values are rendered as JSON text. Bodies
/// that are not JSON or carry none of these yield `"Request failed"`.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        return GENERIC_FAILURE_MESSAGE.to_owned();
    };
    let candidates = [
        payload.pointer("/detail/error/message"),
        payload.get("detail"),
        payload.get("message"),
    ];
    match candidates.into_iter().flatten().find(|v| truthy(v)) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => GENERIC_FAILURE_MESSAGE.to_owned(),
    }
}

#[async_trait::async_trait]
impl DashboardApi for HttpApi {
    async fn register(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let envelope: SessionEnvelope = self
            .request(Method::POST, self.url("/auth/register", None), None, Some(body))
            .await?;
        Ok(envelope.session.unwrap_or_default())
    }

    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let envelope: SessionEnvelope = self
            .request(Method::POST, self.url("/session/login", None), None, Some(body))
            .await?;
        Ok(envelope.session.unwrap_or_default())
    }

    async fn logout(&self, session: &Session) -> Result<(), ApiError> {
        self.request::<Value>(
            Method::POST,
            self.url("/session/logout", None),
            Some(&session.token),
            None,
        )
        .await?;
        Ok(())
    }

    async fn current_session(&self, session: &Session) -> Result<Session, ApiError> {
        let envelope: SessionEnvelope = self
            .request(Method::GET, self.url("/session/me", None), Some(&session.token), None)
            .await?;
        Ok(envelope.session.unwrap_or_default())
    }

    async fn overview(&self, session: &Session, range: AnalyticsRange) -> Result<Overview, ApiError> {
        let query = QueryParams::new().with("range", range.as_str());
        self.request(
            Method::GET,
            self.url("/overview", Some(&query)),
            Some(&session.token),
            None,
        )
        .await
    }

    async fn metrics(&self, session: &Session, range: AnalyticsRange) -> Result<Metrics, ApiError> {
        let query = QueryParams::new().with("range", range.as_str());
        self.request(
            Method::GET,
            self.url("/metrics", Some(&query)),
            Some(&session.token),
            None,
        )
        .await
    }

    async fn list_keys(&self, session: &Session) -> Result<Vec<ApiKeyRecord>, ApiError> {
        let envelope: KeysEnvelope = self
            .request(Method::GET, self.url("/keys", None), Some(&session.token), None)
            .await?;
        Ok(envelope.keys)
    }

    async fn create_key(&self, session: &Session, label: &str, env: Environment) -> Result<(), ApiError> {
        let body = serde_json::json!({ "label": label, "env": env });
        self.request::<Value>(
            Method::POST,
            self.url("/keys/create", None),
            Some(&session.token),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn key_action(&self, session: &Session, id: &str, action: KeyAction) -> Result<(), ApiError> {
        let path = format!("/keys/{}/{action}", urlencoding::encode(id));
        self.request::<Value>(Method::POST, self.url(&path, None), Some(&session.token), None)
            .await?;
        Ok(())
    }

    async fn activity(
        &self,
        session: &Session,
        filters: &ActivityFilters,
    ) -> Result<Vec<ActivityEvent>, ApiError> {
        let query = filters.api_query();
        let envelope: ActivityEnvelope = self
            .request(
                Method::GET,
                self.url("/activity", Some(&query)),
                Some(&session.token),
                None,
            )
            .await?;
        Ok(envelope.events)
    }
}
