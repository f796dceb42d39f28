//! Address state: the active view plus its query parameters.
//!
//! A [`Route`] is what the address fragment `#/{view}?{query}` encodes. Parsing
//! is total: an unknown or missing view becomes [`View::Overview`] and
//! undecodable query bytes are replaced, so any fragment a user can type maps
//! to some valid route.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The named views of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Overview,
    Keys,
    Metrics,
    Activity,
}

impl View {
    /// Every view, in navigation order.
    pub const ALL: [Self; 4] = [Self::Overview, Self::Keys, Self::Metrics, Self::Activity];

    /// Path segment used in the address fragment.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Keys => "keys",
            Self::Metrics => "metrics",
            Self::Activity => "activity",
        }
    }

    /// Navigation label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Keys => "API Keys",
            Self::Metrics => "Metrics",
            Self::Activity => "Activity",
        }
    }

    /// Strict parse of a path segment.
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == segment)
    }

    /// Lossy parse: anything unrecognized is the overview.
    #[must_use]
    pub fn from_path(segment: &str) -> Self {
        Self::parse(segment).unwrap_or_default()
    }

    /// Views whose query carries the shared analytics `range`.
    #[must_use]
    pub fn is_analytics(self) -> bool {
        matches!(self, Self::Overview | Self::Metrics)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered query parameters.
///
/// Order is preserved so that the same filter state always produces the same
/// query string, which is what the synchronizers compare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=two%20words`. Accepts `+` for spaces. Pieces without `=`
    /// become keys with empty values; empty pieces are skipped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs = raw
            .split('&')
            .filter(|piece| !piece.is_empty())
            .map(|piece| {
                let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
                (decode_component(key), decode_component(value))
            })
            .collect();
        Self(pairs)
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`, keeping the position of its first occurrence and
    /// dropping any duplicates.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.0[idx].1 = value;
                let mut seen = 0usize;
                self.0.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.0.push((key.to_owned(), value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove every occurrence of `key`.
    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (key, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", urlencoding::encode(key), urlencoding::encode(value))?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(&k.into(), v);
        }
        params
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(s)) => s.to_owned(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned(),
    }
}

/// A complete navigation target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub view: View,
    pub query: QueryParams,
}

impl Route {
    #[must_use]
    pub fn new(view: View, query: QueryParams) -> Self {
        Self { view, query }
    }

    /// Parse an address fragment such as `#/keys?status=active`.
    #[must_use]
    pub fn parse(fragment: &str) -> Self {
        let hash = fragment.trim().trim_start_matches('#');
        let (path, search) = hash.split_once('?').unwrap_or((hash, ""));
        let segment = path.trim_start_matches('/').trim_end_matches('/');
        Self {
            view: View::from_path(segment),
            query: QueryParams::parse(search),
        }
    }

    /// Render as an address fragment, omitting `?` when the query is empty.
    #[must_use]
    pub fn to_fragment(&self) -> String {
        if self.query.is_empty() {
            format!("#/{}", self.view)
        } else {
            format!("#/{}?{}", self.view, self.query)
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_view_and_query() {
        let route = Route::parse("#/keys?q=prod&status=active");
        assert_eq!(route.view, View::Keys);
        assert_eq!(route.query.get("q"), Some("prod"));
        assert_eq!(route.query.get("status"), Some("active"));
    }

    #[test]
    fn unknown_or_missing_view_is_overview() {
        for fragment in ["", "#", "#/", "#/billing", "#/KEYS", "garbage?x=1"] {
            assert_eq!(Route::parse(fragment).view, View::Overview, "{fragment:?}");
        }
    }

    #[test]
    fn accepts_fragment_without_hash_or_slash() {
        assert_eq!(Route::parse("activity?limit=10").view, View::Activity);
        assert_eq!(Route::parse("#metrics").view, View::Metrics);
    }

    #[test]
    fn decodes_plus_and_percent_escapes() {
        let query = QueryParams::parse("action=key.create+now&q=a%20b%26c");
        assert_eq!(query.get("action"), Some("key.create now"));
        assert_eq!(query.get("q"), Some("a b&c"));
    }

    #[test]
    fn malformed_escapes_do_not_fail() {
        let query = QueryParams::parse("q=%ff%fe&x=%zz&&=&flag");
        assert!(query.get("q").is_some());
        assert_eq!(query.get("x"), Some("%zz"));
        assert_eq!(query.get("flag"), Some(""));
    }

    #[test]
    fn fragment_round_trips() {
        let route = Route::new(
            View::Activity,
            QueryParams::new()
                .with("status", "error")
                .with("action", "deploy key")
                .with("limit", "100"),
        );
        let fragment = route.to_fragment();
        assert_eq!(fragment, "#/activity?status=error&action=deploy%20key&limit=100");
        assert_eq!(Route::parse(&fragment), route);
    }

    #[test]
    fn empty_query_has_no_question_mark() {
        assert_eq!(Route::new(View::Keys, QueryParams::new()).to_fragment(), "#/keys");
    }

    #[test]
    fn set_replaces_in_place_and_drops_duplicates() {
        let mut query = QueryParams::parse("range=7d&x=1&range=30d");
        query.set("range", "24h");
        assert_eq!(query.to_string(), "range=24h&x=1");
        query.set("y", "2");
        assert_eq!(query.to_string(), "range=24h&x=1&y=2");
        query.remove("x");
        assert_eq!(query.to_string(), "range=24h&y=2");
    }
}
