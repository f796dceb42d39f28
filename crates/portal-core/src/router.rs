//! Hash router over an in-memory address history.
//!
//! The router is the single source of truth for "where am I". It keeps the
//! address fragment in a browser-style history (entries plus a cursor) so that
//! push, replace, back and forward behave the way an address bar does, and it
//! notifies subscribers with the freshly parsed [`Route`] after every change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::route::{QueryParams, Route, View};

/// Options for [`HashRouter::navigate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Overwrite the current history entry instead of pushing a new one.
    pub replace: bool,
}

impl NavigateOptions {
    pub const PUSH: Self = Self { replace: false };
    pub const REPLACE: Self = Self { replace: true };
}

/// Handle returned by [`HashRouter::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Route) + Send + Sync>;

struct History {
    entries: Vec<String>,
    cursor: usize,
}

impl History {
    fn current(&self) -> &str {
        &self.entries[self.cursor]
    }
}

/// Parses and writes the shareable navigation state.
pub struct HashRouter {
    history: Mutex<History>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl HashRouter {
    /// A router whose address starts at `fragment`. The fragment is kept
    /// verbatim; [`read`](Self::read) applies the defaults.
    #[must_use]
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![fragment.into()],
                cursor: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Parse the current fragment.
    #[must_use]
    pub fn read(&self) -> Route {
        Route::parse(self.history().current())
    }

    /// The raw current fragment, exactly as written.
    #[must_use]
    pub fn fragment(&self) -> String {
        self.history().current().to_owned()
    }

    /// Write a complete route. Writing the fragment that is already current
    /// is a no-op: no history entry and no notification.
    pub fn navigate(&self, view: View, query: QueryParams, options: NavigateOptions) {
        let fragment = Route::new(view, query).to_fragment();
        {
            let mut history = self.history();
            if history.current() == fragment {
                return;
            }
            if options.replace {
                let cursor = history.cursor;
                history.entries[cursor].clone_from(&fragment);
            } else {
                push_entry(&mut history, fragment.clone());
            }
        }
        debug!(fragment = %fragment, replace = options.replace, "navigated");
        self.notify();
    }

    /// Simulate the user editing the address bar by hand.
    pub fn set_fragment(&self, raw: &str) {
        {
            let mut history = self.history();
            if history.current() == raw {
                return;
            }
            push_entry(&mut history, raw.to_owned());
        }
        debug!(fragment = raw, "address edited");
        self.notify();
    }

    /// Step back in history. Returns `false` at the first entry.
    pub fn back(&self) -> bool {
        {
            let mut history = self.history();
            if history.cursor == 0 {
                return false;
            }
            history.cursor -= 1;
        }
        self.notify();
        true
    }

    /// Step forward in history. Returns `false` at the newest entry.
    pub fn forward(&self) -> bool {
        {
            let mut history = self.history();
            if history.cursor + 1 >= history.entries.len() {
                return false;
            }
            history.cursor += 1;
        }
        self.notify();
        true
    }

    /// Number of history entries (for tests and diagnostics).
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history().entries.len()
    }

    /// Subscribe to route changes. Listeners run after the router's own lock
    /// is released, so they may call back into the router.
    pub fn on_change(&self, listener: impl Fn(&Route) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners().retain(|(lid, _)| *lid != id);
    }

    fn notify(&self) {
        let route = self.read();
        let listeners: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&route);
        }
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HashRouter {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl std::fmt::Debug for HashRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRouter")
            .field("fragment", &self.fragment())
            .finish_non_exhaustive()
    }
}

fn push_entry(history: &mut History, fragment: String) {
    let keep = history.cursor + 1;
    history.entries.truncate(keep);
    history.entries.push(fragment);
    history.cursor = history.entries.len() - 1;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_router(fragment: &str) -> (HashRouter, Arc<AtomicUsize>) {
        let router = HashRouter::new(fragment);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        router.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (router, count)
    }

    #[test]
    fn empty_address_reads_as_overview() {
        let router = HashRouter::default();
        assert_eq!(router.read(), Route::default());
    }

    #[test]
    fn push_adds_history_and_notifies() {
        let (router, count) = counting_router("#/overview");
        router.navigate(View::Keys, QueryParams::new(), NavigateOptions::PUSH);
        assert_eq!(router.fragment(), "#/keys");
        assert_eq!(router.history_len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replace_overwrites_current_entry() {
        let router = HashRouter::new("#/metrics");
        router.navigate(
            View::Metrics,
            QueryParams::new().with("range", "7d"),
            NavigateOptions::REPLACE,
        );
        assert_eq!(router.history_len(), 1);
        assert_eq!(router.fragment(), "#/metrics?range=7d");
        assert!(!router.back());
    }

    #[test]
    fn identical_write_is_a_noop() {
        let (router, count) = counting_router("#/keys?status=active");
        router.navigate(
            View::Keys,
            QueryParams::new().with("status", "active"),
            NavigateOptions::PUSH,
        );
        assert_eq!(router.history_len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn back_and_forward_walk_history() {
        let (router, count) = counting_router("#/overview");
        router.navigate(View::Keys, QueryParams::new(), NavigateOptions::PUSH);
        router.navigate(View::Activity, QueryParams::new(), NavigateOptions::PUSH);

        assert!(router.back());
        assert_eq!(router.read().view, View::Keys);
        assert!(router.back());
        assert_eq!(router.read().view, View::Overview);
        assert!(!router.back());
        assert!(router.forward());
        assert_eq!(router.read().view, View::Keys);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn push_after_back_truncates_forward_entries() {
        let router = HashRouter::new("#/overview");
        router.navigate(View::Keys, QueryParams::new(), NavigateOptions::PUSH);
        router.navigate(View::Metrics, QueryParams::new(), NavigateOptions::PUSH);
        router.back();
        router.navigate(View::Activity, QueryParams::new(), NavigateOptions::PUSH);
        assert_eq!(router.history_len(), 3);
        assert!(!router.forward());
    }

    #[test]
    fn manual_edit_keeps_raw_text_but_reads_defaults() {
        let (router, count) = counting_router("#/overview");
        router.set_fragment("#/nowhere?x=1");
        assert_eq!(router.fragment(), "#/nowhere?x=1");
        assert_eq!(router.read().view, View::Overview);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_receives_parsed_route_and_can_reenter() {
        let router = Arc::new(HashRouter::new("#/overview"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let inner = Arc::clone(&router);
        router.on_change(move |route| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(route.clone());
            // Re-entrant read must not deadlock.
            let _ = inner.read();
        });
        router.navigate(View::Keys, QueryParams::new().with("q", "prod"), NavigateOptions::PUSH);
        let seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].query.get("q"), Some("prod"));
    }

    #[test]
    fn removed_listener_is_not_called() {
        let router = HashRouter::new("#/overview");
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = router.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        router.remove_listener(id);
        router.navigate(View::Keys, QueryParams::new(), NavigateOptions::PUSH);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
