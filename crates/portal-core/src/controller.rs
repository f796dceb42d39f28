//! Race-safe data retrieval for one view.
//!
//! Each controller keeps a monotonically increasing epoch. Starting a fetch
//! (mount, a filter change, a manual refresh) takes a new epoch and hands
//! back a [`Ticket`]; resolving the ticket with [`ViewDataController::load`]
//! applies the result only if no newer epoch has started and the controller
//! is still mounted. Requests are never aborted, their results are just
//! dropped on arrival.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::DashboardApi;
use crate::error::ApiError;
use crate::route::View;
use crate::session::{Session, SessionGuard};

/// What a view fetches and how.
#[async_trait::async_trait]
pub trait ViewSource: Send + Sync + 'static {
    /// The part of the dependency key that comes from user input.
    type Filters: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Data: Clone + fmt::Debug + Send + Sync + 'static;

    const VIEW: View;

    /// Map filters to the value compared for dependency changes.
    fn canonical(filters: Self::Filters) -> Self::Filters {
        filters
    }

    /// Fetch the view's data for `filters` on behalf of `session`.
    async fn fetch(
        &self,
        api: &dyn DashboardApi,
        session: &Session,
        filters: &Self::Filters,
    ) -> Result<Self::Data, ApiError>;
}

/// Identifies one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A started fetch waiting to be resolved by [`ViewDataController::load`].
#[derive(Debug, Clone)]
#[must_use = "a ticket does nothing until it is loaded"]
pub struct Ticket<F> {
    epoch: Epoch,
    filters: F,
}

impl<F> Ticket<F> {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

/// How a load resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Data stored.
    Applied,
    /// Error message stored, prior data kept.
    Failed,
    /// The server rejected the session; forced logout was requested.
    LoggedOut,
    /// A newer epoch started or the view unmounted; nothing changed.
    Stale,
    /// No session; no request was made.
    Skipped,
}

/// Visible state of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<D> {
    pub data: Option<D>,
    pub error: Option<String>,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<D> Default for ViewState<D> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            last_updated: None,
        }
    }
}

struct Inner<F, D> {
    filters: F,
    refresh_count: u64,
    epoch: Epoch,
    mounted: bool,
    state: ViewState<D>,
}

/// Drives data retrieval for one view. The controller is the only writer of
/// its own state.
pub struct ViewDataController<S: ViewSource> {
    source: S,
    api: Arc<dyn DashboardApi>,
    session: Arc<SessionGuard>,
    inner: Mutex<Inner<S::Filters, S::Data>>,
}

impl<S: ViewSource> ViewDataController<S> {
    #[must_use]
    pub fn new(
        source: S,
        api: Arc<dyn DashboardApi>,
        session: Arc<SessionGuard>,
        filters: S::Filters,
    ) -> Self {
        Self {
            source,
            api,
            session,
            inner: Mutex::new(Inner {
                filters: S::canonical(filters),
                refresh_count: 0,
                epoch: Epoch::default(),
                mounted: false,
                state: ViewState::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S::Filters, S::Data>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the view mounted and start a fetch.
    pub fn mount(&self) -> Ticket<S::Filters> {
        let mut inner = self.lock();
        inner.mounted = true;
        Self::begin(&mut inner)
    }

    /// Replace the filters. Starts a fetch only when mounted and the
    /// canonical filters actually changed.
    pub fn set_filters(&self, filters: S::Filters) -> Option<Ticket<S::Filters>> {
        let filters = S::canonical(filters);
        let mut inner = self.lock();
        if inner.filters == filters {
            return None;
        }
        inner.filters = filters;
        if !inner.mounted {
            return None;
        }
        Some(Self::begin(&mut inner))
    }

    /// Bump the refresh counter and start a fetch when mounted.
    pub fn refresh(&self) -> Option<Ticket<S::Filters>> {
        let mut inner = self.lock();
        inner.refresh_count += 1;
        if !inner.mounted {
            return None;
        }
        Some(Self::begin(&mut inner))
    }

    /// Stop applying results. In-flight loads resolve as [`Settled::Stale`].
    /// Data is kept for the next mount.
    pub fn unmount(&self) {
        let mut inner = self.lock();
        if !inner.mounted {
            return;
        }
        inner.mounted = false;
        inner.epoch = inner.epoch.next();
        inner.state.loading = false;
        debug!(view = %S::VIEW, "unmounted");
    }

    fn begin(inner: &mut Inner<S::Filters, S::Data>) -> Ticket<S::Filters> {
        inner.epoch = inner.epoch.next();
        inner.state.loading = true;
        debug!(view = %S::VIEW, epoch = %inner.epoch, refresh = inner.refresh_count, "fetch started");
        Ticket {
            epoch: inner.epoch,
            filters: inner.filters.clone(),
        }
    }

    /// Run the fetch for `ticket` and apply its outcome if it is still the
    /// newest epoch.
    pub async fn load(&self, ticket: Ticket<S::Filters>) -> Settled {
        let Some(session) = self.session.current() else {
            let mut inner = self.lock();
            if inner.epoch == ticket.epoch {
                inner.state.loading = false;
            }
            return Settled::Skipped;
        };

        let result = self.source.fetch(self.api.as_ref(), &session, &ticket.filters).await;

        let failure = {
            let mut inner = self.lock();
            if !inner.mounted || inner.epoch != ticket.epoch {
                debug!(
                    view = %S::VIEW,
                    epoch = %ticket.epoch,
                    current = %inner.epoch,
                    "discarding stale response"
                );
                return Settled::Stale;
            }
            match result {
                Ok(data) => {
                    let state = &mut inner.state;
                    state.data = Some(data);
                    state.error = None;
                    state.loading = false;
                    state.last_updated = Some(Utc::now());
                    return Settled::Applied;
                }
                Err(e) if e.is_unauthorized() => e,
                Err(e) => {
                    debug!(view = %S::VIEW, epoch = %ticket.epoch, error = %e, "fetch failed");
                    inner.state.error = Some(e.to_string());
                    inner.state.loading = false;
                    return Settled::Failed;
                }
            }
        };

        let reason = format!("{} fetch unauthorized: {failure}", S::VIEW);
        self.session.force_logout(&session.token, &reason).await;
        Settled::LoggedOut
    }

    /// Start a fetch on mount and load it.
    pub async fn mount_and_load(&self) -> Settled {
        let ticket = self.mount();
        self.load(ticket).await
    }

    #[must_use]
    pub fn state(&self) -> ViewState<S::Data> {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.lock().epoch
    }

    #[must_use]
    pub fn filters(&self) -> S::Filters {
        self.lock().filters.clone()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    pub(crate) fn api(&self) -> &Arc<dyn DashboardApi> {
        &self.api
    }

    pub(crate) fn session_guard(&self) -> &Arc<SessionGuard> {
        &self.session
    }
}

impl<S: ViewSource> fmt::Debug for ViewDataController<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ViewDataController")
            .field("view", &S::VIEW)
            .field("epoch", &inner.epoch)
            .field("mounted", &inner.mounted)
            .field("loading", &inner.state.loading)
            .finish_non_exhaustive()
    }
}
