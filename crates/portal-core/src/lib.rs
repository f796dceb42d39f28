//! Core engine for Portal.
//!
//! Contains the hash router, route/filter synchronization, the session
//! guard, the race-safe view data controllers and the keys controller, all
//! composed by [`Console`]. This crate depends on `portal-storage` for the
//! durable store trait and talks to the backend only through the
//! [`DashboardApi`] contract.

pub mod api;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod filters;
pub mod http;
pub mod keys;
pub mod prefs;
pub mod route;
pub mod router;
pub mod session;
pub mod sync;
pub mod testing;
pub mod views;

pub use api::DashboardApi;
pub use config::ConsoleConfig;
pub use console::Console;
pub use error::{ApiError, SessionError};
pub use http::HttpApi;
pub use route::{QueryParams, Route, View};
pub use router::{HashRouter, NavigateOptions};
pub use session::{AuthState, Session, SessionGuard};
