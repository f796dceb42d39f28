//! Terminal rendering of the console: ANSI text for people, JSON for scripts.

use chrono::Local;
use portal_core::api::{ActivityEvent, ApiKeyRecord, EndpointStat, Metrics, Overview};
use portal_core::controller::ViewState;
use portal_core::filters::{ActivityFilters, KeyFilters, RouteFilters};
use portal_core::keys::KeySummary;
use portal_core::{AuthState, Console, View};
use serde::Serialize;
use serde_json::{Value, json};

// ── ANSI color helpers ───────────────────────────────────────────────

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const WHITE: &str = "\x1b[37m";

const BAR_WIDTH: u64 = 30;

// ── Pretty output helpers ────────────────────────────────────────────

pub fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

pub fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

pub fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

pub fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

pub fn print_json(value: &Value) {
    if value.is_null() {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

/// `12842` -> `12,842`.
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn bar(value: u64, max: u64) -> String {
    let filled = if max > 0 { (value * BAR_WIDTH) / max } else { 0 };
    let filled = usize::try_from(filled).unwrap_or(0);
    format!("{CYAN}{}{RESET}", "█".repeat(filled.max(1)))
}

// ── Whole screen ─────────────────────────────────────────────────────

/// Print whatever the console currently shows.
pub fn print_screen(console: &Console) {
    match console.auth_state() {
        AuthState::Authenticated(session) => {
            print_nav(console.route().view, &session.email, &session.tenant_id);
            match console.active_view() {
                Some(View::Overview) => print_overview(console),
                Some(View::Metrics) => print_metrics(console),
                Some(View::Keys) => print_keys(console),
                Some(View::Activity) => print_activity(console),
                None => {}
            }
        }
        AuthState::Unauthenticated { notice } => print_signed_out(notice.as_deref()),
        AuthState::Checking => println!("  {DIM}checking session...{RESET}"),
    }
}

pub fn print_signed_out(notice: Option<&str>) {
    println!();
    header("○", "Signed out");
    if let Some(notice) = notice {
        warning(notice);
    }
    println!("  {DIM}Run `portal login --email <EMAIL>` to sign in.{RESET}");
    println!();
}

fn print_nav(active: View, email: &str, tenant: &str) {
    println!();
    let tabs: Vec<String> = View::ALL
        .iter()
        .map(|view| {
            if *view == active {
                format!("{BOLD}{CYAN}[{}]{RESET}", view.label())
            } else {
                format!("{DIM}{}{RESET}", view.label())
            }
        })
        .collect();
    println!("  {}   {DIM}{email} · {tenant}{RESET}", tabs.join(" · "));
    println!();
}

/// Print the loading/error/updated lines and hand back the data to draw.
fn print_status<D>(state: &ViewState<D>) -> Option<&D> {
    if state.loading {
        println!("  {DIM}loading...{RESET}");
    }
    if let Some(error) = &state.error {
        println!("  {RED}{BOLD}✗{RESET} {RED}{error}{RESET}");
    }
    if let Some(at) = state.last_updated {
        let local = at.with_timezone(&Local);
        println!("  {DIM}Updated {}{RESET}", local.format("%H:%M:%S"));
    }
    state.data.as_ref()
}

fn print_endpoints(endpoints: &[EndpointStat]) {
    if endpoints.is_empty() {
        return;
    }
    println!();
    println!("  {BOLD}Top endpoints{RESET}");
    for endpoint in endpoints {
        let method = endpoint.method.as_deref().unwrap_or("");
        println!(
            "  {DIM}{method:<6}{RESET} {:<24} {:>10}  {:>6.2}%  {:>5.0} ms",
            endpoint.path,
            group_digits(endpoint.requests),
            endpoint.error_pct,
            endpoint.p95_ms,
        );
    }
}

// ── Views ────────────────────────────────────────────────────────────

fn print_overview(console: &Console) {
    header("◆", &format!("Overview · {}", console.range()));
    let state = console.overview().state();
    if let Some(overview) = print_status(&state) {
        print_overview_data(overview);
    }
    println!();
}

fn print_overview_data(overview: &Overview) {
    kv_line("Requests", &group_digits(overview.requests));
    kv_line("5xx errors", &group_digits(overview.five_xx));
    kv_line("Error rate", &format!("{:.2}%", overview.error_rate_pct));
    kv_line("p95 latency", &format!("{:.0} ms", overview.p95_latency_ms));
    print_endpoints(&overview.top_endpoints);
}

fn print_metrics(console: &Console) {
    header("◆", &format!("Metrics · {}", console.range()));
    let state = console.metrics().state();
    if let Some(metrics) = print_status(&state) {
        print_metrics_data(metrics);
    }
    println!();
}

fn print_metrics_data(metrics: &Metrics) {
    let summary = &metrics.summary;
    kv_line("Requests", &group_digits(summary.requests));
    kv_line("5xx errors", &group_digits(summary.five_xx));
    kv_line("Error rate", &format!("{:.2}%", summary.error_rate_pct));
    kv_line("p95 latency", &format!("{:.0} ms", summary.p95_latency_ms));

    if !metrics.request_trend.is_empty() {
        let max = metrics.request_trend.iter().map(|p| p.requests).max().unwrap_or(0);
        println!();
        println!("  {BOLD}Request trend{RESET}");
        for point in &metrics.request_trend {
            println!(
                "  {DIM}{:<8}{RESET} {} {}",
                point.bucket,
                bar(point.requests, max),
                group_digits(point.requests)
            );
        }
    }

    if !metrics.status_breakdown.is_empty() {
        println!();
        println!("  {BOLD}Status classes{RESET}");
        for share in &metrics.status_breakdown {
            println!(
                "  {:<8} {:>10}  {DIM}{:>5.1}%{RESET}",
                share.status,
                group_digits(share.requests),
                share.pct
            );
        }
    }

    if !metrics.latency_buckets.is_empty() {
        println!();
        println!("  {BOLD}Latency{RESET}");
        for share in &metrics.latency_buckets {
            println!(
                "  {:<12} {:>10}  {DIM}{:>5.1}%{RESET}",
                share.bucket,
                group_digits(share.requests),
                share.pct
            );
        }
    }

    print_endpoints(&metrics.top_endpoints);
}

fn print_keys(console: &Console) {
    header("⚷", "API Keys");
    let filters = console.key_filters();
    if !filters.is_default() {
        println!("  {DIM}Filters: {}{RESET}", filters.to_query());
    }

    let feedback = console.keys().feedback();
    if let Some(message) = &feedback.message {
        success(message);
    }
    if let Some(error) = &feedback.error {
        println!("  {RED}{BOLD}✗{RESET} {RED}{error}{RESET}");
    }
    if let Some(pending) = console.keys().pending() {
        println!("  {DIM}working on {pending}...{RESET}");
    }

    let state = console.keys().state();
    if print_status(&state).is_some() {
        let KeySummary { active, revoked, live, test } = console.keys().summary();
        println!("  {GREEN}{active} active{RESET} · {RED}{revoked} revoked{RESET} · {live} live · {test} test");
        println!();
        let visible = console.keys().visible_keys(&filters);
        if visible.is_empty() {
            println!("  {DIM}No keys match the current filters.{RESET}");
        }
        for key in &visible {
            print_key_row(key);
        }
    }
    println!();
}

fn print_key_row(key: &ApiKeyRecord) {
    let status = if key.active {
        format!("{GREEN}active {RESET}")
    } else {
        format!("{RED}revoked{RESET}")
    };
    let last_used = if key.last_used.is_empty() { "never" } else { &key.last_used };
    println!(
        "  {status} {BOLD}{:<24}{RESET} {:<22} {:<4} {DIM}{:<18} {last_used}{RESET}",
        key.label, key.prefix, key.env.as_str(), key.id
    );
}

fn print_activity(console: &Console) {
    header("≡", "Activity");
    let applied = console.activity_applied();
    println!("  {DIM}Applied: {}{RESET}", applied.summary());
    if console.has_pending_activity_changes() {
        warning("Draft filters have not been applied.");
    }

    let state = console.activity().state();
    if let Some(events) = print_status(&state) {
        println!();
        if events.is_empty() {
            println!("  {DIM}No activity matches these filters.{RESET}");
        }
        for event in events {
            print_event_row(event);
        }
    }
    println!();
}

fn print_event_row(event: &ActivityEvent) {
    let color = match event.status.as_str() {
        "success" => GREEN,
        "error" => RED,
        _ => CYAN,
    };
    println!(
        "  {DIM}{:<20}{RESET} {color}{:<8}{RESET} {BOLD}{:<16}{RESET} {:<22} {DIM}{}{RESET}",
        event.timestamp, event.status, event.action, event.actor, event.target
    );
}

// ── JSON ─────────────────────────────────────────────────────────────

fn state_json<D>(state: &ViewState<D>, data: Option<Value>) -> Value {
    json!({
        "loading": state.loading,
        "error": state.error,
        "lastUpdated": state.last_updated.map(|at| at.to_rfc3339()),
        "data": data,
    })
}

fn to_value(data: &impl Serialize) -> Option<Value> {
    serde_json::to_value(data).ok()
}

pub fn auth_json(state: &AuthState) -> Value {
    match state {
        AuthState::Authenticated(session) => json!({
            "status": "authenticated",
            "email": session.email,
            "tenantId": session.tenant_id,
        }),
        AuthState::Unauthenticated { notice } => json!({
            "status": "signed_out",
            "notice": notice,
        }),
        AuthState::Checking => json!({ "status": "checking" }),
    }
}

fn key_filters_json(filters: &KeyFilters) -> Value {
    json!({
        "q": filters.query,
        "status": filters.status.as_str(),
        "env": filters.env.as_str(),
    })
}

fn activity_filters_json(filters: &ActivityFilters) -> Value {
    json!({
        "status": filters.status.as_str(),
        "action": filters.action,
        "limit": filters.limit,
    })
}

/// Machine-readable snapshot of the screen.
pub fn screen_json(console: &Console) -> Value {
    let route = console.route();
    let view = match console.active_view() {
        Some(View::Overview) => {
            let state = console.overview().state();
            json!({ "range": console.range(), "state": state_json(&state, state.data.as_ref().and_then(to_value)) })
        }
        Some(View::Metrics) => {
            let state = console.metrics().state();
            json!({ "range": console.range(), "state": state_json(&state, state.data.as_ref().and_then(to_value)) })
        }
        Some(View::Keys) => {
            let filters = console.key_filters();
            let state = console.keys().state();
            let visible = state.data.as_ref().map(|_| console.keys().visible_keys(&filters));
            let summary = console.keys().summary();
            let feedback = console.keys().feedback();
            json!({
                "filters": key_filters_json(&filters),
                "summary": {
                    "active": summary.active,
                    "revoked": summary.revoked,
                    "live": summary.live,
                    "test": summary.test,
                },
                "message": feedback.message,
                "error": feedback.error,
                "state": state_json(&state, visible.as_ref().and_then(to_value)),
            })
        }
        Some(View::Activity) => {
            let state = console.activity().state();
            json!({
                "filters": activity_filters_json(&console.activity_applied()),
                "summary": console.activity_applied().summary().to_string(),
                "state": state_json(&state, state.data.as_ref().and_then(to_value)),
            })
        }
        None => Value::Null,
    };

    json!({
        "location": route.to_fragment(),
        "view": console.active_view(),
        "auth": auth_json(&console.auth_state()),
        "content": view,
    })
}
