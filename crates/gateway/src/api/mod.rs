//! Router assembly for the HTTP API (C6), per spec.md §4.6 and
//! SPEC_FULL.md §6: a single `/` route dispatching on the `command`
//! query parameter, rather than one path per command — the original's
//! own routing idiom (`original_source/wforce-web.cc`), kept literally
//! rather than translated into REST paths.

pub mod auth;
pub mod commands;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Deserialize)]
struct CommandQuery {
    command: String,
}

async fn dispatch_get(
    State(state): State<AppState>,
    Query(q): Query<CommandQuery>,
) -> Response {
    state.metrics.command_total.with_label_values(&[q.command.as_str()]).inc();
    let result = match q.command.as_str() {
        "getBL" => commands::get_bl(state).await,
        "stats" => commands::stats(state).await,
        "ping" => return commands::ping(state).await,
        "syncDone" => return commands::sync_done(state).await,
        other => commands::custom_get(state, other.to_string()).await,
    };
    result.unwrap_or_else(|e| e.into_response())
}

async fn dispatch_post(
    State(state): State<AppState>,
    Query(q): Query<CommandQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.command_total.with_label_values(&[q.command.as_str()]).inc();
    let body = body.to_vec();
    let result = match q.command.as_str() {
        "allow" => commands::allow(state, headers, body).await,
        "report" => commands::report(state, headers, body).await,
        "reset" => commands::reset(state, headers, body).await,
        "addBLEntry" => commands::add_bl_entry(state, headers, body).await,
        "delBLEntry" => commands::del_bl_entry(state, headers, body).await,
        "getDBStats" => commands::get_db_stats(state, headers, body).await,
        "syncDBs" => commands::sync_dbs(state, headers, body).await,
        other => commands::custom_post(state, other.to_string(), headers, body).await,
    };
    match result {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

/// Public router: `/` (command dispatch) behind HTTP Basic auth, plus
/// the unauthenticated `/metrics` scrape path (C7, a separate concern
/// from the command surface per spec.md §4.7).
pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", get(dispatch_get).post(dispatch_post))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_basic_auth));

    Router::new()
        .merge(protected)
        .route(&state.config.admin.metrics_path, get(commands::metrics_text))
}
