use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use common::{Bar, SignalSeries};
use strategy::ArbitrageStrategy;

use crate::{auth::require_auth, AppState};

/// One week of minute bars.
const MAX_LOOKBACK_MINS: i64 = 7 * 24 * 60;

pub fn signals_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/signals/:symbol", get(get_signals))
        .route("/api/arbitrage", get(get_arbitrage))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

#[derive(Deserialize)]
struct LookbackQuery {
    lookback_minutes: Option<i64>,
}

impl LookbackQuery {
    fn minutes(&self, default: i64) -> i64 {
        self.lookback_minutes
            .unwrap_or(default)
            .clamp(1, MAX_LOOKBACK_MINS)
    }
}

/// Bars for `symbol` over the last `minutes`, and whether the store had none.
async fn recent_bars(state: &AppState, symbol: &str, minutes: i64) -> (Vec<Bar>, bool) {
    let since = Utc::now() - Duration::minutes(minutes);
    match state.store.query(symbol, since).await {
        Some(bars) => (bars, false),
        None => {
            debug!(symbol = %symbol, minutes, "No bars for dashboard request");
            (Vec::new(), true)
        }
    }
}

// ─── Single-symbol signals ────────────────────────────────────────────────────

async fn get_signals(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<LookbackQuery>,
) -> Response {
    if !state.strategies.symbols().contains(&symbol) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("symbol '{symbol}' is not tracked")})),
        )
            .into_response();
    }

    let minutes = q.minutes(state.lookback_mins);
    let (bars, stale) = recent_bars(&state, &symbol, minutes).await;
    let series = state.strategies.run_for_symbol(&symbol, &bars);

    Json(json!({
        "symbol": symbol,
        "lookback_minutes": minutes,
        "stale": stale,
        "series": series,
    }))
    .into_response()
}

// ─── Arbitrage pairs ──────────────────────────────────────────────────────────

async fn get_arbitrage(
    State(state): State<AppState>,
    Query(q): Query<LookbackQuery>,
) -> Json<Value> {
    let minutes = q.minutes(state.lookback_mins);

    let mut pairs = Vec::with_capacity(state.strategies.pairs().len());
    for pair in state.strategies.pairs() {
        pairs.push(pair_view(&state, pair, minutes).await);
    }

    Json(json!({
        "lookback_minutes": minutes,
        "pairs": pairs,
    }))
}

async fn pair_view(state: &AppState, pair: &ArbitrageStrategy, minutes: i64) -> Value {
    let (leg_a, leg_b) = pair.legs();
    let (bars_a, stale_a) = recent_bars(state, leg_a, minutes).await;
    let (bars_b, stale_b) = recent_bars(state, leg_b, minutes).await;

    let series = if stale_a || stale_b {
        SignalSeries::new(pair.name(), Vec::new())
    } else {
        pair.generate_signals(&bars_a, &bars_b)
    };

    json!({
        "name": pair.name(),
        "leg_a": leg_a,
        "leg_b": leg_b,
        "threshold": pair.threshold(),
        "stale": stale_a || stale_b,
        "series": series,
    })
}
