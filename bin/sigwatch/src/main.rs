use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{BarStore, Config, MarketDataFeed, RunMode, SignalSeries, SignalUpdate};
use engine::{spawn_live_ingest, AlpacaHistory, AlpacaStream, LoopConfig, SignalLoop, SqliteBarStore};
use strategy::{StrategyFileConfig, StrategySet};

/// Rows of each series logged at the end of a batch run.
const BATCH_TAIL: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment configuration")?;
    info!(mode = %cfg.run_mode, "sigwatch starting");

    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)?;
    let strategies = Arc::new(
        StrategySet::from_config(&strategy_file).context("invalid strategy configuration")?,
    );
    info!(strategies = strategies.len(), symbols = ?strategies.symbols(), "Strategies loaded");

    // ── Database ──────────────────────────────────────────────────────────────
    let store: Arc<dyn BarStore> = Arc::new(
        SqliteBarStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("failed to open bar store at {}", cfg.database_url))?,
    );
    info!("Bar store ready");

    match cfg.run_mode {
        RunMode::Batch => run_batch(&cfg, store, strategies).await,
        RunMode::Live => run_live(&cfg, store, strategies).await,
    }
}

// ─── Batch ────────────────────────────────────────────────────────────────────

async fn run_batch(
    cfg: &Config,
    store: Arc<dyn BarStore>,
    strategies: Arc<StrategySet>,
) -> anyhow::Result<()> {
    let history = AlpacaHistory::new(&cfg.alpaca_api_key, &cfg.alpaca_secret, &cfg.alpaca_feed)?;
    let start = Utc::now() - Duration::days(cfg.history_days);

    for symbol in strategies.symbols() {
        match history.fetch_bars(&symbol, start).await {
            Ok(bars) if bars.is_empty() => warn!(symbol = %symbol, "No historical bars returned"),
            Ok(bars) => {
                if let Err(e) = store.append(&symbol, &bars).await {
                    error!(symbol = %symbol, error = %e, "Failed to store historical bars");
                }
            }
            Err(e) => error!(symbol = %symbol, error = %e, "Historical fetch failed, skipping"),
        }
    }

    for symbol in strategies.symbols() {
        let Some(bars) = store.query(&symbol, start).await else {
            warn!(symbol = %symbol, "No stored bars, skipping");
            continue;
        };
        for series in strategies.run_for_symbol(&symbol, &bars) {
            log_tail(&symbol, &series);
        }
    }

    for pair in strategies.pairs() {
        let (leg_a, leg_b) = pair.legs();
        let (Some(bars_a), Some(bars_b)) = (store.query(leg_a, start).await, store.query(leg_b, start).await)
        else {
            warn!(pair = %pair.name(), "Missing data for a leg, skipping");
            continue;
        };
        log_tail(&format!("{leg_a}/{leg_b}"), &pair.generate_signals(&bars_a, &bars_b));
    }

    info!("Batch run complete");
    Ok(())
}

fn log_tail(symbol: &str, series: &SignalSeries) {
    info!(symbol = %symbol, strategy = %series.strategy, rows = series.len(), "Signal series");
    for point in series.tail(BATCH_TAIL) {
        info!(
            symbol = %symbol,
            strategy = %series.strategy,
            time = %point.time,
            close = point.close,
            indicator = ?point.indicator,
            signal = %point.signal,
            "Signal row"
        );
    }
}

// ─── Live ─────────────────────────────────────────────────────────────────────

async fn run_live(
    cfg: &Config,
    store: Arc<dyn BarStore>,
    strategies: Arc<StrategySet>,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (update_tx, _) = broadcast::channel::<SignalUpdate>(256);

    // ── Feeds ─────────────────────────────────────────────────────────────────
    let feed: Arc<dyn MarketDataFeed> = Arc::new(AlpacaStream::new(
        &cfg.alpaca_api_key,
        &cfg.alpaca_secret,
        &cfg.alpaca_feed,
    ));
    let mut feed_tasks = Vec::new();
    let mut forward_tasks = Vec::new();
    for symbol in strategies.symbols() {
        let (feed_task, forward_task) = spawn_live_ingest(symbol, feed.clone(), store.clone());
        feed_tasks.push(feed_task);
        forward_tasks.push(forward_task);
    }

    // ── Signal loop ───────────────────────────────────────────────────────────
    let signal_loop = SignalLoop::new(
        store.clone(),
        strategies.clone(),
        LoopConfig::from_config(cfg),
        update_tx.clone(),
    );
    let tick_tasks = signal_loop.spawn(shutdown_rx.clone());

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let api_state = api::AppState {
        store,
        strategies,
        dashboard_token: cfg.dashboard_token.clone(),
        update_tx,
        lookback_mins: cfg.dashboard_lookback_mins,
    };
    let mut api_task = tokio::spawn(api::serve(api_state, cfg.dashboard_port, shutdown_rx));

    info!("All subsystems started. Waiting for shutdown signal.");
    let api_running = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            true
        }
        finished = &mut api_task => {
            report_api_exit(finished);
            warn!("Running without the dashboard until shutdown");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            false
        }
    };
    info!("Shutdown signal received, finishing in-flight ticks");

    let _ = shutdown_tx.send(true);
    for task in tick_tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Signal task ended abnormally");
        }
    }
    if api_running {
        report_api_exit(api_task.await);
    }
    // Dropping the feeds closes each forwarder once it has drained
    for task in feed_tasks {
        task.abort();
    }
    for task in forward_tasks {
        match task.await {
            Ok(persisted) => info!(persisted, "Forwarder drained"),
            Err(e) => error!(error = %e, "Forwarder ended abnormally"),
        }
    }

    info!("sigwatch stopped");
    Ok(())
}

fn report_api_exit(finished: Result<common::Result<()>, JoinError>) {
    match finished {
        Ok(Ok(())) => info!("Dashboard API stopped"),
        Ok(Err(e)) => error!(error = %e, "Dashboard API failed"),
        Err(e) => error!(error = %e, "Dashboard API task ended abnormally"),
    }
}
