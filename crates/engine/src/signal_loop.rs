use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::{Bar, BarStore, Config, SignalUpdate};
use strategy::StrategySet;

use crate::buffer::{BufferState, RollingBuffer};

/// Immutable view of one symbol's buffer, swapped in after every ingest.
pub type Snapshot = Arc<Vec<Bar>>;

/// Timing and sizing of the streaming loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub poll_interval: Duration,
    /// Upper bound on a single store query.
    pub fetch_timeout: Duration,
    pub buffer_capacity: usize,
    /// How far back the first query of a symbol reaches.
    pub initial_lookback: chrono::Duration,
    /// Re-read window before the last successful fetch, to pick up bars
    /// persisted late. Duplicates are collapsed by the buffer.
    pub fetch_overlap: chrono::Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            buffer_capacity: RollingBuffer::DEFAULT_CAPACITY,
            initial_lookback: chrono::Duration::minutes(120),
            fetch_overlap: chrono::Duration::minutes(5),
        }
    }
}

impl LoopConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            fetch_timeout: cfg.fetch_timeout,
            buffer_capacity: cfg.buffer_capacity,
            initial_lookback: chrono::Duration::minutes(cfg.initial_lookback_mins),
            fetch_overlap: chrono::Duration::minutes(cfg.fetch_overlap_mins),
        }
    }
}

/// Periodically pulls bars from the store into per-symbol rolling buffers
/// and re-runs every configured strategy on them.
///
/// One task per symbol. Each task exclusively owns its buffer; other tasks
/// only see it through a `watch` snapshot.
pub struct SignalLoop {
    store: Arc<dyn BarStore>,
    strategies: Arc<StrategySet>,
    config: LoopConfig,
    update_tx: broadcast::Sender<SignalUpdate>,
}

impl SignalLoop {
    pub fn new(
        store: Arc<dyn BarStore>,
        strategies: Arc<StrategySet>,
        config: LoopConfig,
        update_tx: broadcast::Sender<SignalUpdate>,
    ) -> Self {
        Self {
            store,
            strategies,
            config,
            update_tx,
        }
    }

    /// Build one task per tracked symbol, wired to the snapshots it reads.
    pub fn into_tasks(self) -> Vec<SymbolTask> {
        let symbols = self.strategies.symbols();

        let channels: HashMap<String, (watch::Sender<Snapshot>, watch::Receiver<Snapshot>)> =
            symbols
                .iter()
                .map(|s| (s.clone(), watch::channel(Arc::new(Vec::new()))))
                .collect();

        symbols
            .iter()
            .filter_map(|symbol| {
                let (snapshot_tx, _) = channels.get(symbol)?;
                let peers = self
                    .strategies
                    .pairs_with_reference(symbol)
                    .filter_map(|pair| {
                        let leg_a = pair.legs().0;
                        let (_, rx) = channels.get(leg_a)?;
                        Some((leg_a.to_string(), rx.clone()))
                    })
                    .collect();

                Some(SymbolTask {
                    symbol: symbol.clone(),
                    buffer: RollingBuffer::new(symbol.clone(), self.config.buffer_capacity),
                    warmup: self.strategies.warmup_bars(symbol),
                    state: BufferState::Empty,
                    last_fetch: None,
                    store: self.store.clone(),
                    strategies: self.strategies.clone(),
                    config: self.config,
                    snapshot_tx: snapshot_tx.clone(),
                    peers,
                    update_tx: self.update_tx.clone(),
                })
            })
            .collect()
    }

    /// Spawn every symbol task. Tasks stop after their current tick once
    /// `shutdown` turns `true` or its sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let poll = self.config.poll_interval;
        let tasks = self.into_tasks();
        info!(symbols = tasks.len(), poll = ?poll, "Starting signal loop");
        tasks
            .into_iter()
            .map(|task| tokio::spawn(task.run(shutdown.clone())))
            .collect()
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No data (failure, timeout or empty result). Buffer untouched.
    Skipped,
    /// Bars ingested; the latest signal of every runnable strategy.
    Updated(Vec<SignalUpdate>),
}

/// The fetch → ingest → evaluate cycle of one symbol.
pub struct SymbolTask {
    symbol: String,
    buffer: RollingBuffer,
    /// Bars the slowest strategy on this symbol needs.
    warmup: usize,
    state: BufferState,
    last_fetch: Option<DateTime<Utc>>,
    store: Arc<dyn BarStore>,
    strategies: Arc<StrategySet>,
    config: LoopConfig,
    snapshot_tx: watch::Sender<Snapshot>,
    /// Snapshots of leg A for every pair this symbol is the reference of.
    peers: HashMap<String, watch::Receiver<Snapshot>>,
    update_tx: broadcast::Sender<SignalUpdate>,
}

impl SymbolTask {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Run one cycle: fetch, ingest, publish the snapshot, evaluate.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = Utc::now();
        let since = match self.last_fetch {
            Some(last) => last - self.config.fetch_overlap,
            None => now - self.config.initial_lookback,
        };

        let query = self.store.query(&self.symbol, since);
        let fetched = match tokio::time::timeout(self.config.fetch_timeout, query).await {
            Ok(Some(bars)) => bars,
            Ok(None) => {
                warn!(symbol = %self.symbol, since = %since, "No bars available, skipping cycle");
                return TickOutcome::Skipped;
            }
            Err(_) => {
                warn!(
                    symbol = %self.symbol,
                    timeout = ?self.config.fetch_timeout,
                    "Bar query timed out, skipping cycle"
                );
                return TickOutcome::Skipped;
            }
        };

        self.last_fetch = Some(now);
        let added = self.buffer.ingest(fetched);
        let snapshot: Snapshot = Arc::new(self.buffer.snapshot());
        self.snapshot_tx.send_replace(snapshot.clone());
        debug!(
            symbol = %self.symbol,
            added,
            buffered = snapshot.len(),
            capacity = self.buffer.capacity(),
            latest = ?self.buffer.latest_time(),
            "Buffer updated"
        );

        let state = self.buffer.state(self.warmup);
        if state != self.state {
            info!(
                symbol = %self.symbol,
                from = ?self.state,
                to = ?state,
                buffered = snapshot.len(),
                needed = self.warmup,
                "Buffer state changed"
            );
            self.state = state;
        }

        let updates = self.evaluate(&snapshot);
        for update in &updates {
            info!(
                symbol = %update.symbol,
                strategy = %update.strategy,
                time = %update.time,
                signal = %update.signal,
                "Latest signal"
            );
            // No subscribers is fine
            let _ = self.update_tx.send(update.clone());
        }
        TickOutcome::Updated(updates)
    }

    fn evaluate(&self, bars: &[Bar]) -> Vec<SignalUpdate> {
        let mut updates: Vec<SignalUpdate> = self
            .strategies
            .for_symbol(&self.symbol)
            .filter_map(|strategy| {
                let series = strategy.generate_signals(bars);
                series
                    .last()
                    .map(|p| SignalUpdate::from_point(&self.symbol, strategy.name(), p))
            })
            .collect();

        for pair in self.strategies.pairs_with_reference(&self.symbol) {
            let (leg_a, leg_b) = pair.legs();
            let Some(rx) = self.peers.get(leg_a) else {
                continue;
            };
            let leg_a_bars: Snapshot = rx.borrow().clone();
            if leg_a_bars.is_empty() || bars.is_empty() {
                debug!(pair = %pair.name(), "Waiting for both legs before evaluating");
                continue;
            }
            let series = pair.generate_signals(&leg_a_bars, bars);
            match series.last() {
                Some(point) => updates.push(SignalUpdate::from_point(
                    format!("{leg_a}/{leg_b}"),
                    pair.name(),
                    point,
                )),
                None => debug!(pair = %pair.name(), "Legs share no timestamps"),
            }
        }

        updates
    }

    /// Tick, sleep, repeat until shutdown. A tick in progress always
    /// completes; shutdown is only observed between cycles.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(symbol = %self.symbol, "Signal task running");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(symbol = %self.symbol, buffered = self.buffer.len(), "Signal task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use common::{Result, SignalValue};
    use strategy::{ArbitrageStrategy, MomentumStrategy, Strategy};

    use crate::store::MemoryBarStore;

    fn minutes_ago(base: DateTime<Utc>, n: i64) -> DateTime<Utc> {
        base - chrono::Duration::minutes(n)
    }

    /// `count` one-minute bars ending a minute before `base`, closes rising by 1.
    fn rising(symbol: &str, base: DateTime<Utc>, count: i64, start: f64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar::flat(symbol, minutes_ago(base, count - i), start + i as f64))
            .collect()
    }

    fn momentum(symbol: &str) -> Box<dyn Strategy> {
        Box::new(MomentumStrategy::new(format!("mom-{symbol}"), symbol, 5).unwrap())
    }

    fn signal_loop(
        store: Arc<dyn BarStore>,
        strategies: StrategySet,
        config: LoopConfig,
    ) -> (SignalLoop, broadcast::Receiver<SignalUpdate>) {
        let (update_tx, update_rx) = broadcast::channel(64);
        (SignalLoop::new(store, Arc::new(strategies), config, update_tx), update_rx)
    }

    fn take_task(tasks: &mut Vec<SymbolTask>, symbol: &str) -> SymbolTask {
        let idx = tasks.iter().position(|t| t.symbol() == symbol).unwrap();
        tasks.remove(idx)
    }

    /// Wraps a memory store and can be switched to fail every query.
    struct FlakyStore {
        inner: MemoryBarStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl BarStore for FlakyStore {
        async fn query(&self, symbol: &str, start: DateTime<Utc>) -> Option<Vec<Bar>> {
            if self.failing.load(Ordering::SeqCst) {
                return None;
            }
            self.inner.query(symbol, start).await
        }

        async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<()> {
            self.inner.append(symbol, bars).await
        }
    }

    /// Never answers queries for `stalled`; delegates everything else.
    struct StallingStore {
        inner: MemoryBarStore,
        stalled: &'static str,
    }

    #[async_trait]
    impl BarStore for StallingStore {
        async fn query(&self, symbol: &str, start: DateTime<Utc>) -> Option<Vec<Bar>> {
            if symbol == self.stalled {
                std::future::pending::<()>().await;
            }
            self.inner.query(symbol, start).await
        }

        async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<()> {
            self.inner.append(symbol, bars).await
        }
    }

    #[tokio::test]
    async fn tick_ingests_and_emits_latest_signal() {
        let base = Utc::now();
        let store = Arc::new(MemoryBarStore::new());
        store.append("AAPL", &rising("AAPL", base, 30, 100.0)).await.unwrap();

        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, mut update_rx) = signal_loop(store, set, LoopConfig::default());
        let mut tasks = signals.into_tasks();
        let mut task = take_task(&mut tasks, "AAPL");

        let TickOutcome::Updated(updates) = task.tick().await else {
            panic!("expected an update");
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].strategy, "mom-AAPL");
        assert_eq!(updates[0].signal, SignalValue::Buy);
        assert_eq!(updates[0].time, minutes_ago(base, 1));
        assert_eq!(task.buffer().len(), 30);

        assert_eq!(update_rx.recv().await.unwrap(), updates[0]);
    }

    #[tokio::test]
    async fn buffer_warms_up_to_the_slowest_window() {
        let base = Utc::now();
        let store = Arc::new(MemoryBarStore::new());
        store.append("AAPL", &rising("AAPL", base, 3, 100.0)).await.unwrap();

        // Overlap wide enough that the second fetch also sees the older bars
        let config = LoopConfig {
            fetch_overlap: chrono::Duration::minutes(60),
            ..LoopConfig::default()
        };
        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, _rx) = signal_loop(store.clone(), set, config);
        let mut task = take_task(&mut signals.into_tasks(), "AAPL");
        assert_eq!(task.state(), BufferState::Empty);

        task.tick().await;
        assert_eq!(task.state(), BufferState::Warming);

        // Momentum over 5 bars needs 6
        store.append("AAPL", &rising("AAPL", base, 6, 100.0)).await.unwrap();
        task.tick().await;
        assert_eq!(task.buffer().len(), 6);
        assert_eq!(task.state(), BufferState::Ready);
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_duplicate_bars() {
        let base = Utc::now();
        let store = Arc::new(MemoryBarStore::new());
        store.append("AAPL", &rising("AAPL", base, 10, 100.0)).await.unwrap();

        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, _rx) = signal_loop(store, set, LoopConfig::default());
        let mut task = take_task(&mut signals.into_tasks(), "AAPL");

        task.tick().await;
        task.tick().await;
        assert_eq!(task.buffer().len(), 10);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_buffer() {
        let base = Utc::now();
        let store = Arc::new(FlakyStore {
            inner: MemoryBarStore::new(),
            failing: AtomicBool::new(false),
        });
        store.append("AAPL", &rising("AAPL", base, 12, 100.0)).await.unwrap();

        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, _rx) = signal_loop(store.clone(), set, LoopConfig::default());
        let mut task = take_task(&mut signals.into_tasks(), "AAPL");

        assert!(matches!(task.tick().await, TickOutcome::Updated(_)));
        let before = task.buffer().snapshot();

        store.failing.store(true, Ordering::SeqCst);
        assert_eq!(task.tick().await, TickOutcome::Skipped);
        assert_eq!(task.buffer().snapshot(), before);
    }

    #[tokio::test]
    async fn empty_store_skips_cycle() {
        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, _rx) = signal_loop(Arc::new(MemoryBarStore::new()), set, LoopConfig::default());
        let mut task = take_task(&mut signals.into_tasks(), "AAPL");

        assert_eq!(task.tick().await, TickOutcome::Skipped);
        assert!(task.buffer().is_empty());
    }

    #[tokio::test]
    async fn stalled_query_times_out() {
        let store = Arc::new(StallingStore {
            inner: MemoryBarStore::new(),
            stalled: "AAPL",
        });
        let config = LoopConfig {
            fetch_timeout: Duration::from_millis(50),
            ..LoopConfig::default()
        };
        let set = StrategySet::new(vec![momentum("AAPL")], vec![]);
        let (signals, _rx) = signal_loop(store, set, config);
        let mut task = take_task(&mut signals.into_tasks(), "AAPL");

        assert_eq!(task.tick().await, TickOutcome::Skipped);
        assert!(task.buffer().is_empty());
    }

    #[tokio::test]
    async fn arbitrage_waits_for_both_legs() {
        let base = Utc::now();
        let store = Arc::new(MemoryBarStore::new());
        store.append("SPY", &rising("SPY", base, 10, 100.0)).await.unwrap();

        let pair = ArbitrageStrategy::new("aapl-spy", "AAPL", "SPY", 0.005).unwrap();
        let set = StrategySet::new(vec![], vec![pair]);
        let (signals, _rx) = signal_loop(store.clone(), set, LoopConfig::default());
        let mut tasks = signals.into_tasks();
        let mut aapl = take_task(&mut tasks, "AAPL");
        let mut spy = take_task(&mut tasks, "SPY");

        assert_eq!(spy.tick().await, TickOutcome::Updated(vec![]));

        store.append("AAPL", &rising("AAPL", base, 10, 110.0)).await.unwrap();
        assert_eq!(aapl.tick().await, TickOutcome::Updated(vec![]));

        let TickOutcome::Updated(updates) = spy.tick().await else {
            panic!("expected an update");
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].symbol, "AAPL/SPY");
        assert_eq!(updates[0].strategy, "aapl-spy");
        assert_eq!(updates[0].time, minutes_ago(base, 1));
    }

    #[tokio::test]
    async fn stalled_symbol_does_not_delay_others() {
        let base = Utc::now();
        let store = Arc::new(StallingStore {
            inner: MemoryBarStore::new(),
            stalled: "AAPL",
        });
        store.append("SPY", &rising("SPY", base, 10, 100.0)).await.unwrap();

        let config = LoopConfig {
            poll_interval: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(3600),
            ..LoopConfig::default()
        };
        let set = StrategySet::new(vec![momentum("AAPL"), momentum("SPY")], vec![]);
        let (signals, mut update_rx) = signal_loop(store, set, config);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = signals.spawn(shutdown_rx);

        let update = tokio::time::timeout(Duration::from_secs(2), update_rx.recv())
            .await
            .expect("SPY update should not wait on AAPL")
            .unwrap();
        assert_eq!(update.symbol, "SPY");

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn shutdown_stops_every_task() {
        let base = Utc::now();
        let store = Arc::new(MemoryBarStore::new());
        store.append("AAPL", &rising("AAPL", base, 10, 100.0)).await.unwrap();

        let config = LoopConfig {
            poll_interval: Duration::from_secs(3600),
            ..LoopConfig::default()
        };
        let set = StrategySet::new(vec![momentum("AAPL"), momentum("SPY")], vec![]);
        let (signals, mut update_rx) = signal_loop(store, set, config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = signals.spawn(shutdown_rx);

        // AAPL's first tick has completed once its update arrives
        update_rx.recv().await.unwrap();
        shutdown_tx.send(true).unwrap();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("task should stop on shutdown")
                .unwrap();
        }
    }
}
