use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};

use common::{Bar, MarketDataFeed, Result, SignalValue};
use engine::{spawn_live_ingest, LoopConfig, MemoryBarStore, SignalLoop, TickOutcome};
use strategy::{StrategyFileConfig, StrategySet};

const STRATEGIES: &str = r#"
[[strategy]]
type = "momentum"
name = "aapl-momentum"
symbol = "AAPL"
params = { window = 5 }

[[strategy]]
type = "mean_reversion"
name = "aapl-bands"
symbol = "AAPL"
params = { window = 20, std_dev = 2.0 }

[[strategy]]
type = "arbitrage"
name = "aapl-spy"
symbol = "AAPL"
hedge = "SPY"
params = { threshold = 0.005 }
"#;

struct ScriptedFeed {
    bars: Vec<Bar>,
}

#[async_trait]
impl MarketDataFeed for ScriptedFeed {
    async fn subscribe(&self, symbol: &str, bar_tx: mpsc::Sender<Bar>) -> Result<()> {
        for bar in self.bars.iter().filter(|b| b.symbol == symbol) {
            if bar_tx.send(bar.clone()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn minute_bars(symbol: &str, base: DateTime<Utc>, closes: &[f64]) -> Vec<Bar> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::flat(symbol, base - Duration::minutes(n - i as i64), c))
        .collect()
}

#[tokio::test]
async fn streamed_bars_flow_into_signals() {
    let base = Utc::now();
    let aapl: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let spy: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.5).collect();

    let mut bars = minute_bars("AAPL", base, &aapl);
    bars.extend(minute_bars("SPY", base, &spy));
    let feed: Arc<dyn MarketDataFeed> = Arc::new(ScriptedFeed { bars });

    let store = Arc::new(MemoryBarStore::new());
    for symbol in ["AAPL", "SPY"] {
        let (feed_task, forward_task) = spawn_live_ingest(symbol.to_string(), feed.clone(), store.clone());
        feed_task.await.unwrap();
        assert_eq!(forward_task.await.unwrap(), 30);
    }

    let file_cfg = StrategyFileConfig::parse(STRATEGIES).unwrap();
    let strategies = Arc::new(StrategySet::from_config(&file_cfg).unwrap());
    let (update_tx, _update_rx) = broadcast::channel(64);
    let signal_loop = SignalLoop::new(store, strategies, LoopConfig::default(), update_tx);

    let mut tasks = signal_loop.into_tasks();
    assert_eq!(tasks.len(), 2);

    let aapl_pos = tasks.iter().position(|t| t.symbol() == "AAPL").unwrap();
    let mut aapl_task = tasks.remove(aapl_pos);
    let mut spy_task = tasks.remove(0);

    let TickOutcome::Updated(aapl_updates) = aapl_task.tick().await else {
        panic!("AAPL tick skipped");
    };
    let names: Vec<&str> = aapl_updates.iter().map(|u| u.strategy.as_str()).collect();
    assert_eq!(names, vec!["aapl-momentum", "aapl-bands"]);
    assert_eq!(aapl_updates[0].signal, SignalValue::Buy);

    let TickOutcome::Updated(spy_updates) = spy_task.tick().await else {
        panic!("SPY tick skipped");
    };
    assert_eq!(spy_updates.len(), 1);
    assert_eq!(spy_updates[0].symbol, "AAPL/SPY");
    // Last row: 129 / 114.5 - 1 is far above the threshold
    assert_eq!(spy_updates[0].signal, SignalValue::Buy);
}
