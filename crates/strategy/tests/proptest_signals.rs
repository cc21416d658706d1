use chrono::{Duration, TimeZone, Utc};
use common::{Bar, SignalValue};
use proptest::prelude::*;
use strategy::{ArbitrageStrategy, MeanReversionStrategy, MomentumStrategy, Strategy};

fn bars(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::flat(symbol, start + Duration::minutes(i as i64), c))
        .collect()
}

fn sign(v: f64) -> SignalValue {
    if v > 0.0 {
        SignalValue::Buy
    } else if v < 0.0 {
        SignalValue::Sell
    } else {
        SignalValue::Hold
    }
}

proptest! {
    /// Fewer than window + 1 bars never produce a momentum trade.
    #[test]
    fn momentum_short_input_holds(
        window in 1usize..30,
        closes in prop::collection::vec(0.01f64..10_000.0, 0..30),
    ) {
        prop_assume!(closes.len() <= window);
        let s = MomentumStrategy::new("m", "X", window).unwrap();
        let series = s.generate_signals(&bars("X", &closes));
        prop_assert_eq!(series.len(), closes.len());
        prop_assert!(series.signals().iter().all(|v| *v == SignalValue::Hold));
    }

    /// Fewer than window bars never produce a mean-reversion trade.
    #[test]
    fn mean_reversion_short_input_holds(
        window in 1usize..30,
        closes in prop::collection::vec(0.01f64..10_000.0, 0..30),
    ) {
        prop_assume!(closes.len() < window);
        let s = MeanReversionStrategy::new("mr", "X", window, 2.0).unwrap();
        let series = s.generate_signals(&bars("X", &closes));
        prop_assert!(series.signals().iter().all(|v| *v == SignalValue::Hold));
    }

    /// signal[i] = sign(close[i] - close[i - window]) once warmed up.
    #[test]
    fn momentum_signal_is_sign_of_change(
        window in 1usize..10,
        closes in prop::collection::vec(0.01f64..10_000.0, 1..60),
    ) {
        let s = MomentumStrategy::new("m", "X", window).unwrap();
        let signals = s.generate_signals(&bars("X", &closes)).signals();
        for i in window..closes.len() {
            prop_assert_eq!(signals[i], sign(closes[i] - closes[i - window]));
        }
    }

    /// Strategies never panic, whatever the prices look like.
    #[test]
    fn strategies_survive_degenerate_prices(
        closes in prop::collection::vec(
            prop_oneof![Just(0.0f64), Just(f64::NAN), Just(-1.0f64), -1e9f64..1e9],
            0..40,
        ),
    ) {
        let data = bars("X", &closes);
        let m = MomentumStrategy::new("m", "X", 3).unwrap().generate_signals(&data);
        let mr = MeanReversionStrategy::new("mr", "X", 5, 2.0).unwrap().generate_signals(&data);
        prop_assert_eq!(m.len(), closes.len());
        prop_assert_eq!(mr.len(), closes.len());

        let arb = ArbitrageStrategy::new("arb", "X", "Y", 0.01).unwrap();
        let other = bars("Y", &closes);
        prop_assert_eq!(arb.generate_signals(&data, &other).len(), closes.len());
    }

    /// Swapping the legs and negating the threshold inverts every trade.
    #[test]
    fn arbitrage_mirror_inverts_trades(
        threshold in 0.0001f64..0.2,
        rows in prop::collection::vec((1.0f64..1_000.0, 1.0f64..1_000.0), 1..40),
    ) {
        let a_closes: Vec<f64> = rows.iter().map(|r| r.0).collect();
        let b_closes: Vec<f64> = rows.iter().map(|r| r.1).collect();
        let a = bars("A", &a_closes);
        let b = bars("B", &b_closes);

        let arb = ArbitrageStrategy::new("arb", "A", "B", threshold).unwrap();
        let forward = arb.generate_signals(&a, &b);
        let backward = arb.mirrored().generate_signals(&b, &a);

        prop_assert_eq!(forward.len(), backward.len());
        for (f, r) in forward.points.iter().zip(&backward.points) {
            if f.signal != SignalValue::Hold {
                prop_assert_eq!(r.signal, f.signal.inverted());
            }
        }
    }
}
