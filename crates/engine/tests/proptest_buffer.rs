use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::Bar;
use engine::RollingBuffer;
use proptest::prelude::*;

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap() + Duration::minutes(minute)
}

fn batches() -> impl Strategy<Value = Vec<Vec<(i64, f64)>>> {
    prop::collection::vec(
        prop::collection::vec((0i64..300, 1.0f64..500.0), 0..40),
        1..8,
    )
}

proptest! {
    /// After any sequence of ingests the buffer is strictly ascending,
    /// bounded by its capacity, and holds the newest distinct timestamps.
    #[test]
    fn buffer_stays_ordered_bounded_and_deduplicated(
        capacity in 1usize..60,
        batches in batches(),
    ) {
        let mut buffer = RollingBuffer::new("AAPL", capacity);
        let mut model: BTreeMap<i64, f64> = BTreeMap::new();

        for batch in &batches {
            buffer.ingest(batch.iter().map(|&(m, c)| Bar::flat("AAPL", at(m), c)));
            for &(m, c) in batch {
                model.insert(m, c);
            }
            while model.len() > capacity {
                model.pop_first();
            }

            let snapshot = buffer.snapshot();
            prop_assert!(snapshot.len() <= capacity);
            prop_assert!(snapshot.windows(2).all(|w| w[0].time < w[1].time));

            let expected: Vec<(DateTime<Utc>, f64)> =
                model.iter().map(|(&m, &c)| (at(m), c)).collect();
            let actual: Vec<(DateTime<Utc>, f64)> =
                snapshot.iter().map(|b| (b.time, b.close)).collect();
            prop_assert_eq!(actual, expected);
        }
    }

    /// Re-ingesting the current contents changes nothing.
    #[test]
    fn reingest_is_a_no_op(
        capacity in 1usize..60,
        batch in prop::collection::vec((0i64..300, 1.0f64..500.0), 0..80),
    ) {
        let mut buffer = RollingBuffer::new("AAPL", capacity);
        buffer.ingest(batch.iter().map(|&(m, c)| Bar::flat("AAPL", at(m), c)));
        let before = buffer.snapshot();

        prop_assert_eq!(buffer.ingest(before.clone()), 0);
        prop_assert_eq!(buffer.snapshot(), before);
    }
}
