//! Property tests over randomly generated, always-valid bar series.

use chrono::NaiveDate;
use klinescan::prelude::{
    CandleStick, EngineBuilder, PatternEngine, PivotKind, PivotScanner, OHLCV,
};
use klinescan::registry;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// (close - open, upper wick, lower wick) in cents, plus volume
type Step = (i64, i64, i64, u64);

fn build(steps: Vec<Step>) -> Vec<CandleStick> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut price = 100_000i64;
    steps
        .into_iter()
        .enumerate()
        .map(|(i, (delta, up, down, volume))| {
            let open = price;
            let close = price + delta;
            price = close;
            CandleStick::new(
                start + chrono::Duration::days(i as i64),
                Decimal::new(open, 2),
                Decimal::new(open.max(close) + up, 2),
                Decimal::new(open.min(close) - down, 2),
                Decimal::new(close, 2),
                volume,
            )
            .unwrap()
        })
        .collect()
}

fn series(max_len: usize) -> impl Strategy<Value = Vec<CandleStick>> {
    prop::collection::vec(
        (-300i64..=300, 0i64..=300, 0i64..=300, 100u64..5_000),
        0..max_len,
    )
    .prop_map(build)
}

fn engine() -> PatternEngine {
    EngineBuilder::new().with_all_defaults().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn detection_is_deterministic(bars in series(80)) {
        let engine = engine();
        let first = engine.detect(&bars, None).unwrap();
        let second = engine.detect(&bars, None).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn results_are_well_formed(bars in series(80)) {
        let engine = engine();
        for p in engine.detect(&bars, None).unwrap() {
            let meta = registry::lookup(p.pattern_id);
            prop_assert!(meta.is_some());
            prop_assert_eq!(p.name, meta.unwrap().name);
            prop_assert!(p.strength <= 100);
            prop_assert_eq!(p.confidence, p.strength);
            prop_assert!(p.start_index <= p.end_index);
            prop_assert_eq!(p.end_index, bars.len() - 1);
            prop_assert!(p.pattern_low <= p.pattern_high);
            prop_assert!(!p.involved_dates.is_empty());
            prop_assert!(p.involved_dates.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(p.detection_date, bars[bars.len() - 1].date());
        }
    }

    #[test]
    fn short_input_yields_nothing(bars in series(80)) {
        let engine = engine();
        for detector in engine.detectors() {
            let short = bars.len().min(detector.min_bars().saturating_sub(1));
            prop_assert!(detector.detect(&bars[..short], None).is_empty());
        }
    }

    #[test]
    fn emitted_ids_are_declared(bars in series(80)) {
        let engine = engine();
        for detector in engine.detectors() {
            for p in detector.detect(&bars, None) {
                prop_assert!(detector.pattern_ids().contains(&p.pattern_id));
            }
        }
    }

    #[test]
    fn history_of_prefix_is_subset(bars in series(45), cut in 0usize..45) {
        let engine = engine();
        let cut = cut.min(bars.len());
        let full = engine.scan_history(&bars, None).unwrap();
        let prefix = engine.scan_history(&bars[..cut], None).unwrap();
        for p in &prefix {
            prop_assert!(full.contains(p));
        }
    }

    #[test]
    fn pivots_mirror_under_time_reversal(bars in series(80)) {
        let scanner = PivotScanner::default();
        let n = bars.len();
        let reversed: Vec<CandleStick> = bars.iter().rev().cloned().collect();

        let mut forward: Vec<_> = scanner
            .scan(&bars)
            .iter()
            .map(|p| (p.index, p.kind, p.price))
            .collect();
        let mut backward: Vec<_> = scanner
            .scan(&reversed)
            .iter()
            .map(|p| (n - 1 - p.index, p.kind, p.price))
            .collect();
        forward.sort_by_key(|k| (k.0, k.1 == PivotKind::Trough));
        backward.sort_by_key(|k| (k.0, k.1 == PivotKind::Trough));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn rising_series_has_no_pivots(n in 11usize..80, step in 1i64..500) {
        let steps = vec![(step, 10, 10, 1_000); n];
        let bars = build(steps);
        prop_assert!(PivotScanner::default().scan(&bars).is_empty());
    }
}
