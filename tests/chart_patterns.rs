//! Integration tests for pivot-based chart formations.
//!
//! Series are drawn by linear interpolation between waypoints. Each bar has its high
//! on the drawn line and its low one unit below it.

use chrono::NaiveDate;
use klinescan::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

fn bar_at(i: usize, mid: Decimal) -> CandleStick {
    CandleStick::new(
        day(i),
        mid - dec!(0.75),
        mid,
        mid - dec!(1),
        mid - dec!(0.25),
        1_000,
    )
    .unwrap()
}

/// Piecewise-linear series through `points`; the last waypoint ends the series.
fn waypoints(points: &[(usize, Decimal)]) -> Vec<CandleStick> {
    let len = points.last().map(|p| p.0 + 1).unwrap_or(0);
    (0..len)
        .map(|i| {
            let seg = points
                .windows(2)
                .find(|w| w[0].0 <= i && i <= w[1].0)
                .unwrap();
            let ((x0, y0), (x1, y1)) = (seg[0], seg[1]);
            let mid = y0 + (y1 - y0) * Decimal::from((i - x0) as u64) / Decimal::from((x1 - x0) as u64);
            bar_at(i, mid)
        })
        .collect()
}

fn double_top_series() -> Vec<CandleStick> {
    waypoints(&[
        (0, dec!(100)),
        (12, dec!(120)),
        (22, dec!(111)),
        (32, dec!(120.5)),
        (39, dec!(114)),
    ])
}

fn head_and_shoulders_series() -> Vec<CandleStick> {
    waypoints(&[
        (0, dec!(100)),
        (10, dec!(115)),
        (17, dec!(108)),
        (25, dec!(125)),
        (33, dec!(108.5)),
        (40, dec!(115.5)),
        (49, dec!(105)),
    ])
}

fn inverse_head_and_shoulders_series() -> Vec<CandleStick> {
    waypoints(&[
        (0, dec!(125)),
        (10, dec!(111)),
        (17, dec!(118)),
        (25, dec!(101)),
        (33, dec!(117.5)),
        (40, dec!(110.5)),
        (49, dec!(121)),
    ])
}

/// Peaks 103.5 and 102 around a trough at 100: the trough is a valid pivot but the
/// average peak is only 2.75% above it.
fn shallow_double_top_series() -> Vec<CandleStick> {
    waypoints(&[
        (0, dec!(90)),
        (12, dec!(103.5)),
        (16, dec!(101)),
        (21, dec!(102)),
        (31, dec!(90)),
    ])
}

// ============================================================
// PIVOTS
// ============================================================

#[test]
fn test_double_top_pivots() {
    let bars = double_top_series();
    let pivots = PivotScanner::default().scan(&bars);

    let peaks: Vec<_> = pivots
        .iter()
        .filter(|p| p.kind == PivotKind::Peak)
        .map(|p| (p.index, p.price))
        .collect();
    let troughs: Vec<_> = pivots
        .iter()
        .filter(|p| p.kind == PivotKind::Trough)
        .map(|p| (p.index, p.price))
        .collect();

    assert_eq!(peaks, vec![(12, dec!(120)), (32, dec!(120.5))]);
    assert_eq!(troughs, vec![(22, dec!(110))]);
    assert!(pivots.windows(2).all(|w| w[0].index <= w[1].index));
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

#[test]
fn test_double_top() {
    let bars = double_top_series();
    let patterns = DoubleTopBottomDetector::with_defaults().detect(&bars, None);

    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.pattern_id, ids::DOUBLE_TOP);
    assert_eq!(p.category, PatternCategory::ChartReversal);
    assert_eq!(p.neckline, Some(dec!(110)));
    assert_eq!(p.target_price, Some(dec!(100)));
    assert_eq!(p.stop_loss, Some(dec!(120.5)));
    assert_eq!(p.involved_dates, vec![day(12), day(22), day(32)]);
    assert_eq!(p.start_index, 12);
    assert_eq!(p.end_index, 39);
    assert_eq!(p.detection_date, day(39));
    assert_eq!(p.pattern_low, dec!(110));
    assert_eq!(p.pattern_high, dec!(120.5));
    assert_eq!(p.detail("neckline_broken"), Some(0.0));
    assert_eq!(p.detail("span_bars"), Some(20.0));
    // aligned base, equal-level bonus, span bonus
    assert_eq!(p.strength, 85);
}

#[test]
fn test_double_top_with_supplied_trend() {
    let bars = double_top_series();
    let detector = DoubleTopBottomDetector::with_defaults();

    let opposed = detector.detect(&bars, Some(TrendContext::Downtrend));
    assert_eq!(opposed[0].strength, 65);

    let unknown = detector.detect(&bars, Some(TrendContext::Unknown));
    assert_eq!(unknown[0].strength, 75);
}

#[test]
fn test_double_top_rejects_uneven_peaks() {
    let bars = waypoints(&[
        (0, dec!(100)),
        (12, dec!(120)),
        (22, dec!(111)),
        (32, dec!(126)),
        (39, dec!(118)),
    ]);
    let patterns = DoubleTopBottomDetector::with_defaults().detect(&bars, None);
    assert!(patterns.iter().all(|p| p.pattern_id != ids::DOUBLE_TOP));
}

#[test]
fn test_double_top_rejects_shallow_formation() {
    let bars = shallow_double_top_series();
    let pivots = PivotScanner::default().scan(&bars);
    let points: Vec<_> = pivots.iter().map(|p| (p.index, p.kind, p.price)).collect();
    assert_eq!(
        points,
        vec![
            (12, PivotKind::Peak, dec!(103.5)),
            (16, PivotKind::Trough, dec!(100)),
            (21, PivotKind::Peak, dec!(102)),
        ]
    );

    assert!(DoubleTopBottomDetector::with_defaults()
        .detect(&bars, None)
        .is_empty());

    let lenient = DoubleTopBottomDetector {
        min_height_ratio: Ratio::new(0.02).unwrap(),
        ..DoubleTopBottomDetector::with_defaults()
    };
    let patterns = lenient.detect(&bars, None);
    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.pattern_id, ids::DOUBLE_TOP);
    assert_eq!(p.neckline, Some(dec!(100)));
    // measured from the lower peak
    assert_eq!(p.target_price, Some(dec!(98)));
    assert_eq!(p.stop_loss, Some(dec!(103.5)));
}

#[test]
fn test_double_bottom_in_shoulder_troughs() {
    // the two neckline troughs of a head and shoulders also form a double bottom
    let bars = head_and_shoulders_series();
    let patterns = DoubleTopBottomDetector::with_defaults().detect(&bars, None);

    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.pattern_id, ids::DOUBLE_BOTTOM);
    assert_eq!(p.neckline, Some(dec!(125)));
    assert_eq!(p.stop_loss, Some(dec!(107)));
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

#[test]
fn test_head_and_shoulders() {
    let bars = head_and_shoulders_series();
    let patterns = HeadAndShouldersDetector::with_defaults().detect(&bars, None);

    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.pattern_id, ids::HEAD_AND_SHOULDERS);
    assert_eq!(p.neckline, Some(dec!(107)));
    assert_eq!(p.target_price, Some(dec!(89)));
    assert_eq!(p.stop_loss, Some(dec!(115.5)));
    assert_eq!(
        p.involved_dates,
        vec![day(10), day(17), day(25), day(33), day(40)]
    );
    assert_eq!(p.detail("neckline_broken"), Some(1.0));
    assert_eq!(p.detail("duration_ratio"), Some(1.0));
    assert_eq!(p.strength, 100);
}

#[test]
fn test_head_and_shoulders_with_all_defaults() {
    let bars = head_and_shoulders_series();
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let patterns = engine.detect(&bars, None).unwrap();

    assert!(patterns
        .iter()
        .any(|p| p.pattern_id == ids::HEAD_AND_SHOULDERS));
}

#[test]
fn test_head_must_exceed_shoulders() {
    let bars = waypoints(&[
        (0, dec!(100)),
        (10, dec!(115)),
        (17, dec!(108)),
        (25, dec!(115.2)),
        (33, dec!(108.5)),
        (40, dec!(115.5)),
        (49, dec!(105)),
    ]);
    let patterns = HeadAndShouldersDetector::with_defaults().detect(&bars, None);
    assert!(patterns.is_empty());
}

#[test]
fn test_shoulders_must_match() {
    // right shoulder 119 is 3.5% above the left one at 115
    let bars = waypoints(&[
        (0, dec!(100)),
        (10, dec!(115)),
        (17, dec!(108)),
        (25, dec!(125)),
        (33, dec!(108.5)),
        (40, dec!(119)),
        (49, dec!(105)),
    ]);
    assert!(HeadAndShouldersDetector::with_defaults()
        .detect(&bars, None)
        .is_empty());

    let wide = HeadAndShouldersDetector {
        shoulder_tolerance_factor: 2.0,
        ..HeadAndShouldersDetector::with_defaults()
    };
    let patterns = wide.detect(&bars, None);
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_id, ids::HEAD_AND_SHOULDERS);
    assert_eq!(patterns[0].neckline, Some(dec!(107)));
}

#[test]
fn test_inverse_head_and_shoulders() {
    let bars = inverse_head_and_shoulders_series();
    let patterns = HeadAndShouldersDetector::with_defaults().detect(&bars, None);

    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.pattern_id, ids::INVERSE_HEAD_AND_SHOULDERS);
    assert_eq!(p.direction(), Direction::Bullish);
    // higher of the two reaction peaks
    assert_eq!(p.neckline, Some(dec!(118)));
    assert_eq!(p.target_price, Some(dec!(136)));
    assert_eq!(p.stop_loss, Some(dec!(109.5)));
    assert_eq!(p.pattern_low, dec!(100));
    assert_eq!(p.pattern_high, dec!(118));
    assert_eq!(
        p.involved_dates,
        vec![day(10), day(17), day(25), day(33), day(40)]
    );
    assert_eq!(p.detail("neckline_broken"), Some(1.0));
    assert_eq!(p.strength, 100);
}

#[test]
fn test_shared_pivots_match_own_scan() {
    let bars = head_and_shoulders_series();
    let hs = HeadAndShouldersDetector::with_defaults();
    let pivots = hs.scanner.scan(&bars);

    assert_eq!(
        hs.detect_with_pivots(&bars, &pivots, None),
        hs.detect(&bars, None)
    );

    let double = DoubleTopBottomDetector::with_defaults();
    assert_eq!(
        double.detect_with_pivots(&bars, &pivots, None),
        double.detect(&bars, None)
    );
}

#[test]
fn test_scanner_thresholds_from_params() {
    use std::collections::HashMap;

    let mut params = HashMap::new();
    params.insert("lookback", 3.0);
    params.insert("min_swing_ratio", 0.05);

    let hs = HeadAndShouldersDetector::with_params(&params).unwrap();
    assert_eq!(hs.scanner.lookback.get(), 3);
    assert_eq!(hs.scanner.min_swing_ratio.get(), 0.05);
    assert_eq!(hs.scanner.neighborhood, PivotScanner::default().neighborhood);

    let double = DoubleTopBottomDetector::with_params(&params).unwrap();
    assert_eq!(double.scanner.lookback.get(), 3);

    let defaults = DoubleTopBottomDetector::with_params(&HashMap::new()).unwrap();
    assert_eq!(defaults.scanner, PivotScanner::default());

    params.insert("lookback", 0.0);
    assert!(HeadAndShouldersDetector::with_params(&params).is_err());
}

// ============================================================
// DATA SUFFICIENCY
// ============================================================

#[test]
fn test_short_input_is_empty() {
    let bars: Vec<_> = (0..3).map(|i| bar_at(i, dec!(100))).collect();
    assert!(HeadAndShouldersDetector::with_defaults()
        .detect(&bars, None)
        .is_empty());
    assert!(DoubleTopBottomDetector::with_defaults()
        .detect(&bars, None)
        .is_empty());

    let engine = EngineBuilder::new().with_chart_defaults().build().unwrap();
    assert!(engine.detect(&bars, None).unwrap().is_empty());
}

#[test]
fn test_below_min_bars_is_empty() {
    let bars = head_and_shoulders_series();
    let detector = HeadAndShouldersDetector::with_defaults();
    assert!(detector
        .detect(&bars[..detector.min_bars() - 1], None)
        .is_empty());
}

#[test]
fn test_chart_catalog() {
    let engine = EngineBuilder::new().with_chart_defaults().build().unwrap();
    let listed: Vec<_> = engine.catalog().iter().map(|m| m.id).collect();
    assert_eq!(listed.len(), 4);
    assert!(listed.contains(&ids::INVERSE_HEAD_AND_SHOULDERS));
}
