//! Shared scaffolding for candlestick and chart detectors
//!
//! Ratio primitives, the short-trend heuristic, volume confirmation, the strength
//! accumulator, target/stop projection and result assembly. Every function here is pure.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::error;

use crate::registry::{self, Alignment, PatternMetadata};
use crate::result::{DetectedPattern, PatternDraft};
use crate::{Direction, OHLCVExt, PatternId, TrendContext, OHLCV};

// ============================================================
// THRESHOLDS
// ============================================================

/// Body is doji-like: body / range <= DOJI_BODY_RATIO
pub const DOJI_BODY_RATIO: f64 = 0.10;
/// Body is small: body / range <= SMALL_BODY_RATIO
pub const SMALL_BODY_RATIO: f64 = 0.30;
/// Hammer family tolerates a slightly larger body
pub const HAMMER_BODY_RATIO: f64 = 0.35;
/// Body is large: body / range >= LARGE_BODY_RATIO
pub const LARGE_BODY_RATIO: f64 = 0.60;
/// Marubozu body: body / range >= MARUBOZU_BODY_RATIO
pub const MARUBOZU_BODY_RATIO: f64 = 0.85;
/// Long shadow: shadow >= body * LONG_SHADOW_FACTOR
pub const LONG_SHADOW_FACTOR: f64 = 2.0;
/// Short shadow: shadow <= body * SHORT_SHADOW_FACTOR
pub const SHORT_SHADOW_FACTOR: f64 = 0.3;

/// Bars averaged for the volume baseline
pub const VOLUME_PERIOD: usize = 20;
/// Strong volume confirmation
pub const VOLUME_SURGE_FACTOR: f64 = 1.5;
/// Mild volume confirmation
pub const VOLUME_CONFIRM_FACTOR: f64 = 1.2;
/// Closes averaged by the trend heuristic
pub const TREND_PERIOD: usize = 5;

// ============================================================
// RATIO PRIMITIVES
// ============================================================

/// `num / den` as f64. None when the denominator is not positive.
#[inline]
pub fn ratio(num: Decimal, den: Decimal) -> Option<f64> {
    if den <= Decimal::ZERO {
        return None;
    }
    num.checked_div(den)?.to_f64()
}

/// Like [`ratio`] with a zero fallback
#[inline]
pub fn ratio_or_zero(num: Decimal, den: Decimal) -> f64 {
    ratio(num, den).unwrap_or(0.0)
}

/// True if the body of `outer` contains the body of `inner` (edges inclusive).
#[inline]
pub fn body_contains<A: OHLCV, B: OHLCV>(outer: &A, inner: &B) -> bool {
    outer.body_bottom() <= inner.body_bottom() && inner.body_top() <= outer.body_top()
}

/// True if the high/low range of `outer` contains that of `inner`.
#[inline]
pub fn range_contains<A: OHLCV, B: OHLCV>(outer: &A, inner: &B) -> bool {
    outer.low() <= inner.low() && inner.high() <= outer.high()
}

/// Outcome of comparing two price levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMatch {
    /// |other - reference| / reference
    pub deviation: f64,
    pub exact: bool,
}

/// Compare `other` against `reference` with a relative tolerance.
pub fn match_levels(reference: Decimal, other: Decimal, tolerance: f64) -> Option<LevelMatch> {
    if reference == other {
        return Some(LevelMatch {
            deviation: 0.0,
            exact: true,
        });
    }
    let deviation = ratio((other - reference).abs(), reference.abs())?;
    (deviation <= tolerance).then_some(LevelMatch {
        deviation,
        exact: false,
    })
}

// ============================================================
// TREND
// ============================================================

/// Trend leading into bar `at`.
///
/// Compares the close of `at - 1` with the mean close of the five bars before it.
/// Fewer than six prior bars gives `Unknown`.
pub fn infer_trend<T: OHLCV>(bars: &[T], at: usize) -> TrendContext {
    if at < TREND_PERIOD + 1 || at > bars.len() {
        return TrendContext::Unknown;
    }
    let last = bars[at - 1].close();
    let window = &bars[at - 1 - TREND_PERIOD..at - 1];
    let mean = window.iter().map(OHLCV::close).sum::<Decimal>() / Decimal::from(TREND_PERIOD);

    if last > mean {
        TrendContext::Uptrend
    } else if last < mean {
        TrendContext::Downtrend
    } else {
        TrendContext::Unknown
    }
}

/// Caller-supplied trend, or the heuristic at `at` when none was given.
#[inline]
pub fn resolve_trend<T: OHLCV>(given: Option<TrendContext>, bars: &[T], at: usize) -> TrendContext {
    given.unwrap_or_else(|| infer_trend(bars, at))
}

// ============================================================
// VOLUME
// ============================================================

/// Mean volume of up to `period` bars preceding `at`. None without history or when zero.
pub fn trailing_avg_volume<T: OHLCV>(bars: &[T], at: usize, period: usize) -> Option<f64> {
    if at == 0 || at > bars.len() || period == 0 {
        return None;
    }
    let slice = &bars[at.saturating_sub(period)..at];
    let sum: u128 = slice.iter().map(|b| u128::from(b.volume())).sum();
    let avg = sum as f64 / slice.len() as f64;
    (avg > 0.0).then_some(avg)
}

/// Volume of bar `at` relative to its trailing baseline
pub fn volume_ratio<T: OHLCV>(bars: &[T], at: usize) -> Option<f64> {
    let bar = bars.get(at)?;
    let avg = trailing_avg_volume(bars, at, VOLUME_PERIOD)?;
    Some(bar.volume() as f64 / avg)
}

#[inline]
pub fn volume_at_least<T: OHLCV>(bars: &[T], at: usize, factor: f64) -> bool {
    volume_ratio(bars, at).is_some_and(|r| r >= factor)
}

// ============================================================
// STRENGTH
// ============================================================

/// Base strength by trend alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseScores {
    pub aligned: u8,
    pub unknown: u8,
    pub opposed: u8,
}

impl BaseScores {
    pub const fn new(aligned: u8, unknown: u8, opposed: u8) -> Self {
        Self {
            aligned,
            unknown,
            opposed,
        }
    }

    #[inline]
    pub fn for_alignment(self, alignment: Alignment) -> u8 {
        match alignment {
            Alignment::Aligned => self.aligned,
            Alignment::Unknown => self.unknown,
            Alignment::Opposed => self.opposed,
        }
    }

    /// Base score for pattern `id` under `trend`
    pub fn score(self, id: PatternId, trend: TrendContext) -> u8 {
        registry::lookup(id)
            .map(|m| self.for_alignment(m.bias.alignment(trend)))
            .unwrap_or(self.unknown)
    }
}

/// Chart formations share one table
pub const CHART_BASE: BaseScores = BaseScores::new(70, 60, 50);

/// Strength accumulator, clamped to 0..=100 on read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strength(i32);

impl Strength {
    #[inline]
    pub fn base(score: u8) -> Self {
        Self(i32::from(score))
    }

    #[inline]
    pub fn add(self, bonus: i32) -> Self {
        Self(self.0 + bonus)
    }

    #[inline]
    pub fn add_if(self, cond: bool, bonus: i32) -> Self {
        if cond {
            self.add(bonus)
        } else {
            self
        }
    }

    #[inline]
    pub fn value(self) -> u8 {
        self.0.clamp(0, 100) as u8
    }
}

// ============================================================
// LEVELS
// ============================================================

/// Lowest low and highest high of a window
pub fn window_bounds<T: OHLCV>(window: &[T]) -> Option<(Decimal, Decimal)> {
    let first = window.first()?;
    Some(window.iter().fold((first.low(), first.high()), |(lo, hi), b| {
        (lo.min(b.low()), hi.max(b.high()))
    }))
}

/// Target and stop projected from the formation's range.
///
/// Bullish: target = close + range, stop = low - range / 2. Bearish mirrors it.
/// Neutral patterns get no levels.
pub fn project_levels(
    direction: Direction,
    last_close: Decimal,
    low: Decimal,
    high: Decimal,
) -> (Option<Decimal>, Option<Decimal>) {
    let range = high - low;
    let half = range / Decimal::TWO;
    match direction {
        Direction::Bullish => (Some(last_close + range), Some(low - half)),
        Direction::Bearish => (Some(last_close - range), Some(high + half)),
        Direction::Neutral => (None, None),
    }
}

// ============================================================
// RESULT ASSEMBLY
// ============================================================

/// Start index of the trailing `n`-bar formation, or None when there are too few bars
#[inline]
pub fn tail_start<T>(bars: &[T], n: usize) -> Option<usize> {
    (n > 0 && bars.len() >= n).then(|| bars.len() - n)
}

/// Registry metadata for `id`.
///
/// A detector emitting an unregistered id is a bug: it is logged, asserted in debug
/// builds and the pattern is dropped.
pub fn resolve(id: PatternId) -> Option<&'static PatternMetadata> {
    let meta = registry::lookup(id);
    if meta.is_none() {
        error!(pattern = id.as_str(), "no metadata registered, dropping pattern");
        debug_assert!(false, "no metadata registered for {}", id.as_str());
    }
    meta
}

/// Draft covering `bars[start..]`
pub fn formation<T: OHLCV>(bars: &[T], start: usize, strength: u8) -> Option<PatternDraft> {
    let window = bars.get(start..)?;
    let last = window.last()?;
    let (low, high) = window_bounds(window)?;
    Some(PatternDraft {
        strength,
        detection_date: last.date(),
        involved_dates: window.iter().map(OHLCV::date).collect(),
        start_index: start,
        end_index: bars.len() - 1,
        pattern_low: low,
        pattern_high: high,
        neckline: None,
        target_price: None,
        stop_loss: None,
        details: BTreeMap::new(),
    })
}

/// Finish a candlestick draft, projecting levels from the pattern's bias.
pub fn finish_candle<T: OHLCV>(
    id: PatternId,
    bars: &[T],
    draft: PatternDraft,
) -> Option<DetectedPattern> {
    let meta = resolve(id)?;
    let last_close = bars.last()?.close();
    let (target, stop) = project_levels(
        meta.bias.direction(),
        last_close,
        draft.pattern_low,
        draft.pattern_high,
    );
    Some(draft.levels(target, stop).finish(meta))
}

/// Finish a draft whose levels the detector set itself.
pub fn finish(id: PatternId, draft: PatternDraft) -> Option<DetectedPattern> {
    resolve(id).map(|meta| draft.finish(meta))
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CandleStick;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn closes(values: &[Decimal]) -> Vec<CandleStick> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                CandleStick::new(
                    start + chrono::Duration::days(i as i64),
                    c,
                    c + dec!(1),
                    c - dec!(1),
                    c,
                    100 * (i as u64 + 1),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_ratio_guards_zero() {
        assert_eq!(ratio(dec!(5), dec!(0)), None);
        assert_eq!(ratio_or_zero(dec!(5), dec!(0)), 0.0);
        assert!((ratio(dec!(1), dec!(4)).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_match_levels() {
        let exact = match_levels(dec!(105.00), dec!(105.00), 0.005).unwrap();
        assert!(exact.exact);

        let near = match_levels(dec!(105.00), dec!(105.40), 0.005).unwrap();
        assert!(!near.exact);
        assert!((near.deviation - 0.4 / 105.0).abs() < 1e-9);

        assert!(match_levels(dec!(105.00), dec!(106.00), 0.005).is_none());
    }

    #[test]
    fn test_infer_trend() {
        let rising = closes(&[dec!(10), dec!(11), dec!(12), dec!(13), dec!(14), dec!(15), dec!(16)]);
        assert_eq!(infer_trend(&rising, 6), TrendContext::Uptrend);
        assert_eq!(infer_trend(&rising, 5), TrendContext::Unknown);

        let falling = closes(&[dec!(16), dec!(15), dec!(14), dec!(13), dec!(12), dec!(11), dec!(10)]);
        assert_eq!(infer_trend(&falling, 6), TrendContext::Downtrend);

        let flat = closes(&[dec!(10); 7]);
        assert_eq!(infer_trend(&flat, 6), TrendContext::Unknown);
    }

    #[test]
    fn test_resolve_trend_prefers_given() {
        let rising = closes(&[dec!(10), dec!(11), dec!(12), dec!(13), dec!(14), dec!(15), dec!(16)]);
        assert_eq!(
            resolve_trend(Some(TrendContext::Unknown), &rising, 6),
            TrendContext::Unknown
        );
        assert_eq!(resolve_trend(None, &rising, 6), TrendContext::Uptrend);
    }

    #[test]
    fn test_volume_baseline() {
        let bars = closes(&[dec!(10), dec!(10), dec!(10)]);
        // volumes 100, 200, 300
        assert_eq!(trailing_avg_volume(&bars, 0, VOLUME_PERIOD), None);
        assert_eq!(trailing_avg_volume(&bars, 2, VOLUME_PERIOD), Some(150.0));
        assert!((volume_ratio(&bars, 2).unwrap() - 2.0).abs() < 1e-12);
        assert!(volume_at_least(&bars, 2, VOLUME_SURGE_FACTOR));
        assert!(!volume_at_least(&bars, 0, VOLUME_SURGE_FACTOR));
    }

    #[test]
    fn test_strength_clamps() {
        assert_eq!(Strength::base(90).add(15).add_if(true, 10).value(), 100);
        assert_eq!(Strength::base(60).add_if(false, 10).value(), 60);
        assert_eq!(Strength::base(0).add(-5).value(), 0);
    }

    #[test]
    fn test_base_scores_follow_bias() {
        let base = BaseScores::new(80, 65, 55);
        assert_eq!(base.score(crate::ids::HAMMER, TrendContext::Downtrend), 80);
        assert_eq!(base.score(crate::ids::HAMMER, TrendContext::Uptrend), 55);
        assert_eq!(base.score(crate::ids::DOJI, TrendContext::Uptrend), 65);
    }

    #[test]
    fn test_project_levels() {
        let (t, s) = project_levels(Direction::Bullish, dec!(102), dec!(93), dec!(103));
        assert_eq!(t, Some(dec!(112)));
        assert_eq!(s, Some(dec!(88)));

        let (t, s) = project_levels(Direction::Bearish, dec!(95), dec!(93), dec!(103));
        assert_eq!(t, Some(dec!(85)));
        assert_eq!(s, Some(dec!(108)));

        assert_eq!(
            project_levels(Direction::Neutral, dec!(1), dec!(0), dec!(2)),
            (None, None)
        );
    }

    #[test]
    fn test_formation_window() {
        let bars = closes(&[dec!(10), dec!(12), dec!(11)]);
        let draft = formation(&bars, 1, 70).unwrap();
        assert_eq!(draft.start_index, 1);
        assert_eq!(draft.end_index, 2);
        assert_eq!(draft.involved_dates.len(), 2);
        assert_eq!(draft.pattern_low, dec!(10));
        assert_eq!(draft.pattern_high, dec!(13));
        assert_eq!(tail_start(&bars, 4), None);
        assert_eq!(tail_start(&bars, 2), Some(1));
    }
}
