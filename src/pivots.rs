//! Swing-point (pivot) detection
//!
//! A symmetric window of `lookback` bars on each side is slid across the series. A bar
//! whose high strictly exceeds every other high in the window is a peak candidate; the
//! mirror rule on lows gives troughs. Candidates whose swing inside the window is smaller
//! than `min_swing_ratio` are discarded, the rest get a 0..=100 prominence score.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::detectors::helpers::{ratio, trailing_avg_volume};
use crate::{PatternError, Period, Ratio, Result, OHLCV};

/// Peak or trough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotKind {
    Peak,
    Trough,
}

impl PivotKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            PivotKind::Peak => PivotKind::Trough,
            PivotKind::Trough => PivotKind::Peak,
        }
    }
}

/// One local extreme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwingPoint {
    pub kind: PivotKind,
    /// Position in the scanned sequence
    pub index: usize,
    pub date: NaiveDate,
    /// High for peaks, low for troughs
    pub price: Decimal,
    pub prominence: u8,
}

/// Pivot scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotScanner {
    /// Bars required on each side of a candidate
    pub lookback: Period,
    /// Minimum swing inside the window, relative to the candidate's extreme
    pub min_swing_ratio: Ratio,
    /// Radius of the neighborhood used for the dominance bonus
    pub neighborhood: usize,
    /// Bars averaged for the volume bonus
    pub volume_period: usize,
    /// Candidate volume must exceed this multiple of the average
    pub volume_factor: f64,
}

impl Default for PivotScanner {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(5),
            min_swing_ratio: Ratio::new_const(0.03),
            neighborhood: 10,
            volume_period: 20,
            volume_factor: 1.5,
        }
    }
}

const BASE_PROMINENCE: u8 = 50;
const STRONG_DOMINANCE: usize = 15;
const WEAK_DOMINANCE: usize = 10;

impl PivotScanner {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn validate_config(&self) -> Result<()> {
        if !(self.volume_factor.is_finite() && self.volume_factor > 0.0) {
            return Err(PatternError::InvalidValue(
                "volume_factor must be positive and finite",
            ));
        }
        if self.volume_period == 0 {
            return Err(PatternError::InvalidValue("volume_period must be > 0"));
        }
        Ok(())
    }

    /// Minimum length for any pivot to be found
    #[inline]
    pub fn min_bars(&self) -> usize {
        2 * self.lookback.get() + 1
    }

    /// Chronological pivots. Sequences shorter than [`min_bars`](Self::min_bars) yield none.
    ///
    /// When one bar is both a peak and a trough the peak is listed first.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Vec<SwingPoint> {
        let l = self.lookback.get();
        let n = bars.len();
        if n < self.min_bars() {
            return Vec::new();
        }

        let mut points = Vec::new();
        for i in l..n - l {
            let window = &bars[i - l..=i + l];
            let bar = &bars[i];
            let others = || {
                window
                    .iter()
                    .enumerate()
                    .filter(move |(j, _)| *j != l)
                    .map(|(_, b)| b)
            };

            if others().all(|b| b.high() < bar.high()) {
                let lowest = window.iter().map(OHLCV::low).min().unwrap_or(bar.low());
                if self.is_significant(bar.high() - lowest, bar.high()) {
                    points.push(self.swing_point(bars, i, PivotKind::Peak));
                }
            }

            if others().all(|b| b.low() > bar.low()) {
                let highest = window.iter().map(OHLCV::high).max().unwrap_or(bar.high());
                if self.is_significant(highest - bar.low(), bar.low()) {
                    points.push(self.swing_point(bars, i, PivotKind::Trough));
                }
            }
        }

        trace!(
            bars = n,
            peaks = points.iter().filter(|p| p.kind == PivotKind::Peak).count(),
            troughs = points.iter().filter(|p| p.kind == PivotKind::Trough).count(),
            "pivot scan"
        );
        points
    }

    fn is_significant(&self, swing: Decimal, extreme: Decimal) -> bool {
        ratio(swing, extreme).is_some_and(|r| r >= self.min_swing_ratio.get())
    }

    fn swing_point<T: OHLCV>(&self, bars: &[T], i: usize, kind: PivotKind) -> SwingPoint {
        let bar = &bars[i];
        let price = match kind {
            PivotKind::Peak => bar.high(),
            PivotKind::Trough => bar.low(),
        };
        SwingPoint {
            kind,
            index: i,
            date: bar.date(),
            price,
            prominence: self.prominence(bars, i, kind, price),
        }
    }

    fn prominence<T: OHLCV>(&self, bars: &[T], i: usize, kind: PivotKind, price: Decimal) -> u8 {
        let lo = i.saturating_sub(self.neighborhood);
        let hi = (i + self.neighborhood).min(bars.len() - 1);
        let dominated = (lo..=hi)
            .filter(|&j| j != i)
            .filter(|&j| match kind {
                PivotKind::Peak => bars[j].high() < price,
                PivotKind::Trough => bars[j].low() > price,
            })
            .count();

        let mut score = BASE_PROMINENCE;
        if dominated >= STRONG_DOMINANCE {
            score += 20;
        } else if dominated >= WEAK_DOMINANCE {
            score += 10;
        }

        let surge = trailing_avg_volume(bars, i, self.volume_period)
            .is_some_and(|avg| bars[i].volume() as f64 > avg * self.volume_factor);
        if surge {
            score += 15;
        }

        score.min(100)
    }
}

/// Most recent `n` pivots of `kind`, oldest first
pub fn last_of_kind(points: &[SwingPoint], kind: PivotKind, n: usize) -> Option<Vec<SwingPoint>> {
    let same: Vec<SwingPoint> = points.iter().filter(|p| p.kind == kind).copied().collect();
    let start = same.len().checked_sub(n)?;
    Some(same[start..].to_vec())
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CandleStick;
    use rust_decimal_macros::dec;

    /// Bars whose high is `mid` and low is `mid - 1`
    fn from_mids(mids: &[Decimal], volumes: Option<&[u64]>) -> Vec<CandleStick> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        mids.iter()
            .enumerate()
            .map(|(i, &m)| {
                let v = volumes.map(|v| v[i]).unwrap_or(1_000);
                CandleStick::new(
                    start + chrono::Duration::days(i as i64),
                    m - dec!(0.75),
                    m,
                    m - dec!(1),
                    m - dec!(0.25),
                    v,
                )
                .unwrap()
            })
            .collect()
    }

    fn tent(peak_at: usize, len: usize, step: Decimal) -> Vec<Decimal> {
        (0..len)
            .map(|i| {
                let d = Decimal::from((i as i64 - peak_at as i64).abs());
                dec!(100) - d * step
            })
            .collect()
    }

    #[test]
    fn test_too_short_yields_nothing() {
        let bars = from_mids(&[dec!(100); 10], None);
        assert!(PivotScanner::default().scan(&bars).is_empty());
    }

    #[test]
    fn test_single_peak() {
        let bars = from_mids(&tent(10, 21, dec!(2)), None);
        let points = PivotScanner::default().scan(&bars);
        let peaks: Vec<_> = points.iter().filter(|p| p.kind == PivotKind::Peak).collect();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 10);
        assert_eq!(peaks[0].price, dec!(100));
        // all 20 neighbours are dominated
        assert_eq!(peaks[0].prominence, 70);
    }

    #[test]
    fn test_insignificant_swing_dropped() {
        let bars = from_mids(&tent(10, 21, dec!(0.1)), None);
        let points = PivotScanner::default().scan(&bars);
        assert!(points.iter().all(|p| p.kind != PivotKind::Peak));
    }

    #[test]
    fn test_volume_raises_prominence() {
        let mut volumes = vec![1_000u64; 21];
        volumes[10] = 5_000;
        let bars = from_mids(&tent(10, 21, dec!(2)), Some(&volumes));
        let points = PivotScanner::default().scan(&bars);
        let peak = points.iter().find(|p| p.kind == PivotKind::Peak).unwrap();
        assert_eq!(peak.prominence, 85);
    }

    #[test]
    fn test_monotonic_has_no_pivots() {
        let up: Vec<Decimal> = (0..40).map(|i| dec!(100) + Decimal::from(i)).collect();
        assert!(PivotScanner::default().scan(&from_mids(&up, None)).is_empty());

        let down: Vec<Decimal> = (0..40).map(|i| dec!(100) - Decimal::from(i)).collect();
        assert!(PivotScanner::default().scan(&from_mids(&down, None)).is_empty());
    }

    #[test]
    fn test_plateau_is_not_a_pivot() {
        let mut mids = tent(10, 21, dec!(2));
        mids[11] = mids[10];
        let points = PivotScanner::default().scan(&from_mids(&mids, None));
        assert!(points.iter().all(|p| p.kind != PivotKind::Peak));
    }

    #[test]
    fn test_last_of_kind() {
        let mut mids = tent(10, 21, dec!(2));
        mids.extend(tent(10, 21, dec!(2)));
        let points = PivotScanner::default().scan(&from_mids(&mids, None));
        let peaks = last_of_kind(&points, PivotKind::Peak, 2).unwrap();
        assert_eq!(peaks[0].index, 10);
        assert_eq!(peaks[1].index, 31);
        assert!(last_of_kind(&points, PivotKind::Peak, 3).is_none());
    }

    #[test]
    fn test_config_from_json() {
        let scanner: PivotScanner = serde_json::from_str(r#"{ "lookback": 3 }"#).unwrap();
        assert_eq!(scanner.lookback.get(), 3);
        assert_eq!(scanner.neighborhood, 10);
        assert!(serde_json::from_str::<PivotScanner>(r#"{ "lookback": 0 }"#).is_err());
    }
}
