//! Chart formation detectors
//!
//! Double top / bottom and head and shoulders (regular and inverse). Both work on the
//! swing points of the whole series rather than on a fixed bar window: `detect` runs the
//! detector's own [`PivotScanner`], `detect_with_pivots` takes a list computed elsewhere
//! so several detectors can share one scan.
//!
//! Targets here are measured moves from the neckline, not the range projection the
//! candlestick detectors use.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use super::helpers::{finish, match_levels, ratio, resolve_trend, Strength, CHART_BASE};
use crate::{
    ids,
    params::{get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    pivots::{last_of_kind, PivotKind, PivotScanner, SwingPoint},
    result::PatternDraft,
    DetectedPattern, DetectorCategory, DetectorPriority, PatternDetector, PatternError, PatternId,
    Period, Ratio, Result, TrendContext, OHLCV,
};

impl_with_defaults!(DoubleTopBottomDetector, HeadAndShouldersDetector);

/// Most extreme pivot of `kind` strictly between two indices.
///
/// For troughs that is the lowest, for peaks the highest.
fn extreme_between(
    pivots: &[SwingPoint],
    kind: PivotKind,
    after: usize,
    before: usize,
) -> Option<SwingPoint> {
    let inside = pivots
        .iter()
        .filter(|p| p.kind == kind && p.index > after && p.index < before);
    let found = match kind {
        PivotKind::Trough => inside.min_by_key(|p| p.price),
        PivotKind::Peak => inside.max_by_key(|p| p.price),
    };
    found.copied()
}

/// Whether the last close has crossed the neckline in the formation's direction
fn neckline_broken<T: OHLCV>(bars: &[T], top: bool, neckline: Decimal) -> bool {
    bars.last().is_some_and(|b| {
        if top {
            b.close() < neckline
        } else {
            b.close() > neckline
        }
    })
}

fn chart_draft<T: OHLCV>(
    bars: &[T],
    points: &[SwingPoint],
    strength: u8,
) -> Option<PatternDraft> {
    let first = points.first()?;
    let last_bar = bars.last()?;
    let low = points.iter().map(|p| p.price).min()?;
    let high = points.iter().map(|p| p.price).max()?;
    Some(PatternDraft {
        strength,
        detection_date: last_bar.date(),
        involved_dates: points.iter().map(|p| p.date).collect(),
        start_index: first.index,
        end_index: bars.len() - 1,
        pattern_low: low,
        pattern_high: high,
        neckline: None,
        target_price: None,
        stop_loss: None,
        details: BTreeMap::new(),
    })
}

// ============================================================
// DOUBLE TOP / DOUBLE BOTTOM
// ============================================================

static DOUBLE_IDS: &[PatternId] = &[ids::DOUBLE_TOP, ids::DOUBLE_BOTTOM];

/// Two most recent peaks (troughs) at the same level with a trough (peak) between them.
///
/// The projected move uses the pivot nearer the neckline, the stop sits beyond the
/// more extreme one.
#[derive(Debug, Clone)]
pub struct DoubleTopBottomDetector {
    pub scanner: PivotScanner,
    /// Maximum price difference between the two pivots, relative to the first
    pub level_tolerance: Ratio,
    /// Minimum (average pivot - neckline) / neckline
    pub min_height_ratio: Ratio,
    /// Deviation at or below this earns the equal-level bonus
    pub near_tolerance: Ratio,
    pub min_span: Period,
    pub max_span: Period,
}

impl Default for DoubleTopBottomDetector {
    fn default() -> Self {
        Self {
            scanner: PivotScanner::default(),
            level_tolerance: Ratio::new_const(0.02),
            min_height_ratio: Ratio::new_const(0.03),
            near_tolerance: Ratio::new_const(0.005),
            min_span: Period::new_const(10),
            max_span: Period::new_const(60),
        }
    }
}

impl DoubleTopBottomDetector {
    /// Detect on a precomputed pivot list for `bars`
    pub fn detect_with_pivots<T: OHLCV>(
        &self,
        bars: &[T],
        pivots: &[SwingPoint],
        trend: Option<TrendContext>,
    ) -> Vec<DetectedPattern> {
        if bars.len() < self.min_bars() {
            return Vec::new();
        }
        [PivotKind::Peak, PivotKind::Trough]
            .into_iter()
            .filter_map(|kind| self.evaluate(bars, pivots, kind, trend))
            .collect()
    }

    fn evaluate<T: OHLCV>(
        &self,
        bars: &[T],
        pivots: &[SwingPoint],
        kind: PivotKind,
        trend: Option<TrendContext>,
    ) -> Option<DetectedPattern> {
        let top = kind == PivotKind::Peak;
        let pair = last_of_kind(pivots, kind, 2)?;
        let (first, second) = (pair[0], pair[1]);

        let level = match_levels(first.price, second.price, self.level_tolerance.get())?;
        let neck = extreme_between(pivots, kind.opposite(), first.index, second.index)?;
        let neckline = neck.price;

        let average = (first.price + second.price) / Decimal::TWO;
        let height_ratio = ratio((average - neckline).abs(), neckline)?;
        if height_ratio < self.min_height_ratio.get() {
            return None;
        }

        let (nearer, outer) = if top {
            (first.price.min(second.price), first.price.max(second.price))
        } else {
            (first.price.max(second.price), first.price.min(second.price))
        };
        let height = (nearer - neckline).abs();
        let target = if top {
            neckline - height
        } else {
            neckline + height
        };

        let span = second.index - first.index;
        let broken = neckline_broken(bars, top, neckline);
        let id = if top { ids::DOUBLE_TOP } else { ids::DOUBLE_BOTTOM };

        let trend = resolve_trend(trend, bars, first.index);
        let strength = Strength::base(CHART_BASE.score(id, trend))
            .add_if(level.deviation <= self.near_tolerance.get(), 10)
            .add_if(
                span >= self.min_span.get() && span <= self.max_span.get(),
                5,
            )
            .add_if(broken, 15)
            .value();

        let draft = chart_draft(bars, &[first, neck, second], strength)?
            .neckline(neckline)
            .levels(Some(target), Some(outer))
            .detail("level_deviation_pct", level.deviation * 100.0)
            .detail("height_ratio", height_ratio)
            .detail("span_bars", span as f64)
            .detail("neckline_broken", if broken { 1.0 } else { 0.0 });
        finish(id, draft)
    }
}

impl PatternDetector for DoubleTopBottomDetector {
    fn name(&self) -> &'static str {
        "double_top_bottom"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Chart
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        DOUBLE_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        if bars.len() < self.min_bars() {
            return Vec::new();
        }
        let pivots = self.scanner.scan(bars);
        self.detect_with_pivots(bars, &pivots, trend)
    }

    fn validate_config(&self) -> Result<()> {
        self.scanner.validate_config()?;
        if self.min_span > self.max_span {
            return Err(PatternError::InvalidConfig(
                "double top min_span exceeds max_span".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

static HEAD_AND_SHOULDERS_IDS: &[PatternId] =
    &[ids::HEAD_AND_SHOULDERS, ids::INVERSE_HEAD_AND_SHOULDERS];

/// Three most recent peaks (troughs) forming shoulder, head, shoulder.
///
/// Shoulders may differ by `level_tolerance * shoulder_tolerance_factor`; the head must
/// clear the shoulder average by `min_head_excess`. The neckline is the lower (inverse:
/// higher) of the two reaction pivots flanking the head.
#[derive(Debug, Clone)]
pub struct HeadAndShouldersDetector {
    pub scanner: PivotScanner,
    pub level_tolerance: Ratio,
    pub shoulder_tolerance_factor: f64,
    pub min_head_excess: Ratio,
    /// Shoulder deviation at or below this earns the symmetry bonus
    pub symmetric_tolerance: Ratio,
    /// Accepted (head - left) / (right - head) for the timing bonus
    pub min_duration_ratio: f64,
    pub max_duration_ratio: f64,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            scanner: PivotScanner::default(),
            level_tolerance: Ratio::new_const(0.02),
            shoulder_tolerance_factor: 1.5,
            min_head_excess: Ratio::new_const(0.02),
            symmetric_tolerance: Ratio::new_const(0.01),
            min_duration_ratio: 0.7,
            max_duration_ratio: 1.4,
        }
    }
}

impl HeadAndShouldersDetector {
    /// Detect on a precomputed pivot list for `bars`
    pub fn detect_with_pivots<T: OHLCV>(
        &self,
        bars: &[T],
        pivots: &[SwingPoint],
        trend: Option<TrendContext>,
    ) -> Vec<DetectedPattern> {
        if bars.len() < self.min_bars() {
            return Vec::new();
        }
        [PivotKind::Peak, PivotKind::Trough]
            .into_iter()
            .filter_map(|kind| self.evaluate(bars, pivots, kind, trend))
            .collect()
    }

    fn evaluate<T: OHLCV>(
        &self,
        bars: &[T],
        pivots: &[SwingPoint],
        kind: PivotKind,
        trend: Option<TrendContext>,
    ) -> Option<DetectedPattern> {
        let top = kind == PivotKind::Peak;
        let trio = last_of_kind(pivots, kind, 3)?;
        let (left, head, right) = (trio[0], trio[1], trio[2]);

        let beyond = |a: Decimal, b: Decimal| if top { a > b } else { a < b };
        if !beyond(head.price, left.price) || !beyond(head.price, right.price) {
            return None;
        }

        let shoulder_tolerance = self.level_tolerance.get() * self.shoulder_tolerance_factor;
        let shoulders = match_levels(left.price, right.price, shoulder_tolerance)?;

        let shoulder_avg = (left.price + right.price) / Decimal::TWO;
        let excess = ratio((head.price - shoulder_avg).abs(), shoulder_avg)?;
        if excess < self.min_head_excess.get() {
            return None;
        }

        let reaction = kind.opposite();
        let left_neck = extreme_between(pivots, reaction, left.index, head.index)?;
        let right_neck = extreme_between(pivots, reaction, head.index, right.index)?;
        let neck = match (top, left_neck.price <= right_neck.price) {
            (true, true) | (false, false) => left_neck,
            _ => right_neck,
        };
        let neckline = neck.price;

        let height = (head.price - neckline).abs();
        let target = if top {
            neckline - height
        } else {
            neckline + height
        };

        let left_span = head.index - left.index;
        let right_span = right.index - head.index;
        let duration_ratio = left_span as f64 / right_span as f64;
        let broken = neckline_broken(bars, top, neckline);
        let id = if top {
            ids::HEAD_AND_SHOULDERS
        } else {
            ids::INVERSE_HEAD_AND_SHOULDERS
        };

        let trend = resolve_trend(trend, bars, left.index);
        let strength = Strength::base(CHART_BASE.score(id, trend))
            .add_if(shoulders.deviation <= self.symmetric_tolerance.get(), 10)
            .add_if(
                duration_ratio >= self.min_duration_ratio
                    && duration_ratio <= self.max_duration_ratio,
                5,
            )
            .add_if(broken, 15)
            .value();

        let draft = chart_draft(bars, &[left, left_neck, head, right_neck, right], strength)?
            .neckline(neckline)
            .levels(Some(target), Some(right.price))
            .detail("shoulder_deviation_pct", shoulders.deviation * 100.0)
            .detail("head_excess_pct", excess * 100.0)
            .detail("duration_ratio", duration_ratio)
            .detail("neckline_broken", if broken { 1.0 } else { 0.0 });
        finish(id, draft)
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn name(&self) -> &'static str {
        "head_and_shoulders"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Chart
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        40
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        HEAD_AND_SHOULDERS_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        if bars.len() < self.min_bars() {
            return Vec::new();
        }
        let pivots = self.scanner.scan(bars);
        self.detect_with_pivots(bars, &pivots, trend)
    }

    fn validate_config(&self) -> Result<()> {
        self.scanner.validate_config()?;
        if self.shoulder_tolerance_factor <= 0.0 {
            return Err(PatternError::InvalidValue(
                "shoulder_tolerance_factor must be positive",
            ));
        }
        if self.min_duration_ratio > self.max_duration_ratio {
            return Err(PatternError::InvalidConfig(
                "head and shoulders duration range is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

/// Pivot scanner thresholds shared by both chart detectors
fn scanner_from_params(params: &HashMap<&str, f64>) -> Result<PivotScanner> {
    let defaults = PivotScanner::default();
    let scanner = PivotScanner {
        lookback: get_period(params, "lookback", defaults.lookback.get())?,
        min_swing_ratio: get_ratio(params, "min_swing_ratio", defaults.min_swing_ratio.get())?,
        ..defaults
    };
    scanner.validate_config()?;
    Ok(scanner)
}

static DOUBLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("lookback", 5.0, (3.0, 8.0, 1.0), "Bars on each side of a pivot"),
    ParamMeta::ratio("min_swing_ratio", 0.03, (0.02, 0.05, 0.01), "Minimum swing of a pivot inside its window"),
    ParamMeta::ratio("level_tolerance", 0.02, (0.01, 0.04, 0.005), "Maximum relative difference between the two pivots"),
    ParamMeta::ratio("min_height_ratio", 0.03, (0.02, 0.06, 0.01), "Minimum pattern height / neckline"),
    ParamMeta::ratio("near_tolerance", 0.005, (0.0025, 0.01, 0.0025), "Pivot deviation for the equal-level bonus"),
    ParamMeta::period("min_span", 10.0, (5.0, 20.0, 5.0), "Shortest span in bars for the timing bonus"),
    ParamMeta::period("max_span", 60.0, (40.0, 80.0, 10.0), "Longest span in bars for the timing bonus"),
];

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("lookback", 5.0, (3.0, 8.0, 1.0), "Bars on each side of a pivot"),
    ParamMeta::ratio("min_swing_ratio", 0.03, (0.02, 0.05, 0.01), "Minimum swing of a pivot inside its window"),
    ParamMeta::ratio("level_tolerance", 0.02, (0.01, 0.04, 0.005), "Base level tolerance"),
    ParamMeta::factor("shoulder_tolerance_factor", 1.5, (1.0, 2.0, 0.25), "Shoulder tolerance as a multiple of the level tolerance"),
    ParamMeta::ratio("min_head_excess", 0.02, (0.01, 0.05, 0.01), "Minimum head excess over the shoulder average"),
    ParamMeta::ratio("symmetric_tolerance", 0.01, (0.005, 0.02, 0.005), "Shoulder deviation for the symmetry bonus"),
    ParamMeta::factor("min_duration_ratio", 0.7, (0.5, 0.9, 0.1), "Lower bound of left / right duration"),
    ParamMeta::factor("max_duration_ratio", 1.4, (1.1, 2.0, 0.1), "Upper bound of left / right duration"),
];

impl ParameterizedDetector for DoubleTopBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            scanner: scanner_from_params(params)?,
            level_tolerance: get_ratio(params, "level_tolerance", 0.02)?,
            min_height_ratio: get_ratio(params, "min_height_ratio", 0.03)?,
            near_tolerance: get_ratio(params, "near_tolerance", 0.005)?,
            min_span: get_period(params, "min_span", 10)?,
            max_span: get_period(params, "max_span", 60)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        DOUBLE_IDS
    }
}

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            scanner: scanner_from_params(params)?,
            level_tolerance: get_ratio(params, "level_tolerance", 0.02)?,
            shoulder_tolerance_factor: get_factor(params, "shoulder_tolerance_factor", 1.5)?,
            min_head_excess: get_ratio(params, "min_head_excess", 0.02)?,
            symmetric_tolerance: get_ratio(params, "symmetric_tolerance", 0.01)?,
            min_duration_ratio: get_factor(params, "min_duration_ratio", 0.7)?,
            max_duration_ratio: get_factor(params, "max_duration_ratio", 1.4)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        HEAD_AND_SHOULDERS_IDS
    }
}
