//! Single-bar candlestick detectors
//!
//! Doji family, hammer / hanging man, inverted hammer / shooting star, marubozu and
//! spinning top. Each one classifies the last bar of the input.

use std::collections::HashMap;

use super::helpers::{
    self, finish_candle, formation, ratio, resolve_trend, tail_start, volume_at_least,
    BaseScores, Strength,
};
use crate::{
    ids,
    params::{get_factor, get_ratio, ParamMeta, ParameterizedDetector},
    DetectedPattern, DetectorCategory, DetectorPriority, OHLCVExt, PatternDetector, PatternId,
    Ratio, Result, TrendContext, OHLCV,
};

impl_with_defaults!(
    DojiDetector,
    HammerDetector,
    InvertedHammerDetector,
    MarubozuDetector,
    SpinningTopDetector,
);

// ============================================================
// DOJI FAMILY
// ============================================================

const DOJI_BASE: BaseScores = BaseScores::new(70, 60, 50);
static DOJI_IDS: &[PatternId] = &[
    ids::DOJI,
    ids::DRAGONFLY_DOJI,
    ids::GRAVESTONE_DOJI,
    ids::LONG_LEGGED_DOJI,
];

/// Doji, dragonfly, gravestone and long-legged doji.
///
/// Shadows are measured against the bar's range: a shadow is long at
/// `long_shadow_ratio` and short at `short_shadow_ratio`.
#[derive(Debug, Clone)]
pub struct DojiDetector {
    pub body_max_ratio: Ratio,
    pub long_shadow_ratio: Ratio,
    pub short_shadow_ratio: Ratio,
    /// Bodies at or below this earn the tight-body bonus
    pub tight_body_ratio: Ratio,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            body_max_ratio: Ratio::new_const(helpers::DOJI_BODY_RATIO),
            long_shadow_ratio: Ratio::new_const(0.30),
            short_shadow_ratio: Ratio::new_const(0.10),
            tight_body_ratio: Ratio::new_const(0.03),
        }
    }
}

impl DojiDetector {
    fn classify(&self, upper: f64, lower: f64) -> PatternId {
        let long = self.long_shadow_ratio.get();
        let short = self.short_shadow_ratio.get();
        if lower >= long && upper >= long {
            ids::LONG_LEGGED_DOJI
        } else if lower >= long && upper <= short {
            ids::DRAGONFLY_DOJI
        } else if upper >= long && lower <= short {
            ids::GRAVESTONE_DOJI
        } else {
            ids::DOJI
        }
    }
}

impl PatternDetector for DojiDetector {
    fn name(&self) -> &'static str {
        "doji"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::Medium
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        DOJI_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(i) = tail_start(bars, 1) else {
            return Vec::new();
        };
        let bar = &bars[i];

        let (Some(body), Some(upper), Some(lower)) = (
            bar.body_ratio(),
            bar.upper_shadow_ratio(),
            bar.lower_shadow_ratio(),
        ) else {
            return Vec::new();
        };
        if body > self.body_max_ratio.get() {
            return Vec::new();
        }

        let id = self.classify(upper, lower);
        let trend = resolve_trend(trend, bars, i);
        let strength = Strength::base(DOJI_BASE.score(id, trend))
            .add_if(body <= self.tight_body_ratio.get(), 10)
            .add_if(
                volume_at_least(bars, i, helpers::VOLUME_SURGE_FACTOR),
                10,
            )
            .value();

        formation(bars, i, strength)
            .map(|d| {
                d.detail("body_ratio", body)
                    .detail("upper_shadow_ratio", upper)
                    .detail("lower_shadow_ratio", lower)
            })
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

const HAMMER_BASE: BaseScores = BaseScores::new(75, 60, 50);
static HAMMER_IDS: &[PatternId] = &[ids::HAMMER, ids::HANGING_MAN];
static INVERTED_HAMMER_IDS: &[PatternId] = &[ids::INVERTED_HAMMER, ids::SHOOTING_STAR];

/// Which shadow carries the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wick {
    Lower,
    Upper,
}

/// Geometry shared by both hammer shapes
#[derive(Debug, Clone, Copy)]
struct HammerShape {
    body_max_ratio: f64,
    shadow_factor: f64,
    opposite_shadow_factor: f64,
    strong_shadow_factor: f64,
}

impl HammerShape {
    /// Returns (body ratio, long shadow / body) when the last bar has the shape
    fn measure<T: OHLCV>(&self, bar: &T, wick: Wick) -> Option<(f64, f64)> {
        let body = bar.body();
        let body_ratio = bar.body_ratio()?;
        if body.is_zero() || body_ratio > self.body_max_ratio {
            return None;
        }
        let (long, short) = match wick {
            Wick::Lower => (bar.lower_shadow(), bar.upper_shadow()),
            Wick::Upper => (bar.upper_shadow(), bar.lower_shadow()),
        };
        let long_factor = ratio(long, body)?;
        let short_factor = ratio(short, body)?;
        (long_factor >= self.shadow_factor && short_factor <= self.opposite_shadow_factor)
            .then_some((body_ratio, long_factor))
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        trend: Option<TrendContext>,
        wick: Wick,
        label: impl Fn(TrendContext) -> PatternId,
    ) -> Vec<DetectedPattern> {
        let Some(i) = tail_start(bars, 1) else {
            return Vec::new();
        };
        let Some((body_ratio, shadow_factor)) = self.measure(&bars[i], wick) else {
            return Vec::new();
        };

        let trend = resolve_trend(trend, bars, i);
        let id = label(trend);
        let strength = Strength::base(HAMMER_BASE.score(id, trend))
            .add_if(shadow_factor >= self.strong_shadow_factor, 10)
            .add_if(
                volume_at_least(bars, i, helpers::VOLUME_SURGE_FACTOR),
                10,
            )
            .value();

        formation(bars, i, strength)
            .map(|d| {
                d.detail("body_ratio", body_ratio)
                    .detail("shadow_body_factor", shadow_factor)
            })
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }
}

/// Hammer (after a decline) and hanging man (after an advance).
///
/// Small body, lower shadow at least `shadow_factor` times the body and an upper
/// shadow no longer than `opposite_shadow_factor` times the body.
#[derive(Debug, Clone)]
pub struct HammerDetector {
    pub body_max_ratio: Ratio,
    pub shadow_factor: f64,
    pub opposite_shadow_factor: f64,
    pub strong_shadow_factor: f64,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            body_max_ratio: Ratio::new_const(helpers::HAMMER_BODY_RATIO),
            shadow_factor: helpers::LONG_SHADOW_FACTOR,
            opposite_shadow_factor: helpers::SHORT_SHADOW_FACTOR,
            strong_shadow_factor: 3.0,
        }
    }
}

impl HammerDetector {
    fn shape(&self) -> HammerShape {
        HammerShape {
            body_max_ratio: self.body_max_ratio.get(),
            shadow_factor: self.shadow_factor,
            opposite_shadow_factor: self.opposite_shadow_factor,
            strong_shadow_factor: self.strong_shadow_factor,
        }
    }
}

impl PatternDetector for HammerDetector {
    fn name(&self) -> &'static str {
        "hammer"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        HAMMER_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        self.shape().detect(bars, trend, Wick::Lower, |t| match t {
            TrendContext::Uptrend => ids::HANGING_MAN,
            _ => ids::HAMMER,
        })
    }

    fn validate_config(&self) -> Result<()> {
        validate_shadow_factors(self.shadow_factor, self.strong_shadow_factor)
    }
}

/// Inverted hammer (after a decline) and shooting star (after an advance or with no
/// clear trend). Mirror of [`HammerDetector`] on the upper shadow.
#[derive(Debug, Clone)]
pub struct InvertedHammerDetector {
    pub body_max_ratio: Ratio,
    pub shadow_factor: f64,
    pub opposite_shadow_factor: f64,
    pub strong_shadow_factor: f64,
}

impl Default for InvertedHammerDetector {
    fn default() -> Self {
        Self {
            body_max_ratio: Ratio::new_const(helpers::HAMMER_BODY_RATIO),
            shadow_factor: helpers::LONG_SHADOW_FACTOR,
            opposite_shadow_factor: helpers::SHORT_SHADOW_FACTOR,
            strong_shadow_factor: 3.0,
        }
    }
}

impl InvertedHammerDetector {
    fn shape(&self) -> HammerShape {
        HammerShape {
            body_max_ratio: self.body_max_ratio.get(),
            shadow_factor: self.shadow_factor,
            opposite_shadow_factor: self.opposite_shadow_factor,
            strong_shadow_factor: self.strong_shadow_factor,
        }
    }
}

impl PatternDetector for InvertedHammerDetector {
    fn name(&self) -> &'static str {
        "inverted_hammer"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        INVERTED_HAMMER_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        self.shape().detect(bars, trend, Wick::Upper, |t| match t {
            TrendContext::Downtrend => ids::INVERTED_HAMMER,
            _ => ids::SHOOTING_STAR,
        })
    }

    fn validate_config(&self) -> Result<()> {
        validate_shadow_factors(self.shadow_factor, self.strong_shadow_factor)
    }
}

fn validate_shadow_factors(shadow: f64, strong: f64) -> Result<()> {
    if shadow <= 0.0 {
        return Err(crate::PatternError::InvalidValue("shadow_factor must be positive"));
    }
    if strong < shadow {
        return Err(crate::PatternError::InvalidConfig(format!(
            "strong_shadow_factor {strong} is below shadow_factor {shadow}"
        )));
    }
    Ok(())
}

// ============================================================
// MARUBOZU
// ============================================================

const MARUBOZU_BASE: BaseScores = BaseScores::new(70, 60, 50);
static MARUBOZU_IDS: &[PatternId] = &[ids::BULLISH_MARUBOZU, ids::BEARISH_MARUBOZU];

/// Long body with (almost) no shadows. Color decides the id.
#[derive(Debug, Clone)]
pub struct MarubozuDetector {
    pub body_min_ratio: Ratio,
    pub shadow_max_ratio: Ratio,
    pub strong_body_ratio: Ratio,
}

impl Default for MarubozuDetector {
    fn default() -> Self {
        Self {
            body_min_ratio: Ratio::new_const(helpers::MARUBOZU_BODY_RATIO),
            shadow_max_ratio: Ratio::new_const(0.10),
            strong_body_ratio: Ratio::new_const(0.95),
        }
    }
}

impl PatternDetector for MarubozuDetector {
    fn name(&self) -> &'static str {
        "marubozu"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::Medium
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        MARUBOZU_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(i) = tail_start(bars, 1) else {
            return Vec::new();
        };
        let bar = &bars[i];
        let (Some(body), Some(upper), Some(lower)) = (
            bar.body_ratio(),
            bar.upper_shadow_ratio(),
            bar.lower_shadow_ratio(),
        ) else {
            return Vec::new();
        };

        let max_shadow = self.shadow_max_ratio.get();
        if body < self.body_min_ratio.get() || upper > max_shadow || lower > max_shadow {
            return Vec::new();
        }

        let id = if bar.is_bullish() {
            ids::BULLISH_MARUBOZU
        } else {
            ids::BEARISH_MARUBOZU
        };
        let trend = resolve_trend(trend, bars, i);
        let strength = Strength::base(MARUBOZU_BASE.score(id, trend))
            .add_if(body >= self.strong_body_ratio.get(), 10)
            .add_if(
                volume_at_least(bars, i, helpers::VOLUME_SURGE_FACTOR),
                10,
            )
            .value();

        formation(bars, i, strength)
            .map(|d| d.detail("body_ratio", body))
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }
}

// ============================================================
// SPINNING TOP
// ============================================================

const SPINNING_TOP_BASE: BaseScores = BaseScores::new(60, 55, 50);
static SPINNING_TOP_IDS: &[PatternId] = &[ids::SPINNING_TOP];

/// Small but not doji-sized body with two comparable shadows.
#[derive(Debug, Clone)]
pub struct SpinningTopDetector {
    /// Exclusive lower bound, keeps dojis out
    pub body_min_ratio: Ratio,
    pub body_max_ratio: Ratio,
    /// Each shadow must be at least this multiple of the body
    pub min_shadow_factor: f64,
    /// Longer shadow over shorter shadow
    pub max_shadow_imbalance: f64,
    pub balanced_imbalance: f64,
}

impl Default for SpinningTopDetector {
    fn default() -> Self {
        Self {
            body_min_ratio: Ratio::new_const(helpers::DOJI_BODY_RATIO),
            body_max_ratio: Ratio::new_const(helpers::SMALL_BODY_RATIO),
            min_shadow_factor: 0.5,
            max_shadow_imbalance: 2.5,
            balanced_imbalance: 1.5,
        }
    }
}

impl PatternDetector for SpinningTopDetector {
    fn name(&self) -> &'static str {
        "spinning_top"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::Low
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        SPINNING_TOP_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(i) = tail_start(bars, 1) else {
            return Vec::new();
        };
        let bar = &bars[i];
        let Some(body_ratio) = bar.body_ratio() else {
            return Vec::new();
        };
        if body_ratio <= self.body_min_ratio.get() || body_ratio > self.body_max_ratio.get() {
            return Vec::new();
        }

        let body = bar.body();
        let (Some(upper), Some(lower)) = (
            ratio(bar.upper_shadow(), body),
            ratio(bar.lower_shadow(), body),
        ) else {
            return Vec::new();
        };
        if upper < self.min_shadow_factor || lower < self.min_shadow_factor {
            return Vec::new();
        }
        let imbalance = upper.max(lower) / upper.min(lower);
        if imbalance > self.max_shadow_imbalance {
            return Vec::new();
        }

        let id = ids::SPINNING_TOP;
        let trend = resolve_trend(trend, bars, i);
        let strength = Strength::base(SPINNING_TOP_BASE.score(id, trend))
            .add_if(imbalance <= self.balanced_imbalance, 10)
            .value();

        formation(bars, i, strength)
            .map(|d| {
                d.detail("body_ratio", body_ratio)
                    .detail("shadow_imbalance", imbalance)
            })
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.body_min_ratio >= self.body_max_ratio {
            return Err(crate::PatternError::InvalidConfig(
                "spinning top body_min_ratio must be below body_max_ratio".to_string(),
            ));
        }
        if self.max_shadow_imbalance < 1.0 {
            return Err(crate::PatternError::InvalidValue(
                "max_shadow_imbalance must be >= 1",
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static DOJI_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_max_ratio", 0.10, (0.05, 0.15, 0.025), "Maximum body / range"),
    ParamMeta::ratio("long_shadow_ratio", 0.30, (0.2, 0.4, 0.05), "Shadow / range counted as long"),
    ParamMeta::ratio("short_shadow_ratio", 0.10, (0.05, 0.15, 0.05), "Shadow / range counted as short"),
    ParamMeta::ratio("tight_body_ratio", 0.03, (0.01, 0.05, 0.01), "Body / range for the tight-body bonus"),
];

static HAMMER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_max_ratio", 0.35, (0.25, 0.4, 0.05), "Maximum body / range"),
    ParamMeta::factor("shadow_factor", 2.0, (1.5, 3.0, 0.5), "Long shadow as a multiple of the body"),
    ParamMeta::factor("opposite_shadow_factor", 0.3, (0.1, 0.5, 0.1), "Maximum opposite shadow as a multiple of the body"),
    ParamMeta::factor("strong_shadow_factor", 3.0, (2.5, 4.0, 0.5), "Shadow multiple for the strong-shadow bonus"),
];

static MARUBOZU_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_min_ratio", 0.85, (0.8, 0.95, 0.05), "Minimum body / range"),
    ParamMeta::ratio("shadow_max_ratio", 0.10, (0.02, 0.1, 0.02), "Maximum shadow / range"),
    ParamMeta::ratio("strong_body_ratio", 0.95, (0.9, 1.0, 0.05), "Body / range for the bonus"),
];

static SPINNING_TOP_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_min_ratio", 0.10, (0.05, 0.15, 0.05), "Exclusive minimum body / range"),
    ParamMeta::ratio("body_max_ratio", 0.30, (0.25, 0.35, 0.05), "Maximum body / range"),
    ParamMeta::factor("min_shadow_factor", 0.5, (0.5, 1.0, 0.25), "Minimum shadow as a multiple of the body"),
    ParamMeta::factor("max_shadow_imbalance", 2.5, (1.5, 3.0, 0.5), "Maximum longer / shorter shadow"),
    ParamMeta::factor("balanced_imbalance", 1.5, (1.0, 2.0, 0.25), "Imbalance for the symmetry bonus"),
];

impl ParameterizedDetector for DojiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOJI_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_max_ratio: get_ratio(params, "body_max_ratio", 0.10)?,
            long_shadow_ratio: get_ratio(params, "long_shadow_ratio", 0.30)?,
            short_shadow_ratio: get_ratio(params, "short_shadow_ratio", 0.10)?,
            tight_body_ratio: get_ratio(params, "tight_body_ratio", 0.03)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        DOJI_IDS
    }
}

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_max_ratio: get_ratio(params, "body_max_ratio", 0.35)?,
            shadow_factor: get_factor(params, "shadow_factor", 2.0)?,
            opposite_shadow_factor: get_factor(params, "opposite_shadow_factor", 0.3)?,
            strong_shadow_factor: get_factor(params, "strong_shadow_factor", 3.0)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        HAMMER_IDS
    }
}

impl ParameterizedDetector for InvertedHammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_max_ratio: get_ratio(params, "body_max_ratio", 0.35)?,
            shadow_factor: get_factor(params, "shadow_factor", 2.0)?,
            opposite_shadow_factor: get_factor(params, "opposite_shadow_factor", 0.3)?,
            strong_shadow_factor: get_factor(params, "strong_shadow_factor", 3.0)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        INVERTED_HAMMER_IDS
    }
}

impl ParameterizedDetector for MarubozuDetector {
    fn param_meta() -> &'static [ParamMeta] {
        MARUBOZU_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_min_ratio: get_ratio(params, "body_min_ratio", 0.85)?,
            shadow_max_ratio: get_ratio(params, "shadow_max_ratio", 0.10)?,
            strong_body_ratio: get_ratio(params, "strong_body_ratio", 0.95)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        MARUBOZU_IDS
    }
}

impl ParameterizedDetector for SpinningTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SPINNING_TOP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            body_min_ratio: get_ratio(params, "body_min_ratio", 0.10)?,
            body_max_ratio: get_ratio(params, "body_max_ratio", 0.30)?,
            min_shadow_factor: get_factor(params, "min_shadow_factor", 0.5)?,
            max_shadow_imbalance: get_factor(params, "max_shadow_imbalance", 2.5)?,
            balanced_imbalance: get_factor(params, "balanced_imbalance", 1.5)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        SPINNING_TOP_IDS
    }
}
