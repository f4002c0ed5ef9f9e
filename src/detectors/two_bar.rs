//! Two-bar candlestick detectors
//!
//! Engulfing, harami, tweezer top/bottom, dark cloud cover and piercing line. Each one
//! evaluates the last two bars of the input.

use std::collections::HashMap;

use super::helpers::{
    self, body_contains, finish_candle, formation, match_levels, range_contains, ratio,
    resolve_trend, tail_start, volume_at_least, BaseScores, Strength,
};
use crate::{
    ids,
    params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
    DetectedPattern, DetectorCategory, DetectorPriority, OHLCVExt, PatternDetector, PatternId,
    Ratio, Result, TrendContext, OHLCV,
};

impl_with_defaults!(
    EngulfingDetector,
    HaramiDetector,
    TweezerDetector,
    DarkCloudCoverDetector,
    PiercingDetector,
);

// ============================================================
// ENGULFING PATTERNS
// ============================================================

const ENGULFING_BASE: BaseScores = BaseScores::new(75, 65, 55);
static ENGULFING_IDS: &[PatternId] = &[ids::BULLISH_ENGULFING, ids::BEARISH_ENGULFING];

/// Bullish and bearish engulfing.
///
/// The second body must be of the opposite color, contain the first body and be
/// strictly larger.
#[derive(Debug, Clone)]
pub struct EngulfingDetector {
    /// Second body / first body for the size bonus
    pub strong_engulf_factor: f64,
    pub volume_factor: f64,
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self {
            strong_engulf_factor: 1.5,
            volume_factor: helpers::VOLUME_SURGE_FACTOR,
        }
    }
}

impl PatternDetector for EngulfingDetector {
    fn name(&self) -> &'static str {
        "engulfing"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        ENGULFING_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(s) = tail_start(bars, 2) else {
            return Vec::new();
        };
        let (prev, curr) = (&bars[s], &bars[s + 1]);

        let id = if prev.is_bearish() && curr.is_bullish() {
            ids::BULLISH_ENGULFING
        } else if prev.is_bullish() && curr.is_bearish() {
            ids::BEARISH_ENGULFING
        } else {
            return Vec::new();
        };

        if !body_contains(curr, prev) || curr.body() <= prev.body() {
            return Vec::new();
        }
        let Some(engulf_factor) = ratio(curr.body(), prev.body()) else {
            return Vec::new();
        };

        let trend = resolve_trend(trend, bars, s);
        let strength = Strength::base(ENGULFING_BASE.score(id, trend))
            .add_if(engulf_factor >= self.strong_engulf_factor, 10)
            .add_if(volume_at_least(bars, s + 1, self.volume_factor), 10)
            .add_if(range_contains(curr, prev), 5)
            .value();

        formation(bars, s, strength)
            .map(|d| d.detail("engulf_factor", engulf_factor))
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.strong_engulf_factor < 1.0 {
            return Err(crate::PatternError::InvalidValue(
                "strong_engulf_factor must be >= 1",
            ));
        }
        Ok(())
    }
}

// ============================================================
// HARAMI PATTERNS
// ============================================================

const HARAMI_BASE: BaseScores = BaseScores::new(70, 60, 50);
static HARAMI_IDS: &[PatternId] = &[ids::BULLISH_HARAMI, ids::BEARISH_HARAMI];

/// Bullish and bearish harami: a small body inside a prior long body.
///
/// Direction follows the first bar: a long black bar gives the bullish harami.
#[derive(Debug, Clone)]
pub struct HaramiDetector {
    pub first_body_min_ratio: Ratio,
    /// Maximum second body / first body
    pub max_body_factor: Ratio,
    pub tight_body_factor: Ratio,
}

impl Default for HaramiDetector {
    fn default() -> Self {
        Self {
            first_body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
            max_body_factor: Ratio::new_const(0.5),
            tight_body_factor: Ratio::new_const(0.25),
        }
    }
}

impl PatternDetector for HaramiDetector {
    fn name(&self) -> &'static str {
        "harami"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::Medium
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        HARAMI_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(s) = tail_start(bars, 2) else {
            return Vec::new();
        };
        let (mother, baby) = (&bars[s], &bars[s + 1]);

        let id = if mother.is_bearish() {
            ids::BULLISH_HARAMI
        } else if mother.is_bullish() {
            ids::BEARISH_HARAMI
        } else {
            return Vec::new();
        };

        if !mother
            .body_ratio()
            .is_some_and(|r| r >= self.first_body_min_ratio.get())
        {
            return Vec::new();
        }
        let Some(size) = ratio(baby.body(), mother.body()) else {
            return Vec::new();
        };
        if size > self.max_body_factor.get() || !body_contains(mother, baby) {
            return Vec::new();
        }

        let opposite = (mother.is_bearish() && baby.is_bullish())
            || (mother.is_bullish() && baby.is_bearish());

        let trend = resolve_trend(trend, bars, s);
        let strength = Strength::base(HARAMI_BASE.score(id, trend))
            .add_if(size <= self.tight_body_factor.get(), 10)
            .add_if(opposite, 5)
            .add_if(
                volume_at_least(bars, s + 1, helpers::VOLUME_CONFIRM_FACTOR),
                10,
            )
            .value();

        formation(bars, s, strength)
            .map(|d| d.detail("body_size_factor", size))
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }
}

// ============================================================
// TWEEZER TOP / BOTTOM
// ============================================================

const TWEEZER_BASE: BaseScores = BaseScores::new(70, 60, 50);
static TWEEZER_IDS: &[PatternId] = &[ids::TWEEZER_TOP, ids::TWEEZER_BOTTOM];

/// Tweezer top (matching highs, white then black) and tweezer bottom (matching lows,
/// black then white).
///
/// Levels match when they differ by at most `level_tolerance` of the first bar's
/// extreme. The second bar must show a shadow of at least `min_shadow_ratio` of its
/// range on the matched side.
#[derive(Debug, Clone)]
pub struct TweezerDetector {
    pub level_tolerance: Ratio,
    /// Deviation at or below this earns the near-match bonus
    pub near_tolerance: Ratio,
    pub min_shadow_ratio: Ratio,
}

impl Default for TweezerDetector {
    fn default() -> Self {
        Self {
            level_tolerance: Ratio::new_const(0.005),
            near_tolerance: Ratio::new_const(0.001),
            min_shadow_ratio: Ratio::new_const(0.1),
        }
    }
}

impl PatternDetector for TweezerDetector {
    fn name(&self) -> &'static str {
        "tweezer"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::Medium
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        TWEEZER_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        let Some(s) = tail_start(bars, 2) else {
            return Vec::new();
        };
        let (first, second) = (&bars[s], &bars[s + 1]);

        let (id, level, shadow) = if first.is_bullish() && second.is_bearish() {
            (
                ids::TWEEZER_TOP,
                match_levels(first.high(), second.high(), self.level_tolerance.get()),
                second.upper_shadow_ratio(),
            )
        } else if first.is_bearish() && second.is_bullish() {
            (
                ids::TWEEZER_BOTTOM,
                match_levels(first.low(), second.low(), self.level_tolerance.get()),
                second.lower_shadow_ratio(),
            )
        } else {
            return Vec::new();
        };

        let Some(level) = level else {
            return Vec::new();
        };
        if !shadow.is_some_and(|r| r >= self.min_shadow_ratio.get()) {
            return Vec::new();
        }

        let trend = resolve_trend(trend, bars, s);
        let strength = Strength::base(TWEEZER_BASE.score(id, trend))
            .add_if(level.exact, 15)
            .add_if(
                !level.exact && level.deviation <= self.near_tolerance.get(),
                10,
            )
            .add_if(
                volume_at_least(bars, s + 1, helpers::VOLUME_CONFIRM_FACTOR),
                10,
            )
            .value();

        formation(bars, s, strength)
            .map(|d| {
                d.detail("is_exact_match", if level.exact { 1.0 } else { 0.0 })
                    .detail("level_deviation_pct", level.deviation * 100.0)
            })
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.near_tolerance > self.level_tolerance {
            return Err(crate::PatternError::InvalidConfig(
                "tweezer near_tolerance exceeds level_tolerance".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

const PENETRATION_BASE: BaseScores = BaseScores::new(75, 60, 50);
static DARK_CLOUD_IDS: &[PatternId] = &[ids::DARK_CLOUD_COVER];
static PIERCING_IDS: &[PatternId] = &[ids::PIERCING_LINE];

/// Thresholds shared by the two gap-and-penetrate reversals
#[derive(Debug, Clone, Copy)]
struct Penetration {
    first_body_min_ratio: f64,
    min_penetration: f64,
    strong_penetration: f64,
}

impl Penetration {
    /// Depth of the second close into the first body, when the pair qualifies.
    ///
    /// `bearish` selects dark cloud cover (white bar, gap above its close, black close
    /// into the body); otherwise piercing line.
    fn measure<T: OHLCV>(&self, first: &T, second: &T, bearish: bool) -> Option<f64> {
        if !first
            .body_ratio()
            .is_some_and(|r| r >= self.first_body_min_ratio)
        {
            return None;
        }

        let (depth, shaped) = if bearish {
            (
                first.close() - second.close(),
                first.is_bullish()
                    && second.is_bearish()
                    && second.open() > first.close()
                    && second.close() > first.open(),
            )
        } else {
            (
                second.close() - first.close(),
                first.is_bearish()
                    && second.is_bullish()
                    && second.open() < first.close()
                    && second.close() < first.open(),
            )
        };
        if !shaped {
            return None;
        }

        let penetration = ratio(depth, first.body())?;
        (penetration >= self.min_penetration).then_some(penetration)
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        trend: Option<TrendContext>,
        id: PatternId,
        bearish: bool,
    ) -> Vec<DetectedPattern> {
        let Some(s) = tail_start(bars, 2) else {
            return Vec::new();
        };
        let Some(penetration) = self.measure(&bars[s], &bars[s + 1], bearish) else {
            return Vec::new();
        };

        let trend = resolve_trend(trend, bars, s);
        let strength = Strength::base(PENETRATION_BASE.score(id, trend))
            .add_if(penetration >= self.strong_penetration, 10)
            .add_if(
                volume_at_least(bars, s + 1, helpers::VOLUME_CONFIRM_FACTOR),
                10,
            )
            .value();

        formation(bars, s, strength)
            .map(|d| d.detail("penetration_ratio", penetration))
            .and_then(|d| finish_candle(id, bars, d))
            .into_iter()
            .collect()
    }
}

/// Dark cloud cover: a long white bar, then a black bar opening above its close and
/// closing below the midpoint of its body but still inside it.
#[derive(Debug, Clone)]
pub struct DarkCloudCoverDetector {
    pub first_body_min_ratio: Ratio,
    pub min_penetration: Ratio,
    pub strong_penetration: Ratio,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self {
            first_body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
            min_penetration: Ratio::new_const(0.5),
            strong_penetration: Ratio::new_const(0.7),
        }
    }
}

impl DarkCloudCoverDetector {
    fn thresholds(&self) -> Penetration {
        Penetration {
            first_body_min_ratio: self.first_body_min_ratio.get(),
            min_penetration: self.min_penetration.get(),
            strong_penetration: self.strong_penetration.get(),
        }
    }
}

impl PatternDetector for DarkCloudCoverDetector {
    fn name(&self) -> &'static str {
        "dark_cloud_cover"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        DARK_CLOUD_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        self.thresholds()
            .detect(bars, trend, ids::DARK_CLOUD_COVER, true)
    }
}

/// Piercing line: a long black bar, then a white bar opening below its close and
/// closing above the midpoint of its body but still inside it.
#[derive(Debug, Clone)]
pub struct PiercingDetector {
    pub first_body_min_ratio: Ratio,
    pub min_penetration: Ratio,
    pub strong_penetration: Ratio,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self {
            first_body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
            min_penetration: Ratio::new_const(0.5),
            strong_penetration: Ratio::new_const(0.7),
        }
    }
}

impl PiercingDetector {
    fn thresholds(&self) -> Penetration {
        Penetration {
            first_body_min_ratio: self.first_body_min_ratio.get(),
            min_penetration: self.min_penetration.get(),
            strong_penetration: self.strong_penetration.get(),
        }
    }
}

impl PatternDetector for PiercingDetector {
    fn name(&self) -> &'static str {
        "piercing"
    }

    fn category(&self) -> DetectorCategory {
        DetectorCategory::Candlestick
    }

    fn priority(&self) -> DetectorPriority {
        DetectorPriority::High
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn pattern_ids(&self) -> &'static [PatternId] {
        PIERCING_IDS
    }

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
        self.thresholds()
            .detect(bars, trend, ids::PIERCING_LINE, false)
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

// Static parameter metadata definitions
static ENGULFING_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "strong_engulf_factor",
        param_type: ParamType::Factor,
        default: 1.5,
        range: (1.2, 2.0, 0.1),
        description: "Second body / first body for the size bonus",
    },
    ParamMeta {
        name: "volume_factor",
        param_type: ParamType::Factor,
        default: 1.5,
        range: (1.2, 2.0, 0.1),
        description: "Volume multiple for the volume bonus",
    },
];

static HARAMI_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "first_body_min_ratio",
        param_type: ParamType::Ratio,
        default: 0.6,
        range: (0.5, 0.8, 0.1),
        description: "Minimum body / range of the first bar",
    },
    ParamMeta {
        name: "max_body_factor",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.3, 0.6, 0.1),
        description: "Maximum second body / first body",
    },
    ParamMeta {
        name: "tight_body_factor",
        param_type: ParamType::Ratio,
        default: 0.25,
        range: (0.1, 0.3, 0.05),
        description: "Second body / first body for the tight-body bonus",
    },
];

static TWEEZER_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "level_tolerance",
        param_type: ParamType::Ratio,
        default: 0.005,
        range: (0.001, 0.01, 0.001),
        description: "Relative tolerance between the matched extremes",
    },
    ParamMeta {
        name: "near_tolerance",
        param_type: ParamType::Ratio,
        default: 0.001,
        range: (0.0005, 0.002, 0.0005),
        description: "Deviation for the near-match bonus",
    },
    ParamMeta {
        name: "min_shadow_ratio",
        param_type: ParamType::Ratio,
        default: 0.1,
        range: (0.05, 0.3, 0.05),
        description: "Minimum rejecting shadow / range on the second bar",
    },
];

static PENETRATION_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "first_body_min_ratio",
        param_type: ParamType::Ratio,
        default: 0.6,
        range: (0.5, 0.8, 0.1),
        description: "Minimum body / range of the first bar",
    },
    ParamMeta {
        name: "min_penetration",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.4, 0.7, 0.1),
        description: "Minimum penetration into the first body",
    },
    ParamMeta {
        name: "strong_penetration",
        param_type: ParamType::Ratio,
        default: 0.7,
        range: (0.6, 0.9, 0.1),
        description: "Penetration for the deep-penetration bonus",
    },
];

impl ParameterizedDetector for EngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            strong_engulf_factor: get_factor(params, "strong_engulf_factor", 1.5)?,
            volume_factor: get_factor(params, "volume_factor", 1.5)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        ENGULFING_IDS
    }
}

impl ParameterizedDetector for HaramiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HARAMI_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            first_body_min_ratio: get_ratio(params, "first_body_min_ratio", 0.6)?,
            max_body_factor: get_ratio(params, "max_body_factor", 0.5)?,
            tight_body_factor: get_ratio(params, "tight_body_factor", 0.25)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        HARAMI_IDS
    }
}

impl ParameterizedDetector for TweezerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TWEEZER_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            level_tolerance: get_ratio(params, "level_tolerance", 0.005)?,
            near_tolerance: get_ratio(params, "near_tolerance", 0.001)?,
            min_shadow_ratio: get_ratio(params, "min_shadow_ratio", 0.1)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        TWEEZER_IDS
    }
}

impl ParameterizedDetector for DarkCloudCoverDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PENETRATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            first_body_min_ratio: get_ratio(params, "first_body_min_ratio", 0.6)?,
            min_penetration: get_ratio(params, "min_penetration", 0.5)?,
            strong_penetration: get_ratio(params, "strong_penetration", 0.7)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        DARK_CLOUD_IDS
    }
}

impl ParameterizedDetector for PiercingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PENETRATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            first_body_min_ratio: get_ratio(params, "first_body_min_ratio", 0.6)?,
            min_penetration: get_ratio(params, "min_penetration", 0.5)?,
            strong_penetration: get_ratio(params, "strong_penetration", 0.7)?,
        })
    }

    fn emitted_ids() -> &'static [PatternId] {
        PIERCING_IDS
    }
}
