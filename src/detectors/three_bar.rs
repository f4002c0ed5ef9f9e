//! Three-bar candlestick detectors
//!
//! Morning / evening star and three white soldiers / three black crows. Each one
//! evaluates the last three bars of the input.

use std::collections::HashMap;

use crate::{
  ids,
  params::{get_factor, get_ratio, ParamMeta, ParameterizedDetector},
  DetectedPattern, DetectorCategory, DetectorPriority, OHLCVExt, PatternDetector, PatternId,
  Ratio, Result, TrendContext, OHLCV,
};

use super::helpers::{
  self, finish_candle, formation, ratio, resolve_trend, tail_start, volume_at_least, BaseScores,
  Strength,
};

// ============================================================
// MORNING STAR / EVENING STAR
// ============================================================

const STAR_BASE: BaseScores = BaseScores::new(80, 70, 55);
static MORNING_STAR_IDS: &[PatternId] = &[ids::MORNING_STAR];
static EVENING_STAR_IDS: &[PatternId] = &[ids::EVENING_STAR];

#[derive(Debug, Clone, Copy)]
struct StarShape {
  outer_body_min_ratio: f64,
  star_body_max_ratio: f64,
  min_penetration: f64,
  doji_body_ratio: f64,
  volume_factor: f64,
}

impl StarShape {
  fn detect<T: OHLCV>(
    &self,
    bars: &[T],
    trend: Option<TrendContext>,
    id: PatternId,
    bullish: bool,
  ) -> Vec<DetectedPattern> {
    let Some(s) = tail_start(bars, 3) else {
      return Vec::new();
    };
    let (first, star, last) = (&bars[s], &bars[s + 1], &bars[s + 2]);

    let colors = if bullish {
      first.is_bearish() && last.is_bullish()
    } else {
      first.is_bullish() && last.is_bearish()
    };
    if !colors {
      return Vec::new();
    }

    let long = |b: &T| b.body_ratio().is_some_and(|r| r >= self.outer_body_min_ratio);
    if !long(first) || !long(last) {
      return Vec::new();
    }

    // A flat bar is the smallest possible star
    let star_body = star.body_ratio().unwrap_or(0.0);
    if star_body > self.star_body_max_ratio {
      return Vec::new();
    }

    let gapped = if bullish {
      star.body_top() < first.body_bottom()
    } else {
      star.body_bottom() > first.body_top()
    };
    if !gapped {
      return Vec::new();
    }

    let depth = if bullish {
      last.close() - first.close()
    } else {
      first.close() - last.close()
    };
    let Some(penetration) = ratio(depth, first.body()) else {
      return Vec::new();
    };
    if penetration < self.min_penetration {
      return Vec::new();
    }

    let trend = resolve_trend(trend, bars, s);
    let strength = Strength::base(STAR_BASE.score(id, trend))
      .add_if(star_body <= self.doji_body_ratio, 10)
      .add_if(penetration >= 1.0, 10)
      .add_if(volume_at_least(bars, s + 2, self.volume_factor), 10)
      .value();

    formation(bars, s, strength)
      .map(|d| d.detail("penetration_ratio", penetration).detail("star_body_ratio", star_body))
      .and_then(|d| finish_candle(id, bars, d))
      .into_iter()
      .collect()
  }
}

/// Morning star: long black bar, small star gapped below its body, long white bar
/// closing at least `min_penetration` into the first body.
#[derive(Debug, Clone)]
pub struct MorningStarDetector {
  pub outer_body_min_ratio: Ratio,
  pub star_body_max_ratio: Ratio,
  pub min_penetration: Ratio,
  pub doji_body_ratio: Ratio,
  pub volume_factor: f64,
}

impl Default for MorningStarDetector {
  fn default() -> Self {
    Self {
      outer_body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
      star_body_max_ratio: Ratio::new_const(helpers::SMALL_BODY_RATIO),
      min_penetration: Ratio::new_const(0.5),
      doji_body_ratio: Ratio::new_const(helpers::DOJI_BODY_RATIO),
      volume_factor: helpers::VOLUME_SURGE_FACTOR,
    }
  }
}

impl MorningStarDetector {
  pub fn with_defaults() -> Self {
    Self::default()
  }

  fn shape(&self) -> StarShape {
    StarShape {
      outer_body_min_ratio: self.outer_body_min_ratio.get(),
      star_body_max_ratio: self.star_body_max_ratio.get(),
      min_penetration: self.min_penetration.get(),
      doji_body_ratio: self.doji_body_ratio.get(),
      volume_factor: self.volume_factor,
    }
  }
}

impl PatternDetector for MorningStarDetector {
  fn name(&self) -> &'static str {
    "morning_star"
  }

  fn category(&self) -> DetectorCategory {
    DetectorCategory::Candlestick
  }

  fn priority(&self) -> DetectorPriority {
    DetectorPriority::High
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn pattern_ids(&self) -> &'static [PatternId] {
    MORNING_STAR_IDS
  }

  fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
    self.shape().detect(bars, trend, ids::MORNING_STAR, true)
  }
}

/// Evening star: long white bar, small star gapped above its body, long black bar
/// closing at least `min_penetration` into the first body.
#[derive(Debug, Clone)]
pub struct EveningStarDetector {
  pub outer_body_min_ratio: Ratio,
  pub star_body_max_ratio: Ratio,
  pub min_penetration: Ratio,
  pub doji_body_ratio: Ratio,
  pub volume_factor: f64,
}

impl Default for EveningStarDetector {
  fn default() -> Self {
    Self {
      outer_body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
      star_body_max_ratio: Ratio::new_const(helpers::SMALL_BODY_RATIO),
      min_penetration: Ratio::new_const(0.5),
      doji_body_ratio: Ratio::new_const(helpers::DOJI_BODY_RATIO),
      volume_factor: helpers::VOLUME_SURGE_FACTOR,
    }
  }
}

impl EveningStarDetector {
  pub fn with_defaults() -> Self {
    Self::default()
  }

  fn shape(&self) -> StarShape {
    StarShape {
      outer_body_min_ratio: self.outer_body_min_ratio.get(),
      star_body_max_ratio: self.star_body_max_ratio.get(),
      min_penetration: self.min_penetration.get(),
      doji_body_ratio: self.doji_body_ratio.get(),
      volume_factor: self.volume_factor,
    }
  }
}

impl PatternDetector for EveningStarDetector {
  fn name(&self) -> &'static str {
    "evening_star"
  }

  fn category(&self) -> DetectorCategory {
    DetectorCategory::Candlestick
  }

  fn priority(&self) -> DetectorPriority {
    DetectorPriority::High
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn pattern_ids(&self) -> &'static [PatternId] {
    EVENING_STAR_IDS
  }

  fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
    self.shape().detect(bars, trend, ids::EVENING_STAR, false)
  }
}

// ============================================================
// THREE WHITE SOLDIERS / THREE BLACK CROWS
// ============================================================

const MARCH_BASE: BaseScores = BaseScores::new(75, 65, 55);
static SOLDIERS_IDS: &[PatternId] = &[ids::THREE_WHITE_SOLDIERS];
static CROWS_IDS: &[PatternId] = &[ids::THREE_BLACK_CROWS];

#[derive(Debug, Clone, Copy)]
struct MarchShape {
  body_min_ratio: f64,
  shadow_max_ratio: f64,
}

impl MarchShape {
  fn detect<T: OHLCV>(
    &self,
    bars: &[T],
    trend: Option<TrendContext>,
    id: PatternId,
    bullish: bool,
  ) -> Vec<DetectedPattern> {
    let Some(s) = tail_start(bars, 3) else {
      return Vec::new();
    };
    let trio = &bars[s..];

    let colored = |b: &T| if bullish { b.is_bullish() } else { b.is_bearish() };
    if !trio.iter().all(|b| colored(b)) {
      return Vec::new();
    }
    if !trio
      .iter()
      .all(|b| b.body_ratio().is_some_and(|r| r >= self.body_min_ratio))
    {
      return Vec::new();
    }

    let marching = trio.windows(2).all(|w| {
      let (prev, curr) = (&w[0], &w[1]);
      let extends = if bullish {
        curr.close() > prev.close()
      } else {
        curr.close() < prev.close()
      };
      let opens_inside = curr.open() >= prev.body_bottom() && curr.open() <= prev.body_top();
      extends && opens_inside
    });
    if !marching {
      return Vec::new();
    }

    let rising_volume = trio.windows(2).all(|w| w[1].volume() > w[0].volume());
    let clean_closes = trio.iter().all(|b| {
      let far = if bullish { b.upper_shadow_ratio() } else { b.lower_shadow_ratio() };
      far.is_some_and(|r| r <= self.shadow_max_ratio)
    });

    let trend = resolve_trend(trend, bars, s);
    let strength = Strength::base(MARCH_BASE.score(id, trend))
      .add_if(rising_volume, 10)
      .add_if(clean_closes, 10)
      .value();

    let min_body = trio
      .iter()
      .filter_map(OHLCVExt::body_ratio)
      .fold(f64::INFINITY, f64::min);

    formation(bars, s, strength)
      .map(|d| d.detail("min_body_ratio", min_body))
      .and_then(|d| finish_candle(id, bars, d))
      .into_iter()
      .collect()
  }
}

/// Three white soldiers: three long white bars, each opening inside the prior body and
/// closing higher.
#[derive(Debug, Clone)]
pub struct ThreeWhiteSoldiersDetector {
  pub body_min_ratio: Ratio,
  /// Upper shadow / range for the clean-close bonus
  pub shadow_max_ratio: Ratio,
}

impl Default for ThreeWhiteSoldiersDetector {
  fn default() -> Self {
    Self {
      body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
      shadow_max_ratio: Ratio::new_const(0.1),
    }
  }
}

impl ThreeWhiteSoldiersDetector {
  pub fn with_defaults() -> Self {
    Self::default()
  }

  fn shape(&self) -> MarchShape {
    MarchShape { body_min_ratio: self.body_min_ratio.get(), shadow_max_ratio: self.shadow_max_ratio.get() }
  }
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
  fn name(&self) -> &'static str {
    "three_white_soldiers"
  }

  fn category(&self) -> DetectorCategory {
    DetectorCategory::Candlestick
  }

  fn priority(&self) -> DetectorPriority {
    DetectorPriority::Medium
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn pattern_ids(&self) -> &'static [PatternId] {
    SOLDIERS_IDS
  }

  fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
    self.shape().detect(bars, trend, ids::THREE_WHITE_SOLDIERS, true)
  }
}

/// Three black crows: three long black bars, each opening inside the prior body and
/// closing lower.
#[derive(Debug, Clone)]
pub struct ThreeBlackCrowsDetector {
  pub body_min_ratio: Ratio,
  /// Lower shadow / range for the clean-close bonus
  pub shadow_max_ratio: Ratio,
}

impl Default for ThreeBlackCrowsDetector {
  fn default() -> Self {
    Self {
      body_min_ratio: Ratio::new_const(helpers::LARGE_BODY_RATIO),
      shadow_max_ratio: Ratio::new_const(0.1),
    }
  }
}

impl ThreeBlackCrowsDetector {
  pub fn with_defaults() -> Self {
    Self::default()
  }

  fn shape(&self) -> MarchShape {
    MarchShape { body_min_ratio: self.body_min_ratio.get(), shadow_max_ratio: self.shadow_max_ratio.get() }
  }
}

impl PatternDetector for ThreeBlackCrowsDetector {
  fn name(&self) -> &'static str {
    "three_black_crows"
  }

  fn category(&self) -> DetectorCategory {
    DetectorCategory::Candlestick
  }

  fn priority(&self) -> DetectorPriority {
    DetectorPriority::Medium
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn pattern_ids(&self) -> &'static [PatternId] {
    CROWS_IDS
  }

  fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern> {
    self.shape().detect(bars, trend, ids::THREE_BLACK_CROWS, false)
  }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static STAR_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("outer_body_min_ratio", 0.6, (0.5, 0.8, 0.1), "Minimum body / range of bars 1 and 3"),
  ParamMeta::ratio("star_body_max_ratio", 0.3, (0.1, 0.4, 0.1), "Maximum body / range of the star"),
  ParamMeta::ratio("min_penetration", 0.5, (0.3, 0.7, 0.1), "Minimum penetration of bar 3 into bar 1"),
  ParamMeta::ratio("doji_body_ratio", 0.1, (0.05, 0.15, 0.05), "Star body / range for the doji bonus"),
  ParamMeta::factor("volume_factor", 1.5, (1.2, 2.0, 0.1), "Volume multiple on bar 3 for the bonus"),
];

static MARCH_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("body_min_ratio", 0.6, (0.5, 0.8, 0.1), "Minimum body / range of each bar"),
  ParamMeta::ratio("shadow_max_ratio", 0.1, (0.05, 0.2, 0.05), "Far-side shadow / range for the bonus"),
];

fn star_from_params(params: &HashMap<&str, f64>) -> Result<(Ratio, Ratio, Ratio, Ratio, f64)> {
  Ok((
    get_ratio(params, "outer_body_min_ratio", 0.6)?,
    get_ratio(params, "star_body_max_ratio", 0.3)?,
    get_ratio(params, "min_penetration", 0.5)?,
    get_ratio(params, "doji_body_ratio", 0.1)?,
    get_factor(params, "volume_factor", 1.5)?,
  ))
}

impl ParameterizedDetector for MorningStarDetector {
  fn param_meta() -> &'static [ParamMeta] {
    STAR_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let (outer_body_min_ratio, star_body_max_ratio, min_penetration, doji_body_ratio, volume_factor) =
      star_from_params(params)?;
    Ok(Self { outer_body_min_ratio, star_body_max_ratio, min_penetration, doji_body_ratio, volume_factor })
  }

  fn emitted_ids() -> &'static [PatternId] {
    MORNING_STAR_IDS
  }
}

impl ParameterizedDetector for EveningStarDetector {
  fn param_meta() -> &'static [ParamMeta] {
    STAR_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let (outer_body_min_ratio, star_body_max_ratio, min_penetration, doji_body_ratio, volume_factor) =
      star_from_params(params)?;
    Ok(Self { outer_body_min_ratio, star_body_max_ratio, min_penetration, doji_body_ratio, volume_factor })
  }

  fn emitted_ids() -> &'static [PatternId] {
    EVENING_STAR_IDS
  }
}

impl ParameterizedDetector for ThreeWhiteSoldiersDetector {
  fn param_meta() -> &'static [ParamMeta] {
    MARCH_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      body_min_ratio: get_ratio(params, "body_min_ratio", 0.6)?,
      shadow_max_ratio: get_ratio(params, "shadow_max_ratio", 0.1)?,
    })
  }

  fn emitted_ids() -> &'static [PatternId] {
    SOLDIERS_IDS
  }
}

impl ParameterizedDetector for ThreeBlackCrowsDetector {
  fn param_meta() -> &'static [ParamMeta] {
    MARCH_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      body_min_ratio: get_ratio(params, "body_min_ratio", 0.6)?,
      shadow_max_ratio: get_ratio(params, "shadow_max_ratio", 0.1)?,
    })
  }

  fn emitted_ids() -> &'static [PatternId] {
    CROWS_IDS
  }
}
