//! # klinescan
//!
//! Candlestick and chart formation detection over daily price bars.
//!
//! The crate classifies single, double and triple candlestick shapes as well as
//! multi-week reversal formations (double top/bottom, head and shoulders) into scored
//! [`DetectedPattern`] records carrying price levels, target/stop projections and the
//! dates involved.
//!
//! ## Quick Start
//!
//! ```rust
//! use klinescan::prelude::*;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let bar = CandleStick::new(
//!     date,
//!     Decimal::new(1000, 1),
//!     Decimal::new(1100, 1),
//!     Decimal::new(900, 1),
//!     Decimal::new(1002, 1),
//!     1_000,
//! )
//! .unwrap();
//!
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! let patterns = engine.detect(&[bar], None).unwrap();
//! assert!(patterns.iter().any(|p| p.pattern_id == ids::LONG_LEGGED_DOJI));
//! ```

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod detectors;
pub mod params;
pub mod pivots;
pub mod registry;
pub mod result;
pub mod series;

pub use registry::{ids, PatternBias, PatternCategory, PatternMetadata};
pub use result::{DetectedPattern, PatternStatus};
pub use series::{CandleStick, PriceSeries};

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Parameters
        params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Pivots
        pivots::{PivotKind, PivotScanner, SwingPoint},
        // Registry
        registry::{ids, Alignment, PatternBias, PatternCategory, PatternMetadata},
        // Results
        result::{DetectedPattern, PatternStatus},
        // Parallel
        scan_parallel,
        // Engine
        BuiltinDetector,
        // Input
        CandleStick,
        DetectorCategory,
        DetectorPriority,
        Direction,
        EngineBuilder,
        EngineConfig,
        OHLCVExt,
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternId,
        Period,
        PriceSeries,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        TrendContext,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised while building inputs or configuring detectors.
///
/// Detection itself never fails: insufficient data and "no match" are empty results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Column {field} has {got} rows, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("No metadata registered for pattern {0}")]
    UnknownPattern(String),
}

impl PatternError {
    /// Re-point a candle error at its position in a sequence.
    pub fn at_index(self, index: usize) -> Self {
        match self {
            Self::InvalidCandle { reason, .. } => Self::InvalidCandle { index, reason },
            other => other,
        }
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core daily bar trait
pub trait OHLCV {
    fn date(&self) -> NaiveDate;
    fn open(&self) -> Decimal;
    fn high(&self) -> Decimal;
    fn low(&self) -> Decimal;
    fn close(&self) -> Decimal;
    fn volume(&self) -> u64;
}

/// Extension trait with computed candle geometry
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> Decimal {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> Decimal {
        self.high() - self.low()
    }

    #[inline]
    fn body_top(&self) -> Decimal {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> Decimal {
        self.open().min(self.close())
    }

    /// Midpoint of the real body
    #[inline]
    fn body_mid(&self) -> Decimal {
        (self.open() + self.close()) / Decimal::TWO
    }

    #[inline]
    fn upper_shadow(&self) -> Decimal {
        self.high() - self.body_top()
    }

    #[inline]
    fn lower_shadow(&self) -> Decimal {
        self.body_bottom() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range is zero
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        detectors::helpers::ratio(self.body(), self.range())
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        detectors::helpers::ratio(self.upper_shadow(), self.range())
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        detectors::helpers::ratio(self.lower_shadow(), self.range())
    }

    /// Validate bar consistency: `low <= min(open, close) <= max(open, close) <= high`
    fn validate(&self) -> Result<()> {
        if self.high() < self.low() {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.body_bottom() < self.low() {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "open or close below low",
            });
        }
        if self.body_top() > self.high() {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "open or close above high",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// PATTERN IDENTITY
// ============================================================

/// Unique identifier for a pattern type, e.g. `KLINE020`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Registry metadata for this identifier
    #[inline]
    pub fn metadata(&self) -> Option<&'static PatternMetadata> {
        registry::lookup(*self)
    }
}

impl Serialize for PatternId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.0)
    }
}

/// Direction of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

// ============================================================
// TREND CONTEXT
// ============================================================

/// Coarse trend label supplied by an upstream classifier.
///
/// Detectors receive it as `Option<TrendContext>`: `None` makes them infer the trend
/// from the bars themselves, `Some(Unknown)` is taken at face value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendContext {
    Uptrend,
    Downtrend,
    #[default]
    Unknown,
}

impl TrendContext {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, TrendContext::Uptrend)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, TrendContext::Downtrend)
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Which framework a detector belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorCategory {
    Candlestick,
    Chart,
}

/// Relative importance tag used by callers when ranking signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorPriority {
    Low,
    Medium,
    High,
}

/// Pattern detector
///
/// `detect` examines the formation ending at the last bar of `bars` and returns every
/// pattern it recognises there. Fewer than [`min_bars`](Self::min_bars) bars yields an
/// empty vector, never an error.
pub trait PatternDetector: Send + Sync {
    /// Stable detector name
    fn name(&self) -> &'static str;
    fn category(&self) -> DetectorCategory;
    fn priority(&self) -> DetectorPriority;
    fn min_bars(&self) -> usize;
    /// Identifiers this detector can emit
    fn pattern_ids(&self) -> &'static [PatternId];

    fn detect<T: OHLCV>(&self, bars: &[T], trend: Option<TrendContext>) -> Vec<DetectedPattern>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> Vec<&'static PatternMetadata> {
        self.pattern_ids()
            .iter()
            .filter_map(|id| registry::lookup(*id))
            .collect()
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - closed set, enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                trend: Option<TrendContext>,
            ) -> Vec<DetectedPattern> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, trend)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn category(&self) -> DetectorCategory {
                match self {
                    $(Self::$variant(d) => PatternDetector::category(d)),*
                }
            }

            #[inline]
            pub fn priority(&self) -> DetectorPriority {
                match self {
                    $(Self::$variant(d) => PatternDetector::priority(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            #[inline]
            pub fn pattern_ids(&self) -> &'static [PatternId] {
                match self {
                    $(Self::$variant(d) => PatternDetector::pattern_ids(d)),*
                }
            }

            pub fn metadata(&self) -> Vec<&'static PatternMetadata> {
                match self {
                    $(Self::$variant(d) => PatternDetector::metadata(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }

        $(
            impl From<$detector> for BuiltinDetector {
                fn from(d: $detector) -> Self {
                    Self::$variant(d)
                }
            }
        )*
    };
}

define_builtin_detectors! {
    // Single bar (5)
    Doji(DojiDetector),
    Hammer(HammerDetector),
    InvertedHammer(InvertedHammerDetector),
    Marubozu(MarubozuDetector),
    SpinningTop(SpinningTopDetector),

    // Two bar (5)
    Engulfing(EngulfingDetector),
    Harami(HaramiDetector),
    Tweezer(TweezerDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    Piercing(PiercingDetector),

    // Three bar (4)
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    ThreeBlackCrows(ThreeBlackCrowsDetector),

    // Chart formations (2)
    DoubleTopBottom(DoubleTopBottomDetector),
    HeadAndShoulders(HeadAndShouldersDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Drop patterns scoring below this strength (0..=100)
    pub min_strength: Option<u8>,
    /// Validate every bar before scanning
    pub validate_data: bool,
    /// Keep only these pattern identifiers
    pub pattern_filter: Option<Vec<String>>,
}

/// Runs a set of detectors over one instrument's bars
#[derive(Debug, Clone)]
pub struct PatternEngine {
    builtin: Vec<BuiltinDetector>,
    config: EngineConfig,
}

impl PatternEngine {
    #[inline]
    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every detector on the formation ending at the last bar.
    ///
    /// Results are ordered by detection date, then pattern id.
    pub fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        trend: Option<TrendContext>,
    ) -> Result<Vec<DetectedPattern>> {
        if self.config.validate_data {
            validate_bars(bars)?;
        }

        let mut patterns = self.detect_internal(bars, trend);
        sort_patterns(&mut patterns);
        debug!(
            bars = bars.len(),
            patterns = patterns.len(),
            "pattern detection finished"
        );
        Ok(patterns)
    }

    /// Convert a provider series and detect on it.
    pub fn detect_series(
        &self,
        series: &PriceSeries,
        trend: Option<TrendContext>,
    ) -> Result<Vec<DetectedPattern>> {
        let candles = series.candles()?;
        self.detect(&candles, trend)
    }

    /// Detect on every prefix `bars[..=i]`, reporting each formation once.
    ///
    /// A formation is identified by its pattern id and involved dates; the earliest
    /// detection wins. Pass `trend = None` to let each prefix infer its own trend.
    pub fn scan_history<T: OHLCV>(
        &self,
        bars: &[T],
        trend: Option<TrendContext>,
    ) -> Result<Vec<DetectedPattern>> {
        if self.config.validate_data {
            validate_bars(bars)?;
        }

        let mut seen: HashSet<(PatternId, Vec<NaiveDate>)> = HashSet::new();
        let mut patterns = Vec::new();

        for end in 1..=bars.len() {
            for pattern in self.detect_internal(&bars[..end], trend) {
                if seen.insert((pattern.pattern_id, pattern.involved_dates.clone())) {
                    patterns.push(pattern);
                }
            }
        }

        sort_patterns(&mut patterns);
        debug!(
            bars = bars.len(),
            patterns = patterns.len(),
            "history scan finished"
        );
        Ok(patterns)
    }

    /// Metadata of every pattern the configured detectors can emit.
    pub fn catalog(&self) -> Vec<&'static PatternMetadata> {
        let mut seen = HashSet::new();
        self.builtin
            .iter()
            .flat_map(BuiltinDetector::metadata)
            .filter(|m| seen.insert(m.id))
            .collect()
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn detect_internal<T: OHLCV>(
        &self,
        bars: &[T],
        trend: Option<TrendContext>,
    ) -> Vec<DetectedPattern> {
        let mut results = Vec::new();

        for detector in &self.builtin {
            if bars.len() < detector.min_bars() {
                continue;
            }
            results.extend(
                detector
                    .detect(bars, trend)
                    .into_iter()
                    .filter(|p| self.should_include(p)),
            );
        }

        results
    }

    fn should_include(&self, p: &DetectedPattern) -> bool {
        if let Some(min) = self.config.min_strength {
            if p.strength < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.iter().any(|id| id == p.pattern_id.as_str()) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        for d in &self.builtin {
            d.validate_config()?;
        }
        if let Some(min) = self.config.min_strength {
            if min > 100 {
                return Err(PatternError::OutOfRange {
                    field: "min_strength",
                    value: f64::from(min),
                    min: 0.0,
                    max: 100.0,
                });
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if let Some(unknown) = filter.iter().find(|id| registry::lookup_str(id).is_none()) {
                return Err(PatternError::InvalidConfig(format!(
                    "pattern filter references unknown id {unknown}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| e.at_index(i))?;
    }
    Ok(())
}

/// Deterministic output order: detection date, then pattern id.
pub fn sort_patterns(patterns: &mut [DetectedPattern]) {
    patterns.sort_by(|a, b| {
        a.detection_date
            .cmp(&b.detection_date)
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    config: EngineConfig,
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every builtin detector with default configuration
    pub fn with_all_defaults(self) -> Self {
        self.with_candlestick_defaults().with_chart_defaults()
    }

    /// Add the 14 candlestick detectors with defaults
    pub fn with_candlestick_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Doji,
            Hammer,
            InvertedHammer,
            Marubozu,
            SpinningTop,
            Engulfing,
            Harami,
            Tweezer,
            DarkCloudCover,
            Piercing,
            MorningStar,
            EveningStar,
            ThreeWhiteSoldiers,
            ThreeBlackCrows,
        ]);
        self
    }

    /// Add the chart formation detectors with defaults
    pub fn with_chart_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![DoubleTopBottom, HeadAndShoulders]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: impl Into<BuiltinDetector>) -> Self {
        self.builtin.push(detector.into());
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: impl Into<BuiltinDetector>) -> Result<Self> {
        let detector = detector.into();
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Replace the whole engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set minimum strength filter
    pub fn min_strength(mut self, strength: u8) -> Self {
        self.config.min_strength = Some(strength);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.config.pattern_filter = Some(ids.into_iter().map(|id| id.as_str().to_string()).collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<DetectedPattern>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel detection over many instruments, one independent call per instrument.
pub fn scan_parallel<'a, T, I>(
    engine: &PatternEngine,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .detect(bars, None)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => {
                warn!(symbol = %e.symbol, error = %e.error, "instrument scan failed");
                errors.push(e)
            }
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
