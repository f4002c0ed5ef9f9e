//! Static pattern metadata registry
//!
//! Every pattern identifier a detector can emit has exactly one entry here. The table is
//! a `static` slice, so it is built at compile time and shared read-only by all threads.

use serde::Serialize;

use crate::{Direction, PatternError, PatternId, Result, TrendContext};

// ============================================================
// PATTERN IDENTIFIERS
// ============================================================

/// Identifiers of every pattern in the registry.
pub mod ids {
    use crate::PatternId;

    // Single bar
    pub const DOJI: PatternId = PatternId("KLINE001");
    pub const DRAGONFLY_DOJI: PatternId = PatternId("KLINE002");
    pub const GRAVESTONE_DOJI: PatternId = PatternId("KLINE003");
    pub const LONG_LEGGED_DOJI: PatternId = PatternId("KLINE004");
    pub const HAMMER: PatternId = PatternId("KLINE005");
    pub const HANGING_MAN: PatternId = PatternId("KLINE006");
    pub const INVERTED_HAMMER: PatternId = PatternId("KLINE007");
    pub const SHOOTING_STAR: PatternId = PatternId("KLINE008");
    pub const BULLISH_MARUBOZU: PatternId = PatternId("KLINE009");
    pub const BEARISH_MARUBOZU: PatternId = PatternId("KLINE010");
    pub const SPINNING_TOP: PatternId = PatternId("KLINE011");

    // Two bar
    pub const BULLISH_ENGULFING: PatternId = PatternId("KLINE020");
    pub const BEARISH_ENGULFING: PatternId = PatternId("KLINE021");
    pub const BULLISH_HARAMI: PatternId = PatternId("KLINE022");
    pub const BEARISH_HARAMI: PatternId = PatternId("KLINE023");
    pub const TWEEZER_TOP: PatternId = PatternId("KLINE024");
    pub const TWEEZER_BOTTOM: PatternId = PatternId("KLINE025");
    pub const DARK_CLOUD_COVER: PatternId = PatternId("KLINE026");
    pub const PIERCING_LINE: PatternId = PatternId("KLINE027");

    // Three bar
    pub const MORNING_STAR: PatternId = PatternId("KLINE040");
    pub const EVENING_STAR: PatternId = PatternId("KLINE041");
    pub const THREE_WHITE_SOLDIERS: PatternId = PatternId("KLINE042");
    pub const THREE_BLACK_CROWS: PatternId = PatternId("KLINE043");

    // Chart formations
    pub const HEAD_AND_SHOULDERS: PatternId = PatternId("CHART001");
    pub const INVERSE_HEAD_AND_SHOULDERS: PatternId = PatternId("CHART002");
    pub const DOUBLE_TOP: PatternId = PatternId("CHART003");
    pub const DOUBLE_BOTTOM: PatternId = PatternId("CHART004");
}

// ============================================================
// CLASSIFICATION
// ============================================================

/// Structural category of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    CandlestickSingle,
    CandlestickDouble,
    CandlestickTriple,
    ChartReversal,
    ChartContinuation,
    ChartGap,
    ChartBilateral,
}

impl PatternCategory {
    #[inline]
    pub fn is_candlestick(self) -> bool {
        matches!(
            self,
            Self::CandlestickSingle | Self::CandlestickDouble | Self::CandlestickTriple
        )
    }
}

/// Directional bias a pattern signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternBias {
    BullishReversal,
    BearishReversal,
    BullishContinuation,
    BearishContinuation,
    Neutral,
}

/// How a pattern's bias relates to the prevailing trend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Reversal against the trend, or continuation with it
    Aligned,
    Unknown,
    Opposed,
}

impl PatternBias {
    pub fn direction(self) -> Direction {
        match self {
            Self::BullishReversal | Self::BullishContinuation => Direction::Bullish,
            Self::BearishReversal | Self::BearishContinuation => Direction::Bearish,
            Self::Neutral => Direction::Neutral,
        }
    }

    #[inline]
    pub fn is_reversal(self) -> bool {
        matches!(self, Self::BullishReversal | Self::BearishReversal)
    }

    /// Reversal patterns agree with a counter-trend, continuation patterns with the trend.
    pub fn alignment(self, trend: TrendContext) -> Alignment {
        use TrendContext::{Downtrend, Uptrend};

        match (self, trend) {
            (Self::Neutral, _) | (_, TrendContext::Unknown) => Alignment::Unknown,
            (Self::BullishReversal, Downtrend)
            | (Self::BearishReversal, Uptrend)
            | (Self::BullishContinuation, Uptrend)
            | (Self::BearishContinuation, Downtrend) => Alignment::Aligned,
            _ => Alignment::Opposed,
        }
    }
}

// ============================================================
// METADATA
// ============================================================

/// Static descriptor of one pattern identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternMetadata {
    pub id: PatternId,
    pub name: &'static str,
    pub localized_name: &'static str,
    pub category: PatternCategory,
    pub bias: PatternBias,
    pub min_bars: usize,
    pub description: &'static str,
}

macro_rules! meta {
    ($id:expr, $name:literal, $local:literal, $cat:ident, $bias:ident, $min:literal, $desc:literal) => {
        PatternMetadata {
            id: $id,
            name: $name,
            localized_name: $local,
            category: PatternCategory::$cat,
            bias: PatternBias::$bias,
            min_bars: $min,
            description: $desc,
        }
    };
}

static REGISTRY: &[PatternMetadata] = &[
    meta!(ids::DOJI, "Doji", "十字星", CandlestickSingle, Neutral, 1,
        "Open and close nearly equal; indecision between buyers and sellers."),
    meta!(ids::DRAGONFLY_DOJI, "Dragonfly Doji", "蜻蜓十字", CandlestickSingle, BullishReversal, 1,
        "Doji with a long lower shadow and no upper shadow; sellers were rejected."),
    meta!(ids::GRAVESTONE_DOJI, "Gravestone Doji", "墓碑十字", CandlestickSingle, BearishReversal, 1,
        "Doji with a long upper shadow and no lower shadow; buyers were rejected."),
    meta!(ids::LONG_LEGGED_DOJI, "Long-Legged Doji", "长腿十字", CandlestickSingle, Neutral, 1,
        "Doji with long shadows on both sides; wide intraday swings ending flat."),
    meta!(ids::HAMMER, "Hammer", "锤子线", CandlestickSingle, BullishReversal, 1,
        "Small body near the high with a long lower shadow after a decline."),
    meta!(ids::HANGING_MAN, "Hanging Man", "上吊线", CandlestickSingle, BearishReversal, 1,
        "Hammer shape appearing after an advance; warns of distribution."),
    meta!(ids::INVERTED_HAMMER, "Inverted Hammer", "倒锤子线", CandlestickSingle, BullishReversal, 1,
        "Small body near the low with a long upper shadow after a decline."),
    meta!(ids::SHOOTING_STAR, "Shooting Star", "射击之星", CandlestickSingle, BearishReversal, 1,
        "Small body near the low with a long upper shadow after an advance."),
    meta!(ids::BULLISH_MARUBOZU, "Bullish Marubozu", "光头光脚阳线", CandlestickSingle, BullishContinuation, 1,
        "Long white body with almost no shadows; buyers controlled the whole session."),
    meta!(ids::BEARISH_MARUBOZU, "Bearish Marubozu", "光头光脚阴线", CandlestickSingle, BearishContinuation, 1,
        "Long black body with almost no shadows; sellers controlled the whole session."),
    meta!(ids::SPINNING_TOP, "Spinning Top", "纺锤线", CandlestickSingle, Neutral, 1,
        "Small body with balanced upper and lower shadows."),
    meta!(ids::BULLISH_ENGULFING, "Bullish Engulfing", "看涨吞没", CandlestickDouble, BullishReversal, 2,
        "White body fully engulfs the prior black body."),
    meta!(ids::BEARISH_ENGULFING, "Bearish Engulfing", "看跌吞没", CandlestickDouble, BearishReversal, 2,
        "Black body fully engulfs the prior white body."),
    meta!(ids::BULLISH_HARAMI, "Bullish Harami", "看涨孕线", CandlestickDouble, BullishReversal, 2,
        "Small body contained inside a prior long black body."),
    meta!(ids::BEARISH_HARAMI, "Bearish Harami", "看跌孕线", CandlestickDouble, BearishReversal, 2,
        "Small body contained inside a prior long white body."),
    meta!(ids::TWEEZER_TOP, "Tweezer Top", "平头顶部", CandlestickDouble, BearishReversal, 2,
        "Two consecutive bars rejected at the same high."),
    meta!(ids::TWEEZER_BOTTOM, "Tweezer Bottom", "平头底部", CandlestickDouble, BullishReversal, 2,
        "Two consecutive bars supported at the same low."),
    meta!(ids::DARK_CLOUD_COVER, "Dark Cloud Cover", "乌云盖顶", CandlestickDouble, BearishReversal, 2,
        "Gap up above a white bar, then a close deep into its body."),
    meta!(ids::PIERCING_LINE, "Piercing Line", "刺透形态", CandlestickDouble, BullishReversal, 2,
        "Gap down below a black bar, then a close above its midpoint."),
    meta!(ids::MORNING_STAR, "Morning Star", "启明星", CandlestickTriple, BullishReversal, 3,
        "Long black bar, small gapped star, long white bar recovering the first body."),
    meta!(ids::EVENING_STAR, "Evening Star", "黄昏星", CandlestickTriple, BearishReversal, 3,
        "Long white bar, small gapped star, long black bar erasing the first body."),
    meta!(ids::THREE_WHITE_SOLDIERS, "Three White Soldiers", "红三兵", CandlestickTriple, BullishReversal, 3,
        "Three long white bars, each opening inside the prior body and closing higher."),
    meta!(ids::THREE_BLACK_CROWS, "Three Black Crows", "三只乌鸦", CandlestickTriple, BearishReversal, 3,
        "Three long black bars, each opening inside the prior body and closing lower."),
    meta!(ids::HEAD_AND_SHOULDERS, "Head and Shoulders", "头肩顶", ChartReversal, BearishReversal, 40,
        "Three peaks with the middle one highest, resting on a common neckline."),
    meta!(ids::INVERSE_HEAD_AND_SHOULDERS, "Inverse Head and Shoulders", "头肩底", ChartReversal, BullishReversal, 40,
        "Three troughs with the middle one lowest, capped by a common neckline."),
    meta!(ids::DOUBLE_TOP, "Double Top", "双重顶", ChartReversal, BearishReversal, 30,
        "Two peaks at the same level separated by a trough that forms the neckline."),
    meta!(ids::DOUBLE_BOTTOM, "Double Bottom", "双重底", ChartReversal, BullishReversal, 30,
        "Two troughs at the same level separated by a peak that forms the neckline."),
];

// ============================================================
// LOOKUP
// ============================================================

/// Every registered pattern, in identifier order.
#[inline]
pub fn all() -> &'static [PatternMetadata] {
    REGISTRY
}

pub fn lookup(id: PatternId) -> Option<&'static PatternMetadata> {
    lookup_str(id.as_str())
}

pub fn lookup_str(id: &str) -> Option<&'static PatternMetadata> {
    REGISTRY.iter().find(|m| m.id.as_str() == id)
}

/// Like [`lookup`] but unknown identifiers are an error.
pub fn require(id: PatternId) -> Result<&'static PatternMetadata> {
    lookup(id).ok_or_else(|| PatternError::UnknownPattern(id.as_str().to_string()))
}

pub fn by_category(category: PatternCategory) -> impl Iterator<Item = &'static PatternMetadata> {
    REGISTRY.iter().filter(move |m| m.category == category)
}

// ============================================================
// TESTS
// ============================================================
