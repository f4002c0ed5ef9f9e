//! Daily bar model and the price-series input contract.
//!
//! [`CandleStick`] is the concrete bar every detector in this crate can consume. It is
//! built either directly or from a [`PriceSeries`], the column-oriented shape in which
//! price providers hand over one instrument's history.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OHLCVExt, PatternError, Result, OHLCV};

// ============================================================
// CANDLESTICK
// ============================================================

/// One trading day of OHLCV data.
///
/// Invariant: `low <= min(open, close) <= max(open, close) <= high`, checked by
/// [`CandleStick::new`]. Fields are private so a constructed bar cannot be mutated into
/// an invalid state; deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CandleStickRow")]
pub struct CandleStick {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
}

impl CandleStick {
    /// Create a validated bar.
    pub fn new(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Result<Self> {
        let bar = Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }
}

#[derive(Deserialize)]
struct CandleStickRow {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
}

impl TryFrom<CandleStickRow> for CandleStick {
    type Error = PatternError;

    fn try_from(row: CandleStickRow) -> Result<Self> {
        Self::new(row.date, row.open, row.high, row.low, row.close, row.volume)
    }
}

impl OHLCV for CandleStick {
    #[inline]
    fn date(&self) -> NaiveDate {
        self.date
    }

    #[inline]
    fn open(&self) -> Decimal {
        self.open
    }

    #[inline]
    fn high(&self) -> Decimal {
        self.high
    }

    #[inline]
    fn low(&self) -> Decimal {
        self.low
    }

    #[inline]
    fn close(&self) -> Decimal {
        self.close
    }

    #[inline]
    fn volume(&self) -> u64 {
        self.volume
    }
}

// ============================================================
// PRICE SERIES
// ============================================================

/// Column-oriented daily history for a single instrument, ascending by date.
///
/// Gaps between trading dates are not checked here; that is the provider's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub open: Vec<Decimal>,
    pub high: Vec<Decimal>,
    pub low: Vec<Decimal>,
    pub close: Vec<Decimal>,
    pub volume: Vec<u64>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Append one row to every column.
    pub fn push(
        &mut self,
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) {
        self.dates.push(date);
        self.open.push(open);
        self.high.push(high);
        self.low.push(low);
        self.close.push(close);
        self.volume.push(volume);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Convert the columns into validated bars.
    ///
    /// Fails with [`PatternError::LengthMismatch`] when a column disagrees with `dates`,
    /// or [`PatternError::InvalidCandle`] naming the first offending row.
    pub fn candles(&self) -> Result<Vec<CandleStick>> {
        let expected = self.dates.len();
        let columns = [
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("close", self.close.len()),
            ("volume", self.volume.len()),
        ];
        for (field, got) in columns {
            if got != expected {
                return Err(PatternError::LengthMismatch {
                    field,
                    expected,
                    got,
                });
            }
        }

        (0..expected)
            .map(|i| {
                CandleStick::new(
                    self.dates[i],
                    self.open[i],
                    self.high[i],
                    self.low[i],
                    self.close[i],
                    self.volume[i],
                )
                .map_err(|e| e.at_index(i))
            })
            .collect()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_candle_geometry() {
        let bar = CandleStick::new(day(1), dec!(100), dec!(110), dec!(90), dec!(105), 1_000).unwrap();
        assert_eq!(bar.body(), dec!(5));
        assert_eq!(bar.range(), dec!(20));
        assert_eq!(bar.upper_shadow(), dec!(5));
        assert_eq!(bar.lower_shadow(), dec!(10));
        assert!(bar.is_bullish());
        assert!((bar.body_ratio().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_candle_rejects_inverted_range() {
        let err = CandleStick::new(day(1), dec!(100), dec!(90), dec!(110), dec!(100), 0);
        assert!(matches!(err, Err(PatternError::InvalidCandle { .. })));
    }

    #[test]
    fn test_candle_rejects_close_above_high() {
        let err = CandleStick::new(day(1), dec!(100), dec!(105), dec!(95), dec!(106), 0);
        assert!(err.is_err());
    }

    #[test]
    fn test_flat_bar_has_no_ratios() {
        let bar = CandleStick::new(day(1), dec!(50), dec!(50), dec!(50), dec!(50), 10).unwrap();
        assert_eq!(bar.range(), Decimal::ZERO);
        assert!(bar.body_ratio().is_none());
        assert!(bar.upper_shadow_ratio().is_none());
    }

    #[test]
    fn test_series_to_candles() {
        let mut series = PriceSeries::new("600519");
        series.push(day(1), dec!(10), dec!(11), dec!(9), dec!(10.5), 500);
        series.push(day(4), dec!(10.5), dec!(12), dec!(10), dec!(11.8), 700);

        let candles = series.candles().unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].date(), day(4));
        assert_eq!(candles[1].volume(), 700);
    }

    #[test]
    fn test_series_length_mismatch() {
        let mut series = PriceSeries::new("X");
        series.push(day(1), dec!(10), dec!(11), dec!(9), dec!(10.5), 500);
        series.volume.push(1);

        match series.candles() {
            Err(PatternError::LengthMismatch { field, expected, got }) => {
                assert_eq!(field, "volume");
                assert_eq!(expected, 1);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_series_reports_bad_row() {
        let mut series = PriceSeries::new("X");
        series.push(day(1), dec!(10), dec!(11), dec!(9), dec!(10.5), 500);
        series.push(day(2), dec!(10), dec!(9), dec!(11), dec!(10.5), 500);

        match series.candles() {
            Err(PatternError::InvalidCandle { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
