//! Detected-pattern output record

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::registry::{PatternBias, PatternCategory, PatternMetadata};
use crate::{Direction, PatternId};

/// Lifecycle of a detected formation. Detectors currently only emit `Confirmed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    Forming,
    #[default]
    Confirmed,
    Completed,
    Failed,
    Invalidated,
}

/// One classified formation.
///
/// Names, category and bias are resolved from the registry at construction time.
/// `strength` and `confidence` are 0..=100 heuristic scores, not probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPattern {
    pub pattern_id: PatternId,
    pub name: &'static str,
    pub localized_name: &'static str,
    pub category: PatternCategory,
    pub bias: PatternBias,
    pub status: PatternStatus,
    pub strength: u8,
    pub confidence: u8,
    /// Date of the last bar the detector looked at
    pub detection_date: NaiveDate,
    /// Dates of the bars (or pivots) that make up the formation, oldest first
    pub involved_dates: Vec<NaiveDate>,
    pub start_index: usize,
    pub end_index: usize,
    pub pattern_low: Decimal,
    pub pattern_high: Decimal,
    pub neckline: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Pattern-specific diagnostics such as `penetration_ratio`
    pub details: BTreeMap<&'static str, f64>,
    pub description: String,
}

impl DetectedPattern {
    #[inline]
    pub fn direction(&self) -> Direction {
        self.bias.direction()
    }

    #[inline]
    pub fn detail(&self, key: &str) -> Option<f64> {
        self.details.get(key).copied()
    }
}

/// Fields a detector fills in before the registry resolves the rest.
#[derive(Debug, Clone)]
pub struct PatternDraft {
    pub strength: u8,
    pub detection_date: NaiveDate,
    pub involved_dates: Vec<NaiveDate>,
    pub start_index: usize,
    pub end_index: usize,
    pub pattern_low: Decimal,
    pub pattern_high: Decimal,
    pub neckline: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub details: BTreeMap<&'static str, f64>,
}

impl PatternDraft {
    pub fn detail(mut self, key: &'static str, value: f64) -> Self {
        self.details.insert(key, value);
        self
    }

    pub fn neckline(mut self, level: Decimal) -> Self {
        self.neckline = Some(level);
        self
    }

    pub fn levels(mut self, target: Option<Decimal>, stop: Option<Decimal>) -> Self {
        self.target_price = target;
        self.stop_loss = stop;
        self
    }

    /// Resolve against registry metadata into the final record.
    pub fn finish(self, meta: &PatternMetadata) -> DetectedPattern {
        let description = format!(
            "{} on {}: {}",
            meta.name, self.detection_date, meta.description
        );
        DetectedPattern {
            pattern_id: meta.id,
            name: meta.name,
            localized_name: meta.localized_name,
            category: meta.category,
            bias: meta.bias,
            status: PatternStatus::Confirmed,
            strength: self.strength,
            confidence: self.strength,
            detection_date: self.detection_date,
            involved_dates: self.involved_dates,
            start_index: self.start_index,
            end_index: self.end_index,
            pattern_low: self.pattern_low,
            pattern_high: self.pattern_high,
            neckline: self.neckline,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            details: self.details,
            description,
        }
    }
}
