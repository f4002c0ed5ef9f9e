//! Pattern detectors
//!
//! # Pattern Categories
//!
//! - **Single-bar (5 detectors)**: Doji family, Hammer / Hanging Man, Inverted Hammer /
//!   Shooting Star, Marubozu, Spinning Top
//! - **Two-bar (5)**: Engulfing, Harami, Tweezer, Dark Cloud Cover, Piercing Line
//! - **Three-bar (4)**: Morning / Evening Star, Three White Soldiers / Three Black Crows
//! - **Chart (2)**: Double Top / Bottom, Head and Shoulders (regular and inverse)

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod chart;
pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

// Re-export all detectors for convenience
pub use chart::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;
