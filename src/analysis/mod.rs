//! Live level and spectrum analysis
//!
//! `LevelAnalyzer` turns a frequency tap into `LevelSample`s; `AnalysisLoop`
//! drives it once per display refresh until cancelled. `FrequencyAnalyser`
//! is the FFT stage PCM-backed platforms use to implement their taps.

mod analyzer;
pub mod fft;
mod ticker;

pub use analyzer::{pick_buckets, volume_percent, LevelAnalyzer, LevelSample};
pub use fft::FrequencyAnalyser;
pub use ticker::{AnalysisLoop, LevelCallback, DEFAULT_TICK_INTERVAL};
