use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PlatformError;
use crate::platform::{AnalyserOptions, AnalyserTap, MediaStream};

/// One analysis tick worth of output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSample {
    /// 0-100
    pub volume_percent: u8,
    /// Display buckets, 0-255 each
    pub spectrum_buckets: Vec<u8>,
}

/// Average byte magnitude as a rounded percentage of full scale.
pub fn volume_percent(snapshot: &[u8]) -> u8 {
    if snapshot.is_empty() {
        return 0;
    }
    let sum: u64 = snapshot.iter().map(|&value| value as u64).sum();
    let mean = sum as f64 / snapshot.len() as f64;
    (100.0 * mean / 255.0).round().clamp(0.0, 100.0) as u8
}

/// Down-sample a raw snapshot by taking every `len / bucket_count`-th value.
///
/// Bucket `i` is `snapshot[i * (len / bucket_count)]`; no averaging.
/// Indices past the end read as 0.
pub fn pick_buckets(snapshot: &[u8], bucket_count: usize) -> Vec<u8> {
    if bucket_count == 0 {
        return Vec::new();
    }
    let step = snapshot.len() / bucket_count;
    (0..bucket_count)
        .map(|i| snapshot.get(i * step).copied().unwrap_or(0))
        .collect()
}

/// Reads frequency snapshots from a tap and reduces them to level samples
pub struct LevelAnalyzer {
    tap: Option<Box<dyn AnalyserTap>>,
    snapshot: Vec<u8>,
    bucket_count: usize,
}

impl LevelAnalyzer {
    /// Create an analysis tap on `stream`
    pub fn attach(
        stream: &dyn MediaStream,
        bucket_count: usize,
        options: AnalyserOptions,
    ) -> Result<Self, PlatformError> {
        let tap = stream.create_analyser(options)?;
        debug!(
            "Analyser attached to {} (fft {}, smoothing {}, {} buckets)",
            stream.id(),
            options.fft_size,
            options.smoothing,
            bucket_count
        );
        Ok(Self::with_tap(tap, bucket_count))
    }

    pub fn with_tap(tap: Box<dyn AnalyserTap>, bucket_count: usize) -> Self {
        let bins = tap.frequency_bin_count();
        Self {
            tap: Some(tap),
            snapshot: vec![0; bins],
            bucket_count,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.tap.is_some()
    }

    /// Pull the current snapshot and compute volume and display buckets.
    ///
    /// A detached analyzer reports silence.
    pub fn tick(&mut self) -> LevelSample {
        match self.tap.as_mut() {
            Some(tap) => tap.byte_frequency_data(&mut self.snapshot),
            None => self.snapshot.iter_mut().for_each(|value| *value = 0),
        }

        LevelSample {
            volume_percent: volume_percent(&self.snapshot),
            spectrum_buckets: pick_buckets(&self.snapshot, self.bucket_count),
        }
    }

    /// Disconnect the tap. Safe to call more than once.
    pub fn detach(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.disconnect();
            debug!("Analyser detached");
        }
    }
}

impl Drop for LevelAnalyzer {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_bounds() {
        assert_eq!(volume_percent(&[0; 1024]), 0);
        assert_eq!(volume_percent(&[255; 1024]), 100);
        assert_eq!(volume_percent(&[]), 0);
    }

    #[test]
    fn volume_rounds_mean() {
        // mean 127.5 -> 50%
        assert_eq!(volume_percent(&[0, 255]), 50);
        // mean 1 -> 0.39% -> 0
        assert_eq!(volume_percent(&[1, 1, 1]), 0);
        // mean 2 -> 0.78% -> 1
        assert_eq!(volume_percent(&[2, 2]), 1);
    }

    #[test]
    fn buckets_are_stride_picked_not_averaged() {
        let snapshot: Vec<u8> = (0..=255).collect();
        let buckets = pick_buckets(&snapshot, 32);

        assert_eq!(buckets.len(), 32);
        for (i, value) in buckets.iter().enumerate() {
            assert_eq!(*value as usize, i * 8);
        }
    }

    #[test]
    fn stride_uses_floor_division() {
        // len 10, 3 buckets -> step 3 -> indices 0, 3, 6
        let snapshot = [10, 11, 12, 13, 14, 15, 16, 17, 18, 19];
        assert_eq!(pick_buckets(&snapshot, 3), vec![10, 13, 16]);
    }

    #[test]
    fn more_buckets_than_bins_repeat_first_bin() {
        assert_eq!(pick_buckets(&[7, 8], 4), vec![7, 7, 7, 7]);
        assert_eq!(pick_buckets(&[], 3), vec![0, 0, 0]);
        assert!(pick_buckets(&[1, 2, 3], 0).is_empty());
    }

    struct ConstTap {
        value: u8,
        bins: usize,
        disconnects: usize,
    }

    impl AnalyserTap for ConstTap {
        fn frequency_bin_count(&self) -> usize {
            self.bins
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) {
            out.iter_mut().for_each(|v| *v = self.value);
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
        }
    }

    #[test]
    fn tick_and_detach() {
        let tap = ConstTap {
            value: 255,
            bins: 64,
            disconnects: 0,
        };
        let mut analyzer = LevelAnalyzer::with_tap(Box::new(tap), 8);

        let sample = analyzer.tick();
        assert_eq!(sample.volume_percent, 100);
        assert_eq!(sample.spectrum_buckets, vec![255; 8]);

        analyzer.detach();
        analyzer.detach();
        assert!(!analyzer.is_attached());

        let sample = analyzer.tick();
        assert_eq!(sample.volume_percent, 0);
        assert_eq!(sample.spectrum_buckets, vec![0; 8]);
    }
}
