//! FFT stage behind PCM-backed analyser taps
//!
//! Matches the usual analyser-node model: Blackman window, magnitude
//! normalised by the window length, exponential smoothing across frames,
//! then dB mapped linearly onto 0-255 over `[MIN_DB, MAX_DB]`.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::PlatformError;
use crate::platform::AnalyserOptions;

pub const MIN_DB: f32 = -100.0;
pub const MAX_DB: f32 = -30.0;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

const BLACKMAN_ALPHA: f32 = 0.16;

pub struct FrequencyAnalyser {
    fft_size: usize,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl FrequencyAnalyser {
    pub fn new(options: AnalyserOptions) -> Result<Self, PlatformError> {
        let fft_size = options.fft_size;
        if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            return Err(PlatformError::NotSupported(format!(
                "fft size {} must be a power of two in [{}, {}]",
                fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
            )));
        }
        if !(0.0..1.0).contains(&options.smoothing) {
            return Err(PlatformError::NotSupported(format!(
                "smoothing {} must be in [0, 1)",
                options.smoothing
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            smoothing: options.smoothing,
            fft,
            window: blackman(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse the most recent `fft_size` samples of `recent` into `out`.
    ///
    /// A shorter history is zero-padded at the front. `out` may be shorter
    /// or longer than the bin count; extra entries are left untouched.
    pub fn byte_frequency_data(&mut self, recent: &[f32], out: &mut [u8]) {
        let n = self.fft_size;
        let take = recent.len().min(n);
        let pad = n - take;
        let tail = &recent[recent.len() - take..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let tau = self.smoothing;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[bin].norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }

        for (value, smoothed) in out.iter_mut().zip(self.smoothed.iter()) {
            *value = to_byte(*smoothed);
        }
    }
}

fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 / (MAX_DB - MIN_DB) * (db - MIN_DB);
    if !scaled.is_finite() || scaled <= 0.0 {
        0
    } else if scaled >= 255.0 {
        255
    } else {
        scaled as u8
    }
}

fn blackman(n: usize) -> Vec<f32> {
    let a0 = (1.0 - BLACKMAN_ALPHA) / 2.0;
    let a1 = 0.5;
    let a2 = BLACKMAN_ALPHA / 2.0;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
