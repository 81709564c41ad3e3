//! Live PCM fan-out for one stream

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{AnalyserOptions, AnalyserTap};
use crate::analysis::fft::{FrequencyAnalyser, MAX_FFT_SIZE};
use crate::error::PlatformError;

/// Mono samples kept for analyser taps
pub const WINDOW_CAPACITY: usize = MAX_FFT_SIZE;

struct HubState {
    window: VecDeque<f32>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<f32>>>,
    closed: bool,
}

/// Fans interleaved f32 PCM out to a mono analysis window and to any
/// number of encoder subscriptions.
pub struct PcmHub {
    sample_rate: u32,
    channels: u16,
    state: Mutex<HubState>,
}

impl PcmHub {
    pub fn new(sample_rate: u32, channels: u16) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            channels: channels.max(1),
            state: Mutex::new(HubState {
                window: VecDeque::with_capacity(WINDOW_CAPACITY),
                subscribers: Vec::new(),
                closed: false,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Publish one block of interleaved samples
    pub fn push(&self, interleaved: &[f32]) {
        let mut state = self.state.lock();
        if state.closed || interleaved.is_empty() {
            return;
        }

        let channels = self.channels as usize;
        for frame in interleaved.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            state.window.push_back(mono);
        }
        let excess = state.window.len().saturating_sub(WINDOW_CAPACITY);
        state.window.drain(..excess);

        state
            .subscribers
            .retain(|tx| tx.send(interleaved.to_vec()).is_ok());
    }

    /// Copy the most recent `len` mono samples into `out` (oldest first)
    pub fn copy_recent(&self, len: usize, out: &mut Vec<f32>) {
        let state = self.state.lock();
        out.clear();
        let skip = state.window.len().saturating_sub(len);
        out.extend(state.window.iter().skip(skip));
    }

    /// Receive every block pushed from now on.
    ///
    /// On a closed hub the receiver is already finished.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<f32>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// End every subscription and drop buffered audio
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
        state.window.clear();
    }
}

/// Analyser tap that runs the FFT over the hub's mono window
pub struct PcmAnalyserTap {
    hub: Arc<PcmHub>,
    analyser: FrequencyAnalyser,
    history: Vec<f32>,
    connected: bool,
}

impl PcmAnalyserTap {
    pub fn new(hub: Arc<PcmHub>, options: AnalyserOptions) -> Result<Self, PlatformError> {
        let analyser = FrequencyAnalyser::new(options)?;
        Ok(Self {
            history: Vec::with_capacity(analyser.fft_size()),
            hub,
            analyser,
            connected: true,
        })
    }
}

impl AnalyserTap for PcmAnalyserTap {
    fn frequency_bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        if !self.connected {
            out.iter_mut().for_each(|v| *v = 0);
            return;
        }
        self.hub
            .copy_recent(self.analyser.fft_size(), &mut self.history);
        self.analyser.byte_frequency_data(&self.history, out);
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
