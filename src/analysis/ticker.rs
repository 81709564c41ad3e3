use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::analyzer::{LevelAnalyzer, LevelSample};

/// Receives every sample the loop produces
pub type LevelCallback = Arc<dyn Fn(&LevelSample) + Send + Sync + 'static>;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Default)]
struct Gate {
    active: bool,
    latest: Option<LevelSample>,
    ticks: u64,
}

/// Periodic driver for a [`LevelAnalyzer`].
///
/// Delivery and cancellation share one lock, so once `cancel` returns no
/// further sample reaches the callback.
pub struct AnalysisLoop {
    gate: Arc<Mutex<Gate>>,
    handle: Option<JoinHandle<LevelAnalyzer>>,
}

impl AnalysisLoop {
    pub fn spawn(analyzer: LevelAnalyzer, interval: Duration, on_sample: LevelCallback) -> Self {
        let gate = Arc::new(Mutex::new(Gate {
            active: true,
            ..Gate::default()
        }));

        let task_gate = gate.clone();
        let handle = tokio::spawn(async move {
            let mut analyzer = analyzer;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let delivered = {
                    let mut gate = task_gate.lock();
                    if gate.active {
                        let sample = analyzer.tick();
                        on_sample(&sample);
                        gate.ticks += 1;
                        gate.latest = Some(sample);
                    }
                    gate.active
                };
                if !delivered {
                    break;
                }
            }

            analyzer
        });

        debug!("Analysis loop started ({:?} interval)", interval);

        Self {
            gate,
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate.lock().active
    }

    pub fn latest(&self) -> Option<LevelSample> {
        self.gate.lock().latest.clone()
    }

    /// Last volume, or 0 once cancelled
    pub fn latest_volume(&self) -> u8 {
        let gate = self.gate.lock();
        if !gate.active {
            return 0;
        }
        gate.latest.as_ref().map(|s| s.volume_percent).unwrap_or(0)
    }

    pub fn ticks(&self) -> u64 {
        self.gate.lock().ticks
    }

    /// Stop delivering samples. Takes effect before returning.
    pub fn cancel(&self) {
        let mut gate = self.gate.lock();
        if gate.active {
            gate.active = false;
            debug!("Analysis loop cancelled after {} ticks", gate.ticks);
        }
    }

    /// Cancel, wait for the task to exit and detach its analyzer.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(mut analyzer) => analyzer.detach(),
                Err(err) => warn!("Analysis task ended abnormally: {}", err),
            }
        }
    }
}

impl Drop for AnalysisLoop {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::platform::AnalyserTap;

    struct RampTap {
        level: u8,
        disconnected: Arc<AtomicUsize>,
    }

    impl AnalyserTap for RampTap {
        fn frequency_bin_count(&self) -> usize {
            32
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) {
            self.level = self.level.saturating_add(51);
            out.iter_mut().for_each(|v| *v = self.level);
        }

        fn disconnect(&mut self) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn analyzer(disconnected: Arc<AtomicUsize>) -> LevelAnalyzer {
        LevelAnalyzer::with_tap(
            Box::new(RampTap {
                level: 0,
                disconnected,
            }),
            4,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_until_cancelled() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let disconnected = Arc::new(AtomicUsize::new(0));

        let counter = delivered.clone();
        let ticker = AnalysisLoop::spawn(
            analyzer(disconnected.clone()),
            DEFAULT_TICK_INTERVAL,
            Arc::new(move |_: &LevelSample| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ticker.is_active());
        assert!(ticker.ticks() >= 5);
        assert!(ticker.latest_volume() > 0);

        ticker.cancel();
        let seen = delivered.load(Ordering::SeqCst);
        assert_eq!(ticker.latest_volume(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), seen);

        ticker.stop().await;
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_tracks_last_sample() {
        let ticker = AnalysisLoop::spawn(
            analyzer(Arc::new(AtomicUsize::new(0))),
            Duration::from_millis(10),
            Arc::new(|_: &LevelSample| {}),
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        let latest = ticker.latest().unwrap();
        assert_eq!(latest.spectrum_buckets.len(), 4);
        assert_eq!(latest.volume_percent, ticker.latest_volume());

        ticker.stop().await;
    }
}
