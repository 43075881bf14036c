use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::session::{Direction, TransferSession};

/// Default sliding window for speed estimates.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

// ---------------------------------------------------------------------------
// TransferProgress
// ---------------------------------------------------------------------------

/// Snapshot of a transfer, reported after every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub direction: Direction,
    pub name: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub chunks_transferred: u32,
    pub total_chunks: u32,
    /// `bytes_transferred / total_bytes`, capped at 1.0.
    pub fraction: f64,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

impl TransferProgress {
    pub fn new(direction: Direction, session: &TransferSession, speed: &SpeedCalculator) -> Self {
        Self {
            direction,
            name: session.metadata.name.clone(),
            bytes_transferred: session.bytes_transferred,
            total_bytes: session.metadata.size,
            chunks_transferred: session.chunks_transferred,
            total_chunks: session.metadata.total_chunks,
            fraction: session.progress(),
            bytes_per_second: speed.bytes_per_second(),
            eta: speed.eta(session.remaining_bytes()),
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            window_size: window_size.unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `bytes` transferred now.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    pub fn add_sample_at(&mut self, bytes: u64, timestamp: Instant) {
        self.samples.push_back(SpeedSample { bytes, timestamp });

        if let Some(cutoff) = timestamp.checked_sub(self.window_size) {
            while self
                .samples
                .front()
                .is_some_and(|sample| sample.timestamp < cutoff)
            {
                self.samples.pop_front();
            }
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample marks the start of the window.
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining_bytes` at the current speed.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sendit_protocol::TransferMetadata;

    #[test]
    fn no_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn single_sample() {
        let mut calc = SpeedCalculator::default();
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_rate() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        let start = Instant::now();
        calc.add_sample_at(1000, start);
        calc.add_sample_at(1000, start + Duration::from_secs(1));
        calc.add_sample_at(1000, start + Duration::from_secs(2));

        assert!((calc.bytes_per_second() - 1000.0).abs() < 1e-6);
        assert_eq!(calc.eta(5000), Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn old_samples_leave_the_window() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(2)), None);
        let start = Instant::now();
        calc.add_sample_at(1_000_000, start);
        calc.add_sample_at(10, start + Duration::from_secs(5));
        calc.add_sample_at(10, start + Duration::from_secs(6));

        assert!((calc.bytes_per_second() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn max_samples() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.samples.len() <= 5);
    }

    #[test]
    fn reset_clears_samples() {
        let mut calc = SpeedCalculator::default();
        calc.add_sample(100);
        calc.add_sample(200);
        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn progress_snapshot() {
        let meta = TransferMetadata::new("a.txt", 50_000, "text/plain", 16_384).unwrap();
        let mut session = TransferSession::new(meta);
        session.record_chunk(16_384);
        let progress =
            TransferProgress::new(Direction::Outbound, &session, &SpeedCalculator::default());

        assert_eq!(progress.name, "a.txt");
        assert_eq!(progress.chunks_transferred, 1);
        assert_eq!(progress.total_chunks, 4);
        assert!((progress.percent() - 32.768).abs() < 1e-9);
        assert!(progress.eta.is_none());
    }
}
