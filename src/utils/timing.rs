use std::time::{Duration, Instant};
use log::{debug, info};

/// Running total for one pipeline stage.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub name: String,
    pub total_time: Duration,
    pub count: u32,
}

impl TimingStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_time: Duration::from_secs(0),
            count: 0,
        }
    }

    pub fn add_measurement(&mut self, duration: Duration) {
        self.total_time += duration;
        self.count += 1;

        debug!("{} - Current: {:.2}ms, Avg: {:.2}ms, Count: {}",
            self.name,
            duration.as_secs_f64() * 1000.0,
            self.average_ms(),
            self.count
        );
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_time.as_secs_f64() * 1000.0) / self.count as f64
        }
    }
}

/// Adds the time between construction and drop to `stats`.
pub struct ScopedTimer<'a> {
    start: Instant,
    stats: &'a mut TimingStats,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(stats: &'a mut TimingStats) -> Self {
        Self {
            start: Instant::now(),
            stats,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.stats.add_measurement(duration);
    }
}

/// Per-stage timings of bundle loads.
#[derive(Debug, Clone)]
pub struct StageTimings {
    pub process: TimingStats,
    pub pack: TimingStats,
    pub upload: TimingStats,
}

impl Default for StageTimings {
    fn default() -> Self {
        Self {
            process: TimingStats::new("detect/crop"),
            pack: TimingStats::new("pack"),
            upload: TimingStats::new("upload"),
        }
    }
}

impl StageTimings {
    pub fn log_summary(&self) {
        for stats in [&self.process, &self.pack, &self.upload] {
            info!("{}: {} run(s), avg {:.2}ms", stats.name, stats.count, stats.average_ms());
        }
    }
}
