//! Progress reporting for the amplitude blocks of a sweep.
//!
//! With the `progress` feature, [`BlockProgress`] draws an `indicatif` bar with one step per
//! `(kernel, amplitude)` block and shows the last and smoothed block durations. Without the
//! feature every call is a no-op, so the sweep code is identical in both builds.
//!
//! The smoothed duration is an exponential moving average: `ema ← α·dt + (1–α)·ema`.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Exponential moving average of the time between ticks.
#[derive(Debug, Clone)]
pub struct BlockTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl BlockTimer {
    pub fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    /// Duration since the previous tick (or since creation).
    #[inline]
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    #[inline]
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

/// Format a duration as `"253µs"`, `"42ms"` or `"3.14s"`.
pub fn fmt_dur(d: Duration) -> String {
    if d.as_micros() < 1_000 {
        format!("{}µs", d.as_micros())
    } else if d.as_millis() < 1_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}

pub struct BlockProgress {
    timer: BlockTimer,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl BlockProgress {
    pub fn new(total_blocks: usize) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let bar = ProgressBar::new((total_blocks as u64).max(1));
            let style = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} blocks ({percent:>3}%) | ETA {eta_precise} | {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        };
        #[cfg(not(feature = "progress"))]
        let _ = total_blocks;

        BlockProgress {
            timer: BlockTimer::new(0.2),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Mark one block as done; returns its duration.
    pub fn block_done(&mut self, label: &str) -> Duration {
        let last = self.timer.tick();
        #[cfg(feature = "progress")]
        {
            self.bar.set_message(format!(
                "{label} | last: {}, avg: {}",
                fmt_dur(last),
                fmt_dur(self.timer.avg())
            ));
            self.bar.inc(1);
        }
        #[cfg(not(feature = "progress"))]
        let _ = label;
        last
    }

    pub fn avg(&self) -> Duration {
        self.timer.avg()
    }

    pub fn finish(&self) {
        #[cfg(feature = "progress")]
        {
            self.bar.disable_steady_tick();
            self.bar.finish_and_clear();
        }
    }
}
