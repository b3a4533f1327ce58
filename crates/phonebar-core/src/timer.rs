//! Restartable elapsed-time counter.
//!
//! Tracks how long the agent has held its current presence state. The
//! periodic tick that consumes it (state tips, auto-ready after work) lives
//! in the session; this type only measures.

use std::time::{Duration, Instant};

/// Elapsed-time counter that restarts on every applied state transition.
#[derive(Debug, Clone)]
pub struct StateTimer {
    started_at: Instant,
}

impl StateTimer {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Reset the counter to zero.
    pub fn restart(&mut self) {
        self.started_at = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }

    /// Humanized `h/m/s` rendering, used in tip notifications.
    pub fn format(&self) -> String {
        Self::format_secs(self.elapsed_secs())
    }

    pub fn format_secs(total: u64) -> String {
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{hours}h {minutes}m {seconds}s")
        } else if minutes > 0 {
            format!("{minutes}m {seconds}s")
        } else {
            format!("{seconds}s")
        }
    }
}

impl Default for StateTimer {
    fn default() -> Self {
        Self::start()
    }
}
