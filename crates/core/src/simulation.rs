//! Simulated progress for the workflow stages.
//!
//! A [`ProgressRamp`] is the pure bounded counter; a [`PeriodicTask`] is the
//! timer that feeds it ticks when running inside a tokio runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const PROGRESS_COMPLETE: u8 = 100;

/// Longest tick interval a profile may use, in milliseconds.
pub const MAX_INTERVAL_MS: u64 = 60_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    SchemaDetection,
    Validation,
    Extraction,
}

impl SimulationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaDetection => "schema_detection",
            Self::Validation => "validation",
            Self::Extraction => "extraction",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressProfile {
    pub increment: u8,
    pub interval_ms: u64,
}

impl ProgressProfile {
    pub const SCHEMA_DETECTION: Self = Self { increment: 10, interval_ms: 200 };
    pub const VALIDATION: Self = Self { increment: 15, interval_ms: 150 };
    pub const EXTRACTION: Self = Self { increment: 8, interval_ms: 180 };

    /// Tick interval clamped to `1..=MAX_INTERVAL_MS`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.clamp(1, MAX_INTERVAL_MS))
    }

    /// Ticks needed to go from 0 to 100.
    pub fn ticks_to_complete(&self) -> u32 {
        let increment = u32::from(self.increment.max(1));
        u32::from(PROGRESS_COMPLETE).div_ceil(increment)
    }

    pub fn total_duration(&self) -> Duration {
        self.interval() * self.ticks_to_complete()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationProfiles {
    pub schema_detection: ProgressProfile,
    pub validation: ProgressProfile,
    pub extraction: ProgressProfile,
}

impl SimulationProfiles {
    pub fn for_kind(&self, kind: SimulationKind) -> ProgressProfile {
        match kind {
            SimulationKind::SchemaDetection => self.schema_detection,
            SimulationKind::Validation => self.validation,
            SimulationKind::Extraction => self.extraction,
        }
    }
}

impl Default for SimulationProfiles {
    fn default() -> Self {
        Self {
            schema_detection: ProgressProfile::SCHEMA_DETECTION,
            validation: ProgressProfile::VALIDATION,
            extraction: ProgressProfile::EXTRACTION,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RampStep {
    Advanced(u8),
    Finished,
}

/// Fixed-increment counter clamped to 100.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressRamp {
    percent: u8,
    increment: u8,
}

impl ProgressRamp {
    pub fn new(increment: u8) -> Self {
        Self { percent: 0, increment: increment.max(1) }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn is_finished(&self) -> bool {
        self.percent >= PROGRESS_COMPLETE
    }

    pub fn advance(&mut self) -> RampStep {
        if self.is_finished() {
            return RampStep::Finished;
        }

        let next = self.percent.saturating_add(self.increment);
        if next >= PROGRESS_COMPLETE {
            self.percent = PROGRESS_COMPLETE;
            RampStep::Finished
        } else {
            self.percent = next;
            RampStep::Advanced(next)
        }
    }
}

/// Handle to a periodic tokio task. The task stops when the callback returns
/// `false` or when the handle drops.
#[derive(Debug)]
pub struct PeriodicTask {
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// The first tick fires one full `period` after spawning.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period =
            period.clamp(Duration::from_millis(1), Duration::from_millis(MAX_INTERVAL_MS));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Handle to a one-shot delayed tokio task, aborted when dropped.
#[derive(Debug)]
pub struct DelayedTask {
    handle: JoinHandle<()>,
}

impl DelayedTask {
    pub fn spawn<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        Self { handle }
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
