//! Time as a replayable side effect.
//!
//! Durable workflow execution requires every observation of wall-clock time
//! to be deterministic on replay. This crate provides the [`Clock`]
//! abstraction `jobflow-engine` uses for that: [`SystemClock`] for live
//! executions and [`ReplayClock`] for recovery, plus [`TimerWheel`] to
//! reconstruct outstanding durable timers from a journal after a restart.

mod clock;
mod timer_wheel;

pub use clock::{Clock, ReplayClock, SystemClock};
pub use timer_wheel::{PendingTimer, TimerWheel};
