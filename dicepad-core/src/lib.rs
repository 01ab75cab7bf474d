//! # dicepad-core
//!
//! The playback engine: a synchronous `Sequencer` that turns the bank's
//! grid into trigger commands, a scheduler thread that drives it on a
//! tempo clock, and the `SchedulerHandle` callers talk to.

pub mod config;
pub mod feedback;
pub mod handle;
mod scheduler;
pub mod sequencer;
pub mod sink;
pub mod telemetry;

pub use config::{Config, ConfigError, EngineConfig};
pub use feedback::SequencerFeedback;
pub use handle::SchedulerHandle;
pub use sequencer::{HitError, Sequencer, TickReport, TransportState};
pub use sink::{ChannelSink, FilterParams, NullSink, TestSink, TriggerCommand, TriggerSink};
pub use telemetry::TelemetrySummary;
