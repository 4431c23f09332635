//! Escalator Harness
//!
//! In-process implementation of the `EventChannel` capability and recording
//! helpers shared by the runtime tests and the CLI.

pub mod bus;
pub mod recorder;

pub use bus::{BusStats, LocalEventBus};
pub use recorder::Recorder;
