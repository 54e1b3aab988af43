//! Runtime for the simulated multi-channel control device.
//!
//! Wires the pure control loops from `sd-controls` into a running device:
//! - one tick thread per channel ([`worker`])
//! - a static verb table and the dispatcher in front of it ([`command`], [`dispatch`])
//! - terminator-delimited framing and the single-client TCP loop ([`framing`], [`connection`])
//! - the [`Device`] that owns all of the above and coordinates shutdown
//!
//! Logging goes through `tracing`; installing a subscriber is left to the
//! binary, which hands a [`VerbosityControl`] to the device so `DEBUG` can
//! adjust it.

pub mod command;
pub mod config;
pub mod connection;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod verbosity;
pub mod worker;

pub use command::{CommandSpec, CommandTable};
pub use config::{ConnectionConfig, DeviceConfig};
pub use connection::{ConnectionManager, LineHandler};
pub use device::Device;
pub use dispatch::{Dispatcher, tokenize};
pub use error::{DeviceError, DeviceResult};
pub use framing::LineFramer;
pub use verbosity::{FixedVerbosity, VerbosityControl, level_from_debug};
pub use worker::ChannelWorker;
