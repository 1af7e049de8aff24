//! tschnode - TSCH track controller daemon
//!
//! Wires the topology store, track manager, link-state monitor and schedule
//! installer together around a single event pump.

pub mod config;
pub mod logging;
pub mod monitor;
pub mod node;
pub mod schedule;

pub use config::Config;
pub use monitor::LinkStateMonitor;
pub use node::{Controller, InboundEvent};
pub use schedule::{LoggingInstaller, RecordingInstaller, ScheduleInstaller};
