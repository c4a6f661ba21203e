//! Timed start/stop signalling for multi-node device simulation runs.
//!
//! A controller reads a static schedule and, at each entry's fire time,
//! sends a duration signal to that entry's captain. Captains launch their
//! workload and stop it when the duration runs out or a stop arrives.
//! A separate client fleet gets a plain start at one offset and a stop
//! after a fixed duration.

pub mod controller;
pub mod error;
pub mod listener;
pub mod logging;
pub mod mock;
pub mod roles;
pub mod schedule;
pub mod settings;
pub mod signaler;
pub mod workload;

pub use error::Error;
