//! Point-to-point signal framing shared by the controller, captains and clients.
//!
//! A frame carries one scalar: either a duration (captains) or a +1/-1
//! command (clients). See [`types::SignalKind`].

pub mod channel;
pub mod protocol;
pub mod types;

pub use channel::{connect, read_signal, write_signal};
pub use protocol::{encode, expect_kind, parse};
pub use types::{Command, SignalKind, SignalValue};
