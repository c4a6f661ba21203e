/// Marker that opens every signal frame.
pub const SIGNAL_MARKER: &[u8; 2] = b"SG";

/// Marker + tag byte.
pub const HEADER_LEN: usize = 3;

/// Tag byte for a duration frame (payload: f64 BE).
pub const TAG_DURATION: u8 = 0x01;

/// Tag byte for a command frame (payload: i32 BE, +1 or -1).
pub const TAG_COMMAND: u8 = 0x02;

/// Port the worker ("captain") role listens on.
pub const CAPTAIN_PORT: u16 = 8000;

/// Port the client role listens on.
pub const CLIENT_PORT: u16 = 8001;

/// Outbound dial timeout.
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Payload shape carried by a signal frame.
///
/// Each role expects exactly one shape: captains decode `Duration`,
/// clients decode `Command`. Mixing them on one connection is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Duration,
    Command,
}

impl SignalKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::Duration => TAG_DURATION,
            Self::Command => TAG_COMMAND,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_DURATION => Some(Self::Duration),
            TAG_COMMAND => Some(Self::Command),
            _ => None,
        }
    }

    /// Number of payload bytes following the header.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Duration => 8,
            Self::Command => 4,
        }
    }
}

/// Binary start/stop command sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

impl Command {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Start => 1,
            Self::Stop => -1,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(Self::Start),
            -1 => Some(Self::Stop),
            _ => None,
        }
    }
}

/// One scalar signal.
///
/// A positive `Duration` means "start and run for N seconds"; zero or
/// negative means "stop now".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalValue {
    Duration(f64),
    Command(Command),
}

impl SignalValue {
    /// The duration signal the controller uses for an explicit stop.
    pub const STOP_DURATION: SignalValue = SignalValue::Duration(-1.0);

    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Duration(_) => SignalKind::Duration,
            Self::Command(_) => SignalKind::Command,
        }
    }
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duration(d) if *d > 0.0 => write!(f, "duration({d}s)"),
            Self::Duration(d) => write!(f, "stop-duration({d})"),
            Self::Command(Command::Start) => write!(f, "start(+1)"),
            Self::Command(Command::Stop) => write!(f, "stop(-1)"),
        }
    }
}
