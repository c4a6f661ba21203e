//! Error taxonomy.
//!
//! Every error is handled where it occurs and logged; only [`LoadError`]
//! (and bad settings) stop the process.

use std::io;
use std::path::PathBuf;

use sigwire::{SignalKind, SignalValue};
use thiserror::Error;

/// Schedule or address table could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("node table has {node_rows} rows but address table has {address_rows}")]
    RowCountMismatch {
        node_rows: usize,
        address_rows: usize,
    },
}

/// Outbound dial to a target failed. The target is skipped for the run.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {address} timed out after {timeout_ms}ms")]
    TimedOut { address: String, timeout_ms: u64 },
    #[error("connect to {address} failed: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A signal could not be handed to, or written by, a signaler.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("signaler for {address} is closed; dropping {value}")]
    SignalerClosed { address: String, value: SignalValue },
    #[error("signaler for {address} carries {expected:?} signals, refusing {value}")]
    WrongKind {
        address: String,
        expected: SignalKind,
        value: SignalValue,
    },
    #[error("write of {value} to {address} failed: {source}")]
    Write {
        address: String,
        value: SignalValue,
        #[source]
        source: io::Error,
    },
}

/// An inbound connection delivered something the listener can't act on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read from {peer} failed: {source}")]
    Io {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("{role} listener expects {expected:?} signals, got {value}")]
    UnexpectedKind {
        role: &'static str,
        expected: SignalKind,
        value: SignalValue,
    },
    #[error("duration {seconds}s is out of range")]
    DurationOutOfRange { seconds: f64 },
}

/// Launch or terminate of a local workload failed.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{0}")]
    Rejected(String),
}

/// Settings file could not be used.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fatal errors surfaced by the role entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}
