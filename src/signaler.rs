//! Outbound signal delivery, one task and one connection per target.
//!
//! `NodeSignaler::spawn` dials the target in the background and returns a
//! handle immediately. Values handed to the handle are queued on the
//! target's own channel and written in order once the connection is up.
//! Delivery is at-most-once: no acknowledgment is read back and nothing is
//! retried. If the dial or a write fails the task exits, and every later
//! `deliver` on that handle reports `SignalerClosed`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use sigwire::{SignalKind, SignalValue};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{ConnectError, DeliveryError};

/// Where the scheduler sends signals.
pub trait SignalSink: Send + Sync {
    /// The target this sink delivers to.
    fn target(&self) -> &str;

    /// Hand off a value. Must not block on the network.
    fn deliver(&self, value: SignalValue) -> Result<(), DeliveryError>;
}

/// Handle to a running signaler task.
#[derive(Debug, Clone)]
pub struct SignalerHandle {
    address: Arc<str>,
    kind: SignalKind,
    tx: mpsc::UnboundedSender<SignalValue>,
}

impl SignalerHandle {
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// True once the signaler task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SignalSink for SignalerHandle {
    fn target(&self) -> &str {
        &self.address
    }

    fn deliver(&self, value: SignalValue) -> Result<(), DeliveryError> {
        if sigwire::expect_kind(value, self.kind).is_err() {
            return Err(DeliveryError::WrongKind {
                address: self.address.to_string(),
                expected: self.kind,
                value,
            });
        }
        self.tx
            .send(value)
            .map_err(|e| DeliveryError::SignalerClosed {
                address: self.address.to_string(),
                value: e.0,
            })
    }
}

pub struct NodeSignaler;

impl NodeSignaler {
    /// Spawn the signaler task for `address`. Must be called inside a tokio
    /// runtime.
    pub fn spawn(
        address: impl Into<String>,
        kind: SignalKind,
        connect_timeout: Duration,
    ) -> SignalerHandle {
        let address: Arc<str> = Arc::from(address.into());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_signaler(address.clone(), connect_timeout, rx));
        SignalerHandle { address, kind, tx }
    }
}

/// Dial `address` within `connect_timeout`.
pub async fn connect(address: &str, connect_timeout: Duration) -> Result<TcpStream, ConnectError> {
    sigwire::connect(address, connect_timeout)
        .await
        .map_err(|source| connect_error(address, connect_timeout, source))
}

fn connect_error(address: &str, connect_timeout: Duration, source: io::Error) -> ConnectError {
    match source.kind() {
        io::ErrorKind::TimedOut => ConnectError::TimedOut {
            address: address.to_string(),
            timeout_ms: connect_timeout.as_millis() as u64,
        },
        _ => ConnectError::Io {
            address: address.to_string(),
            source,
        },
    }
}

async fn run_signaler(
    address: Arc<str>,
    connect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<SignalValue>,
) {
    let mut stream = match connect(&address, connect_timeout).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("[signaler] {e}; skipping this target for the rest of the run");
            rx.close();
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                log::warn!("[signaler] dropped {dropped} queued signal(s) for {address}");
            }
            return;
        }
    };
    log::info!("[signaler] connected to {address}");

    while let Some(value) = rx.recv().await {
        if let Err(source) = sigwire::write_signal(&mut stream, value).await {
            let e = DeliveryError::Write {
                address: address.to_string(),
                value,
                source,
            };
            log::error!("[signaler] {e}; signaler for {address} is now dead");
            return;
        }
        log::debug!("[signaler] wrote {value} to {address}");
    }
    log::debug!("[signaler] all handles for {address} dropped, closing");
}

/// One signaler per distinct address, sharing a signal kind.
#[derive(Debug, Clone, Default)]
pub struct SignalerPool {
    order: Vec<String>,
    handles: HashMap<String, SignalerHandle>,
}

impl SignalerPool {
    /// Spawn a signaler for each distinct address.
    pub fn spawn<I, S>(addresses: I, kind: SignalKind, connect_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool = Self::default();
        for address in addresses {
            let address = address.into();
            if pool.handles.contains_key(&address) {
                continue;
            }
            let handle = NodeSignaler::spawn(address.clone(), kind, connect_timeout);
            pool.order.push(address.clone());
            pool.handles.insert(address, handle);
        }
        pool
    }

    pub fn get(&self, address: &str) -> Option<&SignalerHandle> {
        self.handles.get(address)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in the order their addresses were first seen.
    pub fn handles(&self) -> impl Iterator<Item = &SignalerHandle> {
        self.order.iter().filter_map(|a| self.handles.get(a))
    }

    /// Handles as shared sinks, in first-seen order.
    pub fn sinks(&self) -> Vec<Arc<dyn SignalSink>> {
        self.handles()
            .map(|h| Arc::new(h.clone()) as Arc<dyn SignalSink>)
            .collect()
    }

    /// Deliver `value` to every target. Returns how many accepted it.
    pub fn broadcast(&self, value: SignalValue) -> usize {
        let mut accepted = 0;
        for handle in self.handles() {
            match handle.deliver(value) {
                Ok(()) => accepted += 1,
                Err(e) => log::warn!("[signaler] {e}"),
            }
        }
        accepted
    }
}
