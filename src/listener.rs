//! Inbound side of a captain or client: accept connections, decode signals,
//! start and stop local workloads.
//!
//! Both roles share one accept loop and one decode loop. The
//! [`SignalInterpreter`] picked at construction decides what a value means:
//! captains read durations and stop themselves when the duration runs out,
//! clients read +1/-1 commands and only ever stop when told to.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sigwire::{Command, SignalKind, SignalValue};
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::DecodeError;
use crate::workload::{WorkloadDescriptor, WorkloadManager};

/// What a decoded signal asks the node to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Start {
        descriptor: WorkloadDescriptor,
        auto_stop: Option<Duration>,
    },
    Stop,
}

#[derive(Debug, Clone)]
pub enum SignalInterpreter {
    /// Captain: positive duration starts and arms an auto-stop, anything
    /// else stops.
    Duration { descriptor: WorkloadDescriptor },
    /// Client: +1 starts, -1 stops.
    Command { descriptor: WorkloadDescriptor },
}

impl SignalInterpreter {
    pub fn captain(descriptor: WorkloadDescriptor) -> Self {
        Self::Duration { descriptor }
    }

    pub fn client(descriptor: WorkloadDescriptor) -> Self {
        Self::Command { descriptor }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Duration { .. } => SignalKind::Duration,
            Self::Command { .. } => SignalKind::Command,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::Duration { .. } => "captain",
            Self::Command { .. } => "client",
        }
    }

    pub fn interpret(&self, value: SignalValue) -> Result<Directive, DecodeError> {
        match (self, value) {
            (Self::Duration { descriptor }, SignalValue::Duration(seconds)) if seconds > 0.0 => {
                let after = Duration::try_from_secs_f64(seconds)
                    .map_err(|_| DecodeError::DurationOutOfRange { seconds })?;
                Ok(Directive::Start {
                    descriptor: descriptor.clone(),
                    auto_stop: Some(after),
                })
            }
            (Self::Duration { .. }, SignalValue::Duration(_)) => Ok(Directive::Stop),
            (Self::Command { descriptor }, SignalValue::Command(Command::Start)) => {
                Ok(Directive::Start {
                    descriptor: descriptor.clone(),
                    auto_stop: None,
                })
            }
            (Self::Command { .. }, SignalValue::Command(Command::Stop)) => Ok(Directive::Stop),
            (_, value) => Err(DecodeError::UnexpectedKind {
                role: self.role(),
                expected: self.kind(),
                value,
            }),
        }
    }
}

/// The pending auto-stop timer, shared by all connections of a listener.
///
/// A start disarms it before launching and re-arms it afterwards; an
/// explicit stop disarms it first, so a stop that beats the timer leaves
/// exactly one `terminate_all` call.
#[derive(Clone, Default)]
struct AutoStop {
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AutoStop {
    async fn arm(&self, after: Duration, workloads: Arc<dyn WorkloadManager>) {
        let mut slot = self.pending.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            log::info!("[listener] auto-stop after {:.3}s", after.as_secs_f64());
            terminate(workloads.as_ref()).await;
        }));
    }

    async fn disarm(&self) {
        if let Some(pending) = self.pending.lock().await.take() {
            pending.abort();
        }
    }
}

async fn terminate(workloads: &dyn WorkloadManager) {
    match workloads.terminate_all().await {
        Ok(()) => log::info!("[listener] workloads removed"),
        Err(e) => log::error!("[listener] terminate failed: {e}"),
    }
}

/// Applies decoded signals to the local workload manager.
#[derive(Clone)]
pub struct SignalResponder {
    interpreter: Arc<SignalInterpreter>,
    workloads: Arc<dyn WorkloadManager>,
    auto_stop: AutoStop,
}

impl SignalResponder {
    pub fn new(interpreter: SignalInterpreter, workloads: Arc<dyn WorkloadManager>) -> Self {
        Self {
            interpreter: Arc::new(interpreter),
            workloads,
            auto_stop: AutoStop::default(),
        }
    }

    pub fn interpreter(&self) -> &SignalInterpreter {
        &self.interpreter
    }

    /// Interpret and act on one value.
    pub async fn respond(&self, value: SignalValue) -> Result<(), DecodeError> {
        match self.interpreter.interpret(value)? {
            Directive::Start {
                descriptor,
                auto_stop,
            } => {
                // An old timer must not fire into the relaunch.
                self.auto_stop.disarm().await;
                match self.workloads.launch(&descriptor).await {
                    Ok(output) if output.is_empty() => log::info!("[listener] workload launched"),
                    Ok(output) => log::info!("[listener] workload launched: {output}"),
                    // The timer is still armed: whatever did start must stop.
                    Err(e) => log::error!("[listener] launch failed: {e}"),
                }
                if let Some(after) = auto_stop {
                    self.auto_stop.arm(after, self.workloads.clone()).await;
                }
            }
            Directive::Stop => {
                self.auto_stop.disarm().await;
                terminate(self.workloads.as_ref()).await;
            }
        }
        Ok(())
    }

    /// Decode and respond to values until the peer hangs up.
    ///
    /// Returns the number of signals handled. A decode error, or a value
    /// of the wrong kind, ends the connection.
    pub async fn handle_connection<R>(
        &self,
        mut reader: R,
        peer: &str,
    ) -> Result<usize, DecodeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut handled = 0;
        loop {
            let value = match sigwire::read_signal(&mut reader).await {
                Ok(Some(value)) => value,
                Ok(None) => return Ok(handled),
                Err(source) => {
                    return Err(DecodeError::Io {
                        peer: peer.to_string(),
                        source,
                    })
                }
            };
            log::info!("[listener] {peer} -> {value}");
            self.respond(value).await?;
            handled += 1;
        }
    }
}

/// Accept loop for one role.
pub struct RoleListener {
    listener: TcpListener,
    responder: SignalResponder,
}

impl RoleListener {
    pub async fn bind(
        address: &str,
        interpreter: SignalInterpreter,
        workloads: Arc<dyn WorkloadManager>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            responder: SignalResponder::new(interpreter, workloads),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self) {
        log::info!(
            "[listener] {} listening on {}",
            self.responder.interpreter().role(),
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into())
        );
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let responder = self.responder.clone();
                    tokio::spawn(async move {
                        let peer = peer.to_string();
                        log::info!("[listener] connection from {peer}");
                        match responder.handle_connection(stream, &peer).await {
                            Ok(n) => log::info!("[listener] {peer} closed after {n} signal(s)"),
                            Err(e) => log::warn!("[listener] dropping {peer}: {e}"),
                        }
                    });
                }
                Err(e) => {
                    log::error!("[listener] accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
