//! Controller: fires scheduled start signals at captains and runs the
//! client start/stop sequence alongside.
//!
//! Lifecycle: `Idle -> Running -> WaitingForTermination -> Terminated`.
//! Dispatch happens on one task in fire-time order; the client sequence
//! runs on its own task. Once every entry has been handed off the
//! controller waits for a shutdown signal. Remote nodes are never told the
//! controller is going away; they stop on their own timers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigwire::{Command, SignalKind, SignalValue};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};

use crate::schedule::{sleep_intervals, ClientAddressList, Schedule};
use crate::settings::ExperimentSettings;
use crate::signaler::{SignalSink, SignalerPool};

/// How dispatch sleeps between entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Sleep the gap since the previous wake. Lateness on one entry shifts
    /// every later entry.
    #[default]
    Relative,
    /// Sleep until `start + fire_time`, so lateness does not accumulate.
    Anchored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Running,
    WaitingForTermination,
    Terminated,
}

/// When the client fleet starts, and for how long it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPlan {
    pub start_offset: Duration,
    pub duration: Duration,
}

impl ClientPlan {
    pub fn from_secs(start_offset: u64, duration: u64) -> Self {
        Self {
            start_offset: Duration::from_secs(start_offset),
            duration: Duration::from_secs(duration),
        }
    }
}

/// One signal the dispatch loop will fire.
#[derive(Clone)]
pub struct ScheduledSignal {
    pub fire_time: u64,
    pub value: SignalValue,
    pub sink: Arc<dyn SignalSink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: bool) {
        if outcome {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Fire `signals` (already sorted by fire time) relative to now.
pub async fn dispatch_schedule(
    signals: &[ScheduledSignal],
    timing: TimingMode,
) -> DispatchReport {
    let start = Instant::now();
    let fire_times: Vec<u64> = signals.iter().map(|s| s.fire_time).collect();
    let mut report = DispatchReport::default();

    for (signal, interval) in signals.iter().zip(sleep_intervals(&fire_times)) {
        match timing {
            TimingMode::Relative => sleep(interval).await,
            TimingMode::Anchored => {
                sleep_until(start + Duration::from_secs(signal.fire_time)).await
            }
        }
        let target = signal.sink.target();
        match signal.sink.deliver(signal.value) {
            Ok(()) => {
                log::info!(
                    "[controller] t+{:.3}s: {} -> {target} (scheduled t+{}s)",
                    start.elapsed().as_secs_f64(),
                    signal.value,
                    signal.fire_time
                );
                report.record(true);
            }
            Err(e) => {
                log::error!("[controller] {e}");
                report.record(false);
            }
        }
    }
    report
}

/// Start every client at `plan.start_offset`, stop them `plan.duration` later.
pub async fn run_client_sequence(
    clients: &[Arc<dyn SignalSink>],
    plan: ClientPlan,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    sleep(plan.start_offset).await;
    log::info!("[controller] starting {} client(s)", clients.len());
    broadcast(clients, SignalValue::Command(Command::Start), &mut report);

    sleep(plan.duration).await;
    log::info!("[controller] stopping {} client(s)", clients.len());
    broadcast(clients, SignalValue::Command(Command::Stop), &mut report);
    report
}

fn broadcast(sinks: &[Arc<dyn SignalSink>], value: SignalValue, report: &mut DispatchReport) {
    for sink in sinks {
        match sink.deliver(value) {
            Ok(()) => report.record(true),
            Err(e) => {
                log::error!("[controller] {e}");
                report.record(false);
            }
        }
    }
}

/// Read operator commands until the input ends.
///
/// `stop` (or `exit`) sends an explicit stop to every captain. At EOF this
/// never returns, leaving shutdown to the signal handler.
pub async fn operator_console<R>(input: R, workers: &SignalerPool)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "" => {}
                "stop" | "exit" => {
                    let n = workers.broadcast(SignalValue::STOP_DURATION);
                    log::info!("[controller] stop sent to {n}/{} captain(s)", workers.len());
                }
                other => log::warn!("[controller] unknown command '{other}' (try 'stop')"),
            },
            Ok(None) => break,
            Err(e) => {
                log::warn!("[controller] operator input closed: {e}");
                break;
            }
        }
    }
    std::future::pending::<()>().await
}

/// Completes on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[controller] cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind as UnixSignal};
        match signal(UnixSignal::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("[controller] cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("[controller] received Ctrl-C"),
        _ = terminate => log::info!("[controller] received SIGTERM"),
    }
}

/// Outcome of a controller run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub workers: DispatchReport,
    /// `None` when no client plan was configured or the run ended before
    /// the client sequence finished.
    pub clients: Option<DispatchReport>,
}

pub struct ControllerScheduler {
    schedule: Schedule,
    clients: Option<(ClientAddressList, ClientPlan)>,
    timing: TimingMode,
    connect_timeout: Duration,
    phase: watch::Sender<ControllerPhase>,
}

impl ControllerScheduler {
    pub fn new(schedule: Schedule, settings: &ExperimentSettings) -> Self {
        let (phase, _) = watch::channel(ControllerPhase::Idle);
        Self {
            schedule,
            clients: None,
            timing: settings.timing,
            connect_timeout: settings.connect_timeout(),
            phase,
        }
    }

    pub fn with_clients(mut self, clients: ClientAddressList, plan: ClientPlan) -> Self {
        self.clients = Some((clients, plan));
        self
    }

    /// Observe phase transitions.
    pub fn phase(&self) -> watch::Receiver<ControllerPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: ControllerPhase) {
        log::info!("[controller] phase {phase:?}");
        self.phase.send_replace(phase);
    }

    /// Run the experiment until `shutdown` completes.
    ///
    /// `operator` is read for console commands while waiting for shutdown;
    /// pass `tokio::io::empty()` to disable it.
    pub async fn run<R, F>(self, operator: R, shutdown: F) -> RunSummary
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let workers = SignalerPool::spawn(
            self.schedule.target_addresses(),
            SignalKind::Duration,
            self.connect_timeout,
        );
        let signals: Vec<ScheduledSignal> = self
            .schedule
            .sorted()
            .into_iter()
            .filter_map(|entry| {
                let handle = workers.get(&entry.target_address)?;
                Some(ScheduledSignal {
                    fire_time: entry.fire_time,
                    value: SignalValue::Duration(entry.duration),
                    sink: Arc::new(handle.clone()),
                })
            })
            .collect();

        self.enter(ControllerPhase::Running);
        log::info!(
            "[controller] {} entries for {} captain(s)",
            signals.len(),
            workers.len()
        );

        let client_task = self.clients.as_ref().map(|(addresses, plan)| {
            let pool = SignalerPool::spawn(
                addresses.as_slice().iter().cloned(),
                SignalKind::Command,
                self.connect_timeout,
            );
            let sinks = pool.sinks();
            let plan = *plan;
            tokio::spawn(async move { run_client_sequence(&sinks, plan).await })
        });

        let mut summary = RunSummary::default();
        tokio::select! {
            report = dispatch_schedule(&signals, self.timing) => {
                summary.workers = report;
                log::info!(
                    "[controller] dispatched {} of {} entries",
                    report.delivered,
                    signals.len()
                );
                self.enter(ControllerPhase::WaitingForTermination);
                tokio::select! {
                    _ = &mut shutdown => {}
                    _ = operator_console(operator, &workers) => {}
                }
            }
            _ = &mut shutdown => {
                log::warn!("[controller] shutdown before the schedule finished");
            }
        }

        if let Some(task) = client_task {
            if task.is_finished() {
                summary.clients = task.await.ok();
            } else {
                task.abort();
            }
        }
        self.enter(ControllerPhase::Terminated);
        summary
    }
}
