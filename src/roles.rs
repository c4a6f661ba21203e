//! Process entry points, one per role.

use std::sync::Arc;

use tokio::io::BufReader;

use crate::controller::{shutdown_signal, ClientPlan, ControllerScheduler};
use crate::error::Error;
use crate::listener::{RoleListener, SignalInterpreter};
use crate::schedule::{load_client_addresses, load_schedule};
use crate::settings::ExperimentSettings;
use crate::workload::{ShellWorkloads, WorkloadDescriptor, WorkloadManager};

/// Load the schedule, fire it, and wait for Ctrl-C / SIGTERM.
pub async fn run_controller(
    settings: &ExperimentSettings,
    client_plan: Option<ClientPlan>,
) -> Result<(), Error> {
    let schedule = load_schedule(&settings.node_table, &settings.address_table)?;
    log::info!(
        "[controller] loaded {} entries from {} / {}",
        schedule.len(),
        settings.node_table.display(),
        settings.address_table.display()
    );

    let mut controller = ControllerScheduler::new(schedule, settings);
    if let Some(plan) = client_plan {
        let clients = load_client_addresses(&settings.client_table)?;
        log::info!(
            "[controller] {} client(s) start at t+{}s for {}s",
            clients.len(),
            plan.start_offset.as_secs(),
            plan.duration.as_secs()
        );
        controller = controller.with_clients(clients, plan);
    }

    let operator = BufReader::new(tokio::io::stdin());
    let summary = controller.run(operator, shutdown_signal()).await;
    log::info!(
        "[controller] done: {} delivered, {} failed",
        summary.workers.delivered,
        summary.workers.failed
    );
    Ok(())
}

/// Serve captain signals on the configured port.
pub async fn run_captain(
    settings: &ExperimentSettings,
    descriptor: WorkloadDescriptor,
) -> Result<(), Error> {
    let address = settings.captain_bind_address();
    serve(&address, SignalInterpreter::captain(descriptor), settings).await
}

/// Serve client commands on the configured port.
pub async fn run_client(
    settings: &ExperimentSettings,
    descriptor: WorkloadDescriptor,
) -> Result<(), Error> {
    let address = settings.client_bind_address();
    serve(&address, SignalInterpreter::client(descriptor), settings).await
}

async fn serve(
    address: &str,
    interpreter: SignalInterpreter,
    settings: &ExperimentSettings,
) -> Result<(), Error> {
    let workloads: Arc<dyn WorkloadManager> = Arc::new(ShellWorkloads::from_settings(settings));
    let listener = RoleListener::bind(address, interpreter, workloads)
        .await
        .map_err(|source| Error::Bind {
            address: address.to_string(),
            source,
        })?;
    tokio::select! {
        _ = listener.serve() => {}
        _ = shutdown_signal() => {}
    }
    Ok(())
}
