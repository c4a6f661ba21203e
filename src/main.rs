//! devicesim: controller, captain and client roles in one binary.
//!
//! ```text
//! devicesim controller [START_CLIENT_OFFSET CLIENT_DURATION]
//! devicesim captain <COORDINATOR_ADDR> <LOCATION> <SELF_IP>
//! devicesim client <APPMANAGER_IP> <APPMANAGER_PORT> <LOCATION> <TAG> <TOP_N>
//! ```

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use devicesim_lib::controller::ClientPlan;
use devicesim_lib::settings::ExperimentSettings;
use devicesim_lib::workload::WorkloadDescriptor;
use devicesim_lib::{logging, roles};

#[derive(Debug, Parser)]
#[command(name = "devicesim", version, about)]
struct Cli {
    /// JSON settings file; missing fields use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Debug, Subcommand)]
enum Role {
    /// Fire the schedule at captains and run the client sequence.
    Controller {
        /// Seconds from start until clients get start(+1).
        #[arg(requires = "client_duration")]
        start_client_offset: Option<u64>,
        /// Seconds clients run before stop(-1).
        client_duration: Option<u64>,
    },
    /// Listen for duration signals and run the captain workload.
    Captain {
        coordinator_addr: String,
        location: String,
        self_ip: String,
    },
    /// Listen for start/stop commands and run the client workload.
    Client {
        appmanager_ip: String,
        appmanager_port: u16,
        location: String,
        tag: String,
        top_n: u32,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to start runtime: {e}");
            process::exit(1);
        }
    };
    let result = runtime.block_on(run(cli));
    // The operator console may still be parked in a blocking stdin read.
    runtime.shutdown_background();

    if let Err(e) = result {
        log::error!("{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), devicesim_lib::Error> {
    let settings = ExperimentSettings::load(cli.config.as_deref())?;

    match cli.role {
        Role::Controller {
            start_client_offset,
            client_duration,
        } => {
            let plan = start_client_offset
                .zip(client_duration)
                .map(|(offset, duration)| ClientPlan::from_secs(offset, duration));
            roles::run_controller(&settings, plan).await
        }
        Role::Captain {
            coordinator_addr,
            location,
            self_ip,
        } => {
            let descriptor = WorkloadDescriptor::Captain {
                location,
                coordinator_url: coordinator_addr,
                self_ip,
            };
            roles::run_captain(&settings, descriptor).await
        }
        Role::Client {
            appmanager_ip,
            appmanager_port,
            location,
            tag,
            top_n,
        } => {
            let descriptor = WorkloadDescriptor::Client {
                appmanager_ip,
                appmanager_port,
                location,
                tag,
                top_n,
            };
            roles::run_client(&settings, descriptor).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn controller_client_args_come_in_pairs() {
        assert!(Cli::try_parse_from(["devicesim", "controller"]).is_ok());
        assert!(Cli::try_parse_from(["devicesim", "controller", "10", "4"]).is_ok());
        assert!(Cli::try_parse_from(["devicesim", "controller", "10"]).is_err());
    }

    #[test]
    fn captain_requires_three_args() {
        assert!(Cli::try_parse_from(["devicesim", "captain", "spinner:5912", "close"]).is_err());
        let cli =
            Cli::try_parse_from(["devicesim", "captain", "spinner:5912", "close", "10.0.0.7"])
                .unwrap();
        assert!(matches!(cli.role, Role::Captain { .. }));
    }

    #[test]
    fn client_port_must_be_numeric() {
        let args = ["devicesim", "client", "10.0.0.3", "http", "far", "t", "5"];
        assert!(Cli::try_parse_from(args).is_err());
        let args = ["devicesim", "client", "10.0.0.3", "9090", "far", "t", "5"];
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "devicesim",
            "controller",
            "--config",
            "run.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("run.json")));
    }
}
