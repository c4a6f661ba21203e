use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sigwire::types::{CAPTAIN_PORT, CLIENT_PORT, CONNECT_TIMEOUT_MS};

use crate::controller::TimingMode;
use crate::error::SettingsError;

pub const DEFAULT_CAPTAIN_LAUNCH: &str = "docker run -d --rm -v /var/run/docker.sock:/var/run/docker.sock armadaumn/captainaws server {location} keller {coordinator_url} {self_ip}";
pub const DEFAULT_CLIENT_LAUNCH: &str =
    "docker run -d --rm armadaumn/client {appmanager_ip} {appmanager_port} {location} {tag} {top_n}";
/// `xargs -r` keeps this a no-op when nothing is running.
pub const DEFAULT_TERMINATE: &str = "docker ps -q | xargs -r docker kill";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    pub node_table: PathBuf,
    pub address_table: PathBuf,
    pub client_table: PathBuf,
    pub captain_port: u16,
    pub client_port: u16,
    pub connect_timeout_ms: u64,
    pub timing: TimingMode,
    pub captain_launch_command: String,
    pub client_launch_command: String,
    pub terminate_command: String,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            node_table: PathBuf::from("devicesim.csv"),
            address_table: PathBuf::from("addr.csv"),
            client_table: PathBuf::from("client.csv"),
            captain_port: CAPTAIN_PORT,
            client_port: CLIENT_PORT,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            timing: TimingMode::Relative,
            captain_launch_command: DEFAULT_CAPTAIN_LAUNCH.to_string(),
            client_launch_command: DEFAULT_CLIENT_LAUNCH.to_string(),
            terminate_command: DEFAULT_TERMINATE.to_string(),
        }
    }
}

impl ExperimentSettings {
    /// Load settings from a JSON file, or fall back to defaults when no
    /// path is given. Fields missing from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn captain_bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.captain_port)
    }

    pub fn client_bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.client_port)
    }
}
