//! Local workload control invoked by the role listeners.
//!
//! `WorkloadManager` is the only side-effecting seam of a captain or client:
//! `ShellWorkloads` runs the configured container commands, and
//! [`crate::mock::RecordingWorkloads`] stands in for it in tests.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WorkloadError;
use crate::settings::ExperimentSettings;

/// What a start signal launches on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadDescriptor {
    Captain {
        location: String,
        coordinator_url: String,
        self_ip: String,
    },
    Client {
        appmanager_ip: String,
        appmanager_port: u16,
        location: String,
        tag: String,
        top_n: u32,
    },
}

impl WorkloadDescriptor {
    /// Substitute `{field}` placeholders in a command template.
    pub fn render(&self, template: &str) -> String {
        match self {
            Self::Captain {
                location,
                coordinator_url,
                self_ip,
            } => template
                .replace("{location}", location)
                .replace("{coordinator_url}", coordinator_url)
                .replace("{self_ip}", self_ip),
            Self::Client {
                appmanager_ip,
                appmanager_port,
                location,
                tag,
                top_n,
            } => template
                .replace("{appmanager_ip}", appmanager_ip)
                .replace("{appmanager_port}", &appmanager_port.to_string())
                .replace("{location}", location)
                .replace("{tag}", tag)
                .replace("{top_n}", &top_n.to_string()),
        }
    }
}

/// Launch and tear down local workloads.
///
/// Both calls may run concurrently from different tasks. `terminate_all`
/// must succeed when nothing is running.
#[async_trait]
pub trait WorkloadManager: Send + Sync {
    /// Start a workload, returning whatever the launcher printed.
    async fn launch(&self, descriptor: &WorkloadDescriptor) -> Result<String, WorkloadError>;

    /// Stop every workload this node started.
    async fn terminate_all(&self) -> Result<(), WorkloadError>;
}

/// Production manager that runs command templates through `sh -c`.
pub struct ShellWorkloads {
    captain_launch: String,
    client_launch: String,
    terminate: String,
}

impl ShellWorkloads {
    pub fn new(
        captain_launch: impl Into<String>,
        client_launch: impl Into<String>,
        terminate: impl Into<String>,
    ) -> Self {
        Self {
            captain_launch: captain_launch.into(),
            client_launch: client_launch.into(),
            terminate: terminate.into(),
        }
    }

    pub fn from_settings(settings: &ExperimentSettings) -> Self {
        Self::new(
            settings.captain_launch_command.clone(),
            settings.client_launch_command.clone(),
            settings.terminate_command.clone(),
        )
    }

    pub fn launch_command(&self, descriptor: &WorkloadDescriptor) -> String {
        let template = match descriptor {
            WorkloadDescriptor::Captain { .. } => &self.captain_launch,
            WorkloadDescriptor::Client { .. } => &self.client_launch,
        };
        descriptor.render(template)
    }

    async fn run(&self, command: &str) -> Result<String, WorkloadError> {
        log::debug!("[workload] sh -c {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|source| WorkloadError::Spawn {
                command: command.to_string(),
                source,
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(WorkloadError::Failed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl WorkloadManager for ShellWorkloads {
    async fn launch(&self, descriptor: &WorkloadDescriptor) -> Result<String, WorkloadError> {
        let command = self.launch_command(descriptor);
        self.run(&command).await
    }

    async fn terminate_all(&self) -> Result<(), WorkloadError> {
        self.run(&self.terminate).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DEFAULT_CAPTAIN_LAUNCH;

    fn captain() -> WorkloadDescriptor {
        WorkloadDescriptor::Captain {
            location: "close".into(),
            coordinator_url: "10.0.0.2:5912".into(),
            self_ip: "10.0.0.7".into(),
        }
    }

    #[test]
    fn renders_captain_command() {
        let shell = ShellWorkloads::from_settings(&ExperimentSettings::default());
        let cmd = shell.launch_command(&captain());
        assert_eq!(
            cmd,
            "docker run -d --rm -v /var/run/docker.sock:/var/run/docker.sock armadaumn/captainaws server close keller 10.0.0.2:5912 10.0.0.7"
        );
        assert!(DEFAULT_CAPTAIN_LAUNCH.contains("{coordinator_url}"));
    }

    #[test]
    fn renders_client_command() {
        let template = "run {appmanager_ip}:{appmanager_port} {location} {tag} {top_n}";
        let shell = ShellWorkloads::new("", template, "");
        let client = WorkloadDescriptor::Client {
            appmanager_ip: "10.0.0.3".into(),
            appmanager_port: 9090,
            location: "far".into(),
            tag: "yolo".into(),
            top_n: 3,
        };
        assert_eq!(shell.launch_command(&client), "run 10.0.0.3:9090 far yolo 3");
    }

    #[tokio::test]
    async fn shell_launch_returns_stdout() {
        let shell = ShellWorkloads::new("echo started {location}", "", "true");
        let out = shell.launch(&captain()).await.unwrap();
        assert_eq!(out, "started close");
    }

    #[tokio::test]
    async fn shell_failure_carries_stderr() {
        let shell = ShellWorkloads::new("", "", "echo nothing to kill >&2; exit 3");
        let err = shell.terminate_all().await.unwrap_err();
        match err {
            WorkloadError::Failed { stderr, .. } => assert_eq!(stderr, "nothing to kill"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminate_is_repeatable() {
        let shell = ShellWorkloads::new("", "", "true");
        shell.terminate_all().await.unwrap();
        shell.terminate_all().await.unwrap();
    }
}
