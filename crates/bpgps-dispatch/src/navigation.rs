use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::address::navigation_uri;
use crate::error::LaunchError;

#[async_trait]
pub trait NavigationLauncher: Send + Sync {
    async fn launch(&self, address: &str) -> Result<(), LaunchError>;
}

/// Hands the `geo:` URI to an external opener such as `xdg-open`.
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// `command` is split on whitespace; the URI is appended as the last
    /// argument.
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }
}

#[async_trait]
impl NavigationLauncher for CommandLauncher {
    async fn launch(&self, address: &str) -> Result<(), LaunchError> {
        if self.program.is_empty() {
            return Err(LaunchError::NoCommand);
        }
        let uri = navigation_uri(address);
        info!("launching {} {}", self.program, uri);
        Command::new(&self.program)
            .args(&self.args)
            .arg(&uri)
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_split_into_program_and_args() {
        let launcher = CommandLauncher::new("gio open");
        assert_eq!(launcher.program, "gio");
        assert_eq!(launcher.args, vec!["open".to_string()]);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = CommandLauncher::new("  ").launch("1 Main St").await.unwrap_err();
        assert!(matches!(err, LaunchError::NoCommand));
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_failure() {
        let launcher = CommandLauncher::new("bpgps-no-such-opener-binary");
        let err = launcher.launch("1 Main St").await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }
}
