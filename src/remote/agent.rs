// ABOUTME: RemoteExec over SSH, running the drover agent's commands on each host.
// ABOUTME: Opens a session per call and always disconnects, even when the command failed.

use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt;

use crate::config::{HostConfig, RemoteSettings};
use crate::model::{Instance, InstanceDescriptor, UptestOutcome};
use crate::types::{AppName, ProcName, ReleaseHash};

use super::error::{CommandFailedSnafu, EncodeSnafu, NotFoundSnafu, SessionSnafu};
use super::ssh::{CommandOutput, Session, SessionConfig};
use super::{RemoteError, RemoteExec};

/// Exit status the agent uses for "no such instance".
const AGENT_NOT_FOUND: u32 = 44;

pub struct SshRemote {
    settings: RemoteSettings,
}

impl SshRemote {
    pub fn new(settings: RemoteSettings) -> Self {
        Self { settings }
    }

    /// Run `command` on a fresh session, uploading `(path, contents)` first when given.
    async fn run(
        &self,
        host: &HostConfig,
        command: &str,
        upload: Option<(&str, &str)>,
    ) -> Result<CommandOutput, RemoteError> {
        let config = SessionConfig::for_host(host, &self.settings);
        let session = Session::connect(config).await.context(SessionSnafu {
            host: host.name.as_str(),
        })?;

        let result = self.run_on(&session, host, command, upload).await;

        if let Err(e) = session.disconnect().await {
            tracing::debug!(host = host.name.as_str(), "ssh disconnect failed: {}", e);
        }
        result
    }

    async fn run_on(
        &self,
        session: &Session,
        host: &HostConfig,
        command: &str,
        upload: Option<(&str, &str)>,
    ) -> Result<CommandOutput, RemoteError> {
        if let Some((path, contents)) = upload {
            let written = session.write_file(path, contents).await.context(SessionSnafu {
                host: host.name.as_str(),
            })?;
            if !written.success() {
                return CommandFailedSnafu {
                    host: host.name.as_str(),
                    command: format!("write {path}"),
                    exit_code: written.exit_code,
                    stderr: written.stderr,
                }
                .fail();
            }
        }

        tracing::debug!(host = host.name.as_str(), command, "running agent command");
        session.exec(command).await.context(SessionSnafu {
            host: host.name.as_str(),
        })
    }

    fn check(host: &HostConfig, command: &str, output: CommandOutput) -> Result<CommandOutput, RemoteError> {
        if output.success() {
            return Ok(output);
        }
        CommandFailedSnafu {
            host: host.name.as_str(),
            command,
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
        .fail()
    }
}

/// Shell-quote one argument.
fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Instance record as printed by `list`. Parsed leniently so one foreign
/// entry does not hide the rest of the host's instances.
#[derive(Debug, Deserialize)]
struct InstanceRecord {
    name: String,
    port: u16,
    app: String,
    version: String,
    #[serde(default = "default_config_name")]
    config_name: String,
    #[serde(rename = "proc")]
    proc_name: String,
    release_hash: String,
}

fn default_config_name() -> String {
    "default".to_string()
}

impl InstanceRecord {
    fn into_instance(self, host: &str) -> Option<Instance> {
        let app = AppName::new(&self.app).ok()?;
        let proc_name = ProcName::new(&self.proc_name).ok()?;
        Some(Instance {
            name: self.name,
            host: host.to_string(),
            port: self.port,
            app,
            version: self.version,
            config_name: self.config_name,
            proc_name,
            release_hash: ReleaseHash::from_reported(self.release_hash),
        })
    }
}

fn parse_instances(host: &str, stdout: &str) -> Result<Vec<Instance>, RemoteError> {
    let records: Vec<InstanceRecord> =
        serde_json::from_str(stdout.trim()).map_err(|e| RemoteError::BadOutput {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    Ok(records
        .into_iter()
        .filter_map(|record| {
            let name = record.name.clone();
            let instance = record.into_instance(host);
            if instance.is_none() {
                tracing::warn!(host, instance = name.as_str(), "skipping unrecognised instance");
            }
            instance
        })
        .collect())
}

/// Read the uptest command's result. Failing checks come back as outcomes,
/// and the agent may exit non-zero for them. A non-zero exit with nothing
/// readable means the checks never ran.
fn uptest_outcomes(
    host: &str,
    command: &str,
    output: CommandOutput,
) -> Result<Vec<UptestOutcome>, RemoteError> {
    if output.success() {
        return parse_outcomes(host, &output.stdout);
    }
    match parse_outcomes(host, &output.stdout) {
        Ok(outcomes) if !outcomes.is_empty() => Ok(outcomes),
        _ => CommandFailedSnafu {
            host,
            command,
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
        .fail(),
    }
}

fn parse_outcomes(host: &str, stdout: &str) -> Result<Vec<UptestOutcome>, RemoteError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| RemoteError::BadOutput {
        host: host.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl RemoteExec for SshRemote {
    async fn place_instance(
        &self,
        host: &HostConfig,
        descriptor: &InstanceDescriptor,
    ) -> Result<(), RemoteError> {
        let name = descriptor.name();
        let yaml = serde_yaml::to_string(descriptor).context(EncodeSnafu {
            host: host.name.as_str(),
            name: name.as_str(),
        })?;
        let path = format!("{}/{}.proc.yaml", self.settings.descriptor_dir, name);
        let command = format!("{} {}", self.settings.deploy_command, quote(&path));

        let output = self.run(host, &command, Some((&path, &yaml))).await?;
        Self::check(host, &command, output)?;
        tracing::info!(host = host.name.as_str(), instance = name.as_str(), "instance placed");
        Ok(())
    }

    async fn remove_instance(&self, host: &HostConfig, name: &str) -> Result<(), RemoteError> {
        let command = format!("{} {}", self.settings.delete_command, quote(name));
        let output = self.run(host, &command, None).await?;
        if output.exit_code == AGENT_NOT_FOUND {
            return NotFoundSnafu {
                host: host.name.as_str(),
                name,
            }
            .fail();
        }
        Self::check(host, &command, output)?;
        Ok(())
    }

    async fn list_instances(&self, host: &HostConfig) -> Result<Vec<Instance>, RemoteError> {
        let command = self.settings.list_command.clone();
        let output = self.run(host, &command, None).await?;
        let output = Self::check(host, &command, output)?;
        parse_instances(&host.name, &output.stdout)
    }

    async fn run_health_checks(
        &self,
        host: &HostConfig,
        name: &str,
    ) -> Result<Vec<UptestOutcome>, RemoteError> {
        let command = format!("{} {}", self.settings.uptest_command, quote(name));
        let output = self.run(host, &command, None).await?;
        if output.exit_code == AGENT_NOT_FOUND {
            return NotFoundSnafu {
                host: host.name.as_str(),
                name,
            }
            .fail();
        }
        uptest_outcomes(&host.name, &command, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn list_output_skips_foreign_entries() {
        let stdout = r#"[
            {"name": "billing-v3-abcd1234-web-5000", "port": 5000, "app": "billing",
             "version": "v3", "config_name": "prod", "proc": "web", "release_hash": "abcd1234ff"},
            {"name": "Legacy", "port": 80, "app": "Legacy App",
             "version": "1", "proc": "web", "release_hash": "x"}
        ]"#;

        let instances = parse_instances("web1", stdout).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].host, "web1");
        assert_eq!(instances[0].node().to_string(), "web1:5000");
    }

    #[test]
    fn garbage_list_output_is_bad_output() {
        let err = parse_instances("web1", "not json").unwrap_err();
        assert_eq!(err.kind(), crate::remote::RemoteErrorKind::BadOutput);
    }

    fn output(exit_code: u32, stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn empty_uptest_output_means_no_checks() {
        assert!(uptest_outcomes("web1", "uptest", output(0, "\n")).unwrap().is_empty());
    }

    #[test]
    fn crashed_uptest_command_is_a_failure() {
        let err = uptest_outcomes("web1", "uptest", output(127, "")).unwrap_err();
        assert_eq!(err.kind(), crate::remote::RemoteErrorKind::CommandFailed);

        let err = uptest_outcomes("web1", "uptest", output(1, "Segmentation fault")).unwrap_err();
        assert_eq!(err.kind(), crate::remote::RemoteErrorKind::CommandFailed);
    }

    #[test]
    fn failing_checks_survive_non_zero_exit() {
        let stdout = r#"[{"Name": "http", "Passed": false, "Output": "503"}]"#;
        let outcomes = uptest_outcomes("web1", "uptest", output(1, stdout)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].passed);
    }

    #[test]
    fn missing_config_name_is_default() {
        let stdout = r#"[{"name": "billing-v3-abcd1234-web-5000", "port": 5000, "app": "billing",
             "version": "v3", "proc": "web", "release_hash": "abcd1234ff"}]"#;
        let instances = parse_instances("web1", stdout).unwrap();
        assert_eq!(instances[0].config_name, "default");
    }
}
