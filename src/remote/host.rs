//! A named endpoint that commands and existence checks are run against.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::HostRecord;
use crate::error::{Error, Result};
use crate::remote::retry::{diagnose_ssh_error, retry_with_interval, RetryConfig};
use crate::remote::shell::{shell_quote, ExecutionResult, LocalShell, Shell, SshShell};

const PROBE_COMMAND: &str = "ls -la > /dev/null; echo $?";

/// One endpoint plus the transport used to reach it.
#[derive(Clone)]
pub struct RemoteHost {
    record: HostRecord,
    shell: Arc<dyn Shell>,
}

impl fmt::Debug for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHost")
            .field("name", &self.record.name)
            .field("machine_type", &self.record.machine_type)
            .finish()
    }
}

impl RemoteHost {
    /// Creates a host using `sh -c` for local endpoints and SSH otherwise.
    pub fn new(record: HostRecord) -> Self {
        let shell: Arc<dyn Shell> = if record.is_local() {
            Arc::new(LocalShell)
        } else {
            Arc::new(SshShell::new(record.clone()))
        };
        Self { record, shell }
    }

    /// Creates a host with an explicit transport.
    pub fn with_shell(record: HostRecord, shell: Arc<dyn Shell>) -> Self {
        Self { record, shell }
    }

    pub fn record(&self) -> &HostRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn root(&self) -> &Path {
        &self.record.root
    }

    pub fn is_local(&self) -> bool {
        self.record.is_local()
    }

    pub fn is_remote(&self) -> bool {
        self.record.is_remote()
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.record.retry_attempts, self.record.retry_interval())
    }

    /// Runs `command`, optionally from `working_dir`, retrying while the
    /// command writes anything to stderr.
    ///
    /// Retried attempts are not deduplicated: a command that half-succeeded
    /// before failing runs again, so callers pass idempotent commands.
    pub fn run(&self, command: &str, working_dir: Option<&Path>) -> Result<ExecutionResult> {
        let full_command = match working_dir {
            None => command.to_string(),
            Some(dir) => {
                if self.is_remote() && !dir.is_absolute() {
                    return Err(Error::Precondition(format!(
                        "working directory '{}' on {} must be absolute",
                        dir.display(),
                        self.name()
                    )));
                }
                if self.is_local() && !dir.is_dir() {
                    return Err(Error::Precondition(format!(
                        "working directory '{}' is not found on {}",
                        dir.display(),
                        self.name()
                    )));
                }
                format!("cd {}; {}", shell_quote(&dir.to_string_lossy()), command)
            }
        };
        debug!("[{}] command = {}", self.name(), full_command);

        let config = self.retry_config();
        let operation = format!("[{}] {}", self.name(), full_command);
        let result = retry_with_interval(
            &config,
            |_| {
                let result = self.shell.exec(&full_command)?;
                if result.stderr.is_empty() {
                    debug!("[{}] stdout = {}", self.name(), result.stdout.trim_end());
                    Ok(result)
                } else {
                    debug!("[{}] stderr = {}", self.name(), result.stderr.trim_end());
                    Err(Error::TransientIo(result.stderr.trim().to_string()))
                }
            },
            &operation,
        );

        result.map_err(|e| {
            let message = if self.is_remote() {
                diagnose_ssh_error(
                    &e,
                    self.record.address(),
                    self.record.port,
                    self.record.ssh_key.as_deref(),
                )
            } else {
                e.to_string()
            };
            Error::TransientIo(format!(
                "command '{}' on {} failed after {} attempts: {}",
                full_command,
                self.name(),
                config.max_attempts,
                message
            ))
        })
    }

    pub fn is_file(&self, path: &Path) -> Result<bool> {
        self.test_path("-f", path)
    }

    pub fn is_dir(&self, path: &Path) -> Result<bool> {
        self.test_path("-d", path)
    }

    pub fn exists(&self, path: &Path) -> Result<bool> {
        self.test_path("-e", path)
    }

    /// Creates `path` and its parents.
    pub fn make_dir(&self, path: &Path) -> Result<()> {
        self.run(&format!("mkdir -p {}", shell_quote(&path.to_string_lossy())), None)?;
        Ok(())
    }

    fn test_path(&self, flag: &str, path: &Path) -> Result<bool> {
        if !path.is_absolute() {
            return Err(Error::Precondition(format!(
                "path '{}' must be absolute",
                path.display()
            )));
        }
        let command = format!("test {} {}; echo $?", flag, shell_quote(&path.to_string_lossy()));

        let result = self.run(&command, None)?;
        if let Some(found) = parse_test_status(&result.stdout) {
            debug!("[{}] test {} {} -> {}", self.name(), flag, path.display(), found);
            return Ok(found);
        }

        warn!(
            "[{}] could not parse existence check output {:?}; checking if the host is reachable",
            self.name(),
            result.stdout
        );
        if !self.is_alive() {
            return Err(Error::TransientIo(format!(
                "{} is unreachable while checking {}",
                self.name(),
                path.display()
            )));
        }

        let result = self.run(&command, None)?;
        parse_test_status(&result.stdout).ok_or_else(|| {
            Error::TransientIo(format!(
                "existence check for {} on {} returned unparsable output: {:?}",
                path.display(),
                self.name(),
                result.stdout
            ))
        })
    }

    /// Probes the host. Local hosts are always alive; remote hosts are probed
    /// up to `retry_attempts` times and reported dead after that.
    pub fn is_alive(&self) -> bool {
        if self.is_local() {
            return true;
        }
        info!("Checking if {} is reachable...", self.name());
        let probe = retry_with_interval(
            &self.retry_config(),
            |attempt| {
                debug!(
                    "[{}] liveness probe {}/{}",
                    self.name(),
                    attempt,
                    self.record.retry_attempts
                );
                let result = self.shell.exec(PROBE_COMMAND)?;
                match parse_test_status(&result.stdout) {
                    Some(true) => Ok(()),
                    _ => Err(Error::TransientIo(format!("{} is not alive", self.name()))),
                }
            },
            &format!("liveness probe of {}", self.name()),
        );
        match probe {
            Ok(()) => {
                info!("{} is alive", self.name());
                true
            }
            Err(_) => {
                warn!(
                    "{} did not answer after {} probes",
                    self.name(),
                    self.record.retry_attempts
                );
                false
            }
        }
    }

    /// Raw output of the scheduler's status command.
    pub fn job_listing(&self) -> Result<String> {
        let command = self.record.command("status_command")?;
        Ok(self.run(command, None)?.stdout)
    }

    /// Runs the scheduler's delete command for `job_number`.
    pub fn delete_job(&self, job_number: &str) -> Result<ExecutionResult> {
        let command = self.record.command("delete_command")?;
        info!("Deleting job {} on {}", job_number, self.name());
        self.run(&format!("{} {}", command, job_number), None)
    }
}

/// `test ...; echo $?` prints 0 when the test holds.
fn parse_test_status(stdout: &str) -> Option<bool> {
    stdout.trim().parse::<i32>().ok().map(|code| code == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::ScriptedShell;
    use std::path::PathBuf;

    fn remote(shell: &ScriptedShell) -> RemoteHost {
        let record = HostRecord::remote("cluster", "login.example.org", "u", "/scratch/u")
            .with_retry(10, 0);
        RemoteHost::with_shell(record, Arc::new(shell.clone()))
    }

    #[test]
    fn test_parse_test_status() {
        assert_eq!(parse_test_status("0\n"), Some(true));
        assert_eq!(parse_test_status("1\n"), Some(false));
        assert_eq!(parse_test_status("Connection closed"), None);
    }

    #[test]
    fn test_run_prefixes_working_dir() {
        let shell = ScriptedShell::new();
        let host = remote(&shell);
        host.run("qsub submit.sh", Some(Path::new("/scratch/u/run1")))
            .unwrap();
        assert_eq!(shell.commands(), vec!["cd /scratch/u/run1; qsub submit.sh"]);
    }

    #[test]
    fn test_run_rejects_relative_remote_dir() {
        let shell = ScriptedShell::new();
        let host = remote(&shell);
        let err = host.run("ls", Some(Path::new("run1"))).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_run_rejects_missing_local_dir() {
        let host = RemoteHost::with_shell(
            HostRecord::local("localhost", "/"),
            Arc::new(ScriptedShell::new()),
        );
        let err = host
            .run("ls", Some(Path::new("/definitely/not/here/jobshuttle")))
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_run_retries_on_stderr() {
        let shell = ScriptedShell::new();
        shell.respond("hostname", ExecutionResult::failed("ssh: timeout"));
        shell.respond("hostname", ExecutionResult::failed("ssh: timeout"));
        shell.respond("hostname", ExecutionResult::ok("node1\n"));
        let host = remote(&shell);

        let result = host.run("hostname", None).unwrap();
        assert_eq!(result.stdout, "node1\n");
        assert_eq!(shell.count("hostname"), 3);
    }

    #[test]
    fn test_run_gives_up_after_ten_attempts() {
        let shell = ScriptedShell::new();
        shell.respond_always("hostname", ExecutionResult::failed("broken pipe"));
        let host = remote(&shell);

        let err = host.run("hostname", None).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("10 attempts"));
        assert_eq!(shell.count("hostname"), 10);
    }

    #[test]
    fn test_existence_checks() {
        let shell = ScriptedShell::new();
        shell.respond("test -d", ExecutionResult::ok("0\n"));
        shell.respond("test -f", ExecutionResult::ok("1\n"));
        let host = remote(&shell);

        assert!(host.is_dir(Path::new("/scratch/u")).unwrap());
        assert!(!host.is_file(Path::new("/scratch/u/a.txt")).unwrap());
        assert!(matches!(
            host.exists(&PathBuf::from("relative")),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn test_unparsable_check_probes_then_retries_once() {
        let shell = ScriptedShell::new();
        shell.respond("test -e", ExecutionResult::ok("garbage"));
        shell.respond("test -e", ExecutionResult::ok("0\n"));
        shell.respond_always(PROBE_COMMAND, ExecutionResult::ok("0\n"));
        let host = remote(&shell);

        assert!(host.exists(Path::new("/scratch/u/out")).unwrap());
        assert_eq!(shell.count(PROBE_COMMAND), 1);
        assert_eq!(shell.count("test -e"), 2);
    }

    #[test]
    fn test_unparsable_check_on_dead_host_is_fatal() {
        let shell = ScriptedShell::new();
        shell.respond_always("test -e", ExecutionResult::ok("garbage"));
        shell.respond_always(PROBE_COMMAND, ExecutionResult::ok("255\n"));
        let host = remote(&shell);

        let err = host.exists(Path::new("/scratch/u/out")).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(shell.count("test -e"), 1);
    }

    #[test]
    fn test_local_host_always_alive() {
        let shell = ScriptedShell::new();
        let host = RemoteHost::with_shell(
            HostRecord::local("localhost", "/home/u"),
            Arc::new(shell.clone()),
        );
        assert!(host.is_alive());
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_remote_dead_after_ten_probes() {
        let shell = ScriptedShell::new();
        shell.respond_always(PROBE_COMMAND, ExecutionResult::ok("255\n"));
        let host = remote(&shell);

        assert!(!host.is_alive());
        assert_eq!(shell.count(PROBE_COMMAND), 10);
    }

    #[test]
    fn test_remote_alive_on_first_success() {
        let shell = ScriptedShell::new();
        shell.respond(PROBE_COMMAND, ExecutionResult::ok("255\n"));
        shell.respond(PROBE_COMMAND, ExecutionResult::ok("0\n"));
        let host = remote(&shell);

        assert!(host.is_alive());
        assert_eq!(shell.count(PROBE_COMMAND), 2);
    }

    #[test]
    fn test_delete_job_uses_template() {
        let shell = ScriptedShell::new();
        let record = HostRecord::remote("cluster", "h", "u", "/scratch/u")
            .with_scheduler("qsub", "qstat", "qdel", 0)
            .with_retry(1, 0);
        let host = RemoteHost::with_shell(record, Arc::new(shell.clone()));

        host.delete_job("4242").unwrap();
        assert_eq!(shell.commands(), vec!["qdel 4242"]);
    }

    #[test]
    fn test_job_listing_requires_status_command() {
        let host = remote(&ScriptedShell::new());
        assert!(matches!(host.job_listing(), Err(Error::Configuration(_))));
    }
}
