//! Command transports: a local `sh -c` shell and an SSH session shell.
//!
//! A `Shell` runs one command string to completion and reports what it
//! printed. Retry, working directories and existence checks live one level
//! up in [`RemoteHost`](crate::remote::RemoteHost).

use crate::config::HostRecord;
use crate::error::{Error, Result};
use log::{debug, warn};
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::thread;
use std::time::Duration;

const DRAIN_PAUSE: Duration = Duration::from_millis(20);

/// Result of executing a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Failed result with the given stderr.
    pub fn failed(stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can run a shell command line.
pub trait Shell: Send + Sync {
    fn exec(&self, command: &str) -> Result<ExecutionResult>;
}

/// Runs commands on the orchestrating machine through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl Shell for LocalShell {
    fn exec(&self, command: &str) -> Result<ExecutionResult> {
        debug!("sh -c {}", command);
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Runs commands on a remote host over a fresh SSH session per call.
///
/// Only the TCP connect is bounded by a timeout; once the command is running
/// the call blocks until the remote side closes the channel.
pub struct SshShell {
    host: HostRecord,
}

impl SshShell {
    pub fn new(host: HostRecord) -> Self {
        Self { host }
    }

    fn connect(&self) -> Result<Session> {
        let address = self.host.address();
        let addr_str = format!("{}:{}", address, self.host.port);
        debug!("[{}] connecting to {}", self.host.name, addr_str);

        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| {
                Error::TransientIo(format!("Failed to resolve host '{}': {}", address, e))
            })?
            .next()
            .ok_or_else(|| {
                Error::TransientIo(format!("No addresses found for host '{}'", address))
            })?;

        let tcp = TcpStream::connect_timeout(
            &addr,
            Duration::from_secs(self.host.connect_timeout_secs),
        )
        .map_err(|e| Error::TransientIo(format!("Failed to connect to {}: {}", address, e)))?;

        let mut sess = Session::new()
            .map_err(|e| Error::TransientIo(format!("Failed to create SSH session: {}", e)))?;
        sess.set_tcp_stream(tcp);
        sess.handshake()
            .map_err(|e| Error::TransientIo(format!("SSH handshake failed: {}", e)))?;

        self.authenticate(&sess)?;
        Ok(sess)
    }

    fn authenticate(&self, sess: &Session) -> Result<()> {
        let user = self.host.username();

        if let Some(key_path) = self.host.expanded_ssh_key() {
            match sess.userauth_pubkey_file(&user, None, &key_path, None) {
                Ok(_) => return Ok(()),
                Err(e) => warn!(
                    "[{}] public key authentication with {} failed: {}",
                    self.host.name,
                    key_path.display(),
                    e
                ),
            }
        }

        match sess.userauth_agent(&user) {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::TransientIo(format!(
                "SSH authentication failed for user {} ({}). Tried: {}, agent",
                user,
                e,
                self.host.ssh_key.as_deref().unwrap_or("no key specified")
            ))),
        }
    }
}

impl Shell for SshShell {
    fn exec(&self, command: &str) -> Result<ExecutionResult> {
        let sess = self.connect()?;

        let mut channel = sess
            .channel_session()
            .map_err(|e| Error::TransientIo(format!("Failed to open channel: {}", e)))?;
        channel
            .exec(command)
            .map_err(|e| Error::TransientIo(format!("Failed to execute command: {}", e)))?;

        sess.set_blocking(false);
        let drained = drain(&mut channel);
        sess.set_blocking(true);
        let (stdout, stderr) = drained?;

        channel
            .wait_close()
            .map_err(|e| Error::TransientIo(format!("Failed to close channel: {}", e)))?;
        let exit_code = channel
            .exit_status()
            .map_err(|e| Error::TransientIo(format!("Failed to get exit status: {}", e)))?;

        debug!("[{}] exit code {}", self.host.name, exit_code);
        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Reads stdout and stderr in turn until the remote side closes, so a
/// chatty stderr cannot stall the command behind an unread stdout.
/// The session must be non-blocking.
fn drain(channel: &mut Channel) -> Result<(String, String)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let from_out = read_available(channel, &mut stdout)?;
        let from_err = read_available(&mut channel.stderr(), &mut stderr)?;
        if from_out == 0 && from_err == 0 {
            if channel.eof() {
                break;
            }
            thread::sleep(DRAIN_PAUSE);
        }
    }
    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

/// Appends whatever `reader` has ready to `into`; returns the byte count.
fn read_available(reader: &mut impl Read, into: &mut Vec<u8>) -> Result<usize> {
    let mut buf = [0u8; 8192];
    let mut total = 0;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                into.extend_from_slice(&buf[..n]);
                total += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(total),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Quotes `value` for a POSIX shell when it contains anything beyond a
/// conservative set of safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:@+=,%~".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
