//! Bounded retry with a fixed interval for host operations.
//!
//! Remote commands on batch clusters fail for long stretches (maintenance
//! windows, flaky login nodes), so the policy here is a fixed, usually long,
//! sleep between a small number of attempts rather than a short backoff.

use crate::error::{Error, Result};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(3600),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

/// Runs `operation` until it succeeds or `config.max_attempts` attempts have
/// been made, sleeping `config.interval` between attempts.
///
/// The last error is returned once every attempt has failed. Side effects of
/// failed attempts are not rolled back, so `operation` must be idempotent.
pub fn retry_with_interval<T, F>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt >= config.max_attempts => {
                debug!(
                    "{} failed on final attempt {}/{}: {}",
                    operation_name, attempt, config.max_attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying after {:?}",
                    operation_name, attempt, config.max_attempts, e, config.interval
                );
                thread::sleep(config.interval);
                attempt += 1;
            }
        }
    }
}

/// What kind of SSH trouble an error message points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SshTrouble {
    Unreachable,
    Rejected,
    UnknownHostKey,
    Other,
}

fn classify(message: &str) -> SshTrouble {
    let message = message.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));
    if any(&["host key", "known_hosts"]) {
        SshTrouble::UnknownHostKey
    } else if any(&["authentication", "permission denied", "publickey"]) {
        SshTrouble::Rejected
    } else if any(&["connection refused", "timed out", "no route to host", "failed to resolve"]) {
        SshTrouble::Unreachable
    } else {
        SshTrouble::Other
    }
}

/// Appends hints for the failure behind `error` on `host`, pointing at the
/// host registry fields that usually need fixing.
pub fn diagnose_ssh_error(error: &Error, host: &str, port: u16, ssh_key: Option<&str>) -> String {
    let login = format!("ssh -p {} {}", port, host);
    let hints: Vec<String> = match classify(&error.to_string()) {
        SshTrouble::Unreachable => vec![
            format!("check that {} resolves and accepts SSH on port {}", host, port),
            "login nodes under maintenance refuse connections; raise retry_interval_secs to wait it out".to_string(),
        ],
        SshTrouble::Rejected => match ssh_key {
            Some(key) => vec![
                format!("check that {} exists and is mode 600", key),
                format!("check that its public half is in ~/.ssh/authorized_keys on {}", host),
            ],
            None => vec![
                "no ssh_key is set for this host in hosts.yml; set one or load a key into ssh-agent".to_string(),
            ],
        },
        SshTrouble::UnknownHostKey => vec![format!(
            "record the host key first: ssh-keyscan -p {} {} >> ~/.ssh/known_hosts",
            port, host
        )],
        SshTrouble::Other => vec![],
    };

    let mut message = format!("{}\n\nTry `{}` by hand.", error, login);
    for hint in hints {
        message.push_str("\n  - ");
        message.push_str(&hint);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(attempts: u32) -> RetryConfig {
        RetryConfig::new(attempts, Duration::ZERO)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryConfig::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut calls = 0;
        let result = retry_with_interval(
            &fast(3),
            |_| {
                calls += 1;
                Ok::<i32, Error>(42)
            },
            "op",
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_success_after_failures() {
        let mut calls = 0;
        let result = retry_with_interval(
            &fast(5),
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(Error::TransientIo("temporary failure".to_string()))
                } else {
                    Ok(attempt)
                }
            },
            "op",
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_all_attempts_fail() {
        let mut calls = 0;
        let result = retry_with_interval(
            &fast(10),
            |_| {
                calls += 1;
                Err::<(), Error>(Error::TransientIo("persistent failure".to_string()))
            },
            "op",
        );
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_diagnose_connection_refused() {
        let error = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let diagnosis = diagnose_ssh_error(&error, "example.com", 22, None);
        assert!(diagnosis.contains("example.com resolves and accepts SSH on port 22"));
        assert!(diagnosis.contains("retry_interval_secs"));
    }

    #[test]
    fn test_diagnose_authentication_failure() {
        let error = Error::TransientIo("authentication failed: publickey".to_string());
        let diagnosis = diagnose_ssh_error(&error, "example.com", 22, Some("~/.ssh/id_rsa"));
        assert!(diagnosis.contains("~/.ssh/id_rsa exists and is mode 600"));
        assert!(!diagnosis.contains("ssh-agent"));
    }

    #[test]
    fn test_diagnose_generic_error() {
        let error = Error::TransientIo("something odd".to_string());
        let diagnosis = diagnose_ssh_error(&error, "example.com", 2222, None);
        assert!(diagnosis.starts_with("Transient I/O error: something odd"));
        assert!(diagnosis.contains("`ssh -p 2222 example.com`"));
        assert!(!diagnosis.contains("  - "));
    }

    #[test]
    fn test_host_key_wins_over_rejection() {
        assert_eq!(
            classify("Permission denied: host key verification failed"),
            SshTrouble::UnknownHostKey
        );
        assert_eq!(classify("Operation timed out"), SshTrouble::Unreachable);
    }
}
