//! Remote execution infrastructure.
//!
//! This module provides the pieces needed to run commands on a named
//! endpoint, whether it is the machine we are running on or a cluster login
//! node reached over SSH, with bounded retry and liveness probing.

pub mod host;
pub mod mock;
pub mod retry;
pub mod shell;

pub use host::RemoteHost;
pub use retry::{diagnose_ssh_error, retry_with_interval, RetryConfig};
pub use shell::{shell_quote, ExecutionResult, LocalShell, Shell, SshShell};
