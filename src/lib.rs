//! jobshuttle: data transfer and batch job orchestration across a
//! workstation and remote clusters.
//!
//! Hosts are described in a YAML registry ([`config`]). Commands run on
//! them through [`remote::RemoteHost`], files move between them through
//! [`transfer::TransferEngine`], and [`job::Job`] drives a batch job from
//! script generation to deletion with its state persisted next to the
//! script.

pub mod config;
pub mod error;
pub mod job;
pub mod paths;
pub mod remote;
pub mod transfer;

pub use error::{Error, JobShuttleError, Result};
