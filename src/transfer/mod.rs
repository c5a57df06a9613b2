//! Data movement between hosts.

pub mod command;
pub mod engine;
pub mod objects;

pub use command::{remote_copy_command, rsync_command, SyncOptions};
pub use engine::{TransferEngine, TransferSpec};
pub use objects::DataTransfer;
