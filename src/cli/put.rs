use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

use super::common::{current_dir, Context, HostArgs, SyncArgs};

#[derive(Args)]
#[command(about = "Push files from the client to the server copy of the current directory")]
pub struct PutCommand {
    #[command(flatten)]
    hosts: HostArgs,

    #[command(flatten)]
    sync: SyncArgs,

    /// Files or directories relative to the current directory (default: everything)
    objects: Vec<PathBuf>,
}

impl PutCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let cwd = current_dir()?;
        let transfer = ctx.data_transfer(&self.hosts.local, &self.hosts.client, &self.hosts.server)?;
        let options = self.sync.options(&ctx.config.defaults);

        transfer.put_objects(&cwd, &self.objects, &options)?;
        info!("Put to {} finished.", self.hosts.server);
        Ok(())
    }
}
