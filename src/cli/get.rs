use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

use super::common::{current_dir, Context, HostArgs, SyncArgs};

#[derive(Args)]
#[command(about = "Pull files from the server copy of the current directory to the client")]
pub struct GetCommand {
    #[command(flatten)]
    hosts: HostArgs,

    #[command(flatten)]
    sync: SyncArgs,

    /// Files or directories relative to the current directory (default: everything)
    objects: Vec<PathBuf>,
}

impl GetCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let cwd = current_dir()?;
        let transfer = ctx.data_transfer(&self.hosts.local, &self.hosts.client, &self.hosts.server)?;
        let options = self.sync.options(&ctx.config.defaults);

        transfer.get_objects(&cwd, &self.objects, &options)?;
        info!("Get from {} finished.", self.hosts.server);
        Ok(())
    }
}
