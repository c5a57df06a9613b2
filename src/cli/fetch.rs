use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

use super::common::{current_dir, Context, SyncArgs};

#[derive(Args)]
#[command(about = "Pull the results of the job in the current directory")]
pub struct FetchCommand {
    #[command(flatten)]
    sync: SyncArgs,

    /// Files or directories relative to the current directory (default: everything)
    objects: Vec<PathBuf>,
}

impl FetchCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let cwd = current_dir()?;
        let mut job = ctx.load_job(&cwd)?;
        info!("Fetching from {}.", job.record().server);

        let options = self.sync.options(&ctx.config.defaults);
        job.fetch(&cwd, &self.objects, &options)?;
        Ok(())
    }
}
