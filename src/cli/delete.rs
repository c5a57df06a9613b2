use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

use super::common::{current_dir, Context};

#[derive(Args)]
#[command(about = "Delete a job from its scheduler")]
pub struct DeleteCommand {
    /// Job directory (default: current directory)
    #[arg(long, conflicts_with = "job_number")]
    dir: Option<PathBuf>,

    /// Delete this job number directly on --server, without a job record
    #[arg(long, requires = "server")]
    job_number: Option<String>,

    #[arg(long)]
    server: Option<String>,
}

impl DeleteCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        if let (Some(number), Some(server)) = (&self.job_number, &self.server) {
            let host = ctx.host(server)?;
            info!("Deleting job {} on {}.", number, host.name());
            host.delete_job(number)?;
            return Ok(());
        }

        let dir = match self.dir {
            Some(dir) => dir,
            None => current_dir()?,
        };
        let mut job = ctx.load_job(&dir)?;
        info!(
            "Deleting job {} on {}.",
            job.record().job_number.as_deref().unwrap_or("-"),
            job.record().server
        );
        job.delete()?;
        Ok(())
    }
}
