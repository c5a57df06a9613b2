use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;

use super::common::{current_dir, Context};

#[derive(Args)]
#[command(about = "Ask the scheduler whether the job in a directory is still running")]
pub struct CheckCommand {
    /// Job directory (default: current directory)
    #[arg(long)]
    dir: Option<PathBuf>,
}

impl CheckCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let dir = match self.dir {
            Some(dir) => dir,
            None => current_dir()?,
        };
        let mut job = ctx.load_job(&dir)?;
        let running = job.check_status()?;

        let record = job.record();
        let number = record.job_number.as_deref().unwrap_or("-");
        if running {
            println!(
                "Job {} is {} on {}.",
                style(number).yellow(),
                style("still running").green(),
                record.server
            );
        } else {
            println!(
                "Job {} is {}. Fetch it from {}.",
                style(number).yellow(),
                style("done").cyan(),
                record.server
            );
        }
        Ok(())
    }
}
