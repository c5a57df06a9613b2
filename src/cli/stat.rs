use anyhow::Result;
use clap::Args;
use console::style;

use super::common::Context;

#[derive(Args)]
#[command(about = "Show your jobs in a server's scheduler listing")]
pub struct StatCommand {
    /// Server whose listing to show
    #[arg(long)]
    server: String,
}

impl StatCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let host = ctx.host(&self.server)?;
        let username = host.record().username();
        let listing = host.job_listing()?;

        println!("{}", style(format!("Job list on {}", host.name())).bold());
        for line in listing.lines().filter(|l| l.contains(username.as_str())) {
            println!("  {}", line.split_whitespace().collect::<Vec<_>>().join("  "));
        }
        Ok(())
    }
}
