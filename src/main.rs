use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

use cli::check::CheckCommand;
use cli::common::Context;
use cli::config::ConfigCommand;
use cli::delete::DeleteCommand;
use cli::fetch::FetchCommand;
use cli::get::GetCommand;
use cli::put::PutCommand;
use cli::show::ShowCommand;
use cli::stat::StatCommand;
use cli::submit::SubmitCommand;

#[derive(Parser)]
#[command(name = "jobshuttle")]
#[command(about = "Move data between workstations and clusters and drive batch jobs there", long_about = None)]
struct Cli {
    /// Configuration directory
    #[arg(long, global = true, env = "JOBSHUTTLE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log filter, e.g. debug or jobshuttle=trace
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Verify that roots and sources exist before transferring
    #[arg(long, global = true)]
    safe: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Put(PutCommand),
    Get(GetCommand),
    Submit(SubmitCommand),
    Check(CheckCommand),
    Fetch(FetchCommand),
    Delete(DeleteCommand),
    Show(ShowCommand),
    Stat(StatCommand),
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // INFO unless RUST_LOG or --log-level say otherwise
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = &cli.log_level {
        logger.parse_filters(level);
    }
    logger.init();

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(cli.config_dir.as_deref());
    }

    let ctx = Context::load(cli.config_dir.as_deref(), cli.safe)?;
    match cli.command {
        Commands::Put(cmd) => cmd.execute(&ctx),
        Commands::Get(cmd) => cmd.execute(&ctx),
        Commands::Submit(cmd) => cmd.execute(&ctx),
        Commands::Check(cmd) => cmd.execute(&ctx),
        Commands::Fetch(cmd) => cmd.execute(&ctx),
        Commands::Delete(cmd) => cmd.execute(&ctx),
        Commands::Show(cmd) => cmd.execute(&ctx),
        Commands::Stat(cmd) => cmd.execute(&ctx),
        Commands::Config(_) => Ok(()),
    }
}
