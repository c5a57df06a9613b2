use anyhow::Result;
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};

use jobshuttle::job::{JobRecord, JobRegistry, RunState};

use super::common::{current_dir, Context};

#[derive(Args)]
#[command(about = "List the jobs recorded below a directory")]
pub struct ShowCommand {
    /// Directory to search (default: current directory)
    root: Option<PathBuf>,

    /// Print every field of the job recorded in DIR
    #[arg(long, value_name = "DIR")]
    detail: Option<PathBuf>,
}

fn styled_state(state: RunState) -> String {
    let text = state.to_string();
    match state {
        RunState::Running => style(text).green().to_string(),
        RunState::Finished => style(text).cyan().to_string(),
        RunState::Deleted => style(text).red().to_string(),
        RunState::Unsubmitted => style(text).dim().to_string(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl ShowCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        if let Some(dir) = &self.detail {
            let record = ctx.store(dir).load()?;
            print_detail(dir, &record);
            return Ok(());
        }

        let root = match self.root {
            Some(root) => root,
            None => current_dir()?,
        };
        let registry = JobRegistry::discover(&root, &ctx.config.defaults.record_file);
        if registry.is_empty() {
            println!("No jobs found below {}", root.display());
            return Ok(());
        }

        println!("Found {} jobs below {}:", registry.len(), root.display());
        for (idx, entry) in registry.entries().iter().enumerate() {
            let relative = entry.dir.strip_prefix(&root).unwrap_or(entry.dir.as_path());
            let shown = if relative.as_os_str().is_empty() {
                Path::new(".")
            } else {
                relative
            };
            println!(
                "  {:>3}  {}  {}  {} on {}",
                idx,
                style(shown.display()).bold(),
                styled_state(entry.record.run_state),
                style(entry.record.job_number.as_deref().unwrap_or("-")).yellow(),
                entry.record.server
            );
        }
        let running = registry.in_state(RunState::Running).count();
        if running > 0 {
            println!("{} still running; `jobshuttle check --dir DIR` refreshes them", running);
        }
        Ok(())
    }
}

fn print_detail(dir: &Path, record: &JobRecord) {
    println!("{}", style("Local").bold().underlined());
    println!("  local dir: {}", dir.display());
    println!("  record id: {}", record.id);
    println!("  created: {} by {}", record.created_at, record.created_by);
    println!();

    println!("{}", style("Server").bold().underlined());
    println!("  server: {}", record.server);
    println!("  server dir: {}", or_dash(record.job_dir.as_ref().map(|d| d.display())));
    println!();

    println!("{}", style("Status").bold().underlined());
    println!("  job number: {}", or_dash(record.job_number.as_ref()));
    println!("  state: {}", styled_state(record.run_state));
    println!("  status: {}", record.status);
    println!("  submitted: {}", or_dash(record.submitted_at));
    println!("  last check: {}", or_dash(record.checked_at));
    println!("  fetched: {}", or_dash(record.fetched_at));
    println!();

    let binary = match &record.package.binary_root {
        Some(root) => Path::new(root).join(&record.package.binary).display().to_string(),
        None => record.package.binary.clone(),
    };
    let r = &record.resources;
    println!("{}", style("Job").bold().underlined());
    println!("  package: {} {}", record.package.package, record.package.version);
    println!("  binary: {}", binary);
    println!("  cores: {}", r.cores);
    println!("  threads: {}", r.threads);
    println!("  queue: {}", or_dash(r.queue.as_ref()));
    println!("  nodes: {}", or_dash(r.nodes));
    println!("  cores per node: {}", or_dash(r.cores_per_node));
    println!("  mpi per node: {}", or_dash(r.mpi_per_node));
    println!("  max job run: {}", or_dash(r.max_job_run));
    println!("  max job submit: {}", or_dash(r.max_job_submit));
    println!("  max time: {}", or_dash(r.max_time.as_ref()));
    println!("  job name: {}", record.script.job_name);
    println!("  input: {}", or_dash(record.script.input.as_ref()));
    println!("  output: {}", record.script.output);
}
