use anyhow::Result;
use clap::Args;
use console::style;

use jobshuttle::job::{HostEnvironment, Job, JobRequest, ScriptSettings};

use super::common::{current_dir, Context, HostArgs, SyncArgs};

#[derive(Args)]
#[command(about = "Generate a submission script for the current directory and submit it")]
pub struct SubmitCommand {
    #[command(flatten)]
    hosts: HostArgs,

    #[command(flatten)]
    sync: SyncArgs,

    /// Package installed on the server
    #[arg(short, long)]
    package: String,

    /// Package version (default: first listed)
    #[arg(long = "package-version")]
    package_version: Option<String>,

    /// Binary of the package (default: first listed)
    #[arg(short, long)]
    binary: Option<String>,

    #[arg(long, default_value = "1")]
    cores: u32,

    /// OpenMP threads per process
    #[arg(long = "omp", default_value = "1")]
    threads: u32,

    #[arg(short, long)]
    queue: Option<String>,

    /// Accounting group charged for the job
    #[arg(long)]
    budget: Option<String>,

    #[arg(short, long = "jobname", default_value = "job")]
    job_name: String,

    #[arg(short, long)]
    input: Option<String>,

    #[arg(short, long, default_value = "out.o")]
    output: String,

    /// Arguments placed before the binary
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    preoption: Vec<String>,

    /// Arguments placed after the binary
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    postoption: Vec<String>,

    /// Pass the input file as an argument instead of through stdin
    #[arg(long)]
    no_redirect: bool,

    /// Use the non-MPI script template
    #[arg(long)]
    nompi: bool,

    /// Only write the script and the job record
    #[arg(long)]
    script_only: bool,
}

fn joined(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

impl SubmitCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let cwd = current_dir()?;
        let transfer = ctx.data_transfer(&self.hosts.local, &self.hosts.client, &self.hosts.server)?;
        let env = HostEnvironment::for_host(&ctx.config, &self.hosts.server);

        let request = JobRequest {
            package: self.package.clone(),
            version: self.package_version.clone(),
            binary: self.binary.clone(),
            cores: self.cores,
            threads: self.threads,
            queue: self.queue.clone(),
            script: ScriptSettings {
                job_name: self.job_name.clone(),
                budget: self.budget.clone(),
                input: self.input.clone(),
                output: self.output.clone(),
                preoption: joined(&self.preoption),
                postoption: joined(&self.postoption),
                input_redirect: !self.no_redirect,
                nompi: self.nompi,
            },
            script_file: ctx.config.defaults.script_file.clone(),
        };

        let mut job = Job::prepare(&request, &env, transfer, ctx.store(&cwd))?.with_poll(ctx.poll());
        let template = env.template(&request.script)?;
        let script = job.generate_script(&template)?;
        println!("Generated {}", style(script.display()).cyan());
        if self.script_only {
            return Ok(());
        }

        let mut sync = self.sync.clone();
        if !sync.include.is_empty() {
            sync.include.push(request.script_file.clone());
            if let Some(input) = &self.input {
                sync.include.push(input.clone());
            }
        }
        let options = sync.options(&ctx.config.defaults);

        if job.submit(&cwd, &[], &options)? {
            match &job.record().job_number {
                Some(number) => println!(
                    "{} job {} on {}",
                    style("Submitted").green().bold(),
                    style(number).yellow(),
                    self.hosts.server
                ),
                None => println!("{} on {}", style("Submitted").green().bold(), self.hosts.server),
            }
        } else {
            println!(
                "{} the queue on {} is full; try again later",
                style("Not submitted:").red().bold(),
                self.hosts.server
            );
        }
        Ok(())
    }
}
