// Elastic Pool CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Control commands (scale/stop/drain/status) arrive on stdin so a live pool can be rescaled.
// Design Decision: Support text/json/yaml output formats for the final run report.

mod commands;
mod control;
mod output;
mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use elastic_pool::{PoolConfig, DEFAULT_MORE_WORK_EXIT_CODE};

#[derive(Parser)]
#[command(name = "elastic-pool")]
#[command(about = "Elastic worker pool - keep N worker replicas alive and rescale them live")]
#[command(version)]
pub struct Cli {
    /// Output format for the run report
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Pool name (overrides ELASTIC_POOL_NAME)
    #[arg(long)]
    pub name: Option<String>,

    /// Initial replica count (overrides ELASTIC_POOL_REPLICAS)
    #[arg(long, short)]
    pub replicas: Option<usize>,

    /// Delay before a failed worker is replaced, in milliseconds
    /// (overrides ELASTIC_POOL_FAILURE_BACKOFF_MS)
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Ignore control commands on stdin
    #[arg(long)]
    pub no_control: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one OS process per replica
    Run {
        /// Exit code a worker uses to ask for another run
        #[arg(long, default_value_t = DEFAULT_MORE_WORK_EXIT_CODE)]
        more_work_exit_code: i32,

        /// Program and arguments to run for every replica
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run synthetic in-process workers
    Simulate {
        /// How long one execution takes, in milliseconds
        #[arg(long, default_value = "500")]
        work_ms: u64,

        /// Number of executions (pool-wide) that ask for more work
        #[arg(long, default_value = "10")]
        rounds: u32,

        /// Fail every N-th execution
        #[arg(long)]
        fail_every: Option<u32>,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        let mut config =
            PoolConfig::from_env().context("Invalid pool configuration in environment")?;
        if let Some(name) = &self.name {
            config = config.with_name(name.clone());
        }
        if let Some(replicas) = self.replicas {
            config = config.with_replicas(replicas);
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config = config.with_failure_backoff(std::time::Duration::from_millis(backoff_ms));
        }
        config.validate().context("Invalid pool configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init();

    let config = cli.pool_config()?;
    let output_format = output::OutputFormat::from_str(&cli.output);
    let control = !cli.no_control;

    match cli.command {
        Commands::Run {
            more_work_exit_code,
            command,
        } => commands::run::run(config, output_format, control, command, more_work_exit_code).await,
        Commands::Simulate {
            work_ms,
            rounds,
            fail_every,
        } => {
            commands::simulate::run(config, output_format, control, work_ms, rounds, fail_every)
                .await
        }
    }
}
