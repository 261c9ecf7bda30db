// Run command: one OS process per replica

use std::sync::Arc;

use anyhow::{bail, Result};
use elastic_pool::{
    InMemoryMetrics, PoolConfig, PoolMetrics, PoolSupervisor, ProcessLauncher,
    ProcessLauncherConfig,
};

use crate::output::OutputFormat;

pub async fn run(
    config: PoolConfig,
    format: OutputFormat,
    control: bool,
    command: Vec<String>,
    more_work_exit_code: i32,
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("No worker program given");
    };

    let metrics = Arc::new(InMemoryMetrics::new());
    let launcher = ProcessLauncher::new(
        ProcessLauncherConfig::new(program.as_str())
            .with_args(args)
            .with_more_work_exit_code(more_work_exit_code),
    )
    .with_metrics(Arc::clone(&metrics) as Arc<dyn PoolMetrics>);

    let supervisor = PoolSupervisor::new(config, Arc::new(launcher))
        .with_metrics(Arc::clone(&metrics) as Arc<dyn PoolMetrics>);

    super::drive(Arc::new(supervisor), metrics, format, control).await
}
