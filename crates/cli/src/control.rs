// Live control commands read from stdin
//
// Design Decision: stdin is read on a plain OS thread; a blocking read inside the
// tokio runtime would keep it from shutting down once the pool has stopped.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use elastic_pool::PoolSupervisor;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::output::{self, OutputFormat};

/// One line of operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// `scale <n>`
    Scale(i64),
    /// `stop`
    Stop,
    /// `drain`
    Drain,
    /// `status`
    Status,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (expected scale <n>, stop, drain or status)")]
    Unknown(String),

    #[error("scale expects one integer argument, got: {0:?}")]
    BadReplicas(String),
}

impl FromStr for ControlCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ParseCommandError::Empty)?;
        let rest: Vec<&str> = parts.collect();

        match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("scale", [n]) => n
                .parse()
                .map(ControlCommand::Scale)
                .map_err(|_| ParseCommandError::BadReplicas(rest.join(" "))),
            ("scale", _) => Err(ParseCommandError::BadReplicas(rest.join(" "))),
            ("stop", []) => Ok(ControlCommand::Stop),
            ("drain", []) => Ok(ControlCommand::Drain),
            ("status", []) => Ok(ControlCommand::Status),
            _ => Err(ParseCommandError::Unknown(line.trim().to_string())),
        }
    }
}

/// Forward stdin lines to a channel until EOF
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("elastic-pool-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start stdin reader, control commands disabled");
    }
    rx
}

/// Apply commands from `lines` to `supervisor` until the channel closes
pub async fn listen(
    supervisor: Arc<PoolSupervisor>,
    mut lines: mpsc::UnboundedReceiver<String>,
    format: OutputFormat,
) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ControlCommand>() {
            Ok(command) => apply(&supervisor, command, format),
            Err(e) => warn!(error = %e, "Ignoring control command"),
        }
    }
}

pub fn apply(supervisor: &PoolSupervisor, command: ControlCommand, format: OutputFormat) {
    let result = match command {
        ControlCommand::Scale(n) => supervisor.scale(n),
        ControlCommand::Stop => supervisor.stop(),
        ControlCommand::Drain => supervisor.drain(),
        ControlCommand::Status => {
            if let Err(e) = output::print_snapshot(format, &supervisor.snapshot()) {
                warn!(error = %e, "Failed to render pool status");
            }
            return;
        }
    };

    match result {
        Ok(()) => info!(?command, "Control command applied"),
        Err(e) => warn!(?command, error = %e, "Control command rejected"),
    }
}
