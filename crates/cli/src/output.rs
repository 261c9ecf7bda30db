// Output formatting for CLI

use anyhow::Result;
use elastic_pool::{CompletedWorker, Outcome, PoolSnapshot, RunResult, RunSummary};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(rendered) = self.render(value)? {
            println!("{}", rendered);
        }
        Ok(())
    }

    /// Structured rendering; `None` for text, which each caller formats itself
    pub fn render<T: Serialize>(&self, value: &T) -> Result<Option<String>> {
        Ok(match self {
            OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
            OutputFormat::Text => None,
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Final report of one pool run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub pool: &'a str,
    /// Set when the run was cut short by a launch error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub summary: RunSummary,
    pub workers: &'a [CompletedWorker],
}

impl<'a> RunReport<'a> {
    pub fn new(pool: &'a str, result: &'a RunResult) -> Self {
        Self {
            pool,
            aborted: None,
            summary: result.summary(),
            workers: result.workers(),
        }
    }

    pub fn aborted(mut self, reason: impl Into<String>) -> Self {
        self.aborted = Some(reason.into());
        self
    }
}

pub fn print_report(format: OutputFormat, report: &RunReport<'_>) -> Result<()> {
    if !format.is_text() {
        return format.print_value(report);
    }

    print_field("Pool", report.pool);
    if let Some(reason) = &report.aborted {
        print_field("Aborted", reason);
    }
    print_field("Workers", &report.summary.total.to_string());
    print_field("Succeeded", &report.summary.succeeded.to_string());
    print_field("Failed", &report.summary.failed.to_string());
    print_field("Cancelled", &report.summary.cancelled.to_string());

    if report.workers.is_empty() {
        return Ok(());
    }

    println!();
    let columns = [("WORKER", 43), ("STARTED", 24), ("OUTCOME", 40)];
    print_table_header(&columns);
    for worker in report.workers {
        let id = worker.id.to_string();
        let started = worker.started_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let outcome = describe_outcome(&worker.outcome);
        print_table_row(&[(id.as_str(), 43), (started.as_str(), 24), (outcome.as_str(), 40)]);
    }
    Ok(())
}

pub fn print_snapshot(format: OutputFormat, snapshot: &PoolSnapshot) -> Result<()> {
    // The report owns stdout; live status goes to stderr
    match format.render(snapshot)? {
        Some(rendered) => eprintln!("{}", rendered),
        None => eprintln!(
            "status={:?} desired={} active={} running={}",
            snapshot.status, snapshot.desired.replicas, snapshot.desired.active, snapshot.running
        ),
    }
    Ok(())
}

pub fn describe_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success { more_work: true } => "success (more work)".to_string(),
        Outcome::Success { more_work: false } => "success".to_string(),
        Outcome::Failure(err) => format!("failure: {}", err),
        Outcome::Cancelled => "cancelled".to_string(),
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_defaults_to_text() {
        assert_eq!(OutputFormat::from_str("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("yaml"), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_str("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(describe_outcome(&Outcome::success(true)), "success (more work)");
        assert_eq!(describe_outcome(&Outcome::Cancelled), "cancelled");
        assert_eq!(describe_outcome(&Outcome::failure("boom")), "failure: boom");
    }

    #[test]
    fn test_report_json_shape() {
        let result = RunResult::new();
        let report = RunReport::new("alerts", &result).aborted("launch failed");
        let rendered = OutputFormat::Json.render(&report).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["pool"], "alerts");
        assert_eq!(value["aborted"], "launch failed");
        assert_eq!(value["summary"]["total"], 0);
        assert!(value["workers"].as_array().unwrap().is_empty());
        assert!(OutputFormat::Text.render(&report).unwrap().is_none());
    }
}
