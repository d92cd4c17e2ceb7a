use std::time::Duration;

use heavyrain_core::{ExecutionSummary, HttpProfiler, RunPlan};

use crate::cli::OutputFormat;

mod format;
mod json;
mod table;

pub(crate) struct RunHeader<'a> {
    pub scenario: &'a str,
    pub base_uri: &'a str,
    pub plan: &'a RunPlan,
}

pub(crate) struct Report<'a> {
    pub scenario: &'a str,
    pub profiler: &'a HttpProfiler,
    pub summary: ExecutionSummary,
    pub elapsed: Duration,
}

pub(crate) trait Reporter: Send + Sync {
    fn print_header(&self, header: &RunHeader<'_>);
    fn report(&self, report: &Report<'_>) -> anyhow::Result<()>;
}

pub(crate) fn reporter(format: OutputFormat) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Table => Box::new(table::TableReporter),
        OutputFormat::Json => Box::new(json::JsonReporter),
    }
}
