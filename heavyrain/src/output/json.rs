use std::io::Write as _;

use anyhow::Context as _;
use serde::Serialize;

use heavyrain_core::{GroupStats, HttpResult, RecordedException};

use super::{Report, Reporter, RunHeader};

pub(crate) struct JsonReporter;

impl Reporter for JsonReporter {
    fn print_header(&self, _header: &RunHeader<'_>) {}

    fn report(&self, report: &Report<'_>) -> anyhow::Result<()> {
        let groups = report.profiler.aggregate();
        let results = report.profiler.all_results();
        let exceptions = report.profiler.exceptions();
        let doc = build_document(report, &groups, &results, &exceptions);

        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &doc).context("failed to serialize report")?;
        writeln!(out).context("failed to write to stdout")?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonReport<'a> {
    pub scenario: &'a str,
    pub elapsed_ms: f64,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub groups: Vec<JsonGroup<'a>>,
    pub results: Vec<&'a HttpResult>,
    pub exceptions: &'a [RecordedException],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonGroup<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub count: u64,
    pub failures: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub average_ms: f64,
}

impl<'a> From<&'a GroupStats> for JsonGroup<'a> {
    fn from(g: &'a GroupStats) -> Self {
        Self {
            method: &g.key.method,
            path: &g.key.path_tag,
            count: g.stats.count,
            failures: g.failures,
            min_ms: ms(g.stats.min),
            max_ms: ms(g.stats.max),
            median_ms: ms(g.stats.median),
            average_ms: ms(g.stats.mean),
        }
    }
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub(crate) fn build_document<'a>(
    report: &Report<'a>,
    groups: &'a [GroupStats],
    results: &'a [std::sync::Arc<HttpResult>],
    exceptions: &'a [RecordedException],
) -> JsonReport<'a> {
    JsonReport {
        scenario: report.scenario,
        elapsed_ms: ms(report.elapsed),
        iterations: report.summary.iterations,
        failed_iterations: report.summary.failed_iterations,
        groups: groups.iter().map(JsonGroup::from).collect(),
        results: results.iter().map(|r| r.as_ref()).collect(),
        exceptions,
    }
}
