use std::fmt::Write as _;
use std::io::Write as _;

use anyhow::Context as _;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, Table};

use super::format::{format_duration, format_ms, one_line};
use super::{Report, Reporter, RunHeader};

const MESSAGE_WIDTH: usize = 80;
const BODY_WIDTH: usize = 60;

pub(crate) struct TableReporter;

impl Reporter for TableReporter {
    fn print_header(&self, header: &RunHeader<'_>) {
        let plan = header.plan;
        println!("scenario: {}", header.scenario);
        println!("target: {}", header.base_uri);
        let mut line = format!("runner: {} users={}", plan.kind, plan.users);
        if let Some(n) = plan.iterations {
            write!(&mut line, " iterations={n}").ok();
        }
        if let Some(d) = plan.duration {
            write!(&mut line, " duration={}", format_duration(d)).ok();
        }
        if let Some(d) = plan.ramp_up {
            write!(&mut line, " ramp_up={}", format_duration(d)).ok();
        }
        println!("{line}");
        println!();
    }

    fn report(&self, report: &Report<'_>) -> anyhow::Result<()> {
        let rendered = render(report);
        let mut out = std::io::stdout().lock();
        out.write_all(rendered.as_bytes())
            .and_then(|()| out.flush())
            .context("failed to write to stdout")
    }
}

pub(crate) fn render(report: &Report<'_>) -> String {
    let mut out = String::new();

    let groups = report.profiler.aggregate();
    if groups.is_empty() {
        out.push_str("no requests recorded\n");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            "Method", "Path", "Count", "Failed", "Min", "Max", "Median", "Average",
        ]);
        for g in &groups {
            table.add_row(vec![
                g.key.method.clone(),
                g.key.path_tag.clone(),
                g.stats.count.to_string(),
                g.failures.to_string(),
                format_ms(g.stats.min),
                format_ms(g.stats.max),
                format_ms(g.stats.median),
                format_ms(g.stats.mean),
            ]);
        }
        for index in 2..8 {
            if let Some(column) = table.column_mut(index) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }
        writeln!(&mut out, "{table}").ok();
        out.push_str("(latencies in ms)\n");
    }

    let exceptions = report.profiler.exceptions();
    if !exceptions.is_empty() {
        out.push('\n');
        writeln!(&mut out, "exceptions: {}", exceptions.len()).ok();
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Class", "Path", "Message", "Body"]);
        for e in &exceptions {
            table.add_row(vec![
                e.class().to_string(),
                e.path().unwrap_or("-").to_string(),
                one_line(e.message(), MESSAGE_WIDTH),
                e.body_excerpt
                    .as_deref()
                    .map_or_else(|| "-".to_string(), |b| one_line(b, BODY_WIDTH)),
            ]);
        }
        writeln!(&mut out, "{table}").ok();
    }

    out.push('\n');
    writeln!(
        &mut out,
        "{}: {} iterations ({} failed) in {}",
        report.scenario,
        report.summary.iterations,
        report.summary.failed_iterations,
        format_duration(report.elapsed)
    )
    .ok();

    out
}
