use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;

use heavyrain_core::{
    CancellationToken, Executor as _, ExecutorConfig, ExecutorKind, HttpProfiler, RunPlan,
    SessionFactory, build_executor,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output::{self, Report, RunHeader};
use crate::run_error::RunError;
use crate::scenario;
use crate::scenario_yaml::{self, OptionsYaml};
use crate::shutdown;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let doc = scenario_yaml::load(&args.scenario)
        .await
        .map_err(RunError::InvalidInput)?;
    let name = doc.display_name(&args.scenario);

    let plan = resolve_plan(&args, &doc.options).map_err(RunError::InvalidInput)?;
    let config = resolve_config(&args, &doc.options).map_err(RunError::InvalidInput)?;
    let scenario = scenario::compile(doc).map_err(RunError::InvalidInput)?;

    let profiler = Arc::new(HttpProfiler::new());
    let factory = SessionFactory::new(Arc::new(config), profiler.clone())
        .context("failed to create HTTP client")
        .map_err(RunError::RuntimeError)?;
    let base_uri = factory.config().base_uri().to_string();

    let executor = build_executor(&plan, scenario, factory)
        .context("invalid run options")
        .map_err(RunError::InvalidInput)?;

    let reporter = output::reporter(args.output);
    reporter.print_header(&RunHeader {
        scenario: &name,
        base_uri: &base_uri,
        plan: &plan,
    });

    let token = CancellationToken::new();
    let signals = shutdown::spawn_signal_handler(token.clone());

    tracing::info!(scenario = %name, runner = %plan.kind, users = plan.users, "run starting");
    let started = Instant::now();
    let summary = executor.execute(&token).await;
    let elapsed = started.elapsed();
    signals.abort();
    tracing::info!(
        iterations = summary.iterations,
        failed = summary.failed_iterations,
        elapsed_ms = elapsed.as_millis() as u64,
        cancelled = token.is_cancelled(),
        "run finished"
    );

    reporter
        .report(&Report {
            scenario: &name,
            profiler: &profiler,
            summary,
            elapsed,
        })
        .context("failed to write report")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::Success)
}

fn resolve_plan(args: &RunArgs, options: &OptionsYaml) -> anyhow::Result<RunPlan> {
    let kind = match (args.runner, options.runner.as_deref()) {
        (Some(kind), _) => kind,
        (None, Some(raw)) => ExecutorKind::from_str(raw.trim()).map_err(|_| {
            anyhow::anyhow!("invalid runner `{raw}` (expected once, sync or concurrent)")
        })?,
        (None, None) => ExecutorKind::default(),
    };

    Ok(RunPlan {
        kind,
        users: args.users.or(options.users).unwrap_or(1),
        iterations: args.iterations.or(options.iterations),
        duration: args
            .duration
            .or(options.duration.map(|d| d.into_inner())),
        ramp_up: args.ramp_up.or(options.ramp_up.map(|d| d.into_inner())),
    })
}

fn resolve_config(args: &RunArgs, options: &OptionsYaml) -> anyhow::Result<ExecutorConfig> {
    let mut builder = ExecutorConfig::builder(args.base_uri.trim());

    if let Some(secs) = args.timeout.or(options.timeout) {
        builder = builder.timeout_secs(secs);
    }
    if let Some(secs) = args.wait_after_request.or(options.wait_after_request) {
        builder = builder.wait_after_request_secs(secs);
    }
    if let Some(secs) = args.wait_after_scenario.or(options.wait_after_scenario) {
        builder = builder.wait_after_scenario_secs(secs);
    }

    let verify_tls = !args.no_verify && options.verify_tls.unwrap_or(true);
    builder = builder.verify_tls(verify_tls);

    if let Some(ua) = args.user_agent.as_ref().or(options.user_agent.as_ref()) {
        builder = builder.user_agent(ua.as_str());
    }

    for (name, value) in merge_headers(options, &args.headers)? {
        builder = builder.default_header(name, value);
    }

    Ok(builder.build()?)
}

/// File headers first; a CLI header with the same name (any case) replaces it.
fn merge_headers(options: &OptionsYaml, cli: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = options
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for raw in cli {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("invalid header `{raw}` (expected NAME:VALUE)"))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("invalid header `{raw}` (empty name)");
        }
        out.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        out.push((name.to_string(), value.trim().to_string()));
    }

    Ok(out)
}
