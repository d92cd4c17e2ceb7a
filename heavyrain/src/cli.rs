use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr as _;
use std::time::Duration;

use heavyrain_core::ExecutorKind;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_runner(input: &str) -> Result<ExecutorKind, String> {
    ExecutorKind::from_str(input.trim())
        .map_err(|_| format!("invalid runner '{input}' (expected once, sync or concurrent)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned tables on stdout.
    Table,
    /// One JSON document on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "heavyrain",
    author,
    version,
    about = "Scenario-driven HTTP load testing",
    long_about = "heavyrain replays a scenario (a YAML list of HTTP requests and assertions) against a target, once or in a loop, with one or many virtual users.\n\nEvery request is profiled and aggregated by method and path tag; failed assertions are reported, they do not fail the process.",
    after_help = "Examples:\n  heavyrain run scenario.yaml http://localhost:8080\n  heavyrain run scenario.yaml http://localhost:8080 --runner concurrent --users 20 --duration 30s\n  heavyrain run scenario.yaml https://staging.local --no-verify --output json"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). HEAVYRAIN_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario against a target
    #[command(
        long_about = "Run a scenario file against a base URI.\n\nCLI flags override values from the scenario's `options` section."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario file (.yaml)
    pub scenario: PathBuf,

    /// Base URI every request path is resolved against (http or https)
    #[arg(env = "HEAVYRAIN_BASE_URI")]
    pub base_uri: String,

    /// Execution strategy: once, sync or concurrent
    #[arg(long, value_parser = parse_runner)]
    pub runner: Option<ExecutorKind>,

    /// Number of virtual users (concurrent runner)
    #[arg(long)]
    pub users: Option<u64>,

    /// Total iterations across all users (sync and concurrent runners)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Stop starting iterations after this long (e.g. 10s, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Spread virtual user start times over this window
    #[arg(long, value_parser = parse_duration)]
    pub ramp_up: Option<Duration>,

    /// Per-request timeout in seconds (0 disables)
    #[arg(long, value_name = "SEC", allow_negative_numbers = true)]
    pub timeout: Option<f64>,

    /// Pause after every response, in seconds
    #[arg(long, value_name = "SEC", allow_negative_numbers = true)]
    pub wait_after_request: Option<f64>,

    /// Pause after every scenario iteration, in seconds
    #[arg(long, value_name = "SEC", allow_negative_numbers = true)]
    pub wait_after_scenario: Option<f64>,

    /// Accept any TLS certificate
    #[arg(long)]
    pub no_verify: bool,

    /// Extra header sent with every request (repeatable, NAME:VALUE)
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// User-Agent sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_all_flags() {
        let parsed = Cli::try_parse_from([
            "heavyrain",
            "-v",
            "run",
            "scenario.yaml",
            "http://localhost:8080",
            "--runner",
            "async",
            "--users",
            "5",
            "--iterations",
            "100",
            "--duration",
            "30s",
            "--ramp-up",
            "5s",
            "--timeout",
            "2.5",
            "--wait-after-request",
            "0.1",
            "--wait-after-scenario=1",
            "--no-verify",
            "-H",
            "X-Env: ci",
            "--header",
            "Authorization: Bearer t",
            "--user-agent",
            "bot/1",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(cli.verbose, 1);

        let Command::Run(args) = cli.command;
        assert_eq!(args.scenario, PathBuf::from("scenario.yaml"));
        assert_eq!(args.base_uri, "http://localhost:8080");
        assert_eq!(args.runner, Some(ExecutorKind::Concurrent));
        assert_eq!(args.users, Some(5));
        assert_eq!(args.iterations, Some(100));
        assert_eq!(args.duration, Some(Duration::from_secs(30)));
        assert_eq!(args.ramp_up, Some(Duration::from_secs(5)));
        assert_eq!(args.timeout, Some(2.5));
        assert_eq!(args.wait_after_request, Some(0.1));
        assert_eq!(args.wait_after_scenario, Some(1.0));
        assert!(args.no_verify);
        assert_eq!(args.headers, vec!["X-Env: ci", "Authorization: Bearer t"]);
        assert_eq!(args.user_agent.as_deref(), Some("bot/1"));
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn cli_defaults() {
        let parsed = Cli::try_parse_from(["heavyrain", "run", "s.yaml", "http://localhost"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        let Command::Run(args) = cli.command;
        assert_eq!(args.runner, None);
        assert!(!args.no_verify);
        assert_eq!(args.output, OutputFormat::Table);
    }

    #[test]
    fn negative_timeout_parses_and_is_left_to_config_validation() {
        let parsed = Cli::try_parse_from([
            "heavyrain",
            "run",
            "s.yaml",
            "http://localhost",
            "--timeout",
            "-1",
        ]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        let Command::Run(args) = cli.command;
        assert_eq!(args.timeout, Some(-1.0));
    }

    #[test]
    fn unknown_runner_is_rejected() {
        assert!(
            Cli::try_parse_from([
                "heavyrain",
                "run",
                "s.yaml",
                "http://localhost",
                "--runner",
                "parallel",
            ])
            .is_err()
        );
    }
}
