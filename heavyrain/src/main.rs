mod cli;
mod exit_codes;
mod logging;
mod output;
mod run;
mod run_error;
mod scenario;
mod scenario_yaml;
mod shutdown;

use clap::Parser;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    logging::init_logging(cli.verbose);

    let code = match cli.command {
        cli::Command::Run(args) => match run::run(args).await {
            Ok(code) => code.as_i32(),
            Err(err) => {
                eprintln!("error: {err}");
                err.exit_code().as_i32()
            }
        },
    };

    std::process::exit(code);
}
