#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::process::ExitCode;

use provision_dl::cli::{self, Command};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match cli::parse_args(env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            cli::print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            cli::print_usage();
            return ExitCode::from(2);
        }
    };

    match cli::run(args).await {
        Ok(stats) if stats.files_failed > 0 => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
