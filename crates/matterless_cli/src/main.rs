use std::process::ExitCode;

use clap::Parser;
use matterless_cli::args::Args;
use matterless_cli::tracing_setup;

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_setup::init_global(args.verbose);

    match matterless_cli::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("matterless: {error:#}");
            ExitCode::FAILURE
        }
    }
}
