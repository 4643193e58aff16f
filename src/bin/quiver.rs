//! Quiver CLI binary.

use std::io::Write;
use std::process;

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use quiver::cli::args::QuiverArgs;
use quiver::cli::commands::execute_command;

fn main() {
    let args = QuiverArgs::parse();

    let log_level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(args: QuiverArgs) -> anyhow::Result<()> {
    let config = args.config.clone();
    execute_command(args).with_context(|| match config {
        Some(path) => format!("using codec configuration {}", path.display()),
        None => "using the default codec configuration".to_string(),
    })
}
