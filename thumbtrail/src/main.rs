use clap::{ColorChoice, Parser};
use colored::Colorize;
use std::{
    io::{IsTerminal, stderr},
    process,
};
use thumbtrail::{Args, Logger};
use thumbtrail_core::CancelFlag;

static LOGGER: Logger = Logger;

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    colored::control::set_override(match args.color {
        ColorChoice::Always => true,
        ColorChoice::Auto => stderr().is_terminal(),
        ColorChoice::Never => false,
    });

    log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("{e}"))?;
    log::set_max_level(args.log_level());

    let cancel = CancelFlag::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("Stopping after the current segment or sample");
        handler.cancel();
    })?;

    args.execute(cancel)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".bold().red(), e);
        process::exit(1);
    }
}
