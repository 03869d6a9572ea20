//! Logging setup: env_logger with a compact colored format.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialize logging. Verbose turns on debug for this crate; dependencies stay
/// at warn. Safe to call once per process (the CLI entry point).
pub fn setup_logging(verbose: bool) {
    let our_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), our_level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            match record.level() {
                Level::Warn => writeln!(
                    buf,
                    "[{} {} {}] {}",
                    name,
                    "WARN".yellow(),
                    record.target().white(),
                    record.args()
                ),
                Level::Error => writeln!(
                    buf,
                    "[{} {} {}] {}",
                    name,
                    "ERROR".red(),
                    record.target().white(),
                    record.args()
                ),
                _ => writeln!(buf, "[{}] {}", name, record.args()),
            }
        })
        .init();
}
