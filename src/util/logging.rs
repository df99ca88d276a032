use env_logger::Builder;
use log::{LevelFilter, Record};
use std::fmt::Display;
use std::io::{self, Write};

use crate::config::LogLevel;

/// Map a configured level onto the `log` filter
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Write one `<time> [LEVEL] - message` line
fn write_line<W: Write + ?Sized>(
    out: &mut W,
    time: impl Display,
    record: &Record,
) -> io::Result<()> {
    writeln!(out, "{} [{}] - {}", time, record.level(), record.args())
}

/// Initialize the logging system
pub fn init(level: LogLevel) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            write_line(buf, chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), record)
        })
        .filter(None, level_filter(level))
        .init();
}
