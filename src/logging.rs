//! Console logging.
//!
//! Lines go to stdout as `HH:MM:SS [stream] message`. Per-request summaries
//! are logged under the [`REQUEST_TARGET`] target and show up as the
//! `[request]` stream; everything else is `[info]` or `[error]` by level.

use std::io::Write;

use env_logger::{fmt::Formatter, Builder, Env, Target};
use log::{Level, Record};

/// Log target of the one-line summary written for every dumped request.
pub const REQUEST_TARGET: &str = "request";

pub(crate) fn prefix(record: &Record<'_>) -> &'static str {
    match record.level() {
        Level::Error => "[error]   ",
        Level::Warn => "[warn]    ",
        Level::Info if record.target() == REQUEST_TARGET => "[request] ",
        Level::Info => "[info]    ",
        Level::Debug | Level::Trace => "[debug]   ",
    }
}

fn format(buf: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    writeln!(
        buf,
        "{} {}{}",
        chrono::Local::now().format("%H:%M:%S"),
        prefix(record),
        record.args()
    )
}

/// Logger writing the console format, filtered by `RUST_LOG` with `info` as
/// the default level. Output goes to stderr until a target is set.
pub fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(format);
    builder
}

/// Installs the console logger on stdout.
pub fn init() {
    builder().target(Target::Stdout).init();
}

#[cfg(test)]
mod tests {
    use log::{Level, Record};

    use super::*;

    fn prefixed(level: Level, target: &str) -> &'static str {
        prefix(
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("lol"))
                .build(),
        )
    }

    #[test]
    fn request_summaries_get_their_own_stream() {
        assert_eq!(prefixed(Level::Info, REQUEST_TARGET), "[request] ");
        assert_eq!(prefixed(Level::Info, "http_dump::bootstrap"), "[info]    ");
    }

    #[test]
    fn errors_are_prefixed_whatever_the_target() {
        assert_eq!(prefixed(Level::Error, REQUEST_TARGET), "[error]   ");
        assert_eq!(prefixed(Level::Error, "http_dump::dumper"), "[error]   ");
    }
}
