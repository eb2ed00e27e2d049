use std::fmt::Write;

use jiff::{Zoned, tz::TimeZone};
use log::{Level, Record};
use logforth::{
    append::Stderr,
    diagnostic::Diagnostic,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogStyle};

/// `<utc timestamp> <level>  <message>`, with the emitting module added on debug and trace lines.
#[derive(Debug, Clone, Copy)]
struct LineLayout {
    color: bool,
}

impl LineLayout {
    fn level(&self, level: Level) -> String {
        if !self.color {
            return format!("{level:>5}");
        }

        let code = match level {
            Level::Error => 31,
            Level::Warn => 33,
            Level::Info => 32,
            Level::Debug => 34,
            Level::Trace => 35,
        };

        format!("\x1b[{code}m{level:>5}\x1b[0m")
    }
}

impl Layout for LineLayout {
    fn format(&self, record: &Record<'_>, _diagnostics: &[Box<dyn Diagnostic>]) -> anyhow::Result<Vec<u8>> {
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        let mut line = String::new();
        write!(line, "{} {}  ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"), self.level(record.level()))?;

        if record.level() >= Level::Debug {
            write!(line, "{}: ", record.target())?;
        }

        write!(line, "{}", record.args())?;

        Ok(line.into_bytes())
    }
}

/// Logs go to stderr so that answers printed on stdout stay clean.
pub(super) fn init(args: &Args) -> anyhow::Result<()> {
    let filter = args.log_level.env_filter()?;

    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(filter);

            match args.log_style {
                LogStyle::Color => d.append(Stderr::default().with_layout(LineLayout { color: true })),
                LogStyle::Text => d.append(Stderr::default().with_layout(LineLayout { color: false })),
                LogStyle::Json => d.append(Stderr::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();

    Ok(())
}
