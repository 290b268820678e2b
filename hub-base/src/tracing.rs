// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log output of the hub binaries.
//!
//! The environment drives everything:
//! - `RUST_LOG` filters events, at INFO level by default;
//! - `RUST_LOG_FORMAT` picks `plain`, `json` or `pretty` output;
//! - `RUST_LOG_SPAN_EVENTS` lists span events to log, e.g. `new,close`;
//! - `NO_COLOR` disables colours, which are also off when stderr is not a terminal;
//! - `HUB_LOG_DIR` adds a copy of the output in `<HUB_LOG_DIR>/<log_name>.log`.

use std::{
    env,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use is_terminal::IsTerminal as _;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{
        self,
        format::{FmtSpan, Format, Full},
        time::FormatTime,
        FormatFields, MakeWriter,
    },
    layer::{Layer, SubscriberExt as _},
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter,
};

/// The shape of log lines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
    Pretty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log format {0:?}, expected `plain`, `json` or `pretty`")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(UnknownLogFormat(other.to_owned())),
        }
    }
}

/// Logging settings read from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub span_events: FmtSpan,
    pub color: bool,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Reads the settings of a binary logging under `log_name`.
    ///
    /// An unknown format falls back to plain output with a notice on stderr.
    pub fn from_env(log_name: &str) -> Self {
        let format = match env::var("RUST_LOG_FORMAT") {
            Ok(value) => value.parse().unwrap_or_else(|error| {
                eprintln!("{error}; using plain logs");
                LogFormat::Plain
            }),
            Err(_) => LogFormat::Plain,
        };
        let span_events = env::var("RUST_LOG_SPAN_EVENTS")
            .map(|events| span_events(&events))
            .unwrap_or(FmtSpan::NONE);
        let no_color = env::var("NO_COLOR").is_ok_and(|value| !value.is_empty());
        let file = env::var_os("HUB_LOG_DIR").map(|directory| {
            let mut path = PathBuf::from(directory).join(log_name);
            path.set_extension("log");
            path
        });
        LogSettings {
            format,
            span_events,
            color: !no_color && std::io::stderr().is_terminal(),
            file,
        }
    }
}

/// Installs the global subscriber of a binary logging under `log_name`.
pub fn init(log_name: &str) {
    let settings = LogSettings::from_env(log_name);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let stderr = with_format(
        settings.format,
        fmt::layer()
            .with_span_events(settings.span_events.clone())
            .with_writer(std::io::stderr)
            .with_ansi(settings.color),
    );
    let file = settings.file.as_deref().and_then(open_append).map(|file| {
        with_format(
            settings.format,
            fmt::layer()
                .with_span_events(settings.span_events.clone())
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file)
        .with(stderr)
        .init();
}

fn open_append(path: &Path) -> Option<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|error| eprintln!("cannot log to {}: {error}", path.display()))
        .ok()
}

fn with_format<S, N, W, T>(
    format: LogFormat,
    layer: fmt::Layer<S, N, Format<Full, T>, W>,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    N: for<'writer> FormatFields<'writer> + Send + Sync + 'static,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    T: FormatTime + Send + Sync + 'static,
{
    match format {
        LogFormat::Plain => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    }
}

/// Parses a comma-separated list of span events. Unknown names are ignored.
pub fn span_events(events: &str) -> FmtSpan {
    events
        .split(',')
        .map(|event| match event.trim() {
            "new" => FmtSpan::NEW,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "close" => FmtSpan::CLOSE,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        })
        .fold(FmtSpan::NONE, |all, event| all | event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_by_name() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!(
            "yaml".parse::<LogFormat>(),
            Err(UnknownLogFormat("yaml".to_owned()))
        );
    }

    #[test]
    fn span_events_combine() {
        assert_eq!(span_events("new, close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(span_events("bogus"), FmtSpan::NONE);
    }
}
