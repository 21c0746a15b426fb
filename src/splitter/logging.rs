//! Console and log-file sinks for the run log.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::splitter::config::LogLevel;
use crate::splitter::error::{Result, ToolError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Renders `[yyyy-MM-dd HH:mm:ss] [LEVEL] message key=value...`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now().format(TIMESTAMP_FORMAT);
        write!(writer, "[{now}] [{}] ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter admitting `level` and below, unless `directives` (the `RUST_LOG`
/// syntax) say otherwise.
pub fn env_filter(level: LogLevel, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .parse_lossy(directives)
}

/// Returns `true` once [`init`] has installed the global subscriber.
pub fn is_initialized() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

/// Installs the global subscriber: `level` unless `RUST_LOG` says otherwise,
/// echoed to stdout and appended to `log_path`.
pub fn init(level: LogLevel, log_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let filter = env_filter(level, &directives);

    let console = tracing_fmt::layer()
        .event_format(LineFormat)
        .with_writer(std::io::stdout);
    let log_file = tracing_fmt::layer()
        .event_format(LineFormat)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(log_file)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))?;
    INSTALLED.store(true, Ordering::Release);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDateTime;
    use tracing::{debug, info};
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(level: LogLevel, emit: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let subscriber = tracing_fmt()
            .event_format(LineFormat)
            .with_max_level(LevelFilter::from(level))
            .with_writer(buffer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn lines_carry_timestamp_and_level() {
        let output = capture(LogLevel::Info, || info!(groups = 3, "split complete"));
        let line = output.lines().next().expect("one line");

        assert!(line.starts_with('['));
        NaiveDateTime::parse_from_str(&line[1..20], TIMESTAMP_FORMAT).expect("timestamp");
        assert_eq!(&line[20..], "] [INFO] split complete groups=3");
    }

    #[test]
    fn configured_level_filters_more_verbose_events() {
        let output = capture(LogLevel::Info, || {
            debug!("hidden");
            info!("shown");
        });
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("[INFO] shown"));
    }

    #[test]
    fn filter_admits_the_configured_level() {
        assert_eq!(
            env_filter(LogLevel::Error, "").max_level_hint(),
            Some(LevelFilter::ERROR)
        );
        assert_eq!(
            env_filter(LogLevel::Info, "").max_level_hint(),
            Some(LevelFilter::INFO)
        );
        assert_eq!(
            env_filter(LogLevel::Debug, "").max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn environment_directives_override_the_configured_level() {
        assert_eq!(
            env_filter(LogLevel::Info, "warn").max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    fn log_file_is_created() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let path = dir.path().join("run.log");
        let installed = init(LogLevel::Debug, &path).is_ok();
        assert!(path.exists());
        assert_eq!(is_initialized(), installed);
    }
}
