//! Tracing subscriber setup shared by the compute binaries.
//!
//! Behaviour is driven entirely by environment variables so that operators
//! can switch format or destination without touching configuration files:
//!
//! * `LOG_LEVEL` - default filter directive when `RUST_LOG` is unset (`info`)
//! * `LOG_FORMAT` - `human` or `json`
//! * `LOG_OUTPUT` - `console`, `file` or `both`
//! * `LOG_FILE_PATH` - file used when logging to disk (`/tmp/compute.log`)

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/compute.log";

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    /// No formatting layer; filters still apply.
    Silent,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" => LogOutput::Console,
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Silent,
        }
    }

    fn to_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            output: LogOutput::Console,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: lookup("LOG_LEVEL").unwrap_or(defaults.level),
            json: lookup("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json),
            output: lookup("LOG_OUTPUT")
                .map(|o| LogOutput::parse(&o))
                .unwrap_or(defaults.output),
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in ["hyper=warn", "reqwest=warn", "tokio=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    fn file_location(&self) -> (&Path, &std::ffi::OsStr) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/tmp"));
        let name = self
            .file_path
            .file_name()
            .unwrap_or_else(|| "compute.log".as_ref());
        (dir, name)
    }
}

/// Writes every buffer to both the console and the log file.
struct DualWriter<C, F> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> Write for DualWriter<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let console = self.console.write(buf);
        let file = self.file.write(buf);
        console.or(file)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

#[derive(Clone)]
struct MakeDualWriter<C, F> {
    console: C,
    file: F,
}

impl<'a, C, F> MakeWriter<'a> for MakeDualWriter<C, F>
where
    C: MakeWriter<'a>,
    F: MakeWriter<'a>,
{
    type Writer = DualWriter<C::Writer, F::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        DualWriter {
            console: self.console.make_writer(),
            file: self.file.make_writer(),
        }
    }
}

/// Install the global subscriber described by the environment.
///
/// The returned guard must be held for the lifetime of the process when file
/// output is enabled, otherwise buffered lines are dropped on exit.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

/// Install the global subscriber described by `settings`.
pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(settings.env_filter());

    macro_rules! install {
        ($writer:expr) => {{
            let layer = tracing_subscriber::fmt::layer().with_writer($writer);
            if settings.json {
                let _ = subscriber.with(layer.json()).try_init();
            } else {
                let _ = subscriber.with(layer).try_init();
            }
        }};
    }

    if !settings.output.to_file() {
        if settings.output.to_console() {
            install!(io::stderr);
        } else {
            let _ = subscriber.try_init();
        }
        return None;
    }

    let (dir, name) = settings.file_location();
    let appender = tracing_appender::rolling::daily(dir, name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    if settings.output.to_console() {
        install!(MakeDualWriter {
            console: io::stderr,
            file: file_writer,
        });
    } else {
        install!(file_writer);
    }

    Some(guard)
}
