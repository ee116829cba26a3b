//! Tracing setup for the server binary.
//!
//! The profile comes from `ROLLCALL_ENV`:
//!
//! | profile       | stdout                      | file                     |
//! |---------------|-----------------------------|--------------------------|
//! | `Interactive` | pretty, with span open/close | none                    |
//! | `Service`     | compact, no colour          | JSON, rotated every day  |
//!
//! `RUST_LOG` takes precedence over `ROLLCALL_LOG_LEVEL`; without either the
//! level is `info`.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Flush handles of the background writers; dropped only at exit.
static WRITER_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogProfile {
    /// A terminal session.
    Interactive,
    /// Under a service manager. Also writes daily files into `directory`.
    Service {
        /// Directory holding the `rollcall.*.log` files.
        directory: PathBuf,
    },
}

impl LogProfile {
    /// Pick the profile from `ROLLCALL_ENV`; `ROLLCALL_LOG_DIR` overrides the
    /// file directory of the service profile.
    #[must_use]
    pub fn from_env() -> Self {
        Self::select(
            env::var("ROLLCALL_ENV").ok().as_deref(),
            env::var_os("ROLLCALL_LOG_DIR").map(PathBuf::from),
        )
    }

    fn select(environment: Option<&str>, directory: Option<PathBuf>) -> Self {
        match environment {
            Some(name) if name.eq_ignore_ascii_case("production") => Self::Service {
                directory: directory.unwrap_or_else(default_directory),
            },
            _ => Self::Interactive,
        }
    }
}

/// Install the global subscriber for `profile`.
///
/// # Errors
///
/// Fails on an unparsable filter, an uncreatable log directory, or when a
/// global subscriber is already installed.
pub fn init(profile: &LogProfile) -> anyhow::Result<()> {
    let (layers, guards) = match profile {
        LogProfile::Interactive => (vec![terminal_layer()], Vec::new()),
        LogProfile::Service { directory } => service_layers(directory)?,
    };

    tracing_subscriber::registry()
        .with(level_filter()?)
        .with(layers)
        .try_init()?;

    let _ = WRITER_GUARDS.set(guards);
    Ok(())
}

fn level_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = env::var("ROLLCALL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    EnvFilter::try_new(&level).with_context(|| format!("Invalid ROLLCALL_LOG_LEVEL '{level}'"))
}

fn terminal_layer() -> BoxedLayer {
    fmt::layer()
        .pretty()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .boxed()
}

fn service_layers(directory: &Path) -> anyhow::Result<(Vec<BoxedLayer>, Vec<WorkerGuard>)> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let daily = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rollcall")
        .filename_suffix("log")
        .build(directory)?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(daily);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let layers = vec![
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        fmt::layer()
            .compact()
            .with_writer(stdout_writer)
            .with_ansi(false)
            .boxed(),
    ];
    Ok((layers, vec![file_guard, stdout_guard]))
}

fn default_directory() -> PathBuf {
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/rollcall");
    }
    directories::ProjectDirs::from("", "", "rollcall")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}
