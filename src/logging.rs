use std::{
    path::PathBuf,
    sync::{Mutex, Once, PoisonError},
};

use tracing::{info, metadata::LevelFilter, Level};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::*, EnvFilter};

/// The name log files start with. A date is appended on rotation.
pub const LOG_FILE_NAME: &str = "fsr-bridge.log";

/// Overrides the stdout level with a full filter directive, e.g. `fsr_bridge::serial=trace`.
pub const LOG_ENV: &str = "FSR_BRIDGE_LOG";

static INIT: Once = Once::new();

// Keeps the file writer thread alive until [`shutdown`].
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Where logs go.
#[derive(Debug, Clone)]
pub struct LogTargets {
    /// Level for the terminal, unless [`LOG_ENV`] says otherwise.
    pub stdout: Level,

    /// A daily rolling file in the given directory, at the given level.
    pub file: Option<(Level, PathBuf)>,
}

impl LogTargets {
    /// Log to stdout only.
    pub fn stdout(level: Level) -> Self {
        Self {
            stdout: level,
            file: None,
        }
    }

    /// Also log to a rolling file in `dir`, at the same level.
    pub fn with_dir(self, dir: Option<PathBuf>) -> Self {
        let file = dir.map(|dir| (self.stdout, dir));

        Self { file, ..self }
    }
}

fn install(targets: LogTargets) {
    let stdout_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from(targets.stdout).into()));

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(stdout_filter));

    #[cfg(feature = "use-tracy")]
    let registry = registry.with(tracing_tracy::TracyLayer::new().with_filter(LevelFilter::DEBUG));

    let file_layer = targets.file.as_ref().map(|(level, dir)| {
        let (writer, guard) = tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            dir,
            LOG_FILE_NAME,
        ));
        *FILE_GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);

        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(LevelFilter::from(*level))
    });

    // Someone else (a test harness) may have won.
    if registry.with(file_layer).try_init().is_ok() {
        info!(
            stdout = %targets.stdout,
            file = ?targets.file,
            tracy = cfg!(feature = "use-tracy"),
            "Logging initialized"
        );
    }
}

/// Initialize tracing.
///
/// Only the first call has an effect.
pub fn init(targets: LogTargets) {
    INIT.call_once(|| install(targets));
}

/// Flush the log file, if any.
pub fn shutdown() {
    let guard = FILE_GUARD.lock().unwrap_or_else(PoisonError::into_inner).take();

    if guard.is_some() {
        info!("Flushing log file");
    }
    drop(guard);
}
