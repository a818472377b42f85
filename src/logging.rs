use crate::errors::{DriverError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `<prefix>_<tender>_<YYYYmmdd_HHMMSS>.log`
pub fn job_log_name(prefix: &str, tender: &str) -> String {
    format!(
        "{}_{}_{}.log",
        prefix,
        tender,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Console output goes to stderr; stdout carries only the run outcome.
/// With `file`, everything is mirrored into that log file as well. Keep the
/// returned guard alive until exit or buffered lines are lost.
pub fn init(default_level: &str, file: Option<(&Path, &str)>) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    match file {
        Some((dir, name)) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .map_err(|e| DriverError::ConfigurationError(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .try_init()
                .map_err(|e| DriverError::ConfigurationError(e.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_log_name_shape() {
        let name = job_log_name("postulacion", "1057-22-LE24");
        assert!(name.starts_with("postulacion_1057-22-LE24_"));
        assert!(name.ends_with(".log"));
        // prefix + tender + 15-char timestamp + extension
        assert_eq!(name.len(), "postulacion_1057-22-LE24_".len() + 15 + 4);
    }
}
