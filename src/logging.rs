use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::vector::TARGET_VECTOR;

const DEFAULT_STDOUT_FILTER: &str = "info,pipeline=info,consensus=info,orphans=info,duplicates=info";
const DEFAULT_FILE_FILTER: &str = "info,consensus=debug,orphans=debug,duplicates=debug";

/// Installs the global subscriber: stdout plus a daily rolling file in `log_dir`
///
/// `QUORUM_LOG` overrides the stdout filter with the usual `EnvFilter` syntax.
///
/// # Returns
/// * `Ok(())` - If the subscriber was installed
/// * `Err` - If a global subscriber is already set
pub fn configure_logging(log_dir: impl AsRef<Path>) -> anyhow::Result<()> {
    // Per-artifact embedding lines only go to the file
    let quiet_embeddings = FilterFn::new(|metadata| {
        !(metadata.level() == &Level::DEBUG && metadata.target() == TARGET_VECTOR)
    });

    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(
            EnvFilter::try_from_env("QUORUM_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER)),
        )
        .with_filter(quiet_embeddings);

    let file_appender = rolling::daily(log_dir.as_ref(), "quorum.log");
    let file_log = fmt::layer()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(EnvFilter::new(DEFAULT_FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .try_init()?;
    Ok(())
}
