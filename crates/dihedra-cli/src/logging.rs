use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Installs the global subscriber: compact records on stderr, plus plain text with
/// thread ids and targets in `log_file` when one is given.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let file = log_file.map(File::create).transpose()?;

    tracing_subscriber::registry()
        .with(level)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(file.map(file_layer))
        .init();
    Ok(())
}

fn file_layer<S>(file: File) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
}
