use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use std::fs::OpenOptions;
use std::path::Path;

/// Routes `log` output to a file. The terminal belongs to the scene, so nothing is written to stderr.
pub fn init(level: &str, log_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .format_line_number(true)
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .context("logger already initialised")?;
    Ok(())
}
