//! # Logging Setup
//!
//! Installs a `fern` dispatcher as the `log` backend: every record goes to
//! stdout and to a timestamped file in the log directory. Older log files of
//! the same program are deleted at startup so the directory holds the
//! previous run and the current one only.

use std::fs;
use std::path::Path;

use log::LevelFilter;
use thiserror::Error;

/// # Logger Error
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory or file could not be prepared.
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// A logger was already installed.
    #[error("A logger is already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Maps a level name to a filter. Unknown names mean `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" | "fatal" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Installs the global logger.
///
/// Log files are named `<program>_<local time>.log`.
pub fn setup_logging(log_dir: &Path, program: &str, level: &str) -> Result<(), LoggerError> {
    fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir, program)?;

    let log_file_name = format!("{}_{}.log", program, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(level))
        .chain(std::io::stdout())
        .chain(fern::log_file(log_path)?)
        .apply()?;

    Ok(())
}

/// Deletes every `<program>_*.log` file except the most recent one.
fn cleanup_old_logs(log_dir: &Path, program: &str) -> Result<(), LoggerError> {
    let prefix = format!("{}_", program);
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| {
            let path = e.path();
            path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("fatal"), LevelFilter::Error);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn keeps_only_the_newest_log_of_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (name, age) in [("adapter_1.log", 30), ("adapter_2.log", 10), ("adapter_3.log", 20)] {
            let file = fs::File::create(dir.path().join(name)).unwrap();
            file.set_modified(now - Duration::from_secs(age)).unwrap();
        }
        fs::write(dir.path().join("other_1.log"), "").unwrap();
        fs::write(dir.path().join("adapter.txt"), "").unwrap();

        cleanup_old_logs(dir.path(), "adapter").unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["adapter.txt", "adapter_2.log", "other_1.log"]);
    }
}
