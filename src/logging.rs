/*
================================================================================
                            atlasforge logging
================================================================================

Console logging through `env_logger` composed with an in-memory ring buffer,
so a host can dump the most recent pipeline activity (bundle loads, layer
uploads, crop fallbacks) next to a bug report.

- `setup_logger()`: installs the composite logger and returns the shared buffer
- `export_debug_logs()`: writes the buffered lines to a file
- `get_log_directory()`: per-user log directory for a host application

Log levels:
- Debug builds: DEBUG and above for `atlasforge` and the host target
- Release builds: ERROR only (unless RUST_LOG is set)
- The buffer keeps the last 1000 entries regardless of console filtering
================================================================================
*/

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use env_logger::fmt::{Color, Formatter};
use log::{LevelFilter, Metadata, Record, SetLoggerError};

#[allow(unused_imports)]
use log::{Level, debug, info, warn, error};

const MAX_LOG_LINES: usize = 1000;
const CRATE_TARGET: &str = "atlasforge";

pub type LogBuffer = Arc<Mutex<VecDeque<String>>>;

fn lock(buffer: &LogBuffer) -> MutexGuard<'_, VecDeque<String>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct BufferLogger {
    log_buffer: LogBuffer,
    targets: Vec<String>,
}

impl BufferLogger {
    fn new(app_name: &str) -> Self {
        let mut targets = vec![CRATE_TARGET.to_string()];
        if app_name != CRATE_TARGET {
            targets.push(app_name.to_string());
        }
        Self {
            log_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
            targets,
        }
    }

    fn captures(&self, target: &str) -> bool {
        self.targets.iter().any(|t| target.starts_with(t.as_str()))
    }

    fn log_to_buffer(&self, message: &str, target: &str, line: Option<u32>) {
        let mut buffer = lock(&self.log_buffer);
        if buffer.len() == MAX_LOG_LINES {
            buffer.pop_front();
        }

        // The module is already in the target, only the line is added
        let formatted_message = if let Some(line_num) = line {
            format!("{target}:{line_num} {message}")
        } else {
            format!("{target} {message}")
        };

        buffer.push_back(formatted_message);
    }

    fn get_shared_buffer(&self) -> LogBuffer {
        Arc::clone(&self.log_buffer)
    }
}

impl log::Log for BufferLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.captures(metadata.target()) && metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{:<5} {}", record.level(), record.args());
            self.log_to_buffer(&message, record.target(), record.line());
        }
    }

    fn flush(&self) {}
}

struct CompositeLogger {
    console_logger: env_logger::Logger,
    buffer_logger: BufferLogger,
}

impl log::Log for CompositeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console_logger.enabled(metadata) || self.buffer_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console_logger.enabled(record.metadata()) {
            self.console_logger.log(record);
        }
        if self.buffer_logger.enabled(record.metadata()) {
            self.buffer_logger.log(record);
        }
    }

    fn flush(&self) {
        self.console_logger.flush();
        self.buffer_logger.flush();
    }
}

fn format_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

    let module_info = match (record.module_path(), record.line()) {
        (Some(module), Some(line)) => format!("{module}:{line}"),
        (Some(module), None) => module.to_string(),
        (None, Some(line)) => format!("line:{line}"),
        (None, None) => "unknown".to_string(),
    };

    let mut level_style = buf.style();
    let mut meta_style = buf.style();

    match record.level() {
        Level::Error => level_style.set_color(Color::Red).set_bold(true),
        Level::Warn => level_style.set_color(Color::Yellow).set_bold(true),
        Level::Info => level_style.set_color(Color::Green).set_bold(true),
        Level::Debug => level_style.set_color(Color::Blue).set_bold(true),
        Level::Trace => level_style.set_color(Color::White),
    };

    // Color::Rgb does not render on macOS terminals
    #[cfg(target_os = "macos")]
    meta_style.set_color(Color::Blue);
    #[cfg(not(target_os = "macos"))]
    meta_style.set_color(Color::Rgb(120, 120, 120));

    writeln!(
        buf,
        "{} {} {} {}",
        meta_style.value(timestamp),
        level_style.value(record.level()),
        meta_style.value(module_info),
        record.args()
    )
}

/// Installs the console + buffer logger. `app_name` is captured alongside the
/// `atlasforge` target so host logs land in the same buffer.
pub fn setup_logger(app_name: &str) -> Result<LogBuffer, SetLoggerError> {
    let buffer_logger = BufferLogger::new(app_name);
    let shared_buffer = buffer_logger.get_shared_buffer();

    let mut builder = env_logger::Builder::new();

    // Filter out all other crates' logs
    builder.filter(None, LevelFilter::Off);

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else {
        let level = if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Error
        };
        for target in &buffer_logger.targets {
            builder.filter(Some(target.as_str()), level);
        }
    }

    builder.format(format_record);

    let composite_logger = CompositeLogger {
        console_logger: builder.build(),
        buffer_logger,
    };

    log::set_boxed_logger(Box::new(composite_logger))?;

    // Filtering happens in the loggers themselves
    log::set_max_level(LevelFilter::Trace);

    Ok(shared_buffer)
}

pub fn get_log_directory(app_name: &str) -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(app_name).join("logs")
}

/// Writes the buffered log lines to `path`, creating parent directories.
///
/// Progress is not logged here; anything logged would land in the buffer being exported.
pub fn export_debug_logs(path: &Path, log_buffer: &LogBuffer) -> std::io::Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
    let log_entries: Vec<String> = lock(log_buffer).iter().cloned().collect();

    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] atlasforge debug log export")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] Maximum captured entries: {MAX_LOG_LINES}")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file)?;

    if log_entries.is_empty() {
        writeln!(file, "{timestamp} [DEBUG EXPORT] No log entries found in buffer")?;
    } else {
        for log_entry in &log_entries {
            writeln!(file, "{timestamp} {log_entry}")?;
        }
    }

    writeln!(file)?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] Total entries exported: {}", log_entries.len())?;
    file.flush()?;

    Ok(log_entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_keeps_only_the_latest_lines() {
        let logger = BufferLogger::new("demo");
        for i in 0..MAX_LOG_LINES + 5 {
            logger.log_to_buffer(&format!("line {i}"), "atlasforge::assets", Some(7));
        }

        let buffer = logger.get_shared_buffer();
        let buffer = lock(&buffer);
        assert_eq!(buffer.len(), MAX_LOG_LINES);
        assert_eq!(buffer.front().map(String::as_str), Some("atlasforge::assets:7 line 5"));
    }

    #[test]
    fn test_buffer_captures_crate_and_host_targets() {
        let logger = BufferLogger::new("demo");
        assert!(logger.captures("atlasforge::textures::packer"));
        assert!(logger.captures("demo::main"));
        assert!(!logger.captures("wgpu_core::device"));
    }

    #[test]
    fn test_export_writes_every_entry() {
        let buffer: LogBuffer = Arc::new(Mutex::new(VecDeque::new()));
        lock(&buffer).push_back("atlasforge:1 INFO  first".to_string());
        lock(&buffer).push_back("atlasforge:2 WARN  second".to_string());

        let path = std::env::temp_dir()
            .join(format!("atlasforge-log-test-{}", std::process::id()))
            .join("debug.log");
        let written = export_debug_logs(&path, &buffer).unwrap();
        assert_eq!(written, 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("WARN  second"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
