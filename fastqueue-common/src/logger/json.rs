use chrono::{DateTime, Utc};
use log::{Level, Log, Metadata, Record};
use std::{
    cell::Cell,
    io::{BufWriter, Write},
    sync::Mutex,
};

use crate::logger::get_trace_id;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct LogMessage<'a> {
    timestamp:   DateTime<Utc>,
    level:       String,
    level_num:   i32,
    target:      &'a str,
    module_path: Option<&'a str>,
    file:        Option<&'a str>,
    line:        Option<u32>,
    trace_id:    Option<String>,
    message:     String,
}

impl<'a> LogMessage<'a> {
    fn build(record: &Record<'a>) -> Self {
        LogMessage {
            timestamp:   Utc::now(),
            level:       record.level().to_string(),
            level_num:   record.level() as i32,
            target:      record.target(),
            module_path: record.module_path(),
            file:        record.file(),
            line:        record.line(),
            trace_id:    get_trace_id().map(|id| id.to_string()),
            message:     format!("{}", record.args()),
        }
    }
}

/// A logger implementation which writes each log message as a json encoded object on its own line.
pub struct Logger<W: Write> {
    level:  Level,
    writer: Mutex<Cell<BufWriter<W>>>,
}

impl<W: Write> Logger<W> {
    /// Create a new json logger with the given level and writer.
    pub fn new(level: Level, writer: W) -> Self {
        Self {
            level,
            writer: Mutex::new(Cell::new(BufWriter::new(writer))),
        }
    }

    /// Get the current level of the logger. This is an additional filter on top of whatever level
    /// is configured in the `log` crate itself.
    pub const fn level(&self) -> Level {
        self.level
    }
}

impl<W: Write + Send> Log for Logger<W> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = LogMessage::build(record);
        if let Ok(mut line) = serde_json::to_vec(&message) {
            line.push(b'\n');
            if let Ok(mut writer) = self.writer.lock() {
                let _ = writer.get_mut().write_all(&line);
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.get_mut().flush();
        }
    }
}

/// Create a new json logger writing to stdout, using `LOG_LEVEL` from the environment (falling
/// back to `default_log_level` if unset or unrecognised).
pub fn new_stdout_logger(default_log_level: Level) -> Logger<std::io::Stdout> {
    let level = match std::env::var("FASTQUEUE_LOG_LEVEL") {
        Err(_) => default_log_level,
        Ok(value) => match value.as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => default_log_level,
        },
    };
    Logger::new(level, std::io::stdout())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Error;

    #[test]
    fn level_defaults() {
        let logger = Logger::new(Level::Info, std::io::sink());
        assert_eq!(logger.level(), Level::Info);
    }

    #[derive(Default)]
    struct TestWriter {
        written: Vec<u8>,
        flushed: bool,
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
            self.flushed = false;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Error> {
            self.flushed = true;
            Ok(())
        }
    }

    fn log_at(logger: &Logger<TestWriter>, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target("fastqueue_common::logger::json::test")
                .build(),
        );
    }

    #[test]
    fn filters_below_configured_level_and_flushes() {
        let logger = Logger::new(Level::Info, TestWriter::default());

        log_at(&logger, Level::Debug, "too verbose");
        log_at(&logger, Level::Info, "kept");
        log_at(&logger, Level::Error, "also kept");
        logger.flush();

        let mut writer = logger.writer.lock().unwrap();
        let buf = writer.get_mut();
        assert!(buf.get_ref().flushed);
        let lines: Vec<LogMessage<'_>> = String::from_utf8(buf.get_ref().written.clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "kept");
        assert_eq!(lines[1].message, "also kept");
    }
}
