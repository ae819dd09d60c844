use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::time::Instant;

/// Writes every record to stderr, prefixed by the time since startup.
struct StderrLogger {
    start: Instant,
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed();
        let tag = match record.level() {
            Level::Error => "ERR",
            Level::Warn => "WRN",
            Level::Info => "INF",
            Level::Debug => "DBG",
            Level::Trace => "TRC",
        };
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(
            out,
            "{:>4}.{:03} {} [{}] {}",
            elapsed.as_secs(),
            elapsed.subsec_millis(),
            tag,
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

pub fn parse_level(val: &str) -> Option<LevelFilter> {
    let level = match val.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" | "e" => LevelFilter::Error,
        "warn" | "w" => LevelFilter::Warn,
        "info" | "i" => LevelFilter::Info,
        "debug" | "d" => LevelFilter::Debug,
        "trace" | "t" => LevelFilter::Trace,
        _ => return None,
    };
    Some(level)
}

/// Installs the logger with the level named by `AWVM_LOG`, warn by default.
pub fn init() {
    let level = match std::env::var("AWVM_LOG") {
        Ok(val) => parse_level(&val).unwrap_or_else(|| {
            eprintln!("Ignoring unknown AWVM_LOG level '{}'", val);
            LevelFilter::Warn
        }),
        Err(_) => LevelFilter::Warn,
    };

    let logger = StderrLogger {
        start: Instant::now(),
        level,
    };
    if log::set_logger(Box::leak(Box::new(logger))).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("WARN"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("d"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
    }
}
