// Structured launch logger with level filtering, ANSI colors, and an
// optional custom handler for applications that route logs elsewhere.

use std::fmt;
use std::sync::Arc;

/// ANSI escape codes used by the default stderr/stdout output.
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub mod fg {
        pub const RED: &str = "\x1b[31m";
        pub const YELLOW: &str = "\x1b[33m";
        pub const BLUE: &str = "\x1b[34m";
        pub const MAGENTA: &str = "\x1b[35m";
    }
}

/// Log severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => ansi::fg::MAGENTA,
            LogLevel::Info => ansi::fg::BLUE,
            LogLevel::Warn => ansi::fg::YELLOW,
            LogLevel::Error => ansi::fg::RED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Warn,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub disabled: bool,
    pub disable_colors: bool,
    /// Minimum level to emit.
    pub level: LogLevel,
    /// Custom handler; when set, replaces stderr/stdout output entirely.
    pub custom_handler: Option<Arc<dyn LogHandler>>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            disable_colors: false,
            level: LogLevel::Warn,
            custom_handler: None,
        }
    }
}

/// User-provided logging backend.
pub trait LogHandler: Send + Sync + fmt::Debug {
    fn handle(&self, level: LogLevel, message: &str);
}

/// The logger shared through the tool context.
#[derive(Clone)]
pub struct LtiLogger {
    config: LoggerConfig,
}

impl fmt::Debug for LtiLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LtiLogger")
            .field("level", &self.config.level)
            .field("disabled", &self.config.disabled)
            .finish()
    }
}

impl LtiLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    pub fn level(&self) -> LogLevel {
        self.config.level
    }

    pub fn should_publish(&self, level: LogLevel) -> bool {
        if self.config.disabled {
            return false;
        }
        level >= self.config.level
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.should_publish(level) {
            return;
        }

        if let Some(ref handler) = self.config.custom_handler {
            handler.handle(level, message);
            return;
        }

        let formatted = self.format_message(level, message);
        match level {
            LogLevel::Warn | LogLevel::Error => eprintln!("{formatted}"),
            _ => println!("{formatted}"),
        }
    }

    fn format_message(&self, level: LogLevel, message: &str) -> String {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        if self.config.disable_colors {
            format!("{} {} [lti-tool]: {}", timestamp, level.as_str(), message)
        } else {
            format!(
                "{dim}{timestamp}{reset} {color}{level}{reset} {bright}[lti-tool]:{reset} {message}",
                dim = ansi::DIM,
                reset = ansi::RESET,
                color = level.color(),
                level = level.as_str(),
                bright = ansi::BRIGHT,
            )
        }
    }
}

impl Default for LtiLogger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("nonsense"), LogLevel::Warn);
    }

    #[test]
    fn test_should_publish() {
        let logger = LtiLogger::new(LoggerConfig {
            level: LogLevel::Warn,
            ..Default::default()
        });
        assert!(!logger.should_publish(LogLevel::Debug));
        assert!(!logger.should_publish(LogLevel::Info));
        assert!(logger.should_publish(LogLevel::Warn));
        assert!(logger.should_publish(LogLevel::Error));
    }

    #[test]
    fn test_disabled_logger() {
        let logger = LtiLogger::new(LoggerConfig {
            disabled: true,
            ..Default::default()
        });
        assert!(!logger.should_publish(LogLevel::Error));
    }

    #[test]
    fn test_format_message_no_color() {
        let logger = LtiLogger::new(LoggerConfig {
            disable_colors: true,
            level: LogLevel::Debug,
            ..Default::default()
        });
        let msg = logger.format_message(LogLevel::Info, "launch validated");
        assert!(msg.contains("INFO"));
        assert!(msg.contains("[lti-tool]:"));
        assert!(!msg.contains("\x1b["));
    }

    #[derive(Debug)]
    struct TestHandler {
        captured: std::sync::Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogHandler for TestHandler {
        fn handle(&self, level: LogLevel, message: &str) {
            self.captured.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_custom_handler() {
        let handler = Arc::new(TestHandler {
            captured: std::sync::Mutex::new(Vec::new()),
        });
        let logger = LtiLogger::new(LoggerConfig {
            level: LogLevel::Debug,
            custom_handler: Some(handler.clone()),
            ..Default::default()
        });
        logger.info("state issued");
        logger.error("nonce replayed");

        let captured = handler.captured.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0], (LogLevel::Info, "state issued".to_string()));
        assert_eq!(captured[1].0, LogLevel::Error);
    }
}
