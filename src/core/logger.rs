use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, info, trace, warn};
use proxy_wasm::types::LogLevel;

pub const LOG_LEVEL_TRACE: &str = "TRACE";
pub const LOG_LEVEL_DEBUG: &str = "DEBUG";
pub const LOG_LEVEL_INFO: &str = "INFO";
pub const LOG_LEVEL_WARN: &str = "WARN";
pub const LOG_LEVEL_ERROR: &str = "ERROR";

lazy_static::lazy_static! {
    #[doc = "Log Levels for Deserialization."]
    pub static ref LOG_LEVELS: HashMap<String, LogLevel> = HashMap::from([
        (String::from(LOG_LEVEL_INFO), LogLevel::Info),
        (String::from(LOG_LEVEL_ERROR), LogLevel::Error),
        (String::from(LOG_LEVEL_WARN), LogLevel::Warn),
        (String::from(LOG_LEVEL_DEBUG), LogLevel::Debug),
        (String::from(LOG_LEVEL_TRACE), LogLevel::Trace),
    ]);
}

#[doc = "Resolves a configured level name, defaulting to Info when missing or unknown."]
pub fn resolve_log_level(log_level: Option<&str>) -> LogLevel {
    log_level
        .and_then(|name| LOG_LEVELS.get(&name.trim().to_uppercase()).copied())
        .unwrap_or(LogLevel::Info)
}

#[doc = "The logger for the policy."]
pub struct Logger {
    log_id : AtomicU64,
    policy_id : String,
    log_level : LogLevel,
}

impl Logger {

    #[doc = "Creates a new logger."]
    pub fn new(policy_id : String, log_level : LogLevel)-> Self {
        Logger {
            log_id : AtomicU64::new(0),
            policy_id,
            log_level
        }
    }

    #[doc = "Logs a trace message."]
    pub fn log_trace(&self, message: &str) {
        if self.should_log(LogLevel::Trace) {
            trace!("{}", self.format(LOG_LEVEL_TRACE, message));
        }
    }

    #[doc = "Logs a debug message."]
    pub fn log_debug(&self, message: &str) {
        if self.should_log(LogLevel::Debug) {
            debug!("{}", self.format(LOG_LEVEL_DEBUG, message));
        }
    }

    #[doc = "Logs an info message."]
    pub fn log_info(&self, message: &str) {
        if self.should_log(LogLevel::Info) {
            info!("{}", self.format(LOG_LEVEL_INFO, message));
        }
    }

    #[doc = "Logs a warn message."]
    pub fn log_warn(&self, message: &str) {
        if self.should_log(LogLevel::Warn) {
            warn!("{}", self.format(LOG_LEVEL_WARN, message));
        }
    }

    #[doc = "Logs an error message."]
    pub fn log_error(&self, message: &str) {
        if self.should_log(LogLevel::Error) {
            error!("{}", self.format(LOG_LEVEL_ERROR, message));
        }
    }

    fn format(&self, level: &str, message: &str) -> String {
        let log_id = self.log_id.fetch_add(1, Ordering::Relaxed);
        format!("[{}] [{}]: {} - {}", self.policy_id, level, log_id, message)
    }

    #[doc = "Determines if the logger should log the message."]
    fn should_log(&self, log_level: LogLevel) -> bool {
        log_level as u32 >= self.log_level as u32
    }
}
