use std::fmt;

use serde::Serialize;

#[derive(Clone)]
#[derive(Debug)]
pub struct HttpError {
    pub status: u32,
    pub error_message: String,
}

impl HttpError {
    pub fn new(status: u32, error_message: String) -> Self {
        Self {
            status,
            error_message,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.error_message)
    }
}

#[derive(Serialize)]
pub struct HttpErrorBody {

    #[serde(rename = "type")]
    pub _type : String,

    #[serde(rename = "title")]
    pub title: String,

    #[serde(rename = "status")]
    pub status: u32,

    #[serde(rename = "timestamp")]
    pub timestamp: String,

    #[serde(rename = "error", skip_serializing_if = "HttpErrorBody::is_empty_or_null")]
    pub error_message: String,
}

impl HttpErrorBody {

    fn is_empty_or_null(s: &str) -> bool {
        s.is_empty() || s == "null"
    }

    #[doc = "Creates a new HttpErrorBody by specifying a status code, a timestamp and a error message."]
    pub fn with_message(status: u32, timestamp: String, error_message: String) -> Self {
        Self {
            _type: HttpErrorBody::get_error_type(status),
            title: HttpErrorBody::get_error_title(status),
            status,
            timestamp,
            error_message,
        }
    }

    #[doc = "Converts the error body to JSON."]
    pub fn to_json(&self) -> String {
        // Only strings and integers, serialization cannot fail.
        serde_json::to_string(&self).unwrap_or_default()
    }

    #[doc = "Gets the error type based on the status code."]
    pub fn get_error_type(status: u32) -> String {
        match status {
            400 => "HTTP:BAD_REQUEST".to_string(),
            401 => "HTTP:UNAUTHORIZED".to_string(),
            403 => "HTTP:FORBIDDEN".to_string(),
            404 => "HTTP:NOT_FOUND".to_string(),
            405 => "HTTP:METHOD_NOT_ALLOWED".to_string(),
            500 => "HTTP:INTERNAL_SERVER_ERROR".to_string(),
            502 => "HTTP:BAD_GATEWAY".to_string(),
            503 => "HTTP:SERVICE_UNAVAILABLE".to_string(),
            _ => "HTTP:UNKNOWN".to_string(),
        }
    }

    #[doc = "Gets the error title based on the status code."]
    pub fn get_error_title(status: u32) -> String {
        match status {
            400 => "Bad Request".to_string(),
            401 => "Unauthorized".to_string(),
            403 => "Forbidden".to_string(),
            404 => "Not Found".to_string(),
            405 => "Method Not Allowed".to_string(),
            500 => "Internal Server Error".to_string(),
            502 => "Bad Gateway".to_string(),
            503 => "Service Unavailable".to_string(),
            _ => "Unknown".to_string(),
        }
    }
}

/// Raised while building a purge gateway from its options.
///
/// Never produced once a gateway exists: every variant is a construction-time failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Option keys outside of the supported set, in the order they were found.
    UnsupportedOptions(Vec<String>),
    /// Both a client matcher and a client IP list were configured.
    ConflictingClientRules,
    /// An allow-list entry that is neither an IP address nor a CIDR network.
    InvalidClientIp(String),
    /// The purge method is not a valid HTTP method token.
    InvalidMethod(String),
    /// A matcher regular expression failed to compile.
    InvalidPattern { field: &'static str, reason: String },
    /// The configuration document could not be decoded.
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedOptions(keys) => write!(
                f,
                "Unsupported purge configuration option(s) \"{}\"",
                keys.join(", ")
            ),
            ConfigError::ConflictingClientRules => write!(
                f,
                "Only one of allowed_client_matcher and allowed_client_ips may be set"
            ),
            ConfigError::InvalidClientIp(value) => write!(f, "Invalid client IP or network \"{}\"", value),
            ConfigError::InvalidMethod(value) => write!(f, "Invalid purge method \"{}\"", value),
            ConfigError::InvalidPattern { field, reason } => write!(f, "Invalid {} pattern: {}", field, reason),
            ConfigError::Malformed(reason) => write!(f, "Malformed purge configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}

impl From<ConfigError> for HttpError {
    fn from(err: ConfigError) -> Self {
        HttpError::new(500, err.to_string())
    }
}
