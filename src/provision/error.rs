//! Failure taxonomy and message-based error classification
//!
//! Raw failures (agent errors, transport errors, step failures) are never
//! shown as-is: they go through [`classify`] and come out as a
//! [`ClassifiedError`] with a stable code, severity and suggestions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkError,
    PermissionError,
    InstallationError,
    ServiceError,
    ValidationError,
    TimeoutError,
    UnknownError,
    /// Recorded by an explicit stop, never produced by [`classify`]
    UserCancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::PermissionError => "PERMISSION_ERROR",
            ErrorCode::InstallationError => "INSTALLATION_ERROR",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::UserCancelled => "USER_CANCELLED",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        [
            ErrorCode::NetworkError,
            ErrorCode::PermissionError,
            ErrorCode::InstallationError,
            ErrorCode::ServiceError,
            ErrorCode::ValidationError,
            ErrorCode::TimeoutError,
            ErrorCode::UnknownError,
            ErrorCode::UserCancelled,
        ]
        .into_iter()
        .find(|c| c.as_str() == code)
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::NetworkError
            | ErrorCode::ServiceError
            | ErrorCode::ValidationError
            | ErrorCode::TimeoutError => Severity::Medium,
            ErrorCode::PermissionError | ErrorCode::InstallationError | ErrorCode::UnknownError => {
                Severity::High
            }
            ErrorCode::UserCancelled => Severity::Low,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ErrorCode::NetworkError | ErrorCode::TimeoutError => Category::Network,
            ErrorCode::PermissionError => Category::Permission,
            ErrorCode::InstallationError => Category::Installation,
            ErrorCode::ServiceError => Category::Service,
            ErrorCode::ValidationError => Category::Validation,
            ErrorCode::UnknownError | ErrorCode::UserCancelled => Category::Unknown,
        }
    }

    /// Every code in the catalog is currently retryable
    pub fn retryable(&self) -> bool {
        true
    }

    fn summary(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "Network connection failed",
            ErrorCode::PermissionError => "Insufficient permissions",
            ErrorCode::InstallationError => "Ollama installation failed",
            ErrorCode::ServiceError => "Ollama service failed to start",
            ErrorCode::ValidationError => "Installation could not be verified",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::UnknownError => "An unexpected error occurred",
            ErrorCode::UserCancelled => "Installation cancelled",
        }
    }

    fn suggestions(&self) -> [&'static str; 3] {
        match self {
            ErrorCode::NetworkError => [
                "Check your internet connection",
                "Verify that a firewall or proxy is not blocking the installer",
                "Try again in a few minutes",
            ],
            ErrorCode::PermissionError => [
                "Run the application as Administrator (or with sudo)",
                "Check that your account can write to the install directory",
                "Temporarily disable antivirus software that may block the installer",
            ],
            ErrorCode::InstallationError => [
                "Make sure at least 10 GB of disk space is free",
                "Download and run the Ollama installer manually",
                "Close other installers that may be running and retry",
            ],
            ErrorCode::ServiceError => [
                "Check whether port 11434 is already in use",
                "Restart the Ollama service",
                "Restart your computer and try again",
            ],
            ErrorCode::ValidationError => [
                "Reinstall Ollama",
                "Check that the `ollama` command is on your PATH",
                "Look at the Ollama logs for startup errors",
            ],
            ErrorCode::TimeoutError => [
                "Check your internet connection speed",
                "Retry the operation",
                "Close applications that are using the network heavily",
            ],
            ErrorCode::UnknownError => [
                "Retry the operation",
                "Restart the application",
                "Contact support if the problem persists",
            ],
            ErrorCode::UserCancelled => [
                "Start the installation again when ready",
                "Leave the installer open until every step completes",
                "Check the system requirements before retrying",
            ],
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Network,
    Permission,
    Installation,
    Service,
    Validation,
    Unknown,
}

/// Presentable record of one failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
    pub suggestions: Vec<String>,
    pub severity: Severity,
    pub category: Category,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    /// Build the catalog record for `code`
    pub fn from_code(code: ErrorCode, details: Option<String>) -> Self {
        Self {
            code,
            message: code.summary().to_string(),
            details,
            suggestions: code.suggestions().iter().map(|s| s.to_string()).collect(),
            severity: code.severity(),
            category: code.category(),
            retryable: code.retryable(),
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled() -> Self {
        Self::from_code(
            ErrorCode::UserCancelled,
            Some("Installation was stopped by the user".to_string()),
        )
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, ": {details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ClassifiedError {}

#[derive(Debug, Clone, Copy)]
enum Token {
    /// Matches anywhere in the text
    Anywhere(&'static str),
    /// Matches only at the start of a word, so "port" skips "report" and "support"
    WordStart(&'static str),
}

impl Token {
    fn matches(&self, lower: &str) -> bool {
        match *self {
            Token::Anywhere(t) => lower.contains(t),
            Token::WordStart(t) => lower.match_indices(t).any(|(i, _)| {
                lower[..i]
                    .chars()
                    .next_back()
                    .is_none_or(|c| !c.is_alphanumeric())
            }),
        }
    }
}

use self::Token::{Anywhere, WordStart};

// First match wins; order is part of the contract.
const RULES: &[(ErrorCode, &[Token])] = &[
    (
        ErrorCode::NetworkError,
        &[
            Anywhere("network"),
            Anywhere("fetch"),
            Anywhere("connection"),
            Anywhere("connect"),
            WordStart("dns"),
            Anywhere("unreachable"),
        ],
    ),
    (
        ErrorCode::PermissionError,
        &[
            Anywhere("permission"),
            Anywhere("access denied"),
            Anywhere("eacces"),
            Anywhere("eperm"),
            Anywhere("unauthorized"),
            Anywhere("administrator"),
        ],
    ),
    (ErrorCode::InstallationError, &[Anywhere("install"), Anywhere("download")]),
    (
        ErrorCode::ServiceError,
        &[
            Anywhere("service"),
            WordStart("port"),
            Anywhere("address in use"),
            Anywhere("already in use"),
        ],
    ),
    (
        ErrorCode::ValidationError,
        &[
            Anywhere("validation"),
            Anywhere("verify"),
            Anywhere("verification"),
            Anywhere("invalid"),
        ],
    ),
    (ErrorCode::TimeoutError, &[Anywhere("timeout"), Anywhere("timed out")]),
];

/// Classify an arbitrary failure by its message text
///
/// Matching is case-insensitive over `raw`'s `Display` output only; the
/// optional `context` is carried into `details` but never matched.
pub fn classify(raw: &dyn fmt::Display, context: Option<&str>) -> ClassifiedError {
    let text = raw.to_string();
    let lower = text.to_lowercase();

    let code = RULES
        .iter()
        .find(|(_, tokens)| tokens.iter().any(|t| t.matches(&lower)))
        .map(|(code, _)| *code)
        .unwrap_or(ErrorCode::UnknownError);

    let details = match context {
        Some(ctx) => format!("{ctx}: {text}"),
        None => text,
    };

    ClassifiedError::from_code(code, Some(details))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_scenario() {
        let err = classify(&"fetch failed: network unreachable", None);
        assert_eq!(err.code, ErrorCode::NetworkError);
        assert_eq!(err.severity, Severity::Medium);
        assert!(err.retryable);
        assert_eq!(err.suggestions.len(), 3);
        assert_eq!(err.details.as_deref(), Some("fetch failed: network unreachable"));
    }

    #[test]
    fn permission_messages_are_high_and_retryable() {
        for msg in [
            "permission denied",
            "EACCES: Permission required to write /usr/local/bin",
            "installer needs permission, then verify again",
        ] {
            let err = classify(&msg, None);
            assert_eq!(err.code, ErrorCode::PermissionError, "message {msg:?}");
            assert_eq!(err.severity, Severity::High);
            assert!(err.retryable);
        }
    }

    #[test]
    fn earlier_predicates_take_precedence() {
        assert_eq!(
            classify(&"network error: permission denied", None).code,
            ErrorCode::NetworkError
        );
        assert_eq!(
            classify(&"download timed out", None).code,
            ErrorCode::InstallationError
        );
        assert_eq!(
            classify(&"service port check timeout", None).code,
            ErrorCode::ServiceError
        );
        assert_eq!(
            classify(&"Verify step timeout", None).code,
            ErrorCode::ValidationError
        );
        assert_eq!(classify(&"request timeout", None).code, ErrorCode::TimeoutError);
    }

    #[test]
    fn port_only_counts_as_a_whole_word() {
        assert_eq!(
            classify(&"Failed to pull model x: runtime reported 'manifest missing'", None).code,
            ErrorCode::UnknownError
        );
        assert_eq!(classify(&"unsupported import", None).code, ErrorCode::UnknownError);
        assert_eq!(classify(&"port 11434 already bound", None).code, ErrorCode::ServiceError);
        assert_eq!(classify(&"bind failed (ports: 11434)", None).code, ErrorCode::ServiceError);
        assert_eq!(
            classify(&"listen tcp: address already in use", None).code,
            ErrorCode::ServiceError
        );
    }

    #[test]
    fn unmatched_text_is_unknown() {
        let err = classify(&"something odd happened", None);
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.severity, Severity::High);
        assert_eq!(err.category, Category::Unknown);
        assert!(err.retryable);
    }

    #[test]
    fn context_is_kept_in_details_but_not_matched() {
        let err = classify(&"boom", Some("network check"));
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.details.as_deref(), Some("network check: boom"));
    }

    #[test]
    fn every_code_has_three_suggestions() {
        for code in [
            ErrorCode::NetworkError,
            ErrorCode::PermissionError,
            ErrorCode::InstallationError,
            ErrorCode::ServiceError,
            ErrorCode::ValidationError,
            ErrorCode::TimeoutError,
            ErrorCode::UnknownError,
            ErrorCode::UserCancelled,
        ] {
            assert_eq!(ClassifiedError::from_code(code, None).suggestions.len(), 3);
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
    }
}
