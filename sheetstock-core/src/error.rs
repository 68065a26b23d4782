//! Error types for sheetstock operations

use crate::{Namespace, TrackingId};
use thiserror::Error;

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Failed to serialize value for {namespace}/{key}: {reason}")]
    Serialization {
        namespace: Namespace,
        key: String,
        reason: String,
    },

    #[error("Cached value for {namespace}/{key} has an unexpected shape: {reason}")]
    Deserialization {
        namespace: Namespace,
        key: String,
        reason: String,
    },

    #[error("Unknown tracking context: {id}")]
    UnknownTrackingContext { id: TrackingId },
}

/// Errors reported by the remote spreadsheet service.
///
/// Retry classification is driven by status code, reason and message text,
/// never by variant alone. See [`RemoteError::is_retryable`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Rate limited by {service}: {message}")]
    RateLimited { service: String, message: String },

    #[error("Request to {service} failed with status {status}: {message}")]
    RequestFailed {
        service: String,
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("Transport error talking to {service}: {message}")]
    Transport { service: String, message: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl RemoteError {
    /// HTTP status code, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::RequestFailed { status, .. } => Some(*status),
            Self::Transport { .. } | Self::InvalidResponse { .. } => None,
        }
    }

    /// Whether this failure belongs to the rate-limit/quota class.
    ///
    /// Retryable: HTTP 429, HTTP 403 whose reason mentions quota, rate
    /// limiting or permission, and any error whose message mentions
    /// "rate limit" or "quota".
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::RequestFailed {
                status,
                reason,
                message,
                ..
            } => {
                if *status == 429 {
                    return true;
                }
                if *status == 403 {
                    if let Some(reason) = reason {
                        let reason = reason.to_ascii_lowercase();
                        if reason.contains("quota")
                            || reason.contains("ratelimit")
                            || reason.contains("rate limit")
                            || reason.contains("permission")
                        {
                            return true;
                        }
                    }
                }
                message_mentions_quota(message)
            }
            Self::Transport { message, .. } => message_mentions_quota(message),
            Self::InvalidResponse { reason, .. } => message_mentions_quota(reason),
        }
    }
}

fn message_mentions_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("quota")
}

/// Fuzzy matching failures. Callers are expected to handle both.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    #[error("No match for '{input}' (best distance {best_distance:?})")]
    NoMatch {
        input: String,
        best_distance: Option<f64>,
    },

    #[error("Ambiguous match for '{input}' at distance {distance}: {candidates:?}")]
    Ambiguous {
        input: String,
        distance: f64,
        candidates: Vec<String>,
    },
}

/// Errors raised while interpreting spreadsheet contents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SheetError {
    #[error("Tab '{tab}' not found in table {table}")]
    TabNotFound { table: String, tab: String },

    #[error("Column '{column}' not found in tab '{tab}'")]
    ColumnNotFound { tab: String, column: String },

    #[error("No row for '{item}' in tab '{tab}'")]
    RowNotFound { tab: String, item: String },

    #[error("Cannot route item code '{code}' to an inventory tab")]
    UnroutableItem { code: String },

    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Tab '{tab}' has no header row")]
    MissingHeader { tab: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration from {source_name}: {reason}")]
    Parse { source_name: String, reason: String },
}

/// Master error type for all sheetstock errors.
#[derive(Debug, Clone, Error)]
pub enum StockError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StockError {
    /// Only remote failures are ever worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::Remote(e) if e.is_retryable())
    }
}

/// Result type alias for sheetstock operations.
pub type StockResult<T> = Result<T, StockError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(status: u16, reason: Option<&str>, message: &str) -> RemoteError {
        RemoteError::RequestFailed {
            service: "sheets".to_string(),
            status,
            reason: reason.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_rate_limited_is_retryable() {
        let err = RemoteError::RateLimited {
            service: "sheets".to_string(),
            message: "slow down".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_429_status_is_retryable() {
        assert!(failed(429, None, "Too Many Requests").is_retryable());
    }

    #[test]
    fn test_403_needs_quota_reason() {
        assert!(failed(403, Some("rateLimitExceeded"), "forbidden").is_retryable());
        assert!(failed(403, Some("quotaExceeded"), "forbidden").is_retryable());
        assert!(failed(403, Some("PERMISSION_DENIED"), "forbidden").is_retryable());
        assert!(!failed(403, None, "forbidden").is_retryable());
        assert!(!failed(403, Some("notFound"), "forbidden").is_retryable());
    }

    #[test]
    fn test_message_text_classification() {
        assert!(failed(500, None, "User Rate Limit Exceeded").is_retryable());
        assert!(failed(400, None, "Quota exceeded for metric").is_retryable());
        assert!(!failed(500, None, "backend error").is_retryable());
        assert!(!failed(404, None, "Requested entity was not found").is_retryable());
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        let err = RemoteError::Transport {
            service: "sheets".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Serialization {
            namespace: Namespace::Inventory,
            key: "CASE-1".to_string(),
            reason: "boom".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("inventory/CASE-1"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_match_error_display() {
        let err = MatchError::Ambiguous {
            input: "AB".to_string(),
            distance: 1.0,
            candidates: vec!["AC".to_string(), "AD".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Ambiguous"));
        assert!(msg.contains("AC"));
    }

    #[test]
    fn test_stock_error_from_variants() {
        let storage = StockError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, StockError::Storage(_)));

        let remote = StockError::from(failed(500, None, "x"));
        assert!(matches!(remote, StockError::Remote(_)));

        let matching = StockError::from(MatchError::NoMatch {
            input: "x".to_string(),
            best_distance: None,
        });
        assert!(matches!(matching, StockError::Match(_)));

        let sheet = StockError::from(SheetError::MissingHeader {
            tab: "CASE".to_string(),
        });
        assert!(matches!(sheet, StockError::Sheet(_)));

        let config = StockError::from(ConfigError::MissingRequired {
            field: "tables.inventory".to_string(),
        });
        assert!(matches!(config, StockError::Config(_)));
    }

    #[test]
    fn test_stock_error_retry_follows_remote() {
        assert!(StockError::from(failed(429, None, "slow down")).is_retryable());
        assert!(!StockError::from(failed(404, None, "gone")).is_retryable());
        assert!(!StockError::from(StorageError::LockPoisoned).is_retryable());
    }
}
