//! Error types for Crosspost

use thiserror::Error;

use crate::types::{ContentKind, PlatformId};

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) | CrosspostError::Validation(_) => 3,
            CrosspostError::Connect(_) => 2,
            CrosspostError::Config(_) => 2,
            CrosspostError::Database(_) => 1,
            CrosspostError::Publish(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// Errors from the OAuth connection manager.
///
/// These are terminal for the authorization attempt that produced them.
/// The operator restarts the flow with a fresh `initiate` rather than
/// retrying the failed call.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("No OAuth application configured for {0}")]
    NotConfigured(String),

    #[error("Invalid or expired authorization state: {0}")]
    InvalidState(String),

    #[error("Caller is not authorized to complete this connection: {0}")]
    Unauthenticated(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("Reauthorization required: {0}")]
    ReauthorizationRequired(String),
}

/// Errors from platform publish calls.
///
/// The dispatch loop retries `Network` and `RateLimited` with exponential
/// backoff; `Unauthorized` and `Rejected` abandon the queue entry directly.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Credential rejected by platform: {0}")]
    Unauthorized(String),

    #[error("Content rejected by platform: {0}")]
    Rejected(String),
}

impl PublishError {
    /// Whether the dispatch loop should retry this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::Network(_) | PublishError::RateLimited(_)
        )
    }
}

/// Content validation failures, always naming the offending platform
/// and constraint. Submission fails atomically on the first of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("No target platforms given")]
    NoTargetPlatforms,

    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Content exceeds {platform}'s {limit} character limit (got {actual})")]
    TooLong {
        platform: PlatformId,
        limit: usize,
        actual: usize,
    },

    #[error("{platform} does not support {kind} posts")]
    UnsupportedContent {
        platform: PlatformId,
        kind: ContentKind,
    },

    #[error("{platform} requires at least one media attachment")]
    MediaRequired { platform: PlatformId },

    #[error("Too many images for {platform} (limit {limit}, got {actual})")]
    TooManyImages {
        platform: PlatformId,
        limit: usize,
        actual: usize,
    },

    #[error("Too many videos for {platform} (limit {limit}, got {actual})")]
    TooManyVideos {
        platform: PlatformId,
        limit: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_validation() {
        let error = CrosspostError::Validation(ValidationError::NoTargetPlatforms);
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_connect_error() {
        let error = CrosspostError::Connect(ConnectError::InvalidState("expired".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_publish_error() {
        let error = CrosspostError::Publish(PublishError::Network("timeout".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_database_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let error = CrosspostError::Database(db_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PublishError::Network("connection reset".to_string()).is_retryable());
        assert!(PublishError::RateLimited("429".to_string()).is_retryable());
        assert!(!PublishError::Unauthorized("token revoked".to_string()).is_retryable());
        assert!(!PublishError::Rejected("duplicate status".to_string()).is_retryable());
    }

    #[test]
    fn test_validation_error_names_platform_and_constraint() {
        let error = ValidationError::TooLong {
            platform: PlatformId::Twitter,
            limit: 280,
            actual: 300,
        };
        let message = format!("{}", error);
        assert!(message.contains("twitter"));
        assert!(message.contains("280"));
        assert!(message.contains("300"));
    }

    #[test]
    fn test_error_message_formatting_connect() {
        let error = CrosspostError::Connect(ConnectError::ReauthorizationRequired(
            "refresh token missing".to_string(),
        ));
        let message = format!("{}", error);
        assert_eq!(
            message,
            "Connection error: Reauthorization required: refresh token missing"
        );
    }

    #[test]
    fn test_error_conversion_from_validation_error() {
        let validation_error = ValidationError::EmptyContent;
        let error: CrosspostError = validation_error.into();

        match error {
            CrosspostError::Validation(_) => {}
            _ => panic!("Expected CrosspostError::Validation"),
        }
    }

    #[test]
    fn test_publish_error_clone() {
        let original = PublishError::RateLimited("slow down".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
