use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Initialization errors
    InitTimeout,

    // Connection errors
    ConnectionError,
    StreamError,
    ProviderFatal,
    ProviderClosed,

    // Evaluation errors
    FlagNotFound,
    TypeMismatch,
    ParseError,
    General,

    // Configuration errors
    ConfigInvalidEndpoint,
    ConfigInvalidCacheSize,
    ConfigInvalidDeadline,
    ConfigInvalidBackoff,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InitTimeout => "INIT_TIMEOUT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::StreamError => "STREAM_ERROR",
            ErrorCode::ProviderFatal => "PROVIDER_FATAL",
            ErrorCode::ProviderClosed => "PROVIDER_CLOSED",
            ErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::General => "GENERAL",
            ErrorCode::ConfigInvalidEndpoint => "CONFIG_INVALID_ENDPOINT",
            ErrorCode::ConfigInvalidCacheSize => "CONFIG_INVALID_CACHE_SIZE",
            ErrorCode::ConfigInvalidDeadline => "CONFIG_INVALID_DEADLINE",
            ErrorCode::ConfigInvalidBackoff => "CONFIG_INVALID_BACKOFF",
        }
    }

    /// Whether a later attempt could plausibly succeed without operator
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::InitTimeout
                | ErrorCode::ConnectionError
                | ErrorCode::StreamError
                | ErrorCode::General
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigInvalidEndpoint
                | ErrorCode::ConfigInvalidCacheSize
                | ErrorCode::ConfigInvalidDeadline
                | ErrorCode::ConfigInvalidBackoff
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The one mapping from a failed unary resolve to an evaluation error kind,
/// applied uniformly to every flag type. `Unavailable` and
/// `DeadlineExceeded` deliberately land on `General` rather than getting
/// type-specific treatment.
pub fn evaluation_error_for(code: tonic::Code) -> ErrorCode {
    match code {
        tonic::Code::NotFound => ErrorCode::FlagNotFound,
        tonic::Code::InvalidArgument => ErrorCode::TypeMismatch,
        tonic::Code::DataLoss => ErrorCode::ParseError,
        _ => ErrorCode::General,
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct FlagWireError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FlagWireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionError, message)
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }
}

pub type Result<T> = std::result::Result<T, FlagWireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code_and_message() {
        let err = FlagWireError::new(ErrorCode::FlagNotFound, "flag 'x' does not exist");
        let rendered = format!("{}", err);

        assert!(rendered.contains("[FLAG_NOT_FOUND]"));
        assert!(rendered.contains("flag 'x' does not exist"));
    }

    #[test]
    fn test_evaluation_error_mapping_is_uniform() {
        assert_eq!(
            evaluation_error_for(tonic::Code::NotFound),
            ErrorCode::FlagNotFound
        );
        assert_eq!(
            evaluation_error_for(tonic::Code::InvalidArgument),
            ErrorCode::TypeMismatch
        );
        assert_eq!(
            evaluation_error_for(tonic::Code::DataLoss),
            ErrorCode::ParseError
        );
        // Everything else degrades to GENERAL, including unavailability
        // and deadline expiry.
        assert_eq!(
            evaluation_error_for(tonic::Code::Unavailable),
            ErrorCode::General
        );
        assert_eq!(
            evaluation_error_for(tonic::Code::DeadlineExceeded),
            ErrorCode::General
        );
        assert_eq!(
            evaluation_error_for(tonic::Code::Internal),
            ErrorCode::General
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(ErrorCode::ConnectionError.is_recoverable());
        assert!(ErrorCode::InitTimeout.is_recoverable());
        assert!(!ErrorCode::ProviderFatal.is_recoverable());
        assert!(!ErrorCode::FlagNotFound.is_recoverable());
        assert!(!ErrorCode::ConfigInvalidEndpoint.is_recoverable());
    }
}
