use std::collections::HashSet;
use std::time::Duration;

use crate::error::{ErrorCode, FlagWireError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8013;
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(500);
pub const DEFAULT_STREAM_DEADLINE: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(1000);
pub const DEFAULT_RETRY_BACKOFF_MAX: Duration = Duration::from_millis(120_000);
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(100);

fn default_fatal_codes() -> HashSet<tonic::Code> {
    // First-contact failures that retrying cannot fix: bad credentials or a
    // malformed request. Anything else is assumed recoverable.
    HashSet::from([
        tonic::Code::Unauthenticated,
        tonic::Code::PermissionDenied,
        tonic::Code::InvalidArgument,
    ])
}

/// All knobs the provider consumes, fixed at construction time. Nothing in
/// the core reads ambient process state; whoever builds the options decides
/// where the values come from.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Bound on each unary resolve and on `initialize()`.
    pub deadline: Duration,
    /// Maximum lifetime of one event stream before it is cycled;
    /// `Duration::ZERO` disables cycling.
    pub stream_deadline: Duration,
    pub cache_enabled: bool,
    pub max_cache_size: usize,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub retry_backoff_multiplier: f64,
    pub retry_jitter: Duration,
    /// Status codes that permanently abort startup when seen before the
    /// first successful connection.
    pub fatal_codes: HashSet<tonic::Code>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: false,
            deadline: DEFAULT_DEADLINE,
            stream_deadline: DEFAULT_STREAM_DEADLINE,
            cache_enabled: true,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_backoff_max: DEFAULT_RETRY_BACKOFF_MAX,
            retry_backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
            retry_jitter: DEFAULT_RETRY_JITTER,
            fatal_codes: default_fatal_codes(),
        }
    }
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ProviderOptionsBuilder {
        ProviderOptionsBuilder::new()
    }

    /// The endpoint URI handed to the transport.
    pub fn target(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidEndpoint,
                "host must not be empty",
            ));
        }

        if self.port == 0 {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidEndpoint,
                "port must be non-zero",
            ));
        }

        if self.deadline.is_zero() {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidDeadline,
                "deadline must be positive",
            ));
        }

        if self.cache_enabled && self.max_cache_size == 0 {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidCacheSize,
                "max cache size must be positive when the cache is enabled",
            ));
        }

        if self.retry_backoff.is_zero() {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidBackoff,
                "retry backoff must be positive",
            ));
        }

        if self.retry_backoff_multiplier < 1.0 {
            return Err(FlagWireError::config_error(
                ErrorCode::ConfigInvalidBackoff,
                "retry backoff multiplier must be at least 1.0",
            ));
        }

        Ok(())
    }
}

pub struct ProviderOptionsBuilder {
    options: ProviderOptions,
}

impl ProviderOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ProviderOptions::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.options.tls = tls;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.options.deadline = deadline;
        self
    }

    pub fn stream_deadline(mut self, deadline: Duration) -> Self {
        self.options.stream_deadline = deadline;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.options.cache_enabled = enabled;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.options.max_cache_size = size;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.options.retry_backoff = backoff;
        self
    }

    pub fn retry_backoff_max(mut self, max: Duration) -> Self {
        self.options.retry_backoff_max = max;
        self
    }

    pub fn retry_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.options.retry_backoff_multiplier = multiplier;
        self
    }

    pub fn retry_jitter(mut self, jitter: Duration) -> Self {
        self.options.retry_jitter = jitter;
        self
    }

    pub fn fatal_codes(mut self, codes: HashSet<tonic::Code>) -> Self {
        self.options.fatal_codes = codes;
        self
    }

    pub fn build(self) -> ProviderOptions {
        self.options
    }
}

impl Default for ProviderOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
