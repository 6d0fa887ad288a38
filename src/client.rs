use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ProviderOptions;
use crate::core::{
    BackoffPolicy, ConnectionManager, ConnectionState, InitState, ProviderEvent,
    ResolutionCache, Resolver, StatusClassifier,
};
use crate::error::{ErrorCode, FlagWireError, Result};
use crate::rpc::{EvaluationRpc, GrpcEvaluation};
use crate::types::{EvaluationContext, ResolutionDetails};

/// The application-facing client.
///
/// Construction starts the background connection loop immediately; callers
/// that need a readiness guarantee await [`FlagWireClient::initialize`].
/// Every resolve call returns a usable value: on any failure the supplied
/// default comes back with the error embedded in the details.
pub struct FlagWireClient {
    options: ProviderOptions,
    connection: Arc<ConnectionManager>,
    resolver: Resolver,
}

impl FlagWireClient {
    /// Connects to the evaluation service described by `options`. The
    /// channel dials lazily; failures surface through the connection
    /// lifecycle, not here.
    pub fn connect(options: ProviderOptions) -> Result<Self> {
        options.validate()?;
        let rpc: Arc<dyn EvaluationRpc> = Arc::new(GrpcEvaluation::connect_lazy(&options)?);
        Self::with_transport(options, rpc)
    }

    /// Same as [`connect`](Self::connect) but over a caller-supplied
    /// transport.
    pub fn with_transport(options: ProviderOptions, rpc: Arc<dyn EvaluationRpc>) -> Result<Self> {
        options.validate()?;

        let cache = ResolutionCache::new(options.max_cache_size);
        let classifier = StatusClassifier::new(options.fatal_codes.clone());
        let backoff = BackoffPolicy::from_options(&options);

        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&rpc),
            cache.clone(),
            classifier,
            backoff,
            options.stream_deadline,
        ));
        connection.start();

        let resolver = Resolver::new(rpc, cache, Arc::clone(&connection), options.cache_enabled);

        Ok(Self {
            options,
            connection,
            resolver,
        })
    }

    /// Waits for the first successful readiness, bounded by the configured
    /// deadline. This is the only call that can fail: a fatal startup error
    /// rejects it permanently, a deadline expiry rejects this attempt while
    /// reconnection continues in the background.
    pub async fn initialize(&self) -> Result<()> {
        let mut init = self.connection.init_watch();

        let wait = async move {
            loop {
                let snapshot = init.borrow_and_update().clone();
                match snapshot {
                    InitState::Ready => return Ok(()),
                    InitState::Failed { code, message } => {
                        return Err(FlagWireError::new(code, message));
                    }
                    InitState::Pending => {}
                }
                if init.changed().await.is_err() {
                    return Err(FlagWireError::new(
                        ErrorCode::ProviderClosed,
                        "connection manager stopped",
                    ));
                }
            }
        };

        match tokio::time::timeout(self.options.deadline, wait).await {
            Ok(result) => result,
            Err(_) => Err(FlagWireError::new(
                ErrorCode::InitTimeout,
                format!("provider not ready within {:?}", self.options.deadline),
            )),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to connection-health and configuration-change
    /// notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.connection.subscribe()
    }

    /// Tears down the stream and stops reconnecting; idempotent. In-flight
    /// resolve calls complete or time out on their own.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    // Typed getters. The `_value` family unwraps to the bare value, the
    // `_details` family exposes variant, reason and error information.

    pub async fn get_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
    ) -> bool {
        let details = self.get_boolean_details(flag_key, default_value, context).await;
        details.value.as_bool().unwrap_or(default_value)
    }

    pub async fn get_boolean_details(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
    ) -> ResolutionDetails {
        let context = Self::effective_context(context);
        self.resolver
            .resolve_boolean(flag_key, default_value, &context)
            .await
    }

    pub async fn get_string_value(
        &self,
        flag_key: &str,
        default_value: &str,
        context: Option<&EvaluationContext>,
    ) -> String {
        let details = self.get_string_details(flag_key, default_value, context).await;
        details
            .value
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| default_value.to_string())
    }

    pub async fn get_string_details(
        &self,
        flag_key: &str,
        default_value: &str,
        context: Option<&EvaluationContext>,
    ) -> ResolutionDetails {
        let context = Self::effective_context(context);
        self.resolver
            .resolve_string(flag_key, default_value, &context)
            .await
    }

    pub async fn get_number_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
    ) -> f64 {
        let details = self.get_number_details(flag_key, default_value, context).await;
        details.value.as_f64().unwrap_or(default_value)
    }

    pub async fn get_number_details(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
    ) -> ResolutionDetails {
        let context = Self::effective_context(context);
        self.resolver
            .resolve_float(flag_key, default_value, &context)
            .await
    }

    pub async fn get_int_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: Option<&EvaluationContext>,
    ) -> i64 {
        let details = self.get_int_details(flag_key, default_value, context).await;
        details.value.as_i64().unwrap_or(default_value)
    }

    pub async fn get_int_details(
        &self,
        flag_key: &str,
        default_value: i64,
        context: Option<&EvaluationContext>,
    ) -> ResolutionDetails {
        let context = Self::effective_context(context);
        self.resolver
            .resolve_int(flag_key, default_value, &context)
            .await
    }

    pub async fn get_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: Option<&EvaluationContext>,
    ) -> serde_json::Value {
        let details = self
            .get_object_details(flag_key, default_value.clone(), context)
            .await;
        details
            .value
            .as_object()
            .cloned()
            .unwrap_or(default_value)
    }

    pub async fn get_object_details(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: Option<&EvaluationContext>,
    ) -> ResolutionDetails {
        let context = Self::effective_context(context);
        self.resolver
            .resolve_object(flag_key, default_value, &context)
            .await
    }

    fn effective_context(context: Option<&EvaluationContext>) -> EvaluationContext {
        context.cloned().unwrap_or_default()
    }
}

impl Drop for FlagWireClient {
    fn drop(&mut self) {
        // Stops the background loop if the caller never shut down cleanly.
        self.connection.shutdown();
    }
}
