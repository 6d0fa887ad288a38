use std::sync::Arc;

use crate::core::cache::ResolutionCache;
use crate::core::connection::ConnectionManager;
use crate::error::{evaluation_error_for, ErrorCode};
use crate::rpc::EvaluationRpc;
use crate::types::{
    EvaluationContext, FlagType, FlagValue, ResolutionDetails, ResolutionReason,
};

/// The per-type resolution path: cache first while streaming, unary call
/// otherwise, always degrading to the caller's default on failure.
///
/// One algorithm serves all five value types; the typed entry points only
/// pick the remote call and the expected value shape.
pub struct Resolver {
    rpc: Arc<dyn EvaluationRpc>,
    cache: ResolutionCache,
    connection: Arc<ConnectionManager>,
    cache_enabled: bool,
}

impl Resolver {
    pub fn new(
        rpc: Arc<dyn EvaluationRpc>,
        cache: ResolutionCache,
        connection: Arc<ConnectionManager>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            rpc,
            cache,
            connection,
            cache_enabled,
        }
    }

    pub async fn resolve_boolean(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        self.resolve(FlagType::Boolean, flag_key, FlagValue::Bool(default_value), context)
            .await
    }

    pub async fn resolve_string(
        &self,
        flag_key: &str,
        default_value: &str,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        self.resolve(
            FlagType::String,
            flag_key,
            FlagValue::String(default_value.to_string()),
            context,
        )
        .await
    }

    pub async fn resolve_float(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        self.resolve(FlagType::Number, flag_key, FlagValue::Number(default_value), context)
            .await
    }

    pub async fn resolve_int(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        self.resolve(FlagType::Integer, flag_key, FlagValue::Int(default_value), context)
            .await
    }

    pub async fn resolve_object(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        self.resolve(
            FlagType::Object,
            flag_key,
            FlagValue::Object(default_value),
            context,
        )
        .await
    }

    async fn resolve(
        &self,
        flag_type: FlagType,
        flag_key: &str,
        default_value: FlagValue,
        context: &EvaluationContext,
    ) -> ResolutionDetails {
        let fingerprint = context.fingerprint();

        if self.cache_usable() {
            if let Some(hit) = self.cache.get(flag_key, &fingerprint) {
                tracing::debug!(flag_key, "cache hit");
                return hit.into_cached();
            }
        }

        let outcome = match flag_type {
            FlagType::Boolean => self.rpc.resolve_boolean(flag_key, context).await,
            FlagType::String => self.rpc.resolve_string(flag_key, context).await,
            FlagType::Number => self.rpc.resolve_float(flag_key, context).await,
            FlagType::Integer => self.rpc.resolve_int(flag_key, context).await,
            FlagType::Object => self.rpc.resolve_object(flag_key, context).await,
        };

        match outcome {
            Ok(payload) => {
                if payload.value.flag_type() != flag_type {
                    return ResolutionDetails::error(
                        flag_key,
                        default_value,
                        ErrorCode::TypeMismatch,
                        format!(
                            "expected a {} flag, got {}",
                            flag_type,
                            payload.value.flag_type()
                        ),
                    );
                }

                let mut details =
                    ResolutionDetails::new(flag_key, payload.value, payload.reason);
                details.variant = payload.variant;
                details.flag_metadata = payload.metadata;

                // Only context-independent results are safe to reuse; the
                // connection must still be live or the entry could already
                // be stale by an unobserved change.
                if details.reason == ResolutionReason::Static && self.cache_usable() {
                    self.cache.put(flag_key, &fingerprint, details.clone());
                }

                details
            }
            Err(status) => {
                let code = evaluation_error_for(status.code());
                tracing::warn!(
                    flag_key,
                    status = %status.code(),
                    "resolve failed, serving default"
                );
                ResolutionDetails::error(flag_key, default_value, code, status.message())
            }
        }
    }

    fn cache_usable(&self) -> bool {
        self.cache_enabled && self.connection.is_streaming()
    }
}
