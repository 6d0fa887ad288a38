//! Transport boundary to the remote evaluation service.
//!
//! The core never talks gRPC directly; it goes through [`EvaluationRpc`] so
//! the connection lifecycle and resolution logic can be exercised against a
//! scripted in-memory transport. [`GrpcEvaluation`] is the production
//! implementation over a tonic channel.

pub mod convert;

#[allow(clippy::all)]
pub mod proto {
    tonic::include_proto!("flagwire.evaluation.v1");
}

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Status;

use crate::config::ProviderOptions;
use crate::error::{ErrorCode, FlagWireError};
use crate::types::{EvaluationContext, FlagValue, MetadataValue, ResolutionReason};

use proto::flag_evaluation_client::FlagEvaluationClient;

/// What happened to a flag, as reported on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct FlagChange {
    pub change_type: ChangeType,
    /// Configuration source the change originated from. Invalidation only
    /// needs the flag key; the record is carried for completeness.
    pub source: String,
}

/// Typed message on the event stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Ready,
    ConfigurationChanged { flags: HashMap<String, FlagChange> },
}

/// Common shape of every unary resolve response.
#[derive(Debug, Clone)]
pub struct ResolvedPayload {
    pub value: FlagValue,
    pub variant: Option<String>,
    pub reason: ResolutionReason,
    pub metadata: HashMap<String, MetadataValue>,
}

pub type EventStream = BoxStream<'static, Result<StreamEvent, Status>>;

/// The remote evaluation service as the core sees it: five typed unary
/// resolves and one long-lived event stream.
#[async_trait]
pub trait EvaluationRpc: Send + Sync + 'static {
    async fn resolve_boolean(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status>;

    async fn resolve_string(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status>;

    async fn resolve_float(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status>;

    async fn resolve_int(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status>;

    async fn resolve_object(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status>;

    async fn open_event_stream(&self) -> Result<EventStream, Status>;
}

/// tonic-backed transport over a lazily connected channel.
pub struct GrpcEvaluation {
    client: FlagEvaluationClient<Channel>,
    deadline: Duration,
}

impl GrpcEvaluation {
    /// Builds the channel without dialing; the first RPC triggers the actual
    /// connection, which keeps construction synchronous and infallible past
    /// option validation.
    pub fn connect_lazy(options: &ProviderOptions) -> Result<Self, FlagWireError> {
        let mut endpoint = Endpoint::from_shared(options.target())
            .map_err(|e| {
                FlagWireError::with_source(
                    ErrorCode::ConfigInvalidEndpoint,
                    format!("invalid endpoint '{}'", options.target()),
                    e,
                )
            })?
            .connect_timeout(options.deadline);

        if options.tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| {
                    FlagWireError::with_source(
                        ErrorCode::ConfigInvalidEndpoint,
                        "invalid TLS configuration",
                        e,
                    )
                })?;
        }

        let channel = endpoint.connect_lazy();

        Ok(Self {
            client: FlagEvaluationClient::new(channel),
            deadline: options.deadline,
        })
    }

    /// Client-side deadline enforcement; the grpc-timeout header alone only
    /// bounds the server side.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<tonic::Response<T>, Status>>,
    ) -> Result<T, Status> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(status),
            Err(_) => Err(Status::deadline_exceeded("remote call deadline exceeded")),
        }
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.deadline);
        request
    }
}

#[async_trait]
impl EvaluationRpc for GrpcEvaluation {
    async fn resolve_boolean(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        let mut client = self.client.clone();
        let request = self.request(proto::ResolveBooleanRequest {
            flag_key: flag_key.to_string(),
            context: Some(convert::context_to_struct(context)),
        });
        let response = self.bounded(client.resolve_boolean(request)).await?;

        Ok(ResolvedPayload {
            value: FlagValue::Bool(response.value),
            variant: convert::optional_variant(response.variant),
            reason: ResolutionReason::from_wire(&response.reason),
            metadata: convert::metadata_from_struct(response.metadata),
        })
    }

    async fn resolve_string(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        let mut client = self.client.clone();
        let request = self.request(proto::ResolveStringRequest {
            flag_key: flag_key.to_string(),
            context: Some(convert::context_to_struct(context)),
        });
        let response = self.bounded(client.resolve_string(request)).await?;

        Ok(ResolvedPayload {
            value: FlagValue::String(response.value),
            variant: convert::optional_variant(response.variant),
            reason: ResolutionReason::from_wire(&response.reason),
            metadata: convert::metadata_from_struct(response.metadata),
        })
    }

    async fn resolve_float(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        let mut client = self.client.clone();
        let request = self.request(proto::ResolveFloatRequest {
            flag_key: flag_key.to_string(),
            context: Some(convert::context_to_struct(context)),
        });
        let response = self.bounded(client.resolve_float(request)).await?;

        Ok(ResolvedPayload {
            value: FlagValue::Number(response.value),
            variant: convert::optional_variant(response.variant),
            reason: ResolutionReason::from_wire(&response.reason),
            metadata: convert::metadata_from_struct(response.metadata),
        })
    }

    async fn resolve_int(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        let mut client = self.client.clone();
        let request = self.request(proto::ResolveIntRequest {
            flag_key: flag_key.to_string(),
            context: Some(convert::context_to_struct(context)),
        });
        let response = self.bounded(client.resolve_int(request)).await?;

        Ok(ResolvedPayload {
            value: FlagValue::Int(response.value),
            variant: convert::optional_variant(response.variant),
            reason: ResolutionReason::from_wire(&response.reason),
            metadata: convert::metadata_from_struct(response.metadata),
        })
    }

    async fn resolve_object(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        let mut client = self.client.clone();
        let request = self.request(proto::ResolveObjectRequest {
            flag_key: flag_key.to_string(),
            context: Some(convert::context_to_struct(context)),
        });
        let response = self.bounded(client.resolve_object(request)).await?;

        Ok(ResolvedPayload {
            value: FlagValue::Object(convert::struct_to_json(response.value.unwrap_or_default())),
            variant: convert::optional_variant(response.variant),
            reason: ResolutionReason::from_wire(&response.reason),
            metadata: convert::metadata_from_struct(response.metadata),
        })
    }

    async fn open_event_stream(&self) -> Result<EventStream, Status> {
        let mut client = self.client.clone();
        let request = tonic::Request::new(proto::EventStreamRequest {});

        // Only the open is bounded; the stream itself lives until it fails
        // or the configured stream deadline cycles it.
        let streaming = match tokio::time::timeout(self.deadline, client.event_stream(request)).await
        {
            Ok(Ok(response)) => response.into_inner(),
            Ok(Err(status)) => return Err(status),
            Err(_) => return Err(Status::deadline_exceeded("event stream open deadline exceeded")),
        };

        let stream = streaming.filter_map(|item| async move {
            match item {
                Ok(response) => response.event.map(|event| Ok(convert::stream_event(event))),
                Err(status) => Some(Err(status)),
            }
        });

        Ok(stream.boxed())
    }
}
