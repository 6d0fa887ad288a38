//! Scripted in-memory transport for driving the client without a live
//! evaluation service.
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;

use flagwire::{
    ChangeType, ConnectionState, EvaluationContext, EvaluationRpc, EventStream, FlagChange,
    FlagValue, FlagWireClient, ProviderOptions, ResolutionReason, ResolvedPayload, StreamEvent,
};

type UnaryScript = VecDeque<Result<ResolvedPayload, Status>>;

enum StreamSession {
    Reject(Status),
    Open(mpsc::UnboundedReceiver<Result<StreamEvent, Status>>),
}

/// Transport double: unary responses are scripted per flag key and consumed
/// in order; event stream sessions are scripted in connection order. An
/// unscripted unary call answers NOT_FOUND; an unscripted stream open hangs,
/// which parks the connection loop.
pub struct MockRpc {
    unary: Mutex<HashMap<String, UnaryScript>>,
    unary_calls: Mutex<Vec<String>>,
    streams: Mutex<VecDeque<StreamSession>>,
    stream_opens: Mutex<u32>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            unary: Mutex::new(HashMap::new()),
            unary_calls: Mutex::new(Vec::new()),
            streams: Mutex::new(VecDeque::new()),
            stream_opens: Mutex::new(0),
        })
    }

    /// Queues one unary response for `flag_key`.
    pub fn script(&self, flag_key: &str, result: Result<ResolvedPayload, Status>) {
        self.unary
            .lock()
            .entry(flag_key.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queues a stream session the next `open_event_stream` will return.
    /// Dropping the handle ends the stream without a status (network reset).
    pub fn queue_stream(&self) -> StreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().push_back(StreamSession::Open(rx));
        StreamHandle { tx }
    }

    /// Queues an explicit rejection for the next `open_event_stream`.
    pub fn queue_stream_rejection(&self, status: Status) {
        self.streams.lock().push_back(StreamSession::Reject(status));
    }

    pub fn unary_calls(&self) -> Vec<String> {
        self.unary_calls.lock().clone()
    }

    pub fn stream_opens(&self) -> u32 {
        *self.stream_opens.lock()
    }

    fn take_unary(&self, flag_key: &str) -> Result<ResolvedPayload, Status> {
        self.unary_calls.lock().push(flag_key.to_string());
        self.unary
            .lock()
            .get_mut(flag_key)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Err(Status::not_found(format!("flag '{}' not found", flag_key))))
    }
}

#[async_trait]
impl EvaluationRpc for MockRpc {
    async fn resolve_boolean(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        self.take_unary(flag_key)
    }

    async fn resolve_string(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        self.take_unary(flag_key)
    }

    async fn resolve_float(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        self.take_unary(flag_key)
    }

    async fn resolve_int(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        self.take_unary(flag_key)
    }

    async fn resolve_object(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> Result<ResolvedPayload, Status> {
        self.take_unary(flag_key)
    }

    async fn open_event_stream(&self) -> Result<EventStream, Status> {
        *self.stream_opens.lock() += 1;
        let session = self.streams.lock().pop_front();
        match session {
            Some(StreamSession::Reject(status)) => Err(status),
            Some(StreamSession::Open(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Sender side of a scripted stream session.
pub struct StreamHandle {
    tx: mpsc::UnboundedSender<Result<StreamEvent, Status>>,
}

impl StreamHandle {
    pub fn ready(&self) {
        let _ = self.tx.send(Ok(StreamEvent::Ready));
    }

    pub fn change(&self, flag_keys: &[&str]) {
        let flags = flag_keys
            .iter()
            .map(|key| {
                (
                    key.to_string(),
                    FlagChange {
                        change_type: ChangeType::Update,
                        source: "mock".to_string(),
                    },
                )
            })
            .collect();
        let _ = self.tx.send(Ok(StreamEvent::ConfigurationChanged { flags }));
    }

    pub fn error(&self, status: Status) {
        let _ = self.tx.send(Err(status));
    }
}

pub fn payload(value: FlagValue, reason: ResolutionReason) -> ResolvedPayload {
    ResolvedPayload {
        value,
        variant: Some("default".to_string()),
        reason,
        metadata: HashMap::new(),
    }
}

pub fn static_bool(value: bool) -> Result<ResolvedPayload, Status> {
    Ok(payload(FlagValue::Bool(value), ResolutionReason::Static))
}

/// Options tuned for tests: near-instant backoff, no jitter, no stream
/// cycling, a deadline generous enough for scripted readiness.
pub fn test_options() -> ProviderOptions {
    ProviderOptions::builder()
        .deadline(Duration::from_secs(2))
        .retry_backoff(Duration::from_millis(10))
        .retry_backoff_max(Duration::from_millis(40))
        .retry_jitter(Duration::ZERO)
        .stream_deadline(Duration::ZERO)
        .build()
}

pub async fn next_event(
    rx: &mut tokio::sync::broadcast::Receiver<flagwire::ProviderEvent>,
) -> flagwire::ProviderEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for provider event")
        .expect("event channel closed")
}

pub async fn wait_for_state(client: &FlagWireClient, state: ConnectionState) {
    for _ in 0..400 {
        if client.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for connection state {:?}", state);
}
