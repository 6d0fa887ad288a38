use futures_util::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tonic::Status;

use crate::core::cache::ResolutionCache;
use crate::core::classify::{FailureClass, StatusClassifier};
use crate::core::retry::BackoffPolicy;
use crate::error::ErrorCode;
use crate::rpc::{EvaluationRpc, EventStream, FlagChange, StreamEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of the single logical connection to the evaluation service.
///
/// The cache is usable only while `Streaming`; every other state makes the
/// resolver bypass it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    ErrorBackoff,
    FatallyFailed,
    Closed,
}

/// Notifications for subscribers watching connection health and
/// configuration changes.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// First successful readiness.
    Ready,
    /// Readiness after a drop; distinguishable from the first `Ready`.
    Reconnected,
    /// The server reported changes to exactly these flags.
    ConfigurationChanged { flag_keys: Vec<String> },
    /// A transient connection failure; reconnection is underway.
    Error { code: ErrorCode, message: String },
    /// A permanent startup failure; no reconnection will be attempted.
    Fatal { code: ErrorCode, message: String },
}

/// Progress of the one-time initialization gate.
#[derive(Debug, Clone, PartialEq)]
pub enum InitState {
    Pending,
    Ready,
    Failed { code: ErrorCode, message: String },
}

enum StreamDrop {
    /// Caller-initiated shutdown observed.
    Shutdown,
    /// The server rejected the stream with an explicit status.
    Rejected(Status),
    /// Network-level reset or deadline cycling; no status attached.
    Dropped,
}

/// Owns the event stream and drives the reconnect state machine.
///
/// Single-writer: only the background task mutates the state; the resolver
/// and subscribers just read it.
pub struct ConnectionManager {
    rpc: Arc<dyn EvaluationRpc>,
    cache: ResolutionCache,
    classifier: StatusClassifier,
    backoff: BackoffPolicy,
    stream_deadline: Duration,
    state: RwLock<ConnectionState>,
    ever_connected: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
    init_tx: watch::Sender<InitState>,
    init_rx: watch::Receiver<InitState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub fn new(
        rpc: Arc<dyn EvaluationRpc>,
        cache: ResolutionCache,
        classifier: StatusClassifier,
        backoff: BackoffPolicy,
        stream_deadline: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (init_tx, init_rx) = watch::channel(InitState::Pending);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            rpc,
            cache,
            classifier,
            backoff,
            stream_deadline,
            state: RwLock::new(ConnectionState::Connecting),
            ever_connected: AtomicBool::new(false),
            events,
            init_tx,
            init_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    pub fn init_watch(&self) -> watch::Receiver<InitState> {
        self.init_rx.clone()
    }

    /// Spawns the background connection loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run().await })
    }

    /// Caller-initiated shutdown; idempotent. The background task observes
    /// the signal at its next suspension point and exits. In-flight unary
    /// calls are left to complete or time out on their own.
    pub fn shutdown(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        tracing::debug!("shutting down connection manager");

        self.fail_pending_init(ErrorCode::ProviderClosed, "client shut down");
        {
            let mut state = self.state.write();
            if *state != ConnectionState::FatallyFailed {
                *state = ConnectionState::Closed;
            }
        }
        self.cache.clear();
        let _ = self.shutdown_tx.send(true);
    }

    async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut delay = self.backoff.first_delay();
        let mut immediate_retry_used = false;

        loop {
            if *shutdown.borrow() {
                break;
            }
            if matches!(
                self.state(),
                ConnectionState::Closed | ConnectionState::FatallyFailed
            ) {
                break;
            }

            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = shutdown.changed() => break,
                opened = self.rpc.open_event_stream() => opened,
            };

            match opened {
                Err(status) => {
                    if !self
                        .handle_stream_failure(&status, &mut delay, &mut shutdown)
                        .await
                    {
                        break;
                    }
                }
                Ok(mut stream) => {
                    let mut saw_ready = false;
                    let outcome = self
                        .pump_stream(&mut stream, &mut shutdown, &mut saw_ready)
                        .await;
                    // Dropping the handle cancels the RPC; nothing can fire
                    // on an abandoned stream past this point.
                    drop(stream);

                    if saw_ready {
                        delay = self.backoff.first_delay();
                        immediate_retry_used = false;
                    }
                    // Staleness is unbounded while disconnected, so leaving
                    // Streaming always empties the cache.
                    self.cache.clear();

                    match outcome {
                        StreamDrop::Shutdown => break,
                        StreamDrop::Rejected(status) => {
                            if !self
                                .handle_stream_failure(&status, &mut delay, &mut shutdown)
                                .await
                            {
                                break;
                            }
                        }
                        StreamDrop::Dropped => {
                            self.set_state(ConnectionState::ErrorBackoff);
                            self.emit(ProviderEvent::Error {
                                code: ErrorCode::StreamError,
                                message: "event stream disconnected".to_string(),
                            });
                            if immediate_retry_used {
                                if !self.sleep_backoff(delay, &mut shutdown).await {
                                    break;
                                }
                                delay = self.backoff.next_delay(delay);
                            } else {
                                // One immediate reconnect after a clean
                                // network drop; repeated drops back off.
                                immediate_retry_used = true;
                            }
                        }
                    }
                }
            }
        }

        self.finish();
    }

    async fn pump_stream(
        &self,
        stream: &mut EventStream,
        shutdown: &mut watch::Receiver<bool>,
        saw_ready: &mut bool,
    ) -> StreamDrop {
        let cycle = async {
            if self.stream_deadline.is_zero() {
                futures_util::future::pending::<()>().await
            } else {
                tokio::time::sleep(self.stream_deadline).await
            }
        };
        tokio::pin!(cycle);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return StreamDrop::Shutdown,
                _ = &mut cycle => {
                    tracing::debug!("stream deadline reached, cycling connection");
                    return StreamDrop::Dropped;
                }
                item = stream.next() => match item {
                    Some(Ok(StreamEvent::Ready)) => self.on_ready(saw_ready),
                    Some(Ok(StreamEvent::ConfigurationChanged { flags })) => {
                        self.on_configuration_changed(flags);
                    }
                    Some(Err(status)) => return StreamDrop::Rejected(status),
                    None => return StreamDrop::Dropped,
                }
            }
        }
    }

    fn on_ready(&self, saw_ready: &mut bool) {
        if self.state() == ConnectionState::Streaming {
            // Duplicate ready on a live stream; nothing to do.
            return;
        }

        *saw_ready = true;
        let first = !self.ever_connected.swap(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Streaming);

        if first {
            tracing::info!("provider ready");
            self.init_tx.send_replace(InitState::Ready);
            self.emit(ProviderEvent::Ready);
        } else {
            tracing::info!("provider reconnected");
            self.emit(ProviderEvent::Reconnected);
        }
    }

    fn on_configuration_changed(&self, flags: HashMap<String, FlagChange>) {
        let flag_keys: Vec<String> = flags.into_keys().collect();
        tracing::debug!(count = flag_keys.len(), "configuration changed");

        // Only the named flags are dropped; everything else stays warm.
        self.cache.invalidate(&flag_keys);
        self.emit(ProviderEvent::ConfigurationChanged { flag_keys });
    }

    /// Returns false when the loop must stop (fatal failure or shutdown
    /// observed while backing off).
    async fn handle_stream_failure(
        &self,
        status: &Status,
        delay: &mut Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.cache.clear();

        let ever_connected = self.ever_connected.load(Ordering::SeqCst);
        match self.classifier.classify(status.code(), ever_connected) {
            FailureClass::Fatal => {
                tracing::error!(
                    code = %status.code(),
                    message = status.message(),
                    "fatal connection failure"
                );
                self.set_state(ConnectionState::FatallyFailed);
                self.fail_pending_init(
                    ErrorCode::ProviderFatal,
                    &format!(
                        "connection rejected with {}: {}",
                        status.code(),
                        status.message()
                    ),
                );
                self.emit(ProviderEvent::Fatal {
                    code: ErrorCode::ProviderFatal,
                    message: status.message().to_string(),
                });
                false
            }
            FailureClass::Transient => {
                tracing::warn!(code = %status.code(), "transient connection failure");
                self.set_state(ConnectionState::ErrorBackoff);
                self.emit(ProviderEvent::Error {
                    code: ErrorCode::ConnectionError,
                    message: status.message().to_string(),
                });
                // An explicit rejection status means the endpoint is actively
                // refusing; a full delay avoids a tight retry loop against it.
                if !self.sleep_backoff(*delay, shutdown).await {
                    return false;
                }
                *delay = self.backoff.next_delay(*delay);
                true
            }
        }
    }

    async fn sleep_backoff(
        &self,
        delay: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let wait = self.backoff.jittered(delay);
        tracing::debug!(?wait, "reconnect backoff");
        tokio::select! {
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if matches!(
            *state,
            ConnectionState::FatallyFailed | ConnectionState::Closed
        ) {
            return;
        }
        if *state != next {
            let from = *state;
            tracing::debug!(?from, to = ?next, "connection state");
            *state = next;
        }
    }

    fn fail_pending_init(&self, code: ErrorCode, message: &str) {
        self.init_tx.send_if_modified(|state| {
            if *state == InitState::Pending {
                *state = InitState::Failed {
                    code,
                    message: message.to_string(),
                };
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    fn finish(&self) {
        self.fail_pending_init(ErrorCode::ProviderClosed, "connection manager stopped");
        {
            let mut state = self.state.write();
            if *state != ConnectionState::FatallyFailed {
                *state = ConnectionState::Closed;
            }
        }
        self.cache.clear();
    }
}
