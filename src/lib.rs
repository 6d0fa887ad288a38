//! flagwire Rust SDK
//!
//! Client for the flagwire feature-flag evaluation daemon: typed flag
//! resolution over unary gRPC calls, a single long-lived event stream for
//! readiness and cache invalidation, and a bounded LRU cache of static
//! resolutions that is kept consistent by server-pushed change
//! notifications.
//!
//! # Quick Start
//!
//! ```no_run
//! use flagwire::{FlagWireClient, ProviderOptions};
//!
//! #[tokio::main]
//! async fn main() -> flagwire::Result<()> {
//!     let options = ProviderOptions::builder()
//!         .host("flags.internal")
//!         .port(8013)
//!         .build();
//!
//!     let client = FlagWireClient::connect(options)?;
//!     client.initialize().await?;
//!
//!     let dark_mode = client.get_boolean_value("dark-mode", false, None).await;
//!     let theme = client.get_string_value("theme", "light", None).await;
//!     println!("dark_mode={dark_mode} theme={theme}");
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod rpc;
pub mod types;
mod client;

// Re-exports from types module
pub use types::{
    EvaluationContext, FlagType, FlagValue, MetadataValue, ResolutionDetails, ResolutionReason,
};

// Re-exports from error module
pub use error::{evaluation_error_for, ErrorCode, FlagWireError, Result};

// Re-exports from config module
pub use config::{ProviderOptions, ProviderOptionsBuilder};

// Re-exports from core module
pub use self::core::{
    BackoffPolicy, ConnectionManager, ConnectionState, FailureClass, InitState, ProviderEvent,
    ResolutionCache, Resolver, StatusClassifier,
};

// Re-exports from rpc module
pub use rpc::{
    ChangeType, EvaluationRpc, EventStream, FlagChange, GrpcEvaluation, ResolvedPayload,
    StreamEvent,
};

// Re-exports from client module
pub use client::FlagWireClient;
