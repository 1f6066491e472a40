//! Gradebox-Gateway: HTTP transports for the Gradebox job gateway
//!
//! Implements the transport capabilities of `gradebox-core` against a
//! single gateway service.
//!
//! ## Key Components
//!
//! - `Gateway`: shared client handing out the transports
//! - `HttpBlobStore`: project archive upload
//! - `HttpBroker`: job queue, selected per server architecture
//! - `HttpPubSub`: newline-delimited JSON log streaming

mod blob;
mod broker;
mod client;
pub mod config;
mod error;
mod pubsub;

pub use blob::HttpBlobStore;
pub use broker::HttpBroker;
pub use client::Gateway;
pub use config::{GatewayConfig, DEFAULT_GATEWAY_URL, DEFAULT_TIMEOUT};
pub use error::GatewayError;
pub use pubsub::HttpPubSub;

/// Result type for gradebox-gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
