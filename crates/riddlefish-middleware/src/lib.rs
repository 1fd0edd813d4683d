//! `riddlefish-middleware` – the line to the remote dialogue service.
//!
//! Carries JSON text frames between the orchestrator and the remote service
//! and keeps the connection alive without ever treating a network problem
//! as fatal.
//!
//! # Modules
//!
//! - [`transport`] – the [`DialogueTransport`] trait and
//!   [`WebSocketTransport`], a persistent WebSocket client.
//! - [`backoff`] – capped exponential reconnect delays.
//! - [`connection`] – [`ConnectionManager`]: connection state, scheduled
//!   reconnects and `emit_with_retry`.
//! - [`loopback`] – in-process transport with a scriptable remote end, for
//!   tests.

pub mod backoff;
pub mod connection;
pub mod loopback;
pub mod transport;

pub use backoff::Backoff;
pub use connection::{ConnectionManager, ConnectionState, RetryPolicy, reconnect_due};
pub use transport::{DialogueTransport, TransportError, WebSocketTransport};
