//! Synchronous session facade over an async chat-protocol client.
//!
//! A [`ChatBridge`] owns one protocol client and one dedicated execution loop.
//! Host threads call its blocking methods; the work runs on the loop, guarded
//! by a [`SessionGuard`], retried per operation class, and returned as stable
//! `bridge_core` payloads. Server pushes are written to an events directory
//! the host polls.

/// Blocking host-facing session object.
pub mod bridge;
/// Protocol client contract and factory.
pub mod client;
/// Environment-backed configuration.
pub mod config;
/// Push-to-file event bridge.
pub mod events;
/// Dedicated execution loop thread.
pub mod executor;
/// Serialized connection lifecycle.
pub mod guard;
/// JSON result shaping for hosts.
pub mod host;
/// Background keep-alive daemon.
pub mod keepalive;
/// Tracing subscriber bootstrap.
pub mod logging;
/// Retry loops per operation class.
pub mod policy;

#[cfg(test)]
mod mock;

pub use bridge::ChatBridge;
pub use client::{
    ClientFactory, OutgoingMessage, ProfileChange, ProtocolClient, PushEvent, PushHandler,
    SessionParams, Upload, UploadKind,
};
pub use config::{BridgeConfig, ConfigError, KeepAliveTimings};
pub use events::EventBridge;
pub use executor::{ExecutionLoop, LoopTimeouts};
pub use guard::SessionGuard;
pub use host::{respond, respond_json};
pub use keepalive::KeepAlive;
