use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::LoopState;

/// Broad error category used for host-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BridgeErrorCategory {
    /// Operation invoked before the protocol client exists.
    NotInitialized,
    /// Invalid caller input (missing file, empty id list, ...).
    InvalidInput,
    /// Transient connection failure that survived the retry policy.
    Network,
    /// The request may have reached the server; the same payload must not be resent.
    AmbiguousDelivery,
    /// Explicit server rejection (invalid/expired code, attempt limit).
    Rejected,
    /// Caller bug, e.g. a blocking call made from inside the execution loop.
    Contract,
    /// The caller stopped waiting for the execution loop.
    Timeout,
    /// Local filesystem failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Any other failure reported by the protocol client or the bridge itself.
    Internal,
}

/// Stable bridge error payload returned across the host boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct BridgeError {
    /// High-level error category.
    pub category: BridgeErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl BridgeError {
    /// Construct a new bridge error.
    pub fn new(
        category: BridgeErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Standard error for operations that need a protocol client.
    pub fn not_initialized() -> Self {
        Self::new(
            BridgeErrorCategory::NotInitialized,
            "client_not_initialized",
            "client not initialized",
        )
    }

    /// Standard error for rejected caller input.
    pub fn invalid_input(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(BridgeErrorCategory::InvalidInput, code, message)
    }

    /// Build a standard invalid execution-loop transition error.
    pub fn invalid_state(current: LoopState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            BridgeErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while execution loop is in state {current:?}"),
        )
    }

    /// Whether the host must ask the user for a fresh one-time code.
    pub fn requires_new_code(&self) -> bool {
        matches!(
            self.category,
            BridgeErrorCategory::Rejected | BridgeErrorCategory::AmbiguousDelivery
        )
    }

    /// Convert a collaborator failure that is not retried any further.
    pub fn from_client(error: &ClientError) -> Self {
        let (category, code) = match classify_client_error(error) {
            FailureKind::Connection => (BridgeErrorCategory::Network, "connection_error"),
            FailureKind::AmbiguousDelivery => (
                BridgeErrorCategory::AmbiguousDelivery,
                "ambiguous_delivery",
            ),
            FailureKind::RejectedInput => (BridgeErrorCategory::Rejected, "rejected_by_server"),
            FailureKind::Other => (BridgeErrorCategory::Internal, "client_error"),
        };
        Self::new(category, code, error.to_string())
    }
}

/// Failure classes the retry policies branch on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    /// Socket/TLS/"not connected" style failure; the request was not delivered.
    Connection,
    /// The request may have been processed even though no reply was observed.
    AmbiguousDelivery,
    /// The server explicitly rejected the submitted value.
    RejectedInput,
    /// Anything else; never retried.
    Other,
}

impl FailureKind {
    /// Whether a pure read may be repeated after this failure.
    ///
    /// Reads carry no side effects, so an ambiguous send is as good as lost.
    pub fn is_transient_for_reads(self) -> bool {
        matches!(self, Self::Connection | Self::AmbiguousDelivery)
    }
}

/// Failure reported by the wrapped protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {message}")]
pub struct ClientError {
    /// Typed classification supplied by the client, when it has one.
    pub kind: Option<FailureKind>,
    /// Name of the client-side failure type (for example `SocketSendError`).
    pub type_name: String,
    /// Failure text as reported by the client.
    pub message: String,
}

impl ClientError {
    /// Untyped failure; classified by [`classify_client_error`].
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: None,
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Failure carrying an explicit classification.
    pub fn typed(
        kind: FailureKind,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(kind),
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

/// Message fragments the server uses when a one-time code can no longer be used.
pub const REJECTED_INPUT_PATTERNS: &[&str] = &[
    "этот код устарел",
    "получите новый",
    "attempt.limit",
];

/// Failure type names raised when a request went out but no reply arrived.
pub const AMBIGUOUS_DELIVERY_TYPES: &[&str] = &["socketsenderror"];

/// Message fragments for the same ambiguous send-and-wait condition.
pub const AMBIGUOUS_DELIVERY_PATTERNS: &[&str] = &["send and wait failed", "opcode.auth"];

/// Failure type names that mean the socket is gone.
pub const CONNECTION_TYPES: &[&str] = &[
    "socketnotconnectederror",
    "ssleoferror",
    "sslerror",
    "connectionerror",
    "connectionreseterror",
    "brokenpipeerror",
    "timeouterror",
];

/// Message fragments that mean the socket is gone.
pub const CONNECTION_PATTERNS: &[&str] = &[
    "not connected",
    "socket",
    "eof",
    "connection",
    "timeout",
    "timed out",
];

/// Map a client failure onto a [`FailureKind`].
///
/// A typed `kind` from the client always wins. Otherwise the pattern tables
/// above are checked in order: rejected input, ambiguous delivery, connection.
/// Matching is case-insensitive. A dropped session ("session" together with
/// "online") counts as a connection failure.
pub fn classify_client_error(error: &ClientError) -> FailureKind {
    if let Some(kind) = error.kind {
        return kind;
    }

    let type_name = error.type_name.to_lowercase();
    let message = error.message.to_lowercase();
    let contains_any = |haystack: &str, needles: &[&str]| {
        needles.iter().any(|needle| haystack.contains(needle))
    };

    if contains_any(&message, REJECTED_INPUT_PATTERNS) {
        return FailureKind::RejectedInput;
    }
    if AMBIGUOUS_DELIVERY_TYPES.contains(&type_name.as_str())
        || contains_any(&message, AMBIGUOUS_DELIVERY_PATTERNS)
    {
        return FailureKind::AmbiguousDelivery;
    }
    if CONNECTION_TYPES.contains(&type_name.as_str())
        || contains_any(&message, CONNECTION_PATTERNS)
        || (message.contains("session") && message.contains("online"))
    {
        return FailureKind::Connection;
    }
    FailureKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_kind_overrides_pattern_table() {
        let err = ClientError::typed(FailureKind::Other, "SocketSendError", "not connected");
        assert_eq!(classify_client_error(&err), FailureKind::Other);
    }

    #[test]
    fn classifies_expired_code_as_rejected() {
        let err = ClientError::new("Error", "Этот код устарел, получите новый");
        assert_eq!(classify_client_error(&err), FailureKind::RejectedInput);

        let err = ClientError::new("Error", "error.code.attempt.limit");
        assert_eq!(classify_client_error(&err), FailureKind::RejectedInput);
    }

    #[test]
    fn classifies_send_and_wait_as_ambiguous() {
        let by_type = ClientError::new("SocketSendError", "boom");
        let by_text = ClientError::new("RuntimeError", "Send and wait failed (opcode=Opcode.AUTH)");
        assert_eq!(classify_client_error(&by_type), FailureKind::AmbiguousDelivery);
        assert_eq!(classify_client_error(&by_text), FailureKind::AmbiguousDelivery);
    }

    #[test]
    fn classifies_socket_failures_as_connection() {
        for err in [
            ClientError::new("SocketNotConnectedError", "oops"),
            ClientError::new("SSLEOFError", "EOF occurred in violation of protocol"),
            ClientError::new("RuntimeError", "Socket is not connected"),
            ClientError::new("RuntimeError", "session is not online"),
        ] {
            assert_eq!(classify_client_error(&err), FailureKind::Connection, "{err}");
        }
    }

    #[test]
    fn leaves_unknown_failures_unclassified() {
        let err = ClientError::new("ValueError", "chat not found");
        assert_eq!(classify_client_error(&err), FailureKind::Other);
    }

    #[test]
    fn ambiguous_delivery_counts_as_transient_only_for_reads() {
        assert!(FailureKind::AmbiguousDelivery.is_transient_for_reads());
        assert!(FailureKind::Connection.is_transient_for_reads());
        assert!(!FailureKind::RejectedInput.is_transient_for_reads());
    }

    #[test]
    fn maps_client_failures_to_host_categories() {
        let err = BridgeError::from_client(&ClientError::new("SocketSendError", "x"));
        assert_eq!(err.category, BridgeErrorCategory::AmbiguousDelivery);
        assert!(err.requires_new_code());

        let err = BridgeError::from_client(&ClientError::new("ValueError", "bad chat"));
        assert_eq!(err.code, "client_error");
        assert!(!err.requires_new_code());
    }

    #[test]
    fn keeps_invalid_state_error_code_stable() {
        let err = BridgeError::invalid_state(LoopState::Stopped, "drain");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(err.category, BridgeErrorCategory::Internal);
    }

    #[test]
    fn persists_retry_after_in_millis() {
        let err = BridgeError::new(BridgeErrorCategory::Network, "connection_error", "wait")
            .with_retry_after(Duration::from_secs(3));
        assert_eq!(err.retry_after_ms, Some(3000));
    }
}
