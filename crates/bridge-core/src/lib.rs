//! Runtime-independent contract of the chat bridge.
//!
//! This crate defines the host-facing payload and event types, the error
//! taxonomy, retry parameters, the execution-loop lifecycle model, and the
//! normalization of raw server records into stable shapes.

/// Chat list merge with kind priority.
pub mod chats;
/// Stable bridge error types and client failure classification.
pub mod error;
/// Record-to-view conversions for messages, chats, users and folders.
pub mod normalization;
/// Version-tolerant field access on raw server records.
pub mod record;
/// Backoff policies used by retry loops.
pub mod retry;
/// Execution loop lifecycle state machine.
pub mod state_machine;
/// Host-facing payload and event types.
pub mod types;

pub use chats::ChatAggregate;
pub use error::{BridgeError, BridgeErrorCategory, ClientError, FailureKind, classify_client_error};
pub use record::{FieldSource, Record, RecordValue};
pub use retry::{RetryPolicies, RetryPolicy};
pub use state_machine::{LoopState, LoopStateMachine};
pub use types::{
    AttachmentKind, AttachmentView, BridgeEvent, ChannelResolved, ChatBrief, ChatBriefList,
    ChatJoined, ChatKind, ChatLeft, ChatList, ChatSummary, ChatUpdateView, ClientCreated,
    CodeRequested, ContactFound, ContactView, EventsRegistration, FileUploaded, FolderDeleted,
    FolderList, FolderSaved, FolderView, LoginSuccess, MessageList, MessagePinned, MessageRead,
    MessageSent, MessageView, MessagesDeleted, PhotoUploaded, ProfileUpdated, ReactionCounter,
    ReactionInfoView, ReactionUpdated, ReadState, StartOutcome, StopOutcome, UserSummary,
};
