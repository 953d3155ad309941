use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attachment kinds the host can render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachmentKind {
    Photo,
    File,
    Video,
}

/// Flat attachment shape shared by photos, files and videos.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentView {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

/// Normalized chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    /// Message id as a string (ids exceed the host's safe integer range).
    pub id: String,
    pub chat_id: i64,
    pub text: String,
    pub sender_id: Option<i64>,
    /// Same value as `time`; kept for older host models.
    pub date: Option<i64>,
    /// Milliseconds since the Unix epoch.
    pub time: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub reply_to: Option<String>,
    /// Reaction → count; `None` when the message has no reactions.
    pub reactions: Option<BTreeMap<String, i64>>,
    /// `None` when the message has no supported attachments.
    pub attachments: Option<Vec<AttachmentView>>,
}

/// One reaction counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionCounter {
    pub reaction: Option<String>,
    pub count: i64,
}

/// Reaction summary of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionInfoView {
    pub total_count: i64,
    pub your_reaction: Option<String>,
    pub counters: Vec<ReactionCounter>,
}

/// Chat source category. Declaration order is merge priority (lowest first).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatKind {
    Dialog,
    Chat,
    Channel,
}

/// Chat list entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub photo_id: Option<i64>,
    pub icon_url: Option<String>,
    pub unread_count: i64,
    /// Dialog peer user id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cid: Option<i64>,
}

/// Lightweight chat shape returned by join/fetch/update operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBrief {
    pub id: Option<i64>,
    pub title: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<ChatKind>,
    pub icon_url: Option<String>,
}

/// Current user summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    /// Always a string, possibly empty.
    pub first_name: String,
    pub phone: Option<String>,
}

/// User found by phone search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactView {
    pub id: Option<i64>,
    pub name: String,
    pub photo_id: Option<i64>,
    pub phone: Option<String>,
}

/// Chat folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderView {
    pub id: Option<String>,
    pub title: String,
    pub include: Vec<i64>,
}

/// Realtime push event written to the events directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "message_new")]
    MessageNew { message: MessageView },
    #[serde(rename = "message_edit")]
    MessageEdited { message: MessageView },
    #[serde(rename = "message_delete")]
    MessageDeleted { message: MessageView },
    #[serde(rename = "reaction_change")]
    ReactionChanged {
        chat_id: i64,
        message_id: String,
        reaction_info: Option<ReactionInfoView>,
    },
    #[serde(rename = "chat_update")]
    ChatUpdated { chat: ChatUpdateView },
}

impl BridgeEvent {
    /// Stable type tag, identical to the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message_new",
            Self::MessageEdited { .. } => "message_edit",
            Self::MessageDeleted { .. } => "message_delete",
            Self::ReactionChanged { .. } => "reaction_change",
            Self::ChatUpdated { .. } => "chat_update",
        }
    }
}

/// Chat metadata carried by `chat_update` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUpdateView {
    pub id: Option<i64>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub icon_url: Option<String>,
}

/// Result of `create_client`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCreated {
    pub message: String,
}

/// Result of `request_code`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeRequested {
    pub temp_token: String,
}

/// Result of a successful code submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginSuccess {
    pub token: String,
    pub phone: String,
    /// May be absent when the session sync has not populated it yet.
    pub me: Option<UserSummary>,
}

/// Result of `start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartOutcome {
    pub connected: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub me: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requires_auth: Option<bool>,
}

/// Result of `stop`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopOutcome {
    pub message: String,
    /// The keep-alive daemon had fully exited before the loop was torn down.
    pub keepalive_cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatList {
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBriefList {
    pub chats: Vec<ChatBrief>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageList {
    /// Oldest first.
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSent {
    pub message: MessageView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagesDeleted {
    pub deleted: bool,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePinned {
    pub pinned: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadState {
    pub chat_id: i64,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRead {
    pub state: ReadState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionUpdated {
    pub reaction_info: Option<ReactionInfoView>,
}

/// Result of a photo upload: raw attach payload plus its token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoUploaded {
    pub attach: Value,
    pub photo_token: Option<String>,
}

/// Result of a file upload: raw attach payload plus its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileUploaded {
    pub attach: Value,
    pub file_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdated {
    pub updated: bool,
    pub me: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderList {
    pub folders: Vec<FolderView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderSaved {
    pub folder: FolderView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderDeleted {
    pub deleted: bool,
    pub folder_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactFound {
    pub user: ContactView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelResolved {
    pub channel: ChatBrief,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatJoined {
    pub chat: ChatBrief,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatLeft {
    pub left: bool,
    pub chat_id: i64,
}

/// Result of `events_dir` and `register_event_callbacks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventsRegistration {
    pub events_dir: String,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub already_registered: bool,
}
