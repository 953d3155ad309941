//! Contract of the wrapped chat-protocol client.
//!
//! The bridge never speaks the wire protocol itself. Everything it needs from
//! the client library is listed here; records come back in the loosely-typed
//! [`Record`] shape and are normalized by `bridge_core::normalization`.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bridge_core::{ClientError, Record};
use serde_json::Value;

/// Construction parameters for one protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub phone: String,
    /// Session storage directory. `None` uses the configured default.
    pub work_dir: Option<PathBuf>,
    /// Previously saved auth token, if any.
    pub token: Option<String>,
}

impl SessionParams {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            work_dir: None,
            token: None,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Attachment kinds the client can upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Photo,
    File,
}

impl UploadKind {
    /// `photo`, `image` and `img` select a photo; anything else is a file.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "photo" | "image" | "img" => Self::Photo,
            _ => Self::File,
        }
    }
}

/// Local file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub kind: UploadKind,
    pub path: PathBuf,
}

/// Outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
    pub notify: bool,
    pub attachment: Option<Upload>,
}

/// Profile change request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChange {
    pub first_name: String,
    pub last_name: Option<String>,
    pub description: Option<String>,
    pub photo: Option<PathBuf>,
}

/// Server push delivered by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    MessageNew(Record),
    MessageEdited(Record),
    MessageDeleted(Record),
    ReactionChanged {
        chat_id: i64,
        message_id: String,
        reaction_info: Option<Record>,
    },
    ChatUpdated(Record),
}

pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

/// Asynchronous chat-protocol client.
///
/// Implementations own the socket and its receive loop. Accessors are cheap
/// snapshots of client-side caches; the async methods talk to the server.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Whether a live socket is present.
    fn is_connected(&self) -> bool;

    fn token(&self) -> Option<String>;

    /// Current user, populated by [`ProtocolClient::sync`].
    fn me(&self) -> Option<Record>;

    fn dialogs(&self) -> Vec<Record>;

    fn chats(&self) -> Vec<Record>;

    fn channels(&self) -> Vec<Record>;

    fn cached_user(&self, user_id: i64) -> Option<Record>;

    /// Close the raw socket and clear the connectivity flag.
    fn reset_socket(&self);

    fn set_push_handler(&self, handler: PushHandler);

    async fn connect(&self) -> Result<(), ClientError>;

    /// Cancel the background receive/send tasks of a previous connection.
    async fn cleanup(&self) -> Result<(), ClientError>;

    /// Session sync; populates `me` and the chat caches.
    async fn sync(&self) -> Result<(), ClientError>;

    async fn post_login_setup(&self) -> Result<(), ClientError>;

    async fn close(&self) -> Result<(), ClientError>;

    /// Ask the server to send a one-time code. Returns a temporary token.
    async fn request_code(&self, phone: &str, language: &str) -> Result<String, ClientError>;

    async fn login_with_code(&self, temp_token: &str, code: &str) -> Result<(), ClientError>;

    async fn get_users(&self, user_ids: &[i64]) -> Result<Vec<Record>, ClientError>;

    async fn get_chats(&self, chat_ids: &[i64]) -> Result<Vec<Record>, ClientError>;

    async fn fetch_history(&self, chat_id: i64, backward: u32) -> Result<Vec<Record>, ClientError>;

    async fn send_message(&self, message: OutgoingMessage) -> Result<Option<Record>, ClientError>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Option<Record>, ClientError>;

    async fn delete_messages(
        &self,
        chat_id: i64,
        message_ids: &[i64],
        for_me: bool,
    ) -> Result<bool, ClientError>;

    async fn pin_message(
        &self,
        chat_id: i64,
        message_id: i64,
        notify: bool,
    ) -> Result<bool, ClientError>;

    async fn read_message(&self, chat_id: i64, message_id: i64) -> Result<(), ClientError>;

    async fn add_reaction(
        &self,
        chat_id: i64,
        message_id: &str,
        reaction: &str,
    ) -> Result<Option<Record>, ClientError>;

    async fn remove_reaction(
        &self,
        chat_id: i64,
        message_id: &str,
    ) -> Result<Option<Record>, ClientError>;

    /// Upload a file and return the raw attach payload.
    async fn upload(&self, upload: &Upload) -> Result<Option<Value>, ClientError>;

    async fn change_profile(&self, change: &ProfileChange) -> Result<bool, ClientError>;

    async fn get_folders(&self, folder_sync: i64) -> Result<Vec<Record>, ClientError>;

    async fn fetch_chats(&self, marker: Option<i64>) -> Result<Vec<Record>, ClientError>;

    async fn search_by_phone(&self, phone: &str) -> Result<Option<Record>, ClientError>;

    async fn resolve_channel_by_name(&self, name: &str) -> Result<Option<Record>, ClientError>;

    async fn create_folder(
        &self,
        title: &str,
        include: &[i64],
    ) -> Result<Option<Record>, ClientError>;

    async fn update_folder(
        &self,
        folder_id: &str,
        title: &str,
        include: Option<&[i64]>,
    ) -> Result<Option<Record>, ClientError>;

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ClientError>;

    async fn join_group(&self, link: &str) -> Result<Option<Record>, ClientError>;

    async fn join_channel(&self, link: &str) -> Result<Option<Record>, ClientError>;

    async fn leave_group(&self, chat_id: i64) -> Result<(), ClientError>;

    async fn leave_channel(&self, chat_id: i64) -> Result<(), ClientError>;
}

/// Builds protocol clients on demand.
pub trait ClientFactory: Send + Sync {
    fn create(&self, params: &SessionParams) -> Result<Arc<dyn ProtocolClient>, ClientError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&SessionParams) -> Result<Arc<dyn ProtocolClient>, ClientError> + Send + Sync,
{
    fn create(&self, params: &SessionParams) -> Result<Arc<dyn ProtocolClient>, ClientError> {
        self(params)
    }
}
