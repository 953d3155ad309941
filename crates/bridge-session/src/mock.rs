//! Scripted in-memory [`ProtocolClient`] for session runtime tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bridge_core::{ClientError, Record, RecordValue};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::client::{OutgoingMessage, ProfileChange, ProtocolClient, PushEvent, PushHandler, Upload};

pub const SESSION_TOKEN: &str = "session-token";
pub const TEMP_TOKEN: &str = "temp-token";

#[derive(Default)]
struct MockState {
    connected: bool,
    token: Option<String>,
    me: Option<Record>,
    identity: Option<Record>,
    calls: Vec<(String, Duration)>,
    failures: HashMap<String, VecDeque<ClientError>>,
    dialogs: Vec<Record>,
    chats: Vec<Record>,
    channels: Vec<Record>,
    users: HashMap<i64, Record>,
    cached_users: HashMap<i64, Record>,
    history: HashMap<i64, Vec<Record>>,
    folders: Vec<Record>,
    sent: Vec<OutgoingMessage>,
    push_handler: Option<PushHandler>,
}

pub struct MockClient {
    state: Mutex<MockState>,
    connect_delay: Duration,
    connects_in_flight: AtomicUsize,
    max_connects_in_flight: AtomicUsize,
    created: Instant,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            connect_delay: Duration::ZERO,
            connects_in_flight: AtomicUsize::new(0),
            max_connects_in_flight: AtomicUsize::new(0),
            created: Instant::now(),
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_token(self, token: &str) -> Self {
        self.lock().token = Some(token.to_owned());
        self
    }

    pub fn connected(self) -> Self {
        self.lock().connected = true;
        self
    }

    /// Record `sync` installs as the current user.
    pub fn with_identity(self, me: Record) -> Self {
        self.lock().identity = Some(me);
        self
    }

    pub fn with_dialogs(self, dialogs: Vec<Record>) -> Self {
        self.lock().dialogs = dialogs;
        self
    }

    /// Group chats: the cached list holds ids only, full records come from `get_chats`.
    pub fn with_chats(self, chats: Vec<Record>) -> Self {
        self.lock().chats = chats;
        self
    }

    pub fn with_channels(self, channels: Vec<Record>) -> Self {
        self.lock().channels = channels;
        self
    }

    /// User known to the server but not yet in the client cache.
    pub fn with_remote_user(self, id: i64, user: Record) -> Self {
        self.lock().users.insert(id, user);
        self
    }

    pub fn with_cached_user(self, id: i64, user: Record) -> Self {
        self.lock().cached_users.insert(id, user);
        self
    }

    pub fn with_history(self, chat_id: i64, messages: Vec<Record>) -> Self {
        self.lock().history.insert(chat_id, messages);
        self
    }

    pub fn with_folders(self, folders: Vec<Record>) -> Self {
        self.lock().folders = folders;
        self
    }

    /// Queue a failure for the next call of `op`.
    pub fn fail_next(&self, op: &str, error: ClientError) {
        self.lock()
            .failures
            .entry(op.to_owned())
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(|(op, _)| op.clone()).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|(name, _)| name == op).count()
    }

    /// Offsets from mock creation at which `op` was called.
    pub fn call_times(&self, op: &str) -> Vec<Duration> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn max_connects_in_flight(&self) -> usize {
        self.max_connects_in_flight.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.lock().sent.clone()
    }

    pub fn has_push_handler(&self) -> bool {
        self.lock().push_handler.is_some()
    }

    /// Deliver a server push to the registered handler, if any.
    pub fn push(&self, event: PushEvent) {
        let handler = self.lock().push_handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, then pop a scripted failure for it.
    fn enter(&self, op: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        let at = self.created.elapsed();
        state.calls.push((op.to_owned(), at));
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn chat_record(id: i64, title: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("title", title)
        .with("base_icon_url", format!("https://cdn.example/chat/{id}.png"))
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    fn me(&self) -> Option<Record> {
        self.lock().me.clone()
    }

    fn dialogs(&self) -> Vec<Record> {
        self.lock().dialogs.clone()
    }

    fn chats(&self) -> Vec<Record> {
        self.lock().chats.clone()
    }

    fn channels(&self) -> Vec<Record> {
        self.lock().channels.clone()
    }

    fn cached_user(&self, user_id: i64) -> Option<Record> {
        self.lock().cached_users.get(&user_id).cloned()
    }

    fn reset_socket(&self) {
        let mut state = self.lock();
        let at = self.created.elapsed();
        state.calls.push(("reset_socket".to_owned(), at));
        state.connected = false;
    }

    fn set_push_handler(&self, handler: PushHandler) {
        self.lock().push_handler = Some(handler);
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let in_flight = self.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_connects_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let entered = self.enter("connect");
        if entered.is_ok() && !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        entered?;

        self.lock().connected = true;
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), ClientError> {
        self.enter("cleanup")?;
        self.lock().connected = false;
        Ok(())
    }

    async fn sync(&self) -> Result<(), ClientError> {
        self.enter("sync")?;
        let mut state = self.lock();
        let me = state
            .identity
            .clone()
            .unwrap_or_else(|| Record::new().with("id", 1_i64));
        state.me = Some(me);
        Ok(())
    }

    async fn post_login_setup(&self) -> Result<(), ClientError> {
        self.enter("post_login_setup")
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.enter("close")?;
        self.lock().connected = false;
        Ok(())
    }

    async fn request_code(&self, _phone: &str, _language: &str) -> Result<String, ClientError> {
        self.enter("request_code")?;
        Ok(TEMP_TOKEN.to_owned())
    }

    async fn login_with_code(&self, _temp_token: &str, _code: &str) -> Result<(), ClientError> {
        self.enter("login_with_code")?;
        self.lock().token = Some(SESSION_TOKEN.to_owned());
        Ok(())
    }

    async fn get_users(&self, user_ids: &[i64]) -> Result<Vec<Record>, ClientError> {
        self.enter("get_users")?;
        let mut state = self.lock();
        let mut found = Vec::new();
        for id in user_ids {
            if let Some(user) = state.users.get(id).cloned() {
                state.cached_users.insert(*id, user.clone());
                found.push(user);
            }
        }
        Ok(found)
    }

    async fn get_chats(&self, chat_ids: &[i64]) -> Result<Vec<Record>, ClientError> {
        self.enter("get_chats")?;
        let state = self.lock();
        Ok(chat_ids
            .iter()
            .map(|id| {
                state
                    .chats
                    .iter()
                    .find(|chat| chat.get("id") == Some(&RecordValue::Int(*id)))
                    .filter(|chat| chat.get("title").is_some())
                    .cloned()
                    .unwrap_or_else(|| chat_record(*id, &format!("Chat {id}")))
            })
            .collect())
    }

    async fn fetch_history(&self, chat_id: i64, backward: u32) -> Result<Vec<Record>, ClientError> {
        self.enter("fetch_history")?;
        let state = self.lock();
        Ok(state
            .history
            .get(&chat_id)
            .map(|messages| messages.iter().take(backward as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<Option<Record>, ClientError> {
        self.enter("send_message")?;
        let mut state = self.lock();
        let id = 1_000 + state.sent.len() as i64;
        let record = Record::new()
            .with("id", id)
            .with("chatId", message.chat_id)
            .with("text", message.text.clone())
            .with("time", 1_700_000_000_000_i64);
        state.sent.push(message);
        Ok(Some(record))
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Option<Record>, ClientError> {
        self.enter("edit_message")?;
        Ok(Some(
            Record::new()
                .with("id", message_id)
                .with("chat_id", chat_id)
                .with("text", text),
        ))
    }

    async fn delete_messages(
        &self,
        _chat_id: i64,
        _message_ids: &[i64],
        _for_me: bool,
    ) -> Result<bool, ClientError> {
        self.enter("delete_messages")?;
        Ok(true)
    }

    async fn pin_message(
        &self,
        _chat_id: i64,
        _message_id: i64,
        _notify: bool,
    ) -> Result<bool, ClientError> {
        self.enter("pin_message")?;
        Ok(true)
    }

    async fn read_message(&self, _chat_id: i64, _message_id: i64) -> Result<(), ClientError> {
        self.enter("read_message")
    }

    async fn add_reaction(
        &self,
        _chat_id: i64,
        _message_id: &str,
        reaction: &str,
    ) -> Result<Option<Record>, ClientError> {
        self.enter("add_reaction")?;
        Ok(Some(
            Record::new()
                .with("totalCount", 1)
                .with("yourReaction", reaction)
                .with(
                    "counters",
                    RecordValue::List(vec![
                        Record::new().with("reaction", reaction).with("count", 1).into(),
                    ]),
                ),
        ))
    }

    async fn remove_reaction(
        &self,
        _chat_id: i64,
        _message_id: &str,
    ) -> Result<Option<Record>, ClientError> {
        self.enter("remove_reaction")?;
        Ok(None)
    }

    async fn upload(&self, upload: &Upload) -> Result<Option<Value>, ClientError> {
        self.enter("upload")?;
        Ok(Some(match upload.kind {
            crate::client::UploadKind::Photo => json!({"_type": "PHOTO", "photoToken": "ph-1"}),
            crate::client::UploadKind::File => json!({"_type": "FILE", "fileId": 77}),
        }))
    }

    async fn change_profile(&self, change: &ProfileChange) -> Result<bool, ClientError> {
        self.enter("change_profile")?;
        let mut state = self.lock();
        if let Some(me) = state.me.as_mut() {
            me.insert(
                "names",
                RecordValue::List(vec![
                    Record::new().with("firstName", change.first_name.clone()).into(),
                ]),
            );
        }
        Ok(true)
    }

    async fn get_folders(&self, _folder_sync: i64) -> Result<Vec<Record>, ClientError> {
        self.enter("get_folders")?;
        Ok(self.lock().folders.clone())
    }

    async fn fetch_chats(&self, _marker: Option<i64>) -> Result<Vec<Record>, ClientError> {
        self.enter("fetch_chats")?;
        Ok(vec![chat_record(300, "Fetched")])
    }

    async fn search_by_phone(&self, phone: &str) -> Result<Option<Record>, ClientError> {
        self.enter("search_by_phone")?;
        let state = self.lock();
        Ok(state
            .users
            .values()
            .find(|user| user.get("phone") == Some(&RecordValue::Text(phone.to_owned())))
            .cloned())
    }

    async fn resolve_channel_by_name(&self, name: &str) -> Result<Option<Record>, ClientError> {
        self.enter("resolve_channel_by_name")?;
        let state = self.lock();
        Ok(state
            .channels
            .iter()
            .find(|channel| channel.get("name") == Some(&RecordValue::Text(name.to_owned())))
            .cloned())
    }

    async fn create_folder(
        &self,
        title: &str,
        include: &[i64],
    ) -> Result<Option<Record>, ClientError> {
        self.enter("create_folder")?;
        let include = include.iter().copied().map(RecordValue::Int).collect::<Vec<_>>();
        Ok(Some(
            Record::new()
                .with("id", "folder-1")
                .with("title", title)
                .with("include", include),
        ))
    }

    async fn update_folder(
        &self,
        folder_id: &str,
        title: &str,
        include: Option<&[i64]>,
    ) -> Result<Option<Record>, ClientError> {
        self.enter("update_folder")?;
        let mut folder = Record::new().with("id", folder_id).with("title", title);
        if let Some(include) = include {
            folder.insert(
                "include",
                include.iter().copied().map(RecordValue::Int).collect::<Vec<_>>(),
            );
        }
        Ok(Some(folder))
    }

    async fn delete_folder(&self, _folder_id: &str) -> Result<(), ClientError> {
        self.enter("delete_folder")
    }

    async fn join_group(&self, _link: &str) -> Result<Option<Record>, ClientError> {
        self.enter("join_group")?;
        Ok(Some(chat_record(500, "Joined group")))
    }

    async fn join_channel(&self, _link: &str) -> Result<Option<Record>, ClientError> {
        self.enter("join_channel")?;
        Ok(Some(chat_record(600, "Joined channel")))
    }

    async fn leave_group(&self, _chat_id: i64) -> Result<(), ClientError> {
        self.enter("leave_group")
    }

    async fn leave_channel(&self, _chat_id: i64) -> Result<(), ClientError> {
        self.enter("leave_channel")
    }
}
