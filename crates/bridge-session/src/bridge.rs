//! Blocking session object exposed to the host.
//!
//! Every operation hands one future to the [`ExecutionLoop`] and blocks on it.
//! Inside the loop all connection work funnels through the [`SessionGuard`],
//! reads and joins go through their retry policies, and raw records are
//! normalized before they cross back to the host.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use bridge_core::{
    BridgeError, BridgeErrorCategory, ChannelResolved, ChatAggregate, ChatBriefList, ChatJoined,
    ChatKind, ChatLeft, ChatList, ChatSummary, ClientCreated, ClientError, CodeRequested,
    ContactFound, EventsRegistration, FileUploaded, FolderDeleted, FolderList, FolderSaved,
    LoginSuccess, LoopState, MessageList, MessagePinned, MessageRead, MessageSent,
    MessagesDeleted, PhotoUploaded, ProfileUpdated, ReactionUpdated, ReadState, Record,
    RecordValue, StartOutcome, StopOutcome,
    normalization::{
        chat_brief, contact_view, dialog_peer_id, dialog_summary, folder_view, group_summary,
        message_from_record, reaction_info_from_record, sort_messages_by_time, user_summary,
    },
    record::{aliases, coerce_int, coerce_int_list, get_present},
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        ClientFactory, OutgoingMessage, ProfileChange, ProtocolClient, SessionParams, Upload,
        UploadKind,
    },
    config::BridgeConfig,
    events::EventBridge,
    executor::{ExecutionLoop, LoopTimeouts},
    guard::SessionGuard,
    keepalive::KeepAlive,
    policy::{retry_idempotent, retry_membership, submit_code},
};

const DEFAULT_LANGUAGE: &str = "ru";

/// One chat account driven synchronously by the host.
pub struct ChatBridge {
    config: BridgeConfig,
    params: SessionParams,
    factory: Arc<dyn ClientFactory>,
    executor: ExecutionLoop,
    session: Mutex<Option<Arc<SessionGuard>>>,
    keepalive: Arc<KeepAlive>,
    events: Arc<EventBridge>,
}

impl ChatBridge {
    /// Build the bridge. No protocol client exists until [`ChatBridge::create_client`]
    /// (or an operation that creates one on demand) runs.
    pub fn new(
        config: BridgeConfig,
        params: SessionParams,
        factory: impl ClientFactory + 'static,
    ) -> Self {
        let work_dir = params
            .work_dir
            .clone()
            .unwrap_or_else(|| config.work_dir.clone());
        let events = Arc::new(EventBridge::new(config.events_dir_for(&work_dir)));
        let executor = ExecutionLoop::new(LoopTimeouts {
            ready: config.loop_ready_timeout,
            call: config.call_timeout,
            drain: config.loop_drain_timeout,
        });
        let keepalive = Arc::new(KeepAlive::new(config.keepalive));
        let params = SessionParams {
            work_dir: Some(work_dir),
            ..params
        };

        Self {
            config,
            params,
            factory: Arc::new(factory),
            executor,
            session: Mutex::new(None),
            keepalive,
            events,
        }
    }

    pub fn phone(&self) -> &str {
        &self.params.phone
    }

    pub fn loop_state(&self) -> LoopState {
        self.executor.state()
    }

    pub fn has_client(&self) -> bool {
        self.lock_session().is_some()
    }

    pub fn create_client(&self) -> Result<ClientCreated, BridgeError> {
        let mut session = self.lock_session();
        if session.is_some() {
            return Ok(ClientCreated {
                message: "client already created".to_owned(),
            });
        }

        let client = self.factory.create(&self.params).map_err(|err| {
            BridgeError::new(BridgeErrorCategory::Internal, "client_create_failed", err.to_string())
        })?;
        *session = Some(Arc::new(SessionGuard::new(client)));
        info!("protocol client created");
        Ok(ClientCreated {
            message: "client created".to_owned(),
        })
    }

    /// Ask the server to send a one-time code. `phone` defaults to the
    /// session's phone, `language` to `ru`.
    pub fn request_code(
        &self,
        phone: Option<&str>,
        language: Option<&str>,
    ) -> Result<CodeRequested, BridgeError> {
        let guard = self.guard_or_create()?;
        let phone = phone
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .unwrap_or(self.params.phone.as_str())
            .to_owned();
        let language = language.unwrap_or(DEFAULT_LANGUAGE).to_owned();
        let backoff = self.config.retry.sensitive_submission.delay_for_attempt(1);

        self.executor.run(async move {
            guard
                .connect_with_retry(backoff)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            let temp_token = guard
                .client()
                .request_code(&phone, &language)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            info!("one-time code requested");
            Ok(CodeRequested { temp_token })
        })
    }

    /// Submit a one-time code and bring the session up.
    ///
    /// Rejected and possibly-delivered submissions come back with
    /// [`BridgeError::requires_new_code`] set and are never resent.
    pub fn login_with_code(
        &self,
        temp_token: &str,
        code: &str,
    ) -> Result<LoginSuccess, BridgeError> {
        let guard = self.guard_or_create()?;
        let keepalive = Arc::clone(&self.keepalive);
        let policy = self.config.retry.sensitive_submission;
        let settle = self.config.connect_settle;
        let phone = self.params.phone.clone();
        let temp_token = temp_token.to_owned();
        let code = code.to_owned();

        self.executor.run(async move {
            let client = Arc::clone(guard.client());
            submit_code(&guard, policy, settle, || {
                client.login_with_code(&temp_token, &code)
            })
            .await?;

            let Some(token) = client.token() else {
                return Err(BridgeError::new(
                    BridgeErrorCategory::Internal,
                    "token_unavailable",
                    "login failed: token not available",
                ));
            };

            if let Err(err) = guard.sync_session().await {
                warn!(error = %err, "post-login session sync failed");
            }
            keepalive.start_once(Arc::clone(&guard)).await;
            info!("login succeeded");

            Ok(LoginSuccess {
                token,
                me: client.me().map(|me| user_summary(&me, &phone)),
                phone,
            })
        })
    }

    /// Connect, sync a saved session and start the keep-alive daemon.
    pub fn start(&self) -> Result<StartOutcome, BridgeError> {
        let guard = self.guard_or_create()?;
        let keepalive = Arc::clone(&self.keepalive);
        let phone = self.params.phone.clone();

        self.executor.run(async move {
            ready(&guard).await?;
            keepalive.start_once(Arc::clone(&guard)).await;

            let client = guard.client();
            let connected = client.is_connected();
            if client.token().is_none() {
                return Ok(StartOutcome {
                    connected,
                    authenticated: false,
                    me: None,
                    requires_auth: Some(true),
                });
            }
            Ok(StartOutcome {
                connected,
                authenticated: true,
                me: client.me().map(|me| user_summary(&me, &phone)),
                requires_auth: None,
            })
        })
    }

    /// Stop the keep-alive daemon, close the client and tear down the loop.
    ///
    /// The daemon has fully exited before the client is closed, and the loop
    /// is stopped even when closing fails.
    pub fn stop(&self) -> Result<StopOutcome, BridgeError> {
        let Some(guard) = self.lock_session().clone() else {
            return Ok(StopOutcome {
                message: "client not initialized".to_owned(),
                keepalive_cancelled: false,
            });
        };
        let keepalive = Arc::clone(&self.keepalive);

        let closed = self.executor.run(async move {
            let keepalive_cancelled = keepalive.stop().await;
            let closed = guard.client().close().await;
            Ok((keepalive_cancelled, closed))
        });
        let stopped = self.executor.stop();

        let (keepalive_cancelled, closed) = closed?;
        stopped?;
        closed.map_err(|err| BridgeError::from_client(&err))?;
        info!(keepalive_cancelled, "client stopped");
        Ok(StopOutcome {
            message: "client stopped".to_owned(),
            keepalive_cancelled,
        })
    }

    /// Dialogs, group chats and channels merged into one list keyed by chat id.
    ///
    /// The whole assembly runs under the read policy, so a dropped socket
    /// anywhere in it restarts the read from a fresh connection.
    pub fn get_chats(&self) -> Result<ChatList, BridgeError> {
        let guard = self.guard()?;
        let policy = self.config.retry.idempotent_read;

        self.executor.run(async move {
            let client = Arc::clone(guard.client());
            let chats = retry_idempotent(&guard, policy, "get_chats", || {
                collect_chats(client.as_ref())
            })
            .await?;
            debug!(count = chats.len(), "chat list assembled");
            Ok(ChatList { chats })
        })
    }

    /// Latest `limit` messages of a chat, oldest first.
    pub fn get_messages(&self, chat_id: i64, limit: u32) -> Result<MessageList, BridgeError> {
        let guard = self.guard()?;
        let policy = self.config.retry.idempotent_read;

        self.executor.run(async move {
            let client = Arc::clone(guard.client());
            let records = retry_idempotent(&guard, policy, "fetch_history", || {
                client.fetch_history(chat_id, limit)
            })
            .await?;

            let mut messages: Vec<_> = records
                .iter()
                .filter_map(|record| message_from_record(record, Some(chat_id)))
                .collect();
            sort_messages_by_time(&mut messages);
            debug!(chat_id, count = messages.len(), "history fetched");
            Ok(MessageList { messages })
        })
    }

    /// Send a text message. An unparseable `reply_to` is ignored.
    pub fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageSent, BridgeError> {
        let message = OutgoingMessage {
            chat_id,
            text: text.to_owned(),
            reply_to: reply_to.and_then(parse_message_id),
            notify: true,
            attachment: None,
        };
        self.send(message)
    }

    pub fn edit_message(
        &self,
        chat_id: i64,
        message_id: &str,
        text: &str,
    ) -> Result<MessageSent, BridgeError> {
        let guard = self.guard()?;
        let message_id = require_message_id(message_id)?;
        let text = text.to_owned();

        self.executor.run(async move {
            ready(&guard).await?;
            let edited = guard
                .client()
                .edit_message(chat_id, message_id, &text)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            message_sent(edited, chat_id)
        })
    }

    pub fn delete_messages<S: AsRef<str>>(
        &self,
        chat_id: i64,
        message_ids: &[S],
        for_me: bool,
    ) -> Result<MessagesDeleted, BridgeError> {
        let guard = self.guard()?;
        let ids = coerce_int_list(&RecordValue::List(
            message_ids
                .iter()
                .map(|id| RecordValue::from(id.as_ref()))
                .collect(),
        ));
        if ids.is_empty() {
            return Err(BridgeError::invalid_input(
                "invalid_message_ids",
                "invalid message_ids",
            ));
        }

        self.executor.run(async move {
            ready(&guard).await?;
            let deleted = guard
                .client()
                .delete_messages(chat_id, &ids, for_me)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(MessagesDeleted {
                deleted,
                message_ids: ids.iter().map(i64::to_string).collect(),
            })
        })
    }

    pub fn pin_message(
        &self,
        chat_id: i64,
        message_id: &str,
        notify: bool,
    ) -> Result<MessagePinned, BridgeError> {
        let guard = self.guard()?;
        let message_id = require_message_id(message_id)?;

        self.executor.run(async move {
            ready(&guard).await?;
            let pinned = guard
                .client()
                .pin_message(chat_id, message_id, notify)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(MessagePinned {
                pinned,
                message_id: message_id.to_string(),
            })
        })
    }

    pub fn read_message(&self, chat_id: i64, message_id: &str) -> Result<MessageRead, BridgeError> {
        let guard = self.guard()?;
        let message_id = require_message_id(message_id)?;

        self.executor.run(async move {
            ready(&guard).await?;
            guard
                .client()
                .read_message(chat_id, message_id)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(MessageRead {
                state: ReadState {
                    chat_id,
                    message_id: message_id.to_string(),
                },
            })
        })
    }

    pub fn add_reaction(
        &self,
        chat_id: i64,
        message_id: &str,
        reaction: &str,
    ) -> Result<ReactionUpdated, BridgeError> {
        let guard = self.guard()?;
        let message_id = require_non_empty_message_id(message_id)?;
        let reaction = reaction.to_owned();

        self.executor.run(async move {
            ready(&guard).await?;
            let info = guard
                .client()
                .add_reaction(chat_id, &message_id, &reaction)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(ReactionUpdated {
                reaction_info: info.as_ref().and_then(|info| reaction_info_from_record(info)),
            })
        })
    }

    pub fn remove_reaction(
        &self,
        chat_id: i64,
        message_id: &str,
    ) -> Result<ReactionUpdated, BridgeError> {
        let guard = self.guard()?;
        let message_id = require_non_empty_message_id(message_id)?;

        self.executor.run(async move {
            ready(&guard).await?;
            let info = guard
                .client()
                .remove_reaction(chat_id, &message_id)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(ReactionUpdated {
                reaction_info: info.as_ref().and_then(|info| reaction_info_from_record(info)),
            })
        })
    }

    /// Upload a photo; the result carries the raw attach payload and its token.
    pub fn upload_photo(&self, path: impl AsRef<Path>) -> Result<PhotoUploaded, BridgeError> {
        let guard = self.guard()?;
        let upload = Upload {
            kind: UploadKind::Photo,
            path: existing_file(path.as_ref(), "file")?,
        };

        self.executor.run(async move {
            ready(&guard).await?;
            let attach = upload_attach(&guard, &upload).await?;
            Ok(PhotoUploaded {
                photo_token: get_present(&attach, aliases::PHOTO_TOKEN).and_then(|v| v.as_text()),
                attach,
            })
        })
    }

    /// Upload a file; the result carries the raw attach payload and its id.
    pub fn upload_file(&self, path: impl AsRef<Path>) -> Result<FileUploaded, BridgeError> {
        let guard = self.guard()?;
        let upload = Upload {
            kind: UploadKind::File,
            path: existing_file(path.as_ref(), "file")?,
        };

        self.executor.run(async move {
            ready(&guard).await?;
            let attach = upload_attach(&guard, &upload).await?;
            Ok(FileUploaded {
                file_id: get_present(&attach, aliases::FILE_ID).and_then(|v| coerce_int(&v)),
                attach,
            })
        })
    }

    /// Send a message with one attachment. `kind` `photo`, `image` or `img`
    /// uploads a photo; anything else a file.
    pub fn send_attachment(
        &self,
        chat_id: i64,
        path: impl AsRef<Path>,
        kind: &str,
        text: &str,
        reply_to: Option<&str>,
        notify: bool,
    ) -> Result<MessageSent, BridgeError> {
        self.guard()?;
        let attachment = Upload {
            kind: UploadKind::from_label(kind),
            path: existing_file(path.as_ref(), "file")?,
        };
        self.send(OutgoingMessage {
            chat_id,
            text: text.to_owned(),
            reply_to: reply_to.and_then(parse_message_id),
            notify,
            attachment: Some(attachment),
        })
    }

    pub fn change_profile(
        &self,
        first_name: &str,
        last_name: Option<&str>,
        description: Option<&str>,
        photo: Option<&Path>,
    ) -> Result<ProfileUpdated, BridgeError> {
        let guard = self.guard()?;
        if first_name.is_empty() {
            return Err(BridgeError::invalid_input(
                "first_name_required",
                "first_name required",
            ));
        }
        let photo = photo.map(|path| existing_file(path, "photo file")).transpose()?;
        let change = ProfileChange {
            first_name: first_name.to_owned(),
            last_name: last_name.map(str::to_owned),
            description: description.map(str::to_owned),
            photo,
        };
        let phone = self.params.phone.clone();

        self.executor.run(async move {
            ready(&guard).await?;
            let client = guard.client();
            let updated = client
                .change_profile(&change)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(ProfileUpdated {
                updated,
                me: client.me().map(|me| user_summary(&me, &phone)),
            })
        })
    }

    pub fn get_folders(&self, folder_sync: i64) -> Result<FolderList, BridgeError> {
        let guard = self.guard()?;

        self.executor.run(async move {
            ready(&guard).await?;
            let folders = guard
                .client()
                .get_folders(folder_sync)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(FolderList {
                folders: folders.iter().map(|folder| folder_view(folder)).collect(),
            })
        })
    }

    /// One page of the server-side chat list.
    pub fn fetch_chats(&self, marker: Option<i64>) -> Result<ChatBriefList, BridgeError> {
        let guard = self.guard()?;

        self.executor.run(async move {
            ready(&guard).await?;
            let chats = guard
                .client()
                .fetch_chats(marker)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(ChatBriefList {
                chats: chats
                    .iter()
                    .map(|chat| chat_brief(chat, Some(ChatKind::Chat)))
                    .collect(),
            })
        })
    }

    pub fn search_by_phone(&self, phone: &str) -> Result<ContactFound, BridgeError> {
        let guard = self.guard()?;
        let phone = require_text(phone, "phone")?;

        self.executor.run(async move {
            ready(&guard).await?;
            let user = guard
                .client()
                .search_by_phone(&phone)
                .await
                .map_err(|err| BridgeError::from_client(&err))?
                .ok_or_else(|| not_found("user_not_found", "user not found"))?;
            Ok(ContactFound {
                user: contact_view(&user),
            })
        })
    }

    /// Resolve a public channel by its `@name`.
    pub fn resolve_channel(&self, name: &str) -> Result<ChannelResolved, BridgeError> {
        let guard = self.guard()?;
        let name = require_text(name.trim().trim_start_matches('@'), "name")?;

        self.executor.run(async move {
            ready(&guard).await?;
            let channel = guard
                .client()
                .resolve_channel_by_name(&name)
                .await
                .map_err(|err| BridgeError::from_client(&err))?
                .ok_or_else(|| not_found("channel_not_found", "channel not found"))?;
            Ok(ChannelResolved {
                channel: chat_brief(&channel, None),
            })
        })
    }

    pub fn create_folder(&self, title: &str, include: &[i64]) -> Result<FolderSaved, BridgeError> {
        let guard = self.guard()?;
        let title = require_text(title, "title")?;
        let include = include.to_vec();

        self.executor.run(async move {
            ready(&guard).await?;
            let folder = guard
                .client()
                .create_folder(&title, &include)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(FolderSaved {
                folder: folder_view(&folder),
            })
        })
    }

    /// Rename a folder; `include` replaces its chat list when given.
    pub fn update_folder(
        &self,
        folder_id: &str,
        title: &str,
        include: Option<&[i64]>,
    ) -> Result<FolderSaved, BridgeError> {
        let guard = self.guard()?;
        let folder_id = require_text(folder_id, "folder_id")?;
        let title = require_text(title, "title")?;
        let include = include.map(<[i64]>::to_vec);

        self.executor.run(async move {
            ready(&guard).await?;
            let folder = guard
                .client()
                .update_folder(&folder_id, &title, include.as_deref())
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(FolderSaved {
                folder: folder_view(&folder),
            })
        })
    }

    pub fn delete_folder(&self, folder_id: &str) -> Result<FolderDeleted, BridgeError> {
        let guard = self.guard()?;
        let folder_id = require_text(folder_id, "folder_id")?;

        self.executor.run(async move {
            ready(&guard).await?;
            guard
                .client()
                .delete_folder(&folder_id)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            Ok(FolderDeleted {
                deleted: true,
                folder_id,
            })
        })
    }

    pub fn join_group(&self, link: &str) -> Result<ChatJoined, BridgeError> {
        self.join(link, ChatKind::Chat)
    }

    pub fn join_channel(&self, link: &str) -> Result<ChatJoined, BridgeError> {
        self.join(link, ChatKind::Channel)
    }

    pub fn leave_group(&self, chat_id: i64) -> Result<ChatLeft, BridgeError> {
        self.leave(chat_id, ChatKind::Chat)
    }

    pub fn leave_channel(&self, chat_id: i64) -> Result<ChatLeft, BridgeError> {
        self.leave(chat_id, ChatKind::Channel)
    }

    /// Current events directory; available before a client exists.
    pub fn events_dir(&self) -> EventsRegistration {
        EventsRegistration {
            events_dir: self.events.events_dir().display().to_string(),
            already_registered: false,
        }
    }

    /// Route client pushes into the events directory and keep the socket warm
    /// so they keep arriving while the host is idle.
    pub fn register_event_callbacks(
        &self,
        events_dir: Option<PathBuf>,
    ) -> Result<EventsRegistration, BridgeError> {
        let guard = self.guard()?;
        let registration = self.events.register(guard.client().as_ref(), events_dir)?;
        if registration.already_registered {
            return Ok(registration);
        }

        let keepalive = Arc::clone(&self.keepalive);
        let started = self.executor.run(async move {
            Ok(keepalive.start_once(guard).await)
        });
        if let Err(err) = started {
            warn!(error = %err, "keep-alive not started after event registration");
        }
        Ok(registration)
    }

    fn send(&self, message: OutgoingMessage) -> Result<MessageSent, BridgeError> {
        let guard = self.guard()?;
        let chat_id = message.chat_id;

        self.executor.run(async move {
            ready(&guard).await?;
            let sent = guard
                .client()
                .send_message(message)
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            message_sent(sent, chat_id)
        })
    }

    fn join(&self, link: &str, kind: ChatKind) -> Result<ChatJoined, BridgeError> {
        let guard = self.guard()?;
        let link = require_text(link, "link")?;
        let policy = self.config.retry.membership;

        self.executor.run(async move {
            let client = Arc::clone(guard.client());
            let joined = match kind {
                ChatKind::Channel => {
                    retry_membership(&guard, policy, "join_channel", || client.join_channel(&link))
                        .await?
                }
                _ => {
                    retry_membership(&guard, policy, "join_group", || client.join_group(&link))
                        .await?
                }
            };
            let chat = joined.ok_or_else(|| match kind {
                ChatKind::Channel => not_found("channel_not_found", "channel not found"),
                _ => not_found("group_not_found", "group not found"),
            })?;
            info!(kind = ?kind, "joined chat");
            Ok(ChatJoined {
                chat: chat_brief(&chat, Some(kind)),
            })
        })
    }

    fn leave(&self, chat_id: i64, kind: ChatKind) -> Result<ChatLeft, BridgeError> {
        let guard = self.guard()?;

        self.executor.run(async move {
            ready(&guard).await?;
            let client = guard.client();
            let left = match kind {
                ChatKind::Channel => client.leave_channel(chat_id).await,
                _ => client.leave_group(chat_id).await,
            };
            left.map_err(|err| BridgeError::from_client(&err))?;
            Ok(ChatLeft { left: true, chat_id })
        })
    }

    fn guard(&self) -> Result<Arc<SessionGuard>, BridgeError> {
        self.lock_session()
            .clone()
            .ok_or_else(BridgeError::not_initialized)
    }

    fn guard_or_create(&self) -> Result<Arc<SessionGuard>, BridgeError> {
        if let Ok(guard) = self.guard() {
            return Ok(guard);
        }
        self.create_client()?;
        self.guard()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Arc<SessionGuard>>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChatBridge {
    fn drop(&mut self) {
        if !self.executor.is_running() || self.executor.is_loop_thread() {
            return;
        }
        let keepalive = Arc::clone(&self.keepalive);
        if let Err(err) = self.executor.run(async move { Ok(keepalive.stop().await) }) {
            debug!(error = %err, "keep-alive not cancelled on drop");
        }
    }
}

async fn ready(guard: &SessionGuard) -> Result<(), BridgeError> {
    guard
        .ensure_ready()
        .await
        .map_err(|err| BridgeError::from_client(&err))
}

async fn collect_chats(client: &dyn ProtocolClient) -> Result<Vec<ChatSummary>, ClientError> {
    let dialogs = client.dialogs();
    prefetch_dialog_users(client, &dialogs).await;

    let me_id = client
        .me()
        .and_then(|me| get_present(&me, aliases::ID))
        .and_then(|id| coerce_int(&id));
    let mut merged = ChatAggregate::new();

    for dialog in &dialogs {
        let peer_id = dialog_peer_id(dialog, me_id);
        let user = match peer_id {
            Some(peer) => peer_user(client, peer).await,
            None => None,
        };
        if let Some(summary) = dialog_summary(dialog, peer_id, user.as_ref()) {
            merged.upsert(summary);
        }
    }

    let chat_ids: Vec<i64> = client
        .chats()
        .iter()
        .filter_map(|chat| get_present(chat, aliases::ID))
        .filter_map(|id| coerce_int(&id))
        .collect();
    if !chat_ids.is_empty() {
        let chats = client.get_chats(&chat_ids).await?;
        merged.extend(
            chats
                .iter()
                .filter_map(|chat| group_summary(chat, ChatKind::Chat)),
        );
    }

    merged.extend(
        client
            .channels()
            .iter()
            .filter_map(|channel| group_summary(channel, ChatKind::Channel)),
    );
    Ok(merged.into_vec())
}

/// Warm the user cache for every dialog peer. Failures only cost titles.
async fn prefetch_dialog_users(client: &dyn ProtocolClient, dialogs: &[Record]) {
    let mut cids: Vec<i64> = dialogs
        .iter()
        .filter_map(|dialog| get_present(dialog, aliases::CID))
        .filter_map(|cid| coerce_int(&cid))
        .collect();
    cids.sort_unstable();
    cids.dedup();
    if cids.is_empty() {
        return;
    }
    if let Err(err) = client.get_users(&cids).await {
        warn!(error = %err, count = cids.len(), "dialog user prefetch failed");
    }
}

async fn peer_user(client: &dyn ProtocolClient, peer_id: i64) -> Option<Record> {
    if let Some(user) = client.cached_user(peer_id) {
        return Some(user);
    }
    match client.get_users(&[peer_id]).await {
        Ok(users) => users.into_iter().next(),
        Err(err) => {
            debug!(peer_id, error = %err, "dialog peer lookup failed");
            None
        }
    }
}

async fn upload_attach(
    guard: &SessionGuard,
    upload: &Upload,
) -> Result<serde_json::Value, BridgeError> {
    guard
        .client()
        .upload(upload)
        .await
        .map_err(|err| BridgeError::from_client(&err))?
        .filter(|attach| !attach.is_null())
        .ok_or_else(|| {
            BridgeError::new(BridgeErrorCategory::Internal, "upload_failed", "upload failed")
        })
}

fn message_sent(record: Option<Record>, chat_id: i64) -> Result<MessageSent, BridgeError> {
    record
        .as_ref()
        .and_then(|record| message_from_record(record, Some(chat_id)))
        .map(|message| MessageSent { message })
        .ok_or_else(|| {
            BridgeError::new(
                BridgeErrorCategory::Internal,
                "invalid_message_response",
                "invalid message response",
            )
        })
}

fn parse_message_id(raw: &str) -> Option<i64> {
    coerce_int(&RecordValue::from(raw))
}

fn require_message_id(raw: &str) -> Result<i64, BridgeError> {
    parse_message_id(raw)
        .ok_or_else(|| BridgeError::invalid_input("invalid_message_id", "invalid message_id"))
}

fn require_non_empty_message_id(raw: &str) -> Result<String, BridgeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::invalid_input(
            "invalid_message_id",
            "invalid message_id",
        ));
    }
    Ok(trimmed.to_owned())
}

fn require_text(value: &str, field: &str) -> Result<String, BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::invalid_input(
            format!("{field}_required"),
            format!("{field} required"),
        ));
    }
    Ok(value.to_owned())
}

fn existing_file(path: &Path, what: &str) -> Result<PathBuf, BridgeError> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Err(BridgeError::invalid_input(
            format!("{}_not_found", what.replace(' ', "_")),
            format!("{what} not found"),
        ));
    }
    Ok(path.to_path_buf())
}

fn not_found(code: &str, message: &str) -> BridgeError {
    BridgeError::new(BridgeErrorCategory::Internal, code, message)
}
