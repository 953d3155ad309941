use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bridge_core::{
    BridgeError, BridgeErrorCategory, BridgeEvent, EventsRegistration,
    normalization::{chat_update_view, message_from_record, reaction_info_from_record},
};
use bridge_platform::EventDropBox;
use tracing::{debug, info, warn};

use crate::client::{ProtocolClient, PushEvent};

/// Turns client pushes into files in the events directory.
#[derive(Debug)]
pub struct EventBridge {
    dropbox: EventDropBox,
    registered: AtomicBool,
}

impl EventBridge {
    pub fn new(events_dir: impl Into<PathBuf>) -> Self {
        Self {
            dropbox: EventDropBox::new(events_dir),
            registered: AtomicBool::new(false),
        }
    }

    pub fn events_dir(&self) -> PathBuf {
        self.dropbox.events_dir()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Write `event` to the drop-box. Failures are logged and dropped.
    pub fn emit(&self, event: &BridgeEvent) {
        match self.dropbox.publish(event) {
            Ok(path) => debug!(kind = event.kind(), path = %path.display(), "event written"),
            Err(err) => warn!(kind = event.kind(), error = %err, "failed to write event"),
        }
    }

    /// Install the push handler on `client`.
    ///
    /// `events_dir` replaces the current directory even when the handler is
    /// already installed; a repeated call only reports `already_registered`.
    pub fn register(
        self: &Arc<Self>,
        client: &dyn ProtocolClient,
        events_dir: Option<PathBuf>,
    ) -> Result<EventsRegistration, BridgeError> {
        if let Some(dir) = events_dir {
            self.dropbox.set_dir(dir);
        }
        let dir = self.dropbox.ensure_dir().map_err(|err| {
            BridgeError::new(
                BridgeErrorCategory::Storage,
                "events_dir_unavailable",
                err.to_string(),
            )
        })?;
        let events_dir = dir.display().to_string();

        if self.registered.swap(true, Ordering::SeqCst) {
            return Ok(EventsRegistration {
                events_dir,
                already_registered: true,
            });
        }

        let bridge = Arc::clone(self);
        client.set_push_handler(Arc::new(move |push| {
            if let Some(event) = event_from_push(push) {
                bridge.emit(&event);
            }
        }));
        info!(events_dir = %events_dir, "event callbacks registered");

        Ok(EventsRegistration {
            events_dir,
            already_registered: false,
        })
    }
}

/// Normalize a client push. Message pushes without a usable id are dropped.
pub fn event_from_push(push: PushEvent) -> Option<BridgeEvent> {
    match push {
        PushEvent::MessageNew(msg) => {
            message_from_record(&msg, None).map(|message| BridgeEvent::MessageNew { message })
        }
        PushEvent::MessageEdited(msg) => {
            message_from_record(&msg, None).map(|message| BridgeEvent::MessageEdited { message })
        }
        PushEvent::MessageDeleted(msg) => {
            message_from_record(&msg, None).map(|message| BridgeEvent::MessageDeleted { message })
        }
        PushEvent::ReactionChanged {
            chat_id,
            message_id,
            reaction_info,
        } => Some(BridgeEvent::ReactionChanged {
            chat_id,
            message_id,
            reaction_info: reaction_info
                .as_ref()
                .and_then(|info| reaction_info_from_record(info)),
        }),
        PushEvent::ChatUpdated(chat) => Some(BridgeEvent::ChatUpdated {
            chat: chat_update_view(&chat),
        }),
    }
}
