//! Conversion of heterogeneous server records into the stable host schema.
//!
//! Every function here is total: malformed input produces `None` or a
//! default, never an error.

use std::collections::BTreeMap;

use crate::{
    record::{
        FieldSource, RecordValue, aliases, coerce_int, coerce_int_list, enum_text, get_field,
        get_present, get_text_or_empty, normalize_time_ms,
    },
    types::{
        AttachmentKind, AttachmentView, ChatBrief, ChatKind, ChatSummary, ChatUpdateView,
        ContactView, FolderView, MessageView, ReactionCounter, ReactionInfoView, UserSummary,
    },
};

/// Convert a message record. Returns `None` when the id or chat id is missing.
pub fn message_from_record<S: FieldSource + ?Sized>(
    msg: &S,
    fallback_chat_id: Option<i64>,
) -> Option<MessageView> {
    let id = get_present(msg, aliases::ID)?.as_text()?;
    let chat_id = match get_present(msg, aliases::CHAT_ID) {
        Some(value) => coerce_int(&value)?,
        None => fallback_chat_id?,
    };

    let time_ms = get_field(msg, aliases::TIME).and_then(|v| normalize_time_ms(&v));
    let date_ms = get_field(msg, aliases::DATE).and_then(|v| normalize_time_ms(&v));
    let time = time_ms.filter(|ms| *ms != 0).or(date_ms).or(time_ms);

    let attachments: Vec<AttachmentView> = get_field(msg, aliases::ATTACHES)
        .and_then(|value| value.as_list().map(<[RecordValue]>::to_vec))
        .unwrap_or_default()
        .iter()
        .filter_map(|attach| attachment_from_record(attach, &id))
        .collect();
    let reactions = reaction_counts(msg);

    Some(MessageView {
        chat_id,
        text: get_text_or_empty(msg, aliases::TEXT),
        sender_id: get_present(msg, aliases::SENDER).and_then(|v| coerce_int(&v)),
        date: time,
        time,
        kind: get_present(msg, aliases::TYPE).and_then(|v| enum_text(&v)),
        reply_to: reply_target(msg),
        reactions: (!reactions.is_empty()).then_some(reactions),
        attachments: (!attachments.is_empty()).then_some(attachments),
        id,
    })
}

/// Sort messages oldest first; messages without a time sort as `0`.
pub fn sort_messages_by_time(messages: &mut [MessageView]) {
    messages.sort_by_key(|message| message.time.unwrap_or(0));
}

fn reply_target<S: FieldSource + ?Sized>(msg: &S) -> Option<String> {
    let link = get_present(msg, aliases::LINK)?;
    let link_type = get_present(&link, aliases::TYPE).and_then(|v| enum_text(&v))?;
    if !link_type.eq_ignore_ascii_case("REPLY") {
        return None;
    }
    get_present(&link, aliases::LINK_MESSAGE_ID)?.as_text()
}

fn reaction_counts<S: FieldSource + ?Sized>(msg: &S) -> BTreeMap<String, i64> {
    let mut reactions = BTreeMap::new();
    let Some(info) = get_present(msg, aliases::REACTION_INFO) else {
        return reactions;
    };
    let Some(counters) = get_field(&info, aliases::COUNTERS) else {
        return reactions;
    };
    for counter in counters.as_list().unwrap_or_default() {
        let Some(reaction) = get_present(counter, aliases::REACTION).and_then(|v| v.as_text())
        else {
            continue;
        };
        let count = get_present(counter, aliases::COUNT)
            .and_then(|v| coerce_int(&v))
            .unwrap_or(0);
        reactions.insert(reaction, count);
    }
    reactions
}

/// Map a photo/file/video attachment into the flat shape. Other kinds are dropped.
pub fn attachment_from_record<S: FieldSource + ?Sized>(
    attach: &S,
    message_id: &str,
) -> Option<AttachmentView> {
    let kind = get_present(attach, aliases::TYPE)
        .and_then(|v| enum_text(&v))
        .unwrap_or_else(|| "UNKNOWN".to_owned())
        .to_uppercase();
    let int_field = |names: &[&str]| get_present(attach, names).and_then(|v| coerce_int(&v));
    let text_field = |names: &[&str]| get_present(attach, names).and_then(|v| v.as_text());

    match kind.as_str() {
        "PHOTO" => {
            let photo_id = int_field(aliases::PHOTO_ID).unwrap_or(0);
            let url = text_field(aliases::BASE_URL)
                .filter(|url| !url.is_empty())
                .map(|url| {
                    with_cache_buster(
                        &url,
                        &[("pid", photo_id.to_string()), ("mid", message_id.to_owned())],
                    )
                });
            Some(AttachmentView {
                id: photo_id,
                kind: AttachmentKind::Photo,
                thumbnail_url: url.clone(),
                url,
                file_name: None,
                file_size: None,
            })
        }
        "FILE" => Some(AttachmentView {
            id: int_field(aliases::FILE_ID).unwrap_or(0),
            kind: AttachmentKind::File,
            url: None,
            thumbnail_url: None,
            file_name: text_field(aliases::NAME),
            file_size: int_field(aliases::SIZE),
        }),
        "VIDEO" => Some(AttachmentView {
            id: int_field(aliases::VIDEO_ID).unwrap_or(0),
            kind: AttachmentKind::Video,
            url: None,
            thumbnail_url: text_field(aliases::THUMBNAIL),
            file_name: None,
            file_size: None,
        }),
        _ => None,
    }
}

/// Append cache-defeating query parameters; the host's image cache keys on URL only.
pub fn with_cache_buster(url: &str, params: &[(&str, String)]) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        return url.to_owned();
    }
    format!("{url}{separator}{query}")
}

/// Convert a reaction summary record.
pub fn reaction_info_from_record<S: FieldSource + ?Sized>(info: &S) -> Option<ReactionInfoView> {
    // A missing summary and an unusable one both map to `None`.
    if get_field(info, aliases::COUNTERS).is_none()
        && get_field(info, aliases::TOTAL_COUNT).is_none()
        && get_field(info, aliases::YOUR_REACTION).is_none()
    {
        return None;
    }

    let counters = get_present(info, aliases::COUNTERS)
        .and_then(|v| v.as_list().map(<[RecordValue]>::to_vec))
        .unwrap_or_default()
        .iter()
        .map(|counter| ReactionCounter {
            reaction: get_present(counter, aliases::REACTION).and_then(|v| v.as_text()),
            count: get_present(counter, aliases::COUNT)
                .and_then(|v| coerce_int(&v))
                .unwrap_or(0),
        })
        .collect();

    Some(ReactionInfoView {
        total_count: get_present(info, aliases::TOTAL_COUNT)
            .and_then(|v| coerce_int(&v))
            .unwrap_or(0),
        your_reaction: get_present(info, aliases::YOUR_REACTION).and_then(|v| v.as_text()),
        counters,
    })
}

fn first_name_entry<S: FieldSource + ?Sized>(user: &S) -> Option<RecordValue> {
    get_present(user, aliases::NAMES)?
        .as_list()?
        .first()
        .cloned()
}

/// Summary of the signed-in user. `fallback_phone` is used when the record has
/// none; a missing id becomes `0`.
pub fn user_summary<S: FieldSource + ?Sized>(me: &S, fallback_phone: &str) -> UserSummary {
    let id = get_present(me, aliases::ID)
        .and_then(|v| coerce_int(&v))
        .unwrap_or(0);
    let first_name = first_name_entry(me)
        .and_then(|entry| {
            get_present(&entry, aliases::FIRST_NAME)
                .or_else(|| get_present(&entry, aliases::NAME))
                .and_then(|v| v.as_text())
        })
        .unwrap_or_default();
    let phone = get_present(me, aliases::PHONE)
        .and_then(|v| v.as_text())
        .filter(|phone| !phone.is_empty())
        .unwrap_or_else(|| fallback_phone.to_owned());

    UserSummary {
        id,
        first_name,
        phone: Some(phone),
    }
}

/// Best display name of a user record, if any.
pub fn user_display_name<S: FieldSource + ?Sized>(user: &S) -> Option<String> {
    let names = get_present(user, aliases::NAMES);
    for entry in names.as_ref().and_then(|v| v.as_list()).unwrap_or_default() {
        let name = get_present(entry, aliases::NAME)
            .or_else(|| get_present(entry, aliases::FIRST_NAME))
            .and_then(|v| v.as_text());
        if let Some(name) = name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()) {
            return Some(name);
        }
    }

    get_present(user, aliases::NAME)
        .or_else(|| get_present(user, aliases::FIRST_NAME))
        .and_then(|v| v.as_text())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

/// Peer of a direct dialog: the first participant that is not `me_id`, else `cid`.
pub fn dialog_peer_id<S: FieldSource + ?Sized>(dialog: &S, me_id: Option<i64>) -> Option<i64> {
    if let Some(me_id) = me_id
        && let Some(RecordValue::Record(participants)) = get_present(dialog, aliases::PARTICIPANTS)
    {
        let peer = participants
            .keys()
            .filter_map(|key| key.trim().parse::<i64>().ok())
            .find(|participant| *participant != me_id);
        if peer.is_some() {
            return peer;
        }
    }
    get_present(dialog, aliases::CID).and_then(|v| coerce_int(&v))
}

/// Chat list entry for a direct dialog, enriched from the peer's user record.
pub fn dialog_summary<S, U>(
    dialog: &S,
    peer_id: Option<i64>,
    user: Option<&U>,
) -> Option<ChatSummary>
where
    S: FieldSource + ?Sized,
    U: FieldSource + ?Sized,
{
    let id = get_present(dialog, aliases::ID).and_then(|v| coerce_int(&v))?;

    let mut title = user.and_then(|user| user_display_name(user)).unwrap_or_default();
    let photo_id = user
        .and_then(|user| get_present(user, aliases::PHOTO_ID))
        .and_then(|v| coerce_int(&v));
    let icon_url = user
        .and_then(|user| {
            get_present(user, aliases::BASE_URL)
                .or_else(|| get_present(user, aliases::BASE_RAW_URL))
        })
        .and_then(|v| v.as_text())
        .filter(|url| !url.is_empty())
        .map(|url| match peer_id {
            Some(peer) => with_cache_buster(&url, &[("uid", peer.to_string())]),
            None => url,
        });

    if title.is_empty() {
        title = match peer_id {
            Some(peer) => format!("User {peer}"),
            None => format!("Dialog {id}"),
        };
    }

    Some(ChatSummary {
        id,
        title,
        kind: ChatKind::Dialog,
        photo_id,
        icon_url,
        unread_count: 0,
        cid: peer_id,
    })
}

/// Chat list entry for a group chat or channel; the icon gets a `chatId` cache-buster.
pub fn group_summary<S: FieldSource + ?Sized>(chat: &S, kind: ChatKind) -> Option<ChatSummary> {
    let id = get_present(chat, aliases::ID).and_then(|v| coerce_int(&v))?;
    let icon_url = get_present(chat, aliases::ICON_URL)
        .and_then(|v| v.as_text())
        .filter(|url| !url.is_empty())
        .map(|url| with_cache_buster(&url, &[("chatId", id.to_string())]));

    Some(ChatSummary {
        id,
        title: get_text_or_empty(chat, aliases::TITLE),
        kind,
        photo_id: None,
        icon_url,
        unread_count: 0,
        cid: None,
    })
}

/// Lightweight chat shape; the icon URL is passed through untouched.
pub fn chat_brief<S: FieldSource + ?Sized>(chat: &S, kind: Option<ChatKind>) -> ChatBrief {
    ChatBrief {
        id: get_present(chat, aliases::ID).and_then(|v| coerce_int(&v)),
        title: get_text_or_empty(chat, aliases::TITLE),
        kind,
        icon_url: get_present(chat, aliases::ICON_URL).and_then(|v| v.as_text()),
    }
}

pub fn chat_update_view<S: FieldSource + ?Sized>(chat: &S) -> ChatUpdateView {
    ChatUpdateView {
        id: get_present(chat, aliases::ID).and_then(|v| coerce_int(&v)),
        title: get_text_or_empty(chat, aliases::TITLE),
        kind: get_present(chat, aliases::TYPE).and_then(|v| enum_text(&v)),
        icon_url: get_present(chat, aliases::ICON_URL).and_then(|v| v.as_text()),
    }
}

pub fn folder_view<S: FieldSource + ?Sized>(folder: &S) -> FolderView {
    FolderView {
        id: get_present(folder, aliases::ID).and_then(|v| v.as_text()),
        title: get_text_or_empty(folder, aliases::TITLE),
        include: get_present(folder, aliases::INCLUDE)
            .map(|v| coerce_int_list(&v))
            .unwrap_or_default(),
    }
}

pub fn contact_view<S: FieldSource + ?Sized>(user: &S) -> ContactView {
    let name = first_name_entry(user)
        .and_then(|entry| {
            get_present(&entry, aliases::NAME)
                .or_else(|| get_present(&entry, aliases::FIRST_NAME))
                .and_then(|v| v.as_text())
        })
        .unwrap_or_default();

    ContactView {
        id: get_present(user, aliases::ID).and_then(|v| coerce_int(&v)),
        name,
        photo_id: get_present(user, aliases::PHOTO_ID).and_then(|v| coerce_int(&v)),
        phone: get_present(user, aliases::PHONE).and_then(|v| v.as_text()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::record::Record;

    fn message(id: i64, time: RecordValue) -> Record {
        Record::new()
            .with("id", id)
            .with("chatId", 10)
            .with("text", "hi")
            .with("time", time)
    }

    #[test]
    fn normalizes_mixed_time_representations_and_sorts_ascending() {
        let dt = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid date");
        let dt_ms = dt.timestamp_millis();

        let raw = [
            message(1, RecordValue::DateTime(dt)),
            message(2, RecordValue::from((dt_ms - 5_000).to_string())),
            message(3, RecordValue::Float((dt_ms - 10_000) as f64 + 0.25)),
        ];

        let mut messages: Vec<MessageView> = raw
            .iter()
            .filter_map(|record| message_from_record(record, None))
            .collect();
        sort_messages_by_time(&mut messages);

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
        assert_eq!(messages[0].time, Some(dt_ms - 10_000));
        assert_eq!(messages[1].time, Some(dt_ms - 5_000));
        assert_eq!(messages[2].time, Some(dt_ms));
        assert_eq!(messages[2].date, messages[2].time);
    }

    #[test]
    fn falls_back_to_date_and_caller_chat_id() {
        let record = Record::new()
            .with("id", "77")
            .with("date", 1_234)
            .with("sender_id", "55");
        let msg = message_from_record(&record, Some(3)).expect("message");
        assert_eq!(msg.chat_id, 3);
        assert_eq!(msg.time, Some(1_234));
        assert_eq!(msg.sender_id, Some(55));
        assert_eq!(msg.text, "");
        assert_eq!(msg.reactions, None);
        assert_eq!(msg.attachments, None);
    }

    #[test]
    fn drops_messages_without_id_or_chat() {
        assert!(message_from_record(&Record::new().with("chat_id", 1), None).is_none());
        assert!(message_from_record(&Record::new().with("id", 1), None).is_none());
    }

    #[test]
    fn extracts_reply_reactions_and_enum_type() {
        let record = Record::new()
            .with("id", 5)
            .with("chat_id", 1)
            .with(
                "type",
                RecordValue::Enum {
                    name: "MessageType.USER".to_owned(),
                    value: Box::new(RecordValue::from("USER")),
                },
            )
            .with(
                "link",
                Record::new().with("type", "reply").with("messageId", 4),
            )
            .with(
                "reactionInfo",
                Record::new().with(
                    "counters",
                    RecordValue::List(vec![
                        Record::new().with("reaction", "👍").with("count", 2).into(),
                        Record::new().with("count", 9).into(),
                    ]),
                ),
            );

        let msg = message_from_record(&record, None).expect("message");
        assert_eq!(msg.kind.as_deref(), Some("USER"));
        assert_eq!(msg.reply_to.as_deref(), Some("4"));
        let reactions = msg.reactions.expect("reactions");
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions.get("👍"), Some(&2));
    }

    #[test]
    fn ignores_non_reply_links() {
        let record = Record::new()
            .with("id", 5)
            .with("chat_id", 1)
            .with("link", Record::new().with("type", "FORWARD").with("message_id", 4));
        assert_eq!(message_from_record(&record, None).and_then(|m| m.reply_to), None);
    }

    #[test]
    fn maps_attachment_variants() {
        let record = Record::new().with("id", 100).with("chat_id", 1).with(
            "attaches",
            RecordValue::List(vec![
                Record::new()
                    .with("type", "PHOTO")
                    .with("photoId", 8)
                    .with("baseUrl", "https://cdn.example/p?size=x")
                    .into(),
                Record::new()
                    .with("type", "FILE")
                    .with("file_id", 9)
                    .with("name", "a.pdf")
                    .with("size", 1024)
                    .into(),
                Record::new()
                    .with("type", "VIDEO")
                    .with("videoId", 10)
                    .with("thumbnail", "https://cdn.example/t")
                    .into(),
                Record::new().with("type", "STICKER").into(),
            ]),
        );

        let attachments = message_from_record(&record, None)
            .and_then(|m| m.attachments)
            .expect("attachments");
        assert_eq!(attachments.len(), 3);
        assert_eq!(
            attachments[0].url.as_deref(),
            Some("https://cdn.example/p?size=x&pid=8&mid=100")
        );
        assert_eq!(attachments[0].thumbnail_url, attachments[0].url);
        assert_eq!(attachments[1].file_name.as_deref(), Some("a.pdf"));
        assert_eq!(attachments[1].file_size, Some(1024));
        assert_eq!(attachments[2].kind, AttachmentKind::Video);
        assert_eq!(attachments[2].thumbnail_url.as_deref(), Some("https://cdn.example/t"));
    }

    #[test]
    fn cache_buster_picks_separator() {
        assert_eq!(
            with_cache_buster("https://x/a", &[("uid", "1".to_owned())]),
            "https://x/a?uid=1"
        );
        assert_eq!(
            with_cache_buster("https://x/a?s=1", &[("chatId", "2".to_owned())]),
            "https://x/a?s=1&chatId=2"
        );
    }

    #[test]
    fn converts_reaction_info() {
        let info = Record::new()
            .with("totalCount", 3)
            .with("yourReaction", "❤")
            .with(
                "counters",
                RecordValue::List(vec![
                    Record::new().with("reaction", "❤").with("count", 3).into(),
                ]),
            );
        let view = reaction_info_from_record(&info).expect("reaction info");
        assert_eq!(view.total_count, 3);
        assert_eq!(view.your_reaction.as_deref(), Some("❤"));
        assert_eq!(view.counters.len(), 1);
        assert!(reaction_info_from_record(&Record::new()).is_none());
    }

    #[test]
    fn builds_user_summary_with_phone_fallback() {
        let me = Record::new().with("id", 42).with(
            "names",
            RecordValue::List(vec![Record::new().with("firstName", "Ann").into()]),
        );
        let summary = user_summary(&me, "+70000000000");
        assert_eq!(summary.id, 42);
        assert_eq!(summary.first_name, "Ann");
        assert_eq!(summary.phone.as_deref(), Some("+70000000000"));

        let bare = user_summary(&Record::new().with("phone", "+71111111111"), "+70000000000");
        assert_eq!(bare.id, 0);
        assert_eq!(bare.first_name, "");
        assert_eq!(bare.phone.as_deref(), Some("+71111111111"));
    }

    #[test]
    fn picks_dialog_peer_from_participants_then_cid() {
        let dialog = Record::new()
            .with("id", 1)
            .with("cid", 99)
            .with("participants", Record::new().with("42", 0).with("7", 0));
        assert_eq!(dialog_peer_id(&dialog, Some(42)), Some(7));
        assert_eq!(dialog_peer_id(&dialog, None), Some(99));
    }

    #[test]
    fn enriches_dialog_from_user_and_falls_back_to_placeholder() {
        let dialog = Record::new().with("id", 1);
        let user = Record::new()
            .with(
                "names",
                RecordValue::List(vec![Record::new().with("name", "  Bob ").into()]),
            )
            .with("photoId", 5)
            .with("baseRawUrl", "https://cdn.example/u");

        let summary = dialog_summary(&dialog, Some(7), Some(&user)).expect("summary");
        assert_eq!(summary.title, "Bob");
        assert_eq!(summary.photo_id, Some(5));
        assert_eq!(summary.icon_url.as_deref(), Some("https://cdn.example/u?uid=7"));

        let bare = dialog_summary::<Record, Record>(&dialog, None, None).expect("summary");
        assert_eq!(bare.title, "Dialog 1");
        let with_peer = dialog_summary::<Record, Record>(&dialog, Some(7), None).expect("summary");
        assert_eq!(with_peer.title, "User 7");
    }

    #[test]
    fn group_icons_get_chat_id_buster() {
        let chat = Record::new()
            .with("id", 12)
            .with("title", "Team")
            .with("baseIconUrl", "https://cdn.example/i");
        let summary = group_summary(&chat, ChatKind::Chat).expect("summary");
        assert_eq!(summary.icon_url.as_deref(), Some("https://cdn.example/i?chatId=12"));
        assert_eq!(summary.kind, ChatKind::Chat);
    }

    #[test]
    fn converts_folder_and_contact() {
        let folder = Record::new()
            .with("id", "f1")
            .with("title", "Work")
            .with("include", RecordValue::List(vec![RecordValue::Int(1), RecordValue::from("2")]));
        let view = folder_view(&folder);
        assert_eq!(view.id.as_deref(), Some("f1"));
        assert_eq!(view.include, vec![1, 2]);

        let contact = contact_view(&Record::new().with("id", 3).with("phone", "+7"));
        assert_eq!(contact.name, "");
        assert_eq!(contact.id, Some(3));
    }
}
