//! Version-tolerant access to server records.
//!
//! The protocol client hands back records whose field names drift between
//! library versions (`chat_id` vs `chatId`, ...). Everything here is total:
//! lookups and coercions return `None` or a default instead of failing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One field value of a server record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured date-time.
    DateTime(DateTime<Utc>),
    /// Enumeration member: symbolic name plus underlying value.
    Enum { name: String, value: Box<RecordValue> },
    List(Vec<RecordValue>),
    Record(Record),
}

/// Mapping-shaped server record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RecordValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&RecordValue> {
        self.fields.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Anything a named field can be read from: mappings, structured records,
/// JSON objects.
pub trait FieldSource {
    /// Value stored under exactly `name`. A present-but-null field yields
    /// `Some(RecordValue::Null)`.
    fn field(&self, name: &str) -> Option<RecordValue>;
}

impl FieldSource for Record {
    fn field(&self, name: &str) -> Option<RecordValue> {
        self.fields.get(name).cloned()
    }
}

impl FieldSource for RecordValue {
    fn field(&self, name: &str) -> Option<RecordValue> {
        match self {
            RecordValue::Record(record) => record.field(name),
            _ => None,
        }
    }
}

impl FieldSource for Value {
    fn field(&self, name: &str) -> Option<RecordValue> {
        self.as_object()?.get(name).cloned().map(RecordValue::from)
    }
}

impl<S: FieldSource + ?Sized> FieldSource for &S {
    fn field(&self, name: &str) -> Option<RecordValue> {
        (**self).field(name)
    }
}

impl<S: FieldSource> FieldSource for Option<S> {
    fn field(&self, name: &str) -> Option<RecordValue> {
        self.as_ref()?.field(name)
    }
}

/// First field present under any of `aliases`, in order.
pub fn get_field<S: FieldSource + ?Sized>(source: &S, aliases: &[&str]) -> Option<RecordValue> {
    aliases.iter().find_map(|name| source.field(name))
}

/// Like [`get_field`] but treats a null value as absent.
pub fn get_present<S: FieldSource + ?Sized>(source: &S, aliases: &[&str]) -> Option<RecordValue> {
    get_field(source, aliases).filter(|value| !value.is_null())
}

/// Text field, empty string when absent or not textual.
pub fn get_text_or_empty<S: FieldSource + ?Sized>(source: &S, aliases: &[&str]) -> String {
    get_present(source, aliases)
        .and_then(|value| value.as_text())
        .unwrap_or_default()
}

/// Alias tables for every field the normalizer reads.
pub mod aliases {
    pub const ID: &[&str] = &["id"];
    pub const CHAT_ID: &[&str] = &["chat_id", "chatId"];
    pub const TEXT: &[&str] = &["text"];
    pub const SENDER: &[&str] = &["sender", "sender_id", "senderId"];
    pub const TIME: &[&str] = &["time"];
    pub const DATE: &[&str] = &["date"];
    pub const TYPE: &[&str] = &["type"];
    pub const LINK: &[&str] = &["link"];
    pub const LINK_MESSAGE_ID: &[&str] = &["message_id", "messageId"];
    pub const REACTION_INFO: &[&str] = &["reactionInfo", "reaction_info"];
    pub const COUNTERS: &[&str] = &["counters"];
    pub const REACTION: &[&str] = &["reaction"];
    pub const COUNT: &[&str] = &["count"];
    pub const TOTAL_COUNT: &[&str] = &["total_count", "totalCount"];
    pub const YOUR_REACTION: &[&str] = &["your_reaction", "yourReaction"];
    pub const ATTACHES: &[&str] = &["attaches"];
    pub const PHOTO_ID: &[&str] = &["photo_id", "photoId"];
    pub const BASE_URL: &[&str] = &["base_url", "baseUrl"];
    pub const BASE_RAW_URL: &[&str] = &["base_raw_url", "baseRawUrl"];
    pub const FILE_ID: &[&str] = &["file_id", "fileId"];
    pub const NAME: &[&str] = &["name"];
    pub const SIZE: &[&str] = &["size"];
    pub const VIDEO_ID: &[&str] = &["video_id", "videoId"];
    pub const THUMBNAIL: &[&str] = &["thumbnail"];
    pub const TITLE: &[&str] = &["title"];
    pub const ICON_URL: &[&str] = &["base_icon_url", "baseIconUrl"];
    pub const NAMES: &[&str] = &["names"];
    pub const FIRST_NAME: &[&str] = &["first_name", "firstName"];
    pub const PHONE: &[&str] = &["phone"];
    pub const PARTICIPANTS: &[&str] = &["participants"];
    pub const CID: &[&str] = &["cid"];
    pub const INCLUDE: &[&str] = &["include"];
    pub const PHOTO_TOKEN: &[&str] = &["photoToken", "photo_token"];
}

impl RecordValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_list(&self) -> Option<&[RecordValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// String form of scalar values; enums reduce to their underlying value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(value) => Some(if *value { "True" } else { "False" }.to_owned()),
            Self::Enum { value, .. } => value.as_text(),
            Self::DateTime(value) => Some(value.to_rfc3339()),
            Self::Null | Self::List(_) | Self::Record(_) => None,
        }
    }
}

/// Reduce an enumeration-like value to its underlying value or string form.
pub fn enum_text(value: &RecordValue) -> Option<String> {
    value.as_text()
}

/// Integer coercion: ints, floats (truncated), booleans (0/1), digit-only text.
pub fn coerce_int(value: &RecordValue) -> Option<i64> {
    match value {
        RecordValue::Bool(value) => Some(i64::from(*value)),
        RecordValue::Int(value) => Some(*value),
        RecordValue::Float(value) if value.is_finite() => Some(value.trunc() as i64),
        RecordValue::Text(text) => parse_digits(text),
        RecordValue::Enum { value, .. } => coerce_int(value),
        _ => None,
    }
}

/// A scalar or a list of scalars, keeping only the entries that coerce.
pub fn coerce_int_list(value: &RecordValue) -> Vec<i64> {
    match value {
        RecordValue::List(items) => items.iter().filter_map(coerce_int).collect(),
        other => coerce_int(other).into_iter().collect(),
    }
}

/// Normalize a time-like value to integer milliseconds.
///
/// Numbers are assumed to already be in milliseconds. Structured date-times are
/// converted from their elapsed time since the epoch. Anything else is absent.
pub fn normalize_time_ms(value: &RecordValue) -> Option<i64> {
    match value {
        RecordValue::DateTime(value) => Some(value.timestamp_millis()),
        RecordValue::Enum { .. } => None,
        other => coerce_int(other),
    }
}

fn parse_digits(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => number.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Value::String(value) => Self::Text(value),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Record(Record {
                fields: fields
                    .into_iter()
                    .map(|(name, value)| (name, Self::from(value)))
                    .collect(),
            }),
        }
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match RecordValue::from(value) {
            RecordValue::Record(record) => record,
            _ => Record::default(),
        }
    }
}

impl From<bool> for RecordValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RecordValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for RecordValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for RecordValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Record> for RecordValue {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl From<Vec<RecordValue>> for RecordValue {
    fn from(value: Vec<RecordValue>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<RecordValue>> From<Option<T>> for RecordValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn first_matching_alias_wins() {
        let record = Record::new().with("chatId", 7).with("chat_id", 9);
        assert_eq!(get_field(&record, aliases::CHAT_ID), Some(RecordValue::Int(9)));

        let camel_only = Record::new().with("chatId", 7);
        assert_eq!(get_field(&camel_only, aliases::CHAT_ID), Some(RecordValue::Int(7)));
    }

    #[test]
    fn present_null_is_returned_by_get_field_but_not_get_present() {
        let record = Record::new().with("sender", RecordValue::Null).with("senderId", 5);
        assert_eq!(get_field(&record, aliases::SENDER), Some(RecordValue::Null));
        assert_eq!(get_present(&record, aliases::SENDER), None);
    }

    #[test]
    fn reads_json_objects_and_nested_records() {
        let value = json!({"link": {"type": "REPLY", "messageId": 42}});
        let link = get_field(&value, aliases::LINK).expect("link present");
        assert_eq!(
            get_field(&link, aliases::LINK_MESSAGE_ID).and_then(|v| coerce_int(&v)),
            Some(42)
        );
        assert_eq!(get_field(&json!([1, 2]), aliases::ID), None);
    }

    #[test]
    fn missing_source_yields_defaults() {
        let none: Option<Record> = None;
        assert_eq!(get_field(&none, aliases::TITLE), None);
        assert_eq!(get_text_or_empty(&none, aliases::TITLE), "");
    }

    #[test]
    fn normalizes_time_values_to_millis() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().expect("valid date");
        assert_eq!(
            normalize_time_ms(&RecordValue::DateTime(dt)),
            Some(dt.timestamp() * 1000)
        );
        assert_eq!(
            normalize_time_ms(&RecordValue::from(" 1700000000123 ")),
            Some(1_700_000_000_123)
        );
        assert_eq!(
            normalize_time_ms(&RecordValue::Float(1_700_000_000_999.7)),
            Some(1_700_000_000_999)
        );
        assert_eq!(normalize_time_ms(&RecordValue::Bool(true)), Some(1));
        assert_eq!(normalize_time_ms(&RecordValue::from("yesterday")), None);
        assert_eq!(normalize_time_ms(&RecordValue::from("-5")), None);
        assert_eq!(normalize_time_ms(&RecordValue::Null), None);
    }

    #[test]
    fn reduces_enums_to_their_value() {
        let value = RecordValue::Enum {
            name: "MessageType.USER".to_owned(),
            value: Box::new(RecordValue::from("USER")),
        };
        assert_eq!(enum_text(&value).as_deref(), Some("USER"));
        assert_eq!(enum_text(&RecordValue::Int(3)).as_deref(), Some("3"));
    }

    #[test]
    fn coerces_int_lists() {
        let mixed = RecordValue::List(vec![
            RecordValue::Int(1),
            RecordValue::from("2"),
            RecordValue::from("x"),
            RecordValue::Float(3.9),
        ]);
        assert_eq!(coerce_int_list(&mixed), vec![1, 2, 3]);
        assert_eq!(coerce_int_list(&RecordValue::from("17")), vec![17]);
        assert!(coerce_int_list(&RecordValue::Null).is_empty());
    }
}
