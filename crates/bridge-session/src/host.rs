//! JSON shaping at the host boundary.
//!
//! Hosts receive plain data only: `{"success": true, ...payload}` or
//! `{"success": false, "error": "...", "code": "..."}`.

use bridge_core::{BridgeError, BridgeErrorCategory};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::error;

/// Render an operation result for the host.
pub fn respond<T: Serialize>(result: Result<T, BridgeError>) -> Value {
    match result {
        Ok(payload) => success(&payload),
        Err(err) => failure(&err),
    }
}

/// [`respond`] encoded as a JSON string.
pub fn respond_json<T: Serialize>(result: Result<T, BridgeError>) -> String {
    respond(result).to_string()
}

fn success<T: Serialize>(payload: &T) -> Value {
    let mut object = Map::new();
    object.insert("success".to_owned(), Value::Bool(true));
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => object.extend(fields),
        Ok(Value::Null) => {}
        Ok(other) => {
            object.insert("result".to_owned(), other);
        }
        Err(err) => {
            error!(error = %err, "failed to serialize bridge payload");
            return failure(&BridgeError::new(
                BridgeErrorCategory::Serialization,
                "serialize_failed",
                err.to_string(),
            ));
        }
    }
    Value::Object(object)
}

fn failure(err: &BridgeError) -> Value {
    let mut value = json!({
        "success": false,
        "error": err.message,
        "code": err.code,
    });
    if err.requires_new_code() {
        value["requires_new_code"] = Value::Bool(true);
    }
    if let Some(retry_after_ms) = err.retry_after_ms {
        value["retry_after_ms"] = Value::from(retry_after_ms);
    }
    value
}
