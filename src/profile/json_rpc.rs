use serde_json::{Value, json};

use super::{Profile, body_json, default, status_is_error};
use crate::protocol::Entry;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRpcProfile;

impl Profile for JsonRpcProfile {
    fn key(&self) -> &'static str {
        "jsonRpc"
    }

    fn get_name(&self, request: &Entry) -> String {
        match body_json(request) {
            Some(Value::Array(calls)) => calls
                .iter()
                .filter_map(|call| call.get("method").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", "),
            Some(call) => call
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| default::name(request)),
            None => default::name(request),
        }
    }

    fn get_tag(&self, _request: &Entry) -> String {
        "RPC".to_string()
    }

    fn get_params(&self, request: &Entry) -> Value {
        match body_json(request) {
            Some(Value::Array(calls)) => Value::Array(
                calls
                    .iter()
                    .map(|call| call.get("params").cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
            Some(call) => call.get("params").cloned().unwrap_or(Value::Null),
            None => default::params(request),
        }
    }

    fn get_result(&self, _request: &Entry, content: &str) -> Value {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Array(replies)) => {
                Value::Array(replies.into_iter().map(unwrap_reply).collect())
            }
            Ok(reply) => unwrap_reply(reply),
            Err(_) => Value::String(content.to_string()),
        }
    }

    fn get_meta(&self, request: &Entry) -> Value {
        let call = body_json(request).unwrap_or(Value::Null);
        json!({
            "id": call.get("id"),
            "jsonrpc": call.get("jsonrpc"),
            "status": request.response.status,
            "url": request.request.url,
        })
    }

    fn is_error(&self, request: &Entry, content: &str) -> bool {
        if status_is_error(request.response.status) {
            return true;
        }

        match serde_json::from_str::<Value>(content) {
            Ok(Value::Array(replies)) => replies.iter().any(has_error),
            Ok(reply) => has_error(&reply),
            Err(_) => false,
        }
    }
}

/// Version 1.0 replies carry both keys with the unused one set to null, so a
/// non-null `error` wins over `result`.
fn unwrap_reply(reply: Value) -> Value {
    match reply {
        Value::Object(mut map) => match map.remove("error") {
            Some(error) if !error.is_null() => error,
            error => match map.remove("result") {
                Some(result) => result,
                None => error.unwrap_or(Value::Object(map)),
            },
        },
        other => other,
    }
}

fn has_error(reply: &Value) -> bool {
    reply
        .get("error")
        .is_some_and(|error| !error.is_null())
}
