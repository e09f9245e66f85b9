use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::{Profile, body_json, default, parse_json_or_raw, status_is_error};
use crate::protocol::Entry;

static OPERATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(query|mutation|subscription)\b\s*([_A-Za-z][_0-9A-Za-z]*)?").unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct GraphqlProfile;

impl Profile for GraphqlProfile {
    fn key(&self) -> &'static str {
        "graphql"
    }

    fn get_name(&self, request: &Entry) -> String {
        let Some(document) = request_document(request) else {
            return default::name(request);
        };

        document
            .get("operationName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                query_text(&document)
                    .and_then(|query| OPERATION_RE.captures(query))
                    .and_then(|captures| captures.get(2))
                    .map(|name| name.as_str().to_string())
            })
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn get_tag(&self, request: &Entry) -> String {
        let query = request_document(request);
        match query.as_ref().and_then(query_text) {
            Some(query) => OPERATION_RE
                .captures(query)
                .and_then(|captures| captures.get(1))
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_else(|| "query".to_string()),
            None => "GQL".to_string(),
        }
    }

    fn get_params(&self, request: &Entry) -> Value {
        match request_document(request) {
            Some(document) => document.get("variables").cloned().unwrap_or(Value::Null),
            None => default::params(request),
        }
    }

    /// Unwraps `data` unless the response carries `errors`.
    fn get_result(&self, _request: &Entry, content: &str) -> Value {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(mut map)) => {
                if has_errors(&map) {
                    Value::Object(map)
                } else if let Some(data) = map.remove("data") {
                    data
                } else {
                    Value::Object(map)
                }
            }
            Ok(other) => other,
            Err(_) => Value::String(content.to_string()),
        }
    }

    fn get_meta(&self, request: &Entry) -> Value {
        json!({
            "operationType": self.get_tag(request),
            "status": request.response.status,
            "url": request.request.url,
        })
    }

    fn is_error(&self, request: &Entry, content: &str) -> bool {
        if status_is_error(request.response.status) {
            return true;
        }

        matches!(
            serde_json::from_str::<Value>(content),
            Ok(Value::Object(map)) if has_errors(&map)
        )
    }
}

/// The GraphQL request document from a POST body, or from the query string
/// for GET requests.
fn request_document(request: &Entry) -> Option<Value> {
    match body_json(request) {
        Some(Value::Array(mut batch)) if !batch.is_empty() => return Some(batch.swap_remove(0)),
        Some(document @ Value::Object(_)) => return Some(document),
        _ => {}
    }

    let query = default::query_object(&request.request)?;
    let query = query.as_object()?;
    if !query.contains_key("query") && !query.contains_key("operationName") {
        return None;
    }

    let mut document = Map::new();
    for (key, value) in query {
        let value = match (key.as_str(), value.as_str()) {
            ("variables" | "extensions", Some(text)) => parse_json_or_raw(text),
            _ => value.clone(),
        };
        document.insert(key.clone(), value);
    }
    Some(Value::Object(document))
}

/// Query text with leading whitespace and `#` comment lines removed.
fn query_text(document: &Value) -> Option<&str> {
    let mut text = document.get("query")?.as_str()?.trim_start();
    while text.starts_with('#') {
        text = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("").trim_start();
    }
    Some(text)
}

fn has_errors(map: &Map<String, Value>) -> bool {
    match map.get("errors") {
        None | Some(Value::Null) => false,
        Some(Value::Array(errors)) => !errors.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response, ResponseContent};

    fn post(body: &str, reply: &str) -> Entry {
        Entry {
            request: Request::new("POST", "https://x.dev/graphql").with_body("application/json", body),
            response: Response::with_content(200, ResponseContent::text("application/json", reply)),
            ..Entry::default()
        }
    }

    #[test]
    fn errors_keep_the_full_response() {
        let reply = r#"{"data":null,"errors":[{"message":"x"}]}"#;
        let entry = post(r#"{"query":"query Me { me { id } }"}"#, reply);
        let profile = GraphqlProfile;

        assert!(profile.is_error(&entry, reply));
        assert_eq!(
            profile.get_result(&entry, reply),
            json!({ "data": null, "errors": [{ "message": "x" }] })
        );
    }

    #[test]
    fn successful_responses_unwrap_data() {
        let reply = r#"{"data":{"me":{"id":"1"}},"errors":[]}"#;
        let entry = post(
            r#"{"query":"mutation Rename($n: String) { rename(n: $n) }","variables":{"n":"Ada"}}"#,
            reply,
        );
        let profile = GraphqlProfile;

        assert!(!profile.is_error(&entry, reply));
        assert_eq!(profile.get_result(&entry, reply), json!({ "me": { "id": "1" } }));
        assert_eq!(profile.get_name(&entry), "Rename");
        assert_eq!(profile.get_tag(&entry), "mutation");
        assert_eq!(profile.get_params(&entry), json!({ "n": "Ada" }));
    }

    #[test]
    fn operation_name_field_wins_and_anonymous_fallback() {
        let named = post(r#"{"operationName":"Explicit","query":"query Other { a }"}"#, "{}");
        assert_eq!(GraphqlProfile.get_name(&named), "Explicit");

        let shorthand = post(r##"{"query":"# leading comment\n{ viewer { id } }"}"##, "{}");
        assert_eq!(GraphqlProfile.get_name(&shorthand), "anonymous");
        assert_eq!(GraphqlProfile.get_tag(&shorthand), "query");
    }

    #[test]
    fn get_requests_read_the_query_string() {
        let entry = Entry {
            request: Request::new(
                "GET",
                "https://x.dev/graphql?query=query%20Feed%20%7B%20items%20%7D&variables=%7B%22first%22%3A10%7D",
            ),
            ..Entry::default()
        };

        assert_eq!(GraphqlProfile.get_name(&entry), "Feed");
        assert_eq!(GraphqlProfile.get_params(&entry), json!({ "first": 10 }));
    }

    #[test]
    fn non_graphql_bodies_fall_back_to_default_derivation() {
        let entry = Entry {
            request: Request::new("GET", "https://x.dev/graphql/health"),
            ..Entry::default()
        };
        assert_eq!(GraphqlProfile.get_name(&entry), "/graphql/health");
        assert_eq!(GraphqlProfile.get_tag(&entry), "GQL");
        assert_eq!(GraphqlProfile.get_result(&entry, "ok"), json!("ok"));
    }
}
