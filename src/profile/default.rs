use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use url::{Url, form_urlencoded};

use super::{Profile, is_json_mime, parse_json_or_raw};
use crate::protocol::{Entry, Request, url_path};

static STATIC_ASSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\.(css|js|mjs|map|png|jpe?g|gif|svg|ico|webp|avif|bmp|woff2?|ttf|otf|eot|mp3|mp4|m4a|webm|ogg|wav)$",
    )
    .unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProfile;

impl Profile for DefaultProfile {
    fn key(&self) -> &'static str {
        super::DEFAULT_PROFILE
    }
}

pub(super) fn name(entry: &Entry) -> String {
    url_path(&entry.request.url)
}

pub(super) fn tag(entry: &Entry) -> String {
    entry.request.method.to_ascii_uppercase()
}

pub(super) fn params(entry: &Entry) -> Value {
    request_params(&entry.request)
}

/// `{query, body}`, or whichever of the two is present.
pub(crate) fn request_params(request: &Request) -> Value {
    let query = query_object(request);
    let body = request
        .post_data
        .as_ref()
        .filter(|body| !body.text.is_empty())
        .map(|body| decode_body(&body.mime_type, &body.text));

    match (query, body) {
        (None, None) => Value::Null,
        (Some(query), None) => query,
        (None, Some(body)) => body,
        (Some(query), Some(body)) => json!({ "query": query, "body": body }),
    }
}

pub(super) fn result(entry: &Entry, content: &str) -> Value {
    if content.is_empty() {
        return Value::Null;
    }

    if is_json_mime(entry.mime_type()) {
        parse_json_or_raw(content)
    } else {
        Value::String(content.to_string())
    }
}

pub(super) fn meta(entry: &Entry) -> Value {
    json!({
        "method": entry.request.method,
        "url": entry.request.url,
        "status": entry.response.status,
        "statusText": entry.response.status_text,
        "httpVersion": entry.response.http_version,
        "mimeType": entry.mime_type(),
        "serverIPAddress": entry.server_ip_address,
        "startedDateTime": entry.started_date_time,
        "timings": entry.timings,
    })
}

/// Hides non-HTTP(S) schemes and static assets.
pub(super) fn should_show(entry: &Entry) -> bool {
    match Url::parse(&entry.request.url) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && !STATIC_ASSET_RE.is_match(url.path())
        }
        Err(_) => false,
    }
}

/// Query parameters as an object, from the HAR list or else the URL itself.
pub(super) fn query_object(request: &Request) -> Option<Value> {
    let mut map = Map::new();

    if request.query_string.is_empty() {
        if let Ok(url) = Url::parse(&request.url) {
            for (name, value) in url.query_pairs() {
                map.insert(name.into_owned(), Value::String(value.into_owned()));
            }
        }
    } else {
        for param in &request.query_string {
            map.insert(param.name.clone(), Value::String(param.value.clone()));
        }
    }

    (!map.is_empty()).then_some(Value::Object(map))
}

pub(super) fn decode_body(mime_type: &str, text: &str) -> Value {
    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("x-www-form-urlencoded") {
        let map = form_urlencoded::parse(text.as_bytes())
            .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
            .collect::<Map<_, _>>();
        return Value::Object(map);
    }

    let trimmed = text.trim_start();
    if is_json_mime(&mime) || trimmed.starts_with('{') || trimmed.starts_with('[') {
        return parse_json_or_raw(text);
    }

    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NameValue, Response, ResponseContent};

    fn get(url: &str) -> Entry {
        Entry {
            request: Request::new("get", url),
            ..Entry::default()
        }
    }

    #[test]
    fn hides_static_assets_and_foreign_schemes() {
        assert!(!should_show(&get("https://cdn.x.dev/site.css")));
        assert!(!should_show(&get("https://cdn.x.dev/app.min.JS?v=3")));
        assert!(!should_show(&get("https://cdn.x.dev/fonts/inter.woff2")));
        assert!(!should_show(&get("wss://x.dev/socket")));
        assert!(!should_show(&get("data:image/png;base64,AAAA")));
        assert!(!should_show(&get("chrome-extension://abc/page.html")));
        assert!(!should_show(&get("not a url")));

        assert!(should_show(&get("https://x.dev/api/users")));
        assert!(should_show(&get("http://localhost:8080/graphql")));
        assert!(should_show(&get("https://x.dev/styles.css.json")));
    }

    #[test]
    fn name_and_tag_come_from_path_and_method() {
        let entry = get("https://x.dev/api/users?id=4");
        assert_eq!(name(&entry), "/api/users");
        assert_eq!(tag(&entry), "GET");
        assert_eq!(name(&get("relative/path")), "relative/path");
    }

    #[test]
    fn params_prefer_har_query_list_and_decode_bodies() {
        let mut entry = get("https://x.dev/search?q=url-only");
        assert_eq!(params(&entry), json!({ "q": "url-only" }));

        entry.request.query_string = vec![NameValue {
            name: "q".into(),
            value: "listed".into(),
        }];
        assert_eq!(params(&entry), json!({ "q": "listed" }));

        let form = Entry {
            request: Request::new("POST", "https://x.dev/login")
                .with_body("application/x-www-form-urlencoded", "user=ada&remember=1"),
            ..Entry::default()
        };
        assert_eq!(params(&form), json!({ "user": "ada", "remember": "1" }));

        let text = Entry {
            request: Request::new("POST", "https://x.dev/log").with_body("text/plain", "hello"),
            ..Entry::default()
        };
        assert_eq!(params(&text), json!("hello"));
        assert_eq!(params(&get("https://x.dev/")), Value::Null);
    }

    #[test]
    fn result_parses_json_only_for_json_mime() {
        let mut entry = get("https://x.dev/");
        entry.response = Response::with_content(200, ResponseContent::text("application/json", ""));
        assert_eq!(result(&entry, r#"{"a":1}"#), json!({ "a": 1 }));
        assert_eq!(result(&entry, "{broken"), json!("{broken"));
        assert_eq!(result(&entry, ""), Value::Null);

        entry.response.content.mime_type = "text/html".into();
        assert_eq!(result(&entry, r#"{"a":1}"#), json!(r#"{"a":1}"#));
    }
}
