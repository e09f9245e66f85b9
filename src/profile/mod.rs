//! Profiles derive display fields (name, tag, params, result, meta) and
//! error classification from a completed request record. Which profile
//! governs a request is decided by the [`Matcher`] from its URL.

mod default;
mod graphql;
mod json_rpc;
pub mod phoenix;

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::Entry;

pub(crate) use default::request_params;
pub use default::DefaultProfile;
pub use graphql::GraphqlProfile;
pub use json_rpc::JsonRpcProfile;

pub const DEFAULT_PROFILE: &str = "default";

/// Stateless bundle of extraction functions. The provided bodies implement the
/// `default` profile; specialised profiles override what differs.
///
/// Every function is total: decode failures fall back to the raw content.
pub trait Profile: Send + Sync + fmt::Debug {
    fn key(&self) -> &'static str;

    fn get_name(&self, request: &Entry) -> String {
        default::name(request)
    }

    fn get_tag(&self, request: &Entry) -> String {
        default::tag(request)
    }

    fn get_params(&self, request: &Entry) -> Value {
        default::params(request)
    }

    /// `content` is the decoded response body supplied by the caller.
    fn get_result(&self, request: &Entry, content: &str) -> Value {
        default::result(request, content)
    }

    fn get_meta(&self, request: &Entry) -> Value {
        default::meta(request)
    }

    fn is_error(&self, request: &Entry, _content: &str) -> bool {
        status_is_error(request.response.status)
    }

    fn should_show(&self, request: &Entry) -> bool {
        default::should_show(request)
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown profile '{name}' (known: {known})")]
    UnknownProfile { name: String, known: String },
    #[error("invalid route rule '{rule}': {reason}")]
    InvalidRoute { rule: String, reason: String },
}

/// `PATTERN=PROFILE`: requests whose URL matches the regex use the profile.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: Regex,
    profile: String,
}

impl RouteRule {
    pub fn new(pattern: &str, profile: &str) -> Result<Self, ProfileError> {
        let regex = Regex::new(pattern).map_err(|err| ProfileError::InvalidRoute {
            rule: format!("{}={}", pattern, profile),
            reason: err.to_string(),
        })?;

        Ok(Self {
            pattern: regex,
            profile: profile.to_string(),
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl FromStr for RouteRule {
    type Err = ProfileError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (pattern, profile) = input
            .rsplit_once('=')
            .filter(|(pattern, profile)| !pattern.is_empty() && !profile.is_empty())
            .ok_or_else(|| ProfileError::InvalidRoute {
                rule: input.to_string(),
                reason: "expected PATTERN=PROFILE".to_string(),
            })?;

        Self::new(pattern, profile)
    }
}

/// Total function from URL to profile name: first matching rule, else the
/// fallback.
#[derive(Debug, Clone)]
pub struct Matcher {
    fallback: String,
    rules: Vec<RouteRule>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::constant(DEFAULT_PROFILE)
    }
}

impl Matcher {
    pub fn constant(profile: impl Into<String>) -> Self {
        Self {
            fallback: profile.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = RouteRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn profile_for(&self, url: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(url))
            .map(|rule| rule.profile.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    fn profile_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.fallback.as_str()).chain(self.rules.iter().map(RouteRule::profile))
    }
}

/// Static registry of the built-in HTTP profiles plus the matcher choosing
/// among them.
#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: BTreeMap<&'static str, Arc<dyn Profile>>,
    fallback: Arc<dyn Profile>,
    matcher: Matcher,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin(Matcher::default())
    }
}

impl ProfileRegistry {
    /// Rejects matchers that could name a profile that is not registered.
    pub fn new(matcher: Matcher) -> Result<Self, ProfileError> {
        let registry = Self::builtin(matcher);

        for name in registry.matcher.profile_names() {
            if !registry.profiles.contains_key(name) {
                return Err(ProfileError::UnknownProfile {
                    name: name.to_string(),
                    known: registry.names().join(", "),
                });
            }
        }

        Ok(registry)
    }

    fn builtin(matcher: Matcher) -> Self {
        let fallback: Arc<dyn Profile> = Arc::new(DefaultProfile);
        let mut profiles: BTreeMap<&'static str, Arc<dyn Profile>> = BTreeMap::new();
        for profile in [
            Arc::clone(&fallback),
            Arc::new(JsonRpcProfile) as Arc<dyn Profile>,
            Arc::new(GraphqlProfile) as Arc<dyn Profile>,
        ] {
            profiles.insert(profile.key(), profile);
        }

        Self {
            profiles,
            fallback,
            matcher,
        }
    }

    pub fn resolve(&self, url: &str) -> Arc<dyn Profile> {
        let name = self.matcher.profile_for(url);
        self.get(name).unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Profile>> {
        self.profiles.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.profiles.keys().copied().collect()
    }
}

pub fn status_is_error(status: i64) -> bool {
    status > 399 || status == 0
}

pub fn is_json_mime(mime_type: &str) -> bool {
    mime_type.to_ascii_lowercase().contains("json")
}

pub fn parse_json_or_raw(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn body_json(request: &Entry) -> Option<Value> {
    request
        .request
        .body_text()
        .and_then(|text| serde_json::from_str(text).ok())
}
