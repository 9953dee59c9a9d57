// packages/engine/src/identity/session.rs
//! Platform session descriptor
//!
//! Each identity is configured with the web-app launch data the platform
//! hands its mini-app. It arrives in one of three shapes:
//!
//! - the launch fragment, `tgWebAppData=<encoded init data>&tgWebAppVersion=…`
//! - the init data itself, `query_id=…&user=%7B…%7D&auth_date=…&hash=…`
//! - the init data percent-encoded once more as a single token
//!
//! All three resolve to the same init-data pairs.

use crate::identity::record::IdentityId;
use crate::utils::errors::{Result, WorkerError};
use serde::Deserialize;
use url::form_urlencoded;

/// Keys forwarded in the verification header, in order
const HEADER_KEYS: [&str; 4] = ["query_id", "user", "auth_date", "hash"];

/// Nesting levels tried before giving up on an encoded descriptor
const MAX_DECODE_DEPTH: usize = 3;

/// User object embedded in the init data
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformUser {
    pub id: u64,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub username: Option<String>,
}

/// Parsed launch data for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    user: PlatformUser,
    pairs: Vec<(String, String)>,
}

impl SessionDescriptor {
    /// Parse launch data in any of the supported shapes
    pub fn parse(raw: &str) -> Result<Self> {
        let pairs = locate_init_data(raw.trim(), 0).ok_or_else(|| {
            WorkerError::InvalidSession("no `user` field in launch data".to_string())
        })?;

        let user_json = pairs
            .iter()
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();

        let user: PlatformUser = serde_json::from_str(user_json)
            .map_err(|e| WorkerError::InvalidSession(format!("bad user object: {}", e)))?;

        Ok(Self { user, pairs })
    }

    pub fn user_id(&self) -> IdentityId {
        IdentityId(self.user.id)
    }

    pub fn user(&self) -> &PlatformUser {
        &self.user
    }

    /// `first last`, falling back to the username and then the id
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.user.first_name, self.user.last_name);
        let full = full.trim();

        if !full.is_empty() {
            full.to_string()
        } else if let Some(username) = self.user.username.as_deref().filter(|u| !u.is_empty()) {
            username.to_string()
        } else {
            self.user.id.to_string()
        }
    }

    /// Value of a single init-data field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Init data re-encoded for the verification request header
    pub fn header_value(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for key in HEADER_KEYS {
            if let Some(value) = self.field(key) {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }
}

fn locate_init_data(raw: &str, depth: usize) -> Option<Vec<(String, String)>> {
    if depth > MAX_DECODE_DEPTH || raw.is_empty() {
        return None;
    }

    let pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.iter().any(|(key, _)| key == "user") {
        return Some(pairs);
    }

    if let Some((_, inner)) = pairs.iter().find(|(key, _)| key == "tgWebAppData") {
        return locate_init_data(inner, depth + 1);
    }

    // Fully encoded init data parses as one key with no value
    match pairs.as_slice() {
        [(key, value)] if value.is_empty() && key.contains('=') => locate_init_data(key, depth + 1),
        _ => None,
    }
}
