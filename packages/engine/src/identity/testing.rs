// packages/engine/src/identity/testing.rs
//! Record builders shared by unit tests

use crate::identity::record::{IdentityRecord, SecretSeed, TokenPair};
use crate::identity::session::SessionDescriptor;
use chrono::{Duration, Utc};
use url::form_urlencoded;

/// Well-known development mnemonic (account 0 is 0xf39F…2266)
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Launch init data for a user
pub fn init_data(id: u64, first_name: &str, last_name: &str) -> String {
    let user = serde_json::json!({
        "id": id,
        "first_name": first_name,
        "last_name": last_name,
    });
    form_urlencoded::Serializer::new(String::new())
        .append_pair("query_id", &format!("Q{id}"))
        .append_pair("user", &user.to_string())
        .append_pair("auth_date", "1700000000")
        .append_pair("hash", "feedface")
        .finish()
}

/// Record with the test mnemonic and no tokens
pub fn record(id: u64, name: &str) -> IdentityRecord {
    let session = SessionDescriptor::parse(&init_data(id, name, "")).expect("valid init data");
    IdentityRecord::new(session, SecretSeed::new(TEST_MNEMONIC), 10_000)
}

/// Record holding an access token valid for an hour
pub fn logged_in_record(id: u64, name: &str) -> IdentityRecord {
    let mut record = record(id, name);
    record.tokens = TokenPair {
        access_token: format!("access-{id}"),
        access_expiry: Some(Utc::now() + Duration::hours(1)),
        refresh_token: format!("refresh-{id}"),
        refresh_expiry: Some(Utc::now() + Duration::days(7)),
    };
    record
}
