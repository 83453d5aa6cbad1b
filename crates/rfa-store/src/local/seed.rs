//! Development fixtures for the local backend
//!
//! Three known accounts with matching profiles, plus one academy welcome post
//! authored by the first account. Nobody is signed in after seeding.

use serde_json::json;

use crate::auth::{credential_digest, Account};
use crate::record::{timestamp_now, to_row, Record};
use crate::state::{StatePatch, StateStore};
use crate::table::Table;

/// `(id, email, password)` of every seeded account.
pub const DEV_ACCOUNTS: [(&str, &str, &str); 3] = [
    ("test-user-1", "nikola.kurobasa87@gmail.com", "Test123"),
    ("test-user-2", "coach@rfa.com", "Coach123"),
    ("test-user-3", "admin@rfa.com", "Admin123"),
];

pub const WELCOME_POST: &str = "Welcome to Rocket Football Academy! 🚀⚽";

fn username(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn full_name(email: &str) -> String {
    username(email).split('.').collect::<Vec<_>>().join(" ")
}

/// Build the seeded accounts and records.
pub fn fixtures() -> (Vec<Account>, Vec<Record>, Vec<Record>) {
    let now = timestamp_now();

    let accounts: Vec<Account> = DEV_ACCOUNTS
        .iter()
        .map(|(id, email, password)| Account {
            id: id.to_string(),
            email: email.to_string(),
            password_digest: credential_digest(email, password),
            created_at: now.clone(),
        })
        .collect();

    let profiles = accounts
        .iter()
        .filter_map(|account| {
            let row = to_row(json!({
                "id": account.id,
                "username": username(&account.email),
                "full_name": full_name(&account.email),
                "avatar_url": null,
            }))
            .ok()?;
            Record::from_insert(Table::Profiles, row, &now).ok()
        })
        .collect();

    let posts = to_row(json!({
        "content": WELCOME_POST,
        "author_id": DEV_ACCOUNTS[0].0,
        "is_academy_post": true,
    }))
    .and_then(|row| Record::from_insert(Table::Posts, row, &now))
    .map(|post| vec![post])
    .unwrap_or_default();

    (accounts, profiles, posts)
}

/// Replace accounts, profiles and posts in `store` with the fixtures.
pub fn apply(store: &StateStore) {
    let (accounts, profiles, posts) = fixtures();
    store.set_state(
        StatePatch::new()
            .accounts(accounts)
            .table(Table::Profiles, profiles)
            .table(Table::Posts, posts),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_derive_names_from_email() {
        let (_, profiles, posts) = fixtures();
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].get("username"), Some(&json!("nikola.kurobasa87")));
        assert_eq!(profiles[0].get("full_name"), Some(&json!("nikola kurobasa87")));
        assert_eq!(posts[0].get("author_id"), Some(&json!("test-user-1")));
    }
}
