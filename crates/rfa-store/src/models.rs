//! Typed rows for each table
//!
//! Records travel as flat JSON maps; these structs are the typed view callers
//! decode into with [`crate::Record::decode`] or `Response::decode`.

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Binds a row type to the table it lives in.
pub trait TableRow: Serialize + for<'de> Deserialize<'de> {
    const TABLE: Table;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub is_academy_post: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub post_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Admin,
    Coach,
    Player,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: String,
    pub user_id: String,
    pub role: AppRole,
    pub created_at: String,
    pub updated_at: String,
}

macro_rules! table_row {
    ($($ty:ty => $table:expr),* $(,)?) => {
        $(impl TableRow for $ty {
            const TABLE: Table = $table;
        })*
    };
}

table_row! {
    Profile => Table::Profiles,
    Post => Table::Posts,
    Like => Table::Likes,
    Comment => Table::Comments,
    Message => Table::Messages,
    Notification => Table::Notifications,
    UserRole => Table::UserRoles,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{to_row, Record};
    use serde_json::json;

    #[test]
    fn notification_kind_uses_type_key() {
        let row = to_row(json!({
            "user_id": "u1",
            "type": "like",
            "content": "Someone liked your post",
        }))
        .unwrap();
        let record = Record::from_insert(Notification::TABLE, row, "2024-01-01T00:00:00.000Z").unwrap();
        let decoded: Notification = record.decode().unwrap();

        assert_eq!(decoded.kind, "like");
        assert!(!decoded.read);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(AppRole::Coach).unwrap(), "coach");
    }
}
