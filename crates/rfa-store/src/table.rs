//! Closed table enumeration and per-table registry
//!
//! Every table the client can address is a variant of [`Table`]. Per-table
//! behaviour (name, insert defaults, foreign keys) is resolved by `match`, so
//! an unknown table is a compile error rather than a runtime lookup miss.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Posts,
    Likes,
    Comments,
    Messages,
    Notifications,
    UserRoles,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Profiles,
        Table::Posts,
        Table::Likes,
        Table::Comments,
        Table::Messages,
        Table::Notifications,
        Table::UserRoles,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Posts => "posts",
            Table::Likes => "likes",
            Table::Comments => "comments",
            Table::Messages => "messages",
            Table::Notifications => "notifications",
            Table::UserRoles => "user_roles",
        }
    }

    /// Field values filled in on insert when the caller leaves them out.
    pub fn defaults(self) -> Map<String, Value> {
        let defaults = match self {
            Table::Profiles => json!({ "full_name": null, "avatar_url": null }),
            Table::Posts => json!({ "content": "", "is_academy_post": false }),
            Table::Comments => json!({ "content": "", "parent_id": null }),
            Table::Messages | Table::Notifications => json!({ "read": false }),
            Table::Likes | Table::UserRoles => json!({}),
        };
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Foreign-key columns of this table and the table each one points at.
    pub const fn references(self) -> &'static [(&'static str, Table)] {
        match self {
            Table::Profiles => &[],
            Table::Posts => &[("author_id", Table::Profiles)],
            Table::Likes => &[("post_id", Table::Posts), ("user_id", Table::Profiles)],
            Table::Comments => &[
                ("post_id", Table::Posts),
                ("author_id", Table::Profiles),
                ("parent_id", Table::Comments),
            ],
            Table::Messages => &[
                ("sender_id", Table::Profiles),
                ("receiver_id", Table::Profiles),
            ],
            Table::Notifications | Table::UserRoles => &[("user_id", Table::Profiles)],
        }
    }

    /// Stand-in embedded when a foreign key points at a row that is gone.
    pub fn dangling_placeholder(self) -> Option<Map<String, Value>> {
        match self {
            Table::Profiles => match json!({ "username": "Unknown", "avatar_url": null }) {
                Value::Object(map) => Some(map),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DbError::invalid(format!("unknown table: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("users".parse::<Table>().is_err());
    }

    #[test]
    fn serde_name_matches_as_str() {
        let json = serde_json::to_value(Table::UserRoles).unwrap();
        assert_eq!(json, "user_roles");
    }

    #[test]
    fn post_defaults_mark_non_academy() {
        let defaults = Table::Posts.defaults();
        assert_eq!(defaults["is_academy_post"], false);
        assert!(Table::Likes.defaults().is_empty());
    }

    #[test]
    fn references_point_at_known_tables() {
        assert_eq!(Table::Posts.references(), &[("author_id", Table::Profiles)]);
        assert!(Table::Profiles.references().is_empty());
        let to_posts: Vec<Table> = Table::ALL
            .into_iter()
            .filter(|t| t.references().iter().any(|(_, target)| *target == Table::Posts))
            .collect();
        assert_eq!(to_posts, vec![Table::Likes, Table::Comments]);
    }

    #[test]
    fn only_profiles_have_a_placeholder() {
        let ghost = Table::Profiles.dangling_placeholder().unwrap();
        assert_eq!(ghost["username"], "Unknown");
        assert!(Table::Posts.dangling_placeholder().is_none());
    }
}
