//! Table contract tests.
//!
//! Every test runs against both backends: the in-memory `LocalBackend` and a
//! `RemoteBackend` on an embedded `mem://` SurrealDB. Any conforming backend
//! must pass these.

use rfa_store::{Client, ErrorKind, Order, Post, Profile, RemoteBackend, Table};
use serde_json::json;

async fn clients() -> Vec<Client> {
    rfa_store::telemetry::init_tracing(false, tracing::Level::WARN);
    let remote = RemoteBackend::in_memory()
        .await
        .expect("embedded SurrealDB should start");
    vec![Client::local(), Client::remote(remote)]
}

// ===========================================================================
// insert / select
// ===========================================================================

#[tokio::test]
async fn insert_then_lookup_is_deep_equal() {
    for client in clients().await {
        let inserted = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "nikola", "full_name": "Nikola K" }))
            .await
            .into_result()
            .unwrap()
            .unwrap();

        let found = client
            .from(Table::Profiles)
            .select("*")
            .eq("id", "u1")
            .single()
            .await
            .into_result()
            .unwrap()
            .unwrap();

        assert_eq!(found, inserted, "backend {}", client.backend_name());
        assert_eq!(found.get("avatar_url"), Some(&json!(null)));
    }
}

#[tokio::test]
async fn insert_assigns_id_timestamps_and_defaults() {
    for client in clients().await {
        let post = client
            .from(Table::Posts)
            .insert(json!({ "author_id": "u1" }))
            .await
            .decode::<Post>()
            .into_result()
            .unwrap()
            .unwrap();

        assert!(!post.id.is_empty());
        assert_eq!(post.content, "");
        assert!(!post.is_academy_post);
        assert_eq!(post.created_at, post.updated_at);
    }
}

#[tokio::test]
async fn insert_duplicate_id_conflicts() {
    for client in clients().await {
        let first = client
            .from(Table::Likes)
            .insert(json!({ "id": "l1", "post_id": "p1", "user_id": "u1" }))
            .await;
        assert!(first.is_ok());

        let second = client
            .from(Table::Likes)
            .insert(json!({ "id": "l1", "post_id": "p2", "user_id": "u2" }))
            .await;
        assert!(second.data.is_none());
        assert_eq!(second.error.unwrap().kind(), ErrorKind::Conflict);

        let likes = client.from(Table::Likes).select("*").await.data.unwrap();
        assert_eq!(likes.len(), 1);
        assert_eq!(likes[0].get("post_id"), Some(&json!("p1")));
    }
}

#[tokio::test]
async fn insert_many_returns_every_record() {
    for client in clients().await {
        let rows = (0..3).map(|i| json!({ "post_id": "p1", "user_id": format!("u{i}") }));
        let inserted = client
            .from(Table::Likes)
            .insert_many(rows)
            .await
            .data
            .unwrap();
        assert_eq!(inserted.len(), 3);

        let stored = client.from(Table::Likes).select("*").await.data.unwrap();
        assert_eq!(stored, inserted);
    }
}

#[tokio::test]
async fn select_preserves_insertion_order_and_sorts_stably() {
    for client in clients().await {
        for (content, author) in [("b", "u1"), ("a", "u2"), ("b", "u3"), ("c", "u4")] {
            let resp = client
                .from(Table::Posts)
                .insert(json!({ "content": content, "author_id": author }))
                .await;
            assert!(resp.is_ok());
        }

        let authors = |rows: Vec<rfa_store::Record>| -> Vec<String> {
            rows.iter()
                .map(|r| r.get("author_id").and_then(|v| v.as_str()).unwrap().to_string())
                .collect()
        };

        let natural = client.from(Table::Posts).select("*").await.data.unwrap();
        assert_eq!(authors(natural), ["u1", "u2", "u3", "u4"]);

        let ascending = client
            .from(Table::Posts)
            .select("*")
            .order("content", Order::asc())
            .await
            .data
            .unwrap();
        assert_eq!(authors(ascending), ["u2", "u1", "u3", "u4"]);

        let descending = client
            .from(Table::Posts)
            .select("*")
            .order("content", Order::desc())
            .limit(2)
            .await
            .data
            .unwrap();
        assert_eq!(authors(descending), ["u4", "u1"]);
    }
}

#[tokio::test]
async fn select_projects_columns() {
    for client in clients().await {
        let resp = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "coach" }))
            .await;
        assert!(resp.is_ok());

        let rows = client
            .from(Table::Profiles)
            .select("id, username")
            .await
            .data
            .unwrap();
        let fields = rows[0].fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("username"), Some(&json!("coach")));
    }
}

#[tokio::test]
async fn single_on_missing_row_is_empty() {
    for client in clients().await {
        let resp = client
            .from(Table::Profiles)
            .select("*")
            .eq("id", "nobody")
            .single()
            .await;
        assert!(resp.data.is_none());
        assert!(resp.error.is_none());
    }
}

#[tokio::test]
async fn feed_select_embeds_author_and_counts() {
    for client in clients().await {
        let profile = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "coach", "avatar_url": "https://cdn/u1.png" }))
            .await;
        assert!(profile.is_ok());
        let posts = [("p1", "u1"), ("p2", "ghost")]
            .map(|(id, author)| json!({ "id": id, "author_id": author, "content": id }));
        assert!(client.from(Table::Posts).insert_many(posts).await.is_ok());
        let likes = ["a", "b"].map(|user| json!({ "post_id": "p1", "user_id": user }));
        assert!(client.from(Table::Likes).insert_many(likes).await.is_ok());
        let comment = client
            .from(Table::Comments)
            .insert(json!({ "post_id": "p2", "author_id": "u1", "content": "nice" }))
            .await;
        assert!(comment.is_ok());

        let feed = client
            .from(Table::Posts)
            .select("*, profiles:author_id (id, username, avatar_url), likes:likes (count), comments:comments (count)")
            .order("created_at", Order::desc())
            .await
            .into_result()
            .unwrap()
            .unwrap();
        assert_eq!(feed.len(), 2, "backend {}", client.backend_name());

        let stamps: Vec<&str> = feed.iter().map(|p| p.created_at()).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));

        let post = |id: &str| feed.iter().find(|p| p.id() == id).unwrap();
        assert_eq!(post("p1").get("content"), Some(&json!("p1")));
        assert_eq!(
            post("p1").get("profiles"),
            Some(&json!({ "id": "u1", "username": "coach", "avatar_url": "https://cdn/u1.png" }))
        );
        assert_eq!(post("p1").get("likes"), Some(&json!([{ "count": 2 }])));
        assert_eq!(post("p1").get("comments"), Some(&json!([{ "count": 0 }])));

        assert_eq!(
            post("p2").get("profiles"),
            Some(&json!({ "username": "Unknown", "avatar_url": null }))
        );
        assert_eq!(post("p2").get("likes"), Some(&json!([{ "count": 0 }])));
        assert_eq!(post("p2").get("comments"), Some(&json!([{ "count": 1 }])));
    }
}

#[tokio::test]
async fn embeds_respect_column_lists_and_single() {
    for client in clients().await {
        let profile = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "coach" }))
            .await;
        assert!(profile.is_ok());
        let post = client
            .from(Table::Posts)
            .insert(json!({ "id": "p1", "author_id": "u1" }))
            .await;
        assert!(post.is_ok());

        let row = client
            .from(Table::Posts)
            .select("id, profiles(username)")
            .eq("id", "p1")
            .single()
            .await
            .data
            .unwrap();
        let fields = row.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("profiles"), Some(&json!({ "username": "coach" })));

        let resp = client
            .from(Table::Posts)
            .select("*, profiles:author_id(username")
            .await;
        assert!(resp.data.is_none());
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::InvalidRequest);
    }
}

// ===========================================================================
// update
// ===========================================================================

#[tokio::test]
async fn update_merges_shallowly() {
    for client in clients().await {
        let before = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "nikola", "full_name": "Nikola K" }))
            .await
            .decode::<Profile>()
            .data
            .unwrap();

        let after = client
            .from(Table::Profiles)
            .update(json!({ "avatar_url": "https://cdn/u1.png" }))
            .eq("id", "u1")
            .await
            .decode::<Profile>()
            .data
            .unwrap();

        assert_eq!(after.id, before.id);
        assert_eq!(after.username, before.username);
        assert_eq!(after.full_name, before.full_name);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.avatar_url.as_deref(), Some("https://cdn/u1.png"));
        assert!(after.updated_at >= after.created_at);

        let stored = client
            .table::<Profile>()
            .select("*")
            .eq("id", "u1")
            .single()
            .await
            .decode::<Profile>()
            .data
            .unwrap();
        assert_eq!(stored, after);
    }
}

#[tokio::test]
async fn update_never_changes_id_or_created_at() {
    for client in clients().await {
        let before = client
            .from(Table::Messages)
            .insert(json!({ "id": "m1", "sender_id": "a", "receiver_id": "b", "content": "hi" }))
            .await
            .data
            .unwrap();

        let after = client
            .from(Table::Messages)
            .update(json!({ "created_at": "1999-01-01T00:00:00.000Z", "read": true }))
            .eq("id", "m1")
            .await
            .data
            .unwrap();

        assert_eq!(after.id(), "m1");
        assert_eq!(after.created_at(), before.created_at());
        assert_eq!(after.get("read"), Some(&json!(true)));
    }
}

#[tokio::test]
async fn update_unknown_target_is_not_found() {
    for client in clients().await {
        let resp = client
            .from(Table::Profiles)
            .update(json!({ "username": "ghost" }))
            .eq("id", "missing")
            .await;

        assert!(resp.data.is_none());
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::NotFound);
    }
}

#[tokio::test]
async fn update_by_patch_id_leaves_other_fields() {
    for client in clients().await {
        let before = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "nikola", "full_name": "A" }))
            .await
            .decode::<Profile>()
            .data
            .unwrap();

        let after = client
            .from(Table::Profiles)
            .update(json!({ "id": "u1", "full_name": "B" }))
            .await
            .decode::<Profile>()
            .data
            .unwrap();

        assert_eq!(after.id, "u1");
        assert_eq!(after.full_name.as_deref(), Some("B"));
        assert_eq!(after.username, before.username);
        assert_eq!(after.avatar_url, before.avatar_url);
        assert_eq!(after.created_at, before.created_at);

        let stored = client
            .from(Table::Profiles)
            .select("*")
            .await
            .decode::<Profile>()
            .data
            .unwrap();
        assert_eq!(stored, vec![after]);
    }
}

#[tokio::test]
async fn update_by_unknown_patch_id_is_not_found() {
    for client in clients().await {
        let resp = client
            .from(Table::Profiles)
            .insert(json!({ "id": "u1", "username": "nikola" }))
            .await;
        assert!(resp.is_ok());

        let resp = client
            .from(Table::Profiles)
            .update(json!({ "id": "missing", "username": "ghost" }))
            .await;
        assert!(resp.data.is_none());
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::NotFound);

        let rows = client.from(Table::Profiles).select("*").await.data.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("username"), Some(&json!("nikola")));
    }
}

#[tokio::test]
async fn update_without_target_is_invalid() {
    for client in clients().await {
        let resp = client
            .from(Table::Profiles)
            .update(json!({ "username": "ghost" }))
            .await;
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::InvalidRequest);
    }
}

// ===========================================================================
// delete
// ===========================================================================

#[tokio::test]
async fn delete_is_scoped_by_filters() {
    for client in clients().await {
        let rows = [("p1", "u1"), ("p1", "u2"), ("p2", "u1")]
            .map(|(post, user)| json!({ "post_id": post, "user_id": user }));
        assert!(client.from(Table::Likes).insert_many(rows).await.is_ok());

        let resp = client.from(Table::Likes).delete().eq("post_id", "p1").await;
        assert!(resp.is_ok());

        let left = client.from(Table::Likes).select("*").await.data.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].get("post_id"), Some(&json!("p2")));

        let other = client.from(Table::Posts).select("*").await.data.unwrap();
        assert!(other.is_empty());
    }
}

#[tokio::test]
async fn delete_without_filters_clears_table() {
    for client in clients().await {
        let rows = (0..3).map(|i| json!({ "user_id": "u1", "content": format!("n{i}") }));
        assert!(client.from(Table::Notifications).insert_many(rows).await.is_ok());
        let kept = client
            .from(Table::Messages)
            .insert(json!({ "sender_id": "a", "receiver_id": "b" }))
            .await;
        assert!(kept.is_ok());

        assert!(client.from(Table::Notifications).delete().await.is_ok());

        let cleared = client.from(Table::Notifications).select("*").await.data.unwrap();
        assert!(cleared.is_empty());
        let messages = client.from(Table::Messages).select("*").await.data.unwrap();
        assert_eq!(messages.len(), 1);
    }
}
