//! Blob storage contract tests, run against both backends.

use rfa_store::{Client, ErrorKind, RemoteBackend, UploadOptions};

async fn clients() -> Vec<Client> {
    rfa_store::telemetry::init_tracing(false, tracing::Level::WARN);
    let remote = RemoteBackend::in_memory()
        .await
        .expect("embedded SurrealDB should start");
    vec![Client::local(), Client::remote(remote)]
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend((0u8..=255).rev());
    bytes
}

#[tokio::test]
async fn upload_then_resolve_public_url() {
    for client in clients().await {
        let media = client.storage().from("media");
        let content = png_bytes();

        let uploaded = media.upload("u1/avatar.png", content.as_slice()).await;
        assert!(uploaded.is_ok(), "backend {}", client.backend_name());
        assert!(uploaded.data.is_none());

        let url = media.get_public_url("u1/avatar.png").data.unwrap().public_url;
        assert!(!url.is_empty());

        let resolved = client.storage().resolve_public_url(&url).await;
        assert_eq!(resolved.data.unwrap(), content);

        let downloaded = media.download("/u1/avatar.png").await;
        assert_eq!(downloaded.data.unwrap(), content);
    }
}

#[tokio::test]
async fn upload_replaces_previous_content() {
    for client in clients().await {
        let media = client.storage().from("media");
        assert!(media.upload_bytes("u1/note.txt", b"first").await.is_ok());
        assert!(media.upload_bytes("u1/note.txt", b"second").await.is_ok());

        let bytes = media.download("u1/note.txt").await.data.unwrap();
        assert_eq!(bytes, b"second");
    }
}

#[tokio::test]
async fn buckets_are_separate_namespaces() {
    for client in clients().await {
        let storage = client.storage();
        assert!(storage.from("media").upload_bytes("a.txt", b"media").await.is_ok());
        assert!(storage.from("avatars").upload_bytes("a.txt", b"avatar").await.is_ok());

        let media = storage.from("media").download("a.txt").await.data.unwrap();
        let avatars = storage.from("avatars").download("a.txt").await.data.unwrap();
        assert_eq!(media, b"media");
        assert_eq!(avatars, b"avatar");
    }
}

#[tokio::test]
async fn download_missing_blob_is_not_found() {
    for client in clients().await {
        let resp = client.storage().from("media").download("nope.png").await;
        assert!(resp.data.is_none());
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::NotFound);
    }
}

#[tokio::test]
async fn invalid_paths_are_rejected() {
    for client in clients().await {
        let resp = client.storage().from("media").upload_bytes("", b"x").await;
        assert_eq!(resp.error.unwrap().kind(), ErrorKind::InvalidRequest);

        let resp = client.storage().from("media").get_public_url("");
        assert_eq!(resp.data.unwrap().public_url, "");
    }
}

#[tokio::test]
async fn local_locator_is_a_data_url() {
    let client = Client::local();
    let media = client.storage().from("media");

    assert_eq!(media.get_public_url("u1/avatar.png").data.unwrap().public_url, "");

    let options = UploadOptions {
        content_type: Some("image/webp".to_string()),
    };
    assert!(media
        .upload_with("u1/avatar.png", &b"webp"[..], options)
        .await
        .is_ok());
    let url = media.get_public_url("u1/avatar.png").data.unwrap().public_url;
    assert!(url.starts_with("data:image/webp;base64,"));
}

#[tokio::test]
async fn remote_locator_uses_public_prefix() {
    let client = Client::remote(RemoteBackend::in_memory().await.unwrap());
    let url = client
        .storage()
        .from("media")
        .get_public_url("u1/avatar.png")
        .data
        .unwrap()
        .public_url;
    assert_eq!(url, "memory://rfa/storage/v1/object/public/media/u1/avatar.png");

    let resp = client.storage().resolve_public_url(&url).await;
    assert_eq!(resp.error.unwrap().kind(), ErrorKind::NotFound);
}
