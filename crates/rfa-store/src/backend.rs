//! Backend adapter traits
//!
//! These traits define the one interface both data sources satisfy:
//! - `AuthBackend`: sign-up / sign-in / sign-out and the session channel
//! - `TableBackend`: reads and mutations over the closed [`Table`] set
//! - `StorageBackend`: path-addressed blobs and their public locators
//!
//! All traits are async and backend-agnostic. [`crate::LocalBackend`] runs
//! against an in-process [`crate::StateStore`]; [`crate::RemoteBackend`]
//! forwards to SurrealDB. Consumers only ever see [`Backend`] through
//! [`crate::Client`].

use async_trait::async_trait;

use crate::auth::{Credentials, Session, SessionChannel, SignUp};
use crate::query::{Query, UpdateTarget};
use crate::record::{Record, Row};
use crate::storage::BlobKey;
use crate::table::Table;
use crate::DbResult;

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn get_session(&self) -> DbResult<Option<Session>>;

    async fn sign_up(&self, request: SignUp) -> DbResult<Session>;

    /// Fails with `DbError::InvalidCredentials` when no account matches.
    async fn sign_in_with_password(&self, credentials: Credentials) -> DbResult<Session>;

    async fn sign_out(&self) -> DbResult<()>;

    /// Behaviour subject the backend publishes every session change to.
    fn session_channel(&self) -> &SessionChannel;
}

/// Guarantees:
/// - `insert` assigns missing ids and stamps `created_at == updated_at`.
/// - `update` merges shallowly, never changes `id`, re-stamps `updated_at`.
/// - `select` preserves insertion order unless the query orders.
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn select(&self, query: &Query) -> DbResult<Vec<Record>>;

    async fn insert(&self, table: Table, rows: Vec<Row>) -> DbResult<Vec<Record>>;

    /// Returns `DbError::NotFound` if no record satisfies the target.
    async fn update(&self, table: Table, target: UpdateTarget) -> DbResult<Record>;

    /// Delete records matching `query.filters`; no filters clears the table.
    /// Returns how many records were removed.
    async fn delete(&self, query: &Query) -> DbResult<usize>;
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store fully-read content under `key`, replacing any previous blob.
    async fn upload(&self, key: &BlobKey, content: Vec<u8>, content_type: &str) -> DbResult<()>;

    /// Locator for `key`. Never fails; may be empty when the backend knows the
    /// key is absent.
    fn public_url(&self, key: &BlobKey) -> String;

    async fn download(&self, key: &BlobKey) -> DbResult<Vec<u8>>;

    /// Bytes behind a locator previously returned by `public_url`.
    async fn resolve_public_url(&self, url: &str) -> DbResult<Vec<u8>>;
}

/// The whole client surface. Implemented for anything that provides all three.
pub trait Backend: AuthBackend + TableBackend + StorageBackend {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}
