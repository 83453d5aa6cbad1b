//! SurrealDB-backed backend
//!
//! `RemoteBackend` forwards every operation to a SurrealDB connection chosen
//! by [`RemoteConfig`] (`mem://` in tests, `ws://` or `wss://` in deployment).
//! Filters, ordering and projection are evaluated by [`Query::apply`] over the
//! rows read back, so both backends agree on their semantics; only id lookups
//! go straight to the record key. The signed-in session is held client-side
//! in the [`SessionChannel`].

mod schema;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::auth::{credential_digest, Credentials, Session, SessionChannel, SignUp};
use crate::backend::{AuthBackend, Backend, StorageBackend, TableBackend};
use crate::config::RemoteConfig;
use crate::error::DbError;
use crate::obs;
use crate::query::{Query, UpdateTarget};
use crate::record::{timestamp_now, Record, Row, ID};
use crate::storage::{decode_data_url, encode_data_url, BlobKey};
use crate::table::Table;
use crate::DbResult;

use schema::{AccountRow, BlobRow, DocRow, ACCOUNTS, BLOBS};

const NAME: &str = "remote";
const PUBLIC_PATH: &str = "storage/v1/object/public";

pub struct RemoteBackend {
    db: Surreal<Any>,
    channel: SessionChannel,
    config: RemoteConfig,
    clock: AtomicI64,
}

impl RemoteBackend {
    /// Connect, authenticate if credentials are configured, select the
    /// namespace and database, then initialize the schema.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: RemoteConfig) -> DbResult<Self> {
        info!("Connecting to SurrealDB (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                DbError::BackendFailure(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            if config.is_root {
                db.signin(Root { username, password })
                    .await
                    .map_err(|e| {
                        DbError::BackendFailure(format!("Root authentication failed: {}", e))
                    })?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username,
                    password,
                })
                .await
                .map_err(|e| {
                    DbError::BackendFailure(format!("Database authentication failed: {}", e))
                })?;
            }
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                DbError::BackendFailure(format!("Failed to select namespace/database: {}", e))
            })?;

        schema::init_schema(&db).await?;

        info!("SurrealDB connected and schema initialized");
        Ok(Self {
            db,
            channel: SessionChannel::new(None),
            config,
            clock: AtomicI64::new(0),
        })
    }

    /// Fresh in-process database.
    pub async fn in_memory() -> DbResult<Self> {
        Self::connect(RemoteConfig::in_memory()).await
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Strictly increasing insertion sequence, seeded from the wall clock.
    fn next_seq(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut last = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn url_prefix(&self) -> String {
        format!("{}/{}/", self.config.public_url, PUBLIC_PATH)
    }

    async fn read_table(&self, table: Table) -> DbResult<Vec<Record>> {
        let mut result = self
            .db
            .query("SELECT doc, seq FROM type::table($tb) ORDER BY seq ASC")
            .bind(("tb", table.as_str()))
            .await?;
        let rows: Vec<DocRow> = result.take(0)?;
        rows.into_iter().map(decode_doc).collect()
    }

    async fn read_one(&self, table: Table, id: &str) -> DbResult<Option<Record>> {
        let mut result = self
            .db
            .query("SELECT doc, seq FROM type::thing($tb, $id)")
            .bind(("tb", table.as_str()))
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<DocRow> = result.take(0)?;
        rows.into_iter().next().map(decode_doc).transpose()
    }

    async fn read_blob(&self, key: &BlobKey) -> DbResult<Option<BlobRow>> {
        let mut result = self
            .db
            .query("SELECT key, content_type, data, size FROM type::thing($tb, $key)")
            .bind(("tb", BLOBS))
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<BlobRow> = result.take(0)?;
        Ok(rows.into_iter().next())
    }
}

fn decode_doc(row: DocRow) -> DbResult<Record> {
    let value: serde_json::Value = serde_json::from_str(&row.doc)
        .map_err(|e| DbError::BackendFailure(format!("corrupt stored document: {e}")))?;
    Record::from_stored(value)
}

fn encode_doc(record: &Record) -> DbResult<String> {
    serde_json::to_string(record)
        .map_err(|e| DbError::BackendFailure(format!("failed to encode document: {e}")))
}

#[async_trait]
impl AuthBackend for RemoteBackend {
    async fn get_session(&self) -> DbResult<Option<Session>> {
        Ok(self.channel.current())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: SignUp) -> DbResult<Session> {
        let account = AccountRow {
            account_id: uuid::Uuid::new_v4().to_string(),
            email: request.email.clone(),
            password_digest: credential_digest(&request.email, &request.password),
            created_at: timestamp_now(),
        };

        // The unique email index rejects a second account for the same address.
        self.db
            .query("CREATE type::thing($tb, $id) CONTENT $account RETURN NONE")
            .bind(("tb", ACCOUNTS))
            .bind(("id", account.account_id.clone()))
            .bind(("account", account.clone()))
            .await?
            .check()?;

        if let Some(mut seed) = request.profile_seed {
            seed.insert(ID.to_string(), account.account_id.clone().into());
            if !seed.contains_key("username") {
                let username = account.email.split('@').next().unwrap_or("user");
                seed.insert("username".to_string(), username.into());
            }
            TableBackend::insert(self, Table::Profiles, vec![seed]).await?;
        }

        let session = Session {
            id: account.account_id,
            email: account.email,
            created_at: account.created_at,
        };
        debug!(user_id = %session.id, "remote sign-up");
        self.channel.publish(Some(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in_with_password(&self, credentials: Credentials) -> DbResult<Session> {
        let mut result = self
            .db
            .query(
                "SELECT account_id, email, password_digest, created_at FROM type::table($tb) \
                 WHERE email = $email",
            )
            .bind(("tb", ACCOUNTS))
            .bind(("email", credentials.email.clone()))
            .await?;
        let accounts: Vec<AccountRow> = result.take(0)?;

        let digest = credential_digest(&credentials.email, &credentials.password);
        let account = accounts
            .into_iter()
            .find(|a| a.password_digest == digest)
            .ok_or(DbError::InvalidCredentials)?;

        let session = Session {
            id: account.account_id,
            email: account.email,
            created_at: account.created_at,
        };
        self.channel.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> DbResult<()> {
        self.channel.publish(None);
        Ok(())
    }

    fn session_channel(&self) -> &SessionChannel {
        &self.channel
    }
}

#[async_trait]
impl TableBackend for RemoteBackend {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> DbResult<Vec<Record>> {
        let candidates = match query.id_filter() {
            Some(id) => self
                .read_one(query.table, id)
                .await?
                .into_iter()
                .collect(),
            None => self.read_table(query.table).await?,
        };
        Ok(query.apply(&candidates))
    }

    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    async fn insert(&self, table: Table, rows: Vec<Row>) -> DbResult<Vec<Record>> {
        let now = timestamp_now();
        let records = rows
            .into_iter()
            .map(|row| Record::from_insert(table, row, &now))
            .collect::<DbResult<Vec<_>>>()?;

        for (i, record) in records.iter().enumerate() {
            let duplicate_in_batch = records[..i].iter().any(|r| r.id() == record.id());
            if duplicate_in_batch || self.read_one(table, record.id()).await?.is_some() {
                return Err(DbError::Conflict {
                    table,
                    id: record.id().to_string(),
                });
            }
        }

        for record in &records {
            self.db
                .query("CREATE type::thing($tb, $id) CONTENT { doc: $doc, seq: $seq } RETURN NONE")
                .bind(("tb", table.as_str()))
                .bind(("id", record.id().to_string()))
                .bind(("doc", encode_doc(record)?))
                .bind(("seq", self.next_seq()))
                .await?
                .check()?;
        }

        obs::emit_inserted(NAME, table, records.len());
        Ok(records)
    }

    #[instrument(skip(self, target), fields(table = %table, id = %target.id))]
    async fn update(&self, table: Table, target: UpdateTarget) -> DbResult<Record> {
        let current = self
            .read_one(table, &target.id)
            .await?
            .filter(|record| target.accepts(record))
            .ok_or_else(|| DbError::NotFound {
                table,
                id: target.id.clone(),
            })?;

        let merged = current.merged(target.patch, &timestamp_now());
        self.db
            .query("UPDATE type::thing($tb, $id) SET doc = $doc RETURN NONE")
            .bind(("tb", table.as_str()))
            .bind(("id", target.id.clone()))
            .bind(("doc", encode_doc(&merged)?))
            .await?
            .check()?;

        obs::emit_updated(NAME, table, &target.id);
        Ok(merged)
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn delete(&self, query: &Query) -> DbResult<usize> {
        let table = query.table;
        let scoped = !query.filters.is_empty();

        let doomed = self.read_table(table).await?;
        let removed = if scoped {
            let mut removed = 0;
            for record in doomed.iter().filter(|r| query.matches(r)) {
                self.db
                    .query("DELETE type::thing($tb, $id)")
                    .bind(("tb", table.as_str()))
                    .bind(("id", record.id().to_string()))
                    .await?
                    .check()?;
                removed += 1;
            }
            removed
        } else {
            self.db
                .query("DELETE type::table($tb)")
                .bind(("tb", table.as_str()))
                .await?
                .check()?;
            doomed.len()
        };

        obs::emit_deleted(NAME, table, removed, scoped);
        Ok(removed)
    }
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    #[instrument(skip(self, content), fields(key = %key, size = content.len()))]
    async fn upload(&self, key: &BlobKey, content: Vec<u8>, content_type: &str) -> DbResult<()> {
        let blob = BlobRow {
            key: key.to_string(),
            content_type: content_type.to_string(),
            data: encode_data_url(&content, content_type),
            size: content.len() as i64,
        };
        self.db
            .query(
                "DELETE type::thing($tb, $key);
                 CREATE type::thing($tb, $key) CONTENT $blob RETURN NONE;",
            )
            .bind(("tb", BLOBS))
            .bind(("key", blob.key.clone()))
            .bind(("blob", blob))
            .await?
            .check()?;

        obs::emit_uploaded(NAME, &key.to_string(), content.len());
        Ok(())
    }

    /// Formatted without a lookup, so a locator is returned even before the
    /// blob exists.
    fn public_url(&self, key: &BlobKey) -> String {
        format!("{}{}", self.url_prefix(), key)
    }

    async fn download(&self, key: &BlobKey) -> DbResult<Vec<u8>> {
        let blob = self
            .read_blob(key)
            .await?
            .ok_or_else(|| DbError::ObjectNotFound {
                key: key.to_string(),
            })?;
        decode_data_url(&blob.data)
    }

    async fn resolve_public_url(&self, url: &str) -> DbResult<Vec<u8>> {
        let prefix = self.url_prefix();
        let key = url
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| DbError::invalid(format!("not a public URL of this backend: {url}")))?;
        self.download(&BlobKey::parse(key)?).await
    }
}

impl Backend for RemoteBackend {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_is_strictly_increasing() {
        let backend = RemoteBackend::in_memory().await.unwrap();
        let a = backend.next_seq();
        let b = backend.next_seq();
        let c = backend.next_seq();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn public_url_is_prefixed_by_config() {
        let backend = RemoteBackend::in_memory().await.unwrap();
        let key = BlobKey::new("media", "u1/avatar.png").unwrap();
        assert_eq!(
            backend.public_url(&key),
            "memory://rfa/storage/v1/object/public/media/u1/avatar.png"
        );
    }

    #[tokio::test]
    async fn resolve_rejects_foreign_urls() {
        let backend = RemoteBackend::in_memory().await.unwrap();
        let err = backend
            .resolve_public_url("https://elsewhere.example/a.png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let backend = RemoteBackend::in_memory().await.unwrap();
        schema::init_schema(&backend.db).await.unwrap();
    }
}
