//! In-memory backend
//!
//! `LocalBackend` satisfies every backend trait against a [`StateStore`]. All
//! operations execute synchronously inside their future and resolve without
//! suspending. Each mutation is one `try_update` call, so it is atomic with
//! respect to other mutations; separate calls are last-write-wins.

pub mod seed;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::auth::{credential_digest, Account, Credentials, Session, SessionChannel, SignUp};
use crate::backend::{AuthBackend, Backend, StorageBackend, TableBackend};
use crate::config::LocalConfig;
use crate::error::DbError;
use crate::listeners::Subscription;
use crate::obs;
use crate::query::{Query, UpdateTarget};
use crate::record::{timestamp_now, Record, Row, ID};
use crate::state::{StatePatch, StateStore};
use crate::storage::{decode_data_url, encode_data_url, BlobKey};
use crate::table::Table;
use crate::DbResult;

const NAME: &str = "local";

pub struct LocalBackend {
    store: Arc<StateStore>,
    channel: Arc<SessionChannel>,
    config: LocalConfig,
    session_feed: Option<Subscription>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::with_config(LocalConfig::default())
    }

    pub fn with_config(config: LocalConfig) -> Self {
        let store = Arc::new(StateStore::new());
        if config.seed_demo_data {
            seed::apply(&store);
        }
        Self::with_store(store, config)
    }

    /// Run against an existing store, e.g. one shared with a test harness.
    pub fn with_store(store: Arc<StateStore>, config: LocalConfig) -> Self {
        let channel = Arc::new(SessionChannel::new(store.get_state().session.clone()));

        // The store owns the session; the channel mirrors it.
        let feed = channel.clone();
        let session_feed = store.subscribe(move |change| {
            if change.previous.session != change.current.session {
                feed.publish(change.current.session.clone());
            }
        });

        Self {
            store,
            channel,
            config,
            session_feed: Some(session_feed),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        if let Some(feed) = self.session_feed.take() {
            feed.unsubscribe();
        }
    }
}

/// Default `username` for a profile seeded at sign-up: the email's local part.
fn seeded_profile(id: &str, email: &str, seed: Row, now: &str) -> DbResult<Record> {
    let mut row = seed;
    row.insert(ID.to_string(), id.into());
    if !row.contains_key("username") {
        let username = email.split('@').next().unwrap_or("user");
        row.insert("username".to_string(), username.into());
    }
    Record::from_insert(Table::Profiles, row, now)
}

#[async_trait]
impl AuthBackend for LocalBackend {
    async fn get_session(&self) -> DbResult<Option<Session>> {
        Ok(self.store.get_state().session.clone())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: SignUp) -> DbResult<Session> {
        let now = timestamp_now();
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            email: request.email.clone(),
            password_digest: credential_digest(&request.email, &request.password),
            created_at: now.clone(),
        };
        let session = account.session();

        let profile = request
            .profile_seed
            .map(|seed| seeded_profile(&account.id, &account.email, seed, &now))
            .transpose()?;

        self.store.update(|prev| {
            let mut accounts = prev.accounts.as_ref().clone();
            accounts.push(account);
            let mut patch = StatePatch::new()
                .accounts(accounts)
                .session(Some(session.clone()));
            if let Some(profile) = profile {
                let mut profiles = prev.table(Table::Profiles).to_vec();
                profiles.push(profile);
                patch = patch.table(Table::Profiles, profiles);
            }
            patch
        });

        debug!(user_id = %session.id, "local sign-up");
        Ok(session)
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in_with_password(&self, credentials: Credentials) -> DbResult<Session> {
        let verify = self.config.verify_passwords;
        self.store.try_update(|prev| {
            let digest = credential_digest(&credentials.email, &credentials.password);
            let from_accounts = prev
                .accounts
                .iter()
                .rev()
                .find(|a| a.email == credentials.email && (!verify || a.password_digest == digest))
                .map(Account::session);
            // A live session with that email also counts when passwords are not checked.
            let from_session = prev
                .session
                .as_ref()
                .filter(|s| !verify && s.email == credentials.email)
                .cloned();

            let session = from_accounts
                .or(from_session)
                .ok_or(DbError::InvalidCredentials)?;
            Ok((StatePatch::new().session(Some(session.clone())), session))
        })
    }

    async fn sign_out(&self) -> DbResult<()> {
        self.store.set_state(StatePatch::new().session(None));
        Ok(())
    }

    fn session_channel(&self) -> &SessionChannel {
        &self.channel
    }
}

#[async_trait]
impl TableBackend for LocalBackend {
    async fn select(&self, query: &Query) -> DbResult<Vec<Record>> {
        let state = self.store.get_state();
        Ok(query.apply(state.table(query.table)))
    }

    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    async fn insert(&self, table: Table, rows: Vec<Row>) -> DbResult<Vec<Record>> {
        let now = timestamp_now();
        let inserted = self.store.try_update(|prev| {
            let mut existing = prev.table(table).to_vec();
            let mut ids: HashSet<String> = existing.iter().map(|r| r.id().to_string()).collect();

            let mut inserted = Vec::with_capacity(rows.len());
            for row in rows {
                let record = Record::from_insert(table, row, &now)?;
                if !ids.insert(record.id().to_string()) {
                    return Err(DbError::Conflict {
                        table,
                        id: record.id().to_string(),
                    });
                }
                inserted.push(record);
            }
            existing.extend(inserted.iter().cloned());
            Ok::<_, DbError>((StatePatch::new().table(table, existing), inserted))
        })?;

        obs::emit_inserted(NAME, table, inserted.len());
        Ok(inserted)
    }

    #[instrument(skip(self, target), fields(table = %table, id = %target.id))]
    async fn update(&self, table: Table, target: UpdateTarget) -> DbResult<Record> {
        let now = timestamp_now();
        let id = target.id.clone();
        let updated = self.store.try_update(|prev| {
            let mut rows = prev.table(table).to_vec();
            let slot = rows
                .iter_mut()
                .find(|r| r.id() == target.id && target.accepts(r))
                .ok_or_else(|| DbError::NotFound {
                    table,
                    id: target.id.clone(),
                })?;
            let merged = slot.merged(target.patch, &now);
            *slot = merged.clone();
            Ok::<_, DbError>((StatePatch::new().table(table, rows), merged))
        })?;

        obs::emit_updated(NAME, table, &id);
        Ok(updated)
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn delete(&self, query: &Query) -> DbResult<usize> {
        let table = query.table;
        let scoped = !query.filters.is_empty();
        let removed = self.store.try_update(|prev| {
            let rows = prev.table(table);
            let kept: Vec<Record> = rows.iter().filter(|r| scoped && !query.matches(r)).cloned().collect();
            let removed = rows.len() - kept.len();
            Ok::<_, DbError>((StatePatch::new().table(table, kept), removed))
        })?;

        obs::emit_deleted(NAME, table, removed, scoped);
        Ok(removed)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    #[instrument(skip(self, content), fields(key = %key, size = content.len()))]
    async fn upload(&self, key: &BlobKey, content: Vec<u8>, content_type: &str) -> DbResult<()> {
        let encoded = encode_data_url(&content, content_type);
        self.store.update(|prev| {
            let mut blobs = prev.blobs.as_ref().clone();
            blobs.insert(key.to_string(), encoded);
            StatePatch::new().blobs(blobs)
        });
        obs::emit_uploaded(NAME, &key.to_string(), content.len());
        Ok(())
    }

    fn public_url(&self, key: &BlobKey) -> String {
        self.store
            .get_state()
            .blobs
            .get(&key.to_string())
            .cloned()
            .unwrap_or_default()
    }

    async fn download(&self, key: &BlobKey) -> DbResult<Vec<u8>> {
        let url = self.public_url(key);
        if url.is_empty() {
            return Err(DbError::ObjectNotFound {
                key: key.to_string(),
            });
        }
        decode_data_url(&url)
    }

    async fn resolve_public_url(&self, url: &str) -> DbResult<Vec<u8>> {
        decode_data_url(url)
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        NAME
    }
}
