//! rfa-store: swappable data-access client for Rocket Football Academy
//!
//! One client surface over two interchangeable data sources: an in-process
//! reactive store and a SurrealDB connection. Callers build a [`Client`] once
//! and never learn which backend answers.
//!
//! ## Key Components
//!
//! - `StateStore`: reactive container holding every table, the session and blobs
//! - `TableQuery`: fluent select / insert / update / delete, awaited into a [`Response`]
//! - `Auth`: sign-up, sign-in, sign-out and the auth-change subscription
//! - `Storage`: path-addressed blobs with public locators
//! - `LocalBackend` / `RemoteBackend`: the two [`Backend`] implementations
//!
//! ```no_run
//! use rfa_store::{Client, Credentials, Table};
//!
//! # async fn demo() {
//! let client = Client::local();
//! let _ = client.auth().sign_in_with_password(Credentials::new("coach@rfa.com", "Coach123")).await;
//! let profile = client.from(Table::Profiles).select("*").eq("id", "test-user-2").single().await;
//! # }
//! ```

pub mod auth;
pub mod backend;
mod client;
pub mod config;
mod error;
mod listeners;
pub mod local;
pub mod models;
pub mod obs;
pub mod projection;
pub mod query;
pub mod record;
pub mod remote;
mod response;
pub mod state;
pub mod storage;
mod table;
pub mod telemetry;

pub use auth::{
    Auth, AuthChangeEvent, AuthEvent, Credentials, Session, SessionChannel, SessionData, SignUp,
    UserData,
};
pub use backend::{AuthBackend, Backend, StorageBackend, TableBackend};
pub use client::Client;
pub use config::{BackendKind, ClientConfig, LocalConfig, RemoteConfig};
pub use error::{DbError, ErrorKind};
pub use listeners::Subscription;
pub use local::LocalBackend;
pub use models::{
    AppRole, Comment, Like, Message, Notification, Post, Profile, TableRow, UserRole,
};
pub use query::{Order, Query, TableQuery};
pub use record::{Record, Row};
pub use remote::RemoteBackend;
pub use response::Response;
pub use state::{StatePatch, StateStore, StoreState};
pub use storage::{BlobKey, Bucket, PublicUrl, Storage, UploadOptions};
pub use table::Table;

/// Result type for rfa-store operations
pub type DbResult<T> = std::result::Result<T, DbError>;
