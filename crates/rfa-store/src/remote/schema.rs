//! SurrealDB schema for the remote backend
//!
//! Every data table stores one row per record:
//! ```text
//! TABLE <table> {
//!   id:   record id (the record's own `id`)
//!   doc:  STRING (the record as JSON text)
//!   seq:  INT (insertion order, nanoseconds since epoch)
//! }
//! ```
//! Documents are kept as JSON text so `null` fields survive the round trip
//! unchanged.

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::table::Table;
use crate::DbResult;

pub(crate) const ACCOUNTS: &str = "accounts";
pub(crate) const BLOBS: &str = "blobs";

/// Stored shape of a table record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DocRow {
    pub doc: String,
    pub seq: i64,
}

/// Stored shape of an account. `account_id` mirrors the record key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AccountRow {
    pub account_id: String,
    pub email: String,
    pub password_digest: String,
    pub created_at: String,
}

/// Stored shape of a blob; `data` is the base64 data URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BlobRow {
    pub key: String,
    pub content_type: String,
    pub data: String,
    pub size: i64,
}

/// Idempotent; safe to run on every connect.
pub(crate) async fn init_schema(db: &Surreal<Any>) -> DbResult<()> {
    for table in Table::ALL {
        init_data_table(db, table).await?;
    }
    init_accounts_table(db).await?;
    init_blobs_table(db).await?;
    info!("remote schema initialized");
    Ok(())
}

async fn init_data_table(db: &Surreal<Any>, table: Table) -> DbResult<()> {
    debug!(table = %table, "initializing data table");
    let name = table.as_str();
    let sql = format!(
        "DEFINE TABLE IF NOT EXISTS {name} SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS idx_{name}_seq ON TABLE {name} COLUMNS seq;"
    );
    db.query(sql).await?.check()?;
    Ok(())
}

async fn init_accounts_table(db: &Surreal<Any>) -> DbResult<()> {
    debug!("initializing accounts table");
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS accounts SCHEMALESS;

        -- One account per email
        DEFINE INDEX IF NOT EXISTS idx_account_email ON TABLE accounts COLUMNS email UNIQUE;
    "#;
    db.query(sql).await?.check()?;
    Ok(())
}

async fn init_blobs_table(db: &Surreal<Any>) -> DbResult<()> {
    debug!("initializing blobs table");
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS blobs SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_blob_key ON TABLE blobs COLUMNS key UNIQUE;
    "#;
    db.query(sql).await?.check()?;
    Ok(())
}
