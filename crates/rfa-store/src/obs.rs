//! Structured lifecycle events for table mutations, auth and storage.
//!
//! Events are emitted at `info!` with an `event` field so they can be filtered
//! (`RUST_LOG=rfa_store=info`) or shipped as JSON by the host's subscriber.

use tracing::info;

use crate::auth::AuthChangeEvent;
use crate::table::Table;

/// Emit event: records inserted into a table.
pub fn emit_inserted(backend: &str, table: Table, count: usize) {
    info!(event = "table.inserted", backend, table = %table, count);
}

/// Emit event: a record updated in place.
pub fn emit_updated(backend: &str, table: Table, id: &str) {
    info!(event = "table.updated", backend, table = %table, id = %id);
}

/// Emit event: records deleted, `scoped` is false for a table-wide clear.
pub fn emit_deleted(backend: &str, table: Table, count: usize, scoped: bool) {
    info!(event = "table.deleted", backend, table = %table, count, scoped);
}

/// Emit event: auth session transition.
pub fn emit_auth_transition(kind: AuthChangeEvent, user_id: Option<&str>) {
    info!(event = "auth.transition", kind = ?kind, user_id = user_id.unwrap_or("-"));
}

/// Emit event: blob stored under `bucket/path`.
pub fn emit_uploaded(backend: &str, key: &str, size: usize) {
    info!(event = "storage.uploaded", backend, key = %key, size);
}
