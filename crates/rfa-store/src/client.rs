//! Composition root
//!
//! A [`Client`] wraps exactly one [`Backend`], picked when it is built. Every
//! facade it hands out (`auth`, `from`, `storage`) shares that backend.

use std::sync::Arc;

use tracing::info;

use crate::auth::Auth;
use crate::backend::Backend;
use crate::config::{BackendKind, ClientConfig};
use crate::local::LocalBackend;
use crate::models::TableRow;
use crate::query::TableQuery;
use crate::remote::RemoteBackend;
use crate::storage::Storage;
use crate::table::Table;
use crate::DbResult;

#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Client over a fresh, empty in-memory backend.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalBackend::new()))
    }

    pub fn remote(backend: RemoteBackend) -> Self {
        Self::new(Arc::new(backend))
    }

    /// Build the backend described by `config`. Only the remote variant
    /// touches the network.
    pub async fn connect(config: ClientConfig) -> DbResult<Self> {
        let client = match config.backend {
            BackendKind::Local(local) => Self::new(Arc::new(LocalBackend::with_config(local))),
            BackendKind::Remote(remote) => Self::remote(RemoteBackend::connect(remote).await?),
        };
        info!(backend = client.backend_name(), "client ready");
        Ok(client)
    }

    pub fn auth(&self) -> Auth {
        Auth::new(self.backend.clone())
    }

    pub fn from(&self, table: Table) -> TableQuery {
        TableQuery::new(self.backend.clone(), table)
    }

    /// `from` keyed by a row type, e.g. `client.table::<Profile>()`.
    pub fn table<T: TableRow>(&self) -> TableQuery {
        self.from(T::TABLE)
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.backend.clone())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend.name())
            .finish()
    }
}
