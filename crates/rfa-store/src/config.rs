//! Backend selection and connection settings
//!
//! Everything is read from the environment at the composition root; nothing
//! in the crate consults a global flag after that.

use anyhow::{bail, Context};

/// Settings for the in-memory backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalConfig {
    /// Check the password digest on sign-in, not just the email.
    pub verify_passwords: bool,
    /// Load the development accounts, profiles and welcome post.
    pub seed_demo_data: bool,
}

impl LocalConfig {
    /// Reads:
    /// - RFA_LOCAL_VERIFY_PASSWORDS (optional, default: "false")
    /// - RFA_LOCAL_SEED (optional, default: "false")
    pub fn from_env() -> Self {
        Self {
            verify_passwords: env_flag("RFA_LOCAL_VERIFY_PASSWORDS"),
            seed_demo_data: env_flag("RFA_LOCAL_SEED"),
        }
    }
}

/// Connection settings for the SurrealDB collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Endpoint URL (`mem://`, `ws://host:8000`, `wss://xxx.surrealdb.cloud`)
    pub endpoint: String,
    /// Credentials; `None` skips sign-in (embedded or unauthenticated servers)
    pub username: Option<String>,
    pub password: Option<String>,
    /// Namespace (default: "rfa")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether the credentials belong to a root user
    pub is_root: bool,
    /// Prefix of public storage locators
    pub public_url: String,
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            public_url: endpoint.trim_end_matches('/').to_string(),
            endpoint,
            username: None,
            password: None,
            namespace: "rfa".to_string(),
            database: "main".to_string(),
            is_root: false,
        }
    }

    /// In-process SurrealDB, used by tests.
    pub fn in_memory() -> Self {
        Self::new("mem://").with_public_url("memory://rfa")
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT, else SURREALDB_URL, else `mem://`
    /// - SURREALDB_USERNAME / SURREALDB_PASSWORD (optional, both or neither)
    /// - SURREALDB_NAMESPACE (optional, default: "rfa")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    /// - RFA_PUBLIC_URL (optional, default: the endpoint)
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint = std::env::var("SURREALDB_ENDPOINT")
            .or_else(|_| std::env::var("SURREALDB_URL"))
            .unwrap_or_else(|_| "mem://".to_string());
        let mut config = Self::new(endpoint);

        match (
            std::env::var("SURREALDB_USERNAME").ok(),
            std::env::var("SURREALDB_PASSWORD").ok(),
        ) {
            (Some(user), Some(pass)) => config = config.with_credentials(user, pass),
            (None, None) => {}
            _ => bail!("SURREALDB_USERNAME and SURREALDB_PASSWORD must be set together"),
        }
        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            config.database = db;
        }
        config.is_root = env_flag("SURREALDB_ROOT");
        if let Ok(url) = std::env::var("RFA_PUBLIC_URL") {
            config = config.with_public_url(url);
        }
        Ok(config)
    }
}

/// Which backend the composition root wires in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Local(LocalConfig),
    Remote(RemoteConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend: BackendKind,
}

impl ClientConfig {
    pub fn local() -> Self {
        Self {
            backend: BackendKind::Local(LocalConfig::default()),
        }
    }

    pub fn remote(config: RemoteConfig) -> Self {
        Self {
            backend: BackendKind::Remote(config),
        }
    }

    /// RFA_BACKEND = "local" (default) | "remote"
    pub fn from_env() -> anyhow::Result<Self> {
        let kind = std::env::var("RFA_BACKEND").unwrap_or_else(|_| "local".to_string());
        let backend = match kind.to_ascii_lowercase().as_str() {
            "local" => BackendKind::Local(LocalConfig::from_env()),
            "remote" => BackendKind::Remote(
                RemoteConfig::from_env().context("invalid remote backend configuration")?,
            ),
            other => bail!("RFA_BACKEND must be `local` or `remote`, got `{other}`"),
        };
        Ok(Self { backend })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
