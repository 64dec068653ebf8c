//! Shared command context: resolved config, open store, API client.

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::debug;

use htbpanel_core::config::{self, Config};
use htbpanel_core::{Database, HtbClient, SessionReconciler};

/// Global flags that override the resolved configuration.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Catalog database file.
    #[arg(long, global = true, env = "HTBPANEL_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Lab API base URL.
    #[arg(long, global = true, env = "HTBPANEL_API_URL")]
    pub api_url: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl GlobalArgs {
    /// Apply CLI overrides, the highest-priority config layer.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(db) = &self.db {
            config.storage.database_path = Some(db.clone());
        }
        if let Some(url) = &self.api_url {
            config.api.base_url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        config
    }
}

/// Config plus the opened catalog store.
pub struct Context {
    pub config: Config,
    pub db: Database,
}

impl Context {
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let path = config.database_path()?;
        debug!(path = %path.display(), "Opening catalog");
        let db = Database::open(&path)
            .await
            .with_context(|| format!("opening catalog at {}", path.display()))?;
        Ok(Self { config, db })
    }

    /// Authenticated API client. Fails when no token is configured.
    pub fn client(&self) -> anyhow::Result<HtbClient> {
        let token = config::resolve_token(&self.config).with_context(|| {
            format!(
                "set {} or write the token to {}",
                config::TOKEN_ENV,
                self.config.api.token_file.display()
            )
        })?;
        Ok(HtbClient::new(&self.config.api, &self.config.sync, &token)?)
    }

    pub fn reconciler(&self) -> anyhow::Result<SessionReconciler<HtbClient>> {
        Ok(SessionReconciler::new(self.client()?, self.db.clone()))
    }
}
