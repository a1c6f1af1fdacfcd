//! Storage backend selection.

use crate::memory::MemoryDocStore;
use crate::postgres::PostgresDocStore;
use crate::traits::DocStore;
use docflow_types::FlowResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which backend a docflow deployment persists into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory storage. State is lost on restart.
    Memory,
    /// PostgreSQL storage.
    Postgres {
        database_url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Build the configured store.
pub async fn bootstrap(config: StoreConfig) -> FlowResult<Arc<dyn DocStore>> {
    tracing::info!(backend = config.label(), "Initializing docflow storage");
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryDocStore::new())),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store =
                PostgresDocStore::connect_with_options(&database_url, max_connections, 5).await?;
            Ok(Arc::new(store))
        }
    }
}
