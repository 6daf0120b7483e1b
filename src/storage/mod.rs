pub mod mongo;
pub mod postgres;
mod row;
pub mod sqlite;
pub mod trait_def;

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

pub use mongo::MongoStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::Storage;

/// Connect to the configured backend and create the schema and indexes
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        StoreBackend::Mongo => {
            info!(
                "Using MongoDB storage: {}/{}",
                config.database, config.collection
            );
            Arc::new(MongoStorage::new(&config.uri, &config.database, &config.collection).await?)
        }
        StoreBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.uri);
            Arc::new(
                SqliteStorage::new(&config.uri, config.max_connections, &config.collection)
                    .await?,
            )
        }
        StoreBackend::Postgres => {
            info!("Using PostgreSQL storage, table {}", config.collection);
            Arc::new(
                PostgresStorage::new(&config.uri, config.max_connections, &config.collection)
                    .await?,
            )
        }
    };

    info!("Initializing storage...");
    storage.init().await?;
    info!("Storage initialized successfully");

    Ok(storage)
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn checked_table_name(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if !valid {
        bail!("Invalid table name '{name}': use letters, digits and underscores only");
    }
    Ok(name)
}
