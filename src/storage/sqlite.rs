use crate::models::{EventId, NewOpenEvent, OpenEvent};
use crate::storage::row::{OpenEventRow, SELECT_COLUMNS};
use crate::storage::{checked_table_name, Storage};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
    table: String,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32, table: &str) -> Result<Self> {
        let table = checked_table_name(table)?.to_string();
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size(database_url, max_connections))
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            table,
        })
    }
}

/// Every connection to an in-memory database opens its own empty database,
/// so such pools are held to one connection.
fn pool_size(database_url: &str, max_connections: u32) -> u32 {
    if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        1
    } else {
        max_connections
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        let table = &self.table;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id TEXT NOT NULL,
                app_name TEXT NOT NULL,
                ip TEXT NOT NULL,
                country TEXT NOT NULL,
                district TEXT NOT NULL,
                province TEXT NOT NULL,
                city TEXT NOT NULL,
                isp TEXT NOT NULL,
                origin TEXT NOT NULL,
                is_country_china INTEGER NOT NULL,
                is_china_inland INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_app_name_ip ON {table}(app_name, ip)"
        ))
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_channel_id_app_name ON {table}(channel_id, app_name)"
        ))
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at DESC)"
        ))
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn count_since(&self, app_name: &str, ip: &str, since: i64) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT COUNT(*) FROM {}
            WHERE app_name = ? AND ip = ? AND created_at >= ?
            "#,
            self.table
        ))
        .bind(app_name)
        .bind(ip)
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count as u64)
    }

    async fn insert(&self, event: &NewOpenEvent) -> Result<EventId> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                channel_id, app_name, ip, country, district, province, city, isp,
                origin, is_country_china, is_china_inland, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.table
        ))
        .bind(&event.channel_id)
        .bind(&event.app_name)
        .bind(&event.ip)
        .bind(&event.region.country)
        .bind(&event.region.district)
        .bind(&event.region.province)
        .bind(&event.region.city)
        .bind(&event.region.isp)
        .bind(&event.origin)
        .bind(event.is_country_china)
        .bind(event.is_china_inland)
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.last_insert_rowid().to_string())
    }

    async fn latest(&self, app_name: &str, ip: &str) -> Result<Option<OpenEvent>> {
        let row = sqlx::query_as::<_, OpenEventRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM {}
            WHERE app_name = ? AND ip = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            self.table
        ))
        .bind(app_name)
        .bind(ip)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(OpenEvent::from))
    }
}
