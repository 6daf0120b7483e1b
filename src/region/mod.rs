//! IP to region resolution
//!
//! A [`RegionIndex`] is a read-only point lookup from an IP string to a
//! `country|district|province|city|isp` record. Two index formats are
//! supported: ip2region `xdb` files and MaxMind `mmdb` files. The
//! [`RegionResolver`] turns lookups into [`Region`] values and
//! [`classify`] decides whether a region counts as (inland) China.

pub mod classify;
pub mod mmdb;
pub mod resolver;
pub mod xdb;

use anyhow::{Context, Result};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{RegionConfig, RegionDbKind};

pub use crate::models::Region;
pub use classify::{classify, Classification, CHINA, OUTLYING_PROVINCES};
pub use mmdb::MaxMindIndex;
pub use resolver::RegionResolver;
pub use xdb::XdbSearcher;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("invalid ip address: {0}")]
    InvalidIp(String),
    #[error("corrupt region database: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    MaxMind(#[from] maxminddb::MaxMindDbError),
}

/// Point lookup from an IP string to a pipe-delimited region record.
///
/// Implementations are loaded once and never mutated afterwards, so lookups
/// may run concurrently from any request task.
pub trait RegionIndex: Send + Sync {
    /// Look up a single IP. `Ok(None)` means the index has no record for it.
    fn lookup(&self, ip: &str) -> Result<Option<String>, RegionError>;
}

/// Open the region database described by the configuration
pub fn open_index(config: &RegionConfig) -> Result<Arc<dyn RegionIndex>> {
    let index: Arc<dyn RegionIndex> = match config.kind {
        RegionDbKind::Xdb => {
            let searcher = XdbSearcher::open(&config.path)
                .with_context(|| format!("Failed to load xdb region database at {}", config.path))?;
            info!(path = %config.path, "Loaded ip2region xdb database");
            Arc::new(searcher)
        }
        RegionDbKind::Mmdb => {
            let index = MaxMindIndex::new(&config.path, config.asn_path.as_deref())?;
            info!(
                path = %config.path,
                asn_path = config.asn_path.as_deref().unwrap_or("-"),
                "Loaded MaxMind region database"
            );
            Arc::new(index)
        }
    };

    Ok(index)
}
