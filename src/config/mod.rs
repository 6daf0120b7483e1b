use anyhow::{bail, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line flags. Each one is overridden by its environment variable
/// when that variable is set and non-empty.
#[derive(Debug, Clone, Parser)]
#[command(name = "ezinstall")]
#[command(about = "Attributes app opens to a region and records them once per day", long_about = None)]
pub struct Cli {
    /// Listen port (PORT)
    #[arg(short = 'p', long, default_value = "8080")]
    pub port: String,

    /// Listen address (HOST)
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Store connection URI: mongodb://, sqlite: or postgres:// (MONGO_URI)
    #[arg(short = 'm', long = "mongo-uri", default_value = "mongodb://localhost:27017")]
    pub store_uri: String,

    /// Store database name, MongoDB only (MONGO_DB)
    #[arg(short = 'd', long = "mongo-db", default_value = "ezinstall")]
    pub store_database: String,

    /// Store collection or table name (MONGO_COL)
    #[arg(short = 'c', long = "mongo-col", default_value = "open_record")]
    pub store_collection: String,

    /// Store backend, inferred from the URI when omitted (STORE_BACKEND)
    #[arg(long)]
    pub store_backend: Option<String>,

    /// Connection pool size for SQL backends (STORE_MAX_CONNECTIONS)
    #[arg(long, default_value = "5")]
    pub max_connections: String,

    /// Region database file (REGION_DB_PATH)
    #[arg(short = 'r', long = "region-db", default_value = "ip2region.xdb")]
    pub region_db: String,

    /// Region database format: xdb or mmdb (REGION_DB_KIND)
    #[arg(long)]
    pub region_db_kind: Option<String>,

    /// MaxMind ASN database used for the ISP field (REGION_ASN_DB_PATH)
    #[arg(long = "asn-db")]
    pub asn_db: Option<String>,

    /// Take the client IP from X-Real-IP / X-Forwarded-For (TRUST_PROXY_HEADERS)
    #[arg(long, default_value = "true")]
    pub trust_proxy_headers: String,

    /// Dedup window for open events in seconds (DEDUP_WINDOW_SECS)
    #[arg(long, default_value = "86400")]
    pub dedup_window_secs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub region: RegionConfig,
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Sqlite,
    Postgres,
}

impl StoreBackend {
    /// Infer the backend from the connection URI scheme
    pub fn from_uri(uri: &str) -> Option<Self> {
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Some(Self::Mongo)
        } else if uri.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else {
            None
        }
    }

    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("Unknown STORE_BACKEND '{other}'. Supported values: mongodb, sqlite, postgres"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub kind: RegionDbKind,
    pub path: String,
    #[serde(default)]
    pub asn_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionDbKind {
    Xdb,
    Mmdb,
}

impl RegionDbKind {
    /// `.mmdb` files are MaxMind databases, everything else is read as xdb
    pub fn from_path(path: &str) -> Self {
        if path.to_lowercase().ends_with(".mmdb") {
            Self::Mmdb
        } else {
            Self::Xdb
        }
    }

    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.to_lowercase().as_str() {
            "xdb" | "ip2region" => Ok(Self::Xdb),
            "mmdb" | "maxmind" => Ok(Self::Mmdb),
            other => bail!("Unknown REGION_DB_KIND '{other}'. Supported values: xdb, mmdb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "RecorderConfig::default_window_secs")]
    pub dedup_window_secs: i64,
}

impl RecorderConfig {
    pub const fn default_window_secs() -> i64 {
        24 * 60 * 60
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: Self::default_window_secs(),
        }
    }
}

/// Environment value if set and non-empty, otherwise the flag value
fn env_or(key: &str, flag: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(flag)
}

fn env_or_opt(key: &str, flag: Option<String>) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).or(flag)
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("{key} must be a boolean, got '{other}'"),
    }
}

impl Config {
    /// Build the configuration from flags, `.env` and the environment
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port = env_or("PORT", cli.port)
            .parse::<u16>()
            .context("PORT must be a valid port number")?;
        let host = env_or("HOST", cli.host);
        let trust_proxy_headers = parse_bool(
            "TRUST_PROXY_HEADERS",
            &env_or("TRUST_PROXY_HEADERS", cli.trust_proxy_headers),
        )?;

        let uri = env_or("MONGO_URI", cli.store_uri);
        let backend = match env_or_opt("STORE_BACKEND", cli.store_backend) {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::from_uri(&uri).with_context(|| {
                format!("Cannot infer store backend from URI '{uri}', set STORE_BACKEND")
            })?,
        };
        let max_connections = env_or("STORE_MAX_CONNECTIONS", cli.max_connections)
            .parse::<u32>()
            .context("STORE_MAX_CONNECTIONS must be a positive integer")?;

        let region_path = env_or("REGION_DB_PATH", cli.region_db);
        let region_kind = match env_or_opt("REGION_DB_KIND", cli.region_db_kind) {
            Some(value) => RegionDbKind::parse(&value)?,
            None => RegionDbKind::from_path(&region_path),
        };
        let asn_path = env_or_opt("REGION_ASN_DB_PATH", cli.asn_db);
        if asn_path.is_some() && region_kind == RegionDbKind::Xdb {
            tracing::warn!("REGION_ASN_DB_PATH is only used with mmdb region databases, ignoring");
        }

        let dedup_window_secs = env_or("DEDUP_WINDOW_SECS", cli.dedup_window_secs)
            .parse::<i64>()
            .context("DEDUP_WINDOW_SECS must be an integer")?;
        if dedup_window_secs <= 0 {
            bail!("DEDUP_WINDOW_SECS must be positive");
        }

        Ok(Config {
            server: ServerConfig {
                host,
                port,
                trust_proxy_headers,
            },
            store: StoreConfig {
                backend,
                uri,
                database: env_or("MONGO_DB", cli.store_database),
                collection: env_or("MONGO_COL", cli.store_collection),
                max_connections,
            },
            region: RegionConfig {
                kind: region_kind,
                path: region_path,
                asn_path,
            },
            recorder: RecorderConfig { dedup_window_secs },
        })
    }
}
