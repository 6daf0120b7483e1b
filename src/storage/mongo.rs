use crate::models::{EventId, NewOpenEvent, OpenEvent, Region};
use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, Timestamp};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

/// Document layout of the open event collection.
///
/// `created_at` is a BSON timestamp (seconds in `time`, `increment` 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenEventDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    channel_id: String,
    app_name: String,
    ip: String,
    region: Region,
    origin: String,
    is_country_china: bool,
    is_china_inland: bool,
    created_at: Timestamp,
}

impl From<&NewOpenEvent> for OpenEventDocument {
    fn from(event: &NewOpenEvent) -> Self {
        Self {
            id: None,
            channel_id: event.channel_id.clone(),
            app_name: event.app_name.clone(),
            ip: event.ip.clone(),
            region: event.region.clone(),
            origin: event.origin.clone(),
            is_country_china: event.is_country_china,
            is_china_inland: event.is_china_inland,
            created_at: to_timestamp(event.created_at),
        }
    }
}

impl From<OpenEventDocument> for OpenEvent {
    fn from(doc: OpenEventDocument) -> Self {
        OpenEvent {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            event: NewOpenEvent {
                channel_id: doc.channel_id,
                app_name: doc.app_name,
                ip: doc.ip,
                region: doc.region,
                origin: doc.origin,
                is_country_china: doc.is_country_china,
                is_china_inland: doc.is_china_inland,
                created_at: i64::from(doc.created_at.time),
            },
        }
    }
}

/// BSON timestamps hold unsigned 32-bit seconds
fn to_timestamp(secs: i64) -> Timestamp {
    Timestamp {
        time: secs.clamp(0, i64::from(u32::MAX)) as u32,
        increment: 0,
    }
}

pub struct MongoStorage {
    collection: Collection<OpenEventDocument>,
}

impl MongoStorage {
    /// Connect and ping; an unreachable server is an error
    pub async fn new(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("Failed to create MongoDB client")?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("Failed to ping MongoDB")?;

        Ok(Self {
            collection: db.collection(collection),
        })
    }
}

#[async_trait]
impl Storage for MongoStorage {
    async fn init(&self) -> Result<()> {
        let indexes = [
            doc! { "app_name": 1, "ip": 1 },
            doc! { "channel_id": 1, "app_name": 1 },
            doc! { "created_at": -1 },
        ];

        for keys in indexes {
            self.collection
                .create_index(IndexModel::builder().keys(keys).build())
                .await
                .context("Failed to create MongoDB index")?;
        }

        Ok(())
    }

    async fn count_since(&self, app_name: &str, ip: &str, since: i64) -> Result<u64> {
        let count = self
            .collection
            .count_documents(doc! {
                "app_name": app_name,
                "ip": ip,
                "created_at": { "$gte": to_timestamp(since) },
            })
            .await?;

        Ok(count)
    }

    async fn insert(&self, event: &NewOpenEvent) -> Result<EventId> {
        let result = self
            .collection
            .insert_one(OpenEventDocument::from(event))
            .await?;

        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        Ok(id)
    }

    async fn latest(&self, app_name: &str, ip: &str) -> Result<Option<OpenEvent>> {
        let doc = self
            .collection
            .find_one(doc! { "app_name": app_name, "ip": ip })
            .sort(doc! { "created_at": -1 })
            .await?;

        Ok(doc.map(OpenEvent::from))
    }
}
