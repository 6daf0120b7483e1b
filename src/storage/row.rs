use sqlx::FromRow;

use crate::models::{NewOpenEvent, OpenEvent, Region};

/// Flattened row layout shared by the SQL backends
#[derive(Debug, Clone, FromRow)]
pub struct OpenEventRow {
    pub id: i64,
    pub channel_id: String,
    pub app_name: String,
    pub ip: String,
    pub country: String,
    pub district: String,
    pub province: String,
    pub city: String,
    pub isp: String,
    pub origin: String,
    pub is_country_china: bool,
    pub is_china_inland: bool,
    pub created_at: i64,
}

pub const SELECT_COLUMNS: &str = "id, channel_id, app_name, ip, country, district, province, city, isp, \
     origin, is_country_china, is_china_inland, created_at";

impl From<OpenEventRow> for OpenEvent {
    fn from(row: OpenEventRow) -> Self {
        OpenEvent {
            id: row.id.to_string(),
            event: NewOpenEvent {
                channel_id: row.channel_id,
                app_name: row.app_name,
                ip: row.ip,
                region: Region {
                    country: row.country,
                    district: row.district,
                    province: row.province,
                    city: row.city,
                    isp: row.isp,
                },
                origin: row.origin,
                is_country_china: row.is_country_china,
                is_china_inland: row.is_china_inland,
                created_at: row.created_at,
            },
        }
    }
}
