use serde::{Deserialize, Serialize};

/// Number of `|`-separated fields in a region record
pub const REGION_FIELD_COUNT: usize = 5;

/// Geographic and ISP attribution of an IP address
///
/// Every field is empty when the address could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub country: String,
    pub district: String,
    pub province: String,
    pub city: String,
    pub isp: String,
}

impl Region {
    /// Parse a `country|district|province|city|isp` record.
    ///
    /// Returns `None` unless the record has exactly five fields.
    pub fn from_record(record: &str) -> Option<Self> {
        let fields: Vec<&str> = record.split('|').collect();
        if fields.len() != REGION_FIELD_COUNT {
            return None;
        }

        Some(Self {
            country: fields[0].to_string(),
            district: fields[1].to_string(),
            province: fields[2].to_string(),
            city: fields[3].to_string(),
            isp: fields[4].to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_empty()
            && self.district.is_empty()
            && self.province.is_empty()
            && self.city.is_empty()
            && self.isp.is_empty()
    }
}
