//! Region lookup backed by MaxMind GeoLite2/GeoIP2 MMDB files
//!
//! Records are rendered in the same `country|district|province|city|isp`
//! shape the ip2region database uses, with Chinese names where the database
//! carries them.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use super::{RegionError, RegionIndex, CHINA, OUTLYING_PROVINCES};

/// Placeholder ip2region uses for unknown fields
const UNKNOWN: &str = "0";

/// MaxMind region index using a City database and an optional ASN database
#[derive(Clone)]
pub struct MaxMindIndex {
    city_reader: Arc<Reader<Mmap>>,
    asn_reader: Option<Arc<Reader<Mmap>>>,
}

impl MaxMindIndex {
    /// Memory-map the City database and, when given, the ASN database
    pub fn new(city_path: &str, asn_path: Option<&str>) -> Result<Self> {
        let city_reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;

        let asn_reader = if let Some(path) = asn_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP ASN database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self {
            city_reader: Arc::new(city_reader),
            asn_reader,
        })
    }

    fn isp(&self, ip: IpAddr) -> Option<String> {
        let reader = self.asn_reader.as_ref()?;
        let result = reader.lookup(ip).ok()?;
        let asn = result.decode::<geoip2::Asn>().ok()??;
        asn.autonomous_system_organization.map(|s| s.to_string())
    }
}

impl RegionIndex for MaxMindIndex {
    fn lookup(&self, ip: &str) -> Result<Option<String>, RegionError> {
        let addr = ip
            .parse::<IpAddr>()
            .map_err(|_| RegionError::InvalidIp(ip.to_string()))?;

        let result = self.city_reader.lookup(addr)?;
        let Some(city) = result.decode::<geoip2::City>()? else {
            return Ok(None);
        };

        let country_code = city.country.iso_code;
        let country = localized(&city.country.names);
        let mut province = city
            .subdivisions
            .first()
            .and_then(|s| localized(&s.names));
        let city_name = localized(&city.city.names);

        let country = match country_code {
            Some("CN") => Some(CHINA.to_string()),
            Some(code) => match outlying_province(code) {
                // ip2region files these under China with the region as province
                Some(name) => {
                    province = Some(name.to_string());
                    Some(CHINA.to_string())
                }
                None => country,
            },
            None => country,
        };

        if country.is_none() {
            return Ok(None);
        }

        let isp = self.isp(addr);
        Ok(Some(render_record(
            country.as_deref(),
            province.as_deref(),
            city_name.as_deref(),
            isp.as_deref(),
        )))
    }
}

/// Province name for Hong Kong, Macau and Taiwan by ISO code
fn outlying_province(code: &str) -> Option<&'static str> {
    let index = match code {
        "HK" => 0,
        "MO" => 1,
        "TW" => 2,
        _ => return None,
    };
    Some(OUTLYING_PROVINCES[index])
}

fn localized(names: &geoip2::Names) -> Option<String> {
    names
        .simplified_chinese
        .or(names.english)
        .map(|s| s.to_string())
}

/// Render the five-field record, district is never known
fn render_record(
    country: Option<&str>,
    province: Option<&str>,
    city: Option<&str>,
    isp: Option<&str>,
) -> String {
    [country, None, province, city, isp]
        .into_iter()
        .map(|field| field.filter(|s| !s.is_empty()).unwrap_or(UNKNOWN))
        .collect::<Vec<_>>()
        .join("|")
}
