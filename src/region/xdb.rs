//! ip2region `xdb` (v2) reader
//!
//! The whole file is held in memory. Layout:
//! - 256-byte header
//! - vector index: 256 x 256 cells of 8 bytes, keyed by the first two
//!   octets, each holding the first and last segment block pointer
//! - segment blocks of 14 bytes: start ip, end ip, data length, data pointer
//! - region strings
//!
//! All integers are little-endian. Only IPv4 is supported by the format.

use std::net::Ipv4Addr;
use std::path::Path;

use super::{RegionError, RegionIndex};

pub const HEADER_INFO_LENGTH: usize = 256;
pub const VECTOR_INDEX_ROWS: usize = 256;
pub const VECTOR_INDEX_COLS: usize = 256;
pub const VECTOR_INDEX_SIZE: usize = 8;
pub const SEGMENT_INDEX_SIZE: usize = 14;

const MIN_DB_LENGTH: usize =
    HEADER_INFO_LENGTH + VECTOR_INDEX_ROWS * VECTOR_INDEX_COLS * VECTOR_INDEX_SIZE;

/// Header fields of an `xdb` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XdbHeader {
    pub version: u16,
    pub index_policy: u16,
    pub created_at: u32,
    pub start_index_ptr: u32,
    pub end_index_ptr: u32,
}

/// In-memory ip2region searcher
pub struct XdbSearcher {
    buffer: Vec<u8>,
    header: XdbHeader,
}

impl XdbSearcher {
    /// Load an `xdb` file into memory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let buffer = std::fs::read(path)?;
        Self::from_bytes(buffer)
    }

    /// Use an already loaded `xdb` image
    pub fn from_bytes(buffer: Vec<u8>) -> Result<Self, RegionError> {
        if buffer.len() < MIN_DB_LENGTH {
            return Err(RegionError::Corrupt(format!(
                "{} bytes is shorter than header and vector index ({} bytes)",
                buffer.len(),
                MIN_DB_LENGTH
            )));
        }

        let header = XdbHeader {
            version: read_u16(&buffer, 0)?,
            index_policy: read_u16(&buffer, 2)?,
            created_at: read_u32(&buffer, 4)?,
            start_index_ptr: read_u32(&buffer, 8)?,
            end_index_ptr: read_u32(&buffer, 12)?,
        };

        Ok(Self { buffer, header })
    }

    pub fn header(&self) -> &XdbHeader {
        &self.header
    }

    /// Search by numeric IPv4 address
    pub fn search(&self, ip: Ipv4Addr) -> Result<Option<String>, RegionError> {
        let ip = u32::from(ip);
        let il0 = ((ip >> 24) & 0xFF) as usize;
        let il1 = ((ip >> 16) & 0xFF) as usize;
        let idx = il0 * VECTOR_INDEX_COLS * VECTOR_INDEX_SIZE + il1 * VECTOR_INDEX_SIZE;

        let s_ptr = read_u32(&self.buffer, HEADER_INFO_LENGTH + idx)? as usize;
        let e_ptr = read_u32(&self.buffer, HEADER_INFO_LENGTH + idx + 4)? as usize;
        if s_ptr == 0 && e_ptr == 0 {
            return Ok(None);
        }
        if e_ptr < s_ptr {
            return Err(RegionError::Corrupt(format!(
                "vector index cell {idx} ends before it starts"
            )));
        }

        let mut low: i64 = 0;
        let mut high: i64 = ((e_ptr - s_ptr) / SEGMENT_INDEX_SIZE) as i64;
        let mut data: Option<(usize, usize)> = None;

        while low <= high {
            let mid = (low + high) >> 1;
            let p = s_ptr + mid as usize * SEGMENT_INDEX_SIZE;

            let start_ip = read_u32(&self.buffer, p)?;
            if ip < start_ip {
                high = mid - 1;
                continue;
            }

            let end_ip = read_u32(&self.buffer, p + 4)?;
            if ip > end_ip {
                low = mid + 1;
                continue;
            }

            let data_len = read_u16(&self.buffer, p + 8)? as usize;
            let data_ptr = read_u32(&self.buffer, p + 10)? as usize;
            data = Some((data_ptr, data_len));
            break;
        }

        let Some((data_ptr, data_len)) = data else {
            return Ok(None);
        };
        if data_len == 0 {
            return Ok(None);
        }

        let bytes = self
            .buffer
            .get(data_ptr..data_ptr + data_len)
            .ok_or_else(|| out_of_bounds(data_ptr, data_len))?;

        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }
}

impl RegionIndex for XdbSearcher {
    fn lookup(&self, ip: &str) -> Result<Option<String>, RegionError> {
        let addr = ip
            .parse::<Ipv4Addr>()
            .map_err(|_| RegionError::InvalidIp(ip.to_string()))?;
        self.search(addr)
    }
}

fn out_of_bounds(offset: usize, len: usize) -> RegionError {
    RegionError::Corrupt(format!("read of {len} bytes at offset {offset} is out of bounds"))
}

fn read_u16(buffer: &[u8], offset: usize) -> Result<u16, RegionError> {
    let bytes = buffer
        .get(offset..offset + 2)
        .ok_or_else(|| out_of_bounds(offset, 2))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, RegionError> {
    let bytes = buffer
        .get(offset..offset + 4)
        .ok_or_else(|| out_of_bounds(offset, 4))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}


#[cfg(test)]
mod tests {
    use super::testing::build_xdb;
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn searcher() -> XdbSearcher {
        XdbSearcher::from_bytes(build_xdb(&[
            (ip("1.2.0.0"), ip("1.2.3.255"), "中国|0|福建省|福州市|电信"),
            (ip("1.2.4.0"), ip("1.2.4.255"), "中国|0|香港|0|0"),
            (ip("114.114.0.0"), ip("114.114.255.255"), "中国|0|江苏省|南京市|0"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_header() {
        let s = searcher();
        assert_eq!(s.header().version, 2);
        assert_eq!(s.header().start_index_ptr as usize, MIN_DB_LENGTH);
    }

    #[test]
    fn test_search_hits() {
        let s = searcher();
        assert_eq!(
            s.lookup("1.2.3.4").unwrap().as_deref(),
            Some("中国|0|福建省|福州市|电信")
        );
        assert_eq!(s.lookup("1.2.4.0").unwrap().as_deref(), Some("中国|0|香港|0|0"));
        assert_eq!(
            s.lookup("114.114.114.114").unwrap().as_deref(),
            Some("中国|0|江苏省|南京市|0")
        );
    }

    #[test]
    fn test_search_misses() {
        let s = searcher();
        assert_eq!(s.lookup("1.2.5.1").unwrap(), None);
        assert_eq!(s.lookup("8.8.8.8").unwrap(), None);
    }

    #[test]
    fn test_invalid_ip() {
        let s = searcher();
        assert!(matches!(s.lookup("not-an-ip"), Err(RegionError::InvalidIp(_))));
        assert!(matches!(s.lookup("::1"), Err(RegionError::InvalidIp(_))));
        assert!(matches!(s.lookup(" 1.2.3.4"), Err(RegionError::InvalidIp(_))));
    }

    #[test]
    fn test_too_short_buffer() {
        let result = XdbSearcher::from_bytes(vec![0u8; HEADER_INFO_LENGTH]);
        assert!(matches!(result, Err(RegionError::Corrupt(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let result = XdbSearcher::open("/nonexistent/ip2region.xdb");
        assert!(matches!(result, Err(RegionError::Io(_))));
    }
}
