use std::sync::Arc;
use tracing::debug;

use super::RegionIndex;
use crate::models::Region;

/// Resolves candidate IPs to a [`Region`] using the first record that parses
#[derive(Clone)]
pub struct RegionResolver {
    index: Arc<dyn RegionIndex>,
}

impl RegionResolver {
    pub fn new(index: Arc<dyn RegionIndex>) -> Self {
        Self { index }
    }

    /// Resolve a comma-separated list of IPs, such as an `X-Forwarded-For`
    /// chain. An empty string never touches the index.
    pub fn resolve(&self, candidates: &str) -> Region {
        if candidates.is_empty() {
            return Region::default();
        }

        self.resolve_candidates(candidates.split(','))
    }

    /// Try each candidate in order and stop at the first five-field record.
    ///
    /// Misses, lookup errors and malformed records all fall through to the
    /// next candidate. Returns an empty region when nothing resolves.
    pub fn resolve_candidates<'a, I>(&self, candidates: I) -> Region
    where
        I: IntoIterator<Item = &'a str>,
    {
        for candidate in candidates {
            let ip = candidate.trim();
            if ip.is_empty() {
                continue;
            }

            match self.index.lookup(ip) {
                Ok(Some(record)) => match Region::from_record(&record) {
                    Some(region) => return region,
                    None => debug!(ip, record = %record, "Malformed region record"),
                },
                Ok(None) => debug!(ip, "No region record"),
                Err(e) => debug!(ip, error = %e, "Region lookup failed"),
            }
        }

        Region::default()
    }
}
