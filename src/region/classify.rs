use serde::Serialize;

use crate::models::Region;

/// Country value the region databases use for China
pub const CHINA: &str = "中国";

/// Provinces reported under China that do not count as inland:
/// Hong Kong, Macau and Taiwan
pub const OUTLYING_PROVINCES: [&str; 3] = ["香港", "澳门", "台湾"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_country_china: bool,
    pub is_china_inland: bool,
}

/// Classify a resolved region.
///
/// Comparison is exact and case-sensitive; `is_china_inland` is never set
/// without `is_country_china`.
pub fn classify(region: &Region) -> Classification {
    if region.country != CHINA {
        return Classification::default();
    }

    let outlying = OUTLYING_PROVINCES
        .iter()
        .any(|province| *province == region.province);

    Classification {
        is_country_china: true,
        is_china_inland: !outlying,
    }
}
