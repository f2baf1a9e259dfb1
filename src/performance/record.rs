//! Performance record types and latency categorisation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::correlation::CorrelationId;

/// Coarse latency bucket assigned when a record is written.
///
/// Half-open intervals on response time: FAST [0,100), NORMAL [100,500),
/// SLOW [500,2000), VERY_SLOW [2000,∞) milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceCategory {
    Fast,
    Normal,
    Slow,
    VerySlow,
}

impl PerformanceCategory {
    pub const ALL: [PerformanceCategory; 4] = [
        PerformanceCategory::Fast,
        PerformanceCategory::Normal,
        PerformanceCategory::Slow,
        PerformanceCategory::VerySlow,
    ];

    pub fn from_duration_ms(ms: f64) -> Self {
        if ms < 100.0 {
            PerformanceCategory::Fast
        } else if ms < 500.0 {
            PerformanceCategory::Normal
        } else if ms < 2000.0 {
            PerformanceCategory::Slow
        } else {
            PerformanceCategory::VerySlow
        }
    }

    pub fn is_slow(&self) -> bool {
        matches!(self, PerformanceCategory::Slow | PerformanceCategory::VerySlow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceCategory::Fast => "FAST",
            PerformanceCategory::Normal => "NORMAL",
            PerformanceCategory::Slow => "SLOW",
            PerformanceCategory::VerySlow => "VERY_SLOW",
        }
    }
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown performance category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for PerformanceCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PerformanceCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// One append-only row of the performance store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub endpoint: String,
    pub http_method: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: f64,
    pub status_code: u16,
    pub request_size_bytes: Option<u64>,
    pub response_size_bytes: Option<u64>,
    pub correlation_id: Option<CorrelationId>,
    pub caller: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub performance_category: PerformanceCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        let cases = [
            (99.0, PerformanceCategory::Fast),
            (100.0, PerformanceCategory::Normal),
            (499.0, PerformanceCategory::Normal),
            (500.0, PerformanceCategory::Slow),
            (1999.0, PerformanceCategory::Slow),
            (2000.0, PerformanceCategory::VerySlow),
        ];
        for (ms, expected) in cases {
            assert_eq!(PerformanceCategory::from_duration_ms(ms), expected, "{} ms", ms);
        }
        assert_eq!(PerformanceCategory::from_duration_ms(0.0), PerformanceCategory::Fast);
        assert_eq!(PerformanceCategory::from_duration_ms(99.999), PerformanceCategory::Fast);
    }

    #[test]
    fn test_category_parse_and_serialize() {
        assert_eq!("very_slow".parse::<PerformanceCategory>().unwrap(), PerformanceCategory::VerySlow);
        assert!("sluggish".parse::<PerformanceCategory>().is_err());
        assert_eq!(
            serde_json::to_string(&PerformanceCategory::VerySlow).unwrap(),
            "\"VERY_SLOW\""
        );
    }
}
