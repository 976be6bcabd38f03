//! Per-secret summary value used as the unit of comparison between origin
//! and destination sync infos.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Literal tag identifying the secret kind. Only KV-v2 is produced today,
/// but the field is carried as a string rather than an enum so a future
/// secret-engine type does not require a wire-format migration.
pub const KV_V2: &str = "kvV2";

/// Per-secret summary: version, update time and type, as reported by the
/// secret store. Insights are immutable values; equality is field-wise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// Monotonic non-negative version assigned by the secret store.
    pub version: i64,
    /// RFC-3339-nano timestamp string as reported by the store.
    #[serde(rename = "updateTime")]
    pub update_time: String,
    /// Literal tag identifying the secret kind, e.g. `"kvV2"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Insight {
    /// Construct a zero-value insight, used as the payload of delete tasks.
    pub fn zero() -> Self {
        Self {
            version: 0,
            update_time: String::new(),
            kind: String::new(),
        }
    }

    /// Parse [`Insight::update_time`] as RFC-3339-nano.
    pub fn parse_update_time(&self) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.update_time)
    }
}
