use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

/// One cached payload plus the metadata that decides its freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T = Value> {
    pub key: String,
    pub data: T,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// TTL in minutes.
    pub expiry: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T, now: OffsetDateTime, expiry: u32) -> Self {
        Self {
            key: key.into(),
            data,
            last_updated: now,
            expiry,
        }
    }

    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now - self.last_updated < Duration::minutes(i64::from(self.expiry))
    }

    pub fn freshness(&self, now: OffsetDateTime) -> Freshness {
        if self.is_fresh(now) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn freshness_boundary_is_exclusive() {
        let written = datetime!(2026-03-01 12:00 UTC);
        let entry = CacheEntry::new("products", json!([]), written, 60);

        assert!(entry.is_fresh(written + Duration::minutes(59)));
        assert!(!entry.is_fresh(written + Duration::minutes(60)));
        assert_eq!(
            entry.freshness(written + Duration::minutes(61)),
            Freshness::Stale
        );
    }

    #[test]
    fn serializes_camel_case_rfc3339() {
        let entry = CacheEntry::new(
            "menus",
            json!({"items": []}),
            datetime!(2026-03-01 12:00 UTC),
            720,
        );
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["lastUpdated"], "2026-03-01T12:00:00Z");
        assert_eq!(json["expiry"], 720);
        assert_eq!(json["key"], "menus");
    }
}
