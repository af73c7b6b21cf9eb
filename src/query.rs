use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Id;

/// The largest page a caller may ask for.
pub const MAX_LIMIT: i64 = 1000;

/// Filters and paging for listing recordings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordingQuery {
    pub device_id: Option<Id>,
    pub group_id: Option<Id>,

    /// Only recordings made at or after this instant.
    #[serde(default, with = "crate::timestamps::option")]
    pub from: Option<OffsetDateTime>,

    /// Only recordings made before this instant.
    #[serde(default, with = "crate::timestamps::option")]
    pub until: Option<OffsetDateTime>,

    pub passed_filter: Option<bool>,

    #[serde(default)]
    pub offset: i64,

    pub limit: Option<i64>,

    #[serde(default)]
    pub order: Order,
}

impl RecordingQuery {
    /// The page size to use, given the configured default.
    pub fn effective_limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).max(0).min(MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Newest,
    Oldest,
}

impl Default for Order {
    fn default() -> Self {
        Order::Newest
    }
}

/// One page of results plus the number of matching rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub rows: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            rows: self.rows.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn limits_are_clamped() {
        let mut query = RecordingQuery::default();
        assert_eq!(query.effective_limit(300), 300);

        query.limit = Some(5000);
        assert_eq!(query.effective_limit(300), MAX_LIMIT);

        query.limit = Some(-1);
        query.offset = -10;
        assert_eq!(query.effective_limit(300), 0);
        assert_eq!(query.effective_offset(), 0);
    }

    #[test]
    fn queries_parse_from_camel_case() {
        let query: RecordingQuery = serde_json::from_value(json!({
            "deviceId": 4,
            "passedFilter": false,
            "from": 1_600_000_000,
            "order": "oldest",
        }))
        .unwrap();

        assert_eq!(query.device_id, Some(4));
        assert_eq!(query.passed_filter, Some(false));
        assert_eq!(query.from, Some(OffsetDateTime::from_unix_timestamp(1_600_000_000)));
        assert_eq!(query.order, Order::Oldest);
    }

    #[test]
    fn out_of_range_bounds_are_rejected() {
        assert!(serde_json::from_value::<RecordingQuery>(json!({ "until": i64::MAX })).is_err());
    }
}
