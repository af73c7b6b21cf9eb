//! Serde adapters for the date and time columns that clients write.
//! Instants travel as unix timestamps in seconds, the same as
//! `time::serde::timestamp`; times of day travel as `HH:MM:SS`.

/// Earliest accepted timestamp, 0001-01-01T00:00:00Z.
pub const MIN_TIMESTAMP: i64 = -62_135_596_800;

/// Latest accepted timestamp, 9999-12-31T23:59:59Z.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799;

/// An optional instant as an optional unix timestamp. Unlike
/// `time::serde::timestamp::option`, timestamps outside
/// [`MIN_TIMESTAMP`]..=[`MAX_TIMESTAMP`] are a deserialization error.
pub mod option {
    use serde::de::{self, Deserialize, Deserializer};
    use serde::Serializer;
    use time::OffsetDateTime;

    use super::{MAX_TIMESTAMP, MIN_TIMESTAMP};

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        time::serde::timestamp::option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        match Option::<i64>::deserialize(deserializer)? {
            Some(seconds) if (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&seconds) => {
                Ok(Some(OffsetDateTime::from_unix_timestamp(seconds)))
            }
            Some(seconds) => Err(de::Error::custom(format!(
                "timestamp {} is out of range",
                seconds
            ))),
            None => Ok(None),
        }
    }
}

/// An optional local time of day as `HH:MM:SS`. `HH:MM` is accepted on
/// input.
pub mod clock {
    use serde::de::{self, Deserialize, Deserializer};
    use serde::{Serialize, Serializer};
    use time::Time;

    pub fn format(time: &Time) -> String {
        time.format("%T")
    }

    pub fn parse(s: &str) -> Option<Time> {
        Time::parse(s, "%T")
            .or_else(|_| Time::parse(s, "%R"))
            .ok()
    }

    pub fn serialize<S: Serializer>(value: &Option<Time>, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_ref().map(format).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Time>, D::Error> {
        let s: Option<String> = Deserialize::deserialize(deserializer)?;

        match s {
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time of day {:?}", s))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use time::{Date, OffsetDateTime, Time};

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Stamped {
        #[serde(default, with = "super::option")]
        at: Option<OffsetDateTime>,
    }

    #[test]
    fn timestamp_bounds_are_the_years_1_to_9999() {
        let first = Date::try_from_ymd(1, 1, 1).unwrap().midnight().assume_utc();
        let last = Date::try_from_ymd(9999, 12, 31)
            .unwrap()
            .try_with_hms(23, 59, 59)
            .unwrap()
            .assume_utc();

        assert_eq!(first.unix_timestamp(), MIN_TIMESTAMP);
        assert_eq!(last.unix_timestamp(), MAX_TIMESTAMP);
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        let parsed: Stamped = serde_json::from_value(json!({ "at": MAX_TIMESTAMP })).unwrap();
        assert_eq!(parsed.at.unwrap().unix_timestamp(), MAX_TIMESTAMP);

        for seconds in &[i64::MAX, i64::MIN, MAX_TIMESTAMP + 1, MIN_TIMESTAMP - 1] {
            assert!(
                serde_json::from_value::<Stamped>(json!({ "at": seconds })).is_err(),
                "{}",
                seconds
            );
        }

        assert_eq!(serde_json::from_value::<Stamped>(json!({})).unwrap().at, None);
    }

    #[test]
    fn times_of_day_round_trip() {
        let time = Time::try_from_hms(6, 5, 4).unwrap();

        assert_eq!(clock::format(&time), "06:05:04");
        assert_eq!(clock::parse("06:05:04"), Some(time));
        assert_eq!(clock::parse("06:05"), Time::try_from_hms(6, 5, 0).ok());
    }

    #[test]
    fn bad_times_of_day_are_rejected() {
        for s in &["24:00:00", "12:60:00", "noon", "1:2:3", ""] {
            assert_eq!(clock::parse(s), None, "{:?}", s);
        }
    }
}
