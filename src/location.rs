//! Latitude/longitude points attached to recordings.
//!
//! Clients send a location as `[latitude, longitude]`, as a string
//! holding that array (older uploaders do this), or as a point object.
//! It always goes back out as a point object:
//!
//! ```
//! use collector::location::Location;
//!
//! let location = Location::new(-43.5, 172.6).unwrap();
//! assert_eq!(
//!     serde_json::to_value(&location).unwrap(),
//!     serde_json::json!({ "type": "Point", "coordinates": [-43.5, 172.6] })
//! );
//! ```

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::errors::ValidationError;

const POINT: &str = "Point";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    latitude: f64,
    longitude: f64,
}

impl Location {
    /// Creates a validated location.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let location = Location {
            latitude,
            longitude,
        };
        location.validate()?;

        Ok(location)
    }

    /// Wraps coordinates read back from the database, which were
    /// validated on the way in.
    pub(crate) fn from_stored(latitude: f64, longitude: f64) -> Self {
        Location {
            latitude,
            longitude,
        }
    }

    /// Parses any of the accepted input shapes without checking ranges.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        parse(value, true)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Checks both coordinates are finite and within range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::InvalidLatitude(self.latitude));
        }

        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::InvalidLongitude(self.longitude));
        }

        Ok(())
    }
}

fn parse(value: &Value, allow_string: bool) -> Result<Location, ValidationError> {
    let malformed = || ValidationError::MalformedLocation(value.to_string());

    match value {
        Value::Array(pair) => match pair.as_slice() {
            [latitude, longitude] => Ok(Location {
                latitude: latitude.as_f64().ok_or_else(malformed)?,
                longitude: longitude.as_f64().ok_or_else(malformed)?,
            }),
            _ => Err(malformed()),
        },
        Value::String(s) if allow_string => {
            let inner: Value = serde_json::from_str(s).map_err(|_| malformed())?;
            parse(&inner, false)
        }
        Value::Object(object) => {
            match object.get("type") {
                None => {}
                Some(Value::String(t)) if t == POINT => {}
                Some(_) => return Err(malformed()),
            }

            let coordinates = object.get("coordinates").ok_or_else(malformed)?;
            parse(coordinates, false)
        }
        _ => Err(malformed()),
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut point = serializer.serialize_struct("Point", 2)?;
        point.serialize_field("type", POINT)?;
        point.serialize_field("coordinates", &[self.latitude, self.longitude])?;
        point.end()
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Location::from_value(&value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::Location;
    use crate::errors::ValidationError;

    #[test]
    fn accepts_every_input_shape() {
        let expected = Location::new(-41.29, 174.78).unwrap();

        for value in &[
            json!([-41.29, 174.78]),
            json!("[-41.29, 174.78]"),
            json!({ "type": "Point", "coordinates": [-41.29, 174.78] }),
            json!({ "coordinates": [-41.29, 174.78] }),
        ] {
            assert_eq!(Location::from_value(value), Ok(expected), "{}", value);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        for value in &[
            json!([1.0]),
            json!([1.0, 2.0, 3.0]),
            json!(["a", 2.0]),
            json!("\"[1.0, 2.0]\""),
            json!({ "type": "Polygon", "coordinates": [1.0, 2.0] }),
            json!(12),
        ] {
            assert!(
                matches!(Location::from_value(value), Err(ValidationError::MalformedLocation(_))),
                "{} must be rejected",
                value
            );
        }
    }

    #[test]
    fn latitude_95_is_invalid() {
        let location = Location::from_value(&json!([95, 10])).unwrap();

        assert_eq!(location.validate(), Err(ValidationError::InvalidLatitude(95.0)));
        assert_eq!(Location::new(95.0, 10.0), Err(ValidationError::InvalidLatitude(95.0)));
    }

    #[test]
    fn deserialization_goes_through_the_setter() {
        let location: Location = serde_json::from_str("\"[10, 20]\"").unwrap();
        assert_eq!(location, Location::new(10.0, 20.0).unwrap());

        let round_tripped: Location =
            serde_json::from_value(serde_json::to_value(&location).unwrap()).unwrap();
        assert_eq!(round_tripped, location);
    }

    proptest! {
        #[test]
        fn coordinates_in_range_are_valid(latitude in -90.0..=90.0f64, longitude in -180.0..=180.0f64) {
            prop_assert!(Location::new(latitude, longitude).is_ok());
        }

        #[test]
        fn latitudes_out_of_range_are_invalid(latitude in 90.0001..1000.0f64, sign in prop::bool::ANY, longitude in -180.0..=180.0f64) {
            let latitude = if sign { latitude } else { -latitude };

            prop_assert_eq!(Location::new(latitude, longitude), Err(ValidationError::InvalidLatitude(latitude)));
        }

        #[test]
        fn longitudes_out_of_range_are_invalid(latitude in -90.0..=90.0f64, longitude in 180.0001..1000.0f64) {
            prop_assert_eq!(Location::new(latitude, longitude), Err(ValidationError::InvalidLongitude(longitude)));
        }
    }
}
