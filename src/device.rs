use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::credentials::{self, Password, PasswordDigest};
use crate::errors::{BackendError, ValidationError};
use crate::fields::AllowList;
use crate::Id;

/// Fields an authenticated device may change about itself.
pub const DEVICE_SETTABLE_FIELDS: AllowList =
    AllowList::new("device patch", &["location", "newConfig"]);

/// A physical recording unit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Id,

    /// Unique name chosen when the device was registered.
    pub devicename: String,

    #[serde(skip_serializing)]
    pub password: PasswordDigest,

    /// Free-text description of where the device is deployed.
    pub location: Option<String>,

    /// When the device last contacted the backend.
    #[serde(with = "time::serde::timestamp::option")]
    pub last_connection_time: Option<OffsetDateTime>,

    /// Whether anyone may view the device.
    pub public: bool,

    /// The configuration the device reports it is running.
    pub current_config: Option<Value>,

    /// The configuration an operator wants the device to pick up next.
    pub new_config: Option<Value>,

    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

impl Device {
    /// Checks `candidate` against the stored digest.
    pub async fn compare_password(&self, candidate: &Password) -> Result<bool, BackendError> {
        credentials::verify_password(candidate.clone(), self.password.clone()).await
    }

    /// The claims to put in a session token issued to this device.
    pub fn get_jwt_data_values(&self) -> JwtData {
        JwtData {
            id: self.id,
            kind: PrincipalKind::Device,
        }
    }
}

/// Claims identifying the holder of a session token.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct JwtData {
    pub id: Id,

    #[serde(rename = "type")]
    pub kind: PrincipalKind,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Device,
}

/// The details submitted to register a device.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewDevice {
    pub devicename: String,
    pub password: Password,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub new_config: Option<Value>,
}

impl NewDevice {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.devicename.trim().is_empty() {
            return Err(ValidationError::BlankDevicename);
        }

        self.password.validate()
    }
}

/// A change to a device made through [`DEVICE_SETTABLE_FIELDS`]. An
/// absent or null field is left alone.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevicePatch {
    pub location: Option<String>,
    pub new_config: Option<Value>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.new_config.is_none()
    }
}

#[cfg(test)]
pub(crate) fn device_for_test(id: Id, devicename: &str, password: PasswordDigest) -> Device {
    let now = OffsetDateTime::now_utc();

    Device {
        id,
        devicename: devicename.to_owned(),
        password,
        location: None,
        last_connection_time: None,
        public: false,
        current_config: None,
        new_config: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::credentials::{hash_password, TEST_COST};

    #[test]
    fn jwt_data_is_exactly_id_and_type() {
        let device = device_for_test(42, "bird-box", PasswordDigest::from_stored("x".to_owned()));

        assert_eq!(
            serde_json::to_value(device.get_jwt_data_values()).unwrap(),
            json!({ "id": 42, "type": "device" })
        );
    }

    #[test]
    fn serialized_device_omits_password() {
        let device = device_for_test(1, "bird-box", PasswordDigest::from_stored("secret".to_owned()));
        let value = serde_json::to_value(&device).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("password"));
        assert_eq!(object["devicename"], json!("bird-box"));
        assert_eq!(object["public"], json!(false));
    }

    #[tokio::test]
    async fn compare_password_checks_the_digest() {
        let digest = hash_password(Password::new("pass"), TEST_COST).await.unwrap();
        let device = device_for_test(1, "bird-box", digest);

        assert!(device.compare_password(&Password::new("pass")).await.unwrap());
        assert!(!device.compare_password(&Password::new("nope")).await.unwrap());
    }

    #[test]
    fn patch_only_accepts_settable_fields() {
        let patch: DevicePatch = DEVICE_SETTABLE_FIELDS
            .assign(json!({ "location": "gully", "newConfig": { "rate": 5 } }))
            .unwrap();
        assert_eq!(patch.location.as_deref(), Some("gully"));
        assert_eq!(patch.new_config, Some(json!({ "rate": 5 })));

        for field in &["password", "devicename", "currentConfig", "public", "id"] {
            let mut object = serde_json::Map::new();
            object.insert((*field).to_owned(), json!("x"));

            assert!(
                matches!(
                    DEVICE_SETTABLE_FIELDS.assign::<DevicePatch>(object.into()),
                    Err(BackendError::FieldNotAllowed { .. })
                ),
                "{} must be rejected",
                field
            );
        }
    }

    #[test]
    fn new_devices_need_a_name_and_password() {
        let new_device = |devicename: &str, password: &str| NewDevice {
            devicename: devicename.to_owned(),
            password: Password::new(password),
            location: None,
            public: false,
            new_config: None,
        };

        assert_eq!(new_device("  ", "pw").validate(), Err(ValidationError::BlankDevicename));
        assert_eq!(new_device("box", "").validate(), Err(ValidationError::EmptyPassword));
        assert_eq!(new_device("box", "pw").validate(), Ok(()));
    }
}
