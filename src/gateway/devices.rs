use serde_json::Value;
use time::OffsetDateTime;

use logging::{debug, error, o};

use crate::credentials::{hash_password, Password};
use crate::db::DeviceInsert;
use crate::device::{Device, DevicePatch, NewDevice, DEVICE_SETTABLE_FIELDS};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::normalization::normalize_devicename;
use crate::Id;

/// Registration, lookup and credential changes for devices.
#[derive(Clone)]
pub struct Devices {
    env: Environment,
}

impl Devices {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Whether no device has this devicename once it is normalized. A
    /// taken name is `Ok(false)`; only a failed lookup is an error.
    ///
    /// The answer is advisory: [`Devices::register`] can still lose a race
    /// for the name.
    pub async fn free_devicename(&self, devicename: &str) -> Result<bool, BackendError> {
        let existing = self.find_by_devicename(devicename).await?;

        Ok(existing.is_none())
    }

    /// Registers a device, storing a digest of its password.
    pub async fn register(&self, new_device: NewDevice) -> Result<Device, BackendError> {
        let new_device = NewDevice {
            devicename: normalize_devicename(&new_device.devicename),
            ..new_device
        };
        new_device.validate()?;

        let logger = self
            .env
            .logger
            .new(o!("devicename" => new_device.devicename.clone()));

        if !self.free_devicename(&new_device.devicename).await? {
            debug!(logger, "Devicename already taken");
            return Err(BackendError::DevicenameTaken(new_device.devicename));
        }

        debug!(logger, "Hashing password...");
        let password = hash_password(new_device.password, self.env.config.hash_cost).await?;

        let device = self
            .env
            .db
            .insert_device(DeviceInsert {
                devicename: new_device.devicename,
                password,
                location: new_device.location,
                public: new_device.public,
                new_config: new_device.new_config,
            })
            .await
            .map_err(|e| {
                error!(logger, "Error registering device"; "error" => %e);
                e
            })?;

        debug!(logger, "Registered device"; "id" => device.id);

        Ok(device)
    }

    pub async fn get_from_id(&self, id: Id) -> Result<Option<Device>, BackendError> {
        self.env.db.retrieve_device(id).await
    }

    /// Looks a device up by name, normalized the same way as at
    /// registration.
    pub async fn find_by_devicename(&self, devicename: &str) -> Result<Option<Device>, BackendError> {
        self.env
            .db
            .find_device_by_name(&normalize_devicename(devicename))
            .await
    }

    /// Returns the device if `password` matches its digest.
    pub async fn authenticate(
        &self,
        devicename: &str,
        password: &Password,
    ) -> Result<Option<Device>, BackendError> {
        let device = match self.find_by_devicename(devicename).await? {
            Some(device) => device,
            None => return Ok(None),
        };

        if device.compare_password(password).await? {
            Ok(Some(device))
        } else {
            debug!(self.env.logger, "Password mismatch"; "id" => device.id);
            Ok(None)
        }
    }

    /// Applies a client-supplied change. Any field outside
    /// [`DEVICE_SETTABLE_FIELDS`] fails the whole patch.
    pub async fn apply_patch(&self, id: Id, fields: Value) -> Result<Device, BackendError> {
        let patch: DevicePatch = DEVICE_SETTABLE_FIELDS.assign(fields)?;

        if !patch.is_empty() {
            self.env.db.update_device(id, patch).await?;
        }

        self.get_from_id(id)
            .await?
            .ok_or(BackendError::NonExistentDevice(id))
    }

    pub async fn change_password(&self, id: Id, password: Password) -> Result<(), BackendError> {
        password.validate()?;

        let digest = hash_password(password, self.env.config.hash_cost).await?;
        self.env.db.update_device_password(id, digest).await?;

        debug!(self.env.logger, "Changed device password"; "id" => id);

        Ok(())
    }

    pub async fn record_connection(&self, id: Id, at: OffsetDateTime) -> Result<(), BackendError> {
        self.env.db.update_connection_time(id, at).await
    }
}
