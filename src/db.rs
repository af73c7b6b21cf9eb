use futures::future::BoxFuture;
use serde_json::Value;
use time::OffsetDateTime;

use crate::credentials::PasswordDigest;
use crate::device::{Device, DevicePatch};
use crate::errors::BackendError;
use crate::query::{Page, RecordingQuery};
use crate::recording::{AudioRecording, FileDescriptor, FilterOutcome, NewAudioRecording, RecordingUpdate};
use crate::tag::{NewTag, Tag};
use crate::user::Scope;
use crate::Id;

pub mod memory;

pub use memory::MemoryDb;

/// A device ready to be inserted: the password is already hashed.
#[derive(Clone, Debug)]
pub struct DeviceInsert {
    pub devicename: String,
    pub password: PasswordDigest,
    pub location: Option<String>,
    pub public: bool,
    pub new_config: Option<Value>,
}

pub trait Db: Send + Sync {
    fn find_device_by_name(
        &self,
        devicename: &str,
    ) -> BoxFuture<Result<Option<Device>, BackendError>>;

    fn retrieve_device(&self, id: Id) -> BoxFuture<Result<Option<Device>, BackendError>>;

    /// Inserts a device. Fails with `DevicenameTaken` if the name is
    /// already in use, however the insert raced.
    fn insert_device(&self, device: DeviceInsert) -> BoxFuture<Result<Device, BackendError>>;

    fn update_device(&self, id: Id, patch: DevicePatch) -> BoxFuture<Result<(), BackendError>>;

    fn update_device_password(
        &self,
        id: Id,
        password: PasswordDigest,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn update_connection_time(
        &self,
        id: Id,
        at: OffsetDateTime,
    ) -> BoxFuture<Result<(), BackendError>>;

    /// Inserts a recording and returns its ID.
    fn insert_recording(
        &self,
        device_id: Id,
        group_id: Option<Id>,
        recording: NewAudioRecording,
    ) -> BoxFuture<Result<Id, BackendError>>;

    /// Retrieves a recording along with its group and tags.
    fn retrieve_recording(&self, id: Id) -> BoxFuture<Result<Option<AudioRecording>, BackendError>>;

    /// Lists the recordings in `scope` that match `query`, along with
    /// their groups and tags.
    fn find_recordings(
        &self,
        scope: Scope,
        query: RecordingQuery,
        limit: i64,
    ) -> BoxFuture<Result<Page<AudioRecording>, BackendError>>;

    fn update_recording(
        &self,
        id: Id,
        update: RecordingUpdate,
    ) -> BoxFuture<Result<(), BackendError>>;

    /// Writes the file descriptor in one statement.
    fn update_recording_file(
        &self,
        id: Id,
        file: FileDescriptor,
        duration: Option<i32>,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn update_filter_outcome(
        &self,
        id: Id,
        outcome: FilterOutcome,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn delete_recording(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    fn insert_tags(
        &self,
        recording_id: Id,
        tagger_id: Option<Id>,
        tags: Vec<NewTag>,
    ) -> BoxFuture<Result<Vec<Tag>, BackendError>>;

    /// Deletes the given tags from a recording, returning how many went.
    fn delete_tags(
        &self,
        recording_id: Id,
        tag_ids: Vec<Id>,
    ) -> BoxFuture<Result<u64, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use std::collections::HashMap;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use time::OffsetDateTime;

    use super::DeviceInsert;
    use crate::credentials::PasswordDigest;
    use crate::device::{Device, DevicePatch};
    use crate::errors::BackendError;
    use crate::location::Location;
    use crate::query::{Order, Page, RecordingQuery};
    use crate::recording::{
        AudioRecording, FileDescriptor, FilterOutcome, NewAudioRecording, RecordingUpdate,
    };
    use crate::tag::{NewTag, Tag};
    use crate::user::{Group, Scope};
    use crate::Id;

    const DEVICES_DEVICENAME_CONSTRAINT: &str = "devices_devicename_key";
    const RECORDINGS_DEVICE_CONSTRAINT: &str = "audio_recordings_device_id_fkey";
    const RECORDINGS_GROUP_CONSTRAINT: &str = "audio_recordings_group_id_fkey";
    const TAGS_RECORDING_CONSTRAINT: &str = "tags_recording_id_fkey";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn find_device_by_name(
            &self,
            devicename: &str,
        ) -> BoxFuture<Result<Option<Device>, BackendError>> {
            let devicename = devicename.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/find_device_by_name.sql"));

                let device = query
                    .bind(devicename)
                    .try_map(|row: PgRow| device_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(device)
            }
            .boxed()
        }

        fn retrieve_device(&self, id: Id) -> BoxFuture<Result<Option<Device>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_device.sql"));

                let device = query
                    .bind(id)
                    .try_map(|row: PgRow| device_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(device)
            }
            .boxed()
        }

        fn insert_device(&self, device: DeviceInsert) -> BoxFuture<Result<Device, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/insert_device.sql"));
                let devicename = device.devicename.clone();

                let device = query
                    .bind(device.devicename)
                    .bind(device.password.as_str().to_owned())
                    .bind(device.location)
                    .bind(device.public)
                    .bind(device.new_config)
                    .try_map(|row: PgRow| device_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(ref d)
                            if d.constraint() == Some(DEVICES_DEVICENAME_CONSTRAINT) =>
                        {
                            BackendError::DevicenameTaken(devicename)
                        }
                        e => map_sqlx_error(e),
                    })?;

                Ok(device)
            }
            .boxed()
        }

        fn update_device(&self, id: Id, patch: DevicePatch) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_device.sql"));

                let count = query
                    .bind(id)
                    .bind(patch.location)
                    .bind(patch.new_config)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_device(id, count)
            }
            .boxed()
        }

        fn update_device_password(
            &self,
            id: Id,
            password: PasswordDigest,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_device_password.sql"));

                let count = query
                    .bind(id)
                    .bind(password.as_str().to_owned())
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_device(id, count)
            }
            .boxed()
        }

        fn update_connection_time(
            &self,
            id: Id,
            at: OffsetDateTime,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_connection_time.sql"));

                let count = query
                    .bind(id)
                    .bind(at)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_device(id, count)
            }
            .boxed()
        }

        fn insert_recording(
            &self,
            device_id: Id,
            group_id: Option<Id>,
            recording: NewAudioRecording,
        ) -> BoxFuture<Result<Id, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_recording.sql"));

                let (id,): (Id,) = query
                    .bind(device_id)
                    .bind(group_id)
                    .bind(recording.duration)
                    .bind(recording.recording_date_time)
                    .bind(recording.recording_time)
                    .bind(recording.location.map(|l| l.latitude()))
                    .bind(recording.location.map(|l| l.longitude()))
                    .bind(recording.additional_metadata)
                    .bind(recording.tags)
                    .bind(recording.battery_level)
                    .bind(recording.battery_charging)
                    .bind(recording.airplane_mode_on)
                    .bind(recording.relative_to_dawn)
                    .bind(recording.relative_to_dusk)
                    .bind(recording.version)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(ref d)
                            if d.constraint() == Some(RECORDINGS_DEVICE_CONSTRAINT) =>
                        {
                            BackendError::NonExistentDevice(device_id)
                        }
                        sqlx::Error::Database(ref d)
                            if d.constraint() == Some(RECORDINGS_GROUP_CONSTRAINT) =>
                        {
                            BackendError::NonExistentGroup(group_id.unwrap_or_default())
                        }
                        e => map_sqlx_error(e),
                    })?;

                Ok(id)
            }
            .boxed()
        }

        fn retrieve_recording(
            &self,
            id: Id,
        ) -> BoxFuture<Result<Option<AudioRecording>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_recording.sql"));

                let recording = query
                    .bind(id)
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                match recording {
                    Some(recording) => {
                        let mut recordings = self.attach_tags(vec![recording]).await?;
                        Ok(recordings.pop())
                    }
                    None => Ok(None),
                }
            }
            .boxed()
        }

        fn find_recordings(
            &self,
            scope: Scope,
            query: RecordingQuery,
            limit: i64,
        ) -> BoxFuture<Result<Page<AudioRecording>, BackendError>> {
            async move {
                let (everything, group_ids) = scope.as_parameters();

                let (count,): (i64,) = sqlx::query_as(include_str!("queries/count_recordings.sql"))
                    .bind(everything)
                    .bind(group_ids.clone())
                    .bind(query.device_id)
                    .bind(query.group_id)
                    .bind(query.from)
                    .bind(query.until)
                    .bind(query.passed_filter)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let direction = match query.order {
                    Order::Newest => "DESC",
                    Order::Oldest => "ASC",
                };
                let sql = include_str!("queries/find_recordings.sql").replace("$ORDER", direction);

                let recordings = sqlx::query(&sql)
                    .bind(everything)
                    .bind(group_ids)
                    .bind(query.device_id)
                    .bind(query.group_id)
                    .bind(query.from)
                    .bind(query.until)
                    .bind(query.passed_filter)
                    .bind(limit)
                    .bind(query.effective_offset())
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let rows = self.attach_tags(recordings).await?;

                Ok(Page { count, rows })
            }
            .boxed()
        }

        fn update_recording(
            &self,
            id: Id,
            update: RecordingUpdate,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_recording.sql"));

                let count = query
                    .bind(id)
                    .bind(update.recording_date_time)
                    .bind(update.recording_time)
                    .bind(update.location.map(|l| l.latitude()))
                    .bind(update.location.map(|l| l.longitude()))
                    .bind(update.additional_metadata)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_recording(id, count)
            }
            .boxed()
        }

        fn update_recording_file(
            &self,
            id: Id,
            file: FileDescriptor,
            duration: Option<i32>,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_recording_file.sql"));

                let count = query
                    .bind(id)
                    .bind(file.key)
                    .bind(file.mime_type)
                    .bind(file.size)
                    .bind(duration)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_recording(id, count)
            }
            .boxed()
        }

        fn update_filter_outcome(
            &self,
            id: Id,
            outcome: FilterOutcome,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_filter_outcome.sql"));

                let count = query
                    .bind(id)
                    .bind(outcome.passed)
                    .bind(outcome.metadata)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_recording(id, count)
            }
            .boxed()
        }

        fn delete_recording(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_recording.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_recording(id, count)
            }
            .boxed()
        }

        fn insert_tags(
            &self,
            recording_id: Id,
            tagger_id: Option<Id>,
            tags: Vec<NewTag>,
        ) -> BoxFuture<Result<Vec<Tag>, BackendError>> {
            async move {
                let map_error = |e: sqlx::Error| match e {
                    sqlx::Error::Database(ref d)
                        if d.constraint() == Some(TAGS_RECORDING_CONSTRAINT) =>
                    {
                        BackendError::NonExistentRecording(recording_id)
                    }
                    e => map_sqlx_error(e),
                };

                let mut transaction = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut inserted = Vec::with_capacity(tags.len());

                for tag in tags {
                    let tag: Tag = sqlx::query_as(include_str!("queries/insert_tag.sql"))
                        .bind(recording_id)
                        .bind(tag.animal)
                        .bind(tag.confidence)
                        .bind(tag.start_time)
                        .bind(tag.duration)
                        .bind(tag.event)
                        .bind(tag.automatic)
                        .bind(tagger_id)
                        .fetch_one(&mut transaction)
                        .await
                        .map_err(map_error)?;

                    inserted.push(tag);
                }

                transaction.commit().await.map_err(map_sqlx_error)?;

                Ok(inserted)
            }
            .boxed()
        }

        fn delete_tags(
            &self,
            recording_id: Id,
            tag_ids: Vec<Id>,
        ) -> BoxFuture<Result<u64, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_tags.sql"));

                let count = query
                    .bind(recording_id)
                    .bind(tag_ids)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count)
            }
            .boxed()
        }
    }

    impl PgDb {
        /// Loads the tags of every recording in one query.
        async fn attach_tags(
            &self,
            mut recordings: Vec<AudioRecording>,
        ) -> Result<Vec<AudioRecording>, BackendError> {
            if recordings.is_empty() {
                return Ok(recordings);
            }

            let ids = recordings.iter().map(|r| r.id).collect::<Vec<_>>();

            let tags: Vec<Tag> = sqlx::query_as(include_str!("queries/retrieve_tags.sql"))
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            let mut by_recording: HashMap<Id, Vec<Tag>> = HashMap::new();
            for tag in tags {
                by_recording.entry(tag.recording_id).or_default().push(tag);
            }

            for recording in &mut recordings {
                recording.tag_records = by_recording.remove(&recording.id).unwrap_or_default();
            }

            Ok(recordings)
        }
    }

    fn expect_device(id: Id, count: u64) -> Result<(), BackendError> {
        if count == 0 {
            Err(BackendError::NonExistentDevice(id))
        } else {
            Ok(())
        }
    }

    fn expect_recording(id: Id, count: u64) -> Result<(), BackendError> {
        if count == 0 {
            Err(BackendError::NonExistentRecording(id))
        } else {
            Ok(())
        }
    }

    fn device_from_row(row: &PgRow) -> Result<Device, sqlx::Error> {
        let password: String = try_get(row, "password")?;

        Ok(Device {
            id: try_get(row, "id")?,
            devicename: try_get(row, "devicename")?,
            password: PasswordDigest::from_stored(password),
            location: try_get(row, "location")?,
            last_connection_time: try_get(row, "last_connection_time")?,
            public: try_get(row, "public")?,
            current_config: try_get(row, "current_config")?,
            new_config: try_get(row, "new_config")?,
            created_at: try_get(row, "created_at")?,
            updated_at: try_get(row, "updated_at")?,
        })
    }

    fn recording_from_row(row: &PgRow) -> Result<AudioRecording, sqlx::Error> {
        let latitude: Option<f64> = try_get(row, "latitude")?;
        let longitude: Option<f64> = try_get(row, "longitude")?;

        let location = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Location::from_stored(latitude, longitude)),
            _ => None,
        };

        let group_id: Option<Id> = try_get(row, "group_id")?;
        let groupname: Option<String> = try_get(row, "groupname")?;

        let group = match (group_id, groupname) {
            (Some(id), Some(groupname)) => Some(Group { id, groupname }),
            _ => None,
        };

        Ok(AudioRecording {
            id: try_get(row, "id")?,
            device_id: try_get(row, "device_id")?,
            group_id,
            file_key: try_get(row, "file_key")?,
            mime_type: try_get(row, "mime_type")?,
            size: try_get(row, "size")?,
            duration: try_get(row, "duration")?,
            recording_date_time: try_get(row, "recording_date_time")?,
            recording_time: try_get(row, "recording_time")?,
            location,
            battery_level: try_get(row, "battery_level")?,
            battery_charging: try_get(row, "battery_charging")?,
            airplane_mode_on: try_get(row, "airplane_mode_on")?,
            filtered: try_get(row, "filtered")?,
            filter_metadata: try_get(row, "filter_metadata")?,
            passed_filter: try_get(row, "passed_filter")?,
            public: try_get(row, "public")?,
            additional_metadata: try_get(row, "additional_metadata")?,
            tags: try_get(row, "tags")?,
            relative_to_dawn: try_get(row, "relative_to_dawn")?,
            relative_to_dusk: try_get(row, "relative_to_dusk")?,
            version: try_get(row, "version")?,
            created_at: try_get(row, "created_at")?,
            updated_at: try_get(row, "updated_at")?,
            group,
            tag_records: vec![],
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}
