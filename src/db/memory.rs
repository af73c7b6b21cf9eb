use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockWriteGuard};

use futures::future::{BoxFuture, FutureExt};
use time::OffsetDateTime;

use super::{Db, DeviceInsert};
use crate::credentials::PasswordDigest;
use crate::device::{Device, DevicePatch};
use crate::errors::BackendError;
use crate::query::{Order, Page, RecordingQuery};
use crate::recording::{
    AudioRecording, FileDescriptor, FilterOutcome, NewAudioRecording, RecordingUpdate,
};
use crate::tag::{NewTag, Tag};
use crate::user::{Group, Scope};
use crate::Id;

/// A database that keeps everything in memory. It enforces the same
/// devicename uniqueness and device, group and recording foreign keys as
/// the Postgres schema.
#[derive(Default)]
pub struct MemoryDb {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: Id,
    devices: BTreeMap<Id, Device>,
    groups: BTreeMap<Id, Group>,
    recordings: BTreeMap<Id, AudioRecording>,
    tags: BTreeMap<Id, Tag>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn load(&self, recording: &AudioRecording) -> AudioRecording {
        let mut recording = recording.clone();
        recording.group = recording
            .group_id
            .and_then(|id| self.groups.get(&id))
            .cloned();
        recording.tag_records = self
            .tags
            .values()
            .filter(|tag| tag.recording_id == recording.id)
            .cloned()
            .collect();
        recording
    }

    fn recording_mut(&mut self, id: Id) -> Result<&mut AudioRecording, BackendError> {
        self.recordings
            .get_mut(&id)
            .ok_or(BackendError::NonExistentRecording(id))
    }

    fn device_mut(&mut self, id: Id) -> Result<&mut Device, BackendError> {
        self.devices
            .get_mut(&id)
            .ok_or(BackendError::NonExistentDevice(id))
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group and returns its ID.
    pub fn add_group(&self, groupname: &str) -> Id {
        let mut tables = self.write();
        let id = tables.next_id();
        tables.groups.insert(
            id,
            Group {
                id,
                groupname: groupname.to_owned(),
            },
        );
        id
    }

    /// Marks a recording public or private.
    pub fn set_public(&self, id: Id, public: bool) -> Result<(), BackendError> {
        self.write().recording_mut(id)?.public = public;
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.tables
            .read()
            .expect("memory database lock poisoned")
            .devices
            .len()
    }

    fn write(&self) -> RwLockWriteGuard<Tables> {
        self.tables.write().expect("memory database lock poisoned")
    }

    fn run<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, BackendError>,
    ) -> BoxFuture<Result<T, BackendError>>
    where
        T: Send + 'static,
    {
        let result = f(&mut self.write());
        futures::future::ready(result).boxed()
    }
}

fn compare(order: Order, a: &AudioRecording, b: &AudioRecording) -> Ordering {
    // missing dates sort last in either direction
    let by_date = match (a.recording_date_time, b.recording_date_time) {
        (Some(a), Some(b)) => match order {
            Order::Newest => b.cmp(&a),
            Order::Oldest => a.cmp(&b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_date.then_with(|| match order {
        Order::Newest => b.id.cmp(&a.id),
        Order::Oldest => a.id.cmp(&b.id),
    })
}

fn selects(scope: &Scope, query: &RecordingQuery, recording: &AudioRecording) -> bool {
    let within = |bound: Option<OffsetDateTime>, check: fn(OffsetDateTime, OffsetDateTime) -> bool| {
        bound.map_or(true, |bound| {
            recording
                .recording_date_time
                .map_or(false, |at| check(at, bound))
        })
    };

    scope.includes(recording.public, recording.group_id)
        && query.device_id.map_or(true, |id| recording.device_id == id)
        && query.group_id.map_or(true, |id| recording.group_id == Some(id))
        && within(query.from, |at, from| at >= from)
        && within(query.until, |at, until| at < until)
        && query
            .passed_filter
            .map_or(true, |passed| recording.passed_filter == Some(passed))
}

impl Db for MemoryDb {
    fn find_device_by_name(
        &self,
        devicename: &str,
    ) -> BoxFuture<Result<Option<Device>, BackendError>> {
        self.run(|tables| {
            Ok(tables
                .devices
                .values()
                .find(|device| device.devicename == devicename)
                .cloned())
        })
    }

    fn retrieve_device(&self, id: Id) -> BoxFuture<Result<Option<Device>, BackendError>> {
        self.run(|tables| Ok(tables.devices.get(&id).cloned()))
    }

    fn insert_device(&self, device: DeviceInsert) -> BoxFuture<Result<Device, BackendError>> {
        self.run(|tables| {
            if tables
                .devices
                .values()
                .any(|existing| existing.devicename == device.devicename)
            {
                return Err(BackendError::DevicenameTaken(device.devicename));
            }

            let id = tables.next_id();
            let now = OffsetDateTime::now_utc();
            let device = Device {
                id,
                devicename: device.devicename,
                password: device.password,
                location: device.location,
                last_connection_time: None,
                public: device.public,
                current_config: None,
                new_config: device.new_config,
                created_at: now,
                updated_at: now,
            };

            tables.devices.insert(id, device.clone());
            Ok(device)
        })
    }

    fn update_device(&self, id: Id, patch: DevicePatch) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            let device = tables.device_mut(id)?;
            if let Some(location) = patch.location {
                device.location = Some(location);
            }
            if let Some(new_config) = patch.new_config {
                device.new_config = Some(new_config);
            }
            device.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    fn update_device_password(
        &self,
        id: Id,
        password: PasswordDigest,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            let device = tables.device_mut(id)?;
            device.password = password;
            device.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    fn update_connection_time(
        &self,
        id: Id,
        at: OffsetDateTime,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            tables.device_mut(id)?.last_connection_time = Some(at);
            Ok(())
        })
    }

    fn insert_recording(
        &self,
        device_id: Id,
        group_id: Option<Id>,
        recording: NewAudioRecording,
    ) -> BoxFuture<Result<Id, BackendError>> {
        self.run(|tables| {
            if !tables.devices.contains_key(&device_id) {
                return Err(BackendError::NonExistentDevice(device_id));
            }
            if let Some(group_id) = group_id.filter(|id| !tables.groups.contains_key(id)) {
                return Err(BackendError::NonExistentGroup(group_id));
            }

            let id = tables.next_id();
            let now = OffsetDateTime::now_utc();

            tables.recordings.insert(
                id,
                AudioRecording {
                    id,
                    device_id,
                    group_id,
                    file_key: None,
                    mime_type: None,
                    size: None,
                    duration: recording.duration,
                    recording_date_time: recording.recording_date_time,
                    recording_time: recording.recording_time,
                    location: recording.location,
                    battery_level: recording.battery_level,
                    battery_charging: recording.battery_charging,
                    airplane_mode_on: recording.airplane_mode_on,
                    filtered: false,
                    filter_metadata: None,
                    passed_filter: None,
                    public: false,
                    additional_metadata: recording.additional_metadata,
                    tags: recording.tags,
                    relative_to_dawn: recording.relative_to_dawn,
                    relative_to_dusk: recording.relative_to_dusk,
                    version: recording.version,
                    created_at: now,
                    updated_at: now,
                    group: None,
                    tag_records: vec![],
                },
            );

            Ok(id)
        })
    }

    fn retrieve_recording(&self, id: Id) -> BoxFuture<Result<Option<AudioRecording>, BackendError>> {
        self.run(|tables| {
            Ok(tables
                .recordings
                .get(&id)
                .map(|recording| tables.load(recording)))
        })
    }

    fn find_recordings(
        &self,
        scope: Scope,
        query: RecordingQuery,
        limit: i64,
    ) -> BoxFuture<Result<Page<AudioRecording>, BackendError>> {
        self.run(|tables| {
            let mut found = tables
                .recordings
                .values()
                .filter(|recording| selects(&scope, &query, recording))
                .collect::<Vec<_>>();
            found.sort_by(|a, b| compare(query.order, a, b));

            let rows = found
                .iter()
                .skip(query.effective_offset() as usize)
                .take(limit.max(0) as usize)
                .map(|recording| tables.load(recording))
                .collect();

            Ok(Page {
                count: found.len() as i64,
                rows,
            })
        })
    }

    fn update_recording(
        &self,
        id: Id,
        update: RecordingUpdate,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            let recording = tables.recording_mut(id)?;
            if let Some(at) = update.recording_date_time {
                recording.recording_date_time = Some(at);
            }
            if let Some(time) = update.recording_time {
                recording.recording_time = Some(time);
            }
            if let Some(location) = update.location {
                recording.location = Some(location);
            }
            if let Some(metadata) = update.additional_metadata {
                recording.additional_metadata = Some(metadata);
            }
            recording.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    fn update_recording_file(
        &self,
        id: Id,
        file: FileDescriptor,
        duration: Option<i32>,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            let recording = tables.recording_mut(id)?;
            recording.file_key = Some(file.key);
            recording.mime_type = Some(file.mime_type);
            recording.size = Some(file.size);
            if duration.is_some() {
                recording.duration = duration;
            }
            recording.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    fn update_filter_outcome(
        &self,
        id: Id,
        outcome: FilterOutcome,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            let recording = tables.recording_mut(id)?;
            recording.filtered = true;
            recording.passed_filter = outcome.passed;
            recording.filter_metadata = outcome.metadata;
            recording.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    fn delete_recording(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.run(|tables| {
            tables
                .recordings
                .remove(&id)
                .ok_or(BackendError::NonExistentRecording(id))?;
            tables.tags.retain(|_, tag| tag.recording_id != id);
            Ok(())
        })
    }

    fn insert_tags(
        &self,
        recording_id: Id,
        tagger_id: Option<Id>,
        tags: Vec<NewTag>,
    ) -> BoxFuture<Result<Vec<Tag>, BackendError>> {
        self.run(|tables| {
            if !tables.recordings.contains_key(&recording_id) {
                return Err(BackendError::NonExistentRecording(recording_id));
            }

            let now = OffsetDateTime::now_utc();
            let mut inserted = Vec::with_capacity(tags.len());

            for tag in tags {
                let id = tables.next_id();
                let tag = Tag {
                    id,
                    recording_id,
                    animal: tag.animal,
                    confidence: tag.confidence,
                    start_time: tag.start_time,
                    duration: tag.duration,
                    event: tag.event,
                    automatic: tag.automatic,
                    tagger_id,
                    created_at: now,
                };
                tables.tags.insert(id, tag.clone());
                inserted.push(tag);
            }

            Ok(inserted)
        })
    }

    fn delete_tags(
        &self,
        recording_id: Id,
        tag_ids: Vec<Id>,
    ) -> BoxFuture<Result<u64, BackendError>> {
        self.run(|tables| {
            let before = tables.tags.len();
            tables
                .tags
                .retain(|id, tag| !(tag.recording_id == recording_id && tag_ids.contains(id)));
            Ok((before - tables.tags.len()) as u64)
        })
    }
}
