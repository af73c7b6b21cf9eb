use std::convert::TryFrom;

use serde_json::Value;
use tokio::task;

use logging::{debug, error, o, Logger};

use crate::device::Device;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::query::{Page, RecordingQuery};
use crate::recording::{
    AudioRecording, FileDescriptor, FilterOutcome, NewAudioRecording, RecordingUpdate,
    RECORDING_SETTABLE_FIELDS, RECORDING_UPDATEABLE_FIELDS,
};
use crate::store;
use crate::tag::{NewTag, Tag};
use crate::user::{Scope, User};
use crate::Id;

/// The audio behind a recording, read back from the blob store.
#[derive(Clone, Debug, PartialEq)]
pub struct FileData {
    pub key: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Queries and lifecycle operations over all recordings.
#[derive(Clone)]
pub struct AudioRecordings {
    env: Environment,
}

impl AudioRecordings {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    fn logger_for(&self, id: Id) -> Logger {
        self.env.logger.new(o!("recording" => id))
    }

    /// Creates a recording for `device` from uploader-supplied fields,
    /// attaching `audio` if there is any. If the file can't be attached
    /// the row is removed again.
    pub async fn create(
        &self,
        device: &Device,
        group_id: Option<Id>,
        fields: Value,
        audio: Option<Vec<u8>>,
    ) -> Result<AudioRecording, BackendError> {
        let new_recording: NewAudioRecording = RECORDING_SETTABLE_FIELDS.assign(fields)?;
        new_recording.validate()?;

        if let (Some(declared), Some(audio)) = (new_recording.size, &audio) {
            if usize::try_from(declared).ok() != Some(audio.len()) {
                return Err(BackendError::SizeMismatch {
                    declared,
                    actual: audio.len(),
                });
            }
        }

        let declared_mime_type = new_recording.mime_type.clone();
        let id = self
            .env
            .db
            .insert_recording(device.id, group_id, new_recording)
            .await?;

        let logger = self.logger_for(id);
        debug!(logger, "Created recording"; "device" => device.id);

        if let Some(audio) = audio {
            if let Err(e) = self.attach(id, audio, declared_mime_type).await {
                error!(logger, "Error attaching file, removing recording"; "error" => %e);

                if let Err(e) = self.env.db.delete_recording(id).await {
                    error!(logger, "Error removing recording"; "error" => %e);
                }

                return Err(e);
            }
        }

        self.retrieve(id).await
    }

    /// Applies a correction. Any field outside
    /// [`RECORDING_UPDATEABLE_FIELDS`] fails the whole update.
    pub async fn update(
        &self,
        id: Id,
        user: &User,
        fields: Value,
    ) -> Result<AudioRecording, BackendError> {
        let update: RecordingUpdate = RECORDING_UPDATEABLE_FIELDS.assign(fields)?;
        update.validate()?;

        self.editable(id, user).await?;

        if !update.is_empty() {
            self.env.db.update_recording(id, update).await?;
        }

        self.retrieve(id).await
    }

    /// The recording with its group and tags, if the caller may see it.
    pub async fn get_from_id(
        &self,
        id: Id,
        user: Option<&User>,
    ) -> Result<Option<AudioRecording>, BackendError> {
        let scope = Scope::for_user(user);
        let recording = self.env.db.retrieve_recording(id).await?;

        Ok(recording.filter(|r| scope.includes(r.public, r.group_id)))
    }

    /// Whether `user` may modify a recording they can see. A recording
    /// outside their scope is `NonExistentRecording`.
    pub async fn user_can_edit(&self, id: Id, user: &User) -> Result<bool, BackendError> {
        let recording = self.visible(id, user).await?;

        Ok(user.can_edit(recording.group_id))
    }

    /// One page of the recordings the caller may see, newest first
    /// unless the query says otherwise.
    pub async fn find_all_with_user(
        &self,
        user: Option<&User>,
        query: RecordingQuery,
    ) -> Result<Page<AudioRecording>, BackendError> {
        let limit = query.effective_limit(self.env.config.default_limit);

        debug!(self.env.logger, "Listing recordings"; "query" => ?query, "limit" => limit);

        self.env
            .db
            .find_recordings(Scope::for_user(user), query, limit)
            .await
    }

    pub async fn get_file_data(&self, id: Id, user: Option<&User>) -> Result<FileData, BackendError> {
        let recording = self
            .get_from_id(id, user)
            .await?
            .ok_or(BackendError::NonExistentRecording(id))?;
        let file = recording.file().ok_or(BackendError::NoFileAttached(id))?;

        let bytes = self.env.store.retrieve(&file.key).await.map_err(|e| {
            error!(self.logger_for(id), "Error retrieving file"; "key" => &file.key, "error" => %e);
            e
        })?;

        Ok(FileData {
            key: file.key,
            mime_type: file.mime_type,
            bytes,
        })
    }

    /// Deletes the recording, its tags and its file.
    pub async fn delete_model_instance(&self, id: Id, user: &User) -> Result<(), BackendError> {
        let recording = self.editable(id, user).await?;

        self.env.db.delete_recording(id).await?;

        if let Some(file) = recording.file() {
            self.env.store.delete(&file.key).await?;
        }

        debug!(self.logger_for(id), "Deleted recording");

        Ok(())
    }

    /// Probes `audio`, stores it under a fresh key, and points the
    /// recording at it. Any previous file is removed afterwards.
    pub async fn save_file(&self, id: Id, audio: Vec<u8>) -> Result<FileDescriptor, BackendError> {
        let previous = self.retrieve(id).await?.file();
        let file = self.attach(id, audio, None).await?;

        if let Some(previous) = previous {
            if let Err(e) = self.env.store.delete(&previous.key).await {
                error!(self.logger_for(id), "Error removing replaced file"; "key" => previous.key, "error" => %e);
            }
        }

        Ok(file)
    }

    async fn attach(
        &self,
        id: Id,
        audio: Vec<u8>,
        fallback_mime_type: Option<String>,
    ) -> Result<FileDescriptor, BackendError> {
        let logger = self.logger_for(id);
        let len = audio.len();

        if len > self.env.config.max_file_size {
            return Err(BackendError::FileTooLarge(len));
        }
        let size = i32::try_from(len).map_err(|_| BackendError::FileTooLarge(len))?;

        let prober = self.env.prober.clone();
        let (probe, audio) = task::spawn_blocking(move || ((*prober)(&audio), audio))
            .await
            .map_err(BackendError::BlockingTaskFailed)?;

        // ffprobe can't always name the container, but it must be audio
        let probe = probe?;
        let mime_type = probe
            .mime_type()
            .map(str::to_owned)
            .or(fallback_mime_type)
            .ok_or(BackendError::UnrecognizedAudioFormat)?;

        let key = store::new_key();
        debug!(logger, "Saving file"; "key" => &key, "mime_type" => &mime_type, "size" => size);
        self.env.store.save(&key, mime_type.clone(), audio).await?;

        let file = FileDescriptor {
            key,
            mime_type,
            size,
        };

        if let Err(e) = self
            .env
            .db
            .update_recording_file(id, file.clone(), probe.whole_seconds())
            .await
        {
            error!(logger, "Error recording file, removing it"; "key" => &file.key, "error" => %e);

            if let Err(e) = self.env.store.delete(&file.key).await {
                error!(logger, "Error removing file"; "key" => &file.key, "error" => %e);
            }

            return Err(e);
        }

        Ok(file)
    }

    /// Tags a recording the user can see.
    pub async fn add_tags(
        &self,
        id: Id,
        user: &User,
        tags: Vec<NewTag>,
    ) -> Result<Vec<Tag>, BackendError> {
        for tag in &tags {
            tag.validate()?;
        }

        self.visible(id, user).await?;

        let tags = self.env.db.insert_tags(id, Some(user.id), tags).await?;
        debug!(self.logger_for(id), "Added tags"; "count" => tags.len());

        Ok(tags)
    }

    /// Removes tags from a recording the user can edit and returns how
    /// many were removed.
    pub async fn delete_tags(&self, id: Id, user: &User, tag_ids: Vec<Id>) -> Result<u64, BackendError> {
        self.editable(id, user).await?;

        self.env.db.delete_tags(id, tag_ids).await
    }

    pub async fn record_filter_outcome(
        &self,
        id: Id,
        outcome: FilterOutcome,
    ) -> Result<(), BackendError> {
        debug!(self.logger_for(id), "Recording filter outcome"; "passed" => ?outcome.passed);

        self.env.db.update_filter_outcome(id, outcome).await
    }

    async fn visible(&self, id: Id, user: &User) -> Result<AudioRecording, BackendError> {
        self.get_from_id(id, Some(user))
            .await?
            .ok_or(BackendError::NonExistentRecording(id))
    }

    async fn editable(&self, id: Id, user: &User) -> Result<AudioRecording, BackendError> {
        let recording = self.visible(id, user).await?;

        if user.can_edit(recording.group_id) {
            Ok(recording)
        } else {
            Err(BackendError::Forbidden(id))
        }
    }

    async fn retrieve(&self, id: Id) -> Result<AudioRecording, BackendError> {
        self.env
            .db
            .retrieve_recording(id)
            .await?
            .ok_or(BackendError::NonExistentRecording(id))
    }
}
