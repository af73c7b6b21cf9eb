use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, Time};

use crate::errors::ValidationError;
use crate::fields::AllowList;
use crate::location::Location;
use crate::tag::{FrontendTag, Tag};
use crate::user::Group;
use crate::Id;

/// Fields an uploader may set when a recording is created.
pub const RECORDING_SETTABLE_FIELDS: AllowList = AllowList::new(
    "recording creation",
    &[
        "recordingDateTime",
        "recordingTime",
        "mimeType",
        "size",
        "duration",
        "location",
        "additionalMetadata",
        "tags",
        "batteryLevel",
        "batteryCharging",
        "airplaneModeOn",
        "relativeToDawn",
        "relativeToDusk",
        "version",
    ],
);

/// Fields that may be corrected after a recording exists.
pub const RECORDING_UPDATEABLE_FIELDS: AllowList = AllowList::new(
    "recording update",
    &[
        "recordingDateTime",
        "recordingTime",
        "location",
        "additionalMetadata",
    ],
);

/// Where the audio lives in the blob store. The three values are only
/// ever written together.
#[derive(Clone, Debug, PartialEq)]
pub struct FileDescriptor {
    pub key: String,
    pub mime_type: String,
    pub size: i32,
}

/// One uploaded audio file and everything known about it.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioRecording {
    pub id: Id,
    pub device_id: Id,
    pub group_id: Option<Id>,

    pub file_key: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i32>,

    /// Length of the audio in seconds.
    pub duration: Option<i32>,
    pub recording_date_time: Option<OffsetDateTime>,

    /// Local time of day the recording started.
    pub recording_time: Option<Time>,
    pub location: Option<Location>,

    /// Battery charge at capture time; 1 is full.
    pub battery_level: Option<f64>,
    pub battery_charging: Option<String>,
    pub airplane_mode_on: Option<bool>,

    /// Whether a filter has been run over the recording.
    pub filtered: bool,
    pub filter_metadata: Option<Value>,

    /// Unset until a filter has run, and possibly afterwards if the
    /// filter could not decide.
    pub passed_filter: Option<bool>,

    pub public: bool,
    pub additional_metadata: Option<Value>,

    /// Tagging events sent by the uploader.
    pub tags: Option<Value>,

    /// Seconds from local sunrise and sunset.
    pub relative_to_dawn: Option<i32>,
    pub relative_to_dusk: Option<i32>,

    /// Version of the uploading software.
    pub version: Option<String>,

    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,

    /// The owning group, if it was loaded with the row.
    pub group: Option<Group>,

    /// The recording's tags, if they were loaded with the row.
    pub tag_records: Vec<Tag>,
}

impl AudioRecording {
    /// Projects the row into the shape sent to clients. Performs no
    /// query: associations that were not loaded come out as `null` and
    /// `[]`.
    pub fn get_frontend_fields(&self) -> FrontendRecording {
        FrontendRecording {
            id: self.id,
            recording_date_time: self.recording_date_time,
            recording_time: self.recording_time,
            duration: self.duration,
            location: self.location,
            file_key: self.file_key.clone(),
            battery_charging: self.battery_charging.clone(),
            battery_level: self.battery_level,
            airplane_mode_on: self.airplane_mode_on,
            relative_to_dawn: self.relative_to_dawn,
            relative_to_dusk: self.relative_to_dusk,
            version: self.version.clone(),
            additional_metadata: self.additional_metadata.clone(),
            device_id: self.device_id,
            group_id: self.group_id,
            group: self.group.as_ref().map(|group| group.groupname.clone()),
            tags: self
                .tag_records
                .iter()
                .map(Tag::get_frontend_fields)
                .collect(),
        }
    }

    pub fn file(&self) -> Option<FileDescriptor> {
        match (&self.file_key, &self.mime_type, self.size) {
            (Some(key), Some(mime_type), Some(size)) => Some(FileDescriptor {
                key: key.clone(),
                mime_type: mime_type.clone(),
                size,
            }),
            _ => None,
        }
    }
}

/// The client-facing shape of an [`AudioRecording`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendRecording {
    pub id: Id,
    #[serde(with = "crate::timestamps::option")]
    pub recording_date_time: Option<OffsetDateTime>,
    #[serde(with = "crate::timestamps::clock")]
    pub recording_time: Option<Time>,
    pub duration: Option<i32>,
    pub location: Option<Location>,
    pub file_key: Option<String>,
    pub battery_charging: Option<String>,
    pub battery_level: Option<f64>,
    pub airplane_mode_on: Option<bool>,
    pub relative_to_dawn: Option<i32>,
    pub relative_to_dusk: Option<i32>,
    pub version: Option<String>,
    pub additional_metadata: Option<Value>,
    pub device_id: Id,
    pub group_id: Option<Id>,
    pub group: Option<String>,
    pub tags: Vec<FrontendTag>,
}

/// The fields an uploader supplied through [`RECORDING_SETTABLE_FIELDS`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAudioRecording {
    #[serde(default, with = "crate::timestamps::option")]
    pub recording_date_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::timestamps::clock")]
    pub recording_time: Option<Time>,

    /// The content type the uploader claims; used when probing can't
    /// tell.
    pub mime_type: Option<String>,

    /// The size the uploader claims; must match the file.
    pub size: Option<i32>,
    pub duration: Option<i32>,
    pub location: Option<Location>,
    pub additional_metadata: Option<Value>,
    pub tags: Option<Value>,
    pub battery_level: Option<f64>,
    pub battery_charging: Option<String>,
    pub airplane_mode_on: Option<bool>,
    pub relative_to_dawn: Option<i32>,
    pub relative_to_dusk: Option<i32>,
    pub version: Option<String>,
}

impl NewAudioRecording {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(location) = &self.location {
            location.validate()?;
        }

        if let Some(level) = self.battery_level {
            if !(0.0..=1.0).contains(&level) {
                return Err(ValidationError::InvalidBatteryLevel(level));
            }
        }

        match self.size {
            Some(size) if size < 0 => Err(ValidationError::NegativeSize(size)),
            _ => Ok(()),
        }
    }
}

/// A correction made through [`RECORDING_UPDATEABLE_FIELDS`]. An absent
/// or null field is left alone.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordingUpdate {
    #[serde(default, with = "crate::timestamps::option")]
    pub recording_date_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::timestamps::clock")]
    pub recording_time: Option<Time>,
    pub location: Option<Location>,
    pub additional_metadata: Option<Value>,
}

impl RecordingUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.location {
            Some(location) => location.validate(),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &RecordingUpdate::default()
    }
}

/// What the filter pipeline reports for a recording. Recording it
/// marks the recording as filtered; `passed` stays unset if the filter
/// could not decide.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub passed: Option<bool>,
    pub metadata: Option<Value>,
}

#[cfg(test)]
pub(crate) fn recording_for_test(id: Id, device_id: Id) -> AudioRecording {
    let now = OffsetDateTime::from_unix_timestamp(1_600_000_000);

    AudioRecording {
        id,
        device_id,
        group_id: None,
        file_key: None,
        mime_type: None,
        size: None,
        duration: None,
        recording_date_time: None,
        recording_time: None,
        location: None,
        battery_level: None,
        battery_charging: None,
        airplane_mode_on: None,
        filtered: false,
        filter_metadata: None,
        passed_filter: None,
        public: false,
        additional_metadata: None,
        tags: None,
        relative_to_dawn: None,
        relative_to_dusk: None,
        version: None,
        created_at: now,
        updated_at: now,
        group: None,
        tag_records: vec![],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::errors::BackendError;

    #[test]
    fn unloaded_associations_project_to_null_and_empty() {
        let recording = recording_for_test(1, 2);
        let fields = serde_json::to_value(recording.get_frontend_fields()).unwrap();

        assert_eq!(fields["group"], json!(null));
        assert_eq!(fields["tags"], json!([]));
        assert_eq!(fields["deviceId"], json!(2));
    }

    #[test]
    fn frontend_fields_have_a_fixed_shape() {
        let recording = AudioRecording {
            group_id: Some(3),
            group: Some(Group {
                id: 3,
                groupname: "wetlands".to_owned(),
            }),
            file_key: Some("f2b8".to_owned()),
            mime_type: Some("audio/mp4".to_owned()),
            size: Some(1024),
            duration: Some(60),
            recording_date_time: Some(OffsetDateTime::from_unix_timestamp(1_600_000_100)),
            recording_time: Some(Time::try_from_hms(5, 30, 0).unwrap()),
            location: Some(Location::new(-41.0, 174.0).unwrap()),
            battery_level: Some(0.5),
            battery_charging: Some("DISCHARGING".to_owned()),
            airplane_mode_on: Some(false),
            filtered: true,
            passed_filter: Some(true),
            relative_to_dawn: Some(-600),
            relative_to_dusk: Some(40000),
            version: Some("1.2".to_owned()),
            additional_metadata: Some(json!({ "mic": "internal" })),
            tag_records: vec![Tag {
                id: 8,
                recording_id: 1,
                animal: Some("kiwi".to_owned()),
                confidence: None,
                start_time: None,
                duration: None,
                event: None,
                automatic: true,
                tagger_id: None,
                created_at: OffsetDateTime::from_unix_timestamp(1_600_000_200),
            }],
            ..recording_for_test(1, 2)
        };

        assert_eq!(
            serde_json::to_value(recording.get_frontend_fields()).unwrap(),
            json!({
                "id": 1,
                "recordingDateTime": 1_600_000_100,
                "recordingTime": "05:30:00",
                "duration": 60,
                "location": { "type": "Point", "coordinates": [-41.0, 174.0] },
                "fileKey": "f2b8",
                "batteryCharging": "DISCHARGING",
                "batteryLevel": 0.5,
                "airplaneModeOn": false,
                "relativeToDawn": -600,
                "relativeToDusk": 40000,
                "version": "1.2",
                "additionalMetadata": { "mic": "internal" },
                "deviceId": 2,
                "groupId": 3,
                "group": "wetlands",
                "tags": [{
                    "id": 8,
                    "animal": "kiwi",
                    "confidence": null,
                    "startTime": null,
                    "duration": null,
                    "event": null,
                    "automatic": true,
                    "taggerId": null,
                    "createdAt": 1_600_000_200,
                }],
            })
        );
    }

    #[test]
    fn file_descriptor_needs_all_three_values() {
        let mut recording = recording_for_test(1, 2);
        recording.file_key = Some("key".to_owned());
        recording.size = Some(3);
        assert_eq!(recording.file(), None);

        recording.mime_type = Some("audio/ogg".to_owned());
        assert_eq!(
            recording.file(),
            Some(FileDescriptor {
                key: "key".to_owned(),
                mime_type: "audio/ogg".to_owned(),
                size: 3,
            })
        );
    }

    #[test]
    fn update_list_is_narrower_than_creation_list() {
        assert!(RECORDING_UPDATEABLE_FIELDS.is_subset_of(&RECORDING_SETTABLE_FIELDS));
        assert!(!RECORDING_SETTABLE_FIELDS.is_subset_of(&RECORDING_UPDATEABLE_FIELDS));
    }

    #[test]
    fn updates_reject_fields_outside_the_list() {
        let update: RecordingUpdate = RECORDING_UPDATEABLE_FIELDS
            .assign(json!({
                "recordingDateTime": 1_600_000_000,
                "recordingTime": "23:59:59",
                "location": [1.0, 2.0],
                "additionalMetadata": { "note": "fixed clock" },
            }))
            .unwrap();
        assert_eq!(update.recording_time, Some(Time::try_from_hms(23, 59, 59).unwrap()));
        assert!(!update.is_empty());

        for field in &[
            "batteryLevel",
            "duration",
            "fileKey",
            "mimeType",
            "size",
            "public",
            "passedFilter",
            "deviceId",
        ] {
            let mut object = serde_json::Map::new();
            object.insert((*field).to_owned(), json!(1));

            match RECORDING_UPDATEABLE_FIELDS.assign::<RecordingUpdate>(object.into()) {
                Err(BackendError::FieldNotAllowed { field: rejected, .. }) => {
                    assert_eq!(rejected.as_str(), *field)
                }
                other => panic!("{} must be rejected, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn unrepresentable_recording_times_are_malformed() {
        assert!(matches!(
            RECORDING_UPDATEABLE_FIELDS.assign::<RecordingUpdate>(json!({ "recordingDateTime": i64::MAX })),
            Err(BackendError::MalformedFields(_))
        ));
        assert!(matches!(
            RECORDING_SETTABLE_FIELDS.assign::<NewAudioRecording>(json!({ "recordingDateTime": i64::MIN })),
            Err(BackendError::MalformedFields(_))
        ));
    }

    #[test]
    fn creation_fields_are_parsed_and_validated() {
        let new: NewAudioRecording = RECORDING_SETTABLE_FIELDS
            .assign(json!({
                "duration": 30,
                "location": "[95, 0]",
                "batteryLevel": 0.7,
                "tags": [{ "event": "start" }],
                "relativeToDawn": -30,
            }))
            .unwrap();

        assert_eq!(new.validate(), Err(ValidationError::InvalidLatitude(95.0)));

        let new = NewAudioRecording {
            location: None,
            battery_level: Some(1.5),
            ..new
        };
        assert_eq!(new.validate(), Err(ValidationError::InvalidBatteryLevel(1.5)));
    }

    #[test]
    fn creation_rejects_server_owned_fields() {
        for field in &["fileKey", "filtered", "passedFilter", "filterMetadata", "public"] {
            let mut object = serde_json::Map::new();
            object.insert((*field).to_owned(), json!(null));

            assert!(matches!(
                RECORDING_SETTABLE_FIELDS.assign::<NewAudioRecording>(object.into()),
                Err(BackendError::FieldNotAllowed { .. })
            ));
        }
    }
}
