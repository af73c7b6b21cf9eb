use rusoto_core::RusotoError;
use rusoto_s3::{DeleteObjectError, GetObjectError, PutObjectError};
use thiserror::Error;

use crate::Id;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// A value failed validation before it reached the database.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("devicename {0:?} already exists in database")]
    DevicenameTaken(String),

    #[error("no device with ID {0}")]
    NonExistentDevice(Id),

    #[error("no group with ID {0}")]
    NonExistentGroup(Id),

    #[error("no recording with ID {0}")]
    NonExistentRecording(Id),

    #[error("recording {0} has no file attached")]
    NoFileAttached(Id),

    #[error("not permitted to modify recording {0}")]
    Forbidden(Id),

    /// A write named a field outside the applicable allow-list.
    #[error("field {field:?} may not be set by {operation}")]
    FieldNotAllowed {
        field: String,
        operation: &'static str,
    },

    #[error("fields must be given as a JSON object")]
    FieldsNotAnObject,

    #[error("could not parse fields")]
    MalformedFields(#[source] serde_json::Error),

    #[error("could not hash or verify password")]
    PasswordHashing { source: argon2::password_hash::Error },

    #[error("blocking task failed")]
    BlockingTaskFailed(#[source] tokio::task::JoinError),

    #[error("declared size {declared} does not match uploaded size {actual}")]
    SizeMismatch { declared: i32, actual: usize },

    #[error("file of {0} bytes is too large")]
    FileTooLarge(usize),

    #[error("could not create temporary file")]
    TemporaryFileError(#[source] std::io::Error),

    #[error("could not run ffprobe")]
    FfprobeFailed(#[source] std::io::Error),

    #[error("could not parse ffprobe output")]
    MalformedFfprobeOutput(#[source] serde_json::Error),

    #[error("expected {0} audio stream(s), found {1}")]
    TooManyStreams(usize, usize),

    #[error("unrecognized audio format")]
    UnrecognizedAudioFormat,

    #[error("could not upload file")]
    UploadFailed { source: RusotoError<PutObjectError> },

    #[error("could not retrieve file")]
    RetrieveFailed { source: RusotoError<GetObjectError> },

    #[error("could not read file body")]
    ReadFailed(#[source] std::io::Error),

    #[error("could not delete file")]
    DeleteFailed { source: RusotoError<DeleteObjectError> },

    #[error("no file with key {0} in store")]
    FileNotFound(String),
}

/// Describes why a value was rejected before persistence.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    #[error("could not parse location: {0}")]
    MalformedLocation(String),

    #[error("battery level {0} is outside [0, 1]")]
    InvalidBatteryLevel(f64),

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("devicename must not be blank")]
    BlankDevicename,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("size {0} must not be negative")]
    NegativeSize(i32),
}
