use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::ValidationError;
use crate::Id;

/// An annotation on a recording, such as an animal heard at some
/// offset into the audio.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub recording_id: Id,

    /// What was heard.
    pub animal: Option<String>,

    /// How sure the tagger is, between 0 and 1.
    pub confidence: Option<f64>,

    /// Seconds from the start of the recording.
    pub start_time: Option<f64>,

    /// Length in seconds.
    pub duration: Option<f64>,

    pub event: Option<String>,

    /// Whether a classifier rather than a person created the tag.
    pub automatic: bool,

    pub tagger_id: Option<Id>,

    pub created_at: OffsetDateTime,
}

/// The client-facing shape of a [`Tag`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendTag {
    pub id: Id,
    pub animal: Option<String>,
    pub confidence: Option<f64>,
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub event: Option<String>,
    pub automatic: bool,
    pub tagger_id: Option<Id>,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl Tag {
    pub fn get_frontend_fields(&self) -> FrontendTag {
        FrontendTag {
            id: self.id,
            animal: self.animal.clone(),
            confidence: self.confidence,
            start_time: self.start_time,
            duration: self.duration,
            event: self.event.clone(),
            automatic: self.automatic,
            tagger_id: self.tagger_id,
            created_at: self.created_at,
        }
    }
}

/// A tag as submitted by a client.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTag {
    pub animal: Option<String>,
    pub confidence: Option<f64>,
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub event: Option<String>,
    #[serde(default)]
    pub automatic: bool,
}

impl NewTag {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.confidence {
            Some(c) if !(0.0..=1.0).contains(&c) => Err(ValidationError::InvalidConfidence(c)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frontend_fields_are_camel_cased() {
        let tag = Tag {
            id: 5,
            recording_id: 9,
            animal: Some("morepork".to_owned()),
            confidence: Some(0.8),
            start_time: Some(12.5),
            duration: Some(2.0),
            event: None,
            automatic: false,
            tagger_id: Some(3),
            created_at: OffsetDateTime::from_unix_timestamp(1_600_000_000),
        };

        assert_eq!(
            serde_json::to_value(tag.get_frontend_fields()).unwrap(),
            json!({
                "id": 5,
                "animal": "morepork",
                "confidence": 0.8,
                "startTime": 12.5,
                "duration": 2.0,
                "event": null,
                "automatic": false,
                "taggerId": 3,
                "createdAt": 1_600_000_000,
            })
        );
    }

    #[test]
    fn confidence_must_be_a_fraction() {
        let tag = NewTag {
            confidence: Some(1.5),
            ..NewTag::default()
        };

        assert_eq!(tag.validate(), Err(ValidationError::InvalidConfidence(1.5)));
        assert_eq!(NewTag::default().validate(), Ok(()));
    }
}
