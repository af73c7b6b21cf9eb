use std::fmt;
use std::str::FromStr;

const DELIMITER: char = '/';

/// A container and codec pair as reported by ffprobe.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFormat {
    pub container: String,
    pub codec: String,
}

impl AudioFormat {
    pub fn new(container: String, codec: String) -> Self {
        AudioFormat { container, codec }
    }

    /// The MIME essence to store the file under, if the container is
    /// one we serve.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self.container.as_str() {
            "ogg" => Some("audio/ogg"),
            "mp3" => Some("audio/mpeg"),
            "wav" => Some("audio/wav"),
            "flac" => Some("audio/flac"),
            "aac" => Some("audio/aac"),
            "mov" | "mp4" | "m4a" => Some("audio/mp4"),
            "webm" | "matroska" => Some("audio/webm"),
            _ => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.container, DELIMITER, self.codec)
    }
}

impl FromStr for AudioFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(DELIMITER);

        match (parts.next(), parts.next(), parts.next()) {
            (Some(format), Some(codec), None) => {
                Ok(AudioFormat::new(format.to_owned(), codec.to_owned()))
            }
            _ => Err(ParseError),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_and_display() {
        let format: AudioFormat = "ogg/opus".parse().unwrap();

        assert_eq!(format, AudioFormat::new("ogg".to_owned(), "opus".to_owned()));
        assert_eq!(format.to_string(), "ogg/opus");
        assert_eq!("ogg".parse::<AudioFormat>(), Err(ParseError));
        assert_eq!("a/b/c".parse::<AudioFormat>(), Err(ParseError));
    }

    #[test]
    fn known_containers_have_mime_types() {
        let mime = |container: &str| {
            AudioFormat::new(container.to_owned(), "x".to_owned()).mime_type()
        };

        assert_eq!(mime("mp4"), Some("audio/mp4"));
        assert_eq!(mime("ogg"), Some("audio/ogg"));
        assert_eq!(mime("avi"), None);
    }
}
