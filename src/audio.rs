//! Identifies uploaded audio by running it through ffprobe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::Logger;

use crate::errors::BackendError;

pub mod format;

use format::AudioFormat;

/// What ffprobe could tell about a file.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioProbe {
    /// Candidate formats, most specific container first.
    pub formats: Vec<AudioFormat>,

    /// Length in seconds, if ffprobe reported one.
    pub duration: Option<f64>,
}

impl AudioProbe {
    /// The MIME essence of the first recognised container.
    pub fn mime_type(&self) -> Option<&'static str> {
        self.formats.iter().find_map(AudioFormat::mime_type)
    }

    /// The duration rounded to whole seconds.
    pub fn whole_seconds(&self) -> Option<i32> {
        self.duration
            .filter(|d| d.is_finite() && *d >= 0.0 && *d <= f64::from(i32::MAX))
            .map(|d| d.round() as i32)
    }
}

pub trait AudioProber {
    fn probe(&self, logger: Arc<Logger>, data: &[u8]) -> Result<AudioProbe, BackendError>;

    fn new(ffprobe_path: Option<impl AsRef<Path>>) -> Self;
}

pub fn make_wrapper(
    logger: Arc<Logger>,
    ffprobe_path: Option<PathBuf>,
) -> impl Fn(&[u8]) -> Result<AudioProbe, BackendError> {
    let prober = inner::Ffprobe::new(ffprobe_path);

    move |data: &[u8]| prober.probe(logger.clone(), data)
}

mod inner {
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};
    use std::process::Output;
    use std::sync::Arc;

    use lazy_static::lazy_static;
    use logging::{debug, Logger};
    use serde::Deserialize;

    use super::{AudioProbe, AudioProber};
    use crate::audio::format::AudioFormat;
    use crate::errors::BackendError;

    lazy_static! {
        static ref FFPROBE_ARGS: Vec<OsString> = vec![
            OsString::from("-hide_banner"),
            OsString::from("-v"),
            OsString::from("error"),
            OsString::from("-of"),
            OsString::from("json"),
            OsString::from("-show_format"),
            OsString::from("-show_entries"),
            OsString::from("stream=codec_name"),
        ];
    }

    pub struct Ffprobe {
        ffprobe: PathBuf,
    }

    #[derive(Deserialize)]
    struct FfprobeOutput {
        streams: Vec<FfprobeStream>,
        format: FfprobeFormat,
    }

    #[derive(Deserialize)]
    struct FfprobeStream {
        codec_name: String,
    }

    #[derive(Deserialize)]
    struct FfprobeFormat {
        format_name: String,
        duration: Option<String>,
    }

    impl AudioProber for Ffprobe {
        fn probe(&self, logger: Arc<Logger>, data: &[u8]) -> Result<AudioProbe, BackendError> {
            use std::io::Write;
            use std::process::Command;

            use tempfile::NamedTempFile;

            let output_path = {
                let mut output = NamedTempFile::new().map_err(BackendError::TemporaryFileError)?;
                output
                    .write_all(data)
                    .map_err(BackendError::TemporaryFileError)?;
                output.into_temp_path()
            };

            let output = Command::new(&self.ffprobe)
                .args(&[FFPROBE_ARGS.clone(), vec![OsString::from(&output_path)]].concat())
                .output()
                .map_err(BackendError::FfprobeFailed)?;

            if !output.status.success() {
                debug!(logger, "ffprobe rejected file"; "status" => %output.status, "stderr" => %String::from_utf8_lossy(&output.stderr));
            }

            check_output(&output).map(|probe| {
                debug!(logger, "Probed audio"; "formats" => ?probe.formats, "duration" => ?probe.duration);
                probe
            })
        }

        fn new(path: Option<impl AsRef<Path>>) -> Self {
            Ffprobe {
                ffprobe: path
                    .map(|p| p.as_ref().to_owned())
                    .unwrap_or_else(|| PathBuf::from("ffprobe")),
            }
        }
    }

    /// ffprobe exits unsuccessfully on input it can't demux.
    pub(super) fn check_output(output: &Output) -> Result<AudioProbe, BackendError> {
        if !output.status.success() {
            return Err(BackendError::UnrecognizedAudioFormat);
        }

        parse_output(&output.stdout)
    }

    pub(super) fn parse_output(stdout: &[u8]) -> Result<AudioProbe, BackendError> {
        let parsed: FfprobeOutput =
            serde_json::from_slice(stdout).map_err(BackendError::MalformedFfprobeOutput)?;

        let streams = parsed.streams;
        let codec = match streams.as_slice() {
            [stream] => stream.codec_name.clone(),
            _ => return Err(BackendError::TooManyStreams(1, streams.len())),
        };

        // ffprobe lists every container name the demuxer answers to
        let formats = parsed
            .format
            .format_name
            .split(',')
            .map(|container| AudioFormat::new(container.to_owned(), codec.clone()))
            .collect::<Vec<_>>();

        let duration = parsed
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok());

        Ok(AudioProbe { formats, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::inner::{check_output, parse_output};
    use super::*;

    #[test]
    fn ffprobe_output_is_parsed() {
        let stdout = br#"{
            "programs": [],
            "streams": [{ "codec_name": "aac" }],
            "format": { "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "59.712000" }
        }"#;

        let probe = parse_output(stdout).unwrap();

        assert_eq!(probe.formats.len(), 6);
        assert_eq!(probe.formats[0], AudioFormat::new("mov".to_owned(), "aac".to_owned()));
        assert_eq!(probe.mime_type(), Some("audio/mp4"));
        assert_eq!(probe.whole_seconds(), Some(60));
    }

    #[test]
    fn multiple_streams_are_rejected() {
        let stdout = br#"{
            "streams": [{ "codec_name": "opus" }, { "codec_name": "vp9" }],
            "format": { "format_name": "webm" }
        }"#;

        assert!(matches!(
            parse_output(stdout),
            Err(BackendError::TooManyStreams(1, 2))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failed_runs_are_unrecognized_audio() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::{ExitStatus, Output};

        let output = Output {
            status: ExitStatus::from_raw(1 << 8),
            stdout: b"{}".to_vec(),
            stderr: b"Invalid data found when processing input".to_vec(),
        };

        assert!(matches!(
            check_output(&output),
            Err(BackendError::UnrecognizedAudioFormat)
        ));

        let output = Output {
            status: ExitStatus::from_raw(0),
            stdout: br#"{ "streams": [{ "codec_name": "opus" }], "format": { "format_name": "ogg" } }"#.to_vec(),
            stderr: vec![],
        };

        assert_eq!(check_output(&output).unwrap().mime_type(), Some("audio/ogg"));
    }

    #[test]
    fn garbage_output_is_rejected() {
        assert!(matches!(
            parse_output(b"not json"),
            Err(BackendError::MalformedFfprobeOutput(_))
        ));
    }
}
