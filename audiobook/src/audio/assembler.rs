//! Audio file assembly.
//!
//! Segment PCM is concatenated natively; `.wav` output is written directly and
//! other formats are transcoded from the combined WAV with FFmpeg.
//!
//! The result is written to a staging file beside the output and renamed into
//! place only once it is complete. A file already at the output path is left
//! untouched when assembly fails or is cancelled.

use speech_client::wav::{self, PcmFormat, WavError, WavInfo};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;

use super::metadata::{build_chapter_info, create_ffmpeg_metadata};
use super::{AudiobookOutput, BookMetadata};
use crate::tts::AudioSegment;

/// Default encoder bitrate for transcoded outputs.
pub const DEFAULT_BITRATE: &str = "128k";

/// Allowed gap between the probed output duration and the segment sum.
const DURATION_TOLERANCE_MS: f64 = 50.0;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no audio segments to assemble")]
    NoSegments,

    #[error("segment {index} is not valid audio: {source}")]
    InvalidSegment {
        index: usize,
        #[source]
        source: WavError,
    },

    #[error("segment {index} has format {found:?}, expected {expected:?}")]
    FormatMismatch {
        index: usize,
        expected: PcmFormat,
        found: PcmFormat,
    },

    #[error("combined audio is too large for a WAV file ({bytes} bytes)")]
    TooLarge { bytes: u64 },

    #[error("unsupported output format '{}' (use .mp3, .m4b, .m4a or .wav)", .0.display())]
    UnsupportedOutput(PathBuf),

    #[error("{0} not found; install FFmpeg or set {0}_path in the config")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {message}")]
    EncoderFailed { tool: &'static str, message: String },

    #[error("I/O error during assembly: {0}")]
    Io(#[from] std::io::Error),
}

/// Container chosen from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    Mp3,
    /// AAC in MP4, for `.m4b` and `.m4a`
    M4b,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, AssemblyError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("wav") => Ok(Self::Wav),
            Some("mp3") => Ok(Self::Mp3),
            Some("m4b") | Some("m4a") => Ok(Self::M4b),
            _ => Err(AssemblyError::UnsupportedOutput(path.to_path_buf())),
        }
    }

    pub fn needs_ffmpeg(&self) -> bool {
        !matches!(self, Self::Wav)
    }
}

/// Find a tool at its configured path, or on `PATH`.
fn locate_tool(configured: Option<&Path>, name: &'static str) -> Result<PathBuf, AssemblyError> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => {
            log::warn!("Configured {} at {} does not exist", name, path.display());
            Err(AssemblyError::ToolNotFound(name))
        }
        None => which::which(name).map_err(|_| AssemblyError::ToolNotFound(name)),
    }
}

/// Parse every segment and check they share one PCM layout.
fn inspect_segments(segments: &[AudioSegment]) -> Result<(PcmFormat, Vec<WavInfo>), AssemblyError> {
    let mut infos = Vec::with_capacity(segments.len());
    let mut expected = None;

    for segment in segments {
        let info = wav::parse_wav(&segment.data).map_err(|source| AssemblyError::InvalidSegment {
            index: segment.index,
            source,
        })?;

        match expected {
            None => expected = Some(info.format),
            Some(format) if format != info.format => {
                return Err(AssemblyError::FormatMismatch {
                    index: segment.index,
                    expected: format,
                    found: info.format,
                });
            }
            Some(_) => {}
        }
        infos.push(info);
    }

    expected
        .map(|format| (format, infos))
        .ok_or(AssemblyError::NoSegments)
}

/// Stream all segment samples, in order, into one WAV file.
fn write_combined_wav(
    path: &Path,
    format: PcmFormat,
    segments: &[AudioSegment],
    infos: &[WavInfo],
) -> Result<(), AssemblyError> {
    let data_len: u64 = infos.iter().map(|info| info.data_len() as u64).sum();
    if data_len > u64::from(u32::MAX - 36) {
        return Err(AssemblyError::TooLarge { bytes: data_len });
    }

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&wav::wav_header(format, data_len as u32))?;
    for (segment, info) in segments.iter().zip(infos) {
        out.write_all(&segment.data[info.data.clone()])?;
    }
    out.flush()?;
    Ok(())
}

/// Empty file in the output's directory, deleted on drop unless persisted.
fn staging_file(output: &Path) -> Result<NamedTempFile, AssemblyError> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut builder = tempfile::Builder::new();
    builder.prefix(".audiobook-partial-").suffix(&suffix);
    // Temp files default to owner-only; the output should not
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    Ok(builder.tempfile_in(dir)?)
}

/// Get duration of an audio file in milliseconds using ffprobe.
pub async fn probe_duration_ms(ffprobe: &Path, audio_path: &Path) -> Result<f64, AssemblyError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(audio_path)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(AssemblyError::EncoderFailed {
            tool: "ffprobe",
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 =
        duration_str
            .trim()
            .parse()
            .map_err(|_| AssemblyError::EncoderFailed {
                tool: "ffprobe",
                message: format!("unexpected duration '{}'", duration_str.trim()),
            })?;

    Ok(duration_secs * 1000.0)
}

/// Joins audio segments into the final file.
#[derive(Debug, Clone)]
pub struct Assembler {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    bitrate: String,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE)
    }
}

impl Assembler {
    pub fn new(bitrate: impl Into<String>) -> Self {
        Self {
            ffmpeg: None,
            ffprobe: None,
            bitrate: bitrate.into(),
        }
    }

    /// Use a specific ffmpeg binary instead of searching `PATH`.
    pub fn with_ffmpeg(mut self, path: Option<PathBuf>) -> Self {
        self.ffmpeg = path;
        self
    }

    /// Use a specific ffprobe binary instead of searching `PATH`.
    pub fn with_ffprobe(mut self, path: Option<PathBuf>) -> Self {
        self.ffprobe = path;
        self
    }

    /// Concatenate `segments` (already in chunk order) into `output`.
    ///
    /// `chapters` holds (title, first segment index) per chapter and becomes
    /// chapter markers in transcoded outputs. Scratch files go to
    /// `scratch_dir`. On failure, or if the future is dropped, `output` is
    /// unchanged.
    pub async fn assemble(
        &self,
        segments: &[AudioSegment],
        chapters: &[(String, usize)],
        book: &BookMetadata,
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<AudiobookOutput, AssemblyError> {
        let format = OutputFormat::from_path(output)?;
        if segments.is_empty() {
            return Err(AssemblyError::NoSegments);
        }
        let (pcm_format, infos) = inspect_segments(segments)?;
        let durations: Vec<f64> = infos.iter().map(WavInfo::duration_ms).collect();
        let total_ms: f64 = durations.iter().sum();

        let ffmpeg = if format.needs_ffmpeg() {
            Some(locate_tool(self.ffmpeg.as_deref(), "ffmpeg")?)
        } else {
            None
        };

        log::debug!(
            "Assembling {} segments ({:.0} ms, {:?}) into {}",
            segments.len(),
            total_ms,
            pcm_format,
            output.display()
        );

        let staged = staging_file(output)?;
        match &ffmpeg {
            None => write_combined_wav(staged.path(), pcm_format, segments, &infos)?,
            Some(ffmpeg) => {
                let request = TranscodeInput {
                    format,
                    pcm_format,
                    segments,
                    infos: &infos,
                    durations: &durations,
                    chapters,
                    book,
                    scratch_dir,
                };
                self.transcode(ffmpeg, &request, staged.path()).await?
            }
        }

        let size_bytes = std::fs::metadata(staged.path())?.len();
        staged
            .persist(output)
            .map_err(|e| AssemblyError::Io(e.error))?;

        if format.needs_ffmpeg() {
            self.verify_duration(output, total_ms).await;
        }

        Ok(AudiobookOutput {
            path: output.to_path_buf(),
            duration_ms: total_ms.round() as u64,
            size_bytes,
            chunk_count: segments.len(),
            chapter_count: chapters.len(),
        })
    }

    async fn transcode(
        &self,
        ffmpeg: &Path,
        input: &TranscodeInput<'_>,
        output: &Path,
    ) -> Result<(), AssemblyError> {
        let combined = input.scratch_dir.join("combined.wav");
        write_combined_wav(&combined, input.pcm_format, input.segments, input.infos)?;

        let markers = build_chapter_info(input.durations, input.chapters);
        let metadata_path = input.scratch_dir.join("metadata.txt");
        create_ffmpeg_metadata(input.book, &markers, &metadata_path)?;

        let args = self.transcode_args(input.format, &combined, &metadata_path, output);
        log::debug!("Running {} {:?}", ffmpeg.display(), args);

        let result = Command::new(ffmpeg)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AssemblyError::EncoderFailed {
                tool: "ffmpeg",
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    fn transcode_args(
        &self,
        format: OutputFormat,
        combined: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        let bitrate = self.bitrate.as_str();
        let codec: Vec<&str> = match format {
            OutputFormat::Mp3 => vec![
                "-c:a",
                "libmp3lame",
                "-b:a",
                bitrate,
                "-ar",
                "44100",
                "-ac",
                "2",
                "-id3v2_version",
                "3",
                "-f",
                "mp3",
            ],
            OutputFormat::M4b | OutputFormat::Wav => vec!["-c:a", "aac", "-b:a", bitrate, "-f", "mp4"],
        };

        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            combined.into(),
            "-i".into(),
            metadata.into(),
        ];
        args.extend(
            ["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"]
                .iter()
                .chain(codec.iter())
                .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    async fn verify_duration(&self, output: &Path, expected_ms: f64) {
        let ffprobe = match locate_tool(self.ffprobe.as_deref(), "ffprobe") {
            Ok(path) => path,
            Err(_) => {
                log::debug!("ffprobe not found; skipping duration check");
                return;
            }
        };

        match probe_duration_ms(&ffprobe, output).await {
            Ok(actual) => {
                let deviation = (actual - expected_ms).abs();
                if deviation > DURATION_TOLERANCE_MS {
                    log::warn!(
                        "Output duration {:.0} ms differs from segment total {:.0} ms by {:.0} ms",
                        actual,
                        expected_ms,
                        deviation
                    );
                } else {
                    log::debug!("Output duration {:.0} ms verified", actual);
                }
            }
            Err(e) => log::warn!("Could not probe output duration: {}", e),
        }
    }
}

struct TranscodeInput<'a> {
    format: OutputFormat,
    pcm_format: PcmFormat,
    segments: &'a [AudioSegment],
    infos: &'a [WavInfo],
    durations: &'a [f64],
    chapters: &'a [(String, usize)],
    book: &'a BookMetadata,
    scratch_dir: &'a Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn segment(index: usize, chapter: u32, duration_ms: u64) -> AudioSegment {
        AudioSegment {
            index,
            chapter,
            data: wav::silence(PcmFormat::default(), duration_ms),
        }
    }

    fn book() -> BookMetadata {
        BookMetadata::new("Test Book", "Test Author")
    }

    fn chapters() -> Vec<(String, usize)> {
        vec![("Chapter 1".to_string(), 0), ("Chapter 2".to_string(), 2)]
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("a.wav")).unwrap(), OutputFormat::Wav);
        assert_eq!(OutputFormat::from_path(Path::new("a.MP3")).unwrap(), OutputFormat::Mp3);
        assert_eq!(OutputFormat::from_path(Path::new("a.m4b")).unwrap(), OutputFormat::M4b);
        assert_eq!(OutputFormat::from_path(Path::new("a.m4a")).unwrap(), OutputFormat::M4b);
        assert!(matches!(
            OutputFormat::from_path(Path::new("a.ogg")),
            Err(AssemblyError::UnsupportedOutput(_))
        ));
        assert!(OutputFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_mp3_transcode_args() {
        let assembler = Assembler::new("96k");
        let args = assembler.transcode_args(
            OutputFormat::Mp3,
            Path::new("/tmp/combined.wav"),
            Path::new("/tmp/metadata.txt"),
            Path::new("/out/book.mp3"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");

        assert!(joined.contains("-i /tmp/combined.wav -i /tmp/metadata.txt"));
        assert!(joined.contains("-map_metadata 1"));
        assert!(joined.contains("-c:a libmp3lame -b:a 96k -ar 44100 -ac 2"));
        assert_eq!(args.last().map(String::as_str), Some("/out/book.mp3"));
    }

    #[test]
    fn test_m4b_transcode_args() {
        let assembler = Assembler::default();
        let args = assembler.transcode_args(
            OutputFormat::M4b,
            Path::new("c.wav"),
            Path::new("m.txt"),
            Path::new("book.m4b"),
        );
        let joined: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(joined.join(" ").contains("-c:a aac -b:a 128k -f mp4"));
    }

    #[tokio::test]
    async fn test_assemble_wav_sums_durations() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.wav");
        let segments = vec![segment(0, 1, 100), segment(1, 1, 200), segment(2, 2, 300)];

        let result = Assembler::default()
            .assemble(&segments, &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap();

        assert_eq!(result.duration_ms, 600);
        assert_eq!(result.chunk_count, 3);
        assert_eq!(result.chapter_count, 2);

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(result.size_bytes, bytes.len() as u64);
        let info = wav::parse_wav(&bytes).unwrap();
        assert_eq!(info.format, PcmFormat::default());
        assert!((info.duration_ms() - 600.0).abs() < 50.0);
    }

    fn leftover_staging_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".audiobook-partial-"))
            .count()
    }

    #[tokio::test]
    async fn test_assemble_wav_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.wav");
        std::fs::write(&output, b"old audiobook").unwrap();

        Assembler::default()
            .assemble(&[segment(0, 1, 100)], &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert!(wav::parse_wav(&bytes).is_ok());
        assert_eq!(leftover_staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_assemble_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.wav");
        let err = Assembler::default()
            .assemble(&[], &[], &book(), dir.path(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::NoSegments));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_assemble_rejects_corrupt_segment() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.wav");
        let segments = vec![
            segment(0, 1, 100),
            AudioSegment {
                index: 1,
                chapter: 1,
                data: b"not audio at all".to_vec(),
            },
        ];

        let err = Assembler::default()
            .assemble(&segments, &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidSegment { index: 1, .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_assemble_rejects_mismatched_formats() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.wav");
        let stereo = PcmFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        };
        let segments = vec![
            segment(0, 1, 100),
            AudioSegment {
                index: 1,
                chapter: 1,
                data: wav::silence(stereo, 100),
            },
        ];

        let err = Assembler::default()
            .assemble(&segments, &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::FormatMismatch { index: 1, .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_reported() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.mp3");
        let assembler =
            Assembler::default().with_ffmpeg(Some(dir.path().join("no-such-ffmpeg")));

        let err = assembler
            .assemble(&[segment(0, 1, 100)], &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::ToolNotFound("ffmpeg")));
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_failure_removes_partial_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &fake,
            "#!/bin/sh\nfor last; do :; done\necho partial > \"$last\"\necho 'encoder exploded' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("book.m4b");
        let err = Assembler::default()
            .with_ffmpeg(Some(fake))
            .assemble(&[segment(0, 1, 100)], &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap_err();

        match err {
            AssemblyError::EncoderFailed { tool, message } => {
                assert_eq!(tool, "ffmpeg");
                assert!(message.contains("encoder exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
        assert_eq!(leftover_staging_files(dir.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_failure_keeps_existing_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake-ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\necho 'bad codec' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("book.m4b");
        std::fs::write(&output, b"previous audiobook").unwrap();

        let err = Assembler::default()
            .with_ffmpeg(Some(fake))
            .assemble(&[segment(0, 1, 100)], &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::EncoderFailed { tool: "ffmpeg", .. }));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous audiobook");
        assert_eq!(leftover_staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_assemble_m4b_with_system_ffmpeg() {
        // Only meaningful where FFmpeg is installed
        if which::which("ffmpeg").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("book.m4b");
        let segments = vec![segment(0, 1, 400), segment(1, 1, 300), segment(2, 2, 300)];

        let result = Assembler::default()
            .assemble(&segments, &chapters(), &book(), dir.path(), &output)
            .await
            .unwrap();

        assert_eq!(result.duration_ms, 1000);
        assert!(result.size_bytes > 0);
        assert!(output.exists());
    }
}
