//! Text-to-speech through the Gemini speech models.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{GeminiClient, GeminiError, GenerateRequest, GenerationConfig, SpeechConfig};
use crate::dub::credentials::CredentialPool;
use crate::dub::retry::RetryPolicy;
use crate::dub::support::ffmpeg::{
    FfmpegRunOptions, FfmpegRunner, audio_duration_seconds, trim_trailing_silence_args,
};
use crate::dub::support::retry_once;
use crate::ui::prelude::{Level, emit};

pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const TEMPERATURE: f32 = 1.0;
const DEFAULT_BITS_PER_SAMPLE: u16 = 16;
const DEFAULT_SAMPLE_RATE: u32 = 24_000;

const STYLE_INSTRUCTION: &str = "<style-instruction>\n\
The following is a dub of a documentary.\n\
Take pauses and intonate accordingly.\n\
Read aloud in a calm, soothing, enthusiastic tone like David Attenborough:\n\
</style-instruction>";

#[derive(Debug, Clone, Copy)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice: &'a str,
    pub target_language: &'a str,
    pub output: &'a Path,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write speech for `request.text` to `request.output` and return the path.
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

/// Read sample width and rate from a mime type like `audio/L16;codec=pcm;rate=24000`.
pub fn parse_audio_mime(mime_type: &str) -> PcmFormat {
    let mut format = PcmFormat {
        bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
        sample_rate: DEFAULT_SAMPLE_RATE,
    };
    for param in mime_type.split(';').map(str::trim) {
        if let Some(rate) = param
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("rate="))
            .and_then(|_| param[5..].parse().ok())
        {
            format.sample_rate = rate;
        } else if let Some(bits) = param
            .strip_prefix("audio/L")
            .and_then(|bits| bits.parse().ok())
        {
            format.bits_per_sample = bits;
        }
    }
    format
}

pub fn write_pcm_wav(path: &Path, pcm: &[u8], format: PcmFormat) -> Result<()> {
    if format.bits_per_sample != 16 {
        anyhow::bail!(
            "unsupported PCM sample width: {} bits",
            format.bits_per_sample
        );
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for pair in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))
}

fn speech_prompt(text: &str) -> String {
    format!("{STYLE_INSTRUCTION}\n{text}")
}

pub struct GeminiSpeech {
    client: GeminiClient,
    credentials: Arc<CredentialPool>,
    model: String,
    retry: RetryPolicy,
    ffmpeg: Arc<dyn FfmpegRunner>,
}

impl GeminiSpeech {
    pub fn new(
        client: GeminiClient,
        credentials: Arc<CredentialPool>,
        model: impl Into<String>,
        retry: RetryPolicy,
        ffmpeg: Arc<dyn FfmpegRunner>,
    ) -> Self {
        Self {
            client,
            credentials,
            model: model.into(),
            retry,
            ffmpeg,
        }
    }

    async fn fetch_audio(&self, text: &str, voice: &str) -> Result<(Vec<u8>, PcmFormat), GeminiError> {
        let lease = self.credentials.checkout();
        let request = GenerateRequest::user_prompt(
            speech_prompt(text),
            GenerationConfig {
                temperature: TEMPERATURE,
                response_modalities: Some(vec!["AUDIO"]),
                speech_config: Some(SpeechConfig::prebuilt(voice)),
            },
        );
        emit(
            Level::Debug,
            "dub.speech.request",
            &format!("Requesting speech from {} with key #{}", self.model, lease.slot() + 1),
            None,
        );
        let response = self.client.generate(lease.key(), &self.model, &request).await?;

        let mut pcm = Vec::new();
        let mut format = None;
        for inline in response.inline_data() {
            let bytes = STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|err| GeminiError::Audio(err.to_string()))?;
            format.get_or_insert_with(|| parse_audio_mime(&inline.mime_type));
            pcm.extend_from_slice(&bytes);
        }

        match format {
            Some(format) if !pcm.is_empty() => Ok((pcm, format)),
            _ => Err(GeminiError::EmptyResponse("audio")),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<PathBuf> {
        let (pcm, format) = self
            .retry
            .run("speech synthesis", |_| self.fetch_audio(request.text, request.voice))
            .await
            .with_context(|| {
                format!(
                    "Failed to synthesize {} speech for {}",
                    request.target_language,
                    request.output.display()
                )
            })?;

        let output = request.output.to_path_buf();
        let runner = Arc::clone(&self.ffmpeg);
        tokio::task::spawn_blocking(move || finish_clip(runner.as_ref(), &pcm, format, &output))
            .await
            .context("Speech post-processing task panicked")?
    }
}

/// Encode and trim in a temporary file next to `output`, then move it into
/// place. `output` only ever appears complete; on error nothing is left behind.
fn finish_clip(
    runner: &dyn FfmpegRunner,
    pcm: &[u8],
    format: PcmFormat,
    output: &Path,
) -> Result<PathBuf> {
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".partial_")
        .suffix(".wav")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create a temporary clip in {}", dir.display()))?
        .into_temp_path();

    retry_once("writing synthesized audio", || {
        write_pcm_wav(&staging, pcm, format)
    })?;
    trim_trailing_silence(runner, &staging);
    staging
        .persist(output)
        .with_context(|| format!("Failed to move clip into {}", output.display()))?;
    Ok(output.to_path_buf())
}

/// Trim in place. A failed trim keeps the untrimmed clip.
fn trim_trailing_silence(runner: &dyn FfmpegRunner, clip: &Path) {
    let trimmed = clip.with_extension("trimmed.wav");
    let before = audio_duration_seconds(clip).ok();

    let result = runner
        .run(
            &trim_trailing_silence_args(clip, &trimmed),
            FfmpegRunOptions::default(),
        )
        .and_then(|()| {
            fs::rename(&trimmed, clip)
                .with_context(|| format!("Failed to replace {}", clip.display()))
        });

    match result {
        Ok(()) => {
            let after = audio_duration_seconds(clip).ok();
            if let (Some(before), Some(after)) = (before, after)
                && (before - after).abs() > f64::EPSILON
            {
                emit(
                    Level::Debug,
                    "dub.speech.trimmed",
                    &format!(
                        "{} shortened from {before:.2}s to {after:.2}s",
                        clip.display()
                    ),
                    None,
                );
            }
        }
        Err(err) => {
            let _ = fs::remove_file(&trimmed);
            emit(
                Level::Warn,
                "dub.speech.trim_failed",
                &format!("Keeping untrimmed {}: {err:#}", clip.display()),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRunner;

    impl FfmpegRunner for FailingRunner {
        fn run(&self, _args: &[String], _options: FfmpegRunOptions) -> Result<()> {
            anyhow::bail!("ffmpeg unavailable")
        }
    }

    struct CopyingRunner;

    impl FfmpegRunner for CopyingRunner {
        fn run(&self, args: &[String], _options: FfmpegRunOptions) -> Result<()> {
            fs::copy(&args[2], &args[5])?;
            Ok(())
        }
    }

    #[test]
    fn mime_parameters_are_parsed() {
        assert_eq!(
            parse_audio_mime("audio/L16;codec=pcm;rate=24000"),
            PcmFormat {
                bits_per_sample: 16,
                sample_rate: 24_000
            }
        );
        assert_eq!(
            parse_audio_mime("audio/L24; rate=48000"),
            PcmFormat {
                bits_per_sample: 24,
                sample_rate: 48_000
            }
        );
    }

    #[test]
    fn malformed_mime_falls_back_to_defaults() {
        assert_eq!(
            parse_audio_mime("audio/pcm;rate=fast"),
            PcmFormat {
                bits_per_sample: 16,
                sample_rate: 24_000
            }
        );
    }

    #[test]
    fn pcm_is_written_as_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment_1_0_1.wav");
        let pcm: Vec<u8> = [1i16, -2, 300].iter().flat_map(|s| s.to_le_bytes()).collect();
        write_pcm_wav(
            &path,
            &pcm,
            PcmFormat {
                bits_per_sample: 16,
                sample_rate: 24_000,
            },
        )
        .unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 24_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 300]);
    }

    #[test]
    fn unsupported_width_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let format = PcmFormat {
            bits_per_sample: 24,
            sample_rate: 24_000,
        };
        assert!(write_pcm_wav(&dir.path().join("x.wav"), &[0; 6], format).is_err());
    }

    #[test]
    fn failed_trim_keeps_the_clip() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.wav");
        fs::write(&clip, b"audio").unwrap();
        trim_trailing_silence(&FailingRunner, &clip);
        assert_eq!(fs::read(&clip).unwrap(), b"audio");
        assert!(!dir.path().join("clip.trimmed.wav").exists());
    }

    #[test]
    fn successful_trim_replaces_the_clip() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.wav");
        fs::write(&clip, b"audio").unwrap();
        trim_trailing_silence(&CopyingRunner, &clip);
        assert!(clip.exists());
        assert!(!dir.path().join("clip.trimmed.wav").exists());
    }

    fn pcm_format() -> PcmFormat {
        PcmFormat {
            bits_per_sample: 16,
            sample_rate: 24_000,
        }
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".partial_"))
            .collect()
    }

    #[test]
    fn finished_clip_appears_only_at_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("segment_1_0_1.wav");
        let pcm: Vec<u8> = [5i16, 6, 7].iter().flat_map(|s| s.to_le_bytes()).collect();

        let path = finish_clip(&CopyingRunner, &pcm, pcm_format(), &output).unwrap();

        assert_eq!(path, output);
        let samples: Vec<i16> = hound::WavReader::open(&output)
            .unwrap()
            .into_samples()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![5, 6, 7]);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn failed_encode_leaves_no_clip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("segment_1_0_1.wav");
        let format = PcmFormat {
            bits_per_sample: 24,
            sample_rate: 24_000,
        };

        assert!(finish_clip(&CopyingRunner, &[0; 6], format, &output).is_err());
        assert!(!output.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn failed_trim_still_publishes_the_clip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("segment_2_3_4.wav");
        let pcm: Vec<u8> = [1i16, 2].iter().flat_map(|s| s.to_le_bytes()).collect();

        finish_clip(&FailingRunner, &pcm, pcm_format(), &output).unwrap();
        assert!(hound::WavReader::open(&output).is_ok());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn prompt_carries_style_and_text() {
        let prompt = speech_prompt("Hola a todos");
        assert!(prompt.starts_with("<style-instruction>"));
        assert!(prompt.ends_with("</style-instruction>\nHola a todos"));
    }
}
