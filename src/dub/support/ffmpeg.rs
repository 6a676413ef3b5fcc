use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::prelude::{Level, emit};
use crate::ui::{OutputFormat, get_output_format};

pub trait FfmpegRunner: Send + Sync {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFfmpegRunner;

#[derive(Debug, Clone, Default)]
pub struct FfmpegRunOptions {
    pub total_duration: Option<f64>,
    pub verbose: bool,
    pub message: Option<String>,
}

impl FfmpegRunOptions {
    pub fn new(total_duration: Option<f64>, verbose: bool) -> Self {
        Self {
            total_duration,
            verbose,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl FfmpegRunner for SystemFfmpegRunner {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()> {
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        let stderr = child
            .stderr
            .take()
            .context("Failed to capture ffmpeg stderr")?;

        let pb = options
            .total_duration
            .map(|duration| progress_bar(duration, options.message.as_deref()));

        let mut last_line = String::new();
        let mut error_lines: Vec<String> = Vec::new();
        let result = read_ffmpeg_stderr(
            stderr,
            options.verbose,
            &pb,
            &mut last_line,
            &mut error_lines,
        );

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        result?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if !status.success() {
            let error_msg = if !error_lines.is_empty() {
                error_lines.join("\n")
            } else {
                last_line
            };
            bail!(
                "ffmpeg exited with status {:?}: {}",
                status.code(),
                error_msg.trim()
            );
        }

        Ok(())
    }
}

fn progress_bar(duration: f64, message: Option<&str>) -> ProgressBar {
    if matches!(get_output_format(), OutputFormat::Json) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new((duration * 1000.0) as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message.unwrap_or("rendering").to_string());
    pb
}

fn read_ffmpeg_stderr<R: Read>(
    mut stderr: R,
    verbose: bool,
    pb: &Option<ProgressBar>,
    last_line: &mut String,
    error_lines: &mut Vec<String>,
) -> Result<()> {
    let mut buffer = [0u8; 4096];
    let mut accumulated = String::new();

    loop {
        let bytes_read = stderr
            .read(&mut buffer)
            .context("Failed to read ffmpeg stderr")?;
        if bytes_read == 0 {
            break;
        }

        accumulated.push_str(&String::from_utf8_lossy(&buffer[..bytes_read]));

        while let Some(pos) = accumulated.find(['\r', '\n']) {
            let line = accumulated[..pos].to_string();
            accumulated.drain(..=pos);

            if line.is_empty() {
                continue;
            }

            if verbose {
                eprintln!("{line}");
            }

            if line.to_lowercase().contains("error") {
                error_lines.push(line.clone());
            }

            if let Some(pb) = pb
                && let Some(progress) = parse_ffmpeg_progress(&line)
            {
                pb.set_position((progress * 1000.0) as u64);
            }

            *last_line = line;
        }
    }

    Ok(())
}

fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let time_start = line.find("time=")?;
    let time_str = &line[time_start + 5..];
    let time_end = time_str.find(' ')?;
    parse_time_to_seconds(&time_str[..time_end])
}

fn parse_time_to_seconds(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

pub fn probe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    duration_str
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse ffprobe duration for {}", path.display()))
}

/// WAV files are measured from their header; anything else goes to ffprobe.
pub fn audio_duration_seconds(path: &Path) -> Result<f64> {
    if is_wav(path)
        && let Ok(reader) = hound::WavReader::open(path)
    {
        let spec = reader.spec();
        return Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate));
    }
    probe_duration_seconds(path)
}

pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

/// Decode any audio file to mono signed 16-bit samples at `sample_rate`.
pub fn decode_to_pcm(path: &Path, sample_rate: u32) -> Result<Vec<i16>> {
    let rate = sample_rate.to_string();
    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            rate.as_str(),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run ffmpeg to decode {}", path.display()))?;

    if !output.status.success() {
        bail!(
            "ffmpeg failed to decode {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output
        .stdout
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn format_time(value: f64) -> String {
    format!("{value:.6}")
}

/// Strip silence from the tail by reversing, trimming the head, and reversing back.
pub fn trim_trailing_silence_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-af".into(),
        "areverse,silenceremove=start_periods=1:start_silence=0.1:start_threshold=-50dB,areverse"
            .into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Append `pad_seconds` of stereo silence to `audio`, encoding to AAC.
pub fn pad_audio_args(audio: &Path, pad_seconds: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!(
            "anullsrc=channel_layout=stereo:sample_rate=44100:duration={}",
            format_time(pad_seconds)
        ),
        "-filter_complex".into(),
        "[0:a][1:a]concat=n=2:v=0:a=1".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Replace the video's audio with `audio`, copying the video stream untouched.
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-shortest".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-threads".into(),
        "0".into(),
        output.to_string_lossy().into_owned(),
    ]
}

pub const PADDED_AUDIO_FILE: &str = "temp_padded_audio.aac";

/// ffmpeg invocations that put `audio` under `video`: a padding pass when the
/// audio ends before the video, then the mux itself.
pub fn mux_commands(
    video: &Path,
    audio: &Path,
    output: &Path,
    video_seconds: f64,
    audio_seconds: f64,
) -> Vec<Vec<String>> {
    if audio_seconds < video_seconds {
        let padded = output.with_file_name(PADDED_AUDIO_FILE);
        vec![
            pad_audio_args(audio, video_seconds - audio_seconds, &padded),
            mux_args(video, &padded, output),
        ]
    } else {
        vec![mux_args(video, audio, output)]
    }
}

/// Replace the soundtrack of `video` with `audio`, writing `output`.
pub fn combine_audio_video(
    runner: &dyn FfmpegRunner,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Result<PathBuf> {
    let video_seconds = probe_duration_seconds(video)?;
    let audio_seconds = probe_duration_seconds(audio)?;
    if audio_seconds < video_seconds {
        emit(
            Level::Info,
            "dub.mux.padding",
            &format!(
                "Audio is {:.2}s shorter than video, padding with silence",
                video_seconds - audio_seconds
            ),
            None,
        );
    }

    let padded = output.with_file_name(PADDED_AUDIO_FILE);
    let commands = mux_commands(video, audio, output, video_seconds, audio_seconds);
    let result = commands.iter().try_for_each(|args| {
        runner.run(
            args,
            FfmpegRunOptions::new(Some(video_seconds), false).with_message("muxing"),
        )
    });
    if padded.exists() {
        let _ = std::fs::remove_file(&padded);
    }
    result.with_context(|| format!("Failed to render {}", output.display()))?;

    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_time() {
        let line = "size=    1024kB time=00:01:02.50 bitrate= 128.0kbits/s speed=2.1x";
        assert_eq!(parse_ffmpeg_progress(line), Some(62.5));
        assert_eq!(parse_ffmpeg_progress("Input #0, wav"), None);
    }

    #[test]
    fn stderr_reader_collects_errors_and_last_line() {
        let stderr = b"line one\rError opening input\nfinal line\n".as_slice();
        let mut last = String::new();
        let mut errors = Vec::new();
        read_ffmpeg_stderr(stderr, false, &None, &mut last, &mut errors).unwrap();
        assert_eq!(last, "final line");
        assert_eq!(errors, vec!["Error opening input".to_string()]);
    }

    #[test]
    fn mux_maps_video_from_first_input_and_audio_from_second() {
        let args = mux_args(
            Path::new("video.mp4"),
            Path::new("final.mp3"),
            Path::new("dubbed_video_es_es.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -i video.mp4 -i final.mp3"));
        assert!(joined.contains("-map 0:v:0 -map 1:a:0 -c:v copy -c:a aac -b:a 192k -shortest"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("dubbed_video_es_es.mp4"));
    }

    #[test]
    fn pad_appends_silence_of_requested_length() {
        let args = pad_audio_args(
            Path::new("final.mp3"),
            2.5,
            &PathBuf::from("out/temp_padded_audio.aac"),
        );
        assert!(args.contains(
            &"anullsrc=channel_layout=stereo:sample_rate=44100:duration=2.500000".to_string()
        ));
        assert!(args.contains(&"[0:a][1:a]concat=n=2:v=0:a=1".to_string()));
    }

    #[test]
    fn short_audio_is_padded_before_muxing() {
        let commands = mux_commands(
            Path::new("out/video.mp4"),
            Path::new("out/dubbed_audio_es_es.mp3"),
            Path::new("out/dubbed_video_es_es.mp4"),
            100.0,
            97.5,
        );
        assert_eq!(commands.len(), 2);
        assert!(commands[0].iter().any(|arg| arg.ends_with("duration=2.500000")));
        assert_eq!(commands[0].last().map(String::as_str), Some("out/temp_padded_audio.aac"));
        assert_eq!(commands[1][4], "out/temp_padded_audio.aac");
    }

    #[test]
    fn long_audio_is_muxed_directly() {
        let commands = mux_commands(
            Path::new("video.mp4"),
            Path::new("audio.mp3"),
            Path::new("out.mp4"),
            100.0,
            120.0,
        );
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0][4], "audio.mp3");
    }

    #[test]
    fn silence_trim_reverses_around_silenceremove() {
        let args = trim_trailing_silence_args(Path::new("in.wav"), Path::new("out.wav"));
        let filter = &args[4];
        assert!(filter.starts_with("areverse,silenceremove"));
        assert!(filter.ends_with(",areverse"));
    }

    #[test]
    fn wav_duration_comes_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..12_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!((audio_duration_seconds(&path).unwrap() - 1.5).abs() < 1e-9);
    }
}
