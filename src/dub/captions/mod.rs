//! Caption files to raw timed fragments.

mod json3;
mod srt;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;

use super::segment::TranscriptSegment;

pub use json3::parse_json3;
pub use srt::parse_srt;

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\[.*?\]").expect("valid bracket regex");
    static ref PARENTHESIZED: Regex = Regex::new(r"\(.*?\)").expect("valid parenthesis regex");
}

/// Drop sound-effect and speaker annotations such as `[Music]` or `(laughs)`.
pub fn strip_annotations(text: &str) -> String {
    let without_brackets = BRACKETED.replace_all(text, "");
    PARENTHESIZED
        .replace_all(&without_brackets, "")
        .trim()
        .to_string()
}

/// Build a fragment from a cue, or `None` when nothing speakable remains.
pub(crate) fn fragment_from_cue(start: f64, end: f64, raw_text: &str) -> Option<TranscriptSegment> {
    let text = strip_annotations(raw_text);
    if text.is_empty() {
        return None;
    }
    Some(TranscriptSegment::new(start, end, text))
}

/// Parse a caption file by extension: `.srt` as SubRip, anything else as
/// YouTube json3 (what the downloader stores as `subtitles/<lang>.json`).
pub fn parse_caption_file(path: &Path) -> Result<Vec<TranscriptSegment>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read caption file {}", path.display()))?;

    let is_srt = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"));

    if is_srt {
        parse_srt(&contents).with_context(|| format!("Failed to parse SRT {}", path.display()))
    } else {
        parse_json3(&contents)
            .with_context(|| format!("Failed to parse json3 captions {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_brackets_and_parentheses() {
        assert_eq!(strip_annotations("[Music] hello (laughs) there"), "hello  there");
        assert_eq!(strip_annotations("[Applause]"), "");
        assert_eq!(strip_annotations("(sighs) [Music]"), "");
    }

    #[test]
    fn annotation_only_cues_are_dropped() {
        assert!(fragment_from_cue(0.0, 1.0, "[Music]").is_none());
        let kept = fragment_from_cue(0.0, 1.0, "[Music] we begin").unwrap();
        assert_eq!(kept.text, "we begin");
    }

    #[test]
    fn dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let srt_path = dir.path().join("captions.srt");
        fs::write(
            &srt_path,
            "1\n00:00:01,000 --> 00:00:02,500\nHello there\n",
        )
        .unwrap();
        let srt = parse_caption_file(&srt_path).unwrap();
        assert_eq!(srt.len(), 1);
        assert_eq!(srt[0].start, 1.0);

        let json_path = dir.path().join("en-US.json");
        fs::write(
            &json_path,
            r#"{"events":[{"tStartMs":500,"dDurationMs":1500,"segs":[{"utf8":"Hi all"}]}]}"#,
        )
        .unwrap();
        let json = parse_caption_file(&json_path).unwrap();
        assert_eq!(json.len(), 1);
        assert_eq!(json[0].end, 2.0);
    }
}
