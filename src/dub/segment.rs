use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One timed utterance as it moves through the pipeline.
///
/// Records are produced by caption parsing, merged by [`super::merge`], then
/// replaced stage by stage: translation returns a record with
/// `translated_text` set and synthesis returns one with `dubbed_path` and
/// `for_dubbing`. The serialized form is what the job state stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dubbed_path: Option<PathBuf>,
    #[serde(default)]
    pub for_dubbing: bool,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            translated_text: None,
            dubbed_path: None,
            for_dubbing: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn with_translation(self, translated: impl Into<String>) -> Self {
        Self {
            translated_text: Some(translated.into()),
            ..self
        }
    }

    /// Caption tracks that are already in the target language are their own
    /// translation.
    pub fn pre_translated(self) -> Self {
        let translated = self.text.clone();
        self.with_translation(translated)
    }

    pub fn with_dub(self, path: impl Into<PathBuf>) -> Self {
        Self {
            dubbed_path: Some(path.into()),
            for_dubbing: true,
            ..self
        }
    }

    /// Keep the record but take it out of placement; it becomes silence.
    pub fn without_dub(self) -> Self {
        Self {
            for_dubbing: false,
            ..self
        }
    }

    /// Text handed to the speech synthesizer.
    pub fn speech_text(&self) -> &str {
        match self.translated_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.text,
        }
    }

    /// Clip eligible for placement, if any.
    pub fn placed_clip(&self) -> Option<&Path> {
        if self.for_dubbing {
            self.dubbed_path.as_deref()
        } else {
            None
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Sort by start time; synthesis finishes out of order.
pub fn sort_by_start(segments: &mut [TranscriptSegment]) {
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_transforms_keep_timing() {
        let seg = TranscriptSegment::new(1.0, 2.5, "hello there friend")
            .with_translation("hola amigo")
            .with_dub("out/segment_1_1_2.wav");
        assert_eq!(seg.start, 1.0);
        assert_eq!(seg.end, 2.5);
        assert_eq!(seg.speech_text(), "hola amigo");
        assert_eq!(seg.placed_clip(), Some(Path::new("out/segment_1_1_2.wav")));

        let dropped = seg.without_dub();
        assert_eq!(dropped.placed_clip(), None);
        assert!(dropped.dubbed_path.is_some());
    }

    #[test]
    fn speech_text_falls_back_to_source() {
        let seg = TranscriptSegment::new(0.0, 1.0, "original");
        assert_eq!(seg.speech_text(), "original");
        let blank = seg.with_translation("   ");
        assert_eq!(blank.speech_text(), "original");
    }

    #[test]
    fn deserializes_without_synthesis_fields() {
        let json = r#"{"start": 0.5, "end": 1.5, "text": "hi"}"#;
        let seg: TranscriptSegment = serde_json::from_str(json).unwrap();
        assert!(!seg.for_dubbing);
        assert!(seg.translated_text.is_none());

        let serialized = serde_json::to_value(&seg).unwrap();
        assert!(serialized.get("translated_text").is_none());
        assert_eq!(serialized["for_dubbing"], false);
    }

    #[test]
    fn sorts_by_start_time() {
        let mut segments = vec![
            TranscriptSegment::new(5.0, 6.0, "c"),
            TranscriptSegment::new(0.0, 1.0, "a"),
            TranscriptSegment::new(2.0, 3.0, "b"),
        ];
        sort_by_start(&mut segments);
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }
}
