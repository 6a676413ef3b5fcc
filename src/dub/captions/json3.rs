use anyhow::{Context, Result};
use serde::Deserialize;

use super::fragment_from_cue;
use crate::dub::segment::TranscriptSegment;

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    // window/style events carry no segs
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse YouTube's json3 timed-text format.
pub fn parse_json3(input: &str) -> Result<Vec<TranscriptSegment>> {
    let document: Json3Document =
        serde_json::from_str(input).context("Caption file is not valid json3")?;

    let fragments = document
        .events
        .into_iter()
        .filter_map(|event| {
            let segs = event.segs?;
            let text: String = segs.iter().map(|seg| seg.utf8.as_str()).collect();
            let start = event.t_start_ms as f64 / 1000.0;
            let end = (event.t_start_ms + event.d_duration_ms) as f64 / 1000.0;
            fragment_from_cue(start, end, &text)
        })
        .collect();

    Ok(fragments)
}
