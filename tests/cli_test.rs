mod common;
mod utils;

use anyhow::Result;
use common::TestEnvironment;

#[test]
fn segments_merges_json3_captions() -> Result<()> {
    let env = TestEnvironment::new()?;
    let captions = TestEnvironment::fixture("lecture.en-US.json3");

    let output = utils::run_ytdub_command(
        &env,
        &["--output", "json", "segments", captions.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 0, "segments failed: {}", output.stderr);

    let events = utils::json_events(&output.stdout)?;
    let event = events
        .iter()
        .find(|event| event["code"] == "dub.segments")
        .expect("segments event");
    assert_eq!(event["data"]["fragments"], 3);

    let segments = event["data"]["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["start"], 0.5);
    assert_eq!(segments[0]["end"], 7.0);
    assert_eq!(
        segments[0]["text"],
        "Welcome back to the workshop.\n(pause for 1 seconds)\nToday we are building a canoe."
    );
    assert_eq!(segments[1]["start"], 30.0);
    Ok(())
}

#[test]
fn segments_threshold_flag_controls_merging() -> Result<()> {
    let env = TestEnvironment::new()?;
    let captions = TestEnvironment::fixture("lecture.srt");

    let output = utils::run_ytdub_command(
        &env,
        &[
            "--output",
            "json",
            "segments",
            captions.to_str().unwrap(),
            "--threshold",
            "0.5",
        ],
    )?;
    assert_eq!(output.exit_code, 0, "segments failed: {}", output.stderr);

    let events = utils::json_events(&output.stdout)?;
    let event = events
        .iter()
        .find(|event| event["code"] == "dub.segments")
        .expect("segments event");
    assert_eq!(event["data"]["segments"].as_array().unwrap().len(), 3);
    Ok(())
}

#[test]
fn segments_text_output_lists_timestamps() -> Result<()> {
    let env = TestEnvironment::new()?;
    let captions = TestEnvironment::fixture("lecture.srt");

    let output = utils::run_ytdub_command(
        &env,
        &["--no-color", "segments", captions.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 0, "segments failed: {}", output.stderr);
    assert!(output.stdout.contains("[00:00:00.500 --> 00:00:07.000]"));
    assert!(output.stdout.contains("3 fragments merged into 2 segments"));
    Ok(())
}

#[test]
fn voices_lists_prebuilt_voices() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = utils::run_ytdub_command(&env, &["--output", "json", "voices"])?;
    assert_eq!(output.exit_code, 0, "voices failed: {}", output.stderr);

    let events = utils::json_events(&output.stdout)?;
    assert_eq!(events.len(), 30);
    assert!(events.iter().any(|event| event["data"]["name"] == "Charon"));
    Ok(())
}

#[test]
fn missing_caption_file_exits_with_error() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = utils::run_ytdub_command(
        &env,
        &["segments", "does-not-exist.srt", "--threshold", "3.5"],
    )?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("does-not-exist.srt"));
    Ok(())
}

#[test]
fn run_without_api_keys_fails_before_downloading() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = utils::run_ytdub_command(
        &env,
        &[
            "run",
            "--youtube-id",
            "abc123",
            "--target-language",
            "es-ES",
        ],
    )?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("api_keys"), "stderr: {}", output.stderr);
    assert!(!env.path().join("output").exists());
    Ok(())
}
