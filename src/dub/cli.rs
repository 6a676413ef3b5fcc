use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum DubCommands {
    /// Download, translate and dub a YouTube video
    Run(RunArgs),
    /// Parse a caption file and print the merged dubbing segments
    Segments(SegmentsArgs),
    /// List the prebuilt speech voices
    Voices,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// YouTube video id (the `v=` parameter)
    #[arg(long = "youtube-id")]
    pub youtube_id: String,

    /// Language to dub into, e.g. es-ES
    #[arg(long = "target-language")]
    pub target_language: String,

    /// Language spoken in the video (defaults to the configured source language)
    #[arg(long = "source-language")]
    pub source_language: Option<String>,

    /// Working directory for downloads, clips and outputs
    #[arg(long = "output-directory", default_value = "output/", value_hint = ValueHint::DirPath)]
    pub output_directory: String,

    /// Prebuilt voice for the dub (see `ytdub voices`)
    #[arg(long)]
    pub voice: Option<String>,

    /// Gemini API keys; overrides the configured keys
    #[arg(long = "api-keys", num_args = 1..)]
    pub api_keys: Vec<String>,

    /// Rename the final video (extension is replaced with .mp4)
    #[arg(long)]
    pub name: Option<String>,

    /// Move the final video into this directory
    #[arg(long = "move-directory", value_hint = ValueHint::DirPath)]
    pub move_directory: Option<String>,

    /// Delete segment clips and the vocals track when done
    #[arg(long)]
    pub cleanup: bool,

    /// Speech synthesis requests in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct SegmentsArgs {
    /// Caption file (YouTube json3 or SRT)
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Merge fragments separated by at most this many seconds
    #[arg(long)]
    pub threshold: Option<f64>,
}
