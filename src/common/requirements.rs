//! External program requirements.
//!
//! The pipeline shells out to a handful of media tools; this module verifies
//! they resolve on `PATH` before any long-running work starts.

use anyhow::{Result, bail};

/// Tests for determining whether a dependency is available on the system.
#[derive(Debug, Clone, Copy)]
pub enum InstallTest {
    /// Succeeds when `which <program>` resolves.
    WhichSucceeds(&'static str),
}

impl InstallTest {
    pub fn run(self) -> bool {
        match self {
            InstallTest::WhichSucceeds(program) => which::which(program).is_ok(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequiredTool {
    pub name: &'static str,
    pub purpose: &'static str,
    pub test: InstallTest,
}

impl RequiredTool {
    pub const fn program(name: &'static str, purpose: &'static str) -> Self {
        Self {
            name,
            purpose,
            test: InstallTest::WhichSucceeds(name),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.test.run()
    }
}

pub const FFMPEG: RequiredTool = RequiredTool::program("ffmpeg", "audio mixing and muxing");
pub const FFPROBE: RequiredTool = RequiredTool::program("ffprobe", "media duration probing");
pub const YT_DLP: RequiredTool = RequiredTool::program("yt-dlp", "video and caption download");
pub const UVX: RequiredTool = RequiredTool::program("uvx", "WhisperX transcription");

/// Fail with a single message naming every missing tool.
pub fn ensure_tools(tools: &[RequiredTool]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| !tool.is_installed())
        .map(|tool| format!("{} ({})", tool.name, tool.purpose))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required programs: {}", missing.join(", "));
    }
    Ok(())
}
