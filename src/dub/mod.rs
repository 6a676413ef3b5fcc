//! YouTube dubbing: captions in, dubbed video out.

pub mod assemble;
pub mod captions;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod download;
pub mod finalize;
pub mod gemini;
pub mod merge;
pub mod pipeline;
pub mod retry;
pub mod segment;
pub mod state;
pub mod support;
pub mod synthesis;
pub mod transcribe;

pub use cli::DubCommands;
pub use commands::handle_dub_command;
