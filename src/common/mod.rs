pub mod config;
pub mod paths;
pub mod progress;
pub mod requirements;
