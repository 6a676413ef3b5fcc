mod common;
mod dub;
mod ui;

use clap::Parser;

use crate::dub::DubCommands;
use crate::ui::prelude::*;

/// Dub YouTube videos into another language with Gemini translation and speech
#[derive(Parser, Debug)]
#[command(name = "ytdub", author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for messages
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: DubCommands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(err) = dub::handle_dub_command(cli.command).await {
        let chain = format!("{err:#}");
        emit(
            Level::Error,
            "ytdub.error",
            &format!("Error: {chain}"),
            Some(serde_json::json!({ "error": chain })),
        );
        std::process::exit(1);
    }
}
