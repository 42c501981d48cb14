mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, Response};

#[derive(Parser)]
#[command(name = "promptdeck")]
#[command(about = "CLI for the promptdeck capture-and-dispatch daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send everything collected so far to the model
    Dispatch,
    /// Capture the secondary display and OCR it
    CaptureScreen,
    /// Capture a screen region and OCR it
    CaptureRegion {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// Start or stop a microphone session
    Mic,
    /// Add a line of text to the next prompt
    Add { text: String },
    /// Drop everything collected so far
    Clear,
    /// Set the programming language named in the prompt
    SetLanguage { language: String },
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new();

    let command = match cli.command {
        Commands::Dispatch => Command::Dispatch,
        Commands::CaptureScreen => Command::CaptureScreen,
        Commands::CaptureRegion { x, y, width, height } => {
            Command::CaptureRegion { x, y, width, height }
        }
        Commands::Mic => Command::ToggleMic,
        Commands::Add { text } => Command::Add(text),
        Commands::Clear => Command::Clear,
        Commands::SetLanguage { language } => Command::SetLanguage(language),
        Commands::Status => Command::Status,
    };

    match client.send_command(command).await {
        Ok(Response::Ok) => {
            println!("Success");
        }
        Ok(Response::Message(msg)) => {
            println!("{}", msg);
        }
        Ok(Response::Status(info)) => {
            println!("Status:");
            println!("  Recording: {}", info.is_recording);
            println!("  OCR entries: {}", info.ocr_entries);
            println!("  Mic entries: {}", info.mic_entries);
            println!("  Text entries: {}", info.text_entries);
            println!("  Language: {}", info.language);
        }
        Ok(Response::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to connect to promptdeckd: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
