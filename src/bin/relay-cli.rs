use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Command-line client for the progress relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3004")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status and subscriber count
    Health,
    /// Submit a processing request and wait for the result
    Process {
        /// JSON value sent as the `posts` field
        #[arg(short, long, default_value = "[]")]
        posts: String,
    },
    /// Print progress events as they arrive
    Watch {
        /// Stop after this many events
        #[arg(short, long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Process { posts } => {
            let posts: Value = serde_json::from_str(&posts)?;
            let res = reqwest::Client::new()
                .post(format!("{}/process", cli.url))
                .json(&json!({ "posts": posts }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Watch { count } => {
            watch(&cli.url, count).await?;
        }
    }

    Ok(())
}

async fn watch(url: &str, count: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut res = reqwest::Client::new()
        .get(format!("{url}/stream"))
        .send()
        .await?;
    if !res.status().is_success() {
        eprintln!("Error: stream returned status {}", res.status());
        return Ok(());
    }

    let mut frames = FrameBuffer::default();
    let mut seen = 0usize;
    while let Some(chunk) = res.chunk().await? {
        frames.extend(&chunk);
        while let Some(frame) = frames.next_frame() {
            for data in frame? {
                println!("{data}");
                seen += 1;
            }
            if count.is_some_and(|limit| seen >= limit) {
                return Ok(());
            }
        }
    }

    eprintln!("Stream closed by server");
    Ok(())
}

/// Splits an SSE byte stream into frames.
///
/// Bytes are decoded only once a whole frame has arrived, since a network
/// chunk may end inside a multi-byte character.
#[derive(Default)]
struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// `data:` lines of the next complete frame.
    fn next_frame(&mut self) -> Option<Result<Vec<String>, std::str::Utf8Error>> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(std::str::from_utf8(&frame).map(|text| {
            text.lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|data| data.trim_start().to_string())
                .collect()
        }))
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
