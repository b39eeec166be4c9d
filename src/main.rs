//! Command line sender.
//!
//! ```text
//! WEBHOOK_URL=https://discord.com/api/webhooks/... hello_webhook "deploy finished"
//! hello_webhook --file build.log "build log attached"
//! ```
//!
//! Reads `WEBHOOK_URL`, and optionally `WEBHOOK_THREAD_ID`, `WEBHOOK_USERNAME`
//! and `WEBHOOK_TIMEOUT_MS`, from the environment or a `.env` file.

use std::time::Duration;

use hello_webhook::prelude::*;
use tracing::{error, info};

struct Config {
    url: String,
    thread_id: Option<u64>,
    username: Option<String>,
    timeout: Option<Duration>,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        let url = std::env::var("WEBHOOK_URL")
            .map_err(|_| "WEBHOOK_URL environment variable not set".to_string())?;
        let thread_id = optional_env("WEBHOOK_THREAD_ID")?;
        let timeout = optional_env::<u64>("WEBHOOK_TIMEOUT_MS")?.map(Duration::from_millis);
        let username = std::env::var("WEBHOOK_USERNAME").ok();
        Ok(Self {
            url,
            thread_id,
            username,
            timeout,
        })
    }
}

fn optional_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{} is not a valid number: {:?}", name, raw)),
        _ => Ok(None),
    }
}

/// Positional words become the content; `--file <path>` adds attachments.
fn build_message(args: &[String], username: Option<&str>) -> Result<Message, String> {
    let mut builder = MessageBuilder::new();
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--file" {
            let path = iter.next().ok_or("--file needs a path")?;
            let data = std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
            let name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            builder = builder.file(name, data);
        } else {
            words.push(arg.as_str());
        }
    }
    builder = builder.content(words.join(" "));
    if let Some(username) = username {
        builder = builder.username(username);
    }
    builder.build().map_err(|e| e.to_string())
}

fn run() -> Result<(), String> {
    let config = Config::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let message = build_message(&args, config.username.as_deref())?;

    let mut builder = WebhookClientBuilder::from_url(&config.url).map_err(|e| e.to_string())?;
    if let Some(thread_id) = config.thread_id {
        builder = builder.thread_id(thread_id);
    }
    if let Some(timeout) = config.timeout {
        builder = builder.default_timeout(timeout);
    }
    let client = builder.build().map_err(|e| e.to_string())?;

    let result = client.send(&message).and_then(ResponseFuture::wait);
    client.close();

    match result.map_err(|e| e.to_string())? {
        Some(sent) => info!(message_id = sent.id, channel_id = sent.channel_id, "message delivered"),
        None => info!("message delivered"),
    }
    Ok(())
}

fn main() {
    // Initialise tracing (respects RUST_LOG env, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    if let Err(e) = run() {
        error!(error = %e, "failed to send webhook message");
        std::process::exit(1);
    }
}
