use std::{path::PathBuf, process::Stdio, time::Duration};

use clap::Parser;
use serde::Serialize;
use tokio::process::Command;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct PushArgs {
    /// Video file to stream
    #[clap(default_value = "videos/video.mp4")]
    video: PathBuf,

    /// Address the server's transcoder listens on
    #[clap(long, default_value = "rtmp://localhost:1935/live/app")]
    ingest_url: String,

    /// Metadata endpoint of the server
    #[clap(long, default_value = "http://localhost:8080/metadata")]
    metadata_url: String,

    /// Path of the ffmpeg executable, looked up in PATH if not set
    #[clap(long)]
    ffmpeg: Option<PathBuf>,

    /// Interval between two metadata messages, in milliseconds
    #[clap(long, default_value = "500")]
    interval_ms: u64,

    /// Number of metadata messages to send at most
    #[clap(long, default_value = "99")]
    count: u32,
}

#[derive(Debug, Serialize)]
struct MetadataRequest {
    metadata: String,
    time: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = PushArgs::parse();
    let ffmpeg = match args.ffmpeg {
        Some(ffmpeg) => ffmpeg,
        None => which::which("ffmpeg")?,
    };

    let mut child = Command::new(&ffmpeg)
        .arg("-re")
        .arg("-i")
        .arg(&args.video)
        .args(["-c:v", "libx264", "-preset", "veryfast"])
        .args(["-maxrate", "3000k", "-bufsize", "6000k"])
        .args(["-pix_fmt", "yuv420p", "-g", "12"])
        .args(["-c:a", "aac", "-b:a", "128k"])
        .args(["-f", "flv"])
        .arg(&args.ingest_url)
        .stdin(Stdio::null())
        .spawn()?;
    tracing::info!("Pushing {} to {}", args.video.display(), args.ingest_url);

    let client = reqwest::Client::new();
    let interval = Duration::from_millis(args.interval_ms);
    for counter in 1..=args.count {
        if child.try_wait()?.is_some() {
            break;
        }

        let metadata = format!("message {counter}");
        let result = client
            .post(&args.metadata_url)
            .json(&MetadataRequest {
                metadata: metadata.clone(),
                time: counter,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => tracing::info!("Sent: {metadata}"),
            Err(e) => tracing::warn!("Failed to send {metadata}: {e}"),
        }

        tokio::time::sleep(interval).await;
    }

    let status = child.wait().await?;
    tracing::info!("ffmpeg exited with {status}");

    Ok(())
}
