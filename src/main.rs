use clap::{Parser, Subcommand};
use mediagrab::downloader::progress::{ProgressCallback, ProgressUpdate};
use mediagrab::{classify, Pipeline, PipelineConfig, PipelineError, ProcessOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Requester id used for the single local user of the CLI
const LOCAL_REQUESTER: i64 = 0;

#[derive(Debug, Parser)]
#[command(name = "mediagrab", version, about = "Download and normalize media from social links")]
struct Cli {
    /// JSON config file; environment variables are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Proxy for every outbound request (http, https or socks5 URL)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Show the browser window while scraping
    #[arg(long, global = true)]
    headful: bool,

    /// Slots for concurrent external tool runs
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a link
    Get {
        url: String,
        /// Quality such as `720`, `1280x720` or `mp3`; omit to list choices
        #[arg(long, short)]
        quality: Option<String>,
        /// Merge multi-item posts into one video
        #[arg(long)]
        merge: bool,
        /// Skip the quality choice and take the best available
        #[arg(long, conflicts_with = "quality")]
        best: bool,
    },
    /// Show external tool availability
    Tools,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tokio::select! {
        result = run(cli) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "Request failed");
                eprintln!("{}", err.user_message());
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            std::process::exit(130);
        }
    }
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?.apply_env(|key| std::env::var(key).ok())?,
        None => PipelineConfig::from_env()?,
    };
    if cli.headful {
        config = config.with_headless(false);
    }
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy);
    }
    if let Some(workers) = cli.workers {
        config = config.with_worker_threads(workers);
    }
    let pipeline = Pipeline::from_config(config)?;

    match cli.command {
        Command::Tools => {
            print_json(&pipeline.tool_status().await);
        }
        Command::Get {
            url,
            quality,
            merge,
            best,
        } => {
            let swept = pipeline.sweep_stale_scratch(Duration::from_secs(3600)).await;
            if swept > 0 {
                tracing::info!(count = swept, "Removed stale scratch directories");
            }

            let options = ProcessOptions { merge };
            let progress: ProgressCallback = Arc::new(|update: ProgressUpdate| match update.percent() {
                Some(pct) => eprintln!("{:>5.1}%", pct),
                None => eprintln!("{} bytes", update.bytes_downloaded),
            });

            let _sweeper = pipeline.spawn_maintenance(Duration::from_secs(60));
            let request = classify(&url)?;
            let output = if best || (quality.is_none() && !request.platform.has_quality_selection()) {
                pipeline.process(&url, None, options, Some(progress)).await?
            } else {
                let proposal = pipeline.propose_quality(&url, LOCAL_REQUESTER).await?;
                let Some(choice) = quality else {
                    print_json(&proposal);
                    return Ok(());
                };
                pipeline
                    .process_token(&proposal.token, LOCAL_REQUESTER, &choice, options, Some(progress))
                    .await?
            };
            print_json(&output);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => tracing::error!(error = %err, "Failed to serialize output"),
    }
}
