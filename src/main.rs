use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use femget::client::HttpFetcher;
use femget::config::{self, DownloadConfig, RetryPolicy};
use femget::mux::FfmpegMuxer;
use femget::progress::{format_bytes, ProgressEvent};
use femget::quality;
use femget::{Container, CourseDownloader, Endpoints};

#[derive(Parser, Debug)]
#[command(name = "femget", version, about = "Download a course as muxed video files")]
struct Args {
    /// Course URL (https://frontendmasters.com/courses/...) or bare slug
    course: String,

    /// Value of the wordpress_logged_in_* session cookie
    #[arg(long, env = "FEMGET_TOKEN", hide_env_values = true)]
    token: String,

    /// Preferred stream quality
    #[arg(long, default_value_t = 1080, value_parser = parse_height)]
    quality: u32,

    /// Output container format (mp4 or mkv)
    #[arg(long, default_value = "mp4")]
    format: Container,

    /// Embed subtitle tracks when captions exist
    #[arg(long)]
    captions: bool,

    /// Download directory (defaults to ~/Downloads)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Retry attempts per request
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Delay between retries, in milliseconds
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Hand ffmpeg the authenticated playlist URL instead of downloading
    /// segments first (no segment-level resume)
    #[arg(long)]
    direct: bool,
}

fn parse_height(s: &str) -> Result<u32, String> {
    let heights = quality::ladder_heights();
    let value: u32 = s.parse().map_err(|_| format!("not a number: {s}"))?;
    if heights.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "unsupported quality {value}p (choose from {})",
            heights
                .iter()
                .map(|h| format!("{h}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

fn spawn_progress_ui(mut rx: mpsc::Receiver<ProgressEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {wide_msg}")
                .expect("static template"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        let mut total = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::CourseResolved {
                    title,
                    lessons,
                    episodes,
                } => {
                    total = episodes;
                    bar.set_message(format!(
                        "{title}: {lessons} lessons, {episodes} episodes"
                    ));
                }
                ProgressEvent::EpisodeStarted {
                    lesson,
                    episode,
                    completed,
                    ..
                } => {
                    bar.set_message(format!(
                        "[{}/{}] {lesson} / {episode}",
                        completed + 1,
                        total
                    ));
                }
                ProgressEvent::SegmentFinished {
                    episode,
                    done,
                    total: segments,
                    bytes,
                } => {
                    bar.set_message(format!(
                        "{episode} | chunks {done}/{segments} | {}",
                        format_bytes(bytes)
                    ));
                }
                ProgressEvent::QualityDowngraded { preferred, actual } => {
                    bar.println(format!(
                        "preferred quality {preferred}p not found, downgraded to {actual}p"
                    ));
                }
                ProgressEvent::EpisodeSkipped { episode } => {
                    bar.println(format!("already downloaded: {episode}"));
                }
                ProgressEvent::CaptionMissing { episode } => {
                    bar.println(format!("no captions for: {episode}"));
                }
                ProgressEvent::EpisodeFinished { episode, .. } => {
                    bar.println(format!("finished: {episode}"));
                }
                ProgressEvent::EpisodeFailed { episode, reason } => {
                    bar.println(format!("failed: {episode} ({reason})"));
                }
            }
        }
        bar.finish_and_clear();
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("femget=warn")),
        )
        .init();

    let args = Args::parse();

    let course_slug = config::parse_course_slug(&args.course)
        .with_context(|| format!("unrecognized course URL or slug: {}", args.course))?;

    let output_dir = match args.output {
        Some(dir) => dir,
        None => dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .context("no download directory; pass --output")?,
    };

    let config = DownloadConfig {
        course_slug,
        token: args.token,
        preferred_height: args.quality,
        container: args.format,
        include_captions: args.captions,
        output_dir,
        direct: args.direct,
        endpoints: Endpoints::default(),
        retry: RetryPolicy {
            attempts: args.retries.max(1),
            delay: Duration::from_millis(args.retry_delay_ms),
        },
    };

    let muxer = FfmpegMuxer::default();
    if !muxer.is_available().await {
        anyhow::bail!("ffmpeg not found on PATH; install it first");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    let fetch = HttpFetcher::new(&config)?;
    let (tx, rx) = mpsc::channel(256);
    let ui = spawn_progress_ui(rx);

    let downloader = CourseDownloader::new(&fetch, &muxer, &config, cancel, Some(tx));
    let result = downloader.run().await;
    drop(downloader); // releases the progress sender so the UI task ends
    ui.await.ok();

    match result {
        Ok(summary) => {
            println!(
                "done: {} downloaded, {} skipped, {} failed",
                summary.completed, summary.skipped, summary.failed
            );
            if summary.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
