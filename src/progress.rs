use serde::Serialize;
use tokio::sync::mpsc;

/// Progress side channel. Events drive user-facing output only and never
/// affect control flow; sends are best-effort.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    CourseResolved {
        title: String,
        lessons: usize,
        episodes: usize,
    },
    EpisodeStarted {
        lesson: String,
        episode: String,
        completed: usize,
        total: usize,
    },
    EpisodeSkipped {
        episode: String,
    },
    SegmentFinished {
        episode: String,
        done: usize,
        total: usize,
        bytes: u64,
    },
    QualityDowngraded {
        preferred: u32,
        actual: u32,
    },
    CaptionMissing {
        episode: String,
    },
    EpisodeFinished {
        episode: String,
        path: String,
    },
    EpisodeFailed {
        episode: String,
        reason: String,
    },
}

pub type ProgressSender = mpsc::Sender<ProgressEvent>;

pub async fn emit(tx: &Option<ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exp = ((bytes.ilog2()) / 10).min(UNITS.len() as u32 - 1) as usize;
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    format!("{:.2} {}", value, UNITS[exp])
}
