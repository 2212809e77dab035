use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("course catalog is malformed: {0}")]
    MalformedCatalog(String),

    #[error("course \"{slug}\" was not found")]
    CourseNotFound { slug: String },

    #[error("no compatible stream quality (preferred {preferred}) in playlist {url}")]
    NoCompatibleQuality { url: String, preferred: String },

    #[error("no quality tier is configured for {0}p")]
    UnknownQuality(u32),

    #[error("transfer failed for {url}{}", status_suffix(*last_status))]
    TransferFailed {
        url: String,
        last_status: Option<u16>,
    },

    #[error("muxer failed while producing {}: {detail}", output.display())]
    MuxFailure { output: PathBuf, detail: String },

    #[error("unsupported container format \"{0}\" (expected mp4 or mkv)")]
    UnsupportedContainer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("download cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error terminates the whole run. Non-fatal errors abort
    /// only the current episode; prior episodes' output stays valid and the
    /// run can be re-invoked to resume.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedCatalog(_)
                | Error::CourseNotFound { .. }
                | Error::NoCompatibleQuality { .. }
                | Error::UnknownQuality(_)
                | Error::UnsupportedContainer(_)
                | Error::InvalidConfig(_)
                | Error::Cancelled
        )
    }
}

fn status_suffix(status: Option<u16>) -> String {
    match status {
        Some(code) => format!(" (last status: HTTP {code})"),
        None => String::new(),
    }
}
