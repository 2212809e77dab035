use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// The provider pins the login cookie name to a fixed instance hash.
pub const SESSION_COOKIE: &str = "wordpress_logged_in_323a64690667409e18476e5932ed231e";

static COURSE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?frontendmasters\.com/courses/([^/?#]+)").unwrap()
});

/// Extracts the course slug from a full course URL, or passes a bare slug
/// through unchanged.
pub fn parse_course_slug(input: &str) -> Option<String> {
    if let Some(caps) = COURSE_URL_RE.captures(input) {
        return Some(caps[1].to_string());
    }
    let trimmed = input.trim().trim_matches('/');
    if !trimmed.is_empty() && !trimmed.contains('/') && !trimmed.contains(':') {
        return Some(trimmed.to_string());
    }
    None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub api_base: String,
    pub captions_base: String,
    pub origin: String,
    pub referer: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.frontendmasters.com/v1".into(),
            captions_base: "https://captions.frontendmasters.com".into(),
            origin: "https://frontendmasters.com".into(),
            referer: "https://frontendmasters.com/".into(),
        }
    }
}

/// Target container for the muxed output. Exactly two are recognized; each
/// needs a different caption-attachment argument shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Mp4,
    Mkv,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
        }
    }
}

impl FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "mkv" => Ok(Container::Mkv),
            other => Err(Error::UnsupportedContainer(other.to_string())),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Bounded retry with fixed delay, applied by the transport layer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub course_slug: String,
    pub token: String,
    pub preferred_height: u32,
    pub container: Container,
    pub include_captions: bool,
    pub output_dir: PathBuf,
    /// Hand the muxer the authenticated playlist URL instead of performing
    /// the segmented transfer.
    pub direct: bool,
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
}

impl DownloadConfig {
    /// Cookie header value sent on every authenticated request.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_full_url() {
        assert_eq!(
            parse_course_slug("https://frontendmasters.com/courses/complete-intro-rust/"),
            Some("complete-intro-rust".to_string())
        );
    }

    #[test]
    fn slug_from_url_without_scheme() {
        assert_eq!(
            parse_course_slug("frontendmasters.com/courses/web-perf"),
            Some("web-perf".to_string())
        );
    }

    #[test]
    fn bare_slug_passes_through() {
        assert_eq!(parse_course_slug("web-perf"), Some("web-perf".to_string()));
    }

    #[test]
    fn unrelated_url_is_rejected() {
        assert_eq!(parse_course_slug("https://example.com/courses/x"), None);
        assert_eq!(parse_course_slug(""), None);
    }

    #[test]
    fn container_parsing() {
        assert_eq!("mp4".parse::<Container>().unwrap(), Container::Mp4);
        assert_eq!("MKV".parse::<Container>().unwrap(), Container::Mkv);
        assert!(matches!(
            "webm".parse::<Container>(),
            Err(Error::UnsupportedContainer(s)) if s == "webm"
        ));
    }
}
