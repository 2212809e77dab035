use crate::catalog::{Course, Episode};
use crate::client::Fetch;
use crate::config::Endpoints;
use crate::error::{Error, Result};

pub const CAPTION_FILE_NAME: &str = "caption.vtt";

/// Caption assets live at a deterministic path keyed by the course's
/// publish date and slug plus the episode's server index and slug.
pub fn caption_url(endpoints: &Endpoints, course: &Course, episode: &Episode) -> String {
    format!(
        "{}/assets/courses/{}-{}/{}-{}.vtt",
        endpoints.captions_base, course.published_date, course.slug, episode.source_index, episode.slug
    )
}

/// Not every episode has captions; a 404 is a legitimate outcome and must
/// not abort the episode.
pub async fn fetch_caption<F: Fetch>(
    fetch: &F,
    endpoints: &Endpoints,
    course: &Course,
    episode: &Episode,
) -> Result<Option<Vec<u8>>> {
    let url = caption_url(endpoints, course, episode);
    match fetch.get_bytes(&url).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(Error::TransferFailed {
            last_status: Some(404),
            ..
        }) => {
            tracing::debug!("no captions for \"{}\" ({url})", episode.title);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Course, Episode};

    fn course() -> Course {
        Course {
            title: "T".into(),
            slug: "intro-testing".into(),
            published_date: "2023-05-01".into(),
            lessons: vec![],
        }
    }

    fn episode() -> Episode {
        Episode {
            title: "Welcome".into(),
            slug: "welcome".into(),
            source_index: 0,
            source_base: "https://api.example.com/v1/video/aaa".into(),
        }
    }

    #[test]
    fn url_is_deterministic() {
        let url = caption_url(&Endpoints::default(), &course(), &episode());
        assert_eq!(
            url,
            "https://captions.frontendmasters.com/assets/courses/2023-05-01-intro-testing/0-welcome.vtt"
        );
    }
}
