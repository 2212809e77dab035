use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::client::Fetch;
use crate::config::Endpoints;
use crate::error::{Error, Result};

/// Read-only view of a course, constructed once from the catalog response.
#[derive(Debug, Clone)]
pub struct Course {
    pub title: String,
    pub slug: String,
    pub published_date: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone)]
pub struct Lesson {
    pub name: String,
    /// 1-based display ordinal among lessons.
    pub ordinal: usize,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone)]
pub struct Episode {
    pub title: String,
    pub slug: String,
    /// Server-assigned index; used for caption lookup and the on-disk
    /// file ordinal (`source_index + 1`).
    pub source_index: u64,
    pub source_base: String,
}

impl Episode {
    /// Variant-resolution endpoint; returns a JSON envelope with the real,
    /// short-lived signed playlist URL.
    pub fn source_url(&self) -> String {
        format!("{}/source?f=m3u8", self.source_base)
    }
}

impl Course {
    pub fn episode_count(&self) -> usize {
        self.lessons.iter().map(|l| l.episodes.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoursePayload {
    code: Option<i64>,
    title: Option<String>,
    slug: Option<String>,
    date_published: Option<String>,
    #[serde(default)]
    lesson_elements: Vec<Value>,
    #[serde(default)]
    lesson_data: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeData {
    title: String,
    slug: String,
    index: u64,
    source_base: String,
}

pub async fn fetch_course<F: Fetch>(
    fetch: &F,
    endpoints: &Endpoints,
    slug: &str,
) -> Result<Course> {
    let url = format!("{}/kabuki/courses/{}", endpoints.api_base, slug);
    let text = match fetch.get_text(&url).await {
        Ok(text) => text,
        Err(Error::TransferFailed {
            last_status: Some(404),
            ..
        }) => {
            return Err(Error::CourseNotFound {
                slug: slug.to_string(),
            })
        }
        Err(e) => return Err(e),
    };
    parse_course(slug, &text)
}

/// Folds the payload's flat `lessonElements` sequence (lesson-name strings
/// interleaved with numeric episode indices) and its `lessonData` side
/// table into the nested lesson/episode tree.
pub fn parse_course(slug: &str, payload_text: &str) -> Result<Course> {
    let payload: CoursePayload = serde_json::from_str(payload_text)
        .map_err(|e| Error::MalformedCatalog(format!("invalid catalog JSON: {e}")))?;

    if payload.code == Some(404) {
        return Err(Error::CourseNotFound {
            slug: slug.to_string(),
        });
    }

    let mut by_index: HashMap<u64, EpisodeData> = HashMap::new();
    for (key, value) in payload.lesson_data {
        let data: EpisodeData = serde_json::from_value(value)
            .map_err(|e| Error::MalformedCatalog(format!("lessonData[{key}]: {e}")))?;
        by_index.insert(data.index, data);
    }

    // Every lessonData index must occupy a slot in lessonElements.
    for index in by_index.keys() {
        let present = payload
            .lesson_elements
            .iter()
            .any(|el| el.as_u64() == Some(*index));
        if !present {
            return Err(Error::MalformedCatalog(format!(
                "episode index {index} has no slot in lessonElements"
            )));
        }
    }

    let mut lessons: Vec<Lesson> = Vec::new();
    for element in &payload.lesson_elements {
        match element {
            Value::String(name) => lessons.push(Lesson {
                name: name.clone(),
                ordinal: lessons.len() + 1,
                episodes: Vec::new(),
            }),
            Value::Number(n) => {
                let index = n.as_u64().ok_or_else(|| {
                    Error::MalformedCatalog(format!("non-integral episode index {n}"))
                })?;
                let data = by_index.get(&index).ok_or_else(|| {
                    Error::MalformedCatalog(format!("episode index {index} missing from lessonData"))
                })?;
                let lesson = lessons.last_mut().ok_or_else(|| {
                    Error::MalformedCatalog(format!(
                        "episode index {index} precedes any lesson marker"
                    ))
                })?;
                lesson.episodes.push(Episode {
                    title: data.title.clone(),
                    slug: data.slug.clone(),
                    source_index: data.index,
                    source_base: data.source_base.clone(),
                });
            }
            other => {
                return Err(Error::MalformedCatalog(format!(
                    "unexpected lessonElements entry: {other}"
                )))
            }
        }
    }

    Ok(Course {
        title: payload
            .title
            .ok_or_else(|| Error::MalformedCatalog("catalog has no title".into()))?,
        slug: payload.slug.unwrap_or_else(|| slug.to_string()),
        published_date: payload
            .date_published
            .ok_or_else(|| Error::MalformedCatalog("catalog has no datePublished".into()))?,
        lessons,
    })
}
