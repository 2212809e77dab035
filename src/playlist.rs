use std::sync::LazyLock;

use m3u8_rs::parse_media_playlist;
use regex::Regex;

use crate::error::{Error, Result};

/// Historical segment naming convention of the provider's CDN.
pub const SEGMENT_PREFIX: &str = "index_";
pub const KEY_FILE_NAME: &str = "key.bin";
pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

static KEY_URI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).unwrap());

/// A fetched rendition playlist: raw text plus the two facts the transfer
/// engine needs, the segment count and the single encryption-key reference.
#[derive(Debug, Clone)]
pub struct MediaManifest {
    pub url: String,
    pub text: String,
    pub segment_count: usize,
    pub key_reference: String,
}

impl MediaManifest {
    /// Two segment-counting conventions exist in the wild: every line
    /// carrying the provider's `index_` prefix, or (for well-formed HLS)
    /// every segment entry. The live format is detected, not assumed.
    pub fn parse(url: &str, text: String) -> Result<Self> {
        let key_reference = KEY_URI_RE
            .captures(&text)
            .map(|c| c[1].to_string())
            .ok_or_else(|| Error::TransferFailed {
                url: url.to_string(),
                last_status: None,
            })?;

        let prefixed = text
            .lines()
            .filter(|l| l.starts_with(SEGMENT_PREFIX))
            .count();
        let segment_count = if prefixed > 0 {
            prefixed
        } else if let Ok((_, playlist)) = parse_media_playlist(text.as_bytes()) {
            playlist.segments.len()
        } else {
            0
        };

        if segment_count == 0 {
            return Err(Error::TransferFailed {
                url: url.to_string(),
                last_status: None,
            });
        }

        Ok(Self {
            url: url.to_string(),
            text,
            segment_count,
            key_reference,
        })
    }

    /// Rewrites every `URI="..."` occurrence to a local name so the muxer
    /// resolves the key from disk instead of the signed remote URL.
    pub fn rewrite_key_reference(&self, local_name: &str) -> String {
        KEY_URI_RE
            .replace_all(&self.text, |_: &regex::Captures<'_>| {
                format!("URI=\"{local_name}\"")
            })
            .into_owned()
    }

    /// Absolute URL of the encryption key; a relative reference shares the
    /// playlist's base path.
    pub fn key_url(&self) -> String {
        if self.key_reference.starts_with("http://") || self.key_reference.starts_with("https://")
        {
            self.key_reference.clone()
        } else {
            sibling_url(&self.url, &self.key_reference)
        }
    }
}

/// Deterministic segment file name: repeated runs address the same file.
pub fn segment_file_name(marker: &str, sequence: usize) -> String {
    format!("{marker}_{sequence:05}.ts")
}

/// Replaces the final path component of `base` with `name`. Variant,
/// rendition and segment resources share one CDN base path, and a signed
/// query string on the base is carried over.
pub fn sibling_url(base: &str, name: &str) -> String {
    let (path, query) = match base.find('?') {
        Some(pos) => (&base[..pos], Some(&base[pos..])),
        None => (base, None),
    };

    let rebased = match path.rfind('/') {
        Some(pos) => format!("{}/{}", &path[..pos], name),
        None => name.to_string(),
    };

    match query {
        Some(q) if !name.contains('?') => format!("{rebased}{q}"),
        _ => rebased,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://cdn.example.com/v1/abc/index_1080_Q8_7mbps.m3u8";

    fn hls_playlist() -> String {
        concat!(
            "#EXTM3U\n",
            "#EXT-X-VERSION:3\n",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example.com/k/1\"\n",
            "#EXTINF:10.0,\n",
            "index_1080_Q8_7mbps_00001.ts\n",
            "#EXTINF:10.0,\n",
            "index_1080_Q8_7mbps_00002.ts\n",
            "#EXTINF:4.2,\n",
            "index_1080_Q8_7mbps_00003.ts\n",
            "#EXT-X-ENDLIST\n",
        )
        .to_string()
    }

    #[test]
    fn counts_prefixed_segment_lines() {
        let manifest = MediaManifest::parse(URL, hls_playlist()).unwrap();
        assert_eq!(manifest.segment_count, 3);
        assert_eq!(manifest.key_reference, "https://keys.example.com/k/1");
    }

    #[test]
    fn falls_back_to_media_playlist_parse_without_prefix() {
        let text = concat!(
            "#EXTM3U\n",
            "#EXT-X-VERSION:3\n",
            "#EXT-X-TARGETDURATION:10\n",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"key/1\"\n",
            "#EXTINF:10.0,\n",
            "seg-a.ts\n",
            "#EXTINF:10.0,\n",
            "seg-b.ts\n",
            "#EXT-X-ENDLIST\n",
        )
        .to_string();
        let manifest = MediaManifest::parse(URL, text).unwrap();
        assert_eq!(manifest.segment_count, 2);
    }

    #[test]
    fn missing_key_reference_is_an_error() {
        let text = "#EXTM3U\n#EXTINF:10.0,\nindex_1080_Q8_7mbps_00001.ts\n".to_string();
        let err = MediaManifest::parse(URL, text).unwrap_err();
        assert!(matches!(err, Error::TransferFailed { url, .. } if url == URL));
    }

    #[test]
    fn empty_rendition_is_an_error() {
        let text = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\"\n".to_string();
        assert!(MediaManifest::parse(URL, text).is_err());
    }

    #[test]
    fn rewrites_every_key_occurrence() {
        let text = concat!(
            "#EXTM3U\n",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example.com/k/1\"\n",
            "#EXTINF:10.0,\n",
            "index_1080_Q8_7mbps_00001.ts\n",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example.com/k/1\"\n",
            "#EXTINF:10.0,\n",
            "index_1080_Q8_7mbps_00002.ts\n",
        )
        .to_string();
        let manifest = MediaManifest::parse(URL, text).unwrap();
        let rewritten = manifest.rewrite_key_reference(KEY_FILE_NAME);
        assert_eq!(rewritten.matches("URI=\"key.bin\"").count(), 2);
        assert!(!rewritten.contains("keys.example.com"));
    }

    #[test]
    fn relative_key_reference_shares_base_path() {
        let text = concat!(
            "#EXTM3U\n",
            "#EXT-X-KEY:METHOD=AES-128,URI=\"aes/key.bin\"\n",
            "#EXTINF:10.0,\n",
            "index_1080_Q8_7mbps_00001.ts\n",
        )
        .to_string();
        let manifest = MediaManifest::parse(URL, text).unwrap();
        assert_eq!(manifest.key_url(), "https://cdn.example.com/v1/abc/aes/key.bin");
    }

    #[test]
    fn segment_names_are_zero_padded() {
        assert_eq!(
            segment_file_name("index_720_Q8_5mbps", 1),
            "index_720_Q8_5mbps_00001.ts"
        );
        assert_eq!(
            segment_file_name("index_720_Q8_5mbps", 12345),
            "index_720_Q8_5mbps_12345.ts"
        );
    }

    #[test]
    fn sibling_url_replaces_last_component() {
        assert_eq!(
            sibling_url("https://cdn.example.com/a/b/index.m3u8", "720.m3u8"),
            "https://cdn.example.com/a/b/720.m3u8"
        );
    }

    #[test]
    fn sibling_url_carries_signed_query() {
        assert_eq!(
            sibling_url("https://cdn.example.com/a/index.m3u8?Policy=x&Sig=y", "seg_00001.ts"),
            "https://cdn.example.com/a/seg_00001.ts?Policy=x&Sig=y"
        );
    }

    #[test]
    fn sibling_url_keeps_own_query() {
        assert_eq!(
            sibling_url("https://cdn.example.com/a/index.m3u8?t=1", "seg.ts?t=2"),
            "https://cdn.example.com/a/seg.ts?t=2"
        );
    }
}
