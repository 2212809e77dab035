use crate::error::{Error, Result};

pub const HLS_HEADER: &str = "#EXTM3U";

/// One rung of the quality ladder. `markers` are the substrings that
/// identify the rendition inside the variant playlist body; the selected
/// marker also names the rendition playlist (`{marker}.m3u8`) and prefixes
/// the segment files (`{marker}_00001.ts`).
///
/// Provider-specific configuration data, kept table-driven on purpose.
#[derive(Debug)]
pub struct QualityTier {
    pub height: u32,
    pub markers: &'static [&'static str],
}

/// Strictly descending quality order; negotiation only ever steps down.
pub const LADDER: &[QualityTier] = &[
    QualityTier {
        height: 2160,
        markers: &["index_2160p_Q10_20mbps"],
    },
    QualityTier {
        height: 1440,
        markers: &["index_1440p_Q10_9mbps"],
    },
    QualityTier {
        height: 1080,
        markers: &["index_1080_Q8_7mbps"],
    },
    QualityTier {
        height: 720,
        markers: &["index_720_Q8_5mbps"],
    },
    QualityTier {
        height: 360,
        markers: &["index_360_Q8_2mbps"],
    },
];

pub fn ladder_heights() -> Vec<u32> {
    LADDER.iter().map(|t| t.height).collect()
}

/// Outcome of one negotiation. `downgraded_from` is set at most once per
/// run, the first time the resolved rung differs from the preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub height: u32,
    pub marker: &'static str,
    pub downgraded_from: Option<u32>,
}

/// Negotiated-quality state threaded through the per-episode calls. Once a
/// downgrade happened, later episodes start from the already-downgraded
/// rung and stay silent about it.
#[derive(Debug)]
pub struct NegotiationState {
    preferred: usize,
    current: usize,
    announced: bool,
}

impl NegotiationState {
    pub fn new(preferred_height: u32) -> Result<Self> {
        let idx = LADDER
            .iter()
            .position(|t| t.height == preferred_height)
            .ok_or(Error::UnknownQuality(preferred_height))?;
        Ok(Self {
            preferred: idx,
            current: idx,
            announced: false,
        })
    }

    pub fn current_height(&self) -> u32 {
        LADDER[self.current].height
    }

    /// Resolves the best available rung against a variant playlist body.
    ///
    /// A body without the canonical `#EXTM3U` header is not an adaptive
    /// manifest at all, and exhausting the ladder means the provider format
    /// is unrecognized; both are fatal rather than a silent downgrade.
    pub fn negotiate(&mut self, body: &str, url: &str) -> Result<Selection> {
        if !body.contains(HLS_HEADER) {
            return Err(self.no_compatible(url));
        }

        let mut idx = self.current;
        let (resolved, marker) = loop {
            // Among several markers for one rung, the first found in
            // document order wins and fixes the variant URL suffix.
            let found = LADDER[idx]
                .markers
                .iter()
                .filter_map(|m| body.find(m).map(|pos| (pos, *m)))
                .min_by_key(|(pos, _)| *pos);
            if let Some((_, marker)) = found {
                break (idx, marker);
            }
            idx += 1;
            if idx >= LADDER.len() {
                return Err(self.no_compatible(url));
            }
        };

        self.current = resolved;
        let downgraded_from = if resolved != self.preferred && !self.announced {
            self.announced = true;
            Some(LADDER[self.preferred].height)
        } else {
            None
        };

        Ok(Selection {
            height: LADDER[resolved].height,
            marker,
            downgraded_from,
        })
    }

    fn no_compatible(&self, url: &str) -> Error {
        Error::NoCompatibleQuality {
            url: url.to_string(),
            preferred: format!("{}p", LADDER[self.preferred].height),
        }
    }
}
