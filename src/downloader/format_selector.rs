// FormatSelector - tiered format chains and quality choices
//
// Sources don't expose every (height, codec, container) combination, so a
// request is expressed as a descending-specificity chain:
//
//   exact height + preferred codec + preferred container
//   exact height + preferred container
//   exact height + any codec
//   exact height, progressive file of any container
//   absolute best
//
// The same tiers render the yt-dlp selector string and resolve against a
// reported encoding list, so the chain and the resolution logic can't drift.

use serde::{Deserialize, Serialize};

use super::models::{Encoding, TargetQuality};
use crate::config::CodecPreference;

/// Audio-only chain; the result is converted to mp3 afterwards
pub const AUDIO_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio";

/// Offered when the encoding list can't be fetched
pub const DEFAULT_LADDER: [(u32, u32); 6] = [
    (640, 360),
    (854, 480),
    (1280, 720),
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierKind {
    CodecAndContainer,
    Container,
    AnyCodec,
    Progressive,
    Best,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTier {
    pub kind: TierKind,
    pub height: Option<u32>,
}

impl FormatTier {
    /// yt-dlp selector fragment for this tier
    pub fn selector(&self, pref: &CodecPreference) -> String {
        let h = self
            .height
            .map(|h| format!("[height={}]", h))
            .unwrap_or_default();
        match self.kind {
            TierKind::CodecAndContainer => format!(
                "bv*{}[vcodec^={}][ext={}]+ba[acodec^={}]",
                h, pref.video, pref.container, pref.audio
            ),
            TierKind::Container => format!("bv*{}[ext={}]+ba", h, pref.container),
            TierKind::AnyCodec => format!("bv*{}+ba", h),
            TierKind::Progressive => format!("b{}", h),
            TierKind::Best => "b".to_string(),
        }
    }

    fn height_ok(&self, enc: &Encoding) -> bool {
        match self.height {
            Some(h) => enc.height == Some(h),
            None => true,
        }
    }

    /// Best encoding this tier would pick, if any.
    ///
    /// Merged tiers (`bv*+ba`) need a separate audio-only encoding, as
    /// yt-dlp's `ba` does; the progressive and best tiers take muxed files
    /// only, like `b`.
    pub fn pick<'a>(&self, encodings: &'a [Encoding], pref: &CodecPreference) -> Option<&'a Encoding> {
        let has_audio = |e: &Encoding| {
            e.acodec
                .as_deref()
                .map_or(false, |a| a != "none" && !a.is_empty())
        };
        let audio_only = |e: &Encoding| !e.has_video_track() && has_audio(e);

        let eligible = match self.kind {
            TierKind::CodecAndContainer => encodings
                .iter()
                .any(|e| audio_only(e) && e.acodec_starts_with(&pref.audio)),
            TierKind::Container | TierKind::AnyCodec => encodings.iter().any(|e| audio_only(e)),
            TierKind::Progressive | TierKind::Best => true,
        };
        if !eligible {
            return None;
        }

        encodings
            .iter()
            .filter(|e| e.has_video_track() && self.height_ok(e))
            .filter(|e| match self.kind {
                TierKind::CodecAndContainer => {
                    e.vcodec_starts_with(&pref.video) && e.ext == pref.container
                }
                TierKind::Container => e.ext == pref.container,
                TierKind::Progressive | TierKind::Best => has_audio(*e),
                TierKind::AnyCodec => true,
            })
            .max_by_key(|e| (e.height.unwrap_or(0), e.width.unwrap_or(0)))
    }
}

/// Ordered fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatChain {
    pub tiers: Vec<FormatTier>,
}

impl FormatChain {
    pub fn for_height(height: Option<u32>) -> Self {
        let mut tiers: Vec<FormatTier> = [TierKind::CodecAndContainer, TierKind::Container, TierKind::AnyCodec]
            .into_iter()
            .map(|kind| FormatTier { kind, height })
            .collect();
        // Without a height, the progressive tier would duplicate `b`
        if height.is_some() {
            tiers.push(FormatTier {
                kind: TierKind::Progressive,
                height,
            });
        }
        tiers.push(FormatTier {
            kind: TierKind::Best,
            height: None,
        });
        Self { tiers }
    }

    pub fn selector(&self, pref: &CodecPreference) -> String {
        self.tiers
            .iter()
            .map(|t| t.selector(pref))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// First tier that can be satisfied by `encodings`, with its pick
    pub fn resolve<'a>(
        &self,
        encodings: &'a [Encoding],
        pref: &CodecPreference,
    ) -> Option<(TierKind, &'a Encoding)> {
        self.tiers
            .iter()
            .find_map(|tier| tier.pick(encodings, pref).map(|e| (tier.kind, e)))
    }
}

/// Selector string for a request
pub fn selector_for(target: Option<&TargetQuality>, pref: &CodecPreference) -> String {
    match target {
        Some(TargetQuality::AudioOnly) => AUDIO_SELECTOR.to_string(),
        Some(TargetQuality::Video { height, .. }) => {
            FormatChain::for_height(Some(*height)).selector(pref)
        }
        None => FormatChain::for_height(None).selector(pref),
    }
}

/// Quality choice offered to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    /// Display label (e.g., "1280x720 (~48 MB)")
    pub label: String,
    /// Choice string accepted back (e.g., "1280x720", "mp3")
    pub value: String,
    pub height: Option<u32>,
    pub is_audio: bool,
}

/// Distinct (width, height) pairs with a video track, sorted ascending.
/// Pairs below `min_height` are dropped unless nothing else remains.
pub fn available_resolutions(encodings: &[Encoding], min_height: u32) -> Vec<(u32, u32)> {
    let mut all: Vec<(u32, u32)> = encodings
        .iter()
        .filter(|e| e.has_video_track())
        .filter_map(|e| match (e.width, e.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
        .collect();
    all.sort_by_key(|&(w, h)| (h, w));
    all.dedup();

    let filtered: Vec<(u32, u32)> = all.iter().copied().filter(|&(_, h)| h >= min_height).collect();
    if filtered.is_empty() {
        all
    } else {
        filtered
    }
}

/// Build the choice list; `None` means the lookup failed.
pub fn build_quality_options(encodings: Option<&[Encoding]>, min_height: u32) -> Vec<QualityOption> {
    let (resolutions, listed) = match encodings {
        Some(list) => {
            let found = available_resolutions(list, min_height);
            if found.is_empty() {
                (DEFAULT_LADDER.to_vec(), false)
            } else {
                (found, true)
            }
        }
        None => (DEFAULT_LADDER.to_vec(), false),
    };

    let audio_size = encodings
        .into_iter()
        .flatten()
        .filter(|e| !e.has_video_track())
        .filter_map(|e| e.effective_size())
        .max()
        .unwrap_or(0);

    let mut options: Vec<QualityOption> = resolutions
        .into_iter()
        .map(|(w, h)| {
            let size = encodings
                .into_iter()
                .flatten()
                .filter(|e| e.width == Some(w) && e.height == Some(h))
                .filter_map(|e| e.effective_size())
                .max()
                .map(|s| s + audio_size);
            let label = match format_size(size) {
                Some(size) if listed => format!("{}x{} (~{})", w, h, size),
                _ => format!("{}x{}", w, h),
            };
            QualityOption {
                label,
                value: TargetQuality::Video {
                    width: Some(w),
                    height: h,
                }
                .to_string(),
                height: Some(h),
                is_audio: false,
            }
        })
        .collect();

    options.push(QualityOption {
        label: "Audio only (MP3)".to_string(),
        value: TargetQuality::AudioOnly.to_string(),
        height: None,
        is_audio: true,
    });
    options
}

/// Format file size for display
fn format_size(bytes: Option<u64>) -> Option<String> {
    bytes.filter(|b| *b > 0).map(|b| {
        let mb = b as f64 / 1_048_576.0;
        if mb >= 1024.0 {
            format!("{:.1} GB", mb / 1024.0)
        } else {
            format!("{:.0} MB", mb)
        }
    })
}
