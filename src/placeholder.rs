//! Textual media placeholders.
//!
//! Rendered card text refers to media with two bracketed forms:
//! - `[audio: N]` / `[audio: file.mp3]` - an index into the side's audio list,
//!   or a filename in the media directory
//! - `[image: file.jpg]` - a filename in the media directory
//!
//! Anki's own `[sound:...]` and `[anki:play:q:N]` tags are rewritten into the
//! `[audio: ...]` form before any of the parsers here run.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::media::{media_type_from_extension, MediaType};

/// Speaker glyph shown in place of an audio placeholder
pub const AUDIO_ICON: &str = "🔊";

/// Number of audio references that get a play key (keys 5 through 9)
pub const AUDIO_KEY_COUNT: usize = 5;

/// Key bound to the first audio reference on a side
pub const FIRST_AUDIO_KEY: usize = 5;

static AUDIO_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[audio:\s*([^\]]*)\]").unwrap());
static IMAGE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[image:\s*([^\]]*)\]").unwrap());
static ANKI_PLAY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[anki:play:[aq]:(\d+)\]").unwrap());
static SOUND_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[sound:([^\]]+)\]").unwrap());
static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']?([^"'\s>]+)["']?"#).unwrap());

/// An `[audio: ...]` placeholder and its byte span in the parsed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPlaceholder {
    /// Index (all digits) or filename; empty for malformed refs
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl AudioPlaceholder {
    /// Whether this placeholder refers to the side's audio list by index
    pub fn is_index(&self) -> bool {
        !self.value.is_empty() && self.value.bytes().all(|b| b.is_ascii_digit())
    }

    /// The list index, if this is an index placeholder that fits in `usize`
    pub fn index(&self) -> Option<usize> {
        if self.is_index() {
            self.value.parse().ok()
        } else {
            None
        }
    }
}

/// An `[image: ...]` placeholder and its byte span in the parsed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlaceholder {
    pub filename: String,
    pub start: usize,
    pub end: usize,
}

/// Find all `[audio: ...]` placeholders, left to right
pub fn parse_audio_placeholders(text: &str) -> Vec<AudioPlaceholder> {
    AUDIO_PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(AudioPlaceholder {
                value: caps[1].trim().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Find all `[image: ...]` placeholders, left to right
pub fn parse_image_placeholders(text: &str) -> Vec<ImagePlaceholder> {
    IMAGE_PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ImagePlaceholder {
                filename: caps[1].trim().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Numbers audio icons in order of appearance
///
/// One counter can be carried across several pieces of text (e.g. the
/// segments of a styled rendering) so numbering never restarts mid-card.
#[derive(Debug, Default, Clone)]
pub struct AudioIconCounter {
    seen: usize,
}

impl AudioIconCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Icon for the next placeholder: `🔊[5]`..`🔊[9]`, then a bare `🔊`
    pub fn next_icon(&mut self) -> String {
        self.seen += 1;
        if self.seen <= AUDIO_KEY_COUNT {
            format!("{AUDIO_ICON}[{}]", self.seen + FIRST_AUDIO_KEY - 1)
        } else {
            AUDIO_ICON.to_string()
        }
    }

    /// Replace every audio placeholder in `text`, continuing the numbering
    pub fn substitute(&mut self, text: &str) -> String {
        AUDIO_PLACEHOLDER
            .replace_all(text, |_: &Captures| self.next_icon())
            .into_owned()
    }

    /// How many placeholders have been numbered so far
    pub fn count(&self) -> usize {
        self.seen
    }
}

/// Replace `[audio: ...]` placeholders with speaker icons showing their key
pub fn substitute_audio_icons(text: &str) -> String {
    AudioIconCounter::new().substitute(text)
}

/// Rewrite Anki-native media tags into `[audio: ...]` placeholders
///
/// - `[anki:play:a:N]`, `[anki:play:q:N]` -> `[audio: N]`
/// - `[sound:file.mp3]` -> `[audio: file.mp3]`
pub fn normalize_media_tags(text: &str) -> String {
    let text = ANKI_PLAY_TAG.replace_all(text, "[audio: $1]");
    SOUND_TAG.replace_all(&text, "[audio: $1]").into_owned()
}

/// Filenames of `[sound:...]` tags in document order
///
/// This is the per-side audio list that `[audio: N]` indexes into when the
/// card did not come with one from the collection.
pub fn extract_sound_filenames(html: &str) -> Vec<String> {
    SOUND_TAG
        .captures_iter(html)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// A media file referenced from card HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub filename: String,
    pub media_type: MediaType,
}

/// All `[sound:]` and `<img src>` references in document order, without
/// duplicates
pub fn extract_media_references(html: &str) -> Vec<MediaReference> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in SOUND_TAG.captures_iter(html) {
        if let Some(m) = caps.get(0) {
            found.push((m.start(), caps[1].trim().to_string()));
        }
    }
    for caps in IMG_SRC.captures_iter(html) {
        if let Some(m) = caps.get(0) {
            found.push((m.start(), crate::html::src_basename(&caps[1])));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut refs: Vec<MediaReference> = Vec::new();
    for (_, filename) in found {
        if filename.is_empty() || refs.iter().any(|r| r.filename == filename) {
            continue;
        }
        refs.push(MediaReference {
            media_type: media_type_from_extension(&filename),
            filename,
        });
    }
    refs
}
