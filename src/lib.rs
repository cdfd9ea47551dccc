//! Clanki Render - Anki card rendering for the terminal
//!
//! This library turns the HTML Anki produces for a card side into something
//! a terminal can show:
//! - plain text or styled segments (bold, italic, colours, cloze styling)
//! - `[audio: ...]` / `[image: ...]` placeholders for media, with speaker
//!   icons and image markers resolved against a media directory
//! - colour adaptation for dark terminals
//!
//! It also drives audio playback through an external player, one queue of
//! clips at a time.

pub mod audio;
pub mod backend;
pub mod color;
pub mod config;
pub mod error;
pub mod html;
pub mod media;
pub mod models;
pub mod placeholder;
pub mod playback;
pub mod terminal;

// Re-export main types
pub use audio::{play_audio_by_index, play_audio_for_side, resolve_audio_files};
pub use backend::{AudioBackend, BackendCache};
pub use config::{DisplaySettings, RenderOptions};
pub use error::{AudioError, ConfigError, RenderError};
pub use html::{
    is_cloze_card, render_fields_to_text, render_html_to_styled_segments, render_html_to_text,
};
pub use media::{resolve_image, ImageMarker};
pub use models::{CardBlock, RenderMode, StyledSegment, TextStyle};
pub use placeholder::{parse_audio_placeholders, parse_image_placeholders, substitute_audio_icons};
pub use playback::{ErrorSink, PlaybackController, WorkerId};
pub use terminal::{render_card_side, render_content_with_images, render_styled_content_with_images};
