//! Mapping audio placeholders to files and playing them.

use std::path::{Path, PathBuf};

use crate::error::AudioError;
use crate::placeholder::parse_audio_placeholders;
use crate::playback::{emit, ErrorSink, PlaybackController};

/// Resolve the audio placeholders in `text` to files in `media_dir`
///
/// `[audio: N]` picks entry N of `audio_files`; `[audio: name]` names a file
/// directly. Placeholders that do not lead to an existing file are dropped,
/// and nothing resolves without a media directory.
pub fn resolve_audio_files(
    text: &str,
    audio_files: &[String],
    media_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let Some(media_dir) = media_dir else {
        return Vec::new();
    };

    parse_audio_placeholders(text)
        .into_iter()
        .filter_map(|placeholder| {
            let path = if placeholder.is_index() {
                media_dir.join(audio_files.get(placeholder.index()?)?)
            } else if placeholder.value.is_empty() {
                return None;
            } else {
                media_dir.join(&placeholder.value)
            };
            existing(path)
        })
        .collect()
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(path)
    } else {
        log::debug!("Audio file not found: {}", path.display());
        None
    }
}

/// Play every resolvable audio reference on a card side, in order
///
/// A side without playable audio counts as success.
pub fn play_audio_for_side(
    controller: &PlaybackController,
    text: &str,
    audio_files: &[String],
    media_dir: Option<&Path>,
    on_error: Option<ErrorSink>,
) -> bool {
    let resolved = resolve_audio_files(text, audio_files, media_dir);
    if resolved.is_empty() {
        return true;
    }
    controller.play(&resolved, on_error)
}

/// Play one audio reference by its 1-based display number
///
/// Numbers count resolvable files only, matching the order the speaker
/// icons were assigned in.
pub fn play_audio_by_index(
    controller: &PlaybackController,
    text: &str,
    audio_files: &[String],
    media_dir: Option<&Path>,
    index: usize,
    on_error: Option<ErrorSink>,
) -> bool {
    let resolved = resolve_audio_files(text, audio_files, media_dir);
    if resolved.is_empty() {
        emit(on_error.as_ref(), AudioError::NoAudio);
        return false;
    }

    let Some(file) = index.checked_sub(1).and_then(|i| resolved.get(i)) else {
        emit(
            on_error.as_ref(),
            AudioError::IndexOutOfRange {
                index,
                available: resolved.len(),
            },
        );
        return false;
    };
    controller.play(std::slice::from_ref(file), on_error)
}
