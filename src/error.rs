use thiserror::Error;

/// Error raised while turning card HTML into renderable output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("HTML nesting too deep ({depth} open elements)")]
    NestingTooDeep { depth: usize },
}

/// Errors reported by the audio resolver and playback controller
///
/// These never propagate out of the playback machinery; they are handed to
/// the caller's error sink instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("{0}")]
    NoBackend(String),

    #[error("Failed to start audio playback ({backend}): {message}")]
    Launch { backend: String, message: String },

    #[error("Audio playback exited with status {status} ({backend})")]
    Exit { backend: String, status: String },

    #[error("Failed waiting for audio playback ({backend}): {message}")]
    Wait { backend: String, message: String },

    #[error("Failed to start audio playback: {0}")]
    Spawn(String),

    #[error("No audio files available")]
    NoAudio,

    #[error("Audio {index} not found (have {available} audio files)")]
    IndexOutOfRange { index: usize, available: usize },
}

/// Errors loading or saving display settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON parsing error: {0}")]
    Json(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e.to_string())
    }
}
