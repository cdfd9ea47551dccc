use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::media::{MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH};

/// User-facing display preferences, persisted as JSON
///
/// Keys this crate does not know about are carried through untouched so
/// saving never drops settings written by other parts of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub images_enabled: bool,
    pub audio_enabled: bool,
    pub audio_autoplay: bool,
    pub high_contrast: bool,
    pub max_image_width: u16,
    pub max_image_height: u16,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            images_enabled: true,
            audio_enabled: true,
            audio_autoplay: true,
            high_contrast: false,
            max_image_width: MAX_IMAGE_WIDTH,
            max_image_height: MAX_IMAGE_HEIGHT,
            extra: BTreeMap::new(),
        }
    }
}

impl DisplaySettings {
    /// Read settings from `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Write settings to `path` as pretty JSON, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// The subset of settings the renderer needs
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            images_enabled: self.images_enabled,
            high_contrast: self.high_contrast,
            max_image_width: Some(self.max_image_width),
            max_image_height: Some(self.max_image_height),
        }
    }
}

/// Options for composing a card side for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub images_enabled: bool,
    pub high_contrast: bool,
    pub max_image_width: Option<u16>,
    pub max_image_height: Option<u16>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        DisplaySettings::default().render_options()
    }
}
