use std::path::{Path, PathBuf};

/// Known audio file extensions
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "m4a", "ogg", "flac", "aac", "opus", "wma", "spx",
];

/// Known image file extensions
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico", "tiff",
];

/// Widest an image may be drawn, in terminal columns
pub const MAX_IMAGE_WIDTH: u16 = 50;

/// Tallest an image may be drawn, in terminal rows
pub const MAX_IMAGE_HEIGHT: u16 = 15;

const MIN_IMAGE_WIDTH: u16 = 4;
const MIN_IMAGE_HEIGHT: u16 = 2;

/// Media file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Image,
    Unknown,
}

/// Determine media type from filename extension
pub fn media_type_from_extension(filename: &str) -> MediaType {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return MediaType::Unknown;
    };
    let ext = ext.to_lowercase();

    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaType::Audio
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaType::Image
    } else {
        MediaType::Unknown
    }
}

/// Locate an image placeholder's file in the media directory
///
/// Only checks that the file exists; decoding is left to whoever draws it.
pub fn resolve_image(media_dir: Option<&Path>, filename: &str) -> Option<PathBuf> {
    let media_dir = media_dir?;
    if filename.is_empty() {
        return None;
    }
    let path = media_dir.join(filename);
    if path.is_file() {
        Some(path)
    } else {
        log::debug!("Image not found in media directory: {}", path.display());
        None
    }
}

/// An image the UI should draw in place of its placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMarker {
    /// Resolved, existing file
    pub path: PathBuf,
    /// Column limit requested by the caller, capped at [`MAX_IMAGE_WIDTH`]
    pub max_width: Option<u16>,
    /// Row limit requested by the caller, capped at [`MAX_IMAGE_HEIGHT`]
    pub max_height: Option<u16>,
}

impl ImageMarker {
    pub fn new(path: PathBuf, max_width: Option<u16>, max_height: Option<u16>) -> Self {
        Self {
            path,
            max_width,
            max_height,
        }
    }

    /// Cell box available to this image
    pub fn available_cells(&self) -> (u16, u16) {
        let width = self
            .max_width
            .filter(|w| *w > 0)
            .map_or(MAX_IMAGE_WIDTH, |w| w.min(MAX_IMAGE_WIDTH));
        let height = self
            .max_height
            .filter(|h| *h > 0)
            .map_or(MAX_IMAGE_HEIGHT, |h| h.min(MAX_IMAGE_HEIGHT));
        (width, height)
    }

    /// Columns and rows to draw the image at
    ///
    /// Reads only the image header. Files that cannot be probed are sized
    /// as if square.
    pub fn display_cells(&self) -> (u16, u16) {
        let (px_w, px_h) = match image::image_dimensions(&self.path) {
            Ok(dims) => dims,
            Err(e) => {
                log::debug!("Could not read size of {}: {}", self.path.display(), e);
                (1, 1)
            }
        };
        let (avail_w, avail_h) = self.available_cells();
        fit_image_cells(px_w, px_h, avail_w, avail_h)
    }
}

/// Fit an image of `px_w` x `px_h` pixels into a box of terminal cells
///
/// Cells are taken to be twice as tall as they are wide. The image fills
/// the available width unless that makes it too tall, in which case it
/// fills the height instead.
pub fn fit_image_cells(px_w: u32, px_h: u32, avail_w: u16, avail_h: u16) -> (u16, u16) {
    let aspect = f64::from(px_w.max(1)) / f64::from(px_h.max(1));

    let mut width = f64::from(avail_w);
    let mut height = (width / aspect / 2.0).round();
    if height > f64::from(avail_h) {
        height = f64::from(avail_h);
        width = (height * aspect * 2.0).round();
    }

    let width = (width.min(f64::from(u16::MAX)) as u16).max(MIN_IMAGE_WIDTH);
    let height = (height.min(f64::from(u16::MAX)) as u16).max(MIN_IMAGE_HEIGHT);
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_media_type_detection() {
        assert_eq!(media_type_from_extension("audio.mp3"), MediaType::Audio);
        assert_eq!(media_type_from_extension("image.jpg"), MediaType::Image);
        assert_eq!(media_type_from_extension("image.PNG"), MediaType::Image);
        assert_eq!(media_type_from_extension("unknown.xyz"), MediaType::Unknown);
        assert_eq!(media_type_from_extension("noextension"), MediaType::Unknown);
    }

    #[test]
    fn test_resolve_image() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("photo.jpg"), b"not really a jpeg").unwrap();
        fs::create_dir(dir.path().join("folder.png")).unwrap();

        assert_eq!(
            resolve_image(Some(dir.path()), "photo.jpg"),
            Some(dir.path().join("photo.jpg"))
        );
        assert_eq!(resolve_image(Some(dir.path()), "missing.jpg"), None);
        assert_eq!(resolve_image(Some(dir.path()), "folder.png"), None);
        assert_eq!(resolve_image(Some(dir.path()), ""), None);
        assert_eq!(resolve_image(None, "photo.jpg"), None);
    }

    #[test]
    fn test_fit_wide_image_fills_width() {
        // 200x100 at 50 columns -> 50 / 2 / 2 = 12.5 rows, rounded
        assert_eq!(fit_image_cells(200, 100, 50, 15), (50, 13));
    }

    #[test]
    fn test_fit_tall_image_fills_height() {
        // square image would need 25 rows at full width
        assert_eq!(fit_image_cells(100, 100, 50, 15), (30, 15));
        assert_eq!(fit_image_cells(10, 1000, 50, 15), (4, 15));
    }

    #[test]
    fn test_fit_minimums() {
        assert_eq!(fit_image_cells(1000, 1, 50, 15), (50, 2));
        assert_eq!(fit_image_cells(0, 0, 2, 1), (4, 2));
    }

    #[test]
    fn test_unreadable_image_sized_as_square() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"garbage").unwrap();

        let marker = ImageMarker::new(path, Some(20), None);
        assert_eq!(marker.available_cells(), (20, MAX_IMAGE_HEIGHT));
        assert_eq!(marker.display_cells(), (20, 10));
    }

    #[test]
    fn test_available_cells_capped() {
        let marker = ImageMarker::new(PathBuf::from("x.png"), Some(500), Some(0));
        assert_eq!(marker.available_cells(), (MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT));
    }
}
