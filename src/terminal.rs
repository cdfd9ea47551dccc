//! Turning rendered card content into terminal output.
//!
//! A card side becomes a list of [`CardBlock`]s: runs of styled text with
//! audio icons substituted, and image markers wherever an image placeholder
//! resolved to a file. Image placeholders that do not resolve stay in the
//! text so the user still sees that an image was there.

use std::path::Path;

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};

use crate::color::{adjust_for_contrast, css_to_rgb, parse_color};
use crate::config::RenderOptions;
use crate::error::RenderError;
use crate::html::render_html_to_styled_segments;
use crate::media::{resolve_image, ImageMarker};
use crate::models::{segments_text, slice_segments, CardBlock, RenderMode, StyledSegment};
use crate::placeholder::{parse_image_placeholders, AudioIconCounter};

/// Terminal style for one segment
///
/// In high-contrast mode colours are adapted for a dark background:
/// coloured text is lightened and made bold, and a background too light to
/// keep is replaced by an underline.
pub fn segment_style(segment: &StyledSegment, high_contrast: bool) -> Style {
    let source = &segment.style;
    let mut style = Style::default();

    if source.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if source.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if source.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if source.strikethrough {
        style = style.add_modifier(Modifier::CROSSED_OUT);
    }

    if let Some(css) = source.color.as_deref() {
        if let Some(color) = parse_color(css) {
            if high_contrast {
                let adjusted = css_to_rgb(css).and_then(|rgb| adjust_for_contrast(rgb, false));
                if let Some(adjusted) = adjusted {
                    style = style.fg(adjusted.into());
                }
                style = style.add_modifier(Modifier::BOLD);
            } else {
                style = style.fg(color);
            }
        }
    }

    if let Some(css) = source.bgcolor.as_deref() {
        if let Some(color) = parse_color(css) {
            if high_contrast {
                match css_to_rgb(css).and_then(|rgb| adjust_for_contrast(rgb, true)) {
                    Some(kept) => style = style.bg(kept.into()),
                    None => style = style.add_modifier(Modifier::UNDERLINED),
                }
            } else {
                style = style.bg(color);
            }
        }
    }

    if source.is_cloze {
        style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }

    style
}

/// Build terminal text from segments, starting a new line at each `\n`
pub fn segments_to_text(segments: &[StyledSegment], high_contrast: bool) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();

    for segment in segments {
        let style = segment_style(segment, high_contrast);
        for (i, piece) in segment.text.split('\n').enumerate() {
            if i > 0 {
                lines.push(Line::from(std::mem::take(&mut spans)));
            }
            if !piece.is_empty() {
                spans.push(Span::styled(piece.to_string(), style));
            }
        }
    }
    if !spans.is_empty() || lines.is_empty() {
        lines.push(Line::from(spans));
    }
    Text::from(lines)
}

/// Split segments around the image placeholders in their text
///
/// Text between placeholders is kept exactly, styles included.
fn split_at_images(
    segments: Vec<StyledSegment>,
    media_dir: Option<&Path>,
    images_enabled: bool,
    max_width: Option<u16>,
    max_height: Option<u16>,
) -> Vec<CardBlock> {
    let text = segments_text(&segments);
    let placeholders = parse_image_placeholders(&text);
    if placeholders.is_empty() || !images_enabled {
        return vec![CardBlock::Styled(segments)];
    }

    let mut blocks = Vec::new();
    let mut last_end = 0;
    for placeholder in &placeholders {
        if placeholder.start > last_end {
            let before = slice_segments(&segments, last_end, placeholder.start);
            if !before.is_empty() {
                blocks.push(CardBlock::Styled(before));
            }
        }

        let block = match resolve_image(media_dir, &placeholder.filename) {
            Some(path) => CardBlock::Image(ImageMarker::new(path, max_width, max_height)),
            None if placeholder.filename.is_empty() => {
                let original = &text[placeholder.start..placeholder.end];
                CardBlock::Styled(vec![StyledSegment::plain(original)])
            }
            None => CardBlock::Styled(vec![StyledSegment::plain(format!(
                "[image: {}]",
                placeholder.filename
            ))]),
        };
        blocks.push(block);
        last_end = placeholder.end;
    }

    if last_end < text.len() {
        let after = slice_segments(&segments, last_end, text.len());
        if !after.is_empty() {
            blocks.push(CardBlock::Styled(after));
        }
    }

    if blocks.is_empty() {
        vec![CardBlock::Styled(segments)]
    } else {
        blocks
    }
}

/// Compose already-rendered plain text for display
///
/// Audio placeholders become speaker icons; image placeholders become
/// image markers when they resolve.
pub fn render_content_with_images(
    text: &str,
    media_dir: Option<&Path>,
    images_enabled: bool,
    max_width: Option<u16>,
    max_height: Option<u16>,
) -> Vec<CardBlock> {
    if text.is_empty() {
        return Vec::new();
    }
    let text = AudioIconCounter::new().substitute(text);
    split_at_images(
        vec![StyledSegment::plain(text)],
        media_dir,
        images_enabled,
        max_width,
        max_height,
    )
}

/// Render card HTML into styled blocks for display
pub fn render_styled_content_with_images(
    html: &str,
    media_dir: Option<&Path>,
    options: &RenderOptions,
    mode: RenderMode,
) -> Result<Vec<CardBlock>, RenderError> {
    if html.is_empty() {
        return Ok(Vec::new());
    }
    let segments = render_html_to_styled_segments(html, mode)?;
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let mut icons = AudioIconCounter::new();
    let segments: Vec<StyledSegment> = segments
        .into_iter()
        .map(|segment| StyledSegment::new(icons.substitute(&segment.text), segment.style))
        .collect();

    Ok(split_at_images(
        segments,
        media_dir,
        options.images_enabled,
        options.max_image_width,
        options.max_image_height,
    ))
}

/// Render one side of a card, falling back to the raw HTML if rendering fails
pub fn render_card_side(
    html: &str,
    media_dir: Option<&Path>,
    options: &RenderOptions,
    mode: RenderMode,
) -> Vec<CardBlock> {
    match render_styled_content_with_images(html, media_dir, options, mode) {
        Ok(blocks) => blocks,
        Err(e) => {
            log::warn!("Failed to render card, showing raw content: {e}");
            vec![CardBlock::Styled(vec![StyledSegment::plain(html)])]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::MAX_NESTING_DEPTH;
    use crate::models::TextStyle;
    use ratatui::style::Color;
    use std::fs;
    use tempfile::TempDir;

    fn segment(text: &str, style: TextStyle) -> StyledSegment {
        StyledSegment::new(text, style)
    }

    fn options(images_enabled: bool) -> RenderOptions {
        RenderOptions {
            images_enabled,
            ..RenderOptions::default()
        }
    }

    fn block_texts(blocks: &[CardBlock]) -> Vec<Option<String>> {
        blocks.iter().map(CardBlock::text).collect()
    }

    #[test]
    fn test_segment_style_modifiers() {
        let style = segment_style(
            &segment(
                "x",
                TextStyle {
                    bold: true,
                    italic: true,
                    strikethrough: true,
                    color: Some("red".to_string()),
                    ..TextStyle::default()
                },
            ),
            false,
        );
        assert!(style
            .add_modifier
            .contains(Modifier::BOLD | Modifier::ITALIC | Modifier::CROSSED_OUT));
        assert!(!style.add_modifier.contains(Modifier::UNDERLINED));
        assert_eq!(style.fg, Some(Color::Red));
    }

    #[test]
    fn test_unparseable_colors_ignored() {
        let style = segment_style(
            &segment(
                "x",
                TextStyle {
                    color: Some("transparent".to_string()),
                    bgcolor: Some("inherit".to_string()),
                    ..TextStyle::default()
                },
            ),
            true,
        );
        assert_eq!(style, Style::default());
    }

    #[test]
    fn test_high_contrast_foreground() {
        let style = segment_style(
            &segment(
                "x",
                TextStyle {
                    color: Some("black".to_string()),
                    ..TextStyle::default()
                },
            ),
            true,
        );
        assert_eq!(style.fg, Some(Color::Rgb(0xb0, 0xb0, 0xb0)));
        assert!(style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_high_contrast_light_background_becomes_underline() {
        let yellow = TextStyle {
            bgcolor: Some("#ffff00".to_string()),
            ..TextStyle::default()
        };
        let plain = segment_style(&segment("x", yellow.clone()), false);
        assert_eq!(plain.bg, Some(Color::Rgb(255, 255, 0)));

        let contrast = segment_style(&segment("x", yellow), true);
        assert_eq!(contrast.bg, None);
        assert!(contrast.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn test_cloze_style() {
        let style = segment_style(
            &segment(
                "x",
                TextStyle {
                    is_cloze: true,
                    ..TextStyle::default()
                },
            ),
            false,
        );
        assert!(style.add_modifier.contains(Modifier::BOLD | Modifier::REVERSED));
    }

    #[test]
    fn test_segments_to_text_lines() {
        let bold = TextStyle {
            bold: true,
            ..TextStyle::default()
        };
        let text = segments_to_text(
            &[
                StyledSegment::plain("one "),
                segment("two\nthree", bold),
                StyledSegment::plain("\n\nfour"),
            ],
            false,
        );
        let lines: Vec<String> = text
            .lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(lines, vec!["one two", "three", "", "four"]);
        assert!(text.lines[0].spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_plain_content_with_images() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("photo.jpg"), b"jpeg").unwrap();

        let blocks = render_content_with_images(
            "Picture:  [image: photo.jpg]\n[audio: 0] and [image: missing.png] end",
            Some(dir.path()),
            true,
            Some(40),
            None,
        );
        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0].text().as_deref(), Some("Picture:  "));
        assert_eq!(
            blocks[1],
            CardBlock::Image(ImageMarker::new(dir.path().join("photo.jpg"), Some(40), None))
        );
        assert_eq!(blocks[2].text().as_deref(), Some("\n🔊[5] and "));
        assert_eq!(blocks[3].text().as_deref(), Some("[image: missing.png]"));
        assert_eq!(blocks[4].text().as_deref(), Some(" end"));
    }

    #[test]
    fn test_plain_content_without_media_dir() {
        let blocks = render_content_with_images("[image: photo.jpg]", None, true, None, None);
        assert_eq!(block_texts(&blocks), vec![Some("[image: photo.jpg]".to_string())]);
        assert!(render_content_with_images("", None, true, None, None).is_empty());
    }

    #[test]
    fn test_empty_image_reference_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let text = "a [image:] b [image:  ]";
        let blocks = render_content_with_images(text, Some(dir.path()), true, None, None);
        let shown: String = blocks.iter().filter_map(CardBlock::text).collect();
        assert_eq!(shown, text);
    }

    #[test]
    fn test_images_disabled_keeps_text() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("photo.jpg"), b"jpeg").unwrap();
        let blocks = render_content_with_images(
            "a [image: photo.jpg] [audio: x.mp3]",
            Some(dir.path()),
            false,
            None,
            None,
        );
        assert_eq!(
            block_texts(&blocks),
            vec![Some("a [image: photo.jpg] 🔊[5]".to_string())]
        );
    }

    #[test]
    fn test_styled_icons_numbered_across_segments() {
        let blocks = render_styled_content_with_images(
            "[sound:a.mp3] <b>[sound:b.mp3]</b> [sound:c.mp3]",
            None,
            &options(true),
            RenderMode::Answer,
        )
        .unwrap();
        assert_eq!(blocks.len(), 1);
        let CardBlock::Styled(segments) = &blocks[0] else {
            panic!("expected text block");
        };
        assert_eq!(segments_text(segments), "🔊[5] 🔊[6] 🔊[7]");
        assert!(segments.iter().any(|s| s.style.bold && s.text == "🔊[6]"));
    }

    #[test]
    fn test_styled_image_split_keeps_styles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pic.png"), b"png").unwrap();

        let blocks = render_styled_content_with_images(
            r#"<b>Before</b><img src="pic.png"><i>after</i>"#,
            Some(dir.path()),
            &options(true),
            RenderMode::Answer,
        )
        .unwrap();

        assert_eq!(blocks.len(), 3);
        let CardBlock::Styled(before) = &blocks[0] else {
            panic!("expected text block");
        };
        assert_eq!(segments_text(before), "Before");
        assert!(before[0].style.bold);
        assert!(matches!(&blocks[1], CardBlock::Image(m) if m.path == dir.path().join("pic.png")));
        let CardBlock::Styled(after) = &blocks[2] else {
            panic!("expected text block");
        };
        assert_eq!(segments_text(after), "after");
        assert!(after[0].style.italic);
    }

    #[test]
    fn test_styled_missing_image_falls_back_to_placeholder() {
        let blocks = render_styled_content_with_images(
            r#"<img src="nonexistent.jpg">"#,
            None,
            &options(true),
            RenderMode::Answer,
        )
        .unwrap();
        assert_eq!(block_texts(&blocks), vec![Some("[image: nonexistent.jpg]".to_string())]);
    }

    #[test]
    fn test_styled_empty_html() {
        let blocks =
            render_styled_content_with_images("  ", None, &options(true), RenderMode::Answer)
                .unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_card_side_falls_back_to_raw_html() {
        let html = "<span>".repeat(MAX_NESTING_DEPTH + 1);
        let blocks = render_card_side(&html, None, &options(true), RenderMode::Question);
        assert_eq!(block_texts(&blocks), vec![Some(html.clone())]);
    }

    #[test]
    fn test_card_side_question_hides_cloze() {
        let blocks = render_card_side(
            r#"Capital: <span class="cloze">Paris</span>"#,
            None,
            &options(true),
            RenderMode::Question,
        );
        assert_eq!(block_texts(&blocks), vec![Some("Capital: [...]".to_string())]);
    }
}
