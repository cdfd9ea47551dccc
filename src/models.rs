use crate::media::ImageMarker;

/// Which side of a card is being rendered
///
/// The question side hides cloze deletions behind `[...]`; the answer side
/// reveals them with cloze styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    Question,
    #[default]
    Answer,
}

/// Style shared by one run of rendered text
///
/// Colors are kept in their source CSS form (e.g. `red`, `#00f`) and only
/// converted to terminal colors at display time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub color: Option<String>,
    pub bgcolor: Option<String>,
    /// Revealed cloze-deletion content (answer side only)
    pub is_cloze: bool,
}

impl TextStyle {
    /// True when nothing distinguishes this style from plain text
    pub fn is_plain(&self) -> bool {
        *self == TextStyle::default()
    }
}

/// A run of text with a single style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSegment {
    pub text: String,
    pub style: TextStyle,
}

impl StyledSegment {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, TextStyle::default())
    }
}

/// Concatenate the text of a segment list
pub fn segments_text(segments: &[StyledSegment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Append text to a segment list, merging with the last segment when the
/// style matches
pub(crate) fn push_segment(segments: &mut Vec<StyledSegment>, text: &str, style: &TextStyle) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(last) if last.style == *style => last.text.push_str(text),
        _ => segments.push(StyledSegment::new(text, style.clone())),
    }
}

/// Cut the byte range `start..end` of the concatenated text out of a segment
/// list, keeping each piece's style
///
/// Offsets must fall on char boundaries of the concatenated text, which holds
/// for offsets produced by the placeholder parsers on that same text.
pub fn slice_segments(segments: &[StyledSegment], start: usize, end: usize) -> Vec<StyledSegment> {
    let mut out = Vec::new();
    let mut offset = 0;
    for segment in segments {
        let seg_start = offset;
        let seg_end = offset + segment.text.len();
        offset = seg_end;

        if seg_end <= start || seg_start >= end {
            continue;
        }
        let from = start.max(seg_start) - seg_start;
        let to = end.min(seg_end) - seg_start;
        push_segment(&mut out, &segment.text[from..to], &segment.style);
    }
    out
}

/// One unit of card content handed to the UI shell
#[derive(Debug, Clone, PartialEq)]
pub enum CardBlock {
    /// Styled text, possibly spanning several lines
    Styled(Vec<StyledSegment>),
    /// An image the shell should draw with its terminal image protocol
    Image(ImageMarker),
}

impl CardBlock {
    /// Plain text of a text block; `None` for images
    pub fn text(&self) -> Option<String> {
        match self {
            CardBlock::Styled(segments) => Some(segments_text(segments)),
            CardBlock::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> TextStyle {
        TextStyle {
            bold: true,
            ..TextStyle::default()
        }
    }

    #[test]
    fn test_push_segment_merges_equal_styles() {
        let mut segments = Vec::new();
        push_segment(&mut segments, "Hello", &TextStyle::default());
        push_segment(&mut segments, " ", &TextStyle::default());
        push_segment(&mut segments, "World", &bold());
        push_segment(&mut segments, "", &TextStyle::default());

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello ");
        assert_eq!(segments[1].text, "World");
        assert!(segments[1].style.bold);
    }

    #[test]
    fn test_slice_segments_across_boundaries() {
        let segments = vec![
            StyledSegment::plain("One "),
            StyledSegment::new("two", bold()),
            StyledSegment::plain(" three"),
        ];

        let middle = slice_segments(&segments, 2, 9);
        assert_eq!(segments_text(&middle), "e two t");
        assert_eq!(middle.len(), 3);
        assert!(middle[1].style.bold);

        assert!(slice_segments(&segments, 4, 4).is_empty());
        assert_eq!(segments_text(&slice_segments(&segments, 7, 13)), " three");
    }

    #[test]
    fn test_slice_segments_multibyte() {
        let segments = vec![StyledSegment::plain("漢字"), StyledSegment::new("かな", bold())];
        let tail = slice_segments(&segments, 3, 9);
        assert_eq!(segments_text(&tail), "字か");
    }

    #[test]
    fn test_default_mode_is_answer() {
        assert_eq!(RenderMode::default(), RenderMode::Answer);
        assert!(TextStyle::default().is_plain());
        assert!(!bold().is_plain());
    }
}
