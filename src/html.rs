use std::borrow::Cow;
use std::path::Path;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::color::parse_color;
use crate::error::RenderError;
use crate::models::{push_segment, segments_text, RenderMode, StyledSegment, TextStyle};
use crate::placeholder::normalize_media_tags;

/// Deepest element nesting the renderer accepts
pub const MAX_NESTING_DEPTH: usize = 512;

/// Text shown in place of a hidden cloze deletion
pub const CLOZE_PLACEHOLDER: &str = "[...]";

/// Marks list indentation until the whitespace pass turns it into spaces
const INDENT_MARK: char = '\u{E000}';

static MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<!--.*?(?:-->|\z)|<![^>]*>|<\?[^>]*>|<(/)?([a-zA-Z][a-zA-Z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#,
    )
    .unwrap()
});
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});
static SCRIPT_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</script\s*>").unwrap());
static STYLE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</style\s*>").unwrap());

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const BLOCK_TAGS: &[&str] = &["p", "div", "tr", "h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug)]
enum Token<'a> {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(&'a str),
}

/// Split HTML into tags and text
///
/// Comments and declarations are dropped. `<script>` and `<style>` bodies
/// are passed through as raw text up to their close tag.
fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < html.len() {
        let Some(caps) = MARKUP.captures_at(html, pos) else {
            tokens.push(Token::Text(&html[pos..]));
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        if whole.start() > pos {
            tokens.push(Token::Text(&html[pos..whole.start()]));
        }
        pos = whole.end();

        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();

        if caps.get(1).is_some() {
            tokens.push(Token::End { name });
            continue;
        }

        let raw_attrs = caps.get(3).map_or("", |m| m.as_str());
        let self_closing = raw_attrs.trim_end().ends_with('/');
        let attrs = parse_attributes(raw_attrs);

        let raw_end = match name.as_str() {
            "script" if !self_closing => Some(&*SCRIPT_END),
            "style" if !self_closing => Some(&*STYLE_END),
            _ => None,
        };
        tokens.push(Token::Start {
            name: name.clone(),
            attrs,
            self_closing,
        });

        if let Some(end_re) = raw_end {
            match end_re.find_at(html, pos) {
                Some(end) => {
                    tokens.push(Token::Text(&html[pos..end.start()]));
                    tokens.push(Token::End { name });
                    pos = end.end();
                }
                None => {
                    tokens.push(Token::Text(&html[pos..]));
                    pos = html.len();
                }
            }
        }
    }

    tokens
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (name, html_escape::decode_html_entities(value).into_owned())
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn has_cloze_class(attrs: &[(String, String)]) -> bool {
    attribute(attrs, "class")
        .map(|class| class.split_whitespace().any(|token| token == "cloze"))
        .unwrap_or(false)
}

/// Basename of an `<img src>` value after percent-decoding
pub(crate) fn src_basename(src: &str) -> String {
    let decoded = urlencoding::decode(src).unwrap_or(Cow::Borrowed(src));
    Path::new(decoded.as_ref())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Apply the subset of inline CSS that maps onto terminal text attributes
fn apply_inline_style(style: &mut TextStyle, css: &str) {
    for declaration in css.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = strip_important(value.trim());
        let lower = value.to_ascii_lowercase();

        match property.as_str() {
            "font-weight" => match lower.as_str() {
                "bold" | "bolder" => style.bold = true,
                "normal" | "lighter" => style.bold = false,
                numeric => {
                    if let Ok(weight) = numeric.parse::<u32>() {
                        style.bold = weight >= 600;
                    }
                }
            },
            "font-style" => match lower.as_str() {
                "italic" | "oblique" => style.italic = true,
                "normal" => style.italic = false,
                _ => {}
            },
            "text-decoration" | "text-decoration-line" => {
                if lower == "none" {
                    style.underline = false;
                    style.strikethrough = false;
                }
                if lower.contains("underline") {
                    style.underline = true;
                }
                if lower.contains("line-through") {
                    style.strikethrough = true;
                }
            }
            "color" if !value.is_empty() => style.color = Some(value.to_string()),
            "background-color" if !value.is_empty() => style.bgcolor = Some(value.to_string()),
            "background" if parse_color(value).is_some() => style.bgcolor = Some(value.to_string()),
            _ => {}
        }
    }
}

fn strip_important(value: &str) -> &str {
    let lower = value.to_ascii_lowercase();
    match lower.rfind("!important") {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

/// Characters that, touching across a style boundary, would read as one word
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() && !is_unspaced_script(c)
}

/// Scripts written without spaces between words
fn is_unspaced_script(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x30FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xF900..=0xFAFF
            | 0xFF66..=0xFF9F
            | 0x20000..=0x2FA1F
    )
}

#[derive(Debug, Default)]
struct RubyCollector {
    base: String,
    reading: String,
}

impl RubyCollector {
    fn into_unit(self) -> Option<String> {
        let base = self.base.trim();
        let reading = self.reading.trim();
        match (base.is_empty(), reading.is_empty()) {
            (true, _) => None,
            (false, true) => Some(base.to_string()),
            (false, false) => Some(format!("{base}({reading})")),
        }
    }
}

/// What an open element does to the output
#[derive(Debug)]
enum Frame {
    /// `<style>`, `<script>`, `<rp>`: nothing inside is rendered
    Skip,
    List,
    ListItem,
    /// Block element that ends its line on close
    Block,
    Ruby(RubyCollector),
    RubyText,
    /// Revealed cloze deletion
    Cloze,
    /// Cloze deletion replaced by the placeholder; contents are dropped
    HiddenCloze,
    Inline,
}

#[derive(Debug)]
struct OpenElement {
    tag: String,
    frame: Frame,
    style: TextStyle,
}

/// Single left-to-right pass over the token stream
struct Transducer {
    mode: RenderMode,
    stack: Vec<OpenElement>,
    segments: Vec<StyledSegment>,
    /// The last emitted piece was an opaque unit (the cloze placeholder)
    last_opaque: bool,
    /// A cloze boundary was crossed since the last emitted piece
    pending_boundary: bool,
}

impl Transducer {
    fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            stack: Vec::new(),
            segments: Vec::new(),
            last_opaque: false,
            pending_boundary: false,
        }
    }

    fn run(mut self, html: &str) -> Result<Vec<StyledSegment>, RenderError> {
        for token in tokenize(html) {
            match token {
                Token::Start {
                    name,
                    attrs,
                    self_closing,
                } => {
                    let pushed = self.open(&name, &attrs)?;
                    if pushed && self_closing {
                        self.close(&name);
                    }
                }
                Token::End { name } => self.close(&name),
                Token::Text(raw) => self.text(raw),
            }
        }

        while let Some(element) = self.stack.pop() {
            self.finish(element);
        }
        Ok(self.segments)
    }

    fn suppressed(&self) -> bool {
        self.stack
            .iter()
            .any(|e| matches!(e.frame, Frame::Skip | Frame::HiddenCloze))
    }

    fn current_style(&self) -> TextStyle {
        self.stack
            .last()
            .map(|e| e.style.clone())
            .unwrap_or_default()
    }

    fn list_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|e| matches!(e.frame, Frame::List))
            .count()
    }

    fn push(&mut self, tag: &str, frame: Frame, style: TextStyle) -> Result<(), RenderError> {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(RenderError::NestingTooDeep {
                depth: self.stack.len() + 1,
            });
        }
        self.stack.push(OpenElement {
            tag: tag.to_string(),
            frame,
            style,
        });
        Ok(())
    }

    /// Handle a start tag; returns whether an element was pushed
    fn open(&mut self, name: &str, attrs: &[(String, String)]) -> Result<bool, RenderError> {
        let is_void = VOID_TAGS.contains(&name);

        if self.suppressed() {
            if !is_void {
                self.push(name, Frame::Inline, TextStyle::default())?;
            }
            return Ok(!is_void);
        }

        self.close_implied(name);
        let parent = self.current_style();

        if has_cloze_class(attrs) && !is_void {
            self.pending_boundary = true;
            return match self.mode {
                RenderMode::Question => {
                    self.emit(CLOZE_PLACEHOLDER, &parent, true);
                    self.pending_boundary = true;
                    self.push(name, Frame::HiddenCloze, parent)?;
                    Ok(true)
                }
                RenderMode::Answer => {
                    let mut style = element_style(name, attrs, &parent);
                    style.is_cloze = true;
                    self.push(name, Frame::Cloze, style)?;
                    Ok(true)
                }
            };
        }

        match name {
            "br" | "hr" => self.structural("\n"),
            "img" => {
                if let Some(src) = attribute(attrs, "src").filter(|s| !s.is_empty()) {
                    let filename = src_basename(src);
                    self.emit(&format!("[image: {filename}]"), &parent, false);
                }
            }
            "script" | "style" | "rp" => self.push(name, Frame::Skip, parent)?,
            "ul" | "ol" => self.push(name, Frame::List, parent)?,
            "li" => {
                let depth = self.list_depth();
                let indent: String = std::iter::repeat(INDENT_MARK)
                    .take(2 * depth.saturating_sub(1))
                    .collect();
                self.structural(&format!("\n{indent}- "));
                self.push(name, Frame::ListItem, parent)?;
            }
            "ruby" => {
                let style = element_style(name, attrs, &parent);
                self.push(name, Frame::Ruby(RubyCollector::default()), style)?;
            }
            "rt" => self.push(name, Frame::RubyText, parent)?,
            _ if BLOCK_TAGS.contains(&name) => {
                self.structural("\n");
                let style = element_style(name, attrs, &parent);
                self.push(name, Frame::Block, style)?;
            }
            _ if is_void => {}
            _ => {
                let style = element_style(name, attrs, &parent);
                self.push(name, Frame::Inline, style)?;
            }
        }
        Ok(!is_void)
    }

    /// Close elements whose end tag is optional and implied by `name` opening
    ///
    /// A new `<li>` ends the previous item of the same list, and a block or
    /// list start ends an open `<p>`. Only inline elements may sit above the
    /// element being closed.
    fn close_implied(&mut self, name: &str) {
        let implied = match name {
            "li" => "li",
            "ul" | "ol" => "p",
            _ if BLOCK_TAGS.contains(&name) => "p",
            _ => return,
        };
        let Some(idx) = self
            .stack
            .iter()
            .rposition(|e| !matches!(e.frame, Frame::Inline))
        else {
            return;
        };
        if self.stack[idx].tag == implied {
            self.close(implied);
        }
    }

    /// Close the nearest open element named `name` and everything above it
    fn close(&mut self, name: &str) {
        let Some(idx) = self.stack.iter().rposition(|e| e.tag == name) else {
            return;
        };
        while self.stack.len() > idx {
            if let Some(element) = self.stack.pop() {
                self.finish(element);
            }
        }
    }

    fn finish(&mut self, element: OpenElement) {
        match element.frame {
            Frame::ListItem | Frame::Block => self.structural("\n"),
            Frame::Ruby(collector) => {
                if let Some(unit) = collector.into_unit() {
                    self.emit(&unit, &element.style, false);
                }
            }
            Frame::Cloze | Frame::HiddenCloze => self.pending_boundary = true,
            Frame::Skip | Frame::List | Frame::RubyText | Frame::Inline => {}
        }
    }

    fn text(&mut self, raw: &str) {
        if raw.is_empty() || self.suppressed() {
            return;
        }
        let decoded = html_escape::decode_html_entities(raw);
        let mut text = decoded.replace("\r\n", "\n").replace('\r', "\n");
        if text.contains(INDENT_MARK) {
            text = text.replace(INDENT_MARK, "");
        }
        let style = self.current_style();
        self.emit(&text, &style, false);
    }

    /// Newlines, bullets and indentation; never styled, never repaired
    fn structural(&mut self, text: &str) {
        if self.collect_ruby(text) {
            return;
        }
        push_segment(&mut self.segments, text, &TextStyle::default());
        self.last_opaque = false;
        self.pending_boundary = false;
    }

    /// Append to the innermost open ruby element; false if there is none
    fn collect_ruby(&mut self, text: &str) -> bool {
        let Some(ruby_idx) = self
            .stack
            .iter()
            .rposition(|e| matches!(e.frame, Frame::Ruby(_)))
        else {
            return false;
        };
        let in_reading = self.stack[ruby_idx + 1..]
            .iter()
            .any(|e| matches!(e.frame, Frame::RubyText));
        match &mut self.stack[ruby_idx].frame {
            Frame::Ruby(collector) if in_reading => collector.reading.push_str(text),
            Frame::Ruby(collector) => collector.base.push_str(text),
            _ => return false,
        }
        true
    }

    /// Emit content, routing it into an open ruby element if there is one
    fn emit(&mut self, text: &str, style: &TextStyle, opaque: bool) {
        if text.is_empty() || self.collect_ruby(text) {
            return;
        }

        if let (Some(last), Some(next)) = (self.segments.last(), text.chars().next()) {
            let boundary = self.pending_boundary || last.style != *style;
            let joins_prev = last
                .text
                .chars()
                .next_back()
                .map(|c| self.last_opaque || is_word_char(c))
                .unwrap_or(false);
            let joins_next = opaque || is_word_char(next);
            if boundary && joins_prev && joins_next {
                push_segment(&mut self.segments, " ", &TextStyle::default());
            }
        }

        push_segment(&mut self.segments, text, style);
        self.last_opaque = opaque;
        self.pending_boundary = false;
    }
}

/// Style an element adds on top of its parent's
fn element_style(name: &str, attrs: &[(String, String)], parent: &TextStyle) -> TextStyle {
    let mut style = parent.clone();
    match name {
        "b" | "strong" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => style.bold = true,
        "i" | "em" => style.italic = true,
        "u" | "ins" => style.underline = true,
        "s" | "strike" | "del" => style.strikethrough = true,
        "font" => {
            if let Some(color) = attribute(attrs, "color").filter(|c| !c.trim().is_empty()) {
                style.color = Some(color.trim().to_string());
            }
        }
        _ => {}
    }
    if let Some(css) = attribute(attrs, "style") {
        apply_inline_style(&mut style, css);
    }
    style
}

/// Collapse whitespace line by line
///
/// - runs of inline whitespace become one space; lines are trimmed
/// - list indentation (and only list indentation) survives, in steps of two
/// - blank lines collapse to a single paragraph break
/// - leading and trailing blank lines are removed
///
/// Styles ride along with each kept character.
fn normalize_whitespace_segments(segments: &[StyledSegment]) -> Vec<StyledSegment> {
    struct Line {
        indent: usize,
        content: Vec<(char, usize)>,
    }

    let styles: Vec<&TextStyle> = segments.iter().map(|s| &s.style).collect();
    let mut raw_lines: Vec<Vec<(char, usize)>> = vec![Vec::new()];
    for (idx, segment) in segments.iter().enumerate() {
        for c in segment.text.chars() {
            if c == '\n' {
                raw_lines.push(Vec::new());
            } else if let Some(line) = raw_lines.last_mut() {
                line.push((c, idx));
            }
        }
    }

    let is_space = |c: char| c.is_whitespace() || c == INDENT_MARK;
    let mut lines: Vec<Line> = Vec::new();

    for raw in raw_lines {
        let lead = raw.iter().take_while(|(c, _)| is_space(*c)).count();
        let marks = raw[..lead].iter().filter(|(c, _)| *c == INDENT_MARK).count();

        let mut content: Vec<(char, usize)> = Vec::new();
        let mut pending_space: Option<usize> = None;
        for &(c, style_idx) in &raw[lead..] {
            if is_space(c) {
                if pending_space.is_none() {
                    pending_space = Some(style_idx);
                }
            } else {
                if let Some(space_style) = pending_space.take() {
                    content.push((' ', space_style));
                }
                content.push((c, style_idx));
            }
        }

        if !content.is_empty() {
            lines.push(Line {
                indent: marks / 2 * 2,
                content,
            });
        } else if lines.last().map_or(false, |l| !l.content.is_empty()) {
            lines.push(Line {
                indent: 0,
                content: Vec::new(),
            });
        }
    }
    while lines.last().map_or(false, |l| l.content.is_empty()) {
        lines.pop();
    }

    let plain = TextStyle::default();
    let mut out = Vec::new();
    let mut buf = [0u8; 4];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            push_segment(&mut out, "\n", &plain);
        }
        if line.indent > 0 {
            push_segment(&mut out, &" ".repeat(line.indent), &plain);
        }
        for &(c, style_idx) in &line.content {
            push_segment(&mut out, c.encode_utf8(&mut buf), styles[style_idx]);
        }
    }
    out
}

/// Whitespace pass for plain text
fn normalize_whitespace(text: &str) -> String {
    segments_text(&normalize_whitespace_segments(&[StyledSegment::plain(text)]))
}

/// Convert card HTML to plain text for terminal display
///
/// Produces:
/// - `- ` bullets with two-space indentation per nested list
/// - `base(reading)` for ruby/furigana
/// - `[image: file]` and `[audio: ref]` placeholders for media
/// - `[...]` for cloze deletions on the question side
/// - line breaks for block elements, with whitespace normalised
pub fn render_html_to_text(html: &str, mode: RenderMode) -> Result<String, RenderError> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }
    let segments = Transducer::new(mode).run(html)?;
    let text = normalize_media_tags(&segments_text(&segments));
    Ok(normalize_whitespace(&text))
}

/// Convert card HTML to styled segments
///
/// The concatenated segment text matches [`render_html_to_text`] except for
/// media tags split across differently styled runs.
pub fn render_html_to_styled_segments(
    html: &str,
    mode: RenderMode,
) -> Result<Vec<StyledSegment>, RenderError> {
    if html.trim().is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<StyledSegment> = Transducer::new(mode)
        .run(html)?
        .into_iter()
        .map(|s| StyledSegment::new(normalize_media_tags(&s.text), s.style))
        .collect();
    Ok(normalize_whitespace_segments(&segments))
}

/// Whether any element carries the `cloze` class
pub fn is_cloze_card(html: &str) -> bool {
    tokenize(html).iter().any(|token| match token {
        Token::Start { attrs, .. } => has_cloze_class(attrs),
        _ => false,
    })
}

/// Render many card fields to text in parallel, preserving order
pub fn render_fields_to_text(
    fields: &[String],
    mode: RenderMode,
) -> Vec<Result<String, RenderError>> {
    fields
        .par_iter()
        .map(|field| render_html_to_text(field, mode))
        .collect()
}
