//! Markdown-lite: the small subset of markdown the assistant's answers use.
//!
//! Recognised syntax, all anchored at column 0 except bold:
//!
//! * `## text` sub-heading
//! * `# text` main heading
//! * `- text` list item
//! * `**text**` bold span, anywhere within a line
//!
//! Everything else is paragraph text. Blank lines end paragraphs. Runs of
//! list items that are not interrupted by a heading or a paragraph form a
//! single list.
//!
//! Text is parsed into a [`Document`] first; [`to_html`] and the native view
//! both render from it. All text is HTML-escaped on the way out.

use once_cell::sync::Lazy;
use pulldown_cmark::escape::escape_html;
use regex::Regex;

pub const EMPTY_ANSWER: &str = "No response received.";

static BOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    Main,
    Sub,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Bold(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: HeadingLevel, spans: Vec<Span> },
    List(Vec<Vec<Span>>),
    Paragraph(Vec<Span>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

enum Line<'a> {
    Heading(HeadingLevel, &'a str),
    Item(&'a str),
    Text(&'a str),
    Blank,
}

fn classify(line: &str) -> Line<'_> {
    if let Some(rest) = line.strip_prefix("## ") {
        Line::Heading(HeadingLevel::Sub, rest)
    } else if let Some(rest) = line.strip_prefix("# ") {
        Line::Heading(HeadingLevel::Main, rest)
    } else if let Some(rest) = line.strip_prefix("- ") {
        Line::Item(rest)
    } else if line.trim().is_empty() {
        Line::Blank
    } else {
        Line::Text(line)
    }
}

/// Split one line of text into plain and bold spans.
pub fn parse_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in BOLD.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span::Text(text[last..whole.start()].to_string()));
        }
        spans.push(Span::Bold(inner.as_str().to_string()));
        last = whole.end();
    }

    if last < text.len() {
        spans.push(Span::Text(text[last..].to_string()));
    }
    spans
}

pub fn parse(text: &str) -> Document {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(parse_spans(&paragraph.join("\n"))));
            paragraph.clear();
        }
    }

    for line in text.lines() {
        match classify(line) {
            Line::Heading(level, rest) => {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Heading { level, spans: parse_spans(rest) });
            }
            Line::Item(rest) => {
                flush(&mut paragraph, &mut blocks);
                match blocks.last_mut() {
                    Some(Block::List(items)) => items.push(parse_spans(rest)),
                    _ => blocks.push(Block::List(vec![parse_spans(rest)])),
                }
            }
            Line::Text(line) => paragraph.push(line),
            Line::Blank => flush(&mut paragraph, &mut blocks),
        }
    }
    flush(&mut paragraph, &mut blocks);

    Document { blocks }
}

fn push_escaped(out: &mut String, text: &str) {
    // Writing into a String cannot fail.
    let _ = escape_html(&mut *out, text);
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text);
    out
}

fn push_spans(out: &mut String, spans: &[Span]) {
    for span in spans {
        match span {
            Span::Text(t) => push_escaped(out, t),
            Span::Bold(t) => {
                out.push_str("<strong>");
                push_escaped(out, t);
                out.push_str("</strong>");
            }
        }
    }
}

pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    for block in &doc.blocks {
        match block {
            Block::Heading { level: HeadingLevel::Main, spans } => {
                out.push_str("<h2 class=\"answer-main-heading\">");
                push_spans(&mut out, spans);
                out.push_str("</h2>");
            }
            Block::Heading { level: HeadingLevel::Sub, spans } => {
                out.push_str("<h3 class=\"answer-heading\">");
                push_spans(&mut out, spans);
                out.push_str("</h3>");
            }
            Block::List(items) => {
                out.push_str("<ul class=\"answer-list\">");
                for item in items {
                    out.push_str("<li class=\"answer-list-item\">");
                    push_spans(&mut out, item);
                    out.push_str("</li>");
                }
                out.push_str("</ul>");
            }
            Block::Paragraph(spans) => {
                out.push_str("<p>");
                push_spans(&mut out, spans);
                out.push_str("</p>");
            }
        }
    }
    out
}

/// Render an answer as an HTML fragment. Absent or blank answers render a
/// fallback paragraph.
pub fn format(text: Option<&str>) -> String {
    let doc = text.map(parse).unwrap_or_default();
    if doc.is_empty() {
        return format!("<p>{}</p>", EMPTY_ANSWER);
    }
    to_html(&doc)
}
