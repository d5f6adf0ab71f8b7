//! HTML→Markdown rendering
//!
//! Turns sanitized content documents into Markdown and joins the rendered
//! chapters of a publication into a single text with a metadata header.
//!
//! The rendering policy is fixed: images are never emitted, links are kept as
//! inline Markdown links, paragraphs are never wrapped, non-ASCII text is
//! written verbatim and Markdown punctuation found in text is escaped.

use std::{
    io::{Read, Seek},
    sync::LazyLock,
};

use log::{debug, info};
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node};

use crate::{
    convert::ConvertOptions, epub::EpubDoc, error::EpubError, sanitize::sanitize,
    types::Metadata,
};

static RE_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("valid blank lines regex"));
static RE_LEADING_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]+").expect("valid leading whitespace regex"));
static RE_BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(\[[^\[\]]*\]\((?:<[^<>\n]*>|[^()\s]*)(?:\s+"(?:[^"\\]|\\.)*")?\))|\\?\[[^\[\]]*?\\?\]"#,
    )
    .expect("valid bracket regex")
});

/// Separator written after every chapter, recognized again by the segmenter
pub const CHAPTER_SEPARATOR: &str = "---";

const SKIPPED_ELEMENTS: [&str; 9] = [
    "head", "title", "script", "style", "img", "svg", "figure", "template", "button",
];

const BLOCK_ELEMENTS: [&str; 25] = [
    "address", "article", "aside", "body", "caption", "center", "dd", "details", "dialog", "div",
    "dl", "dt", "fieldset", "figcaption", "footer", "form", "header", "hgroup", "html", "main",
    "nav", "p", "section", "summary", "noscript",
];

/// Characters escaped wherever they appear in text
const ESCAPED_CHARS: [char; 6] = ['\\', '`', '*', '_', '[', ']'];

/// Converts one HTML document into normalized Markdown
///
/// The document is sanitized, rendered and post-processed. The result may be
/// blank when the document holds no text.
pub fn html_to_markdown(html: &str) -> String {
    let sanitized = sanitize(html);
    postprocess(&render(&sanitized))
}

/// Renders HTML into Markdown without any post-processing
pub fn render(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut writer = BlockWriter::default();
    walk(document.root_element(), &mut writer);

    let mut markdown = writer.finish().join("\n\n");
    if !markdown.is_empty() {
        markdown.push('\n');
    }

    markdown
}

/// Normalizes rendered Markdown
///
/// Applied in order:
/// 1. Three or more consecutive line breaks (with any whitespace between them)
///    collapse into a single blank line.
/// 2. Leading spaces and tabs are removed from every line.
/// 3. Every square-bracketed span is removed, unless it is the unescaped
///    label of an inline link. The link destination is kept as a whole.
pub fn postprocess(markdown: &str) -> String {
    let text = RE_BLANK_LINES.replace_all(markdown, "\n\n");
    let text = RE_LEADING_WHITESPACE.replace_all(&text, "");
    let text = RE_BRACKETED.replace_all(&text, |caps: &Captures| match caps.get(1) {
        Some(_) => caps[0].to_string(),
        None => String::new(),
    });

    text.into_owned()
}

/// Joins rendered chapters into the final Markdown text
///
/// When the publication has a title or an author, the text opens with a
/// header made of `# <title>`, the bold author line and a separator. Each
/// chapter is followed by its own separator. Blank chapters are left out.
pub fn compose_markdown(metadata: &Metadata, chapters: &[String], options: &ConvertOptions) -> String {
    let mut parts = Vec::with_capacity(chapters.len() * 2 + 3);

    if metadata.title.is_some() || metadata.author.is_some() {
        if let Some(title) = &metadata.title {
            parts.push(format!("# {}", title));
        }
        if let Some(author) = &metadata.author {
            parts.push(format!("**{}:** {}", options.author_label, author));
        }
        parts.push(CHAPTER_SEPARATOR.to_string());
    }

    for chapter in chapters {
        let chapter = chapter.trim();
        if chapter.is_empty() {
            continue;
        }

        parts.push(chapter.to_string());
        parts.push(CHAPTER_SEPARATOR.to_string());
    }

    let mut text = parts.join("\n\n");
    text.push('\n');
    text
}

/// Converts a whole publication into Markdown text
///
/// # Return
/// - `Ok((String, usize))`: The Markdown text and the number of chapters it holds
/// - `Err(EpubError)`: A content document could not be read or decoded
pub fn epub_to_markdown<R: Read + Seek>(
    doc: &mut EpubDoc<R>,
    options: &ConvertOptions,
) -> Result<(String, usize), EpubError> {
    let metadata = doc.metadata();

    let mut chapters = Vec::new();
    for document in doc.documents() {
        let document = document?;
        let markdown = html_to_markdown(&document.content);

        if markdown.trim().is_empty() {
            debug!("Document \"{}\" rendered no text, skipped.", document.path);
            continue;
        }
        chapters.push(markdown);
    }

    info!("Rendered {} chapters to Markdown", chapters.len());
    Ok((compose_markdown(&metadata, &chapters, options), chapters.len()))
}

/// Accumulates finished blocks and the inline text of the block being built
#[derive(Default)]
struct BlockWriter {
    blocks: Vec<String>,
    inline: String,
}

impl BlockWriter {
    /// Appends text, collapsing whitespace the way HTML rendering does
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !self.inline.is_empty() && !self.inline.ends_with([' ', '\n']) {
                    self.inline.push(' ');
                }
            } else {
                if ESCAPED_CHARS.contains(&ch) {
                    self.inline.push('\\');
                }
                self.inline.push(ch);
            }
        }
    }

    /// Appends generated markup verbatim
    fn push_raw(&mut self, markup: &str) {
        self.inline.push_str(markup);
    }

    fn hard_break(&mut self) {
        while self.inline.ends_with(' ') {
            self.inline.pop();
        }
        self.inline.push_str("  \n");
    }

    /// Closes the current paragraph
    fn flush(&mut self) {
        let text = self.inline.trim();
        if !text.is_empty() {
            self.blocks.push(escape_line_starts(text));
        }
        self.inline.clear();
    }

    fn push_block(&mut self, block: String) {
        self.flush();
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.blocks
    }
}

fn walk(element: ElementRef<'_>, writer: &mut BlockWriter) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => writer.push_text(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render_element(child, writer);
                }
            }
            _ => {}
        }
    }
}

fn render_element(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = single_line(element);
            if !text.is_empty() {
                writer.push_block(format!("{} {}", "#".repeat(level), text));
            }
        }

        "br" => writer.hard_break(),
        "hr" => writer.push_block("* * *".to_string()),

        "strong" | "b" => wrap_inline(element, writer, "**"),
        "em" | "i" => wrap_inline(element, writer, "_"),
        "del" | "s" | "strike" => wrap_inline(element, writer, "~~"),
        "code" | "kbd" | "samp" | "tt" => render_code_span(element, writer),

        "a" => render_link(element, writer),
        "pre" => render_code_block(element, writer),
        "blockquote" => render_blockquote(element, writer),
        "ul" | "ol" => render_list(element, writer, name == "ol"),
        "table" => render_table(element, writer),

        _ if BLOCK_ELEMENTS.contains(&name) => {
            writer.flush();
            walk(element, writer);
            writer.flush();
        }

        // span, sup, small and every other inline element are transparent
        _ => walk(element, writer),
    }
}

/// Renders the content of an element as a single line
fn inline(element: ElementRef<'_>) -> String {
    let mut writer = BlockWriter::default();
    walk(element, &mut writer);

    let mut parts = writer.blocks;
    parts.push(writer.inline);
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders the content of an element for a construct that cannot span lines
///
/// Hard breaks and the line breaks of nested blocks turn into spaces.
fn single_line(element: ElementRef<'_>) -> String {
    inline(element)
        .replace("  \n", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders the content of an element as a sequence of blocks
fn blocks(element: ElementRef<'_>) -> Vec<String> {
    let mut writer = BlockWriter::default();
    walk(element, &mut writer);
    writer.finish()
}

fn wrap_inline(element: ElementRef<'_>, writer: &mut BlockWriter, marker: &str) {
    let raw = element.text().collect::<String>();
    let content = inline(element);

    if raw.starts_with(char::is_whitespace) {
        writer.push_text(" ");
    }
    if !content.is_empty() {
        writer.push_raw(&format!("{marker}{content}{marker}"));
    }
    if raw.ends_with(char::is_whitespace) {
        writer.push_text(" ");
    }
}

fn render_code_span(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let code = element.text().collect::<String>();
    let code = code.split_whitespace().collect::<Vec<_>>().join(" ");
    if code.is_empty() {
        return;
    }

    let fence = if code.contains('`') { "``" } else { "`" };
    let padding = if code.starts_with('`') || code.ends_with('`') { " " } else { "" };
    writer.push_raw(&format!("{fence}{padding}{code}{padding}{fence}"));
}

fn render_link(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let href = element.value().attr("href").map(str::trim).unwrap_or_default();

    // links into the same document only make sense inside the archive
    if href.is_empty() || href.starts_with('#') {
        walk(element, writer);
        return;
    }

    let text = inline(element);
    if text.is_empty() {
        return;
    }

    let target = if href.contains(char::is_whitespace) || href.contains(['(', ')']) {
        format!("<{}>", href)
    } else {
        href.to_string()
    };

    match element.value().attr("title") {
        Some(title) if !title.trim().is_empty() => writer.push_raw(&format!(
            "[{}]({} \"{}\")",
            text,
            target,
            title.trim().replace('"', "\\\"")
        )),
        _ => writer.push_raw(&format!("[{}]({})", text, target)),
    }
}

fn render_code_block(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let code = element.text().collect::<String>();
    let code = code.strip_prefix('\n').unwrap_or(&code).trim_end();
    if code.trim().is_empty() {
        return;
    }

    let fence = if code.contains("```") { "~~~" } else { "```" };
    writer.push_block(format!("{fence}\n{code}\n{fence}"));
}

fn render_blockquote(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let quoted = blocks(element)
        .join("\n\n")
        .lines()
        .map(|line| match line {
            "" => ">".to_string(),
            line => format!("> {}", line),
        })
        .collect::<Vec<_>>()
        .join("\n");

    writer.push_block(quoted);
}

fn render_list(element: ElementRef<'_>, writer: &mut BlockWriter, ordered: bool) {
    let mut items = Vec::new();

    for child in element.children().filter_map(ElementRef::wrap) {
        let content = blocks(child).join("\n\n");
        if content.trim().is_empty() {
            continue;
        }

        let marker = match ordered {
            true => format!("{}. ", items.len() + 1),
            false => "* ".to_string(),
        };
        let indent = " ".repeat(marker.len());

        let mut item = String::new();
        for (index, line) in content.lines().enumerate() {
            match (index, line.is_empty()) {
                (0, _) => item.push_str(&marker),
                (_, true) => {}
                _ => item.push_str(&indent),
            }
            item.push_str(line);
            item.push('\n');
        }
        items.push(item.trim_end().to_string());
    }

    writer.push_block(items.join("\n"));
}

fn render_table(element: ElementRef<'_>, writer: &mut BlockWriter) {
    let rows: Vec<Vec<String>> = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|row| row.value().name() == "tr")
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| single_line(cell).replace('|', "\\|"))
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();

    let Some(columns) = rows.iter().map(Vec::len).max() else {
        return;
    };

    let format_row = |cells: &[String]| {
        let mut line = String::from("|");
        for index in 0..columns {
            line.push(' ');
            line.push_str(cells.get(index).map(String::as_str).unwrap_or_default());
            line.push_str(" |");
        }
        line
    };

    let mut lines = vec![format_row(&rows[0])];
    lines.push(format!("|{}", " --- |".repeat(columns)));
    lines.extend(rows[1..].iter().map(|row| format_row(row)));

    writer.push_block(lines.join("\n"));
}

/// Escapes characters that would start a Markdown construct at the beginning of a line
fn escape_line_starts(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            if line.starts_with(['#', '+', '-', '>']) {
                format!("\\{}", line)
            } else if digits > 0 && line[digits..].starts_with(['.', ')']) {
                format!("{}\\{}", &line[..digits], &line[digits..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
