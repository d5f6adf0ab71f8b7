//! Markdown segmentation
//!
//! Recovers the book structure from flat Markdown text: the metadata header
//! found in the first lines of the text, and the chapters delimited by
//! level 1 and level 2 headings.

use log::{debug, warn};

use crate::{
    convert::ConvertOptions,
    types::{Chapter, DefaultedField, Metadata},
};

/// Labels of the bold author line, in the two recognized languages
pub const AUTHOR_LABELS: [&str; 2] = ["Автор", "Author"];

/// Lines that only delimit chapters and never belong to a chapter body
const SEPARATOR_LINES: [&str; 3] = ["---", "***", "___"];

/// Extracts the title and the author from the head of a Markdown text
///
/// Only the first `options.metadata_scan_lines` lines are inspected. The first
/// `# ` line gives the title and the first bold author line gives the author.
///
/// # Parameters
/// - `text`: The Markdown text
/// - `file_stem`: The input file name without extension, used as fallback title
/// - `options`: Conversion options providing the sentinel values
///
/// # Return
/// The extracted metadata and the list of fields that had to be defaulted.
pub fn extract_metadata(
    text: &str,
    file_stem: &str,
    options: &ConvertOptions,
) -> (Metadata, Vec<DefaultedField>) {
    let title = find_title_line(text, options.metadata_scan_lines).map(|(_, title)| title);
    let author = text
        .lines()
        .take(options.metadata_scan_lines)
        .find_map(parse_author_line);

    let mut defaulted = Vec::new();
    let title = title.unwrap_or_else(|| {
        warn!("No title line found, using the file name \"{}\" as title.", file_stem);
        defaulted.push(DefaultedField::Title);
        file_stem.to_string()
    });
    let author = author.unwrap_or_else(|| {
        warn!("No author line found, using \"{}\".", options.unknown_author);
        defaulted.push(DefaultedField::Author);
        options.unknown_author.clone()
    });

    let metadata = Metadata {
        title: Some(title),
        author: Some(author),
        language: options.language.clone(),
        identifier: String::new(),
    };

    (metadata, defaulted)
}

/// Splits Markdown text into chapters
///
/// Every line starting with `# ` or `## ` opens a chapter. Text before the
/// first heading becomes a chapter titled with `options.preamble_title`. A
/// text without any heading becomes a single chapter titled `title`.
///
/// The metadata header written by the archive→text direction (the title line
/// followed only by the author line and separators) is not a chapter and is
/// dropped, unless nothing else is left.
pub fn segment(text: &str, title: &str, options: &ConvertOptions) -> Vec<Chapter> {
    let title_line = find_title_line(text, options.metadata_scan_lines).map(|(index, _)| index);

    let mut accumulator = ChapterAccumulator::new(options);
    for (index, line) in text.lines().enumerate() {
        match heading_text(line) {
            Some(heading) => accumulator.open(heading, Some(index) == title_line),
            None => accumulator.push_line(line),
        }
    }

    if !accumulator.seen_boundary {
        debug!("No chapter headings found, the whole text is one chapter.");
        return vec![Chapter::new(title, &normalize_body(text), 1)];
    }

    let chapters = accumulator.finish();
    debug!("Segmented text into {} chapters", chapters.len());
    chapters
}

/// Finds the first non-empty `# ` line among the first `limit` lines
fn find_title_line(text: &str, limit: usize) -> Option<(usize, String)> {
    text.lines()
        .take(limit)
        .enumerate()
        .find_map(|(index, line)| {
            let title = line.strip_prefix("# ")?.trim();
            (!title.is_empty()).then(|| (index, title.to_string()))
        })
}

/// Returns the heading text of a chapter boundary line
fn heading_text(line: &str) -> Option<&str> {
    line.strip_prefix("# ")
        .or_else(|| line.strip_prefix("## "))
        .map(str::trim)
}

/// Parses a bold author line such as `**Автор:** Лев Толстой`
///
/// The author is everything after the first colon, with the closing bold
/// marker and surrounding whitespace removed.
fn parse_author_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("**")?;
    if !AUTHOR_LABELS.iter().any(|label| rest.starts_with(label)) {
        return None;
    }

    let (label, author) = rest.split_once(':')?;
    if !AUTHOR_LABELS.contains(&label.trim_end_matches('*').trim()) {
        return None;
    }

    let author = author.trim().trim_start_matches('*').trim();
    (!author.is_empty()).then(|| author.to_string())
}

fn is_separator(line: &str) -> bool {
    SEPARATOR_LINES.contains(&line.trim())
}

/// Whether a chapter body is the author line, possibly followed by separators
///
/// Bodies made of separators alone belong to real chapters such as part
/// headings.
fn is_header_body(body: &str) -> bool {
    let lines: Vec<&str> = body.lines().filter(|line| !line.trim().is_empty()).collect();

    lines.iter().any(|line| parse_author_line(line).is_some())
        && lines
            .iter()
            .all(|line| is_separator(line) || parse_author_line(line).is_some())
}

/// Trims a chapter body and removes the separators it ends with
fn normalize_body(body: &str) -> String {
    let mut body = body.trim();
    while let Some(last) = body.lines().last() {
        if !is_separator(last) {
            break;
        }
        body = body[..body.len() - last.len()].trim();
    }

    body.to_string()
}

/// Collects lines into chapters, one boundary at a time
struct ChapterAccumulator<'a> {
    options: &'a ConvertOptions,

    current_title: Option<String>,
    current_lines: Vec<&'a str>,

    /// Whether the current chapter was opened by the metadata title line
    current_is_title: bool,

    chapters: Vec<Chapter>,

    /// The metadata header block, kept aside in case it is all there is
    header: Option<Chapter>,
    seen_boundary: bool,
}

impl<'a> ChapterAccumulator<'a> {
    fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            current_title: None,
            current_lines: Vec::new(),
            current_is_title: false,
            chapters: Vec::new(),
            header: None,
            seen_boundary: false,
        }
    }

    fn open(&mut self, title: &str, is_title_line: bool) {
        self.flush();

        self.seen_boundary = true;
        self.current_title = Some(title.to_string());
        self.current_is_title = is_title_line;
    }

    fn push_line(&mut self, line: &'a str) {
        self.current_lines.push(line);
    }

    fn flush(&mut self) {
        let raw_body = self.current_lines.join("\n");
        let body = normalize_body(&raw_body);
        self.current_lines.clear();

        let (title, may_be_header) = match self.current_title.take() {
            Some(title) => (title, self.current_is_title),

            // text before the first heading
            None if body.is_empty() => return,
            None => (self.options.preamble_title.clone(), true),
        };

        let chapter = Chapter::new(&title, &body, 0);
        if may_be_header && self.header.is_none() && is_header_body(&raw_body) {
            debug!("Dropping metadata header block \"{}\"", title);
            self.header = Some(chapter);
        } else {
            self.push(chapter);
        }
    }

    fn push(&mut self, mut chapter: Chapter) {
        chapter.order = self.chapters.len() + 1;
        if chapter.title.is_empty() {
            chapter.title = format!("Chapter {}", chapter.order);
        }

        self.chapters.push(chapter);
    }

    fn finish(mut self) -> Vec<Chapter> {
        self.flush();

        if self.chapters.is_empty() {
            if let Some(header) = self.header.take() {
                self.push(header);
            }
        }

        self.chapters
    }
}
