//! Content Builder
//!
//! This module turns the Markdown body of a chapter into a self-contained
//! XHTML content document with an embedded stylesheet.
//!
//! ## Usage
//! ```rust
//! # fn main() -> Result<(), epub_md::error::EpubError> {
//! use epub_md::builder::content::ContentBuilder;
//!
//! let mut builder = ContentBuilder::new("en");
//! builder
//!     .set_title("My Chapter")
//!     .add_markdown("This is my *first* chapter.");
//! let document = builder.make()?;
//! assert!(document.contains("<em>first</em>"));
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;

use pulldown_cmark::{Event as MdEvent, Options, Parser as MdParser, html};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{error::EpubError, types::Chapter};

/// Stylesheet embedded into every generated content document
pub const STYLESHEET: &str = r#"
body { font-family: Georgia, serif; line-height: 1.6; margin: 1em; }
h1, h2, h3, h4, h5, h6 { font-family: serif; line-height: 1.2; margin: 1.2em 0 0.6em; }
p { text-align: justify; text-indent: 1.5em; margin: 0 0 0.5em; }
blockquote { margin: 1em 2em; padding-left: 1em; border-left: 3px solid #ccc; font-style: italic; }
code { font-family: monospace; background-color: #f4f4f4; padding: 0.1em 0.3em; }
pre { font-family: monospace; background-color: #f4f4f4; padding: 0.8em; white-space: pre-wrap; }
pre code { padding: 0; }
table { border-collapse: collapse; margin: 1em 0; }
th, td { border: 1px solid #ccc; padding: 0.3em 0.6em; }
hr { border: none; border-top: 1px solid #ccc; margin: 2em 0; }
"#;

/// Markdown extensions enabled for chapter bodies
fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Renders Markdown into an HTML fragment
///
/// Raw HTML embedded in the Markdown is written as text, so the fragment is
/// always well-formed enough to live inside an XHTML document.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = MdParser::new_ext(markdown, markdown_options()).map(|event| match event {
        MdEvent::Html(raw) | MdEvent::InlineHtml(raw) => MdEvent::Text(raw),
        event => event,
    });

    let mut fragment = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut fragment, parser);
    fragment
}

/// Content Builder
///
/// Collects the Markdown of a chapter and writes the final XHTML document.
#[derive(Debug)]
pub struct ContentBuilder {
    /// Document language, written to `xml:lang`
    pub language: String,

    /// Document title, written to `<title>` and as the leading `<h1>`
    pub title: String,

    fragment: String,
}

impl ContentBuilder {
    /// Creates a new content builder
    ///
    /// # Parameters
    /// - `language`: The language of the document
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            title: String::new(),
            fragment: String::new(),
        }
    }

    /// Sets the title of the document
    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    /// Renders Markdown and appends it to the document body
    pub fn add_markdown(&mut self, markdown: &str) -> &mut Self {
        self.fragment.push_str(&markdown_to_html(markdown));
        self
    }

    /// Writes the XHTML document
    ///
    /// # Return
    /// - `Ok(String)`: The complete content document
    /// - `Err(EpubError)`: Error occurred while writing
    pub fn make(&self) -> Result<String, EpubError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::DocType(BytesText::from_escaped("html")))?;
        writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
            ("xmlns", "http://www.w3.org/1999/xhtml"),
            ("xmlns:epub", "http://www.idpf.org/2007/ops"),
            ("xml:lang", self.language.as_str()),
        ])))?;

        // make head
        writer.write_event(Event::Start(BytesStart::new("head")))?;
        writer.write_event(Event::Start(BytesStart::new("title")))?;
        writer.write_event(Event::Text(BytesText::new(&self.title)))?;
        writer.write_event(Event::End(BytesEnd::new("title")))?;
        writer.write_event(Event::Start(
            BytesStart::new("style").with_attributes([("type", "text/css")]),
        ))?;
        writer.write_event(Event::Text(BytesText::from_escaped(STYLESHEET)))?;
        writer.write_event(Event::End(BytesEnd::new("style")))?;
        writer.write_event(Event::End(BytesEnd::new("head")))?;

        // make body
        writer.write_event(Event::Start(BytesStart::new("body")))?;
        writer.write_event(Event::Start(BytesStart::new("h1")))?;
        writer.write_event(Event::Text(BytesText::new(&self.title)))?;
        writer.write_event(Event::End(BytesEnd::new("h1")))?;
        writer.write_event(Event::Text(BytesText::from_escaped(self.fragment.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new("body")))?;
        writer.write_event(Event::End(BytesEnd::new("html")))?;

        let data = writer.into_inner().into_inner();
        String::from_utf8(data).map_err(|source| EpubError::DecodeError {
            resource: self.title.clone(),
            source,
        })
    }
}

/// Renders a Markdown chapter into its XHTML form
///
/// The returned chapter keeps title and order; its body is the complete
/// content document.
pub fn render_chapter(chapter: &Chapter, language: &str) -> Result<Chapter, EpubError> {
    let mut builder = ContentBuilder::new(language);
    builder.set_title(&chapter.title).add_markdown(&chapter.body);

    Ok(Chapter {
        title: chapter.title.clone(),
        body: builder.make()?,
        order: chapter.order,
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        builder::content::{ContentBuilder, STYLESHEET, markdown_to_html, render_chapter},
        types::Chapter,
        utils::XmlReader,
    };

    #[test]
    fn test_markdown_extensions() {
        let fragment = markdown_to_html(
            "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~ \"quoted\"\n\n- [x] done\n\nNote[^1].\n\n[^1]: The note.\n\n```rust\nlet x = 1;\n```\n",
        );

        assert!(fragment.contains("<table>"));
        assert!(fragment.contains("<td>1</td>"));
        assert!(fragment.contains("<del>old</del>"));
        assert!(fragment.contains("\u{201c}quoted\u{201d}"));
        assert!(fragment.contains("checkbox"));
        assert!(fragment.contains("footnote-definition"));
        assert!(fragment.contains("<code class=\"language-rust\">let x = 1;\n</code>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let fragment = markdown_to_html("Text <span>inline</span>\n\n<div>\nblock\n</div>\n");
        assert!(!fragment.contains("<span>"));
        assert!(fragment.contains("&lt;span&gt;inline&lt;/span&gt;"));
        assert!(!fragment.contains("<div>"));
    }

    #[test]
    fn test_make_content() {
        let mut builder = ContentBuilder::new("ru");
        builder.set_title("Глава & <1>").add_markdown("Привет, **мир**!");

        let document = builder.make().unwrap();
        assert!(document.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><!DOCTYPE html>"));
        assert!(document.contains("xml:lang=\"ru\""));
        assert!(document.contains("<title>Глава &amp; &lt;1&gt;</title>"));
        assert!(document.contains("<h1>Глава &amp; &lt;1&gt;</h1>"));
        assert!(document.contains("<p>Привет, <strong>мир</strong>!</p>"));
        assert!(document.contains(STYLESHEET));
        assert!(!document.contains("<link"));
    }

    #[test]
    fn test_rendered_chapter_is_well_formed() {
        let chapter = Chapter::new(
            "Chapter 1",
            "Line one  \nLine two\n\n* * *\n\n> quote\n\n1. a\n2. b\n\nA & B < C",
            3,
        );

        let rendered = render_chapter(&chapter, "en").unwrap();
        assert_eq!(rendered.title, "Chapter 1");
        assert_eq!(rendered.order, 3);

        let root = XmlReader::parse(&rendered.body, "chapter_3.xhtml").unwrap();
        assert_eq!(root.name, "html");
        assert_eq!(root.find_elements_by_name("title").next().unwrap().text(), "Chapter 1");
        assert_eq!(root.find_elements_by_name("li").count(), 2);
        assert!(root.find_elements_by_name("hr").next().is_some());
        assert!(root.find_elements_by_name("br").next().is_some());
    }
}
