//! Epub ⇄ Markdown converter
//!
//! A Rust library for converting EPUB eBook files into Markdown text and
//! Markdown text back into EPUB 3 files.
//!
//! The archive→text direction reads the package document of an EPUB file,
//! sanitizes every content document in reading order and renders it to
//! Markdown, prefixed by a title and author header. The text→archive direction
//! recovers the title and author from the head of the text, splits it into
//! chapters at its level 1 and level 2 headings, and assembles a new EPUB file
//! with one styled content document per chapter.
//!
//! ## Features
//!
//! - Parse EPUB container, package document and spine, with lazy document access.
//! - Structural HTML sanitizing and HTML→Markdown rendering with fixed policies.
//! - Heading based segmentation with metadata extraction and fallbacks.
//! - In-memory EPUB 3 assembly with navigation document and NCX.
//! - Stage annotated errors and atomic publication of the result.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("path/to/book.epub")?;
//!
//! // The declared file name selects the direction
//! let conversion = epub_md::convert(&bytes, "book.epub")?;
//! println!("{}", String::from_utf8(conversion.payload)?);
//!
//! # Ok(())
//! # }
//! ```
//!
//! The crate logs through the `log` facade and never installs a logger.

pub(crate) mod utils;

pub mod builder;
pub mod convert;
pub mod epub;
pub mod error;
pub mod markdown;
pub mod sanitize;
pub mod segment;
pub mod types;

pub use convert::{ConvertOptions, Conversion, Converter, InputKind, OutputKind, convert};
pub use epub::EpubDoc;
pub use utils::DecodeBytes;
