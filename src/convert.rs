//! Conversion entry points
//!
//! The direction of a conversion is chosen once, from the declared file
//! extension: archives (`.epub`) are rendered to Markdown, text files
//! (`.md`, `.markdown`, `.txt`) are segmented and assembled into an archive.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), epub_md::error::ConversionError> {
//! use epub_md::convert::{ConvertOptions, Converter, OutputKind};
//!
//! let mut options = ConvertOptions::default();
//! options.set_language("en").set_author_label("Author");
//!
//! let converter = Converter::new(options);
//! let conversion = converter.convert_path("path/to/book.epub")?;
//! assert_eq!(conversion.kind, OutputKind::Markdown);
//!
//! let published = conversion.persist("path/to/output")?;
//! println!("Wrote {}", published.display());
//! # Ok(())
//! # }
//! ```

use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::{
    builder::{assemble, content::render_chapter, make_identifier},
    epub::EpubDoc,
    error::{ConversionError, ConversionStage, EpubError, StageContext},
    markdown::epub_to_markdown,
    segment::{extract_metadata, segment},
    types::{Book, DefaultedField},
    utils::DecodeBytes,
};

/// Options shared by both conversion directions
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Package language of generated archives
    pub language: String,

    /// Label of the bold author line written into Markdown output
    pub author_label: String,

    /// Title of the text preceding the first heading
    pub preamble_title: String,

    /// Author used when the text names none
    pub unknown_author: String,

    /// Number of leading lines searched for the title and author lines
    pub metadata_scan_lines: usize,

    /// Creation time of generated archives, the current time when unset
    pub created: Option<DateTime<Utc>>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            language: "ru".to_string(),
            author_label: "Автор".to_string(),
            preamble_title: "Introduction".to_string(),
            unknown_author: "Unknown author".to_string(),
            metadata_scan_lines: 10,
            created: None,
        }
    }
}

impl ConvertOptions {
    pub fn set_language(&mut self, language: &str) -> &mut Self {
        self.language = language.to_string();
        self
    }

    pub fn set_author_label(&mut self, label: &str) -> &mut Self {
        self.author_label = label.to_string();
        self
    }

    pub fn set_preamble_title(&mut self, title: &str) -> &mut Self {
        self.preamble_title = title.to_string();
        self
    }

    pub fn set_unknown_author(&mut self, author: &str) -> &mut Self {
        self.unknown_author = author.to_string();
        self
    }

    pub fn set_metadata_scan_lines(&mut self, lines: usize) -> &mut Self {
        self.metadata_scan_lines = lines;
        self
    }

    /// Fixes the creation time, which makes generated archives reproducible
    pub fn set_created(&mut self, created: DateTime<Utc>) -> &mut Self {
        self.created = Some(created);
        self
    }
}

/// The recognized kinds of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A packaged e-book, converted to Markdown
    Archive,

    /// Markdown or plain text, converted to a packaged e-book
    Text,
}

impl InputKind {
    /// Parses a file extension, without the leading dot
    ///
    /// The comparison ignores ASCII case.
    pub fn from_extension(extension: &str) -> Result<Self, EpubError> {
        match extension.to_ascii_lowercase().as_str() {
            "epub" => Ok(InputKind::Archive),
            "md" | "markdown" | "txt" => Ok(InputKind::Text),
            _ => Err(EpubError::UnsupportedExtension {
                extension: extension.to_string(),
            }),
        }
    }

    /// Splits a file name into its input kind and its stem
    pub fn from_file_name(file_name: &str) -> Result<(Self, &str), EpubError> {
        let path = Path::new(file_name);
        let extension = path.extension().and_then(OsStr::to_str).unwrap_or_default();
        let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or_default();

        Ok((Self::from_extension(extension)?, stem))
    }
}

/// The kind of payload a conversion produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Markdown,
    Epub,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Markdown => "md",
            OutputKind::Epub => "epub",
        }
    }
}

/// The result of a successful conversion
#[derive(Debug)]
pub struct Conversion {
    pub kind: OutputKind,

    /// UTF-8 Markdown text or archive bytes, depending on `kind`
    pub payload: Vec<u8>,

    /// Suggested output name, the input stem with the output extension
    pub file_name: String,

    /// Metadata fields that were not found and had to be defaulted
    pub defaulted: Vec<DefaultedField>,

    /// Number of chapters in the output
    pub chapters: usize,
}

impl Conversion {
    /// Publishes the payload into `dir` under the suggested file name
    ///
    /// The payload is written into a temporary file next to the target and
    /// renamed over it once complete, so a failure never leaves a partial
    /// file behind.
    ///
    /// # Return
    /// - `Ok(PathBuf)`: The path of the published file
    /// - `Err(ConversionError)`: The file could not be written, at stage [ConversionStage::Publish]
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ConversionError> {
        let dir = dir.as_ref();
        let target = dir.join(&self.file_name);

        let mut file = NamedTempFile::new_in(dir).map_err(publish_error)?;
        file.write_all(&self.payload).map_err(publish_error)?;
        file.persist(&target).map_err(|err| publish_error(err.error))?;

        info!("Published \"{}\"", target.display());
        Ok(target)
    }
}

fn publish_error(err: io::Error) -> ConversionError {
    ConversionError::new(ConversionStage::Publish, err.into())
}

/// Converter
///
/// Holds the options of a conversion. A converter owns no other state, so one
/// instance may serve any number of conversions.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    /// Converts an in-memory input
    ///
    /// # Parameters
    /// - `bytes`: The content of the input file
    /// - `file_name`: The declared file name, its extension selects the direction
    pub fn convert(&self, bytes: &[u8], file_name: &str) -> Result<Conversion, ConversionError> {
        let (kind, stem) = InputKind::from_file_name(file_name).stage(ConversionStage::Dispatch)?;
        debug!("Converting \"{}\" as {:?} input", file_name, kind);

        let conversion = match kind {
            InputKind::Archive => self.archive_to_text(bytes, stem)?,
            InputKind::Text => self.text_to_archive(bytes, file_name, stem)?,
        };

        info!(
            "Converted \"{}\" to \"{}\" ({} chapters)",
            file_name, conversion.file_name, conversion.chapters
        );
        Ok(conversion)
    }

    /// Reads a file and converts it
    ///
    /// The extension is checked before the file is read.
    pub fn convert_path(&self, path: impl AsRef<Path>) -> Result<Conversion, ConversionError> {
        let path = path.as_ref();
        let file_name = path.file_name().and_then(OsStr::to_str).unwrap_or_default();
        InputKind::from_file_name(file_name).stage(ConversionStage::Dispatch)?;

        let bytes = fs::read(path).map_err(|err| {
            ConversionError::new(
                ConversionStage::Dispatch,
                EpubError::InvalidArchive { source: err.into() },
            )
        })?;

        self.convert(&bytes, file_name)
    }

    fn archive_to_text(&self, bytes: &[u8], stem: &str) -> Result<Conversion, ConversionError> {
        let mut doc = EpubDoc::from_bytes(bytes).stage(ConversionStage::ReadArchive)?;
        let (text, chapters) =
            epub_to_markdown(&mut doc, &self.options).stage(ConversionStage::RenderMarkdown)?;

        Ok(Conversion {
            kind: OutputKind::Markdown,
            payload: text.into_bytes(),
            file_name: format!("{}.{}", stem, OutputKind::Markdown.extension()),
            defaulted: vec![],
            chapters,
        })
    }

    fn text_to_archive(
        &self,
        bytes: &[u8],
        file_name: &str,
        stem: &str,
    ) -> Result<Conversion, ConversionError> {
        let text = bytes
            .to_vec()
            .decode(file_name)
            .stage(ConversionStage::DecodeText)?;

        let (mut metadata, defaulted) = extract_metadata(&text, stem, &self.options);
        let title = metadata.title.clone().unwrap_or_else(|| stem.to_string());
        let chapters = segment(&text, &title, &self.options);

        let created = self.options.created.unwrap_or_else(Utc::now);
        metadata.identifier = make_identifier(&title, created);

        let chapters = chapters
            .iter()
            .map(|chapter| render_chapter(chapter, &metadata.language))
            .collect::<Result<Vec<_>, _>>()
            .stage(ConversionStage::Assemble)?;
        let book = Book { metadata, chapters };
        let payload = assemble(&book, created).stage(ConversionStage::Assemble)?;

        Ok(Conversion {
            kind: OutputKind::Epub,
            payload,
            file_name: format!("{}.{}", stem, OutputKind::Epub.extension()),
            defaulted,
            chapters: book.chapters.len(),
        })
    }
}

/// Converts an in-memory input with the default options
pub fn convert(bytes: &[u8], file_name: &str) -> Result<Conversion, ConversionError> {
    Converter::default().convert(bytes, file_name)
}
