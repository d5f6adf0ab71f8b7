//! Epub Builder
//!
//! This module provides functionality for creating EPUB 3.0 archives in memory.
//! The `EpubBuilder` structure collects metadata, resources and navigation
//! information and serializes them into a zip container; [assemble] drives it
//! for a segmented [Book].
//!
//! ## Usage
//!
//! ```rust
//! # fn main() -> Result<(), epub_md::error::EpubError> {
//! use epub_md::{
//!     builder::EpubBuilder,
//!     types::{ManifestItem, MetadataItem, NavPoint, SpineItem},
//! };
//!
//! let mut builder = EpubBuilder::new();
//! builder
//!     .add_rootfile("OEBPS/content.opf")
//!     .add_metadata(MetadataItem::new("title", "Test Book"))
//!     .add_metadata(MetadataItem::new("language", "en"))
//!     .add_metadata(MetadataItem::new("identifier", "test-book").with_id("pub-id"))
//!     .add_resource(
//!         ManifestItem::new("content", "content.xhtml", "application/xhtml+xml"),
//!         b"<html xmlns=\"http://www.w3.org/1999/xhtml\"/>".to_vec(),
//!     )
//!     .add_spine(SpineItem::new("content"))
//!     .add_catalog_item(NavPoint::new("Content").with_content("content.xhtml").with_play_order(1));
//!
//! let bytes = builder.make_bytes()?;
//! assert!(!bytes.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod content;

use std::{
    collections::HashMap,
    io::{Cursor, Seek, Write},
};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use log::{debug, info};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use zip::{CompressionMethod, ZipWriter, result::ZipError, write::FileOptions};

use crate::{
    error::EpubError,
    types::{Book, ManifestItem, MetadataItem, NavPoint, SpineItem},
    utils::{ELEMENT_IN_DC_NAMESPACE, parent_dir, resolve_href, slugify},
};

pub(crate) type XmlWriter = Writer<Cursor<Vec<u8>>>;

const NAV_ID: &str = "nav";
const NCX_ID: &str = "ncx";

/// EPUB Builder
///
/// The main structure used to create EPUB archives. Resources are held in
/// memory and written to the sink in a single pass by [EpubBuilder::make].
pub struct EpubBuilder {
    /// List of root file paths
    rootfiles: Vec<String>,

    /// List of metadata items
    metadata: Vec<MetadataItem>,

    /// Manifest items in insertion order, keyed by id
    manifest: IndexMap<String, ManifestItem>,

    /// Resource data, keyed by manifest id
    resources: HashMap<String, Vec<u8>>,

    /// List of spine items, defining the reading order
    spine: Vec<SpineItem>,

    catalog_title: String,

    /// List of catalog navigation points
    catalog: Vec<NavPoint>,

    /// Written as `dcterms:modified`
    modified: DateTime<Utc>,
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubBuilder {
    /// Create a new `EpubBuilder` instance
    pub fn new() -> Self {
        EpubBuilder {
            rootfiles: vec![],
            metadata: vec![],
            manifest: IndexMap::new(),
            resources: HashMap::new(),
            spine: vec![],

            catalog_title: String::new(),
            catalog: vec![],
            modified: Utc::now(),
        }
    }

    /// Add a rootfile path
    ///
    /// The added path points to the OPF file that will be created when building
    /// the Epub file. All resource paths are relative to its directory.
    ///
    /// # Parameters
    /// - `rootfile`: Rootfile path
    pub fn add_rootfile(&mut self, rootfile: &str) -> &mut Self {
        self.rootfiles.push(rootfile.to_string());
        self
    }

    /// Add metadata item
    ///
    /// Required metadata includes title, language, and an identifier with 'pub-id'.
    /// Missing this data will result in an error when building the epub file.
    ///
    /// # Parameters
    /// - `item`: Metadata items to add
    pub fn add_metadata(&mut self, item: MetadataItem) -> &mut Self {
        self.metadata.push(item);
        self
    }

    /// Add manifest item and the data of the corresponding resource
    ///
    /// # Parameters
    /// - `item`: Manifest item information, its path relative to the OPF file
    /// - `data`: The content of the resource
    pub fn add_resource(&mut self, item: ManifestItem, data: Vec<u8>) -> &mut Self {
        self.resources.insert(item.id.clone(), data);
        self.manifest.insert(item.id.clone(), item);
        self
    }

    /// Add spine item
    ///
    /// The spine item defines the reading order of the book.
    ///
    /// # Parameters
    /// - `item`: Spine item to add
    pub fn add_spine(&mut self, item: SpineItem) -> &mut Self {
        self.spine.push(item);
        self
    }

    /// Set catalog title
    pub fn set_catalog_title(&mut self, title: &str) -> &mut Self {
        self.catalog_title = title.to_string();
        self
    }

    /// Add catalog item
    ///
    /// Added directory items will be added to the end of the existing list.
    pub fn add_catalog_item(&mut self, item: NavPoint) -> &mut Self {
        self.catalog.push(item);
        self
    }

    /// Set the modification time written to the package
    pub fn set_modified(&mut self, modified: DateTime<Utc>) -> &mut Self {
        self.modified = modified;
        self
    }

    /// Builds the EPUB archive and writes it to a sink
    ///
    /// The `mimetype` entry is written first and uncompressed, followed by the
    /// container descriptor, the package document and every resource in
    /// manifest order.
    ///
    /// # Parameters
    /// - `sink`: Output of the zip archive
    ///
    /// # Return
    /// - `Ok(W)`: Build successful, the sink is handed back
    /// - `Err(EpubError)`: Validation failed or the sink could not be written
    pub fn make<W: Write + Seek>(mut self, sink: W) -> Result<W, EpubError> {
        // The navigation documents register themselves in the manifest,
        // so they must be created before the opf file is created.
        let container = self.make_container_xml()?;
        self.make_navigation_document()?;
        self.make_ncx()?;
        let package = self.make_opf_file()?;

        let base_path = parent_dir(&self.rootfiles[0]).to_string();
        let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        let deflated =
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(sink);
        zip.start_file("mimetype", stored).map_err(write_error)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)
            .map_err(write_error)?;
        zip.write_all(&container)?;

        zip.start_file(self.rootfiles[0].as_str(), deflated)
            .map_err(write_error)?;
        zip.write_all(&package)?;

        for (id, item) in &self.manifest {
            let Some(data) = self.resources.get(id) else {
                continue;
            };
            let target_path = resolve_href(&base_path, &item.path).ok_or_else(|| {
                EpubError::RelativeLinkLeakage {
                    path: item.path.clone(),
                }
            })?;

            zip.start_file(target_path, deflated).map_err(write_error)?;
            zip.write_all(data)?;
        }

        let sink = zip.finish().map_err(write_error)?;
        debug!("Wrote archive with {} manifest items", self.manifest.len());
        Ok(sink)
    }

    /// Builds the EPUB archive into a byte buffer
    pub fn make_bytes(self) -> Result<Vec<u8>, EpubError> {
        self.make(Cursor::new(Vec::new())).map(Cursor::into_inner)
    }

    /// Creates the `container.xml` file
    ///
    /// An error will occur if the `rootfile` path is not set
    fn make_container_xml(&self) -> Result<Vec<u8>, EpubError> {
        if self.rootfiles.is_empty() {
            return Err(EpubError::NonCanonicalPackage {
                tag: "rootfile".to_string(),
            });
        }

        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer.write_event(Event::Start(BytesStart::new("container").with_attributes(
            [
                ("version", "1.0"),
                ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
            ],
        )))?;
        writer.write_event(Event::Start(BytesStart::new("rootfiles")))?;

        for rootfile in &self.rootfiles {
            writer.write_event(Event::Empty(BytesStart::new("rootfile").with_attributes([
                ("full-path", rootfile.as_str()),
                ("media-type", "application/oebps-package+xml"),
            ])))?;
        }

        writer.write_event(Event::End(BytesEnd::new("rootfiles")))?;
        writer.write_event(Event::End(BytesEnd::new("container")))?;

        Ok(writer.into_inner().into_inner())
    }

    /// Creates the `navigation document`
    ///
    /// The document lists the catalog in play order and is registered in the
    /// manifest with the `nav` property.
    fn make_navigation_document(&mut self) -> Result<(), EpubError> {
        self.catalog.sort();

        let language = self.metadata_value("language").unwrap_or_default().to_string();
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::DocType(BytesText::from_escaped("html")))?;
        writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
            ("xmlns", "http://www.w3.org/1999/xhtml"),
            ("xmlns:epub", "http://www.idpf.org/2007/ops"),
            ("xml:lang", language.as_str()),
        ])))?;

        // make head
        writer.write_event(Event::Start(BytesStart::new("head")))?;
        writer.write_event(Event::Start(BytesStart::new("title")))?;
        writer.write_event(Event::Text(BytesText::new(&self.catalog_title)))?;
        writer.write_event(Event::End(BytesEnd::new("title")))?;
        writer.write_event(Event::End(BytesEnd::new("head")))?;

        // make body
        writer.write_event(Event::Start(BytesStart::new("body")))?;
        writer.write_event(Event::Start(
            BytesStart::new("nav").with_attributes([("epub:type", "toc"), ("id", "toc")]),
        ))?;

        if !self.catalog_title.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("h1")))?;
            writer.write_event(Event::Text(BytesText::new(&self.catalog_title)))?;
            writer.write_event(Event::End(BytesEnd::new("h1")))?;
        }

        Self::make_nav(&mut writer, &self.catalog)?;

        writer.write_event(Event::End(BytesEnd::new("nav")))?;
        writer.write_event(Event::End(BytesEnd::new("body")))?;
        writer.write_event(Event::End(BytesEnd::new("html")))?;

        self.add_resource(
            ManifestItem::new(NAV_ID, "nav.xhtml", "application/xhtml+xml").append_property("nav"),
            writer.into_inner().into_inner(),
        );

        Ok(())
    }

    /// Creates the logical table of contents (`toc.ncx`)
    ///
    /// Readers without EPUB 3 navigation support use it instead of the
    /// navigation document.
    fn make_ncx(&mut self) -> Result<(), EpubError> {
        let uid = self
            .metadata
            .iter()
            .find(|item| item.property == "identifier" && item.id.as_deref() == Some("pub-id"))
            .map(|item| item.value.clone())
            .unwrap_or_default();
        let title = self.metadata_value("title").unwrap_or_default().to_string();

        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("ncx").with_attributes([
            ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
            ("version", "2005-1"),
        ])))?;

        writer.write_event(Event::Start(BytesStart::new("head")))?;
        let depth = Self::catalog_depth(&self.catalog).max(1).to_string();
        for (name, content) in [
            ("dtb:uid", uid.as_str()),
            ("dtb:depth", depth.as_str()),
            ("dtb:totalPageCount", "0"),
            ("dtb:maxPageNumber", "0"),
        ] {
            writer.write_event(Event::Empty(
                BytesStart::new("meta").with_attributes([("name", name), ("content", content)]),
            ))?;
        }
        writer.write_event(Event::End(BytesEnd::new("head")))?;

        writer.write_event(Event::Start(BytesStart::new("docTitle")))?;
        writer.write_event(Event::Start(BytesStart::new("text")))?;
        writer.write_event(Event::Text(BytesText::new(&title)))?;
        writer.write_event(Event::End(BytesEnd::new("text")))?;
        writer.write_event(Event::End(BytesEnd::new("docTitle")))?;

        writer.write_event(Event::Start(BytesStart::new("navMap")))?;
        let mut play_order = 0;
        Self::make_nav_points(&mut writer, &self.catalog, &mut play_order)?;
        writer.write_event(Event::End(BytesEnd::new("navMap")))?;

        writer.write_event(Event::End(BytesEnd::new("ncx")))?;

        self.add_resource(
            ManifestItem::new(NCX_ID, "toc.ncx", "application/x-dtbncx+xml"),
            writer.into_inner().into_inner(),
        );

        Ok(())
    }

    /// Creates the `OPF` file
    ///
    /// # Error conditions
    /// - Missing necessary metadata
    /// - More than one navigation document in the manifest
    fn make_opf_file(&mut self) -> Result<Vec<u8>, EpubError> {
        if !self.validate_metadata() {
            return Err(EpubError::MissingNecessaryMetadata);
        }
        self.validate_manifest_nav()?;

        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer.write_event(Event::Start(BytesStart::new("package").with_attributes([
            ("xmlns", "http://www.idpf.org/2007/opf"),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("unique-identifier", "pub-id"),
            ("version", "3.0"),
        ])))?;

        self.make_opf_metadata(&mut writer)?;
        self.make_opf_manifest(&mut writer)?;
        self.make_opf_spine(&mut writer)?;

        writer.write_event(Event::End(BytesEnd::new("package")))?;

        Ok(writer.into_inner().into_inner())
    }

    fn make_opf_metadata(&mut self, writer: &mut XmlWriter) -> Result<(), EpubError> {
        self.metadata.push(MetadataItem::new(
            "dcterms:modified",
            &self.modified.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));

        writer.write_event(Event::Start(BytesStart::new("metadata")))?;

        for metadata in &self.metadata {
            let tag_name = if ELEMENT_IN_DC_NAMESPACE.contains(&metadata.property.as_str()) {
                format!("dc:{}", metadata.property)
            } else {
                "meta".to_string()
            };

            writer.write_event(Event::Start(
                BytesStart::new(tag_name.as_str()).with_attributes(metadata.attributes()),
            ))?;
            writer.write_event(Event::Text(BytesText::new(metadata.value.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(tag_name.as_str())))?;
        }

        writer.write_event(Event::End(BytesEnd::new("metadata")))?;

        Ok(())
    }

    fn make_opf_manifest(&self, writer: &mut XmlWriter) -> Result<(), EpubError> {
        writer.write_event(Event::Start(BytesStart::new("manifest")))?;

        for manifest in self.manifest.values() {
            writer.write_event(Event::Empty(
                BytesStart::new("item").with_attributes(manifest.attributes()),
            ))?;
        }

        writer.write_event(Event::End(BytesEnd::new("manifest")))?;

        Ok(())
    }

    fn make_opf_spine(&self, writer: &mut XmlWriter) -> Result<(), EpubError> {
        writer.write_event(Event::Start(
            BytesStart::new("spine").with_attributes([("toc", NCX_ID)]),
        ))?;

        for spine in &self.spine {
            writer.write_event(Event::Empty(
                BytesStart::new("itemref").with_attributes(spine.attributes()),
            ))?;
        }

        writer.write_event(Event::End(BytesEnd::new("spine")))?;

        Ok(())
    }

    fn make_nav(writer: &mut XmlWriter, navigations: &[NavPoint]) -> Result<(), EpubError> {
        writer.write_event(Event::Start(BytesStart::new("ol")))?;

        for nav in navigations {
            writer.write_event(Event::Start(BytesStart::new("li")))?;

            if let Some(path) = &nav.content {
                writer.write_event(Event::Start(
                    BytesStart::new("a").with_attributes([("href", path.to_string_lossy())]),
                ))?;
                writer.write_event(Event::Text(BytesText::new(nav.label.as_str())))?;
                writer.write_event(Event::End(BytesEnd::new("a")))?;
            } else {
                writer.write_event(Event::Start(BytesStart::new("span")))?;
                writer.write_event(Event::Text(BytesText::new(nav.label.as_str())))?;
                writer.write_event(Event::End(BytesEnd::new("span")))?;
            }

            if !nav.children.is_empty() {
                Self::make_nav(writer, &nav.children)?;
            }

            writer.write_event(Event::End(BytesEnd::new("li")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("ol")))?;

        Ok(())
    }

    /// Writes `navPoint` elements, numbering them depth first
    fn make_nav_points(
        writer: &mut XmlWriter,
        navigations: &[NavPoint],
        play_order: &mut usize,
    ) -> Result<(), EpubError> {
        for nav in navigations {
            *play_order += 1;
            let id = format!("navpoint-{}", play_order);
            let order = play_order.to_string();

            writer.write_event(Event::Start(
                BytesStart::new("navPoint")
                    .with_attributes([("id", id.as_str()), ("playOrder", order.as_str())]),
            ))?;
            writer.write_event(Event::Start(BytesStart::new("navLabel")))?;
            writer.write_event(Event::Start(BytesStart::new("text")))?;
            writer.write_event(Event::Text(BytesText::new(nav.label.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("text")))?;
            writer.write_event(Event::End(BytesEnd::new("navLabel")))?;

            if let Some(path) = &nav.content {
                writer.write_event(Event::Empty(
                    BytesStart::new("content").with_attributes([("src", path.to_string_lossy())]),
                ))?;
            }

            Self::make_nav_points(writer, &nav.children, play_order)?;
            writer.write_event(Event::End(BytesEnd::new("navPoint")))?;
        }

        Ok(())
    }

    fn catalog_depth(navigations: &[NavPoint]) -> usize {
        navigations
            .iter()
            .map(|nav| 1 + Self::catalog_depth(&nav.children))
            .max()
            .unwrap_or(0)
    }

    fn metadata_value(&self, property: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|item| item.property == property)
            .map(|item| item.value.as_str())
    }

    /// Verify metadata integrity
    ///
    /// Check if the required metadata items are included: title, language, and identifier with pub-id.
    fn validate_metadata(&self) -> bool {
        let has_title = self.metadata.iter().any(|item| item.property == "title");
        let has_language = self.metadata.iter().any(|item| item.property == "language");
        let has_identifier = self.metadata.iter().any(|item| {
            item.property == "identifier"
                && !item.value.is_empty()
                && item.id.as_ref().is_some_and(|id| id == "pub-id")
        });

        has_title && has_identifier && has_language
    }

    /// Validate navigation list items
    ///
    /// Check if there is only one list item with the `nav` property.
    fn validate_manifest_nav(&self) -> Result<(), EpubError> {
        let nav_count = self
            .manifest
            .values()
            .filter(|item| item.has_property("nav"))
            .count();

        if nav_count == 1 {
            Ok(())
        } else {
            Err(EpubError::TooManyNavFlags)
        }
    }
}

fn write_error(source: ZipError) -> EpubError {
    EpubError::WriteError { source }
}

/// Derives the package identifier from the title and the creation time
///
/// The identifier is the slug of the title followed by the time stamp, e.g.
/// `война-и-мир-20240305060708`.
pub fn make_identifier(title: &str, created: DateTime<Utc>) -> String {
    format!("{}-{}", slugify(title), created.format("%Y%m%d%H%M%S"))
}

/// Assembles a book whose chapter bodies are XHTML content documents
///
/// The archive holds `OEBPS/chapter_<n>.xhtml` for every chapter, a navigation
/// document and a `toc.ncx` mirroring the chapter titles, and a spine of
/// `[nav, chapter_1, …, chapter_N]`.
///
/// # Parameters
/// - `book`: The book, with rendered chapters and a filled identifier
/// - `created`: Written as the package modification time
pub fn assemble(book: &Book, created: DateTime<Utc>) -> Result<Vec<u8>, EpubError> {
    let metadata = &book.metadata;
    let title = metadata.title.as_deref().unwrap_or_default();

    let mut builder = EpubBuilder::new();
    builder
        .add_rootfile("OEBPS/content.opf")
        .set_modified(created)
        .set_catalog_title(title)
        .add_metadata(MetadataItem::new("identifier", &metadata.identifier).with_id("pub-id"))
        .add_metadata(MetadataItem::new("language", &metadata.language))
        .add_spine(SpineItem::new(NAV_ID));

    if let Some(title) = &metadata.title {
        builder.add_metadata(MetadataItem::new("title", title));
    }
    if let Some(author) = &metadata.author {
        builder.add_metadata(MetadataItem::new("creator", author));
    }

    for chapter in &book.chapters {
        let id = format!("chapter_{}", chapter.order);
        let file_name = chapter.file_name();

        builder
            .add_resource(
                ManifestItem::new(&id, &file_name, "application/xhtml+xml"),
                chapter.body.as_bytes().to_vec(),
            )
            .add_spine(SpineItem::new(&id))
            .add_catalog_item(
                NavPoint::new(&chapter.title)
                    .with_content(&file_name)
                    .with_play_order(chapter.order),
            );
    }

    let bytes = builder.make_bytes()?;
    info!(
        "Assembled archive \"{}\" with {} chapters ({} bytes)",
        metadata.identifier,
        book.chapters.len(),
        bytes.len()
    );

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Seek, SeekFrom, Write};

    use chrono::{TimeZone, Utc};
    use zip::{CompressionMethod, ZipArchive};

    use crate::{
        builder::{EpubBuilder, assemble, content::render_chapter, make_identifier},
        epub::EpubDoc,
        error::{EpubError, ErrorKind},
        types::{Book, Chapter, ManifestItem, Metadata, MetadataItem, NavPoint, SpineItem},
        utils::{DecodeBytes, XmlReader, get_file_in_zip_archive},
    };

    fn minimal_builder() -> EpubBuilder {
        let mut builder = EpubBuilder::new();
        builder
            .add_rootfile("OEBPS/content.opf")
            .add_metadata(MetadataItem::new("title", "Test Book"))
            .add_metadata(MetadataItem::new("language", "en"))
            .add_metadata(MetadataItem::new("identifier", "test-book").with_id("pub-id"))
            .add_resource(
                ManifestItem::new("c1", "text/c1.xhtml", "application/xhtml+xml"),
                b"<html xmlns=\"http://www.w3.org/1999/xhtml\"><body><p>One</p></body></html>"
                    .to_vec(),
            )
            .add_spine(SpineItem::new("c1"))
            .add_catalog_item(NavPoint::new("One").with_content("text/c1.xhtml").with_play_order(1));
        builder
    }

    fn sample_book() -> Book {
        let chapters = vec![
            Chapter::new("Book One", "Melange.", 1),
            Chapter::new("Book Two", "Arrakis & *water*.", 2),
        ];

        Book {
            metadata: Metadata {
                title: Some("Dune".to_string()),
                author: Some("Frank Herbert".to_string()),
                language: "en".to_string(),
                identifier: "dune-20240305060708".to_string(),
            },
            chapters: chapters
                .iter()
                .map(|chapter| render_chapter(chapter, "en").unwrap())
                .collect(),
        }
    }

    /// A sink that refuses every write
    #[derive(Debug)]
    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailingSink {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_make_identifier() {
        let created = Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap();
        assert_eq!(make_identifier("Война и мир", created), "война-и-мир-20240305060708");
        assert_eq!(make_identifier("!!!", created), "book-20240305060708");
    }

    #[test]
    fn test_make_container_xml() {
        let builder = minimal_builder();
        let container = builder.make_container_xml().unwrap().decode("container.xml").unwrap();

        assert_eq!(
            container,
            r#"<?xml version="1.0" encoding="UTF-8"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#
        );
    }

    #[test]
    fn test_missing_rootfile() {
        let mut builder = EpubBuilder::new();
        builder.add_metadata(MetadataItem::new("title", "Test Book"));

        let result = builder.make_bytes();
        assert_eq!(
            result.unwrap_err(),
            EpubError::NonCanonicalPackage {
                tag: "rootfile".to_string()
            }
        );
    }

    #[test]
    fn test_missing_necessary_metadata() {
        let mut builder = EpubBuilder::new();
        builder
            .add_rootfile("OEBPS/content.opf")
            .add_metadata(MetadataItem::new("title", "Test Book"))
            .add_metadata(MetadataItem::new("identifier", "test-book").with_id("pub-id"));

        let err = builder.make_bytes().unwrap_err();
        assert_eq!(err, EpubError::MissingNecessaryMetadata);
        assert_eq!(
            err.to_string(),
            "Requires at least one 'title', 'language', and 'identifier' with id 'pub-id'."
        );
    }

    #[test]
    fn test_too_many_nav_flags() {
        let mut builder = minimal_builder();
        builder.add_resource(
            ManifestItem::new("nav2", "nav2.xhtml", "application/xhtml+xml").append_property("nav"),
            b"<html/>".to_vec(),
        );

        let err = builder.make_bytes().unwrap_err();
        assert_eq!(err, EpubError::TooManyNavFlags);
        assert_eq!(err.kind(), ErrorKind::WriteError);
    }

    #[test]
    fn test_failing_sink() {
        let err = minimal_builder().make(FailingSink).unwrap_err();

        assert!(matches!(err, EpubError::WriteError { .. }));
        assert_eq!(err.kind(), ErrorKind::WriteError);
    }

    #[test]
    fn test_archive_layout() {
        let bytes = minimal_builder().make_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);

        let names: Vec<&str> = archive.file_names().collect();
        for name in [
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/toc.ncx",
            "OEBPS/text/c1.xhtml",
        ] {
            assert!(names.contains(&name), "{name} is missing");
        }

        let mimetype = get_file_in_zip_archive(&mut archive, "mimetype").unwrap().unwrap();
        assert_eq!(mimetype, b"application/epub+zip");
    }

    #[test]
    fn test_nested_catalog() {
        let mut part = NavPoint::new("Part One").with_play_order(1);
        part.children = vec![
            NavPoint::new("Chapter 2").with_content("text/c2.xhtml").with_play_order(3),
            NavPoint::new("Chapter 1").with_content("text/c1.xhtml").with_play_order(2),
        ];
        part.children.sort();

        let mut builder = minimal_builder();
        builder.set_catalog_title("Contents").add_catalog_item(part);
        let bytes = builder.make_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let nav = get_file_in_zip_archive(&mut archive, "OEBPS/nav.xhtml")
            .unwrap()
            .unwrap()
            .decode("nav.xhtml")
            .unwrap();
        assert!(nav.contains("<h1>Contents</h1>"));
        assert!(nav.contains(
            r#"<li><span>Part One</span><ol><li><a href="text/c1.xhtml">Chapter 1</a></li><li><a href="text/c2.xhtml">Chapter 2</a></li></ol></li>"#
        ));

        let ncx = get_file_in_zip_archive(&mut archive, "OEBPS/toc.ncx")
            .unwrap()
            .unwrap()
            .decode("toc.ncx")
            .unwrap();
        let ncx = XmlReader::parse(&ncx, "toc.ncx").unwrap();
        let depth = ncx
            .find_elements_by_name("meta")
            .find(|meta| meta.get_attr("name").as_deref() == Some("dtb:depth"))
            .and_then(|meta| meta.get_attr("content"));
        assert_eq!(depth.as_deref(), Some("2"));

        let points: Vec<(String, String)> = ncx
            .find_elements_by_name("navPoint")
            .map(|point| {
                let label = point.find_elements_by_name("text").next().unwrap().text();
                (label, point.get_attr("playOrder").unwrap())
            })
            .collect();
        assert_eq!(
            points,
            vec![
                ("One".to_string(), "1".to_string()),
                ("Part One".to_string(), "2".to_string()),
                ("Chapter 1".to_string(), "3".to_string()),
                ("Chapter 2".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn test_assemble_reads_back() {
        let created = Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap();
        let bytes = assemble(&sample_book(), created).unwrap();

        let mut doc = EpubDoc::from_bytes(&bytes).unwrap();
        let metadata = doc.metadata();
        assert_eq!(metadata.title.as_deref(), Some("Dune"));
        assert_eq!(metadata.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(metadata.language, "en");
        assert_eq!(metadata.identifier, "dune-20240305060708");
        assert_eq!(doc.get_metadata_value("dcterms:modified"), None);

        let spine: Vec<&str> = doc.spine.iter().map(|item| item.idref.as_str()).collect();
        assert_eq!(spine, vec!["nav", "chapter_1", "chapter_2"]);
        assert!(doc.manifest["nav"].has_property("nav"));
        assert_eq!(doc.manifest["ncx"].path, "OEBPS/toc.ncx");

        let documents: Vec<_> = doc.documents().collect::<Result<_, _>>().unwrap();
        let paths: Vec<&str> = documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["OEBPS/chapter_1.xhtml", "OEBPS/chapter_2.xhtml"]);
        assert!(documents[1].content.contains("Arrakis &amp; <em>water</em>."));
    }

    #[test]
    fn test_package_and_navigation_documents() {
        let created = Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap();
        let bytes = assemble(&sample_book(), created).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let opf = get_file_in_zip_archive(&mut archive, "OEBPS/content.opf")
            .unwrap()
            .unwrap()
            .decode("content.opf")
            .unwrap();
        assert!(opf.contains(r#"<meta property="dcterms:modified">2024-03-05T06:07:08Z</meta>"#));
        assert!(opf.contains(r#"<spine toc="ncx"><itemref idref="nav"/>"#));

        let nav = get_file_in_zip_archive(&mut archive, "OEBPS/nav.xhtml")
            .unwrap()
            .unwrap()
            .decode("nav.xhtml")
            .unwrap();
        let nav = XmlReader::parse(&nav, "nav.xhtml").unwrap();
        let links: Vec<(String, String)> = nav
            .find_elements_by_name("a")
            .map(|a| (a.get_attr("href").unwrap(), a.text()))
            .collect();
        assert_eq!(
            links,
            vec![
                ("chapter_1.xhtml".to_string(), "Book One".to_string()),
                ("chapter_2.xhtml".to_string(), "Book Two".to_string()),
            ]
        );

        let ncx = get_file_in_zip_archive(&mut archive, "OEBPS/toc.ncx")
            .unwrap()
            .unwrap()
            .decode("toc.ncx")
            .unwrap();
        let ncx = XmlReader::parse(&ncx, "toc.ncx").unwrap();
        let orders: Vec<String> = ncx
            .find_elements_by_name("navPoint")
            .map(|point| point.get_attr("playOrder").unwrap())
            .collect();
        assert_eq!(orders, vec!["1", "2"]);
        let depth = ncx
            .find_elements_by_name("meta")
            .find(|meta| meta.get_attr("name").as_deref() == Some("dtb:depth"))
            .and_then(|meta| meta.get_attr("content"));
        assert_eq!(depth.as_deref(), Some("1"));
        assert_eq!(
            ncx.find_elements_by_name("docTitle").next().unwrap().text(),
            "Dune"
        );
    }
}
