//! Container Reader
//!
//! Opens an EPUB archive held in memory, resolves the package document through
//! `META-INF/container.xml` and exposes the publication metadata together with
//! the content documents in reading order.

use std::io::{Cursor, Read, Seek};

use indexmap::IndexMap;
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use zip::ZipArchive;

use crate::{
    error::EpubError,
    types::{DocumentItem, ManifestItem, Metadata, MetadataItem, SpineItem},
    utils::{
        DecodeBytes, NormalizeWhitespace, XmlElement, XmlReader, get_file_in_zip_archive,
        parent_dir, resolve_href,
    },
};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// EPUB document parser, representing a loaded and parsed EPUB publication
///
/// Parsing happens eagerly for the container descriptor and the package document;
/// content documents are only read from the archive when [EpubDoc::documents]
/// is iterated.
pub struct EpubDoc<R: Read + Seek> {
    /// The structure of the epub file that actually holds it
    pub(crate) archive: ZipArchive<R>,

    /// The path to the OPF file inside the container
    pub package_path: String,

    /// The directory the OPF file is located in, empty for the container root
    pub base_path: String,

    /// The unique identifier of the epub file
    ///
    /// This is the value of the identifier referenced by the `unique-identifier`
    /// attribute of the package, or the first identifier when the reference is
    /// missing. Empty when the package declares no identifier at all.
    pub unique_identifier: String,

    /// Dublin Core metadata extracted from OPF, in document order
    pub metadata: Vec<MetadataItem>,

    /// The resources declared by the package, keyed by manifest id
    ///
    /// Paths are already resolved against [EpubDoc::base_path].
    pub manifest: IndexMap<String, ManifestItem>,

    /// Physical reading order of publications extracted from OPF
    pub spine: Vec<SpineItem>,
}

impl<'a> EpubDoc<Cursor<&'a [u8]>> {
    /// Opens an EPUB archive from a byte buffer
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, EpubError> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> EpubDoc<R> {
    /// Creates a new EPUB document instance from a reader
    ///
    /// # Parameters
    /// - `reader`: The data source that implements the `Read` and `Seek` traits,
    ///   usually a memory buffer
    ///
    /// # Return
    /// - `Ok(EpubDoc<R>)`: The successfully parsed EPUB document object
    /// - `Err(EpubError)`: Errors encountered during parsing
    ///
    /// # Errors
    /// - [EpubError::InvalidArchive] if the zip structure cannot be read
    /// - [EpubError::MissingPackage] if the container descriptor or the package
    ///   document it points to is absent
    /// - [EpubError::DecodeError] if either of them is not UTF-8
    pub fn from_reader(reader: R) -> Result<Self, EpubError> {
        let mut archive = ZipArchive::new(reader).map_err(EpubError::from)?;

        let container = get_file_in_zip_archive(&mut archive, CONTAINER_PATH)?
            .ok_or_else(|| EpubError::MissingPackage {
                expected_file: CONTAINER_PATH.to_string(),
            })?
            .decode(CONTAINER_PATH)?;
        let package_path = Self::parse_container(&container)?;
        let base_path = parent_dir(&package_path).to_string();

        let opf_file = get_file_in_zip_archive(&mut archive, &package_path)?
            .ok_or_else(|| EpubError::MissingPackage {
                expected_file: package_path.clone(),
            })?
            .decode(&package_path)?;
        let package = XmlReader::parse(&opf_file, &package_path)?;
        debug!("Resolved package document at \"{}\"", package_path);

        let mut doc = Self {
            archive,
            package_path,
            base_path,
            unique_identifier: String::new(),
            metadata: vec![],
            manifest: IndexMap::new(),
            spine: vec![],
        };

        match package.find_children_by_name("metadata").next() {
            Some(metadata_element) => doc.parse_metadata(metadata_element),
            None => warn!("The package document has no metadata element."),
        }

        let manifest_element = package.find_children_by_name("manifest").next().ok_or_else(
            || EpubError::NonCanonicalPackage {
                tag: "manifest".to_string(),
            },
        )?;
        let spine_element = package.find_children_by_name("spine").next().ok_or_else(|| {
            EpubError::NonCanonicalPackage {
                tag: "spine".to_string(),
            }
        })?;

        doc.parse_manifest(manifest_element)?;
        doc.parse_spine(spine_element)?;

        let uid = package.get_attr("unique-identifier");
        doc.unique_identifier = doc
            .metadata
            .iter()
            .filter(|item| item.property == "identifier")
            .find(|item| uid.is_none() || item.id == uid)
            .or_else(|| doc.metadata.iter().find(|item| item.property == "identifier"))
            .map(|item| item.value.clone())
            .unwrap_or_default();

        Ok(doc)
    }

    /// Parse the EPUB container file (META-INF/container.xml)
    ///
    /// The first `rootfile` element names the package document. Its path is
    /// relative to the container root.
    fn parse_container(data: &str) -> Result<String, EpubError> {
        let root = XmlReader::parse(data, CONTAINER_PATH)?;
        let rootfile = root.find_elements_by_name("rootfile").next().ok_or_else(|| {
            EpubError::NonCanonicalPackage {
                tag: "rootfile".to_string(),
            }
        })?;

        let full_path =
            rootfile
                .get_attr("full-path")
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: "rootfile".to_string(),
                    attribute: "full-path".to_string(),
                })?;

        resolve_href("", &full_path).ok_or(EpubError::RelativeLinkLeakage { path: full_path })
    }

    /// Parse the EPUB metadata section
    ///
    /// Only elements in the Dublin Core namespace are kept, the converter has
    /// no use for `meta` refinements or links.
    fn parse_metadata(&mut self, metadata_element: &XmlElement) {
        const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

        self.metadata = metadata_element
            .children()
            .filter(|element| element.namespace.as_deref() == Some(DC_NAMESPACE))
            .map(|element| MetadataItem {
                id: element.get_attr("id"),
                property: element.name.clone(),
                value: element.text().normalize_whitespace(),
                lang: element.get_attr("xml:lang"),
            })
            .collect();
    }

    /// Parse the EPUB manifest section
    ///
    /// Every href is resolved against the package directory so that the stored
    /// paths can be looked up in the archive directly.
    fn parse_manifest(&mut self, manifest_element: &XmlElement) -> Result<(), EpubError> {
        let mut resources = IndexMap::with_capacity(manifest_element.children().count());

        for element in manifest_element.find_children_by_name("item") {
            let id = Self::required_attr(element, "id")?;
            let href = Self::required_attr(element, "href")?;
            let mime = Self::required_attr(element, "media-type")?;

            let path = resolve_href(&self.base_path, &href)
                .ok_or(EpubError::RelativeLinkLeakage { path: href })?;

            resources.insert(
                id.clone(),
                ManifestItem {
                    id,
                    path,
                    mime,
                    properties: element.get_attr("properties"),
                },
            );
        }

        self.manifest = resources;
        Ok(())
    }

    /// Parse the EPUB spine section
    fn parse_spine(&mut self, spine_element: &XmlElement) -> Result<(), EpubError> {
        let mut spine = Vec::new();
        for element in spine_element.find_children_by_name("itemref") {
            spine.push(SpineItem {
                idref: Self::required_attr(element, "idref")?,
                linear: element.get_attr("linear").is_none_or(|linear| linear != "no"),
            });
        }

        self.spine = spine;
        Ok(())
    }

    fn required_attr(element: &XmlElement, attribute: &str) -> Result<String, EpubError> {
        element
            .get_attr(attribute)
            .ok_or_else(|| EpubError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: attribute.to_string(),
            })
    }

    /// Retrieves the first value of a Dublin Core property
    pub fn get_metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|item| item.property == key && !item.value.is_empty())
            .map(|item| item.value.as_str())
    }

    /// Returns the bibliographic metadata of the publication
    ///
    /// Title, author and language come from the first `dc:title`, `dc:creator`
    /// and `dc:language` elements. A missing language keeps the default.
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata {
            title: self.get_metadata_value("title").map(str::to_string),
            author: self.get_metadata_value("creator").map(str::to_string),
            identifier: self.unique_identifier.clone(),
            ..Metadata::default()
        };

        if let Some(language) = self.get_metadata_value("language") {
            metadata.language = language.to_string();
        }

        metadata
    }

    /// Iterates the content documents of the publication in spine order
    ///
    /// Documents are read and decoded lazily. Spine entries that reference
    /// stylesheets, images or the navigation document are skipped.
    pub fn documents(&mut self) -> SpineDocuments<'_, R> {
        SpineDocuments { doc: self, index: 0 }
    }
}

/// Lazy iterator over the content documents of an [EpubDoc]
///
/// Created by [EpubDoc::documents].
pub struct SpineDocuments<'a, R: Read + Seek> {
    doc: &'a mut EpubDoc<R>,
    index: usize,
}

impl<R: Read + Seek> Iterator for SpineDocuments<'_, R> {
    type Item = Result<DocumentItem, EpubError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(spine_item) = self.doc.spine.get(self.index) {
            self.index += 1;

            let Some(item) = self.doc.manifest.get(&spine_item.idref) else {
                warn!(
                    "Spine item \"{}\" is not declared in the manifest, skipped.",
                    spine_item.idref
                );
                continue;
            };

            if !item.is_content_document() {
                debug!("Skipping non-document spine item \"{}\" ({}).", item.id, item.mime);
                continue;
            }

            let item = item.clone();
            return Some(read_document(&mut self.doc.archive, item));
        }

        None
    }
}

fn read_document<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    item: ManifestItem,
) -> Result<DocumentItem, EpubError> {
    let data = match get_file_in_zip_archive(archive, &item.path)? {
        Some(data) => Some(data),

        // hrefs are URLs, the archive stores the decoded names
        None => match percent_decode_str(&item.path).decode_utf8() {
            Ok(decoded) if decoded.as_ref() != item.path => {
                get_file_in_zip_archive(archive, &decoded)?
            }
            _ => None,
        },
    };

    let content = data
        .ok_or_else(|| EpubError::ResourceNotFound {
            resource: item.path.clone(),
        })?
        .decode(&item.path)?;

    Ok(DocumentItem {
        id: item.id,
        path: item.path,
        mime: item.mime,
        content,
    })
}
