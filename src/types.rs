use std::path::PathBuf;

/// Bibliographic metadata shared by both conversion directions
///
/// `title` and `author` are optional because an archive may omit them; the
/// text→archive direction always fills them, falling back to the file name
/// and the unknown-author sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,

    /// Primary language of the publication, as an RFC 5646 tag
    pub language: String,

    /// The unique identifier of the publication
    ///
    /// For generated archives this is the slug of the title followed by the
    /// creation time stamp, see [`crate::builder::make_identifier`].
    pub identifier: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            language: "ru".to_string(),
            identifier: String::new(),
        }
    }
}

/// A single chapter of a book
///
/// The body holds Markdown while a book is being segmented and a complete
/// XHTML document once it has been rendered for assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub body: String,

    /// 1-based position of the chapter in the book
    pub order: usize,
}

impl Chapter {
    pub fn new(title: &str, body: &str, order: usize) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            order,
        }
    }

    /// The content document name used for this chapter inside generated archives
    pub fn file_name(&self) -> String {
        format!("chapter_{}.xhtml", self.order)
    }
}

/// A fully materialized book
///
/// A book always holds at least one chapter; the segmenter collapses empty
/// or headingless input into a single chapter.
#[derive(Debug, Clone)]
pub struct Book {
    pub metadata: Metadata,
    pub chapters: Vec<Chapter>,
}

/// Which piece of metadata was filled with a fallback value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultedField {
    /// Title taken from the input file name
    Title,

    /// Author set to the unknown-author sentinel
    Author,
}

/// Represents a metadata item in the EPUB publication
///
/// Metadata items contain information about the publication such as title,
/// author, identifier, language, and other descriptive information.
#[derive(Debug, Clone)]
pub struct MetadataItem {
    /// Optional unique identifier for this metadata item
    pub id: Option<String>,

    /// The metadata property name
    ///
    /// Common properties include "title", "creator", "identifier", "language".
    /// Properties in the Dublin Core set are written as `dc:` elements, the
    /// rest as `<meta property="...">`.
    pub property: String,

    /// The metadata value
    pub value: String,

    /// Optional language code for this metadata item
    pub lang: Option<String>,
}

impl MetadataItem {
    pub fn new(property: &str, value: &str) -> Self {
        Self {
            id: None,
            property: property.to_string(),
            value: value.to_string(),
            lang: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Attributes of the element this item is written as
    pub(crate) fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = Vec::new();

        if let Some(id) = &self.id {
            attributes.push(("id", id.as_str()));
        }
        if let Some(lang) = &self.lang {
            attributes.push(("xml:lang", lang.as_str()));
        }
        if !crate::utils::ELEMENT_IN_DC_NAMESPACE.contains(&self.property.as_str()) {
            attributes.push(("property", self.property.as_str()));
        }

        attributes
    }
}

/// Represents a resource item declared in the EPUB manifest
#[derive(Debug, Clone)]
pub struct ManifestItem {
    /// The manifest id of the resource
    pub id: String,

    /// The path to the resource file
    ///
    /// When read from an archive this is the normalized path relative to the
    /// container root; when building it is relative to the package document.
    pub path: String,

    /// The media type of the resource
    pub mime: String,

    /// Optional space-separated properties associated with this resource
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn new(id: &str, path: &str, mime: &str) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            mime: mime.to_string(),
            properties: None,
        }
    }

    pub fn append_property(mut self, property: &str) -> Self {
        self.properties = Some(match self.properties {
            Some(properties) => format!("{} {}", properties, property),
            None => property.to_string(),
        });
        self
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_ref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == property))
    }

    /// Whether the resource is a primary content document
    ///
    /// Navigation documents are excluded even though they share the XHTML media type.
    pub fn is_content_document(&self) -> bool {
        matches!(self.mime.as_str(), "application/xhtml+xml" | "text/html")
            && !self.has_property("nav")
    }

    pub(crate) fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![
            ("id", self.id.as_str()),
            ("href", self.path.as_str()),
            ("media-type", self.mime.as_str()),
        ];

        if let Some(properties) = &self.properties {
            attributes.push(("properties", properties.as_str()));
        }

        attributes
    }
}

/// Represents an item in the EPUB spine, defining the reading order of the publication
#[derive(Debug, Clone)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// Indicates whether this item is part of the linear reading order
    pub linear: bool,
}

impl SpineItem {
    pub fn new(idref: &str) -> Self {
        Self {
            idref: idref.to_string(),
            linear: true,
        }
    }

    pub(crate) fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![("idref", self.idref.as_str())];
        if !self.linear {
            attributes.push(("linear", "no"));
        }

        attributes
    }
}

/// A content document yielded by the container reader, in spine order
#[derive(Debug, Clone)]
pub struct DocumentItem {
    /// The manifest id of the document
    pub id: String,

    /// The path of the document inside the container
    pub path: String,

    /// The declared media type
    pub mime: String,

    /// The decoded document text
    pub content: String,
}

/// Represents a navigation point in an EPUB document's table of contents
#[derive(Debug, Eq, Clone)]
pub struct NavPoint {
    /// The display label/title of this navigation point
    pub label: String,

    /// The content document path this navigation point references
    pub content: Option<PathBuf>,

    /// Child navigation points (sub-sections)
    pub children: Vec<NavPoint>,

    /// The reading order position of this navigation point
    pub play_order: Option<usize>,
}

impl NavPoint {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            content: None,
            children: vec![],
            play_order: None,
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(PathBuf::from(content));
        self
    }

    pub fn with_play_order(mut self, play_order: usize) -> Self {
        self.play_order = Some(play_order);
        self
    }
}

impl Ord for NavPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.play_order.cmp(&other.play_order)
    }
}

impl PartialOrd for NavPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NavPoint {
    fn eq(&self, other: &Self) -> bool {
        self.play_order == other.play_order
    }
}

#[cfg(test)]
mod tests {
    mod navpoint_tests {
        use crate::types::NavPoint;

        /// Testing the equality comparison of NavPoint
        #[test]
        fn test_navpoint_partial_eq() {
            let nav1 = NavPoint::new("Chapter 1")
                .with_content("chapter_1.xhtml")
                .with_play_order(1);
            let nav2 = NavPoint::new("Chapter 1")
                .with_content("chapter_2.xhtml")
                .with_play_order(1);
            let nav3 = NavPoint::new("Chapter 2")
                .with_content("chapter_1.xhtml")
                .with_play_order(2);

            assert_eq!(nav1, nav2); // Same play_order, different contents, should be equal
            assert_ne!(nav1, nav3); // Different play_order, Same contents, should be unequal
        }

        /// Test NavPoint sorting comparison
        #[test]
        fn test_navpoint_ord() {
            let mut points = vec![
                NavPoint::new("Chapter 3").with_play_order(3),
                NavPoint::new("Chapter 1").with_play_order(1),
                NavPoint::new("Chapter 2").with_play_order(2),
            ];
            points.sort();

            let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
            assert_eq!(labels, vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
        }
    }

    mod manifest_tests {
        use crate::types::{Chapter, ManifestItem, MetadataItem, SpineItem};

        #[test]
        fn test_content_document_detection() {
            let chapter = ManifestItem::new("c1", "c1.xhtml", "application/xhtml+xml");
            assert!(chapter.is_content_document());

            let html = ManifestItem::new("c2", "c2.html", "text/html");
            assert!(html.is_content_document());

            let nav = ManifestItem::new("nav", "nav.xhtml", "application/xhtml+xml")
                .append_property("nav");
            assert!(!nav.is_content_document());

            let css = ManifestItem::new("css", "style.css", "text/css");
            assert!(!css.is_content_document());
        }

        #[test]
        fn test_append_property() {
            let item = ManifestItem::new("nav", "nav.xhtml", "application/xhtml+xml")
                .append_property("nav")
                .append_property("scripted");

            assert_eq!(item.properties.as_deref(), Some("nav scripted"));
            assert!(item.has_property("scripted"));
            assert!(!item.has_property("svg"));
        }

        #[test]
        fn test_attributes() {
            let title = MetadataItem::new("title", "Dune");
            assert!(title.attributes().is_empty());

            let id = MetadataItem::new("identifier", "dune-1").with_id("pub-id");
            assert_eq!(id.attributes(), vec![("id", "pub-id")]);

            let modified = MetadataItem::new("dcterms:modified", "2024-01-01T00:00:00Z");
            assert_eq!(modified.attributes(), vec![("property", "dcterms:modified")]);

            let mut spine = SpineItem::new("nav");
            spine.linear = false;
            assert_eq!(spine.attributes(), vec![("idref", "nav"), ("linear", "no")]);
        }

        #[test]
        fn test_chapter_file_name() {
            assert_eq!(Chapter::new("One", "", 1).file_name(), "chapter_1.xhtml");
            assert_eq!(Chapter::new("Ten", "", 10).file_name(), "chapter_10.xhtml");
        }
    }
}
