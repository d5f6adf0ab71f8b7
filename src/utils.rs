use std::{
    borrow::Cow,
    collections::HashMap,
    io::{Read, Seek},
    sync::LazyLock,
};

use quick_xml::{
    NsReader,
    escape::unescape,
    events::{BytesStart, Event},
};
use zip::{ZipArchive, result::ZipError};

use crate::error::EpubError;

pub static ELEMENT_IN_DC_NAMESPACE: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "contributor",
        "coverage",
        "creator",
        "date",
        "description",
        "format",
        "identifier",
        "language",
        "publisher",
        "relation",
        "rights",
        "source",
        "subject",
        "title",
        "type",
    ]
});

/// Extracts the contents of a specified file from a ZIP archive
///
/// ## Parameters
/// - `zip_file`: A mutable reference to a ZIP archive object
/// - `file_name`: The path to the file to extract (relative to the ZIP archive root directory)
///
/// ## Return
/// - `Ok(Some(Vec<u8>))`: The raw bytes of the file
/// - `Ok(None)`: The archive has no entry with this name
/// - `Err(EpubError)`: The entry exists but could not be read
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Option<Vec<u8>>, EpubError> {
    let mut buffer = Vec::<u8>::new();
    match zip_file.by_name(file_name) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)
                .map_err(|err| EpubError::InvalidArchive { source: err.into() })?;
            Ok(Some(buffer))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(err) => Err(EpubError::from(err)),
    }
}

/// Resolves a manifest href against the directory of the package document
///
/// Handles three kinds of references:
/// - Paths starting with `/` are relative to the container root
/// - `../` segments walk up from `base_dir`
/// - Everything else is joined onto `base_dir`
///
/// ## Return
/// - `Some(String)`: The normalized path inside the container
/// - `None`: The reference walks out of the container
pub fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    let href = href.split('#').next().unwrap_or_default();

    let mut segments: Vec<&str> = match href.strip_prefix('/') {
        Some(_) => Vec::new(),
        None => base_dir.split('/').filter(|s| !s.is_empty()).collect(),
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // failed to navigate up,
                // which means we're trying to escape the root directory
                segments.pop()?;
            }
            _ => segments.push(segment),
        }
    }

    Some(segments.join("/"))
}

/// Returns the directory part of a container path, without trailing slash
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Builds a filesystem and URL safe slug from a title
///
/// Alphanumeric characters (including non-Latin scripts) are lowercased and kept,
/// every other run of characters collapses into a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "book".to_string()
    } else {
        slug
    }
}

/// Decodes text resources read from a container
///
/// A UTF-8 byte order mark is skipped. Any other byte sequence
/// that is not valid UTF-8 is rejected with [EpubError::DecodeError].
pub trait DecodeBytes {
    fn decode(self, resource: &str) -> Result<String, EpubError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(mut self, resource: &str) -> Result<String, EpubError> {
        if self.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.drain(..3);
        }

        String::from_utf8(self).map_err(|source| EpubError::DecodeError {
            resource: resource.to_string(),
            source,
        })
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// This trait normalizes various sequences of whitespace characters
/// (including spaces, tabs, newlines, etc.) in a string into a single
/// whitespace character, removing leading and trailing whitespace characters.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The namespace of the element
    pub namespace: Option<String>,

    /// The attributes of the element
    ///
    /// The key is the attribute name, the value is the unescaped attribute value
    pub attributes: HashMap<String, String>,

    /// The text content of the element
    pub text: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    pub fn text(&self) -> String {
        let mut result = String::new();

        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            result.push_str(&child.text());
        }

        result.trim().to_string()
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Find all elements with the specified name, depth first, starting with this element
    pub fn find_elements_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> Box<dyn Iterator<Item = &'a XmlElement> + 'a> {
        let own = (self.name == name).then_some(self);
        Box::new(own.into_iter().chain(
            self.children
                .iter()
                .flat_map(move |child| child.find_elements_by_name(name)),
        ))
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

/// XML parser used to parse XML content and build an XML element tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    /// - `resource`: The container path of the parsed file, used in errors
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(EpubError)`: An error occurred during parsing
    pub fn parse(content: &str, resource: &str) -> Result<XmlElement, EpubError> {
        // Create a XML reader with namespace support
        // Text is kept untrimmed: entity references split it into several events
        let mut reader = NsReader::from_str(content);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::make_element(&e, &mut namespace_map);
                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        // If the stack is empty,
                        // the current element is the root element
                        if stack.is_empty() {
                            root = Some(element);
                        } else if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        }
                    }
                }

                Ok(Event::Empty(e)) => {
                    let element = Self::make_element(&e, &mut namespace_map);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }

                Ok(Event::Text(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::append_text(&mut stack, &text);
                }

                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::append_text(&mut stack, &text);
                }

                // Character and entity references are reported separately from text
                Ok(Event::GeneralRef(e)) => {
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(ch)) => Some(ch.to_string()),
                        _ => match &*e {
                            b"amp" => Some("&".to_string()),
                            b"lt" => Some("<".to_string()),
                            b"gt" => Some(">".to_string()),
                            b"quot" => Some("\"".to_string()),
                            b"apos" => Some("'".to_string()),
                            _ => None,
                        },
                    };

                    if let Some(text) = resolved {
                        Self::append_text(&mut stack, &text);
                    }
                }

                Err(err) => return Err(err.into()),

                // Ignore the following events (elements):
                // Comment, PI, Declaration, Doctype
                _ => continue,
            }

            buf.clear();
        }

        if let Some(element) = root.as_mut() {
            Self::assign_namespace(element, &namespace_map);
        }

        root.ok_or_else(|| EpubError::NonCanonicalPackage {
            tag: format!("root element of {}", resource),
        })
    }

    fn make_element(
        start: &BytesStart<'_>,
        namespace_map: &mut HashMap<String, String>,
    ) -> XmlElement {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in start.attributes().flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw_value = String::from_utf8_lossy(&attr.value).to_string();
            let attr_value = match unescape(&raw_value) {
                Ok(Cow::Owned(value)) => value,
                _ => raw_value,
            };

            // Handle namespace attributes
            if attr_key == "xmlns" || attr_key.starts_with("xmlns:") {
                match attr_key.split_once(':') {
                    Some((_, prefix)) => namespace_map.insert(prefix.to_string(), attr_value),
                    None => namespace_map.insert(attr_key, attr_value),
                };

                continue;
            }

            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    fn append_text(stack: &mut [XmlElement], text: &str) {
        if let Some(element) = stack.last_mut() {
            element.text.get_or_insert_with(String::new).push_str(text);
        }
    }

    /// Assign namespace to element recursively
    fn assign_namespace(element: &mut XmlElement, namespace_map: &HashMap<String, String>) {
        if let Some(prefix) = &element.prefix {
            if let Some(namespace) = namespace_map.get(prefix) {
                element.namespace = Some(namespace.clone());
            }
        } else if let Some(namespace) = namespace_map.get("xmlns") {
            element.namespace = Some(namespace.clone());
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map);
        }
    }
}
