//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while converting
//! between EPUB archives and Markdown text. Failures raised inside a single stage
//! are represented by [EpubError]; the public conversion entry points wrap them
//! in [ConversionError] together with the stage that failed.
//!
//! ## Main Error Types
//!
//! - [EpubError] - Errors raised by the reader, renderers and assembler
//! - [ConversionError] - Stage-annotated error returned by the converter
//! - [ErrorKind] - The closed taxonomy every [EpubError] maps onto

use std::fmt;

use thiserror::Error;

/// Types of errors that can occur during EPUB processing
///
/// This enumeration defines the various error cases that can be encountered
/// when reading, rendering and assembling publications.
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of EPUB files,
    /// such as file corruption, unreadability, etc.
    #[error("Invalid archive: {source}")]
    InvalidArchive { source: zip::result::ZipError },

    /// Package document missing error
    ///
    /// This error occurs when the container descriptor or the package document
    /// it points to cannot be found in the archive.
    #[error("Missing package: The \"{expected_file}\" file was not found.")]
    MissingPackage { expected_file: String },

    /// Non-canonical package structure error
    ///
    /// This error is triggered when the required XML elements are missing
    /// from the container descriptor or package document.
    #[error("Non-canonical package: The \"{tag}\" elements was not found.")]
    NonCanonicalPackage { tag: String },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element in an EPUB file lacks the required
    /// attributes required by the EPUB specification.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Relative link leak error
    ///
    /// This error occurs when a relative path link is outside the scope
    /// of an EPUB container.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Unable to find the resource error
    ///
    /// This error occurs when a manifest item references a file
    /// that does not exist in the EPUB container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// UTF-8 decoding error
    #[error("Decode error: \"{resource}\" is not valid UTF-8 text: {source}")]
    DecodeError {
        resource: String,
        source: std::string::FromUtf8Error,
    },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    XmlError { source: quick_xml::Error },

    /// Unknown input extension error
    ///
    /// The conversion direction is chosen from the declared file extension,
    /// this error is returned when it is not one of the recognized kinds.
    #[error("Unsupported extension: \".{extension}\" is not one of .epub, .md, .markdown, .txt.")]
    UnsupportedExtension { extension: String },

    /// Archive serialization error
    ///
    /// This error occurs when the assembled archive cannot be written to its sink.
    #[error("Write error: {source}")]
    WriteError { source: zip::result::ZipError },

    /// Missing necessary metadata error
    ///
    /// The following must be included: title, language, and an identifier with a 'pub-id' ID.
    #[error("Requires at least one 'title', 'language', and 'identifier' with id 'pub-id'.")]
    MissingNecessaryMetadata,

    /// Too many nav flags error
    ///
    /// The manifest must contain exactly one navigation document.
    #[error("There are too many items with 'nav' property in the manifest.")]
    TooManyNavFlags,
}

impl EpubError {
    /// Maps the error onto the closed conversion error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            EpubError::InvalidArchive { .. } | EpubError::ResourceNotFound { .. } => {
                ErrorKind::InvalidArchive
            }

            EpubError::MissingPackage { .. }
            | EpubError::NonCanonicalPackage { .. }
            | EpubError::MissingRequiredAttribute { .. }
            | EpubError::RelativeLinkLeakage { .. }
            | EpubError::XmlError { .. } => ErrorKind::MissingPackage,

            EpubError::DecodeError { .. } => ErrorKind::DecodeError,
            EpubError::UnsupportedExtension { .. } => ErrorKind::UnsupportedExtension,

            EpubError::WriteError { .. }
            | EpubError::MissingNecessaryMetadata
            | EpubError::TooManyNavFlags => ErrorKind::WriteError,
        }
    }
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::InvalidArchive { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::XmlError { source: value }
    }
}

/// Plain I/O failures only happen while writing; reads go through the archive
/// and are mapped to [EpubError::InvalidArchive] at the call site.
impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::WriteError {
            source: value.into(),
        }
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::MissingPackage {
                    expected_file: l_expected_file,
                },
                Self::MissingPackage {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::NonCanonicalPackage { tag: l_tag }, Self::NonCanonicalPackage { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (
                Self::UnsupportedExtension {
                    extension: l_extension,
                },
                Self::UnsupportedExtension {
                    extension: r_extension,
                },
            ) => l_extension == r_extension,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

/// The closed set of failure categories a conversion can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Corrupt or unreadable container
    InvalidArchive,

    /// No resolvable package document
    MissingPackage,

    /// Non-UTF-8 content where UTF-8 is required
    DecodeError,

    /// The conversion direction cannot be determined
    UnsupportedExtension,

    /// Archive serialization or publication failure
    WriteError,
}

/// The pipeline stage a conversion failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Dispatch,
    ReadArchive,
    RenderMarkdown,
    DecodeText,
    Assemble,
    Publish,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionStage::Dispatch => "dispatch",
            ConversionStage::ReadArchive => "reading archive",
            ConversionStage::RenderMarkdown => "rendering markdown",
            ConversionStage::DecodeText => "decoding text",
            ConversionStage::Assemble => "assembling archive",
            ConversionStage::Publish => "publishing output",
        };

        f.write_str(name)
    }
}

/// Error returned by the converter
///
/// Wraps the stage-local [EpubError] with the stage it was raised in.
/// A conversion that returns this error has produced no output.
#[derive(Debug, Error)]
#[error("Conversion failed while {stage}: {source}")]
pub struct ConversionError {
    pub stage: ConversionStage,
    pub source: EpubError,
}

impl ConversionError {
    pub fn new(stage: ConversionStage, source: EpubError) -> Self {
        Self { stage, source }
    }

    /// Returns the taxonomy category of the underlying error
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Attaches a conversion stage to stage-local results
pub(crate) trait StageContext<T> {
    fn stage(self, stage: ConversionStage) -> Result<T, ConversionError>;
}

impl<T> StageContext<T> for Result<T, EpubError> {
    fn stage(self, stage: ConversionStage) -> Result<T, ConversionError> {
        self.map_err(|source| ConversionError::new(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ConversionError, ConversionStage, EpubError, ErrorKind, StageContext};

    #[test]
    fn test_kind_mapping() {
        let err = EpubError::MissingPackage {
            expected_file: "META-INF/container.xml".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::MissingPackage);

        let err = EpubError::ResourceNotFound {
            resource: "OEBPS/a.xhtml".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArchive);

        let err = EpubError::UnsupportedExtension {
            extension: "pdf".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedExtension);
        assert_eq!(EpubError::TooManyNavFlags.kind(), ErrorKind::WriteError);
    }

    #[test]
    fn test_stage_context() {
        let result: Result<(), EpubError> = Err(EpubError::UnsupportedExtension {
            extension: "pdf".to_string(),
        });
        let err: ConversionError = result.stage(ConversionStage::Dispatch).unwrap_err();

        assert_eq!(err.stage, ConversionStage::Dispatch);
        assert_eq!(err.kind(), ErrorKind::UnsupportedExtension);
        assert_eq!(
            err.to_string(),
            "Conversion failed while dispatch: Unsupported extension: \".pdf\" is not one of .epub, .md, .markdown, .txt."
        );
    }
}
