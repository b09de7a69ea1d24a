// gxcodec-parsers/src/traits.rs
//! Core traits defining the codec interface for all container formats.
//!
//! This module establishes:
//! - The error taxonomy shared by every reader and writer
//! - Read/write configuration
//! - The `ModelCodec` capability interface used by front ends

use std::borrow::Cow;
use std::path::Path;

use thiserror::Error;

use crate::diagnostics::Transaction;
use crate::gx::VertexAttribute;
use crate::model::{Model, QuantizationProfile};

/// Errors that can occur during read or write operations
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Out of bounds at offset 0x{offset:X}: requested {requested} bytes, available {available}")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        available: usize,
    },

    #[error("Invalid magic bytes: expected {expected:?}, found {found:?}")]
    InvalidMagic { expected: Vec<u8>, found: Vec<u8> },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },

    #[error("Malformed display list at offset 0x{offset:X}: unexpected command 0x{command:02X}")]
    MalformedDisplayList { offset: usize, command: u8 },

    #[error("Direct data is not supported for vertex attribute {attribute}")]
    UnsupportedDirectAttribute { attribute: VertexAttribute },

    #[error("Unresolved link to label `{label}`")]
    UnresolvedLink { label: String },

    #[error("Link at offset 0x{at:X} cannot hold value {value}")]
    LinkOverflow { at: usize, value: i64 },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Nested error in {context}: {source}")]
    Nested {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// Wrap this error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ParseError::Nested {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an `InvalidStructure` error
    pub fn invalid(message: impl Into<String>) -> Self {
        ParseError::InvalidStructure(message.into())
    }

    /// The innermost error beneath any context layers
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::Nested { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Errors that only invalidate the mesh whose display list raised them
    pub fn is_fatal_for_mesh(&self) -> bool {
        matches!(
            self.root_cause(),
            ParseError::MalformedDisplayList { .. } | ParseError::UnsupportedDirectAttribute { .. }
        )
    }

    /// Errors that always abort the whole operation
    pub fn is_cross_cutting(&self) -> bool {
        matches!(
            self.root_cause(),
            ParseError::InvalidMagic { .. }
                | ParseError::UnresolvedLink { .. }
                | ParseError::LinkOverflow { .. }
        )
    }
}

/// Result type alias for codec operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Configuration options for reading
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Bytes a section may leave unconsumed before a warning is raised
    pub section_size_tolerance: u32,
    /// Report validation findings as errors instead of warnings
    pub strict_validation: bool,
    /// Shrink vertex buffers to the highest index the display lists use
    pub trim_vertex_buffers: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            section_size_tolerance: 32,
            strict_validation: false,
            trim_vertex_buffers: true,
        }
    }
}

/// Configuration options for writing
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Re-quantize vertex data for this profile before writing
    pub profile: Option<QuantizationProfile>,
    /// Refuse to write a model whose bone graph or references are broken
    pub validate_before_write: bool,
}

impl WriteOptions {
    /// Apply the requested profile and validation to `model`, cloning only
    /// when the vertex data has to change
    pub fn prepare<'m>(&self, model: &'m Model) -> ParseResult<Cow<'m, Model>> {
        let model = match self.profile {
            Some(profile) => {
                let mut copy = model.clone();
                copy.requantize(profile)?;
                Cow::Owned(copy)
            }
            None => Cow::Borrowed(model),
        };

        if self.validate_before_write {
            if let Some(finding) = model
                .validate()
                .into_iter()
                .find(|d| d.severity == crate::diagnostics::Severity::Error)
            {
                return Err(ParseError::InvalidStructure(finding.message));
            }
        }
        Ok(model)
    }
}

/// Capability interface for a container format
///
/// Implementors read a whole container from an in-memory buffer into a
/// [`Model`] and serialize a model back into bytes.
pub trait ModelCodec: Send + Sync {
    /// Human-readable codec name
    fn name(&self) -> &str;

    /// File extensions this codec handles (e.g. `["bmd"]`)
    fn extensions(&self) -> &[&str];

    /// Peek at the magic tag without consuming anything
    fn can_read(&self, bytes: &[u8]) -> bool;

    /// Read with default options
    fn read(&self, bytes: &[u8], tx: &mut Transaction) -> ParseResult<Model> {
        self.read_with_options(bytes, &ReadOptions::default(), tx)
    }

    /// Read with custom options
    ///
    /// Section-level failures are recorded in `tx` and a partial model is
    /// still returned. Only cross-cutting failures produce `Err`.
    fn read_with_options(
        &self,
        bytes: &[u8],
        options: &ReadOptions,
        tx: &mut Transaction,
    ) -> ParseResult<Model>;

    /// Read a file fully into memory, then decode it
    fn read_file(&self, path: &Path, tx: &mut Transaction) -> ParseResult<Model> {
        let bytes = std::fs::read(path)?;
        self.read(&bytes, tx)
    }

    /// Write with default options
    fn write(&self, model: &Model) -> ParseResult<Vec<u8>> {
        self.write_with_options(model, &WriteOptions::default())
    }

    /// Write with custom options
    fn write_with_options(&self, model: &Model, options: &WriteOptions) -> ParseResult<Vec<u8>>;

    /// Check the extension of a path against this codec
    fn handles_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions().iter().any(|e| e.eq_ignore_ascii_case(&ext)))
    }
}

/// Trait for converting parsed data to human-readable formats
pub trait HumanReadable {
    /// Convert to a human-readable string representation
    fn to_readable_string(&self) -> String;

    /// Convert to formatted JSON
    fn to_json(&self) -> serde_json::Value;

    /// Convert to YAML (falls back to the readable string on failure)
    fn to_yaml(&self) -> String {
        serde_yaml::to_string(&self.to_json()).unwrap_or_else(|_| self.to_readable_string())
    }
}
