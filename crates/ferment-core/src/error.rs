//! Error types for the ferment-core library.
//!
//! Errors fall into two categories. Decode errors report structurally
//! malformed wire bytes and always abort the whole top-level decode; see
//! [`Error::is_decode_error`]. Every other variant reports misuse of the
//! schema or dynamic-value APIs.

use thiserror::Error;

/// Result type alias for ferment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all codec operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A varint did not terminate within the 10-byte limit
    #[error("malformed varint at offset {offset}: no terminating byte within 10 bytes")]
    MalformedVarint {
        /// Byte offset where the varint starts
        offset: usize,
    },

    /// The buffer ended before a value was complete
    #[error("truncated payload at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedPayload {
        /// Byte offset where the value starts
        offset: usize,
        /// Number of bytes the value requires
        needed: usize,
        /// Number of bytes left in the buffer
        available: usize,
    },

    /// The tag carried a wire type other than varint, fixed64, length-delimited or fixed32
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// Byte offset of the tag
        offset: usize,
        /// The raw wire type bits
        wire_type: u8,
    },

    /// A tag carried field number 0 or a number above the protobuf maximum
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u64,
        /// Maximum valid field number
        max: u32,
    },

    /// A string field held bytes that are not UTF-8 (strict mode only)
    #[error("field {field} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        /// Number of the offending field
        field: u32,
        /// Underlying conversion error
        #[source]
        source: std::str::Utf8Error,
    },

    /// Nested messages went deeper than the configured limit
    #[error("message nesting exceeds recursion limit of {limit}")]
    RecursionLimitExceeded {
        /// The configured limit
        limit: u32,
    },

    /// Two descriptors in one schema share a field number
    #[error("schema '{schema}' declares field number {number} more than once")]
    DuplicateField {
        /// Name of the schema
        schema: String,
        /// The duplicated field number
        number: u32,
    },

    /// A descriptor nests kinds in a way the wire format cannot express
    #[error("invalid kind for field {number}: {details}")]
    InvalidFieldKind {
        /// Number of the offending field
        number: u32,
        /// What is wrong with the kind
        details: String,
    },

    /// A dynamic access named a field number the schema does not declare
    #[error("schema '{schema}' has no field number {number}")]
    UnknownField {
        /// Name of the schema
        schema: String,
        /// The requested field number
        number: u32,
    },

    /// A dynamic value does not fit the field's declared kind
    #[error("type mismatch for field {number}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Number of the field being set
        number: u32,
        /// The declared kind
        expected: String,
        /// The kind of value supplied
        found: &'static str,
    },
}

impl Error {
    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new truncated payload error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedPayload {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new unsupported wire type error
    pub fn unsupported_wire_type(offset: usize, wire_type: u8) -> Self {
        Self::UnsupportedWireType { offset, wire_type }
    }

    /// Creates a new invalid UTF-8 error
    pub fn invalid_utf8(field: u32, source: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8 { field, source }
    }

    /// Creates a new invalid field kind error
    pub fn invalid_field_kind(number: u32, details: impl Into<String>) -> Self {
        Self::InvalidFieldKind {
            number,
            details: details.into(),
        }
    }

    /// Creates a new unknown field error
    pub fn unknown_field(schema: impl Into<String>, number: u32) -> Self {
        Self::UnknownField {
            schema: schema.into(),
            number,
        }
    }

    /// Returns the same error with its offset shifted by `base`.
    ///
    /// Used when a reader over a sub-slice reports back to its parent.
    pub fn offset_by(self, base: usize) -> Self {
        match self {
            Self::MalformedVarint { offset } => Self::MalformedVarint {
                offset: offset + base,
            },
            Self::TruncatedPayload {
                offset,
                needed,
                available,
            } => Self::TruncatedPayload {
                offset: offset + base,
                needed,
                available,
            },
            Self::UnsupportedWireType { offset, wire_type } => Self::UnsupportedWireType {
                offset: offset + base,
                wire_type,
            },
            other => other,
        }
    }

    /// Returns true if the bytes themselves were malformed.
    ///
    /// Callers use this to tell a packet that would not parse apart from a
    /// well-formed packet their own logic rejects.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. }
                | Self::TruncatedPayload { .. }
                | Self::UnsupportedWireType { .. }
                | Self::InvalidFieldNumber { .. }
                | Self::InvalidUtf8 { .. }
                | Self::RecursionLimitExceeded { .. }
        )
    }
}
