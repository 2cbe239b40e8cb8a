//! Error taxonomy shared by the value model, the tree readers and the call
//! boundary. Variants map 1:1 onto the error codes reported to the host
//! language; the message text is what the host sees.

use thiserror::Error;

/// Result alias used across the crate.
pub type BindResult<T> = Result<T, BindError>;

#[derive(Debug, Error)]
pub enum BindError {
    /// A value had the wrong type for the requested operation.
    #[error("type mismatch: {0}")]
    Type(String),

    /// A numeric value did not fit the target type.
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),

    /// Malformed input for the declared string encoding.
    #[error("string encoding error: {0}")]
    Encoding(&'static str),

    /// Allocation failure reported by the host boundary.
    #[error("memory allocation failed")]
    Alloc,

    /// A bounded destination buffer was too small for the encoded output.
    #[error("buffer too small for encoded string")]
    BufferOverflow,

    /// A mandatory field of a structure was never seen.
    #[error("missing field '{field}' in {record} structure")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// The same field of a structure was seen twice.
    #[error("duplicate field '{field}' in {record} structure")]
    DuplicateField {
        record: &'static str,
        field: &'static str,
    },

    /// A field name not in the structure's vocabulary.
    #[error("unknown field '{field}' in {record} structure")]
    UnknownField {
        record: &'static str,
        field: String,
    },

    /// The token stream did not have the expected shape.
    #[error("unexpected token in {context}: expected {expected}")]
    UnexpectedToken {
        context: &'static str,
        expected: &'static str,
    },

    /// A base64 blob field could not be decoded.
    #[error("invalid base64 blob: {0}")]
    BlobDecode(#[from] base64::DecodeError),

    /// An error annotated with the token context it occurred in. Only the
    /// outermost reader entry point attaches this.
    #[error("{source} (at {location})")]
    Located {
        #[source]
        source: Box<BindError>,
        location: String,
    },
}

impl BindError {
    /// Wrap the error with a rendered token-context window. Already located
    /// errors are left alone so nesting never stacks windows.
    pub fn at(self, location: String) -> BindError {
        match self {
            located @ BindError::Located { .. } => located,
            other => BindError::Located {
                source: Box::new(other),
                location,
            },
        }
    }

    pub fn type_error(msg: impl Into<String>) -> BindError {
        BindError::Type(msg.into())
    }
}
