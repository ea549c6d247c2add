//! error types for the account codec.

use thiserror::Error;

/// codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("schema mismatch for {schema}: {reason}")]
    SchemaMismatch {
        schema: &'static str,
        reason: MismatchReason,
    },

    #[error("unknown schema: {0}")]
    UnknownSchema(String),
}

impl CodecError {
    #[inline]
    pub(crate) fn mismatch(schema: &'static str, reason: MismatchReason) -> Self {
        CodecError::SchemaMismatch { schema, reason }
    }

    /// true for any byte/shape mismatch against a schema.
    #[inline]
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, CodecError::SchemaMismatch { .. })
    }
}

/// why a payload did not match its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MismatchReason {
    #[error("field `{field}` needs {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{len} bytes given, schema consumed {consumed}")]
    TrailingBytes { consumed: usize, len: usize },

    #[error("field `{field}` has invalid option tag {tag}")]
    InvalidTag { field: &'static str, tag: u32 },

    #[error("field `{field}` has invalid bool byte {byte}")]
    InvalidBool { field: &'static str, byte: u8 },

    #[error("field `{field}` is not valid utf-8")]
    InvalidUtf8 { field: &'static str },

    #[error("field `{field}` expected {expected}")]
    Shape {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` expected constant {expected}, found {found}")]
    Constant {
        field: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("account discriminator {found:?} does not match {expected:?}")]
    Discriminator { expected: [u8; 8], found: [u8; 8] },

    #[error("field count {found} does not match schema ({expected})")]
    FieldCount { expected: usize, found: usize },

    #[error("{0}")]
    Invalid(&'static str),
}
