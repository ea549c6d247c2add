use crate::error::CodecError;
use crate::schema::{self, Fields, Schema, Value};

/// typed view over one schema entry.
pub trait Layout: Sized {
    const SCHEMA: &'static Schema;

    fn to_value(&self) -> Value;

    fn from_fields(fields: &mut Fields) -> Result<Self, CodecError>;

    fn from_value(value: Value) -> Result<Self, CodecError> {
        let mut fields = Fields::new(Self::SCHEMA, value)?;
        Self::from_fields(&mut fields)
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        schema::encode(&self.to_value(), Self::SCHEMA)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_value(schema::decode(bytes, Self::SCHEMA)?)
    }

    /// decode an allocated account that may carry zero padding.
    fn decode_padded(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_value(schema::decode_padded(bytes, Self::SCHEMA)?)
    }
}
