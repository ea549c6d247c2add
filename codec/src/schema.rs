//! flat field-list schemas and the generic encoder/decoder.
//!
//! every account and instruction shape is a [`Schema`]: an ordered list of
//! `{name, wire-type}` pairs. the encoder walks the schema and a [`Value`]
//! side by side; the decoder walks the schema over a byte cursor.
//!
//! wire rules (little endian throughout):
//! - integers: fixed width
//! - `Str`: u32 length + utf-8 bytes
//! - `Pubkey`: 32 raw bytes
//! - `Option`: 1 presence byte, then the value or nothing
//! - `COption`: 4 byte presence tag, then the value or zeroes of the value's width
//! - `Vec`: u32 length + items

use crate::error::{CodecError, MismatchReason};

/// wire type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    U16,
    U32,
    U64,
    I64,
    Bool,
    Str,
    Pubkey,
    /// fixed width raw bytes.
    Bytes(usize),
    Option(&'static WireType),
    /// 4 byte tagged option with a fixed width slot (token program layouts).
    COption(&'static WireType),
    Vec(&'static WireType),
    Struct(&'static Schema),
}

impl WireType {
    /// fixed encoded width, `None` for variable width types.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            WireType::U8 | WireType::Bool => Some(1),
            WireType::U16 => Some(2),
            WireType::U32 => Some(4),
            WireType::U64 | WireType::I64 => Some(8),
            WireType::Pubkey => Some(32),
            WireType::Bytes(n) => Some(*n),
            WireType::COption(inner) => match inner.fixed_size() {
                Some(n) => Some(4 + n),
                None => None,
            },
            WireType::Str | WireType::Option(_) | WireType::Vec(_) | WireType::Struct(_) => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            WireType::U8 => "u8",
            WireType::U16 => "u16",
            WireType::U32 => "u32",
            WireType::U64 => "u64",
            WireType::I64 => "i64",
            WireType::Bool => "bool",
            WireType::Str => "string",
            WireType::Pubkey => "pubkey",
            WireType::Bytes(_) => "bytes",
            WireType::Option(_) => "option",
            WireType::COption(_) => "coption",
            WireType::Vec(_) => "vec",
            WireType::Struct(_) => "struct",
        }
    }
}

/// named field of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: WireType,
}

impl Field {
    pub const fn new(name: &'static str, ty: WireType) -> Self {
        Self { name, ty }
    }
}

/// one account or instruction shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    /// exact encoded size when every field is fixed width.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fields
            .iter()
            .try_fold(0usize, |acc, f| f.ty.fixed_size().map(|n| acc + n))
    }
}

/// structured value mirroring a [`WireType`].
///
/// structs are positional: `Struct(values)` holds one value per schema field,
/// in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    Bool(bool),
    Str(String),
    Pubkey([u8; 32]),
    Bytes(Vec<u8>),
    Option(Option<Box<Value>>),
    Vec(Vec<Value>),
    Struct(Vec<Value>),
}

impl Value {
    pub fn some(value: Value) -> Self {
        Value::Option(Some(Box::new(value)))
    }

    pub const fn none() -> Self {
        Value::Option(None)
    }
}

/// encode a struct value against a schema.
pub fn encode(value: &Value, schema: &'static Schema) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(schema.fixed_size().unwrap_or(64));
    encode_struct(&mut out, value, schema, schema.name)?;
    Ok(out)
}

/// decode bytes against a schema. the input must be consumed exactly.
pub fn decode(bytes: &[u8], schema: &'static Schema) -> Result<Value, CodecError> {
    let mut cursor = Cursor::new(bytes, schema.name);
    let value = decode_struct(&mut cursor, schema)?;
    if cursor.pos != bytes.len() {
        return Err(CodecError::mismatch(
            schema.name,
            MismatchReason::TrailingBytes {
                consumed: cursor.pos,
                len: bytes.len(),
            },
        ));
    }
    Ok(value)
}

/// decode an allocated ledger account: trailing bytes must all be zero.
pub fn decode_padded(bytes: &[u8], schema: &'static Schema) -> Result<Value, CodecError> {
    let mut cursor = Cursor::new(bytes, schema.name);
    let value = decode_struct(&mut cursor, schema)?;
    if bytes[cursor.pos..].iter().any(|&b| b != 0) {
        return Err(CodecError::mismatch(
            schema.name,
            MismatchReason::TrailingBytes {
                consumed: cursor.pos,
                len: bytes.len(),
            },
        ));
    }
    Ok(value)
}

fn encode_struct(
    out: &mut Vec<u8>,
    value: &Value,
    schema: &'static Schema,
    root: &'static str,
) -> Result<(), CodecError> {
    let values = match value {
        Value::Struct(values) => values,
        _ => {
            return Err(CodecError::mismatch(
                root,
                MismatchReason::Shape {
                    field: schema.name,
                    expected: "struct",
                },
            ))
        }
    };

    if values.len() != schema.fields.len() {
        return Err(CodecError::mismatch(
            root,
            MismatchReason::FieldCount {
                expected: schema.fields.len(),
                found: values.len(),
            },
        ));
    }

    for (field, value) in schema.fields.iter().zip(values) {
        encode_field(out, value, &field.ty, field.name, root)?;
    }
    Ok(())
}

fn encode_field(
    out: &mut Vec<u8>,
    value: &Value,
    ty: &WireType,
    field: &'static str,
    root: &'static str,
) -> Result<(), CodecError> {
    let shape = || {
        CodecError::mismatch(
            root,
            MismatchReason::Shape {
                field,
                expected: ty.describe(),
            },
        )
    };

    match (ty, value) {
        (WireType::U8, Value::U8(v)) => out.push(*v),
        (WireType::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (WireType::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (WireType::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (WireType::I64, Value::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (WireType::Bool, Value::Bool(v)) => out.push(*v as u8),
        (WireType::Str, Value::Str(s)) => {
            let len = u32::try_from(s.len()).map_err(|_| shape())?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        (WireType::Pubkey, Value::Pubkey(key)) => out.extend_from_slice(key),
        (WireType::Bytes(n), Value::Bytes(bytes)) => {
            if bytes.len() != *n {
                return Err(shape());
            }
            out.extend_from_slice(bytes);
        }
        (WireType::Option(inner), Value::Option(opt)) => match opt {
            Some(v) => {
                out.push(1);
                encode_field(out, v, inner, field, root)?;
            }
            None => out.push(0),
        },
        (WireType::COption(inner), Value::Option(opt)) => {
            let width = inner.fixed_size().ok_or_else(shape)?;
            match opt {
                Some(v) => {
                    out.extend_from_slice(&1u32.to_le_bytes());
                    encode_field(out, v, inner, field, root)?;
                }
                None => {
                    out.extend_from_slice(&0u32.to_le_bytes());
                    out.resize(out.len() + width, 0);
                }
            }
        }
        (WireType::Vec(inner), Value::Vec(items)) => {
            let len = u32::try_from(items.len()).map_err(|_| shape())?;
            out.extend_from_slice(&len.to_le_bytes());
            for item in items {
                encode_field(out, item, inner, field, root)?;
            }
        }
        (WireType::Struct(schema), v @ Value::Struct(_)) => encode_struct(out, v, schema, root)?,
        _ => return Err(shape()),
    }
    Ok(())
}

/// byte cursor that reports truncation against the root schema.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    root: &'static str,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], root: &'static str) -> Self {
        Self { bytes, pos: 0, root }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::mismatch(
                self.root,
                MismatchReason::Truncated {
                    field,
                    needed: n,
                    remaining: self.remaining(),
                },
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }
}

fn decode_struct(cursor: &mut Cursor<'_>, schema: &'static Schema) -> Result<Value, CodecError> {
    let mut values = Vec::with_capacity(schema.fields.len());
    for field in schema.fields {
        values.push(decode_field(cursor, &field.ty, field.name)?);
    }
    Ok(Value::Struct(values))
}

fn decode_field(
    cursor: &mut Cursor<'_>,
    ty: &WireType,
    field: &'static str,
) -> Result<Value, CodecError> {
    let root = cursor.root;
    let value = match ty {
        WireType::U8 => Value::U8(cursor.array::<1>(field)?[0]),
        WireType::U16 => Value::U16(u16::from_le_bytes(cursor.array(field)?)),
        WireType::U32 => Value::U32(cursor.u32(field)?),
        WireType::U64 => Value::U64(u64::from_le_bytes(cursor.array(field)?)),
        WireType::I64 => Value::I64(i64::from_le_bytes(cursor.array(field)?)),
        WireType::Bool => match cursor.array::<1>(field)?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            byte => {
                return Err(CodecError::mismatch(
                    root,
                    MismatchReason::InvalidBool { field, byte },
                ))
            }
        },
        WireType::Str => {
            let len = cursor.u32(field)? as usize;
            let raw = cursor.take(len, field)?;
            let s = std::str::from_utf8(raw)
                .map_err(|_| CodecError::mismatch(root, MismatchReason::InvalidUtf8 { field }))?;
            Value::Str(s.to_string())
        }
        WireType::Pubkey => Value::Pubkey(cursor.array(field)?),
        WireType::Bytes(n) => Value::Bytes(cursor.take(*n, field)?.to_vec()),
        WireType::Option(inner) => match cursor.array::<1>(field)?[0] {
            0 => Value::Option(None),
            1 => Value::some(decode_field(cursor, inner, field)?),
            tag => {
                return Err(CodecError::mismatch(
                    root,
                    MismatchReason::InvalidTag {
                        field,
                        tag: tag as u32,
                    },
                ))
            }
        },
        WireType::COption(inner) => {
            let width = inner.fixed_size().ok_or_else(|| {
                CodecError::mismatch(root, MismatchReason::Invalid("coption of variable width"))
            })?;
            match cursor.u32(field)? {
                0 => {
                    cursor.take(width, field)?;
                    Value::Option(None)
                }
                1 => Value::some(decode_field(cursor, inner, field)?),
                tag => {
                    return Err(CodecError::mismatch(
                        root,
                        MismatchReason::InvalidTag { field, tag },
                    ))
                }
            }
        }
        WireType::Vec(inner) => {
            let len = cursor.u32(field)? as usize;
            // every item takes at least one byte; reject absurd lengths before allocating.
            if len > cursor.remaining() {
                return Err(CodecError::mismatch(
                    root,
                    MismatchReason::Truncated {
                        field,
                        needed: len,
                        remaining: cursor.remaining(),
                    },
                ));
            }
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_field(cursor, inner, field)?);
            }
            Value::Vec(items)
        }
        WireType::Struct(schema) => decode_struct(cursor, schema)?,
    };
    Ok(value)
}

/// positional reader over a decoded struct value.
///
/// used by typed layouts to pull fields out in schema order with shape checks.
pub struct Fields {
    schema: &'static Schema,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl Fields {
    pub fn new(schema: &'static Schema, value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Struct(values) if values.len() == schema.fields.len() => Ok(Self {
                schema,
                values: values.into_iter(),
                index: 0,
            }),
            Value::Struct(values) => Err(CodecError::mismatch(
                schema.name,
                MismatchReason::FieldCount {
                    expected: schema.fields.len(),
                    found: values.len(),
                },
            )),
            _ => Err(CodecError::mismatch(
                schema.name,
                MismatchReason::Shape {
                    field: schema.name,
                    expected: "struct",
                },
            )),
        }
    }

    fn field_name(&self) -> &'static str {
        self.schema
            .fields
            .get(self.index.saturating_sub(1))
            .map(|f| f.name)
            .unwrap_or(self.schema.name)
    }

    /// shape error for the field most recently read.
    pub fn shape(&self, expected: &'static str) -> CodecError {
        CodecError::mismatch(
            self.schema.name,
            MismatchReason::Shape {
                field: self.field_name(),
                expected,
            },
        )
    }

    pub fn next(&mut self) -> Result<Value, CodecError> {
        self.index += 1;
        let value = self.values.next();
        value.ok_or_else(|| self.shape("value"))
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        match self.next()? {
            Value::U8(v) => Ok(v),
            _ => Err(self.shape("u8")),
        }
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        match self.next()? {
            Value::U16(v) => Ok(v),
            _ => Err(self.shape("u16")),
        }
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        match self.next()? {
            Value::U32(v) => Ok(v),
            _ => Err(self.shape("u32")),
        }
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        match self.next()? {
            Value::U64(v) => Ok(v),
            _ => Err(self.shape("u64")),
        }
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match self.next()? {
            Value::Bool(v) => Ok(v),
            _ => Err(self.shape("bool")),
        }
    }

    pub fn string(&mut self) -> Result<String, CodecError> {
        match self.next()? {
            Value::Str(v) => Ok(v),
            _ => Err(self.shape("string")),
        }
    }

    pub fn pubkey(&mut self) -> Result<[u8; 32], CodecError> {
        match self.next()? {
            Value::Pubkey(v) => Ok(v),
            _ => Err(self.shape("pubkey")),
        }
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        match self.next()? {
            Value::Bytes(v) if v.len() == N => {
                let mut out = [0u8; N];
                out.copy_from_slice(&v);
                Ok(out)
            }
            _ => Err(self.shape("fixed bytes")),
        }
    }

    pub fn option<T>(
        &mut self,
        f: impl FnOnce(Value) -> Result<T, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        match self.next()? {
            Value::Option(None) => Ok(None),
            Value::Option(Some(v)) => f(*v).map(Some),
            _ => Err(self.shape("option")),
        }
    }

    pub fn vec<T>(
        &mut self,
        mut f: impl FnMut(Value) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        match self.next()? {
            Value::Vec(items) => items.into_iter().map(&mut f).collect(),
            _ => Err(self.shape("vec")),
        }
    }

    /// read a constant tag field (instruction index, account key) and check it.
    pub fn expect_u8(&mut self, expected: u8) -> Result<(), CodecError> {
        let found = self.u8()?;
        if found != expected {
            return Err(CodecError::mismatch(
                self.schema.name,
                MismatchReason::Constant {
                    field: self.field_name(),
                    expected: expected as u64,
                    found: found as u64,
                },
            ));
        }
        Ok(())
    }

    pub fn expect_u32(&mut self, expected: u32) -> Result<(), CodecError> {
        let found = self.u32()?;
        if found != expected {
            return Err(CodecError::mismatch(
                self.schema.name,
                MismatchReason::Constant {
                    field: self.field_name(),
                    expected: expected as u64,
                    found: found as u64,
                },
            ));
        }
        Ok(())
    }

    pub fn expect_discriminator(&mut self, expected: [u8; 8]) -> Result<(), CodecError> {
        let found = self.bytes::<8>()?;
        if found != expected {
            return Err(CodecError::mismatch(
                self.schema.name,
                MismatchReason::Discriminator { expected, found },
            ));
        }
        Ok(())
    }
}

/// scalar helpers for nested values (vec items, option payloads).
pub fn as_pubkey(value: Value, schema: &'static Schema) -> Result<[u8; 32], CodecError> {
    match value {
        Value::Pubkey(v) => Ok(v),
        _ => Err(CodecError::mismatch(
            schema.name,
            MismatchReason::Shape {
                field: schema.name,
                expected: "pubkey",
            },
        )),
    }
}

pub fn as_u64(value: Value, schema: &'static Schema) -> Result<u64, CodecError> {
    match value {
        Value::U64(v) => Ok(v),
        _ => Err(CodecError::mismatch(
            schema.name,
            MismatchReason::Shape {
                field: schema.name,
                expected: "u64",
            },
        )),
    }
}

pub fn as_i64(value: Value, schema: &'static Schema) -> Result<i64, CodecError> {
    match value {
        Value::I64(v) => Ok(v),
        _ => Err(CodecError::mismatch(
            schema.name,
            MismatchReason::Shape {
                field: schema.name,
                expected: "i64",
            },
        )),
    }
}

pub fn as_bool(value: Value, schema: &'static Schema) -> Result<bool, CodecError> {
    match value {
        Value::Bool(v) => Ok(v),
        _ => Err(CodecError::mismatch(
            schema.name,
            MismatchReason::Shape {
                field: schema.name,
                expected: "bool",
            },
        )),
    }
}
