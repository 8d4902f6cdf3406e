//! Value codec
//!
//! Flattens a typed host field into scalars and rebuilds it from them.
//! The host declares the shape of each field with a [`FieldType`]; values
//! travel as [`FieldValue`]s. Encoding is a match over both enums, so every
//! supported combination is checked at compile time.

use std::fmt;
use thiserror::Error;

use crate::scalar::Scalar;

/// Buffer layout used on a given channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// Numeric-only buffer, lists are count-prefixed (actions, features)
    Legacy,
    /// Observation values, lists packed into one `List` scalar (objects)
    Typed,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Legacy => write!(f, "legacy"),
            WireFormat::Typed => write!(f, "typed"),
        }
    }
}

/// Codec errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("Unsupported field type {type_name} in {format} format")]
    UnsupportedFieldType { type_name: String, format: WireFormat },

    #[error("Recursion limit of {limit} exceeded while flattening {type_name}")]
    RecursionLimitExceeded { limit: usize, type_name: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Buffer underrun while decoding {type_name}")]
    BufferUnderrun { type_name: String },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Primitive numeric kinds a host field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumericKind {
    /// Whether the kind holds integers
    pub fn is_integer(&self) -> bool {
        !matches!(self, NumericKind::F32 | NumericKind::F64)
    }

    /// Type name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            NumericKind::I8 => "i8",
            NumericKind::I16 => "i16",
            NumericKind::I32 => "i32",
            NumericKind::I64 => "i64",
            NumericKind::U8 => "u8",
            NumericKind::U16 => "u16",
            NumericKind::U32 => "u32",
            NumericKind::U64 => "u64",
            NumericKind::F32 => "f32",
            NumericKind::F64 => "f64",
        }
    }

    /// Zero value of this kind
    pub fn zero(&self) -> FieldValue {
        if self.is_integer() {
            FieldValue::Int(0)
        } else {
            FieldValue::Float(0.0)
        }
    }

    /// Convert a wire number back into this kind.
    ///
    /// Integers are rounded and saturated to the kind's range.
    pub fn narrow(&self, raw: f64) -> FieldValue {
        let rounded = raw.round();
        match self {
            NumericKind::I8 => FieldValue::Int(rounded as i8 as i64),
            NumericKind::I16 => FieldValue::Int(rounded as i16 as i64),
            NumericKind::I32 => FieldValue::Int(rounded as i32 as i64),
            NumericKind::I64 => FieldValue::Int(rounded as i64),
            NumericKind::U8 => FieldValue::Int(rounded as u8 as i64),
            NumericKind::U16 => FieldValue::Int(rounded as u16 as i64),
            NumericKind::U32 => FieldValue::Int(rounded as u32 as i64),
            NumericKind::U64 => FieldValue::Int((rounded as u64).min(i64::MAX as u64) as i64),
            NumericKind::F32 => FieldValue::Float(raw as f32 as f64),
            NumericKind::F64 => FieldValue::Float(raw),
        }
    }
}

/// Declared shape of a host field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Boolean, one scalar
    Bool,
    /// Primitive number, one scalar
    Numeric(NumericKind),
    /// Enumeration, encoded as the ordinal of the variant
    Enum { name: String, variants: Vec<String> },
    /// String, typed format only
    Text,
    /// Fixed-length list of floats (small vector types)
    FloatList(usize),
    /// Variable-length array, count-prefixed in the legacy format
    Array(Box<FieldType>),
    /// Struct with public fields, encoded in declaration order
    Record { name: String, fields: Vec<(String, FieldType)> },
    /// Anything else the host cannot flatten (reference graphs, handles...)
    Opaque(String),
}

impl FieldType {
    /// 32-bit float field
    pub fn float() -> Self {
        FieldType::Numeric(NumericKind::F32)
    }

    /// 64-bit float field
    pub fn double() -> Self {
        FieldType::Numeric(NumericKind::F64)
    }

    /// 32-bit integer field
    pub fn int() -> Self {
        FieldType::Numeric(NumericKind::I32)
    }

    /// Enumeration with the given variants, in declaration order
    pub fn enumeration(name: impl Into<String>, variants: &[&str]) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Record with the given fields, in declaration order
    pub fn record(name: impl Into<String>, fields: Vec<(&str, FieldType)>) -> Self {
        FieldType::Record {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(field, ty)| (field.to_string(), ty))
                .collect(),
        }
    }

    /// Array of the given element type
    pub fn array(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    /// Human-readable type name
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Bool => "bool".to_string(),
            FieldType::Numeric(kind) => kind.name().to_string(),
            FieldType::Enum { name, .. } => format!("enum {}", name),
            FieldType::Text => "string".to_string(),
            FieldType::FloatList(len) => format!("float[{}]", len),
            FieldType::Array(element) => format!("array<{}>", element.type_name()),
            FieldType::Record { name, .. } => format!("record {}", name),
            FieldType::Opaque(name) => format!("opaque {}", name),
        }
    }

    fn is_float(&self) -> bool {
        matches!(
            self,
            FieldType::Numeric(NumericKind::F32) | FieldType::Numeric(NumericKind::F64)
        )
    }
}

/// A host value, shaped by a [`FieldType`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Variant name of an enumeration
    Enum(String),
    Text(String),
    FloatList(Vec<f64>),
    Array(Vec<FieldValue>),
    /// Field values in declaration order
    Record(Vec<FieldValue>),
}

impl FieldValue {
    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Enum(_) => "enum",
            FieldValue::Text(_) => "string",
            FieldValue::FloatList(_) => "float list",
            FieldValue::Array(_) => "array",
            FieldValue::Record(_) => "record",
        }
    }

    /// Numeric view, if the value is a bool or a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn mismatch(ty: &FieldType, found: impl Into<String>) -> CodecError {
    CodecError::TypeMismatch {
        expected: ty.type_name(),
        found: found.into(),
    }
}

fn underrun(ty: &FieldType) -> CodecError {
    CodecError::BufferUnderrun {
        type_name: ty.type_name(),
    }
}

/// Encoder/decoder for one wire format
#[derive(Debug, Clone, Copy)]
pub struct ValueCodec {
    format: WireFormat,
    max_depth: usize,
}

impl ValueCodec {
    /// Default nesting limit for records and arrays
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    /// Create a codec for the given format
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Codec for the numeric-only format
    pub fn legacy() -> Self {
        Self::new(WireFormat::Legacy)
    }

    /// Codec for the observation value format
    pub fn typed() -> Self {
        Self::new(WireFormat::Typed)
    }

    /// Override the nesting limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Wire format of this codec
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Flatten a value into scalars
    pub fn encode(&self, value: &FieldValue, ty: &FieldType) -> CodecResult<Vec<Scalar>> {
        match self.format {
            WireFormat::Legacy => Ok(self
                .encode_numbers(value, ty)?
                .into_iter()
                .map(Scalar::Number)
                .collect()),
            WireFormat::Typed => {
                let mut out = Vec::new();
                self.encode_typed(value, ty, 0, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Rebuild a value from scalars, returning it with the number consumed
    pub fn decode(&self, scalars: &[Scalar], ty: &FieldType) -> CodecResult<(FieldValue, usize)> {
        match self.format {
            WireFormat::Legacy => {
                let numbers = scalars
                    .iter()
                    .map(|s| s.as_number().ok_or_else(|| mismatch(ty, s.kind_name())))
                    .collect::<CodecResult<Vec<f64>>>()?;
                self.decode_numbers(&numbers, ty)
            }
            WireFormat::Typed => self.decode_typed(scalars, ty, 0),
        }
    }

    /// Flatten a value into plain numbers using the legacy layout
    pub fn encode_numbers(&self, value: &FieldValue, ty: &FieldType) -> CodecResult<Vec<f64>> {
        let mut out = Vec::new();
        self.encode_legacy(value, ty, 0, &mut out)?;
        Ok(out)
    }

    /// Rebuild a value from plain numbers using the legacy layout
    pub fn decode_numbers(&self, values: &[f64], ty: &FieldType) -> CodecResult<(FieldValue, usize)> {
        self.decode_legacy(values, ty, 0)
    }

    /// Number of scalars a field of this type always occupies.
    ///
    /// `Ok(None)` means the size depends on the value (count-prefixed
    /// arrays). Errors when the type cannot travel in this format at all.
    pub fn fixed_size(&self, ty: &FieldType) -> CodecResult<Option<usize>> {
        self.layout(ty, 0)
    }

    fn enter(&self, ty: &FieldType, depth: usize) -> CodecResult<usize> {
        if depth >= self.max_depth {
            return Err(CodecError::RecursionLimitExceeded {
                limit: self.max_depth,
                type_name: ty.type_name(),
            });
        }
        Ok(depth + 1)
    }

    fn unsupported(&self, ty: &FieldType) -> CodecError {
        CodecError::UnsupportedFieldType {
            type_name: ty.type_name(),
            format: self.format,
        }
    }

    fn layout(&self, ty: &FieldType, depth: usize) -> CodecResult<Option<usize>> {
        match ty {
            FieldType::Bool | FieldType::Numeric(_) | FieldType::Enum { .. } => Ok(Some(1)),
            FieldType::Text => match self.format {
                WireFormat::Typed => Ok(Some(1)),
                WireFormat::Legacy => Err(self.unsupported(ty)),
            },
            FieldType::FloatList(len) => match self.format {
                WireFormat::Typed => Ok(Some(1)),
                WireFormat::Legacy => Ok(Some(1 + len)),
            },
            FieldType::Array(element) => {
                let depth = self.enter(ty, depth)?;
                match self.format {
                    WireFormat::Typed if element.is_float() => Ok(Some(1)),
                    WireFormat::Typed => Err(self.unsupported(ty)),
                    WireFormat::Legacy => {
                        self.layout(element, depth)?;
                        Ok(None)
                    }
                }
            }
            FieldType::Record { fields, .. } => {
                let depth = self.enter(ty, depth)?;
                let mut total = Some(0);
                for (_, field_ty) in fields {
                    let size = self.layout(field_ty, depth)?;
                    total = match (total, size) {
                        (Some(acc), Some(size)) => Some(acc + size),
                        _ => None,
                    };
                }
                Ok(total)
            }
            FieldType::Opaque(_) => Err(self.unsupported(ty)),
        }
    }

    fn encode_enum(ty: &FieldType, variants: &[String], value: &FieldValue) -> CodecResult<f64> {
        match value {
            FieldValue::Enum(variant) => variants
                .iter()
                .position(|v| v == variant)
                .map(|index| index as f64)
                .ok_or_else(|| mismatch(ty, format!("variant {}", variant))),
            other => Err(mismatch(ty, other.kind_name())),
        }
    }

    fn encode_numeric(ty: &FieldType, kind: NumericKind, value: &FieldValue) -> CodecResult<f64> {
        match (kind.is_integer(), value) {
            (true, FieldValue::Int(i)) => Ok(*i as f64),
            (false, FieldValue::Float(f)) => Ok(*f),
            (_, other) => Err(mismatch(ty, other.kind_name())),
        }
    }

    fn check_list_len(ty: &FieldType, expected: usize, found: usize) -> CodecResult<()> {
        if expected != found {
            return Err(mismatch(ty, format!("{} float(s)", found)));
        }
        Ok(())
    }

    fn encode_legacy(
        &self,
        value: &FieldValue,
        ty: &FieldType,
        depth: usize,
        out: &mut Vec<f64>,
    ) -> CodecResult<()> {
        match (ty, value) {
            (FieldType::Bool, FieldValue::Bool(b)) => out.push(if *b { 1.0 } else { 0.0 }),
            (FieldType::Numeric(kind), value) => out.push(Self::encode_numeric(ty, *kind, value)?),
            (FieldType::Enum { variants, .. }, value) => out.push(Self::encode_enum(ty, variants, value)?),
            (FieldType::FloatList(len), FieldValue::FloatList(values)) => {
                Self::check_list_len(ty, *len, values.len())?;
                out.push(values.len() as f64);
                out.extend_from_slice(values);
            }
            (FieldType::Array(element), FieldValue::Array(items)) => {
                let depth = self.enter(ty, depth)?;
                out.push(items.len() as f64);
                for item in items {
                    self.encode_legacy(item, element, depth, out)?;
                }
            }
            (FieldType::Record { fields, .. }, FieldValue::Record(values)) => {
                let depth = self.enter(ty, depth)?;
                if fields.len() != values.len() {
                    return Err(mismatch(ty, format!("record of {} field(s)", values.len())));
                }
                for ((_, field_ty), field_value) in fields.iter().zip(values) {
                    self.encode_legacy(field_value, field_ty, depth, out)?;
                }
            }
            (FieldType::Text, _) | (FieldType::Opaque(_), _) => return Err(self.unsupported(ty)),
            (_, other) => return Err(mismatch(ty, other.kind_name())),
        }
        Ok(())
    }

    fn decode_legacy(
        &self,
        values: &[f64],
        ty: &FieldType,
        depth: usize,
    ) -> CodecResult<(FieldValue, usize)> {
        // Short action buffers leave trailing primitives at their defaults.
        if values.is_empty() {
            match ty {
                FieldType::Bool => return Ok((FieldValue::Bool(false), 0)),
                FieldType::Numeric(kind) => return Ok((kind.zero(), 0)),
                _ => {}
            }
        }

        match ty {
            FieldType::Bool => Ok((FieldValue::Bool(values[0] as i64 == 1), 1)),
            FieldType::Numeric(kind) => Ok((kind.narrow(values[0]), 1)),
            FieldType::Enum { variants, .. } => {
                let raw = *values.first().ok_or_else(|| underrun(ty))?;
                let index = raw as i64;
                if index < 0 || index as usize >= variants.len() {
                    return Err(mismatch(ty, format!("ordinal {}", index)));
                }
                Ok((FieldValue::Enum(variants[index as usize].clone()), 1))
            }
            FieldType::FloatList(len) => {
                let count = *values.first().ok_or_else(|| underrun(ty))? as usize;
                Self::check_list_len(ty, *len, count)?;
                let items = values.get(1..1 + count).ok_or_else(|| underrun(ty))?;
                Ok((FieldValue::FloatList(items.to_vec()), 1 + count))
            }
            FieldType::Array(element) => {
                let depth = self.enter(ty, depth)?;
                let raw = *values.first().ok_or_else(|| underrun(ty))?;
                if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 {
                    return Err(mismatch(ty, format!("element count {}", raw)));
                }
                // Every element occupies at least one number.
                if raw > (values.len() - 1) as f64 {
                    return Err(underrun(ty));
                }
                let count = raw as usize;
                let mut consumed = 1;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    if consumed > values.len() {
                        return Err(underrun(ty));
                    }
                    let (item, used) = self.decode_legacy(&values[consumed..], element, depth)?;
                    items.push(item);
                    consumed += used;
                }
                Ok((FieldValue::Array(items), consumed))
            }
            FieldType::Record { fields, .. } => {
                let depth = self.enter(ty, depth)?;
                let mut consumed = 0;
                let mut items = Vec::with_capacity(fields.len());
                for (_, field_ty) in fields {
                    let rest = values.get(consumed..).unwrap_or(&[]);
                    let (item, used) = self.decode_legacy(rest, field_ty, depth)?;
                    items.push(item);
                    consumed += used;
                }
                Ok((FieldValue::Record(items), consumed))
            }
            FieldType::Text | FieldType::Opaque(_) => Err(self.unsupported(ty)),
        }
    }

    fn encode_typed(
        &self,
        value: &FieldValue,
        ty: &FieldType,
        depth: usize,
        out: &mut Vec<Scalar>,
    ) -> CodecResult<()> {
        match (ty, value) {
            (FieldType::Bool, FieldValue::Bool(b)) => out.push(Scalar::Number(if *b { 1.0 } else { 0.0 })),
            (FieldType::Numeric(kind), value) => {
                out.push(Scalar::Number(Self::encode_numeric(ty, *kind, value)?))
            }
            (FieldType::Enum { variants, .. }, value) => {
                out.push(Scalar::Number(Self::encode_enum(ty, variants, value)?))
            }
            (FieldType::Text, FieldValue::Text(s)) => out.push(Scalar::Text(s.clone())),
            (FieldType::FloatList(len), FieldValue::FloatList(values)) => {
                Self::check_list_len(ty, *len, values.len())?;
                out.push(Scalar::List(values.clone()));
            }
            (FieldType::Array(element), FieldValue::Array(items)) => {
                self.enter(ty, depth)?;
                if !element.is_float() {
                    return Err(self.unsupported(ty));
                }
                let floats = items
                    .iter()
                    .map(|item| match item {
                        FieldValue::Float(f) => Ok(*f),
                        other => Err(mismatch(ty, other.kind_name())),
                    })
                    .collect::<CodecResult<Vec<f64>>>()?;
                out.push(Scalar::List(floats));
            }
            (FieldType::Record { fields, .. }, FieldValue::Record(values)) => {
                let depth = self.enter(ty, depth)?;
                if fields.len() != values.len() {
                    return Err(mismatch(ty, format!("record of {} field(s)", values.len())));
                }
                for ((_, field_ty), field_value) in fields.iter().zip(values) {
                    self.encode_typed(field_value, field_ty, depth, out)?;
                }
            }
            (FieldType::Opaque(_), _) => return Err(self.unsupported(ty)),
            (FieldType::Array(element), _) if !element.is_float() => return Err(self.unsupported(ty)),
            (_, other) => return Err(mismatch(ty, other.kind_name())),
        }
        Ok(())
    }

    fn decode_typed(
        &self,
        scalars: &[Scalar],
        ty: &FieldType,
        depth: usize,
    ) -> CodecResult<(FieldValue, usize)> {
        if let FieldType::Record { fields, .. } = ty {
            let depth = self.enter(ty, depth)?;
            let mut consumed = 0;
            let mut items = Vec::with_capacity(fields.len());
            for (_, field_ty) in fields {
                let rest = scalars.get(consumed..).unwrap_or(&[]);
                let (item, used) = self.decode_typed(rest, field_ty, depth)?;
                items.push(item);
                consumed += used;
            }
            return Ok((FieldValue::Record(items), consumed));
        }

        let first = scalars.first().ok_or_else(|| underrun(ty))?;
        let value = match (ty, first) {
            (FieldType::Bool, Scalar::Boolean(b)) => FieldValue::Bool(*b),
            (FieldType::Bool, Scalar::Number(n)) => FieldValue::Bool(*n as i64 == 1),
            (FieldType::Numeric(kind), scalar) => {
                let raw = scalar.as_number().ok_or_else(|| mismatch(ty, scalar.kind_name()))?;
                kind.narrow(raw)
            }
            (FieldType::Enum { variants, .. }, Scalar::Number(n)) => {
                let index = *n as i64;
                if index < 0 || index as usize >= variants.len() {
                    return Err(mismatch(ty, format!("ordinal {}", index)));
                }
                FieldValue::Enum(variants[index as usize].clone())
            }
            (FieldType::Text, Scalar::Text(s)) => FieldValue::Text(s.clone()),
            (FieldType::FloatList(len), Scalar::List(values)) => {
                Self::check_list_len(ty, *len, values.len())?;
                FieldValue::FloatList(values.clone())
            }
            (FieldType::Array(element), Scalar::List(values)) if element.is_float() => {
                self.enter(ty, depth)?;
                let kind = match element.as_ref() {
                    FieldType::Numeric(kind) => *kind,
                    _ => NumericKind::F64,
                };
                FieldValue::Array(values.iter().map(|v| kind.narrow(*v)).collect())
            }
            (FieldType::Array(element), _) if !element.is_float() => {
                return Err(self.unsupported(ty))
            }
            (FieldType::Opaque(_), _) => return Err(self.unsupported(ty)),
            (_, other) => return Err(mismatch(ty, other.kind_name())),
        };
        Ok((value, 1))
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::typed()
    }
}
