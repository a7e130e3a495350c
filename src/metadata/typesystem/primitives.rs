//! Built-in types and primitive values.

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::{
    file::parser::Parser,
    metadata::{signatures::ELEMENT_TYPE, streams::decode_utf16},
    Result,
};

/// The built-in types signatures encode with a single element type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum PrimitiveKind {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    SByte,
    /// `System.Byte`
    Byte,
    /// `System.Int16`
    Int16,
    /// `System.UInt16`
    UInt16,
    /// `System.Int32`
    Int32,
    /// `System.UInt32`
    UInt32,
    /// `System.Int64`
    Int64,
    /// `System.UInt64`
    UInt64,
    /// `System.Single`
    Single,
    /// `System.Double`
    Double,
    /// `System.String`
    String,
    /// `System.TypedReference`
    TypedReference,
    /// `System.IntPtr`
    IntPtr,
    /// `System.UIntPtr`
    UIntPtr,
    /// `System.Object`
    Object,
}

impl PrimitiveKind {
    /// Simple name inside the `System` namespace
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::String => "String",
            PrimitiveKind::TypedReference => "TypedReference",
            PrimitiveKind::IntPtr => "IntPtr",
            PrimitiveKind::UIntPtr => "UIntPtr",
            PrimitiveKind::Object => "Object",
        }
    }

    /// Element type byte encoding this type
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            PrimitiveKind::Void => ELEMENT_TYPE::VOID,
            PrimitiveKind::Boolean => ELEMENT_TYPE::BOOLEAN,
            PrimitiveKind::Char => ELEMENT_TYPE::CHAR,
            PrimitiveKind::SByte => ELEMENT_TYPE::I1,
            PrimitiveKind::Byte => ELEMENT_TYPE::U1,
            PrimitiveKind::Int16 => ELEMENT_TYPE::I2,
            PrimitiveKind::UInt16 => ELEMENT_TYPE::U2,
            PrimitiveKind::Int32 => ELEMENT_TYPE::I4,
            PrimitiveKind::UInt32 => ELEMENT_TYPE::U4,
            PrimitiveKind::Int64 => ELEMENT_TYPE::I8,
            PrimitiveKind::UInt64 => ELEMENT_TYPE::U8,
            PrimitiveKind::Single => ELEMENT_TYPE::R4,
            PrimitiveKind::Double => ELEMENT_TYPE::R8,
            PrimitiveKind::String => ELEMENT_TYPE::STRING,
            PrimitiveKind::TypedReference => ELEMENT_TYPE::TYPEDBYREF,
            PrimitiveKind::IntPtr => ELEMENT_TYPE::I,
            PrimitiveKind::UIntPtr => ELEMENT_TYPE::U,
            PrimitiveKind::Object => ELEMENT_TYPE::OBJECT,
        }
    }

    /// Map an element type byte back to its built-in type
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<Self> {
        Some(match element_type {
            ELEMENT_TYPE::VOID => PrimitiveKind::Void,
            ELEMENT_TYPE::BOOLEAN => PrimitiveKind::Boolean,
            ELEMENT_TYPE::CHAR => PrimitiveKind::Char,
            ELEMENT_TYPE::I1 => PrimitiveKind::SByte,
            ELEMENT_TYPE::U1 => PrimitiveKind::Byte,
            ELEMENT_TYPE::I2 => PrimitiveKind::Int16,
            ELEMENT_TYPE::U2 => PrimitiveKind::UInt16,
            ELEMENT_TYPE::I4 => PrimitiveKind::Int32,
            ELEMENT_TYPE::U4 => PrimitiveKind::UInt32,
            ELEMENT_TYPE::I8 => PrimitiveKind::Int64,
            ELEMENT_TYPE::U8 => PrimitiveKind::UInt64,
            ELEMENT_TYPE::R4 => PrimitiveKind::Single,
            ELEMENT_TYPE::R8 => PrimitiveKind::Double,
            ELEMENT_TYPE::STRING => PrimitiveKind::String,
            ELEMENT_TYPE::TYPEDBYREF => PrimitiveKind::TypedReference,
            ELEMENT_TYPE::I => PrimitiveKind::IntPtr,
            ELEMENT_TYPE::U => PrimitiveKind::UIntPtr,
            ELEMENT_TYPE::OBJECT => PrimitiveKind::Object,
            _ => return None,
        })
    }

    /// Look up a built-in type by its `System` name
    #[must_use]
    pub fn from_name(namespace: &str, name: &str) -> Option<Self> {
        if namespace != "System" {
            return None;
        }

        use strum::IntoEnumIterator;
        PrimitiveKind::iter().find(|kind| kind.name() == name)
    }

    /// True for the built-in value types
    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::String | PrimitiveKind::Object | PrimitiveKind::Void
        )
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System.{}", self.name())
    }
}

/// A decoded primitive value, as stored in constants and custom attribute blobs
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// `null` for reference types
    Null,
    /// `bool`
    Boolean(bool),
    /// UTF-16 code unit
    Char(u16),
    /// `sbyte`
    I1(i8),
    /// `byte`
    U1(u8),
    /// `short`
    I2(i16),
    /// `ushort`
    U2(u16),
    /// `int`
    I4(i32),
    /// `uint`
    U4(u32),
    /// `long`
    I8(i64),
    /// `ulong`
    U8(u64),
    /// `float`
    R4(f32),
    /// `double`
    R8(f64),
    /// `string`
    String(String),
}

impl PrimitiveValue {
    /// Read one value of element type `element_type` from `parser`.
    ///
    /// Strings are not handled here, their encoding differs between constants and
    /// custom attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data and
    /// [`crate::Error::Malformed`] on a non-primitive element type.
    pub fn read(parser: &mut Parser<'_>, element_type: u8) -> Result<Self> {
        Ok(match element_type {
            ELEMENT_TYPE::BOOLEAN => PrimitiveValue::Boolean(parser.read_le::<u8>()? != 0),
            ELEMENT_TYPE::CHAR => PrimitiveValue::Char(parser.read_le::<u16>()?),
            ELEMENT_TYPE::I1 => PrimitiveValue::I1(parser.read_le::<i8>()?),
            ELEMENT_TYPE::U1 => PrimitiveValue::U1(parser.read_le::<u8>()?),
            ELEMENT_TYPE::I2 => PrimitiveValue::I2(parser.read_le::<i16>()?),
            ELEMENT_TYPE::U2 => PrimitiveValue::U2(parser.read_le::<u16>()?),
            ELEMENT_TYPE::I4 => PrimitiveValue::I4(parser.read_le::<i32>()?),
            ELEMENT_TYPE::U4 => PrimitiveValue::U4(parser.read_le::<u32>()?),
            ELEMENT_TYPE::I8 => PrimitiveValue::I8(parser.read_le::<i64>()?),
            ELEMENT_TYPE::U8 => PrimitiveValue::U8(parser.read_le::<u64>()?),
            ELEMENT_TYPE::R4 => PrimitiveValue::R4(parser.read_le::<f32>()?),
            ELEMENT_TYPE::R8 => PrimitiveValue::R8(parser.read_le::<f64>()?),
            _ => {
                return Err(malformed_error!(
                    "Element type 0x{:02x} is not a primitive value",
                    element_type
                ))
            }
        })
    }

    /// Decode a `Constant` row's value.
    ///
    /// Strings are UTF-16LE without a length prefix, `CLASS` constants are always null.
    ///
    /// # Errors
    /// Fails on truncated data or an element type a constant cannot have.
    pub fn from_constant(element_type: u8, blob: &[u8]) -> Result<Self> {
        match element_type {
            ELEMENT_TYPE::STRING => Ok(PrimitiveValue::String(decode_utf16(blob))),
            ELEMENT_TYPE::CLASS => Ok(PrimitiveValue::Null),
            _ => PrimitiveValue::read(&mut Parser::new(blob), element_type),
        }
    }

    /// Integral value widened to `i64`, used for enum arguments
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Boolean(value) => Some(i64::from(*value)),
            PrimitiveValue::Char(value) => Some(i64::from(*value)),
            PrimitiveValue::I1(value) => Some(i64::from(*value)),
            PrimitiveValue::U1(value) => Some(i64::from(*value)),
            PrimitiveValue::I2(value) => Some(i64::from(*value)),
            PrimitiveValue::U2(value) => Some(i64::from(*value)),
            PrimitiveValue::I4(value) => Some(i64::from(*value)),
            PrimitiveValue::U4(value) => Some(i64::from(*value)),
            PrimitiveValue::I8(value) => Some(*value),
            PrimitiveValue::U8(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// The string payload, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(value) => Some(value),
            _ => None,
        }
    }
}
