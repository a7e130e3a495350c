//! Decoded custom attribute values (ECMA-335 II.23.3).

use std::fmt;

use crate::metadata::typesystem::PrimitiveKind;

/// Fixed and named arguments of one custom attribute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomAttributeValue {
    /// Constructor arguments, in parameter order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// The named argument called `name`, if present
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&CustomAttributeNamedArgument> {
        self.named_args.iter().find(|arg| arg.name == name)
    }
}

/// A single argument value.
///
/// Arguments declared `object` are stored as the value they box; the boxed type is kept
/// only where it is observable, for enums and `System.Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// `bool`
    Bool(bool),
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
    /// `string`, `None` for null
    String(Option<String>),
    /// `System.Type` as an assembly-qualified name, `None` for null
    Type(Option<String>),
    /// Single-dimensional array, `None` for null
    Array(Option<Vec<CustomAttributeArgument>>),
    /// Enum value: enum type name and the underlying integral value
    Enum(String, Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Integral value widened to `i64`, looking through enums
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CustomAttributeArgument::Bool(value) => Some(i64::from(*value)),
            CustomAttributeArgument::Char(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I8(value) => Some(*value),
            CustomAttributeArgument::U8(value) => i64::try_from(*value).ok(),
            CustomAttributeArgument::Enum(_, value) => value.as_i64(),
            _ => None,
        }
    }

    /// The string payload of a `string` or `System.Type` argument
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CustomAttributeArgument::String(value) | CustomAttributeArgument::Type(value) => {
                value.as_deref()
            }
            _ => None,
        }
    }
}

/// A field or property assignment
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Field (`true`) or property (`false`)
    pub is_field: bool,
    /// Member name
    pub name: String,
    /// Declared type, e.g. `System.Int32`, `System.Type[]` or the enum name
    pub arg_type: String,
    /// Assigned value
    pub value: CustomAttributeArgument,
}

/// The type an argument is encoded with, from a constructor signature or a
/// `FieldOrPropType`
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentType {
    /// Built-in type, `String` included
    Primitive(PrimitiveKind),
    /// `System.Type`
    Type,
    /// `System.Object`; the blob carries the actual type
    Object,
    /// Enum with its underlying type
    Enum {
        /// Enum type name, as found in the blob or the signature
        name: String,
        /// Underlying integral type
        underlying: PrimitiveKind,
    },
    /// Single-dimensional array
    SzArray(Box<ArgumentType>),
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentType::Primitive(kind) => write!(f, "{kind}"),
            ArgumentType::Type => f.write_str("System.Type"),
            ArgumentType::Object => f.write_str("System.Object"),
            ArgumentType::Enum { name, .. } => f.write_str(name),
            ArgumentType::SzArray(element) => write!(f, "{element}[]"),
        }
    }
}

/// `CorSerializationType` tags used by `FieldOrPropType`
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const TAGGED_OBJECT: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}
