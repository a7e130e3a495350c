//! Native marshalling descriptors (ECMA-335 II.23.4).
//!
//! A `FieldMarshal` row attaches a descriptor blob to a field or parameter. The first
//! byte names the native type; arrays, safe arrays, fixed buffers and custom marshalers
//! carry trailing fields, each of which may be omitted from the end of the blob.

use crate::{
    file::parser::Parser,
    metadata::typesystem::TypeName,
    Result,
};

/// Native type tags
#[allow(non_snake_case, missing_docs)]
pub mod NATIVE_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const I1: u8 = 0x03;
    pub const U1: u8 = 0x04;
    pub const I2: u8 = 0x05;
    pub const U2: u8 = 0x06;
    pub const I4: u8 = 0x07;
    pub const U4: u8 = 0x08;
    pub const I8: u8 = 0x09;
    pub const U8: u8 = 0x0a;
    pub const R4: u8 = 0x0b;
    pub const R8: u8 = 0x0c;
    pub const SYSCHAR: u8 = 0x0d;
    pub const VARIANT: u8 = 0x0e;
    pub const CURRENCY: u8 = 0x0f;
    pub const PTR: u8 = 0x10;
    pub const DECIMAL: u8 = 0x11;
    pub const DATE: u8 = 0x12;
    pub const BSTR: u8 = 0x13;
    pub const LPSTR: u8 = 0x14;
    pub const LPWSTR: u8 = 0x15;
    pub const LPTSTR: u8 = 0x16;
    pub const FIXEDSYSSTRING: u8 = 0x17;
    pub const OBJECTREF: u8 = 0x18;
    pub const IUNKNOWN: u8 = 0x19;
    pub const IDISPATCH: u8 = 0x1a;
    pub const STRUCT: u8 = 0x1b;
    pub const INTERFACE: u8 = 0x1c;
    pub const SAFEARRAY: u8 = 0x1d;
    pub const FIXEDARRAY: u8 = 0x1e;
    pub const INT: u8 = 0x1f;
    pub const UINT: u8 = 0x20;
    pub const NESTEDSTRUCT: u8 = 0x21;
    pub const BYVALSTR: u8 = 0x22;
    pub const ANSIBSTR: u8 = 0x23;
    pub const TBSTR: u8 = 0x24;
    pub const VARIANTBOOL: u8 = 0x25;
    pub const FUNC: u8 = 0x26;
    pub const ASANY: u8 = 0x28;
    pub const ARRAY: u8 = 0x2a;
    pub const LPSTRUCT: u8 = 0x2b;
    pub const CUSTOMMARSHALER: u8 = 0x2c;
    pub const ERROR: u8 = 0x2d;
    pub const IINSPECTABLE: u8 = 0x2e;
    pub const HSTRING: u8 = 0x2f;
    pub const LPUTF8STR: u8 = 0x30;
    pub const MAX: u8 = 0x50;
}

/// COM `VARTYPE` values used as safe array element types
#[allow(non_snake_case, missing_docs)]
pub mod VARIANT_TYPE {
    pub const EMPTY: u16 = 0;
    pub const NULL: u16 = 1;
    pub const I2: u16 = 2;
    pub const I4: u16 = 3;
    pub const R4: u16 = 4;
    pub const R8: u16 = 5;
    pub const CY: u16 = 6;
    pub const DATE: u16 = 7;
    pub const BSTR: u16 = 8;
    pub const DISPATCH: u16 = 9;
    pub const ERROR: u16 = 10;
    pub const BOOL: u16 = 11;
    pub const VARIANT: u16 = 12;
    pub const UNKNOWN: u16 = 13;
    pub const DECIMAL: u16 = 14;
    pub const I1: u16 = 16;
    pub const UI1: u16 = 17;
    pub const UI2: u16 = 18;
    pub const UI4: u16 = 19;
    pub const I8: u16 = 20;
    pub const UI8: u16 = 21;
    pub const INT: u16 = 22;
    pub const UINT: u16 = 23;
    pub const VOID: u16 = 24;
    pub const HRESULT: u16 = 25;
    pub const PTR: u16 = 26;
    pub const SAFEARRAY: u16 = 27;
    pub const CARRAY: u16 = 28;
    pub const USERDEFINED: u16 = 29;
    pub const LPSTR: u16 = 30;
    pub const LPWSTR: u16 = 31;
    pub const RECORD: u16 = 36;
    pub const INT_PTR: u16 = 37;
    pub const UINT_PTR: u16 = 38;
    pub const FILETIME: u16 = 64;
    pub const BLOB: u16 = 65;
    pub const STREAM: u16 = 66;
    pub const STORAGE: u16 = 67;
    pub const STREAMED_OBJECT: u16 = 68;
    pub const STORED_OBJECT: u16 = 69;
    pub const BLOB_OBJECT: u16 = 70;
    pub const CF: u16 = 71;
    pub const CLSID: u16 = 72;
    pub const VECTOR: u16 = 0x1000;
    pub const ARRAY: u16 = 0x2000;
    pub const BYREF: u16 = 0x4000;
    pub const TYPEMASK: u16 = 0xfff;
}

/// A decoded marshalling descriptor.
///
/// Trailing fields absent from the blob are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum MarshalInfo {
    /// A native type without parameters
    Simple(u8),
    /// `NATIVE_TYPE::ARRAY`
    Array {
        /// Native element type
        element_type: Option<u8>,
        /// Index of the parameter holding the element count
        size_parameter_index: Option<u32>,
        /// Constant element count
        size: Option<u32>,
        /// Multiplier applied to the size parameter
        size_parameter_multiplier: Option<u32>,
    },
    /// `NATIVE_TYPE::SAFEARRAY`
    SafeArray {
        /// `VARTYPE` of the elements
        element_type: Option<u16>,
    },
    /// `NATIVE_TYPE::FIXEDARRAY`
    FixedArray {
        /// Element count
        size: Option<u32>,
        /// Native element type
        element_type: Option<u8>,
    },
    /// `NATIVE_TYPE::FIXEDSYSSTRING`
    FixedSysString {
        /// Buffer size in characters
        size: Option<u32>,
    },
    /// `NATIVE_TYPE::CUSTOMMARSHALER`
    CustomMarshaler {
        /// Type library GUID, `None` when empty
        guid: Option<uguid::Guid>,
        /// Unmanaged type name
        unmanaged_type: Option<String>,
        /// The marshaler type
        managed_type: Option<TypeName>,
        /// String passed to the marshaler's factory method
        cookie: Option<String>,
    },
}

impl MarshalInfo {
    /// The leading native type tag
    #[must_use]
    pub fn native_type(&self) -> u8 {
        match self {
            MarshalInfo::Simple(native_type) => *native_type,
            MarshalInfo::Array { .. } => NATIVE_TYPE::ARRAY,
            MarshalInfo::SafeArray { .. } => NATIVE_TYPE::SAFEARRAY,
            MarshalInfo::FixedArray { .. } => NATIVE_TYPE::FIXEDARRAY,
            MarshalInfo::FixedSysString { .. } => NATIVE_TYPE::FIXEDSYSSTRING,
            MarshalInfo::CustomMarshaler { .. } => NATIVE_TYPE::CUSTOMMARSHALER,
        }
    }
}

/// Decode a `FieldMarshal` blob.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on an empty or truncated blob and
/// [`crate::Error::Malformed`] on a bad GUID or marshaler type name.
pub fn parse_marshal_descriptor(data: &[u8]) -> Result<MarshalInfo> {
    let mut parser = Parser::new(data);
    let native_type = parser.read_le::<u8>()?;

    let info = match native_type {
        NATIVE_TYPE::ARRAY => MarshalInfo::Array {
            element_type: optional(&mut parser, |p| p.read_le::<u8>())?,
            size_parameter_index: optional(&mut parser, Parser::read_compressed_uint)?,
            size: optional(&mut parser, Parser::read_compressed_uint)?,
            size_parameter_multiplier: optional(&mut parser, Parser::read_compressed_uint)?,
        },
        NATIVE_TYPE::SAFEARRAY => MarshalInfo::SafeArray {
            element_type: optional(&mut parser, |p| p.read_le::<u8>().map(u16::from))?,
        },
        NATIVE_TYPE::FIXEDARRAY => MarshalInfo::FixedArray {
            size: optional(&mut parser, Parser::read_compressed_uint)?,
            element_type: optional(&mut parser, |p| p.read_le::<u8>())?,
        },
        NATIVE_TYPE::FIXEDSYSSTRING => MarshalInfo::FixedSysString {
            size: optional(&mut parser, Parser::read_compressed_uint)?,
        },
        NATIVE_TYPE::CUSTOMMARSHALER => {
            let guid = match parser.read_ser_string()?.filter(|guid| !guid.is_empty()) {
                Some(guid) => {
                    let trimmed = guid.trim_start_matches('{').trim_end_matches('}');
                    Some(uguid::Guid::try_parse(trimmed).map_err(|_| {
                        malformed_error!("Invalid custom marshaler GUID '{}'", guid)
                    })?)
                }
                None => None,
            };
            let unmanaged_type = parser.read_ser_string()?;
            let managed_type = match parser.read_ser_string()? {
                Some(name) if !name.is_empty() => Some(TypeName::parse(&name)?),
                _ => None,
            };
            let cookie = parser.read_ser_string()?;

            MarshalInfo::CustomMarshaler {
                guid,
                unmanaged_type,
                managed_type,
                cookie,
            }
        }
        _ => MarshalInfo::Simple(native_type),
    };

    Ok(info)
}

fn optional<'a, T, F>(parser: &mut Parser<'a>, read: F) -> Result<Option<T>>
where
    F: FnOnce(&mut Parser<'a>) -> Result<T>,
{
    if parser.has_more_data() {
        read(parser).map(Some)
    } else {
        Ok(None)
    }
}
