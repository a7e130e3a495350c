//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Signatures are compact, recursively encoded descriptions of types and members stored
//! in the `#Blob` heap. This module decodes them into [`TypeSignature`] trees whose type
//! references are still raw tokens, so decoding never touches any table. The reader turns
//! these trees into graph nodes, resolving every token against the module.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::signatures::{parse_method_signature, TypeSignature};
//!
//! // instance void (int32, string)
//! let method = parse_method_signature(&[0x20, 0x02, 0x01, 0x08, 0x0E])?;
//! assert!(method.has_this);
//! assert_eq!(method.params, vec![TypeSignature::I4, TypeSignature::String]);
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod parser;
mod types;

pub use parser::{SignatureParser, MAX_RECURSION_DEPTH};
pub use types::*;

use crate::Result;

/// Element type tags (ECMA-335 II.23.1.16)
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    /// Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    /// Followed by type
    pub const PTR: u8 = 0x0f;
    /// Followed by type
    pub const BYREF: u8 = 0x10;
    /// Followed by `TypeDef` or `TypeRef` token
    pub const VALUETYPE: u8 = 0x11;
    /// Followed by `TypeDef` or `TypeRef` token
    pub const CLASS: u8 = 0x12;
    /// Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    /// type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    /// Generic type instantiation, followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    /// `System.IntPtr`
    pub const I: u8 = 0x18;
    /// `System.UIntPtr`
    pub const U: u8 = 0x19;
    /// Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    /// `System.Object`
    pub const OBJECT: u8 = 0x1c;
    /// Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    /// Generic parameter in a generic method definition, represented as number
    pub const MVAR: u8 = 0x1e;
    /// Required modifier, followed by a `TypeDef` or `TypeRef` token
    pub const CMOD_REQD: u8 = 0x1f;
    /// Optional modifier, followed by a `TypeDef` or `TypeRef` token
    pub const CMOD_OPT: u8 = 0x20;
    /// Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    /// Or'd with following element types
    pub const MODIFIER: u8 = 0x40;
    /// Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    /// Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
    /// `System.Type` in custom attribute blobs
    pub const TYPE: u8 = 0x50;
    /// Boxed object in custom attribute blobs
    pub const BOXED: u8 = 0x51;
    /// Custom attribute field
    pub const FIELD: u8 = 0x53;
    /// Custom attribute property
    pub const PROPERTY: u8 = 0x54;
    /// Enum in custom attribute blobs, followed by the enum type name
    pub const ENUM: u8 = 0x55;
}

/// Signature header bytes and flags (ECMA-335 II.23.2.1 - II.23.2.5)
#[allow(non_snake_case, missing_docs)]
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST: u8 = 0x0A;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;
}

/// Decode a method signature blob
///
/// # Errors
/// See [`SignatureParser::parse_method_signature`].
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Decode a field signature blob
///
/// # Errors
/// See [`SignatureParser::parse_field_signature`].
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Decode a property signature blob
///
/// # Errors
/// See [`SignatureParser::parse_property_signature`].
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Decode a local variable signature blob
///
/// # Errors
/// See [`SignatureParser::parse_local_var_signature`].
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Decode a type specification blob
///
/// # Errors
/// See [`SignatureParser::parse_type_spec_signature`].
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Decode a method specification blob
///
/// # Errors
/// See [`SignatureParser::parse_method_spec_signature`].
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}
