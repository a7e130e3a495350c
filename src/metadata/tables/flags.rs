//! Attribute flags stored in table rows.

use bitflags::bitflags;

#[allow(non_snake_case)]
/// `TypeDef.Flags` (ECMA-335 II.23.1.15)
pub mod TypeAttributes {
    /// Visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Not visible outside the assembly
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Visible outside the assembly
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested, public
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested, private
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Layout bits
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Fields laid out sequentially
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Fields laid out at explicit offsets
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Type is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Type cannot be derived from
    pub const SEALED: u32 = 0x0000_0100;
    /// Name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Type is imported
    pub const IMPORT: u32 = 0x0000_1000;
    /// Type is serializable
    pub const SERIALIZABLE: u32 = 0x0000_2000;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x0000_0800;
    /// Type has security declarations
    pub const HAS_SECURITY: u32 = 0x0004_0000;
    /// Type initializer may run before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// `Field.Flags` (ECMA-335 II.23.1.5)
pub mod FieldAttributes {
    /// Accessibility bits
    pub const FIELD_ACCESS_MASK: u16 = 0x0007;
    /// Accessible by all
    pub const PUBLIC: u16 = 0x0006;
    /// Accessible only by the parent type
    pub const PRIVATE: u16 = 0x0001;
    /// Static field
    pub const STATIC: u16 = 0x0010;
    /// Initialized only in the constructor
    pub const INIT_ONLY: u16 = 0x0020;
    /// Compile-time constant
    pub const LITERAL: u16 = 0x0040;
    /// Not serialized
    pub const NOT_SERIALIZED: u16 = 0x0080;
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Implemented via platform invoke
    pub const PINVOKE_IMPL: u16 = 0x2000;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// Field has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x1000;
    /// Field has a default value
    pub const HAS_DEFAULT: u16 = 0x8000;
    /// Field has an RVA
    pub const HAS_FIELD_RVA: u16 = 0x0100;
}

#[allow(non_snake_case)]
/// `MethodDef.Flags` (ECMA-335 II.23.1.10)
pub mod MethodAttributes {
    /// Accessibility bits
    pub const MEMBER_ACCESS_MASK: u16 = 0x0007;
    /// Accessible by all
    pub const PUBLIC: u16 = 0x0006;
    /// Accessible only by the parent type
    pub const PRIVATE: u16 = 0x0001;
    /// Static method
    pub const STATIC: u16 = 0x0010;
    /// Cannot be overridden
    pub const FINAL: u16 = 0x0020;
    /// Virtual method
    pub const VIRTUAL: u16 = 0x0040;
    /// Hide by name and signature
    pub const HIDE_BY_SIG: u16 = 0x0080;
    /// Always gets a new vtable slot
    pub const NEW_SLOT: u16 = 0x0100;
    /// No implementation provided
    pub const ABSTRACT: u16 = 0x0400;
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0800;
    /// Implemented via platform invoke
    pub const PINVOKE_IMPL: u16 = 0x2000;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x1000;
    /// Method has security declarations
    pub const HAS_SECURITY: u16 = 0x4000;
}

#[allow(non_snake_case)]
/// `Param.Flags` (ECMA-335 II.23.1.13)
pub mod ParamAttributes {
    /// Input parameter
    pub const IN: u16 = 0x0001;
    /// Output parameter
    pub const OUT: u16 = 0x0002;
    /// Optional parameter
    pub const OPTIONAL: u16 = 0x0010;
    /// Parameter has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
    /// Parameter has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x2000;
}

#[allow(non_snake_case)]
/// `Property.Flags` (ECMA-335 II.23.1.14)
pub mod PropertyAttributes {
    /// Property is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// Property has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
}

#[allow(non_snake_case)]
/// `Event.EventFlags` (ECMA-335 II.23.1.4)
pub mod EventAttributes {
    /// Event is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
}

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// `MethodSemantics.Semantics` (ECMA-335 II.23.1.12)
    pub struct MethodSemanticsAttributes: u16 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Other accessor of a property or event
        const OTHER = 0x0004;
        /// Event add accessor
        const ADD_ON = 0x0008;
        /// Event remove accessor
        const REMOVE_ON = 0x0010;
        /// Event raise accessor
        const FIRE = 0x0020;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// `GenericParam.Flags` (ECMA-335 II.23.1.7)
    pub struct GenericParameterAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// Must be a reference type
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// Must be a non-nullable value type
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// Must have a public default constructor
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// `ImplMap.MappingFlags` (ECMA-335 II.23.1.8)
    pub struct PInvokeAttributes: u16 {
        /// Use the member name as specified
        const NO_MANGLE = 0x0001;
        /// Marshal strings as ANSI
        const CHAR_SET_ANSI = 0x0002;
        /// Marshal strings as UTF-16
        const CHAR_SET_UNICODE = 0x0004;
        /// Pick the character set automatically
        const CHAR_SET_AUTO = 0x0006;
        /// Callee calls `SetLastError`
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// Platform default calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// `cdecl`
        const CALL_CONV_CDECL = 0x0200;
        /// `stdcall`
        const CALL_CONV_STDCALL = 0x0300;
        /// `thiscall`
        const CALL_CONV_THISCALL = 0x0400;
        /// `fastcall`
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// `Assembly.Flags` and `AssemblyRef.Flags` (ECMA-335 II.23.1.2)
    pub struct AssemblyFlags: u32 {
        /// The blob holds the full public key rather than its token
        const PUBLIC_KEY = 0x0001;
        /// Assembly may be retargeted at runtime
        const RETARGETABLE = 0x0100;
        /// Windows Runtime content
        const WINDOWS_RUNTIME = 0x0200;
        /// JIT tracking disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// JIT tracking enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}
