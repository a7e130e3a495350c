//! Decoded signature trees.
//!
//! These types mirror the blob grammar one to one. Type references inside them are kept as
//! raw [`Token`]s; turning a tree into graph nodes is the reader's job.

use crate::metadata::token::Token;

/// One decoded type of a signature (ECMA-335 II.23.2.12)
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSignature {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `System.TypedReference`
    TypedByRef,
    /// A value type named by a `TypeDefOrRef` token
    ValueType(Token),
    /// A reference type named by a `TypeDefOrRef` token
    Class(Token),
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed reference
    ByRef(Box<TypeSignature>),
    /// Pinned local
    Pinned(Box<TypeSignature>),
    /// First vararg parameter of a call site
    Sentinel(Box<TypeSignature>),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// General array
    Array(SignatureArray),
    /// `modreq(modifier) element`
    ModifiedRequired {
        /// The modifier type
        modifier: Token,
        /// The modified type
        element: Box<TypeSignature>,
    },
    /// `modopt(modifier) element`
    ModifiedOptional {
        /// The modifier type
        modifier: Token,
        /// The modified type
        element: Box<TypeSignature>,
    },
    /// Instantiation of a generic type
    GenericInst {
        /// Whether the element was tagged `VALUETYPE`
        value_type: bool,
        /// The generic type definition or reference
        element: Token,
        /// Type arguments, in order
        arguments: Vec<TypeSignature>,
    },
    /// `!n`, a type-level generic parameter
    GenericParamType(u32),
    /// `!!n`, a method-level generic parameter
    GenericParamMethod(u32),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
}

impl TypeSignature {
    /// True if `!n` or `!!n` occurs anywhere in this tree
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_) => true,
            TypeSignature::Ptr(inner)
            | TypeSignature::ByRef(inner)
            | TypeSignature::Pinned(inner)
            | TypeSignature::Sentinel(inner)
            | TypeSignature::SzArray(inner) => inner.contains_generic_parameter(),
            TypeSignature::Array(array) => array.element.contains_generic_parameter(),
            TypeSignature::ModifiedRequired { element, .. }
            | TypeSignature::ModifiedOptional { element, .. } => {
                element.contains_generic_parameter()
            }
            TypeSignature::GenericInst { arguments, .. } => arguments
                .iter()
                .any(TypeSignature::contains_generic_parameter),
            TypeSignature::FnPtr(method) => {
                method.return_type.contains_generic_parameter()
                    || method
                        .params
                        .iter()
                        .any(TypeSignature::contains_generic_parameter)
            }
            _ => false,
        }
    }
}

/// `ARRAY` element with its shape
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureArray {
    /// Element type
    pub element: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions
    pub lower_bounds: Vec<i32>,
}

/// Calling convention kinds in the low nibble of a method signature's first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// Managed default
    Default,
    /// `cdecl`
    C,
    /// `stdcall`
    StdCall,
    /// `thiscall`
    ThisCall,
    /// `fastcall`
    FastCall,
    /// Managed varargs
    VarArg,
    /// Unmanaged, convention chosen by modifiers
    Unmanaged,
}

impl CallingConvention {
    /// Map the low nibble of a signature header
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x0F {
            0x0 => Some(CallingConvention::Default),
            0x1 => Some(CallingConvention::C),
            0x2 => Some(CallingConvention::StdCall),
            0x3 => Some(CallingConvention::ThisCall),
            0x4 => Some(CallingConvention::FastCall),
            0x5 => Some(CallingConvention::VarArg),
            0x9 => Some(CallingConvention::Unmanaged),
            _ => None,
        }
    }
}

/// `MethodDefSig`, `MethodRefSig` and `StandAloneMethodSig`
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMethod {
    /// Instance method, `this` passed implicitly
    pub has_this: bool,
    /// `this` is the first explicit parameter
    pub explicit_this: bool,
    /// Calling convention with the flag bits stripped
    pub calling_convention: CallingConvention,
    /// Number of method generic parameters
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSignature,
    /// Parameter types; the first vararg parameter is wrapped in
    /// [`TypeSignature::Sentinel`]
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// Index of the first vararg parameter, if the call site passes any
    #[must_use]
    pub fn sentinel_position(&self) -> Option<usize> {
        self.params
            .iter()
            .position(|param| matches!(param, TypeSignature::Sentinel(_)))
    }
}

/// `FieldSig`
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureField {
    /// Field type, modifiers included
    pub field_type: TypeSignature,
}

/// `PropertySig`
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub property_type: TypeSignature,
    /// Indexer parameters
    pub params: Vec<TypeSignature>,
}

/// `LocalVarSig`
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureLocalVariables {
    /// Local types; pinned locals are wrapped in [`TypeSignature::Pinned`]
    pub locals: Vec<TypeSignature>,
}

/// `MethodSpec` instantiation blob
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMethodSpec {
    /// Method type arguments
    pub generic_args: Vec<TypeSignature>,
}

/// Any signature a `MemberRef` row may carry
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureMember {
    /// Field reference
    Field(SignatureField),
    /// Method reference
    Method(SignatureMethod),
}

/// Any signature a `StandAloneSig` row may carry
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureStandAlone {
    /// Local variables of a method body
    Locals(SignatureLocalVariables),
    /// Call site signature of `calli`
    Method(SignatureMethod),
}
