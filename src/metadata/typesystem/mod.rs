//! The object graph a module materializes.
//!
//! Every type a signature can name is a [`CilType`]: a cheap handle to a type definition,
//! a type reference, a type specification (arrays, pointers, generic instances, ...) or a
//! generic parameter. Definitions and generic parameters are owned by the module's
//! caches and referenced weakly, so cyclic graphs (a type whose field has its own type,
//! `class A : B<A>`) never leak. Two handles compare equal when they point at the same
//! node.

mod generics;
mod members;
mod primitives;
mod scope;
mod typename;
mod types;

pub use generics::{GenericParamRc, GenericParameter, GenericParameterKind, GenericParameterOwner};
pub use members::{
    EventAccessors, EventDefinition, EventRc, FieldDefinition, FieldRc, GenericInstanceMethod,
    GenericInstanceMethodRc, MemberCollection, MemberRefParent, MemberRefRc, MemberReference,
    MemberSignature, MethodDefRc, MethodDefinition, MethodHandle, MethodParameters, OwnedMember,
    PInvokeInfo, ParamRc, ParameterDefinition, PropertyAccessors, PropertyDefinition, PropertyRc,
    StandAloneSignature,
};
pub use primitives::{PrimitiveKind, PrimitiveValue};
pub use scope::{
    AssemblyDefinition, AssemblyNameReference, AssemblyRefRc, AssemblyVersion, ExportedType,
    ExportedTypeImplementation, ExportedTypeRc, MetadataScope, ModuleRefRc, ModuleReference,
};
pub use typename::TypeName;
pub use types::{
    ClassLayout, InterfaceImplementation, TypeDefRc, TypeDefinition, TypeRefRc, TypeReference,
};

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::metadata::{
    reader::ModuleRc,
    signatures::CallingConvention,
    token::Token,
};

/// Handle to any type a signature can name
#[derive(Clone)]
pub enum CilType {
    /// A `TypeDef` of some module
    Definition(Weak<TypeDefinition>),
    /// A `TypeRef`, or a reference synthesized for a built-in type
    Reference(TypeRefRc),
    /// A constructed type
    Specification(TypeSpecRc),
    /// `!n` or `!!n`
    GenericParameter(Weak<GenericParameter>),
}

impl CilType {
    /// Handle to a definition
    #[must_use]
    pub fn definition(definition: &TypeDefRc) -> Self {
        CilType::Definition(Arc::downgrade(definition))
    }

    /// Handle to a generic parameter
    #[must_use]
    pub fn generic_parameter(parameter: &GenericParamRc) -> Self {
        CilType::GenericParameter(Arc::downgrade(parameter))
    }

    /// Handle to a new, uncached type specification
    #[must_use]
    pub fn specification(kind: TypeSpecKind) -> Self {
        CilType::Specification(Arc::new(TypeSpecification {
            token: Token::new(0),
            kind,
        }))
    }

    /// The definition, if this is one and its module is alive
    #[must_use]
    pub fn as_definition(&self) -> Option<TypeDefRc> {
        match self {
            CilType::Definition(definition) => definition.upgrade(),
            _ => None,
        }
    }

    /// The reference, if this is one
    #[must_use]
    pub fn as_reference(&self) -> Option<&TypeRefRc> {
        match self {
            CilType::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// The specification, if this is one
    #[must_use]
    pub fn as_specification(&self) -> Option<&TypeSpecRc> {
        match self {
            CilType::Specification(specification) => Some(specification),
            _ => None,
        }
    }

    /// The generic parameter, if this is one and its owner is alive
    #[must_use]
    pub fn as_generic_parameter(&self) -> Option<GenericParamRc> {
        match self {
            CilType::GenericParameter(parameter) => parameter.upgrade(),
            _ => None,
        }
    }

    /// Token of the node, null for uncached specifications and unbound parameters
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            CilType::Definition(definition) => definition
                .upgrade()
                .map_or(Token::new(0), |definition| definition.token),
            CilType::Reference(reference) => reference.token,
            CilType::Specification(specification) => specification.token,
            CilType::GenericParameter(parameter) => parameter
                .upgrade()
                .map_or(Token::new(0), |parameter| parameter.token),
        }
    }

    /// Namespace of a named type; empty for specifications and parameters
    #[must_use]
    pub fn namespace(&self) -> String {
        match self {
            CilType::Definition(definition) => definition
                .upgrade()
                .map(|definition| definition.namespace.clone())
                .unwrap_or_default(),
            CilType::Reference(reference) => reference.namespace.clone(),
            _ => String::new(),
        }
    }

    /// Simple name of a named type or parameter
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            CilType::Definition(definition) => definition
                .upgrade()
                .map(|definition| definition.name.clone())
                .unwrap_or_default(),
            CilType::Reference(reference) => reference.name.clone(),
            CilType::GenericParameter(parameter) => parameter
                .upgrade()
                .map(|parameter| parameter.name.clone())
                .unwrap_or_default(),
            CilType::Specification(_) => self.full_name(),
        }
    }

    /// Full name in reflection notation, `Outer/Inner` for nested types
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            CilType::Definition(definition) => definition
                .upgrade()
                .map(|definition| definition.full_name())
                .unwrap_or_else(|| "<dropped>".to_string()),
            CilType::Reference(reference) => reference.full_name(),
            CilType::Specification(specification) => specification.full_name(),
            CilType::GenericParameter(parameter) => parameter
                .upgrade()
                .map(|parameter| parameter.name.clone())
                .unwrap_or_else(|| "<dropped>".to_string()),
        }
    }

    /// Module owning the node, if it is a definition or a table-backed reference
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        match self {
            CilType::Definition(definition) => definition.upgrade()?.module(),
            CilType::Reference(reference) => reference.module(),
            CilType::GenericParameter(parameter) => parameter.upgrade()?.module(),
            CilType::Specification(specification) => specification.element_type()?.module(),
        }
    }

    /// The built-in type this names, if any
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            CilType::Definition(_) | CilType::Reference(_) => {
                PrimitiveKind::from_name(&self.namespace(), &self.name())
            }
            _ => None,
        }
    }

    /// True if a generic parameter occurs anywhere in this type
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            CilType::GenericParameter(_) => true,
            CilType::Specification(specification) => specification.contains_generic_parameter(),
            _ => false,
        }
    }

    /// Strip every specification wrapper, returning the innermost named type.
    ///
    /// For a generic instance this is the generic type itself.
    #[must_use]
    pub fn element_type(&self) -> CilType {
        match self {
            CilType::Specification(specification) => specification
                .element_type()
                .unwrap_or_else(|| self.clone()),
            _ => self.clone(),
        }
    }

    /// True for value types that are known to be value types without resolving anything
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            CilType::Definition(definition) => definition
                .upgrade()
                .is_some_and(|definition| definition.is_value_type()),
            CilType::Reference(reference) => reference.is_value_type(),
            CilType::Specification(specification) => match &specification.kind {
                TypeSpecKind::GenericInstance { value_type, .. } => *value_type,
                TypeSpecKind::RequiredModifier { element, .. }
                | TypeSpecKind::OptionalModifier { element, .. }
                | TypeSpecKind::Pinned(element)
                | TypeSpecKind::Sentinel(element) => element.is_value_type(),
                _ => false,
            },
            CilType::GenericParameter(_) => false,
        }
    }
}

impl PartialEq for CilType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CilType::Definition(a), CilType::Definition(b)) => Weak::ptr_eq(a, b),
            (CilType::Reference(a), CilType::Reference(b)) => Arc::ptr_eq(a, b),
            (CilType::Specification(a), CilType::Specification(b)) => Arc::ptr_eq(a, b),
            (CilType::GenericParameter(a), CilType::GenericParameter(b)) => Weak::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            CilType::Definition(_) => "Definition",
            CilType::Reference(_) => "Reference",
            CilType::Specification(_) => "Specification",
            CilType::GenericParameter(_) => "GenericParameter",
        };
        write!(f, "{}({})", kind, self.full_name())
    }
}

impl fmt::Display for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// One dimension of a general array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayDimension {
    /// Lower bound, if the signature gives one
    pub lower_bound: Option<i32>,
    /// Inclusive upper bound, known only if both lower bound and size are given
    pub upper_bound: Option<i32>,
}

impl ArrayDimension {
    /// Build the dimension descriptors of an `ARRAY` signature
    #[must_use]
    pub fn from_shape(rank: u32, sizes: &[u32], lower_bounds: &[i32]) -> Vec<ArrayDimension> {
        (0..rank as usize)
            .map(|i| {
                let lower_bound = lower_bounds.get(i).copied();
                let upper_bound = match (lower_bound, sizes.get(i)) {
                    (Some(lower), Some(size)) => i32::try_from(*size)
                        .ok()
                        .and_then(|size| lower.checked_add(size))
                        .map(|end| end - 1),
                    _ => None,
                };
                ArrayDimension {
                    lower_bound,
                    upper_bound,
                }
            })
            .collect()
    }
}

/// Shape of a constructed type
#[derive(Debug, Clone)]
pub enum TypeSpecKind {
    /// General array
    Array {
        /// Element type
        element: CilType,
        /// One descriptor per dimension
        dimensions: Vec<ArrayDimension>,
    },
    /// Zero-based vector
    SzArray(CilType),
    /// Unmanaged pointer
    Pointer(CilType),
    /// Managed reference
    ByReference(CilType),
    /// Pinned local
    Pinned(CilType),
    /// First vararg parameter
    Sentinel(CilType),
    /// `modreq`
    RequiredModifier {
        /// Modifier type
        modifier: CilType,
        /// Modified type
        element: CilType,
    },
    /// `modopt`
    OptionalModifier {
        /// Modifier type
        modifier: CilType,
        /// Modified type
        element: CilType,
    },
    /// Generic type instantiation
    GenericInstance {
        /// Generic type definition or reference
        element: CilType,
        /// Type arguments
        arguments: Vec<CilType>,
        /// Tagged as value type in the signature
        value_type: bool,
    },
    /// Function pointer
    FunctionPointer(Box<MethodSignature>),
}

/// A constructed type, either from a `TypeSpec` row or built while decoding a signature
#[derive(Debug)]
pub struct TypeSpecification {
    /// `TypeSpec` token, null when not backed by a row
    pub token: Token,
    /// Shape
    pub kind: TypeSpecKind,
}

/// Shared handle of a type specification
pub type TypeSpecRc = Arc<TypeSpecification>;

impl TypeSpecification {
    /// Innermost named type; `None` for function pointers, which have none
    #[must_use]
    pub fn element_type(&self) -> Option<CilType> {
        match &self.kind {
            TypeSpecKind::Array { element, .. }
            | TypeSpecKind::SzArray(element)
            | TypeSpecKind::Pointer(element)
            | TypeSpecKind::ByReference(element)
            | TypeSpecKind::Pinned(element)
            | TypeSpecKind::Sentinel(element)
            | TypeSpecKind::RequiredModifier { element, .. }
            | TypeSpecKind::OptionalModifier { element, .. }
            | TypeSpecKind::GenericInstance { element, .. } => Some(element.element_type()),
            TypeSpecKind::FunctionPointer(_) => None,
        }
    }

    /// Arguments of a generic instance, empty otherwise
    #[must_use]
    pub fn generic_arguments(&self) -> &[CilType] {
        match &self.kind {
            TypeSpecKind::GenericInstance { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// True if a generic parameter occurs anywhere in this type
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match &self.kind {
            TypeSpecKind::Array { element, .. }
            | TypeSpecKind::SzArray(element)
            | TypeSpecKind::Pointer(element)
            | TypeSpecKind::ByReference(element)
            | TypeSpecKind::Pinned(element)
            | TypeSpecKind::Sentinel(element) => element.contains_generic_parameter(),
            TypeSpecKind::RequiredModifier { modifier, element }
            | TypeSpecKind::OptionalModifier { modifier, element } => {
                modifier.contains_generic_parameter() || element.contains_generic_parameter()
            }
            TypeSpecKind::GenericInstance {
                element, arguments, ..
            } => {
                element.contains_generic_parameter()
                    || arguments.iter().any(CilType::contains_generic_parameter)
            }
            TypeSpecKind::FunctionPointer(method) => method.contains_generic_parameter(),
        }
    }

    /// Reflection-style name, e.g. ``System.Collections.Generic.List`1<System.Int32>``
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.kind {
            TypeSpecKind::Array {
                element,
                dimensions,
            } => {
                let shape = dimensions
                    .iter()
                    .map(|dimension| match (dimension.lower_bound, dimension.upper_bound) {
                        (Some(lower), Some(upper)) => format!("{lower}...{upper}"),
                        (Some(lower), None) => format!("{lower}..."),
                        _ => String::new(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}[{}]", element.full_name(), shape)
            }
            TypeSpecKind::SzArray(element) => format!("{}[]", element.full_name()),
            TypeSpecKind::Pointer(element) => format!("{}*", element.full_name()),
            TypeSpecKind::ByReference(element) => format!("{}&", element.full_name()),
            TypeSpecKind::Pinned(element) | TypeSpecKind::Sentinel(element) => {
                element.full_name()
            }
            TypeSpecKind::RequiredModifier { modifier, element } => {
                format!("{} modreq({})", element.full_name(), modifier.full_name())
            }
            TypeSpecKind::OptionalModifier { modifier, element } => {
                format!("{} modopt({})", element.full_name(), modifier.full_name())
            }
            TypeSpecKind::GenericInstance {
                element, arguments, ..
            } => format!(
                "{}<{}>",
                element.full_name(),
                arguments
                    .iter()
                    .map(CilType::full_name)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            TypeSpecKind::FunctionPointer(method) => format!(
                "method {} *({})",
                method.return_type.full_name(),
                method
                    .parameters
                    .iter()
                    .map(CilType::full_name)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

/// A method signature with every type resolved to a graph node
#[derive(Debug, Clone)]
pub struct MethodSignature {
    /// Instance method
    pub has_this: bool,
    /// `this` is passed explicitly
    pub explicit_this: bool,
    /// Calling convention, flag bits stripped
    pub calling_convention: CallingConvention,
    /// Number of method generic parameters
    pub generic_arity: u32,
    /// Return type
    pub return_type: CilType,
    /// Parameter types, the first vararg wrapped in [`TypeSpecKind::Sentinel`]
    pub parameters: Vec<CilType>,
}

impl MethodSignature {
    /// Index of the first vararg parameter
    #[must_use]
    pub fn sentinel_position(&self) -> Option<usize> {
        self.parameters.iter().position(|parameter| {
            matches!(
                parameter.as_specification().map(|spec| &spec.kind),
                Some(TypeSpecKind::Sentinel(_))
            )
        })
    }

    /// True if a generic parameter occurs in the return or any parameter type
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        self.return_type.contains_generic_parameter()
            || self
                .parameters
                .iter()
                .any(CilType::contains_generic_parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_dimensions() {
        let dimensions = ArrayDimension::from_shape(3, &[10, 4], &[0, -2, 5]);
        assert_eq!(
            dimensions,
            vec![
                ArrayDimension {
                    lower_bound: Some(0),
                    upper_bound: Some(9)
                },
                ArrayDimension {
                    lower_bound: Some(-2),
                    upper_bound: Some(1)
                },
                ArrayDimension {
                    lower_bound: Some(5),
                    upper_bound: None
                },
            ]
        );

        // size without lower bound leaves both open
        let dimensions = ArrayDimension::from_shape(1, &[3], &[]);
        assert_eq!(dimensions[0], ArrayDimension::default());
    }

    #[test]
    fn specification_identity_and_names() {
        let reference = Arc::new(TypeReference::synthesized("System", "Int32", None, true));
        let int32 = CilType::Reference(reference);

        let vector = CilType::specification(TypeSpecKind::SzArray(int32.clone()));
        assert_eq!(vector.full_name(), "System.Int32[]");
        assert_eq!(vector, vector.clone());
        assert_ne!(
            vector,
            CilType::specification(TypeSpecKind::SzArray(int32.clone()))
        );
        assert_eq!(vector.element_type(), int32);
        assert!(!vector.contains_generic_parameter());
        assert_eq!(int32.primitive_kind(), Some(PrimitiveKind::Int32));
        assert!(int32.is_value_type());
    }
}
