//! Generic substitution: replacing `!n` and `!!n` with the arguments of an instantiation.
//!
//! Signatures read from metadata mention generic parameters, not arguments. A field of
//! ``List`1`` has type `T` no matter which `List<int>` the field is reached through. A
//! [`GenericSubstitution`] carries the type arguments of the declaring instantiation and
//! the method arguments of a generic method instantiation and rewrites a type so every
//! parameter is replaced by its argument.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::{Arc, Weak};
//! use dotmeta::metadata::{
//!     substitution::GenericSubstitution,
//!     typesystem::{CilType, GenericParameter, GenericParameterKind, TypeReference, TypeSpecKind},
//! };
//!
//! let t = Arc::new(GenericParameter::placeholder(0, GenericParameterKind::Type, None, Weak::new()));
//! let int32 = CilType::Reference(Arc::new(TypeReference::synthesized("System", "Int32", None, true)));
//! let array_of_t = CilType::specification(TypeSpecKind::SzArray(CilType::generic_parameter(&t)));
//!
//! let substitution = GenericSubstitution::new(Some(vec![int32]), None);
//! assert_eq!(substitution.resolve(&array_of_t)?.full_name(), "System.Int32[]");
//! # Ok::<(), dotmeta::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    metadata::{
        typesystem::{
            CilType, GenericParamRc, GenericParameterKind, MemberReference, MemberSignature,
            MethodHandle, MethodSignature, PrimitiveKind, TypeReference, TypeSpecKind,
        },
    },
    Result,
};

/// Type and method arguments to substitute for generic parameters
#[derive(Debug, Clone, Default)]
pub struct GenericSubstitution {
    type_arguments: Option<Vec<CilType>>,
    method_arguments: Option<Vec<CilType>>,
}

impl GenericSubstitution {
    /// A substitution from explicit argument lists
    ///
    /// ## Arguments
    /// * 'type_arguments' - Arguments for `!n`, `None` if no type is instantiated
    /// * 'method_arguments' - Arguments for `!!n`, `None` if no method is instantiated
    #[must_use]
    pub fn new(type_arguments: Option<Vec<CilType>>, method_arguments: Option<Vec<CilType>>) -> Self {
        GenericSubstitution {
            type_arguments,
            method_arguments,
        }
    }

    /// The type context of a member reached through `declaring_type`.
    ///
    /// Only a generic instance supplies arguments; any other type yields an empty context.
    #[must_use]
    pub fn from_declaring_type(declaring_type: &CilType) -> Self {
        let type_arguments = match declaring_type.as_specification().map(|spec| &spec.kind) {
            Some(TypeSpecKind::GenericInstance { arguments, .. }) => Some(arguments.clone()),
            _ => None,
        };

        GenericSubstitution {
            type_arguments,
            method_arguments: None,
        }
    }

    /// The context of `method`: its declaring instantiation and, for a generic method
    /// instance, its method arguments
    #[must_use]
    pub fn for_method(method: &MethodHandle) -> Self {
        let mut substitution = method
            .declaring_type()
            .map(|declaring_type| Self::from_declaring_type(&declaring_type))
            .unwrap_or_default();

        if let MethodHandle::Instance(instance) = method {
            substitution.method_arguments = Some(instance.arguments.clone());
        }
        substitution
    }

    /// True if neither a type nor a method context is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_arguments.is_none() && self.method_arguments.is_none()
    }

    /// Replace every generic parameter in `ty` by its argument.
    ///
    /// Parameters without a matching context are left in place. A type without generic
    /// parameters is returned as is.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a parameter position outside the argument
    /// list of its context.
    pub fn resolve(&self, ty: &CilType) -> Result<CilType> {
        if !ty.contains_generic_parameter() {
            return Ok(ty.clone());
        }

        match ty {
            CilType::GenericParameter(_) => match ty.as_generic_parameter() {
                Some(parameter) => self.substitute(&parameter, ty),
                None => Ok(ty.clone()),
            },
            CilType::Specification(specification) => {
                let kind = match &specification.kind {
                    TypeSpecKind::Array {
                        element,
                        dimensions,
                    } => TypeSpecKind::Array {
                        element: self.resolve(element)?,
                        dimensions: dimensions.clone(),
                    },
                    TypeSpecKind::SzArray(element) => TypeSpecKind::SzArray(self.resolve(element)?),
                    TypeSpecKind::Pointer(element) => TypeSpecKind::Pointer(self.resolve(element)?),
                    TypeSpecKind::ByReference(element) => {
                        TypeSpecKind::ByReference(self.resolve(element)?)
                    }
                    TypeSpecKind::Pinned(element) => TypeSpecKind::Pinned(self.resolve(element)?),
                    TypeSpecKind::Sentinel(element) => {
                        TypeSpecKind::Sentinel(self.resolve(element)?)
                    }
                    TypeSpecKind::RequiredModifier { modifier, element } => {
                        TypeSpecKind::RequiredModifier {
                            modifier: modifier.clone(),
                            element: self.resolve(element)?,
                        }
                    }
                    TypeSpecKind::OptionalModifier { modifier, element } => {
                        TypeSpecKind::OptionalModifier {
                            modifier: modifier.clone(),
                            element: self.resolve(element)?,
                        }
                    }
                    TypeSpecKind::GenericInstance {
                        element,
                        arguments,
                        value_type,
                    } => TypeSpecKind::GenericInstance {
                        element: element.clone(),
                        arguments: arguments
                            .iter()
                            .map(|argument| self.resolve(argument))
                            .collect::<Result<_>>()?,
                        value_type: *value_type,
                    },
                    TypeSpecKind::FunctionPointer(signature) => {
                        TypeSpecKind::FunctionPointer(Box::new(self.resolve_signature(signature)?))
                    }
                };
                Ok(CilType::specification(kind))
            }
            CilType::Definition(_) | CilType::Reference(_) => Ok(ty.clone()),
        }
    }

    /// `signature` with its return and parameter types resolved
    ///
    /// # Errors
    /// See [`GenericSubstitution::resolve`].
    pub fn resolve_signature(&self, signature: &MethodSignature) -> Result<MethodSignature> {
        let mut resolved = signature.clone();
        resolved.return_type = self.resolve(&signature.return_type)?;
        resolved.parameters = signature
            .parameters
            .iter()
            .map(|parameter| self.resolve(parameter))
            .collect::<Result<_>>()?;
        Ok(resolved)
    }

    fn substitute(&self, parameter: &GenericParamRc, original: &CilType) -> Result<CilType> {
        if parameter.owner.is_none() {
            log::warn!(
                "Generic parameter {} has no owner, substituting as a type parameter",
                parameter.name
            );
            return match &self.type_arguments {
                Some(arguments) => Self::argument(arguments, parameter),
                None => Ok(object_type(parameter)),
            };
        }

        let arguments = match parameter.kind {
            GenericParameterKind::Type => &self.type_arguments,
            GenericParameterKind::Method => &self.method_arguments,
        };
        match arguments {
            Some(arguments) => Self::argument(arguments, parameter),
            None => Ok(original.clone()),
        }
    }

    fn argument(arguments: &[CilType], parameter: &GenericParamRc) -> Result<CilType> {
        arguments
            .get(parameter.position as usize)
            .cloned()
            .ok_or_else(|| {
                malformed_error!(
                    "Generic parameter {} outside of {} arguments",
                    parameter.name,
                    arguments.len()
                )
            })
    }

    /// Declared type of a field reference, substituted through its declaring type.
    ///
    /// Returns `None` if `field` references a method.
    ///
    /// # Errors
    /// Fails if the signature was not decoded or a parameter is out of range.
    pub fn resolve_field_type(field: &MemberReference) -> Result<Option<CilType>> {
        let MemberSignature::Field(field_type) = field.signature()? else {
            return Ok(None);
        };
        let substitution = field
            .declaring_type()
            .map(|declaring_type| Self::from_declaring_type(&declaring_type))
            .unwrap_or_default();
        substitution.resolve(field_type).map(Some)
    }

    /// Return type of `method` in the context of its instantiation
    ///
    /// # Errors
    /// Fails if the signature was not decoded or a parameter is out of range.
    pub fn resolve_return_type(method: &MethodHandle) -> Result<CilType> {
        let signature = method.signature()?;
        Self::for_method(method).resolve(&signature.return_type)
    }

    /// Type of the parameter at `index` of `method`, `None` past the last parameter
    ///
    /// # Errors
    /// Fails if the signature was not decoded or a parameter is out of range.
    pub fn resolve_parameter_type(method: &MethodHandle, index: usize) -> Result<Option<CilType>> {
        let signature = method.signature()?;
        match signature.parameters.get(index) {
            Some(parameter) => Self::for_method(method).resolve(parameter).map(Some),
            None => Ok(None),
        }
    }
}

/// `System.Object` of the parameter's module, or a synthesized reference without one
fn object_type(parameter: &GenericParamRc) -> CilType {
    parameter
        .module()
        .and_then(|module| module.primitive_type(PrimitiveKind::Object).ok())
        .unwrap_or_else(|| {
            CilType::Reference(Arc::new(TypeReference::synthesized(
                "System", "Object", None, false,
            )))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use super::*;
    use crate::metadata::typesystem::{GenericParameter, GenericParameterOwner, TypeSpecKind};

    fn named(namespace: &str, name: &str) -> CilType {
        CilType::Reference(Arc::new(TypeReference::synthesized(namespace, name, None, false)))
    }

    fn owned(kind: GenericParameterKind, position: u32, owner: &Arc<TypeReference>) -> GenericParamRc {
        Arc::new(GenericParameter::placeholder(
            position,
            kind,
            Some(GenericParameterOwner::TypeReference(Arc::downgrade(owner))),
            Weak::new(),
        ))
    }

    fn instance(element: CilType, arguments: Vec<CilType>) -> CilType {
        CilType::specification(TypeSpecKind::GenericInstance {
            element,
            arguments,
            value_type: false,
        })
    }

    #[test]
    fn nested_instance_uses_method_context() {
        let owner = Arc::new(TypeReference::synthesized("", "Holder`1", None, false));
        let u = owned(GenericParameterKind::Method, 0, &owner);

        let list_of_u = instance(
            named("System.Collections.Generic", "List`1"),
            vec![CilType::generic_parameter(&u)],
        );
        let dictionary = instance(
            named("System.Collections.Generic", "Dictionary`2"),
            vec![named("System", "String"), list_of_u],
        );

        let substitution = GenericSubstitution::new(None, Some(vec![named("System", "Boolean")]));
        let resolved = substitution.resolve(&dictionary).unwrap();
        let arguments = resolved.as_specification().unwrap();
        match &arguments.kind {
            TypeSpecKind::GenericInstance { arguments, .. } => {
                assert_eq!(arguments[0].full_name(), "System.String");
                assert_eq!(
                    arguments[1].full_name(),
                    "System.Collections.Generic.List`1<System.Boolean>"
                );
            }
            _ => panic!("expected a generic instance"),
        }
    }

    #[test]
    fn missing_context_leaves_parameter() {
        let owner = Arc::new(TypeReference::synthesized("", "Holder`1", None, false));
        let m = owned(GenericParameterKind::Method, 0, &owner);
        let ty = CilType::generic_parameter(&m);

        let substitution = GenericSubstitution::new(Some(vec![named("System", "Int32")]), None);
        let resolved = substitution.resolve(&ty).unwrap();
        assert!(resolved.as_generic_parameter().is_some());
    }

    #[test]
    fn ownerless_parameter_falls_back() {
        let orphan = Arc::new(GenericParameter::placeholder(
            0,
            GenericParameterKind::Method,
            None,
            Weak::new(),
        ));
        let ty = CilType::generic_parameter(&orphan);

        let with_type = GenericSubstitution::new(Some(vec![named("System", "Int64")]), None);
        assert_eq!(with_type.resolve(&ty).unwrap().full_name(), "System.Int64");

        let without = GenericSubstitution::default();
        assert_eq!(without.resolve(&ty).unwrap().full_name(), "System.Object");
    }

    #[test]
    fn out_of_range_parameter_is_malformed() {
        let owner = Arc::new(TypeReference::synthesized("", "Pair`2", None, false));
        let second = owned(GenericParameterKind::Type, 1, &owner);
        let substitution = GenericSubstitution::new(Some(vec![named("System", "Int32")]), None);
        assert!(substitution
            .resolve(&CilType::generic_parameter(&second))
            .is_err());
    }

    #[test]
    fn concrete_types_keep_identity() {
        let string = named("System", "String");
        let resolved = GenericSubstitution::default().resolve(&string).unwrap();
        assert_eq!(resolved, string);
    }
}
