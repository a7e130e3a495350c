//! Cross-module and cross-assembly resolution.
//!
//! A [`MetadataResolver`] turns references into the definitions they name. Type references
//! are resolved through their scope: the reading module itself, another module of the
//! same assembly, or another assembly found by an [`AssemblyResolver`]. Type forwarders
//! (`ExportedType` rows pointing at another assembly) are followed. Field and method
//! references are matched by name and structural signature equality against the members
//! of the resolved type and its base types.
//!
//! A reference that cannot be found is not an error: every `resolve_*` method returns
//! `Ok(None)` for it and reserves `Err` for malformed metadata.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotmeta::metadata::{
//!     image::ImageBuilder,
//!     reader::{MetadataReader, ReaderOptions},
//!     resolver::{AssemblySet, MetadataResolver},
//!     tables::TableId,
//! };
//!
//! let mut builder = ImageBuilder::new();
//! let name = builder.string("Lib");
//! builder.row(TableId::Assembly, &[0x8004, 1, 0, 0, 0, 0, 0, name, 0])?;
//! let library = MetadataReader::new("Lib.dll", Arc::new(builder.build()?), ReaderOptions::default());
//!
//! let assemblies = Arc::new(AssemblySet::new());
//! assemblies.add(library)?;
//! assert_eq!(assemblies.len(), 1);
//!
//! let resolver = MetadataResolver::new(assemblies);
//! # let _ = resolver;
//! # Ok::<(), dotmeta::Error>(())
//! ```

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    metadata::{
        reader::ModuleRc,
        typesystem::{
            AssemblyNameReference, CilType, ExportedTypeImplementation, FieldRc, MemberRefParent,
            MemberReference, MemberSignature, MetadataScope, MethodDefRc, MethodSignature,
            ModuleReference, TypeDefRc, TypeRefRc, TypeSpecKind,
        },
    },
    Result,
};

/// How many forwarders or base types are followed before giving up on a cycle
const MAX_CHAIN: usize = 64;

/// Finds the module defining an assembly or a module reference.
///
/// This is the seam to whatever assembly search policy the caller uses. Returning `None`
/// means the assembly is unavailable.
pub trait AssemblyResolver: Send + Sync {
    /// The manifest module of the assembly `name` refers to
    fn resolve(&self, name: &AssemblyNameReference) -> Option<ModuleRc>;

    /// Another module of the same assembly
    fn resolve_module(&self, _module: &ModuleReference) -> Option<ModuleRc> {
        None
    }
}

/// An [`AssemblyResolver`] over a set of already opened modules.
///
/// Assemblies are matched by simple name, modules by file name. Modules can be added
/// while other threads resolve.
#[derive(Default)]
pub struct AssemblySet {
    modules: boxcar::Vec<ModuleRc>,
    assemblies: DashMap<String, usize>,
    files: DashMap<String, usize>,
}

impl AssemblySet {
    /// An empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, indexed by its assembly name (if it has an `Assembly` row) and by
    /// its module name. The first module added under a name wins.
    ///
    /// ## Arguments
    /// * 'module' - The module to add
    ///
    /// # Errors
    /// Fails if the `Assembly` or `Module` row of `module` is malformed.
    pub fn add(&self, module: ModuleRc) -> Result<()> {
        let assembly = module.assembly()?.map(|assembly| assembly.name.name.clone());
        let mut file = module.module_name()?;
        if file.is_empty() {
            file = module.name().to_string();
        }

        let index = self.modules.push(module);
        if let Some(assembly) = assembly {
            self.assemblies.entry(assembly.to_lowercase()).or_insert(index);
        }
        self.files.entry(file.to_lowercase()).or_insert(index);
        Ok(())
    }

    /// Number of modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.count()
    }

    /// True if no module was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssemblyResolver for AssemblySet {
    fn resolve(&self, name: &AssemblyNameReference) -> Option<ModuleRc> {
        let index = *self.assemblies.get(&name.name.to_lowercase())?;
        self.modules.get(index).cloned()
    }

    fn resolve_module(&self, module: &ModuleReference) -> Option<ModuleRc> {
        let index = *self.files.get(&module.name.to_lowercase())?;
        self.modules.get(index).cloned()
    }
}

/// Resolves references to definitions, across modules and assemblies
#[derive(Clone, Default)]
pub struct MetadataResolver {
    assemblies: Option<Arc<dyn AssemblyResolver>>,
}

impl MetadataResolver {
    /// A resolver that finds other assemblies through `assemblies`
    #[must_use]
    pub fn new(assemblies: Arc<dyn AssemblyResolver>) -> Self {
        MetadataResolver {
            assemblies: Some(assemblies),
        }
    }

    /// A resolver that only sees the module a reference was read from
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    /// The module of the assembly `name` refers to
    #[must_use]
    pub fn resolve_assembly(&self, name: &AssemblyNameReference) -> Option<ModuleRc> {
        let module = self.assemblies.as_ref()?.resolve(name);
        if module.is_none() {
            log::debug!("Assembly {} not found", name.name);
        }
        module
    }

    /// The definition of the element type of `ty`.
    ///
    /// Specifications are stripped to their innermost named type, so `List<int>[]`
    /// resolves to the definition of ``List`1``. Generic parameters and function pointers
    /// resolve to nothing.
    ///
    /// # Errors
    /// Fails on malformed metadata in any module visited.
    pub fn resolve_type(&self, ty: &CilType) -> Result<Option<TypeDefRc>> {
        match ty.element_type() {
            CilType::Definition(definition) => Ok(definition.upgrade()),
            CilType::Reference(reference) => self.resolve_reference(&reference),
            CilType::Specification(_) | CilType::GenericParameter(_) => Ok(None),
        }
    }

    /// The definition a type reference names
    ///
    /// # Errors
    /// Fails on malformed metadata in any module visited.
    pub fn resolve_reference(&self, reference: &TypeRefRc) -> Result<Option<TypeDefRc>> {
        if let Some(declaring_type) = reference.declaring_type() {
            let Some(outer) = self.resolve_reference(&declaring_type)? else {
                return Ok(None);
            };
            return Ok(outer
                .nested_types()?
                .iter()
                .find(|nested| nested.name == reference.name)
                .cloned());
        }

        let module = match &reference.scope {
            Some(MetadataScope::Module(module)) => module.upgrade(),
            Some(MetadataScope::ModuleReference(module_ref)) => self
                .assemblies
                .as_ref()
                .and_then(|assemblies| assemblies.resolve_module(module_ref)),
            Some(MetadataScope::AssemblyReference(assembly_ref)) => {
                self.resolve_assembly(assembly_ref)
            }
            None => None,
        };

        match module {
            Some(module) => self.find_type(&module, &reference.namespace, &reference.name),
            None => Ok(None),
        }
    }

    /// A top-level type of `module`, following type forwarders
    fn find_type(&self, module: &ModuleRc, namespace: &str, name: &str) -> Result<Option<TypeDefRc>> {
        let mut module = module.clone();
        for _ in 0..MAX_CHAIN {
            if let Some(definition) = module.get_type(namespace, name)? {
                return Ok(Some(definition));
            }

            let exported = module.exported_types()?;
            let forwarded = exported.iter().find_map(|exported| {
                match &exported.implementation {
                    ExportedTypeImplementation::AssemblyReference(target)
                        if exported.namespace == namespace && exported.name == name =>
                    {
                        Some(target.clone())
                    }
                    _ => None,
                }
            });

            let Some(target) = forwarded else {
                return Ok(None);
            };
            match self.resolve_assembly(&target) {
                Some(next) => module = next,
                None => return Ok(None),
            }
        }

        log::warn!("Forwarding chain of {}.{} does not end", namespace, name);
        Ok(None)
    }

    /// The field definition a member reference names
    ///
    /// # Errors
    /// Fails on malformed metadata in any module visited.
    pub fn resolve_field(&self, reference: &MemberReference) -> Result<Option<FieldRc>> {
        let MemberSignature::Field(field_type) = reference.signature()? else {
            return Ok(None);
        };
        let Some(declaring_type) = reference.declaring_type() else {
            return Ok(None);
        };

        self.walk_hierarchy(&declaring_type, |definition| {
            Ok(definition
                .fields()?
                .iter()
                .find(|field| {
                    field.name == reference.name && are_same_type(&field.field_type, field_type)
                })
                .cloned())
        })
    }

    /// The method definition a member reference names.
    ///
    /// A reference whose parent is a method definition (a vararg call site) resolves to
    /// that method.
    ///
    /// # Errors
    /// Fails on malformed metadata in any module visited.
    pub fn resolve_method(&self, reference: &MemberReference) -> Result<Option<MethodDefRc>> {
        if let MemberRefParent::Method(method) = &reference.parent {
            return Ok(method.upgrade());
        }

        let MemberSignature::Method(signature) = reference.signature()? else {
            return Ok(None);
        };
        let Some(declaring_type) = reference.declaring_type() else {
            return Ok(None);
        };

        self.walk_hierarchy(&declaring_type, |definition| {
            for method in definition.methods()?.iter() {
                if method.name == reference.name && same_signature(method.signature()?, signature)
                {
                    return Ok(Some(method.clone()));
                }
            }
            Ok(None)
        })
    }

    /// Apply `find` to the definition of `ty` and then to each base type until it finds
    /// something
    fn walk_hierarchy<T, F>(&self, ty: &CilType, mut find: F) -> Result<Option<T>>
    where
        F: FnMut(&TypeDefRc) -> Result<Option<T>>,
    {
        let mut current = self.resolve_type(ty)?;
        for _ in 0..MAX_CHAIN {
            let Some(definition) = current else {
                return Ok(None);
            };
            if let Some(found) = find(&definition)? {
                return Ok(Some(found));
            }

            current = match definition.base_type()? {
                Some(base) => self.resolve_type(&base)?,
                None => None,
            };
        }

        log::warn!("Base type chain of {} does not end", ty.full_name());
        Ok(None)
    }
}

/// Method signatures match when arity, return type and the fixed parameters agree.
///
/// Only the parameters before a reference's vararg sentinel are compared; the definition
/// declares exactly those. The `HasThis` flag is not compared.
fn same_signature(definition: &MethodSignature, reference: &MethodSignature) -> bool {
    let fixed = reference
        .sentinel_position()
        .unwrap_or(reference.parameters.len());

    definition.generic_arity == reference.generic_arity
        && definition.parameters.len() == fixed
        && are_same_type(&definition.return_type, &reference.return_type)
        && definition
            .parameters
            .iter()
            .zip(&reference.parameters[..fixed])
            .all(|(a, b)| are_same_type(a, b))
}

/// Structural type equality across modules.
///
/// Named types are equal when their full names are; definitions and references are
/// distinct nodes, so identity cannot be used. Generic parameters are equal when kind and
/// position are. Constructed types are compared shape by shape.
#[must_use]
pub fn are_same_type(a: &CilType, b: &CilType) -> bool {
    match (a, b) {
        (CilType::Specification(a), CilType::Specification(b)) => same_kind(&a.kind, &b.kind),
        (CilType::GenericParameter(a), CilType::GenericParameter(b)) => {
            match (a.upgrade(), b.upgrade()) {
                (Some(a), Some(b)) => a.kind == b.kind && a.position == b.position,
                _ => false,
            }
        }
        (
            CilType::Definition(_) | CilType::Reference(_),
            CilType::Definition(_) | CilType::Reference(_),
        ) => a.full_name() == b.full_name(),
        _ => false,
    }
}

fn same_kind(a: &TypeSpecKind, b: &TypeSpecKind) -> bool {
    match (a, b) {
        (
            TypeSpecKind::Array {
                element: a,
                dimensions: a_dimensions,
            },
            TypeSpecKind::Array {
                element: b,
                dimensions: b_dimensions,
            },
        ) => a_dimensions.len() == b_dimensions.len() && are_same_type(a, b),
        (TypeSpecKind::SzArray(a), TypeSpecKind::SzArray(b))
        | (TypeSpecKind::Pointer(a), TypeSpecKind::Pointer(b))
        | (TypeSpecKind::ByReference(a), TypeSpecKind::ByReference(b))
        | (TypeSpecKind::Pinned(a), TypeSpecKind::Pinned(b))
        | (TypeSpecKind::Sentinel(a), TypeSpecKind::Sentinel(b)) => are_same_type(a, b),
        (
            TypeSpecKind::RequiredModifier {
                modifier: a_modifier,
                element: a,
            },
            TypeSpecKind::RequiredModifier {
                modifier: b_modifier,
                element: b,
            },
        )
        | (
            TypeSpecKind::OptionalModifier {
                modifier: a_modifier,
                element: a,
            },
            TypeSpecKind::OptionalModifier {
                modifier: b_modifier,
                element: b,
            },
        ) => are_same_type(a_modifier, b_modifier) && are_same_type(a, b),
        (
            TypeSpecKind::GenericInstance {
                element: a,
                arguments: a_arguments,
                ..
            },
            TypeSpecKind::GenericInstance {
                element: b,
                arguments: b_arguments,
                ..
            },
        ) => {
            are_same_type(a, b)
                && a_arguments.len() == b_arguments.len()
                && a_arguments
                    .iter()
                    .zip(b_arguments)
                    .all(|(a, b)| are_same_type(a, b))
        }
        (TypeSpecKind::FunctionPointer(a), TypeSpecKind::FunctionPointer(b)) => {
            a.parameters.len() == b.parameters.len() && same_signature(a, b)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use super::*;
    use crate::metadata::typesystem::{
        GenericParameter, GenericParameterKind, TypeReference,
    };

    fn named(namespace: &str, name: &str) -> CilType {
        CilType::Reference(Arc::new(TypeReference::synthesized(namespace, name, None, false)))
    }

    #[test]
    fn named_types_compare_by_name() {
        assert!(are_same_type(&named("System", "String"), &named("System", "String")));
        assert!(!are_same_type(&named("System", "String"), &named("System", "Object")));
    }

    #[test]
    fn constructed_types_compare_by_shape() {
        let string = named("System", "String");
        let vector = CilType::specification(TypeSpecKind::SzArray(string.clone()));
        let other = CilType::specification(TypeSpecKind::SzArray(named("System", "String")));
        let pointer = CilType::specification(TypeSpecKind::Pointer(string.clone()));

        assert!(are_same_type(&vector, &other));
        assert!(!are_same_type(&vector, &pointer));
        assert!(!are_same_type(&vector, &string));

        let list = |argument: CilType| {
            CilType::specification(TypeSpecKind::GenericInstance {
                element: named("System.Collections.Generic", "List`1"),
                arguments: vec![argument],
                value_type: false,
            })
        };
        assert!(are_same_type(&list(string.clone()), &list(named("System", "String"))));
        assert!(!are_same_type(&list(string), &list(named("System", "Int32"))));
    }

    #[test]
    fn generic_parameters_compare_by_kind_and_position() {
        let make = |kind, position| {
            Arc::new(GenericParameter::placeholder(position, kind, None, Weak::new()))
        };
        let t0 = make(GenericParameterKind::Type, 0);
        let t0_again = make(GenericParameterKind::Type, 0);
        let m0 = make(GenericParameterKind::Method, 0);

        assert!(are_same_type(
            &CilType::generic_parameter(&t0),
            &CilType::generic_parameter(&t0_again)
        ));
        assert!(!are_same_type(
            &CilType::generic_parameter(&t0),
            &CilType::generic_parameter(&m0)
        ));
    }

    #[test]
    fn unresolvable_scope_is_not_an_error() {
        let reference = Arc::new(TypeReference::synthesized(
            "Missing",
            "Type",
            Some(MetadataScope::AssemblyReference(Arc::new(
                AssemblyNameReference::parse("Missing, Version=1.0.0.0").unwrap(),
            ))),
            false,
        ));

        let resolver = MetadataResolver::new(Arc::new(AssemblySet::new()));
        assert!(resolver.resolve_reference(&reference).unwrap().is_none());
        assert!(MetadataResolver::local()
            .resolve_type(&CilType::Reference(reference))
            .unwrap()
            .is_none());
    }
}
