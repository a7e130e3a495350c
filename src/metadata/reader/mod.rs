//! The metadata reader: lazy, token-addressed materialization of one module.
//!
//! A [`MetadataReader`] owns the identity caches of one module and turns rows of its
//! [`MetadataImage`] into graph nodes on demand. Nothing is read up front: the first
//! dereference of a token seeks to its row, decodes the fixed columns and any attached
//! signature, caches the node and returns it. Every later dereference is a cache hit.
//!
//! Decoding a signature routinely needs further tokens of the same module. All reads of
//! one module therefore run under a re-entrant guard, and nested lookups snapshot and
//! restore the decode context (see [`ReadContext::scoped`]).
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotmeta::metadata::{
//!     image::ImageBuilder,
//!     reader::{MetadataReader, ReaderOptions},
//!     tables::TableId,
//! };
//!
//! let mut builder = ImageBuilder::new();
//! let name = builder.string("Foo");
//! let field_name = builder.string("value");
//! let int32 = builder.blob(&[0x06, 0x08]);
//! builder.row(TableId::TypeDef, &[0, name, 0, 0, 1, 1])?;
//! builder.row(TableId::Field, &[0, field_name, int32])?;
//!
//! let reader = MetadataReader::new("Foo.dll", Arc::new(builder.build()?), ReaderOptions::default());
//! let foo = reader.read_type(1)?;
//! assert_eq!(foo.name, "Foo");
//! assert_eq!(foo.fields()?.get(0).map(|f| f.field_type.full_name()), Some("System.Int32".into()));
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod attributes;
mod context;
mod members;
mod options;
mod scans;
mod signatures;
mod store;
mod types;

pub(crate) use context::{GenericContext, ReadContext};
pub use options::ReaderOptions;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeRc, CustomAttributeValue},
        image::MetadataImage,
        marshalling::MarshalInfo,
        security::{SecurityAttribute, SecurityDeclRc, SecurityDeclaration},
        tables::{MethodSemanticsAttributes, TableId},
        token::Token,
        typesystem::{
            AssemblyDefinition, AssemblyRefRc, CilType, ClassLayout, EventAccessors,
            EventDefinition, EventRc, ExportedTypeRc, FieldDefinition, FieldRc,
            GenericInstanceMethodRc, GenericParamRc, GenericParameterOwner, MemberCollection,
            MemberRefRc, MethodDefRc, MethodDefinition, MethodHandle, MethodParameters,
            ModuleRefRc, PInvokeInfo, ParamRc, PrimitiveKind, PrimitiveValue, PropertyAccessors,
            PropertyDefinition, PropertyRc, StandAloneSignature, TypeDefRc, TypeDefinition,
            TypeRefRc,
        },
    },
    utils::ReentrantLock,
    Result,
};

use store::MetadataCache;

/// Shared handle of a module
pub type ModuleRc = Arc<MetadataReader>;

/// Whatever a token dereferences to
#[derive(Debug, Clone)]
pub enum MetadataItem {
    /// The module itself (`Module` row 1)
    Module(ModuleRc),
    /// The assembly definition
    Assembly(Arc<AssemblyDefinition>),
    /// A type definition
    TypeDefinition(TypeDefRc),
    /// A type reference
    TypeReference(TypeRefRc),
    /// A type specification, or whatever type its blob names
    TypeSpecification(CilType),
    /// A field
    Field(FieldRc),
    /// A method
    Method(MethodDefRc),
    /// A parameter
    Parameter(ParamRc),
    /// A property
    Property(PropertyRc),
    /// An event
    Event(EventRc),
    /// A member reference
    MemberReference(MemberRefRc),
    /// A generic method instantiation
    MethodSpecification(GenericInstanceMethodRc),
    /// A generic parameter
    GenericParameter(GenericParamRc),
    /// An assembly reference
    AssemblyReference(AssemblyRefRc),
    /// A module reference
    ModuleReference(ModuleRefRc),
    /// A stand-alone signature
    StandAloneSignature(Arc<StandAloneSignature>),
    /// A custom attribute
    CustomAttribute(CustomAttributeRc),
    /// A security declaration
    SecurityDeclaration(SecurityDeclRc),
    /// An exported type
    ExportedType(ExportedTypeRc),
    /// A `#US` string literal
    UserString(String),
}

impl MetadataItem {
    /// The item as a type handle, if it names a type
    #[must_use]
    pub fn as_type(&self) -> Option<CilType> {
        match self {
            MetadataItem::TypeDefinition(definition) => Some(CilType::definition(definition)),
            MetadataItem::TypeReference(reference) => Some(CilType::Reference(reference.clone())),
            MetadataItem::TypeSpecification(ty) => Some(ty.clone()),
            MetadataItem::GenericParameter(parameter) => {
                Some(CilType::generic_parameter(parameter))
            }
            _ => None,
        }
    }

    /// The item as a method handle, if it names a method
    #[must_use]
    pub fn as_method(&self) -> Option<MethodHandle> {
        match self {
            MetadataItem::Method(method) => Some(MethodHandle::definition(method)),
            MetadataItem::MemberReference(reference) if !reference.is_field() => {
                Some(MethodHandle::Reference(reference.clone()))
            }
            MetadataItem::MethodSpecification(instance) => {
                Some(MethodHandle::Instance(instance.clone()))
            }
            _ => None,
        }
    }
}

/// Lazy reader of one module's metadata.
///
/// Created through [`MetadataReader::new`] as a shared handle; every node it creates keeps
/// a weak back-reference to it.
pub struct MetadataReader {
    name: String,
    image: Option<Arc<dyn MetadataImage>>,
    options: ReaderOptions,
    guard: ReentrantLock,
    cache: MetadataCache,
    this: Weak<MetadataReader>,
}

impl MetadataReader {
    /// A reader over `image`
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        image: Arc<dyn MetadataImage>,
        options: ReaderOptions,
    ) -> ModuleRc {
        let cache = MetadataCache::new(Some(image.table_info()));
        Arc::new_cyclic(|this| MetadataReader {
            name: name.into(),
            image: Some(image),
            options,
            guard: ReentrantLock::new(),
            cache,
            this: this.clone(),
        })
    }

    /// A reader without a backing image; every collection it hands out is empty
    #[must_use]
    pub fn empty(name: impl Into<String>) -> ModuleRc {
        Arc::new_cyclic(|this| MetadataReader {
            name: name.into(),
            image: None,
            options: ReaderOptions::default(),
            guard: ReentrantLock::new(),
            cache: MetadataCache::new(None),
            this: this.clone(),
        })
    }

    /// Name the reader was created with, usually the file name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings
    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// True if the reader has a backing image
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Run `f` under the module guard; without an image the result is `T::default()`
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Default,
        F: FnOnce(&mut ReadContext<'_>) -> Result<T>,
    {
        match self.image.as_deref() {
            Some(image) => {
                let _guard = self.guard.lock()?;
                f(&mut ReadContext::new(self, image))
            }
            None => Ok(T::default()),
        }
    }

    /// Run `f` under the module guard; fails without an image
    fn read_required<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ReadContext<'_>) -> Result<T>,
    {
        match self.image.as_deref() {
            Some(image) => {
                let _guard = self.guard.lock()?;
                f(&mut ReadContext::new(self, image))
            }
            None => Err(malformed_error!("Module {} has no metadata image", self.name)),
        }
    }

    /// Name from the `Module` table, empty without one
    ///
    /// # Errors
    /// Fails on a malformed `Module` row.
    pub fn module_name(&self) -> Result<String> {
        self.read(|ctx| Ok(ctx.module_identity()?.map(|m| m.name.clone()).unwrap_or_default()))
    }

    /// The module version id
    ///
    /// # Errors
    /// Fails on a malformed `Module` row.
    pub fn mvid(&self) -> Result<Option<uguid::Guid>> {
        self.read(|ctx| Ok(ctx.module_identity()?.and_then(|m| m.mvid)))
    }

    /// The assembly definition, if this module is an assembly manifest
    ///
    /// # Errors
    /// Fails on a malformed `Assembly` row.
    pub fn assembly(&self) -> Result<Option<Arc<AssemblyDefinition>>> {
        self.read(|ctx| ctx.assembly())
    }

    /// The type definition at `rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a row outside the `TypeDef` table.
    pub fn read_type(&self, rid: u32) -> Result<TypeDefRc> {
        if let Some(definition) = self.cache.types.get(rid) {
            return Ok(definition);
        }
        self.read_required(|ctx| ctx.type_definition(rid))
    }

    /// The type reference at `rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a row outside the `TypeRef` table or an
    /// invalid resolution scope.
    pub fn read_type_reference(&self, rid: u32) -> Result<TypeRefRc> {
        if let Some(reference) = self.cache.type_refs.get(rid) {
            return Ok(reference);
        }
        self.read_required(|ctx| ctx.type_reference(rid))
    }

    /// Top-level type definition by namespace and name
    ///
    /// # Errors
    /// Fails on a malformed `TypeDef` table.
    pub fn get_type(&self, namespace: &str, name: &str) -> Result<Option<TypeDefRc>> {
        self.read(|ctx| {
            let rid = ctx
                .type_names()?
                .get(&(namespace.to_string(), name.to_string()))
                .copied();
            rid.map(|rid| ctx.type_definition(rid)).transpose()
        })
    }

    /// Every type definition in table order
    ///
    /// # Errors
    /// Fails on a malformed `TypeDef` row.
    pub fn types(&self) -> Result<Vec<TypeDefRc>> {
        self.read(|ctx| {
            (1..=ctx.rows(TableId::TypeDef))
                .map(|rid| ctx.type_definition(rid))
                .collect()
        })
    }

    /// Every exported type in table order
    ///
    /// # Errors
    /// Fails on a malformed `ExportedType` row.
    pub fn exported_types(&self) -> Result<Vec<ExportedTypeRc>> {
        self.read(|ctx| {
            (1..=ctx.rows(TableId::ExportedType))
                .map(|rid| ctx.exported_type(rid))
                .collect()
        })
    }

    /// Every assembly reference in table order
    ///
    /// # Errors
    /// Fails on a malformed `AssemblyRef` row.
    pub fn assembly_references(&self) -> Result<Vec<AssemblyRefRc>> {
        self.read(|ctx| {
            (1..=ctx.rows(TableId::AssemblyRef))
                .map(|rid| ctx.assembly_reference(rid))
                .collect()
        })
    }

    /// Dereference `token`.
    ///
    /// A null token, or a table without graph nodes, yields `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a row outside its table, or whatever
    /// materializing the row fails with.
    pub fn lookup_token(&self, token: Token) -> Result<Option<MetadataItem>> {
        self.read(|ctx| ctx.lookup(token))
    }

    /// The `#US` literal a `0x70` token names
    ///
    /// # Errors
    /// Fails if the offset lies outside the heap.
    pub fn user_string(&self, token: Token) -> Result<Option<String>> {
        match self.lookup_token(token)? {
            Some(MetadataItem::UserString(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// The node signatures of this module use for a built-in type
    ///
    /// # Errors
    /// Fails on a malformed `AssemblyRef` or `TypeDef` table.
    pub fn primitive_type(&self, kind: PrimitiveKind) -> Result<CilType> {
        if let Some(ty) = self.cache.primitives[kind as usize].get() {
            return Ok(ty.clone());
        }
        self.read_required(|ctx| ctx.primitive(kind))
    }

    /// Base type of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `Extends` column.
    pub fn read_base_type(&self, owner: &TypeDefRc) -> Result<Option<CilType>> {
        if let Some(base) = owner.base_type.get() {
            return Ok((*base).clone());
        }
        self.read(|ctx| Ok((*ctx.base_type(owner)?).clone()))
    }

    /// Enclosing type of a nested type
    ///
    /// # Errors
    /// Fails on a malformed `NestedClass` table.
    pub fn read_declaring_type(&self, owner: &TypeDefinition) -> Result<Option<TypeDefRc>> {
        self.read(|ctx| ctx.declaring_type(owner))
    }

    /// Fields of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `Field` row or signature.
    pub fn read_fields(&self, owner: &TypeDefRc) -> Result<Arc<MemberCollection<FieldDefinition>>> {
        if let Some(fields) = owner.fields.get() {
            return Ok(fields);
        }
        self.read(|ctx| ctx.fields(owner))
    }

    /// Methods of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `MethodDef` row or signature.
    pub fn read_methods(
        &self,
        owner: &TypeDefRc,
    ) -> Result<Arc<MemberCollection<MethodDefinition>>> {
        if let Some(methods) = owner.methods.get() {
            return Ok(methods);
        }
        self.read(|ctx| ctx.methods(owner))
    }

    /// Properties of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `Property` row or signature.
    pub fn read_properties(
        &self,
        owner: &TypeDefRc,
    ) -> Result<Arc<MemberCollection<PropertyDefinition>>> {
        if let Some(properties) = owner.properties.get() {
            return Ok(properties);
        }
        self.read(|ctx| ctx.properties(owner))
    }

    /// Events of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `Event` row.
    pub fn read_events(&self, owner: &TypeDefRc) -> Result<Arc<MemberCollection<EventDefinition>>> {
        if let Some(events) = owner.events.get() {
            return Ok(events);
        }
        self.read(|ctx| ctx.events(owner))
    }

    /// Interfaces `owner` implements
    ///
    /// # Errors
    /// Fails on a malformed `InterfaceImpl` row.
    pub fn read_interfaces(
        &self,
        owner: &TypeDefRc,
    ) -> Result<Arc<Vec<crate::metadata::typesystem::InterfaceImplementation>>> {
        if let Some(interfaces) = owner.interfaces.get() {
            return Ok(interfaces);
        }
        self.read(|ctx| ctx.interfaces(owner))
    }

    /// Types nested in `owner`
    ///
    /// # Errors
    /// Fails on a malformed `NestedClass` table.
    pub fn read_nested_types(&self, owner: &TypeDefRc) -> Result<Arc<Vec<TypeDefRc>>> {
        if let Some(nested) = owner.nested_types.get() {
            return Ok(nested);
        }
        self.read(|ctx| ctx.nested_types(owner))
    }

    /// Generic parameters declared by `owner`, ordered by position
    ///
    /// # Errors
    /// Fails on a malformed `GenericParam` row.
    pub fn read_generic_parameters(
        &self,
        owner: &GenericParameterOwner,
    ) -> Result<Arc<Vec<GenericParamRc>>> {
        self.read(|ctx| ctx.generic_parameters(owner))
    }

    /// Constraints of `parameter`
    ///
    /// # Errors
    /// Fails on a malformed `GenericParamConstraint` row.
    pub fn read_generic_constraints(&self, parameter: &GenericParamRc) -> Result<Arc<Vec<CilType>>> {
        self.read(|ctx| ctx.generic_constraints(parameter))
    }

    /// Custom attributes applied to `owner`
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` row.
    pub fn read_custom_attributes(&self, owner: Token) -> Result<Arc<Vec<CustomAttributeRc>>> {
        if let Some(list) = self.cache.attribute_lists.get(&owner) {
            return Ok(list.value().clone());
        }
        self.read(|ctx| ctx.custom_attributes(owner))
    }

    /// Decoded value of `attribute`
    ///
    /// Enum arguments may name types of other modules. The blob is decoded without holding
    /// this module's guard, so those modules take their own guards one at a time; only
    /// publishing the result into the attribute is serialized here.
    ///
    /// # Errors
    /// Fails on a malformed blob or constructor signature.
    pub fn read_custom_attribute_value(
        &self,
        attribute: &CustomAttribute,
    ) -> Result<Arc<CustomAttributeValue>> {
        if let Some(value) = attribute.value.get() {
            return Ok(value);
        }

        let decoded = attributes::attribute_value(self, attribute)?;
        let _guard = self.guard.lock()?;
        attribute
            .value
            .get_or_materialize(attribute.token, || Ok(decoded))
    }

    /// Security declarations attached to `owner`
    ///
    /// # Errors
    /// Fails on a malformed `DeclSecurity` row.
    pub fn read_security_declarations(&self, owner: Token) -> Result<Arc<Vec<SecurityDeclRc>>> {
        if let Some(list) = self.cache.security_lists.get(&owner) {
            return Ok(list.value().clone());
        }
        self.read(|ctx| ctx.security_declarations(owner))
    }

    /// Decoded permission set of `declaration`
    ///
    /// Decoded outside this module's guard, like [`Self::read_custom_attribute_value`].
    ///
    /// # Errors
    /// Fails on a malformed permission set blob.
    pub fn read_security_attributes(
        &self,
        declaration: &SecurityDeclaration,
    ) -> Result<Arc<Vec<SecurityAttribute>>> {
        if let Some(attributes) = declaration.attributes.get() {
            return Ok(attributes);
        }

        let decoded = attributes::security_attributes(self, declaration)?;
        let _guard = self.guard.lock()?;
        declaration
            .attributes
            .get_or_materialize(declaration.token, || Ok(decoded))
    }

    /// Default value of a field, parameter or property
    ///
    /// # Errors
    /// Fails on a malformed `Constant` row or value blob.
    pub fn read_constant(&self, owner: Token) -> Result<Option<PrimitiveValue>> {
        self.read(|ctx| ctx.constant(owner))
    }

    /// Native marshalling of a field or parameter
    ///
    /// # Errors
    /// Fails on a malformed marshalling descriptor.
    pub fn read_marshal_info(&self, owner: Token) -> Result<Option<MarshalInfo>> {
        self.read(|ctx| ctx.marshal_info(owner))
    }

    /// Packing and class size of `owner`
    ///
    /// # Errors
    /// Fails on a malformed `ClassLayout` table.
    pub fn read_class_layout(&self, owner: &TypeDefinition) -> Result<Option<ClassLayout>> {
        self.read(|ctx| Ok(ctx.class_layouts()?.get(&owner.token.row()).copied()))
    }

    /// Explicit offset of a field
    ///
    /// # Errors
    /// Fails on a malformed `FieldLayout` table.
    pub fn read_field_offset(&self, field: Token) -> Result<Option<u32>> {
        self.read(|ctx| Ok(ctx.field_layouts()?.get(&field.row()).copied()))
    }

    /// Initial data RVA of a field
    ///
    /// # Errors
    /// Fails on a malformed `FieldRVA` table.
    pub fn read_field_rva(&self, field: Token) -> Result<Option<u32>> {
        self.read(|ctx| Ok(ctx.field_rvas()?.get(&field.row()).copied()))
    }

    /// Parameters of `method`
    ///
    /// # Errors
    /// Fails on a malformed `Param` row.
    pub fn read_parameters(&self, method: &MethodDefRc) -> Result<Arc<MethodParameters>> {
        if let Some(parameters) = method.parameters.get() {
            return Ok(parameters);
        }
        self.read(|ctx| ctx.parameters(method))
    }

    /// Declarations `method` implements explicitly (`MethodImpl`)
    ///
    /// # Errors
    /// Fails on a malformed `MethodImpl` row.
    pub fn read_overrides(&self, method: &MethodDefRc) -> Result<Arc<Vec<MethodHandle>>> {
        if let Some(overrides) = method.overrides.get() {
            return Ok(overrides);
        }
        self.read(|ctx| ctx.overrides_of(method))
    }

    /// How `method` serves a property or event
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` table.
    pub fn read_semantics(&self, method: Token) -> Result<MethodSemanticsAttributes> {
        let semantics = self.read(|ctx| {
            Ok(ctx.semantics()?.methods.get(&method.row()).copied())
        })?;
        Ok(semantics.unwrap_or(MethodSemanticsAttributes::empty()))
    }

    /// Platform invoke target of a method
    ///
    /// # Errors
    /// Fails on a malformed `ImplMap` row.
    pub fn read_pinvoke_info(&self, method: Token) -> Result<Option<PInvokeInfo>> {
        self.read(|ctx| ctx.pinvoke_info(method))
    }

    /// Accessor methods of `property`
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` row.
    pub fn read_property_accessors(&self, property: &PropertyRc) -> Result<Arc<PropertyAccessors>> {
        if let Some(accessors) = property.accessors.get() {
            return Ok(accessors);
        }
        self.read(|ctx| ctx.property_accessors(property))
    }

    /// Accessor methods of `event`
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` row.
    pub fn read_event_accessors(&self, event: &EventRc) -> Result<Arc<EventAccessors>> {
        if let Some(accessors) = event.accessors.get() {
            return Ok(accessors);
        }
        self.read(|ctx| ctx.event_accessors(event))
    }

    /// True if `owner` has nested types; nothing is materialized
    ///
    /// # Errors
    /// Fails on a malformed `NestedClass` table.
    pub fn has_nested_types(&self, owner: &TypeDefinition) -> Result<bool> {
        self.read(|ctx| {
            Ok(ctx
                .nested_map()?
                .nested
                .get(&owner.token.row())
                .is_some_and(|nested| !nested.is_empty()))
        })
    }

    /// True if `owner` implements interfaces; nothing is materialized
    ///
    /// # Errors
    /// Fails on a malformed `InterfaceImpl` table.
    pub fn has_interfaces(&self, owner: &TypeDefinition) -> Result<bool> {
        self.read(|ctx| Ok(ctx.interface_runs()?.contains_key(&owner.token)))
    }

    /// True if `owner` declares generic parameters; nothing is materialized
    ///
    /// # Errors
    /// Fails on a malformed `GenericParam` table.
    pub fn has_generic_parameters(&self, owner: Token) -> Result<bool> {
        self.read(|ctx| Ok(ctx.generic_param_runs()?.contains_key(&owner)))
    }

    /// True if custom attributes are applied to `owner`; nothing is materialized
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` table.
    pub fn has_custom_attributes(&self, owner: Token) -> Result<bool> {
        if !self.options.read_custom_attributes {
            return Ok(false);
        }
        self.read(|ctx| Ok(ctx.attribute_runs()?.contains_key(&owner)))
    }

    /// True if `method` has `MethodImpl` rows; nothing is materialized
    ///
    /// # Errors
    /// Fails on a malformed `MethodImpl` table.
    pub fn has_overrides(&self, method: Token) -> Result<bool> {
        self.read(|ctx| Ok(ctx.overrides()?.contains_key(&method)))
    }
}

impl fmt::Debug for MetadataReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataReader")
            .field("name", &self.name)
            .field("has_image", &self.image.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
