//! Type references and type definitions.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
};

use crate::{
    metadata::{
        cache::LazySlot,
        customattributes::CustomAttributeRc,
        range::Range,
        reader::{MetadataReader, ModuleRc},
        security::SecurityDeclRc,
        tables::TypeAttributes,
        token::Token,
        typesystem::{
            CilType, EventDefinition, FieldDefinition, GenericParamRc, GenericParameter,
            GenericParameterKind, GenericParameterOwner, MemberCollection, MetadataScope,
            MethodDefinition, PrimitiveKind, PropertyDefinition,
        },
    },
    Result,
};

/// Shared handle of a type reference
pub type TypeRefRc = Arc<TypeReference>;
/// Shared handle of a type definition
pub type TypeDefRc = Arc<TypeDefinition>;

/// A type defined elsewhere, named by namespace, name and scope
pub struct TypeReference {
    /// `TypeRef` token, null for references not backed by a row
    pub token: Token,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Where the type lives; nested references carry their outermost scope
    pub scope: Option<MetadataScope>,
    declaring_type: Option<Weak<TypeReference>>,
    value_type: AtomicBool,
    generic_parameters: Mutex<Vec<GenericParamRc>>,
    module: Weak<MetadataReader>,
}

impl TypeReference {
    pub(crate) fn new(
        token: Token,
        namespace: String,
        name: String,
        scope: Option<MetadataScope>,
        declaring_type: Option<&TypeRefRc>,
        module: Weak<MetadataReader>,
    ) -> Self {
        TypeReference {
            token,
            namespace,
            name,
            scope,
            declaring_type: declaring_type.map(Arc::downgrade),
            value_type: AtomicBool::new(false),
            generic_parameters: Mutex::new(Vec::new()),
            module,
        }
    }

    /// A reference not backed by any table row
    #[must_use]
    pub fn synthesized(
        namespace: &str,
        name: &str,
        scope: Option<MetadataScope>,
        value_type: bool,
    ) -> Self {
        let reference = TypeReference::new(
            Token::new(0),
            namespace.to_string(),
            name.to_string(),
            scope,
            None,
            Weak::new(),
        );
        reference.value_type.store(value_type, Ordering::Relaxed);
        reference
    }

    /// The enclosing type of a nested reference
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRefRc> {
        self.declaring_type.as_ref()?.upgrade()
    }

    /// Module the reference was read from
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// Full name, `Outer/Inner` for nested types
    #[must_use]
    pub fn full_name(&self) -> String {
        if let Some(declaring_type) = self.declaring_type() {
            return format!("{}/{}", declaring_type.full_name(), self.name);
        }

        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// True if a signature tagged this reference `VALUETYPE` or it names a built-in
    /// value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.value_type.load(Ordering::Relaxed)
            || (self.declaring_type.is_none()
                && PrimitiveKind::from_name(&self.namespace, &self.name)
                    .is_some_and(PrimitiveKind::is_value_type))
    }

    pub(crate) fn mark_value_type(&self) {
        self.value_type.store(true, Ordering::Relaxed);
    }

    /// Placeholder for the generic parameter at `position` of the referenced type.
    ///
    /// References carry no generic parameter rows; a signature naming `!n` relative to a
    /// reference gets a placeholder that is stable per position.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the placeholder list is poisoned.
    pub fn generic_parameter(self: &Arc<Self>, position: u32) -> Result<GenericParamRc> {
        let mut parameters = lock!(self.generic_parameters)?;
        while parameters.len() <= position as usize {
            #[allow(clippy::cast_possible_truncation)]
            let next = parameters.len() as u32;
            parameters.push(Arc::new(GenericParameter::placeholder(
                next,
                GenericParameterKind::Type,
                Some(GenericParameterOwner::TypeReference(Arc::downgrade(self))),
                self.module.clone(),
            )));
        }
        Ok(parameters[position as usize].clone())
    }
}

impl fmt::Debug for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeReference")
            .field("token", &self.token)
            .field("name", &self.full_name())
            .field("scope", &self.scope)
            .finish()
    }
}

/// One `InterfaceImpl` row
#[derive(Debug, Clone)]
pub struct InterfaceImplementation {
    /// `InterfaceImpl` token, owner of custom attributes on the implementation
    pub token: Token,
    /// The implemented interface
    pub interface: CilType,
}

/// `ClassLayout` row of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    /// Field alignment
    pub packing_size: u16,
    /// Total size of the type
    pub class_size: u32,
}

/// A type defined in a module.
///
/// Only the row itself is read when the node is created. Everything else is read on
/// first access, exactly once, through the owning module.
pub struct TypeDefinition {
    /// `TypeDef` token
    pub token: Token,
    /// Type attributes
    pub flags: u32,
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    pub(crate) extends: Token,
    pub(crate) field_list: Range,
    pub(crate) method_list: Range,
    pub(crate) module: Weak<MetadataReader>,
    pub(crate) base_type: LazySlot<Option<CilType>>,
    pub(crate) fields: LazySlot<MemberCollection<FieldDefinition>>,
    pub(crate) methods: LazySlot<MemberCollection<MethodDefinition>>,
    pub(crate) properties: LazySlot<MemberCollection<PropertyDefinition>>,
    pub(crate) events: LazySlot<MemberCollection<EventDefinition>>,
    pub(crate) interfaces: LazySlot<Vec<InterfaceImplementation>>,
    pub(crate) nested_types: LazySlot<Vec<TypeDefRc>>,
    pub(crate) generic_parameters: LazySlot<Vec<GenericParamRc>>,
}

impl TypeDefinition {
    pub(crate) fn new(
        token: Token,
        flags: u32,
        namespace: String,
        name: String,
        extends: Token,
        field_list: Range,
        method_list: Range,
        module: Weak<MetadataReader>,
    ) -> Self {
        TypeDefinition {
            token,
            flags,
            namespace,
            name,
            extends,
            field_list,
            method_list,
            module,
            base_type: LazySlot::new(),
            fields: LazySlot::new(),
            methods: LazySlot::new(),
            properties: LazySlot::new(),
            events: LazySlot::new(),
            interfaces: LazySlot::new(),
            nested_types: LazySlot::new(),
            generic_parameters: LazySlot::new(),
        }
    }

    /// The module defining this type
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// Full name, `Outer/Inner` for nested types
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.is_nested() {
            if let Ok(Some(declaring_type)) = self.declaring_type() {
                return format!("{}/{}", declaring_type.full_name(), self.name);
            }
        }

        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// True for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }

    /// True if the visibility says this type is nested
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.flags & TypeAttributes::VISIBILITY_MASK > TypeAttributes::PUBLIC
    }

    /// True if the base type is `System.Enum`
    #[must_use]
    pub fn is_enum(self: &Arc<Self>) -> bool {
        matches!(self.base_type(), Ok(Some(base)) if base.namespace() == "System" && base.name() == "Enum")
    }

    /// True if the base type is `System.ValueType` or `System.Enum`
    #[must_use]
    pub fn is_value_type(self: &Arc<Self>) -> bool {
        if self.namespace == "System" && self.name == "Enum" {
            return false;
        }

        match self.base_type() {
            Ok(Some(base)) => {
                base.namespace() == "System" && (base.name() == "ValueType" || base.name() == "Enum")
            }
            _ => false,
        }
    }

    /// The base type, `None` for `System.Object`, interfaces and `<Module>`
    ///
    /// # Errors
    /// Fails if the `Extends` column or the type it names is malformed.
    pub fn base_type(self: &Arc<Self>) -> Result<Option<CilType>> {
        match self.module() {
            Some(module) => module.read_base_type(self),
            None => Ok(None),
        }
    }

    /// The enclosing type of a nested type
    ///
    /// # Errors
    /// Fails if the `NestedClass` table is malformed.
    pub fn declaring_type(&self) -> Result<Option<TypeDefRc>> {
        match self.module() {
            Some(module) => module.read_declaring_type(self),
            None => Ok(None),
        }
    }

    /// Fields, in table order
    ///
    /// # Errors
    /// Fails on a malformed row or field signature.
    pub fn fields(self: &Arc<Self>) -> Result<Arc<MemberCollection<FieldDefinition>>> {
        match self.module() {
            Some(module) => module.read_fields(self),
            None => Ok(Arc::default()),
        }
    }

    /// Methods, in table order
    ///
    /// # Errors
    /// Fails on a malformed row or method signature.
    pub fn methods(self: &Arc<Self>) -> Result<Arc<MemberCollection<MethodDefinition>>> {
        match self.module() {
            Some(module) => module.read_methods(self),
            None => Ok(Arc::default()),
        }
    }

    /// Properties
    ///
    /// # Errors
    /// Fails on a malformed row or property signature.
    pub fn properties(self: &Arc<Self>) -> Result<Arc<MemberCollection<PropertyDefinition>>> {
        match self.module() {
            Some(module) => module.read_properties(self),
            None => Ok(Arc::default()),
        }
    }

    /// Events
    ///
    /// # Errors
    /// Fails on a malformed row or event type.
    pub fn events(self: &Arc<Self>) -> Result<Arc<MemberCollection<EventDefinition>>> {
        match self.module() {
            Some(module) => module.read_events(self),
            None => Ok(Arc::default()),
        }
    }

    /// Implemented interfaces
    ///
    /// # Errors
    /// Fails on a malformed `InterfaceImpl` row.
    pub fn interfaces(self: &Arc<Self>) -> Result<Arc<Vec<InterfaceImplementation>>> {
        match self.module() {
            Some(module) => module.read_interfaces(self),
            None => Ok(Arc::default()),
        }
    }

    /// Types nested in this one
    ///
    /// # Errors
    /// Fails on a malformed `NestedClass` row.
    pub fn nested_types(self: &Arc<Self>) -> Result<Arc<Vec<TypeDefRc>>> {
        match self.module() {
            Some(module) => module.read_nested_types(self),
            None => Ok(Arc::default()),
        }
    }

    /// Generic parameters, ordered by position
    ///
    /// # Errors
    /// Fails on a malformed `GenericParam` row.
    pub fn generic_parameters(self: &Arc<Self>) -> Result<Arc<Vec<GenericParamRc>>> {
        match self.module() {
            Some(module) => {
                module.read_generic_parameters(&GenericParameterOwner::Type(Arc::downgrade(self)))
            }
            None => Ok(Arc::default()),
        }
    }

    /// Custom attributes applied to this type
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` row.
    pub fn custom_attributes(&self) -> Result<Arc<Vec<CustomAttributeRc>>> {
        match self.module() {
            Some(module) => module.read_custom_attributes(self.token),
            None => Ok(Arc::default()),
        }
    }

    /// Declarative security attached to this type
    ///
    /// # Errors
    /// Fails on a malformed `DeclSecurity` row.
    pub fn security_declarations(&self) -> Result<Arc<Vec<SecurityDeclRc>>> {
        match self.module() {
            Some(module) => module.read_security_declarations(self.token),
            None => Ok(Arc::default()),
        }
    }

    /// Packing and size from `ClassLayout`
    ///
    /// # Errors
    /// Fails on a malformed `ClassLayout` row.
    pub fn class_layout(&self) -> Result<Option<ClassLayout>> {
        match self.module() {
            Some(module) => module.read_class_layout(self),
            None => Ok(None),
        }
    }

    /// True if other types are nested in this one, without reading them
    ///
    /// # Errors
    /// Fails on a malformed `NestedClass` table.
    pub fn has_nested_types(&self) -> Result<bool> {
        match self.module() {
            Some(module) => module.has_nested_types(self),
            None => Ok(false),
        }
    }

    /// True if the type implements interfaces, without reading them
    ///
    /// # Errors
    /// Fails on a malformed `InterfaceImpl` table.
    pub fn has_interfaces(&self) -> Result<bool> {
        match self.module() {
            Some(module) => module.has_interfaces(self),
            None => Ok(false),
        }
    }

    /// True if the type is generic, without reading its parameters
    ///
    /// # Errors
    /// Fails on a malformed `GenericParam` table.
    pub fn has_generic_parameters(&self) -> Result<bool> {
        match self.module() {
            Some(module) => module.has_generic_parameters(self.token),
            None => Ok(false),
        }
    }

    /// True if custom attributes are applied, without reading them
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` table.
    pub fn has_custom_attributes(&self) -> Result<bool> {
        match self.module() {
            Some(module) => module.has_custom_attributes(self.token),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("token", &self.token)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("flags", &format_args!("0x{:08x}", self.flags))
            .finish()
    }
}
