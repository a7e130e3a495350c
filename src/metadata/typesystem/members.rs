//! Fields, methods, parameters, properties, events and member references.

use std::{
    fmt,
    sync::{Arc, Mutex, OnceLock, Weak},
};

use crate::{
    metadata::{
        cache::LazySlot,
        customattributes::CustomAttributeRc,
        marshalling::MarshalInfo,
        range::Range,
        reader::{MetadataReader, ModuleRc},
        security::SecurityDeclRc,
        tables::{FieldAttributes, MethodAttributes, MethodSemanticsAttributes, PInvokeAttributes},
        token::Token,
        typesystem::{
            CilType, GenericParamRc, GenericParameter, GenericParameterKind,
            GenericParameterOwner, MethodSignature, ModuleRefRc, PrimitiveValue, TypeDefRc,
            TypeDefinition,
        },
    },
    Error, Result,
};

/// Shared handle of a field
pub type FieldRc = Arc<FieldDefinition>;
/// Shared handle of a method
pub type MethodDefRc = Arc<MethodDefinition>;
/// Shared handle of a parameter
pub type ParamRc = Arc<ParameterDefinition>;
/// Shared handle of a property
pub type PropertyRc = Arc<PropertyDefinition>;
/// Shared handle of an event
pub type EventRc = Arc<EventDefinition>;
/// Shared handle of a member reference
pub type MemberRefRc = Arc<MemberReference>;
/// Shared handle of a generic method instantiation
pub type GenericInstanceMethodRc = Arc<GenericInstanceMethod>;

/// A member owned by exactly one type definition
pub trait OwnedMember {
    /// Row token of the member
    fn token(&self) -> Token;
    /// The owner link, set once when the member is attached
    fn owner(&self) -> &OnceLock<Weak<TypeDefinition>>;
}

/// The members of one kind a type definition owns.
///
/// Attaching records the owner in the member; a member can be attached to one type only.
pub struct MemberCollection<T> {
    items: Vec<Arc<T>>,
}

impl<T> Default for MemberCollection<T> {
    fn default() -> Self {
        MemberCollection { items: Vec::new() }
    }
}

impl<T: OwnedMember> MemberCollection<T> {
    /// An empty collection with room for `capacity` members
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        MemberCollection {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Attach `item` to `owner` and append it.
    ///
    /// Attaching a member to the type it already belongs to is allowed.
    ///
    /// # Errors
    /// Returns [`Error::MemberAlreadyAttached`] if `item` is owned by another type.
    pub fn attach(&mut self, owner: &TypeDefRc, item: Arc<T>) -> Result<()> {
        let owner_ref = Arc::downgrade(owner);
        let existing = item.owner().get_or_init(|| owner_ref.clone());
        if !Weak::ptr_eq(existing, &owner_ref) {
            return Err(Error::MemberAlreadyAttached(item.token()));
        }

        self.items.push(item);
        Ok(())
    }
}

impl<T> MemberCollection<T> {
    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Member at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    /// Iterate in table order
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a MemberCollection<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

macro_rules! owned_member {
    ($ty:ty) => {
        impl OwnedMember for $ty {
            fn token(&self) -> Token {
                self.token
            }

            fn owner(&self) -> &OnceLock<Weak<TypeDefinition>> {
                &self.declaring_type
            }
        }

        impl $ty {
            /// The type owning this member
            #[must_use]
            pub fn declaring_type(&self) -> Option<TypeDefRc> {
                self.declaring_type.get()?.upgrade()
            }

            /// Module the member was read from
            #[must_use]
            pub fn module(&self) -> Option<ModuleRc> {
                self.module.upgrade()
            }

            /// Custom attributes applied to the member
            ///
            /// # Errors
            /// Fails on a malformed `CustomAttribute` row.
            pub fn custom_attributes(&self) -> Result<Arc<Vec<CustomAttributeRc>>> {
                match self.module() {
                    Some(module) => module.read_custom_attributes(self.token),
                    None => Ok(Arc::default()),
                }
            }
        }
    };
}

/// A field definition
pub struct FieldDefinition {
    /// `Field` token
    pub token: Token,
    /// Field attributes
    pub flags: u16,
    /// Name
    pub name: String,
    /// Declared type, modifiers included
    pub field_type: CilType,
    pub(crate) declaring_type: OnceLock<Weak<TypeDefinition>>,
    pub(crate) module: Weak<MetadataReader>,
}

owned_member!(FieldDefinition);

impl FieldDefinition {
    pub(crate) fn new(
        token: Token,
        flags: u16,
        name: String,
        field_type: CilType,
        module: Weak<MetadataReader>,
    ) -> Self {
        FieldDefinition {
            token,
            flags,
            name,
            field_type,
            declaring_type: OnceLock::new(),
            module,
        }
    }

    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// True for compile-time constants
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags & FieldAttributes::LITERAL != 0
    }

    /// Default value from the `Constant` table
    ///
    /// # Errors
    /// Fails on a malformed constant blob.
    pub fn constant(&self) -> Result<Option<PrimitiveValue>> {
        match self.module() {
            Some(module) => module.read_constant(self.token),
            None => Ok(None),
        }
    }

    /// Native marshalling from `FieldMarshal`
    ///
    /// # Errors
    /// Fails on a malformed marshalling descriptor.
    pub fn marshal_info(&self) -> Result<Option<MarshalInfo>> {
        match self.module() {
            Some(module) => module.read_marshal_info(self.token),
            None => Ok(None),
        }
    }

    /// Explicit offset from `FieldLayout`
    ///
    /// # Errors
    /// Fails on a malformed `FieldLayout` table.
    pub fn offset(&self) -> Result<Option<u32>> {
        match self.module() {
            Some(module) => module.read_field_offset(self.token),
            None => Ok(None),
        }
    }

    /// Initial data RVA from `FieldRVA`
    ///
    /// # Errors
    /// Fails on a malformed `FieldRVA` table.
    pub fn rva(&self) -> Result<Option<u32>> {
        match self.module() {
            Some(module) => module.read_field_rva(self.token),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .finish()
    }
}

/// Platform invoke target from `ImplMap`
#[derive(Debug, Clone)]
pub struct PInvokeInfo {
    /// Mapping flags
    pub flags: PInvokeAttributes,
    /// Exported name in the native module
    pub entry_point: String,
    /// Native module
    pub module: ModuleRefRc,
}

/// Parameters of a method, built from its signature and `Param` rows
#[derive(Debug, Default)]
pub struct MethodParameters {
    /// The `Param` row with sequence 0, if any
    pub return_parameter: Option<ParamRc>,
    /// One entry per signature parameter
    pub parameters: Vec<ParamRc>,
}

/// A method definition
pub struct MethodDefinition {
    /// `MethodDef` token
    pub token: Token,
    /// RVA of the method body, 0 if none
    pub rva: u32,
    /// Implementation attributes
    pub impl_flags: u16,
    /// Method attributes
    pub flags: u16,
    /// Name
    pub name: String,
    pub(crate) signature: OnceLock<MethodSignature>,
    pub(crate) param_list: Range,
    pub(crate) declaring_type: OnceLock<Weak<TypeDefinition>>,
    pub(crate) module: Weak<MetadataReader>,
    pub(crate) parameters: LazySlot<MethodParameters>,
    pub(crate) overrides: LazySlot<Vec<MethodHandle>>,
    pub(crate) generic_parameters: LazySlot<Vec<GenericParamRc>>,
}

owned_member!(MethodDefinition);

impl MethodDefinition {
    pub(crate) fn new(
        token: Token,
        rva: u32,
        impl_flags: u16,
        flags: u16,
        name: String,
        param_list: Range,
        module: Weak<MetadataReader>,
    ) -> Self {
        MethodDefinition {
            token,
            rva,
            impl_flags,
            flags,
            name,
            signature: OnceLock::new(),
            param_list,
            declaring_type: OnceLock::new(),
            module,
            parameters: LazySlot::new(),
            overrides: LazySlot::new(),
            generic_parameters: LazySlot::new(),
        }
    }

    /// The decoded signature
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the method was not obtained through a reader.
    pub fn signature(&self) -> Result<&MethodSignature> {
        self.signature
            .get()
            .ok_or_else(|| malformed_error!("Signature of {} was not decoded", self.token))
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & MethodAttributes::STATIC != 0
    }

    /// True for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags & MethodAttributes::VIRTUAL != 0
    }

    /// True for `.ctor` and `.cctor`
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags & MethodAttributes::RT_SPECIAL_NAME != 0
            && (self.name == ".ctor" || self.name == ".cctor")
    }

    /// Parameters with their names and flags
    ///
    /// # Errors
    /// Fails on a malformed `Param` row.
    pub fn parameters(self: &Arc<Self>) -> Result<Arc<MethodParameters>> {
        match self.module() {
            Some(module) => module.read_parameters(self),
            None => Ok(Arc::default()),
        }
    }

    /// Interface or base methods this method explicitly implements (`MethodImpl`)
    ///
    /// # Errors
    /// Fails on a malformed `MethodImpl` row.
    pub fn overrides(self: &Arc<Self>) -> Result<Arc<Vec<MethodHandle>>> {
        match self.module() {
            Some(module) => module.read_overrides(self),
            None => Ok(Arc::default()),
        }
    }

    /// Method-level generic parameters
    ///
    /// # Errors
    /// Fails on a malformed `GenericParam` row.
    pub fn generic_parameters(self: &Arc<Self>) -> Result<Arc<Vec<GenericParamRc>>> {
        match self.module() {
            Some(module) => module
                .read_generic_parameters(&GenericParameterOwner::Method(Arc::downgrade(self))),
            None => Ok(Arc::default()),
        }
    }

    /// How this method serves a property or event, empty if it does not
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` table.
    pub fn semantics(&self) -> Result<MethodSemanticsAttributes> {
        match self.module() {
            Some(module) => module.read_semantics(self.token),
            None => Ok(MethodSemanticsAttributes::empty()),
        }
    }

    /// Platform invoke target
    ///
    /// # Errors
    /// Fails on a malformed `ImplMap` row.
    pub fn pinvoke_info(&self) -> Result<Option<PInvokeInfo>> {
        match self.module() {
            Some(module) => module.read_pinvoke_info(self.token),
            None => Ok(None),
        }
    }

    /// Declarative security attached to the method
    ///
    /// # Errors
    /// Fails on a malformed `DeclSecurity` row.
    pub fn security_declarations(&self) -> Result<Arc<Vec<SecurityDeclRc>>> {
        match self.module() {
            Some(module) => module.read_security_declarations(self.token),
            None => Ok(Arc::default()),
        }
    }

    /// True if `MethodImpl` rows name this method as body, without reading them
    ///
    /// # Errors
    /// Fails on a malformed `MethodImpl` table.
    pub fn has_overrides(&self) -> Result<bool> {
        match self.module() {
            Some(module) => module.has_overrides(self.token),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("signature", &self.signature.get())
            .finish()
    }
}

/// A method parameter, or the return value when `sequence` is 0
pub struct ParameterDefinition {
    /// `Param` token, null if the signature parameter has no row
    pub token: Token,
    /// Parameter attributes
    pub flags: u16,
    /// Name, empty if the parameter has no row
    pub name: String,
    /// 0 for the return value, otherwise 1-based position
    pub sequence: u16,
    /// Type from the method signature
    pub parameter_type: CilType,
    pub(crate) method: Weak<MethodDefinition>,
    pub(crate) module: Weak<MetadataReader>,
}

impl ParameterDefinition {
    /// The method declaring this parameter
    #[must_use]
    pub fn method(&self) -> Option<MethodDefRc> {
        self.method.upgrade()
    }

    /// Default value
    ///
    /// # Errors
    /// Fails on a malformed constant blob.
    pub fn constant(&self) -> Result<Option<PrimitiveValue>> {
        match self.module.upgrade() {
            Some(module) if !self.token.is_null() => module.read_constant(self.token),
            _ => Ok(None),
        }
    }

    /// Native marshalling
    ///
    /// # Errors
    /// Fails on a malformed marshalling descriptor.
    pub fn marshal_info(&self) -> Result<Option<MarshalInfo>> {
        match self.module.upgrade() {
            Some(module) if !self.token.is_null() => module.read_marshal_info(self.token),
            _ => Ok(None),
        }
    }

    /// Custom attributes applied to the parameter
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` row.
    pub fn custom_attributes(&self) -> Result<Arc<Vec<CustomAttributeRc>>> {
        match self.module.upgrade() {
            Some(module) if !self.token.is_null() => module.read_custom_attributes(self.token),
            _ => Ok(Arc::default()),
        }
    }
}

impl fmt::Debug for ParameterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDefinition")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("parameter_type", &self.parameter_type)
            .finish()
    }
}

/// Getter, setter and other accessors of a property
#[derive(Debug, Default)]
pub struct PropertyAccessors {
    /// `get_` accessor
    pub getter: Option<MethodDefRc>,
    /// `set_` accessor
    pub setter: Option<MethodDefRc>,
    /// Other accessors
    pub others: Vec<MethodDefRc>,
}

/// A property definition
pub struct PropertyDefinition {
    /// `Property` token
    pub token: Token,
    /// Property attributes
    pub flags: u16,
    /// Name
    pub name: String,
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub property_type: CilType,
    /// Indexer parameter types
    pub parameters: Vec<CilType>,
    pub(crate) accessors: LazySlot<PropertyAccessors>,
    pub(crate) declaring_type: OnceLock<Weak<TypeDefinition>>,
    pub(crate) module: Weak<MetadataReader>,
}

owned_member!(PropertyDefinition);

impl PropertyDefinition {
    /// Accessor methods from `MethodSemantics`
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` row.
    pub fn accessors(self: &Arc<Self>) -> Result<Arc<PropertyAccessors>> {
        match self.module() {
            Some(module) => module.read_property_accessors(self),
            None => Ok(Arc::default()),
        }
    }

    /// Default value
    ///
    /// # Errors
    /// Fails on a malformed constant blob.
    pub fn constant(&self) -> Result<Option<PrimitiveValue>> {
        match self.module() {
            Some(module) => module.read_constant(self.token),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("property_type", &self.property_type)
            .finish()
    }
}

/// Add, remove, fire and other accessors of an event
#[derive(Debug, Default)]
pub struct EventAccessors {
    /// `add_` accessor
    pub add: Option<MethodDefRc>,
    /// `remove_` accessor
    pub remove: Option<MethodDefRc>,
    /// `raise_` accessor
    pub fire: Option<MethodDefRc>,
    /// Other accessors
    pub others: Vec<MethodDefRc>,
}

/// An event definition
pub struct EventDefinition {
    /// `Event` token
    pub token: Token,
    /// Event attributes
    pub flags: u16,
    /// Name
    pub name: String,
    /// Delegate type
    pub event_type: CilType,
    pub(crate) accessors: LazySlot<EventAccessors>,
    pub(crate) declaring_type: OnceLock<Weak<TypeDefinition>>,
    pub(crate) module: Weak<MetadataReader>,
}

owned_member!(EventDefinition);

impl EventDefinition {
    /// Accessor methods from `MethodSemantics`
    ///
    /// # Errors
    /// Fails on a malformed `MethodSemantics` row.
    pub fn accessors(self: &Arc<Self>) -> Result<Arc<EventAccessors>> {
        match self.module() {
            Some(module) => module.read_event_accessors(self),
            None => Ok(Arc::default()),
        }
    }
}

impl fmt::Debug for EventDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDefinition")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// Parent of a `MemberRef` row
#[derive(Clone, Debug)]
pub enum MemberRefParent {
    /// A type definition, reference or specification
    Type(CilType),
    /// A vararg method definition the reference adds a call-site signature to
    Method(Weak<MethodDefinition>),
}

/// Decoded signature of a member reference
#[derive(Debug, Clone)]
pub enum MemberSignature {
    /// A field of this type
    Field(CilType),
    /// A method with this signature
    Method(MethodSignature),
}

/// A `MemberRef` row: a field or method named by parent, name and signature
pub struct MemberReference {
    /// `MemberRef` token
    pub token: Token,
    /// Member name
    pub name: String,
    /// Declaring entity
    pub parent: MemberRefParent,
    pub(crate) signature: OnceLock<MemberSignature>,
    generic_parameters: Mutex<Vec<GenericParamRc>>,
    pub(crate) module: Weak<MetadataReader>,
}

impl MemberReference {
    pub(crate) fn new(
        token: Token,
        name: String,
        parent: MemberRefParent,
        module: Weak<MetadataReader>,
    ) -> Self {
        MemberReference {
            token,
            name,
            parent,
            signature: OnceLock::new(),
            generic_parameters: Mutex::new(Vec::new()),
            module,
        }
    }

    /// The decoded signature
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the reference was not obtained through a reader.
    pub fn signature(&self) -> Result<&MemberSignature> {
        self.signature
            .get()
            .ok_or_else(|| malformed_error!("Signature of {} was not decoded", self.token))
    }

    /// True if this references a field
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self.signature.get(), Some(MemberSignature::Field(_)))
    }

    /// Declaring type of the referenced member
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilType> {
        match &self.parent {
            MemberRefParent::Type(ty) => Some(ty.clone()),
            MemberRefParent::Method(method) => method
                .upgrade()?
                .declaring_type()
                .map(|owner| CilType::definition(&owner)),
        }
    }

    /// Module the reference was read from
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// True if a generic parameter occurs in the parent or the signature
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        let parent = match &self.parent {
            MemberRefParent::Type(ty) => ty.contains_generic_parameter(),
            MemberRefParent::Method(_) => false,
        };

        parent
            || match self.signature.get() {
                Some(MemberSignature::Field(ty)) => ty.contains_generic_parameter(),
                Some(MemberSignature::Method(method)) => method.contains_generic_parameter(),
                None => false,
            }
    }

    /// Placeholder for the method generic parameter at `position`
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the placeholder list is poisoned.
    pub fn generic_parameter(self: &Arc<Self>, position: u32) -> Result<GenericParamRc> {
        let mut parameters = lock!(self.generic_parameters)?;
        while parameters.len() <= position as usize {
            #[allow(clippy::cast_possible_truncation)]
            let next = parameters.len() as u32;
            parameters.push(Arc::new(GenericParameter::placeholder(
                next,
                GenericParameterKind::Method,
                Some(GenericParameterOwner::MethodReference(Arc::downgrade(self))),
                self.module.clone(),
            )));
        }
        Ok(parameters[position as usize].clone())
    }

    /// Custom attributes applied to the reference
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` row.
    pub fn custom_attributes(&self) -> Result<Arc<Vec<CustomAttributeRc>>> {
        match self.module() {
            Some(module) => module.read_custom_attributes(self.token),
            None => Ok(Arc::default()),
        }
    }
}

impl fmt::Debug for MemberReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberReference")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("signature", &self.signature.get())
            .finish()
    }
}

/// A generic method instantiated with concrete arguments (`MethodSpec`)
#[derive(Debug)]
pub struct GenericInstanceMethod {
    /// `MethodSpec` token
    pub token: Token,
    /// The generic method
    pub element: MethodHandle,
    /// Method type arguments
    pub arguments: Vec<CilType>,
}

/// Any method a token can name
#[derive(Clone)]
pub enum MethodHandle {
    /// A definition of this or another module
    Definition(Weak<MethodDefinition>),
    /// A `MemberRef` with a method signature
    Reference(MemberRefRc),
    /// A generic method instantiation
    Instance(GenericInstanceMethodRc),
}

impl MethodHandle {
    /// Handle to a definition
    #[must_use]
    pub fn definition(method: &MethodDefRc) -> Self {
        MethodHandle::Definition(Arc::downgrade(method))
    }

    /// Token of the named method
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            MethodHandle::Definition(method) => {
                method.upgrade().map(|method| method.token).unwrap_or_default()
            }
            MethodHandle::Reference(reference) => reference.token,
            MethodHandle::Instance(instance) => instance.token,
        }
    }

    /// Method name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            MethodHandle::Definition(method) => method
                .upgrade()
                .map(|method| method.name.clone())
                .unwrap_or_default(),
            MethodHandle::Reference(reference) => reference.name.clone(),
            MethodHandle::Instance(instance) => instance.element.name(),
        }
    }

    /// The definition, if this names one directly
    #[must_use]
    pub fn as_definition(&self) -> Option<MethodDefRc> {
        match self {
            MethodHandle::Definition(method) => method.upgrade(),
            _ => None,
        }
    }

    /// Declaring type of the method
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilType> {
        match self {
            MethodHandle::Definition(method) => method
                .upgrade()?
                .declaring_type()
                .map(|owner| CilType::definition(&owner)),
            MethodHandle::Reference(reference) => reference.declaring_type(),
            MethodHandle::Instance(instance) => instance.element.declaring_type(),
        }
    }

    /// Signature of the uninstantiated method
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the handle names a field reference or the method
    /// was dropped.
    pub fn signature(&self) -> Result<MethodSignature> {
        match self {
            MethodHandle::Definition(method) => method
                .upgrade()
                .ok_or_else(|| malformed_error!("Method was dropped"))?
                .signature()
                .cloned(),
            MethodHandle::Reference(reference) => match reference.signature()? {
                MemberSignature::Method(signature) => Ok(signature.clone()),
                MemberSignature::Field(_) => Err(malformed_error!(
                    "{} references a field, not a method",
                    reference.token
                )),
            },
            MethodHandle::Instance(instance) => instance.element.signature(),
        }
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodHandle::Definition(_) => write!(f, "Definition({}, {})", self.token(), self.name()),
            MethodHandle::Reference(_) => write!(f, "Reference({}, {})", self.token(), self.name()),
            MethodHandle::Instance(instance) => write!(
                f,
                "Instance({}, {:?}, {:?})",
                instance.token, instance.element, instance.arguments
            ),
        }
    }
}

impl PartialEq for MethodHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MethodHandle::Definition(a), MethodHandle::Definition(b)) => Weak::ptr_eq(a, b),
            (MethodHandle::Reference(a), MethodHandle::Reference(b)) => Arc::ptr_eq(a, b),
            (MethodHandle::Instance(a), MethodHandle::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Decoded `StandAloneSig` row
#[derive(Debug)]
pub enum StandAloneSignature {
    /// Local variable types of a method body
    Locals(Vec<CilType>),
    /// Call-site signature of `calli`
    Method(MethodSignature),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{range::Range, typesystem::TypeReference};

    fn owner(rid: u32, name: &str) -> TypeDefRc {
        Arc::new(TypeDefinition::new(
            Token::new(0x0200_0000 | rid),
            0,
            String::new(),
            name.to_string(),
            Token::new(0),
            Range::default(),
            Range::default(),
            Weak::new(),
        ))
    }

    fn field(rid: u32) -> FieldRc {
        let int32 = CilType::Reference(Arc::new(TypeReference::synthesized(
            "System", "Int32", None, true,
        )));
        Arc::new(FieldDefinition::new(
            Token::new(0x0400_0000 | rid),
            0,
            format!("f{rid}"),
            int32,
            Weak::new(),
        ))
    }

    #[test]
    fn attach_once() {
        let first = owner(1, "A");
        let second = owner(2, "B");
        let member = field(1);

        let mut collection = MemberCollection::with_capacity(1);
        collection.attach(&first, member.clone()).unwrap();
        assert_eq!(collection.len(), 1);
        assert!(Arc::ptr_eq(&member.declaring_type().unwrap(), &first));

        // same owner again is fine
        let mut again = MemberCollection::default();
        again.attach(&first, member.clone()).unwrap();

        let mut other = MemberCollection::default();
        assert!(matches!(
            other.attach(&second, member.clone()),
            Err(Error::MemberAlreadyAttached(token)) if token == member.token
        ));
        assert!(other.is_empty());
        assert!(Arc::ptr_eq(&member.declaring_type().unwrap(), &first));
    }

    #[test]
    fn method_handle_identity() {
        let reference = Arc::new(MemberReference::new(
            Token::new(0x0A00_0001),
            "Invoke".to_string(),
            MemberRefParent::Type(CilType::Reference(Arc::new(TypeReference::synthesized(
                "System", "Action", None, false,
            )))),
            Weak::new(),
        ));

        let handle = MethodHandle::Reference(reference.clone());
        assert_eq!(handle, MethodHandle::Reference(reference));
        assert_eq!(handle.name(), "Invoke");
        assert_eq!(handle.token(), Token::new(0x0A00_0001));
        assert!(handle.signature().is_err());
        assert_eq!(
            handle.declaring_type().map(|ty| ty.full_name()),
            Some("System.Action".to_string())
        );
    }
}
