//! Generic parameters.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    metadata::{
        cache::LazySlot,
        customattributes::CustomAttributeRc,
        reader::{MetadataReader, ModuleRc},
        tables::GenericParameterAttributes,
        token::Token,
        typesystem::{CilType, MemberReference, MethodDefinition, TypeDefinition, TypeReference},
    },
    Result,
};

/// Shared handle of a generic parameter
pub type GenericParamRc = Arc<GenericParameter>;

/// Whether a parameter belongs to a type (`!n`) or a method (`!!n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericParameterKind {
    /// Type-level parameter
    Type,
    /// Method-level parameter
    Method,
}

/// The entity declaring a generic parameter
#[derive(Clone)]
pub enum GenericParameterOwner {
    /// A generic type definition
    Type(Weak<TypeDefinition>),
    /// A generic method definition
    Method(Weak<MethodDefinition>),
    /// A generic type known only by reference
    TypeReference(Weak<TypeReference>),
    /// A generic method known only by reference
    MethodReference(Weak<MemberReference>),
}

impl GenericParameterOwner {
    /// Kind of the parameters this owner declares
    #[must_use]
    pub fn kind(&self) -> GenericParameterKind {
        match self {
            GenericParameterOwner::Type(_) | GenericParameterOwner::TypeReference(_) => {
                GenericParameterKind::Type
            }
            GenericParameterOwner::Method(_) | GenericParameterOwner::MethodReference(_) => {
                GenericParameterKind::Method
            }
        }
    }

    /// Token of the owner, null if it was dropped or is not backed by a row
    #[must_use]
    pub fn token(&self) -> Token {
        let token = match self {
            GenericParameterOwner::Type(owner) => owner.upgrade().map(|owner| owner.token),
            GenericParameterOwner::Method(owner) => owner.upgrade().map(|owner| owner.token),
            GenericParameterOwner::TypeReference(owner) => {
                owner.upgrade().map(|owner| owner.token)
            }
            GenericParameterOwner::MethodReference(owner) => {
                owner.upgrade().map(|owner| owner.token)
            }
        };
        token.unwrap_or_default()
    }
}

impl fmt::Debug for GenericParameterOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.token())
    }
}

/// A generic parameter of a type or method.
///
/// Parameters read from `GenericParam` rows carry their row token. Placeholders created
/// for references, and unbound parameters decoded without any generic context, have a
/// null token; the latter also have no owner.
pub struct GenericParameter {
    /// `GenericParam` token, null for placeholders
    pub token: Token,
    /// Name, `!n`/`!!n` for placeholders
    pub name: String,
    /// Zero-based position in the owner's parameter list
    pub position: u32,
    /// Type- or method-level
    pub kind: GenericParameterKind,
    /// Variance and constraint flags
    pub flags: GenericParameterAttributes,
    /// Declaring entity, `None` when unbound
    pub owner: Option<GenericParameterOwner>,
    pub(crate) constraints: LazySlot<Vec<CilType>>,
    pub(crate) module: Weak<MetadataReader>,
}

impl GenericParameter {
    pub(crate) fn new(
        token: Token,
        name: String,
        position: u32,
        flags: GenericParameterAttributes,
        owner: GenericParameterOwner,
        module: Weak<MetadataReader>,
    ) -> Self {
        GenericParameter {
            token,
            name,
            position,
            kind: owner.kind(),
            flags,
            owner: Some(owner),
            constraints: LazySlot::new(),
            module,
        }
    }

    /// A parameter not backed by a row
    #[must_use]
    pub fn placeholder(
        position: u32,
        kind: GenericParameterKind,
        owner: Option<GenericParameterOwner>,
        module: Weak<MetadataReader>,
    ) -> Self {
        let name = match kind {
            GenericParameterKind::Type => format!("!{position}"),
            GenericParameterKind::Method => format!("!!{position}"),
        };

        GenericParameter {
            token: Token::new(0),
            name,
            position,
            kind,
            flags: GenericParameterAttributes::empty(),
            owner,
            // placeholders have no constraint rows
            constraints: LazySlot::with_value(Vec::new()),
            module,
        }
    }

    /// Module the parameter was read from
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// Constraint types from `GenericParamConstraint`
    ///
    /// # Errors
    /// Fails on a malformed constraint row.
    pub fn constraints(self: &Arc<Self>) -> Result<Arc<Vec<CilType>>> {
        if let Some(constraints) = self.constraints.get() {
            return Ok(constraints);
        }

        match self.module() {
            Some(module) => module.read_generic_constraints(self),
            None => Ok(Arc::default()),
        }
    }

    /// Custom attributes applied to the parameter
    ///
    /// # Errors
    /// Fails on a malformed `CustomAttribute` row.
    pub fn custom_attributes(&self) -> Result<Arc<Vec<CustomAttributeRc>>> {
        match self.module() {
            Some(module) if !self.token.is_null() => module.read_custom_attributes(self.token),
            _ => Ok(Arc::default()),
        }
    }
}

impl fmt::Debug for GenericParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericParameter")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .finish()
    }
}
