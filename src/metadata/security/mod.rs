//! Declarative security (ECMA-335 II.22.11).
//!
//! A `DeclSecurity` row attaches a permission set to a type, a method or the assembly,
//! together with the [`SecurityAction`] that says how it is enforced. The permission set
//! blob is decoded on first access.

mod parser;
mod types;

pub use parser::{parse_permission_set, permission_classes};
pub use types::{SecurityAction, SecurityAttribute};

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    metadata::{
        cache::LazySlot,
        customattributes::NoTypeResolver,
        reader::{MetadataReader, ModuleRc},
        token::Token,
    },
    Result,
};

/// Shared handle of a security declaration
pub type SecurityDeclRc = Arc<SecurityDeclaration>;

/// One `DeclSecurity` row
pub struct SecurityDeclaration {
    /// `DeclSecurity` token
    pub token: Token,
    /// Enforcement
    pub action: SecurityAction,
    /// The type, method or assembly the permissions apply to
    pub parent: Token,
    /// Raw permission set blob
    pub blob: Vec<u8>,
    pub(crate) attributes: LazySlot<Vec<SecurityAttribute>>,
    pub(crate) module: Weak<MetadataReader>,
}

impl SecurityDeclaration {
    pub(crate) fn new(
        token: Token,
        action: SecurityAction,
        parent: Token,
        blob: Vec<u8>,
        module: Weak<MetadataReader>,
    ) -> Self {
        SecurityDeclaration {
            token,
            action,
            parent,
            blob,
            attributes: LazySlot::new(),
            module,
        }
    }

    /// Module the declaration was read from
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// The permission attributes
    ///
    /// # Errors
    /// Fails on a malformed permission set blob.
    pub fn attributes(&self) -> Result<Arc<Vec<SecurityAttribute>>> {
        if let Some(attributes) = self.attributes.get() {
            return Ok(attributes);
        }

        match self.module() {
            Some(module) => module.read_security_attributes(self),
            None => self.attributes.get_or_materialize(self.token, || {
                parse_permission_set(&self.blob, &NoTypeResolver)
            }),
        }
    }
}

impl fmt::Debug for SecurityDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityDeclaration")
            .field("token", &self.token)
            .field("action", &self.action)
            .field("parent", &self.parent)
            .finish()
    }
}
