//! Custom attributes (ECMA-335 II.22.10, II.23.3).
//!
//! A [`CustomAttribute`] is one row of the `CustomAttribute` table: the annotated entity,
//! the attribute constructor and the raw value blob. The blob is decoded on first access
//! to [`CustomAttribute::value`], using the constructor's parameter types.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::customattributes::{parse_custom_attribute_data, CustomAttributeArgument};
//!
//! // no fixed arguments, one named property `Tag = "hi"`
//! let blob = [0x01, 0x00, 0x01, 0x00, 0x54, 0x0E, 0x03, b'T', b'a', b'g', 0x02, b'h', b'i'];
//! let value = parse_custom_attribute_data(&blob, &[])?;
//! assert_eq!(
//!     value.named("Tag").map(|arg| &arg.value),
//!     Some(&CustomAttributeArgument::String(Some("hi".to_string())))
//! );
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod parser;
mod types;

pub use parser::{
    parse_custom_attribute_data, AttributeTypeResolver, CustomAttributeParser, NoTypeResolver,
};
pub use types::*;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    metadata::{
        cache::LazySlot,
        reader::{MetadataReader, ModuleRc},
        token::Token,
        typesystem::{CilType, MethodHandle},
    },
    Result,
};

/// Shared handle of a custom attribute
pub type CustomAttributeRc = Arc<CustomAttribute>;

/// One applied custom attribute
pub struct CustomAttribute {
    /// `CustomAttribute` token
    pub token: Token,
    /// The annotated entity
    pub parent: Token,
    /// The attribute constructor
    pub constructor: MethodHandle,
    /// Raw value blob
    pub blob: Vec<u8>,
    pub(crate) value: LazySlot<CustomAttributeValue>,
    pub(crate) module: Weak<MetadataReader>,
}

impl CustomAttribute {
    pub(crate) fn new(
        token: Token,
        parent: Token,
        constructor: MethodHandle,
        blob: Vec<u8>,
        module: Weak<MetadataReader>,
    ) -> Self {
        CustomAttribute {
            token,
            parent,
            constructor,
            blob,
            value: LazySlot::new(),
            module,
        }
    }

    /// The attribute type, i.e. the constructor's declaring type
    #[must_use]
    pub fn attribute_type(&self) -> Option<CilType> {
        self.constructor.declaring_type()
    }

    /// Module the attribute was read from
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        self.module.upgrade()
    }

    /// Decoded fixed and named arguments
    ///
    /// # Errors
    /// Fails on a malformed blob or a constructor whose signature cannot be decoded.
    pub fn value(&self) -> Result<Arc<CustomAttributeValue>> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        match self.module() {
            Some(module) => module.read_custom_attribute_value(self),
            None => {
                let parameters = self.constructor.signature()?.parameters;
                self.value.get_or_materialize(self.token, || {
                    parse_custom_attribute_data(&self.blob, &parameters)
                })
            }
        }
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("token", &self.token)
            .field("parent", &self.parent)
            .field("constructor", &self.constructor)
            .finish()
    }
}
