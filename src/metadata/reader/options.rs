use std::{fmt, sync::Arc};

use crate::metadata::{resolver::AssemblyResolver, signatures::MAX_RECURSION_DEPTH};

/// Settings of one [`crate::metadata::reader::MetadataReader`].
///
/// ```rust
/// use dotmeta::metadata::reader::ReaderOptions;
///
/// let options = ReaderOptions::default()
///     .with_max_signature_depth(16)
///     .with_custom_attributes(false);
/// assert_eq!(options.max_signature_depth, 16);
/// assert!(!options.read_custom_attributes);
/// ```
#[derive(Clone)]
pub struct ReaderOptions {
    /// Nesting limit for signatures and for lookups triggered while decoding one
    pub max_signature_depth: usize,
    /// Finds other assemblies, used for enum arguments of custom attributes
    pub resolver: Option<Arc<dyn AssemblyResolver>>,
    /// When false, every custom attribute collection is empty
    pub read_custom_attributes: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            max_signature_depth: MAX_RECURSION_DEPTH,
            resolver: None,
            read_custom_attributes: true,
        }
    }
}

impl ReaderOptions {
    /// Replace the nesting limit
    #[must_use]
    pub fn with_max_signature_depth(mut self, depth: usize) -> Self {
        self.max_signature_depth = depth;
        self
    }

    /// Set the assembly resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AssemblyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Enable or disable reading custom attributes
    #[must_use]
    pub fn with_custom_attributes(mut self, enabled: bool) -> Self {
        self.read_custom_attributes = enabled;
        self
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("max_signature_depth", &self.max_signature_depth)
            .field("resolver", &self.resolver.is_some())
            .field("read_custom_attributes", &self.read_custom_attributes)
            .finish()
    }
}
