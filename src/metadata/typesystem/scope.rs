//! Resolution scopes: the module itself, other modules and other assemblies.

use std::{
    fmt::{self, Write},
    sync::{Arc, Weak},
};

use sha1::{Digest, Sha1};

use crate::{
    metadata::{
        reader::{MetadataReader, ModuleRc},
        tables::AssemblyFlags,
        token::Token,
    },
    Result,
};

/// Four-part assembly version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its parts
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse `major[.minor[.build[.revision]]]`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on more than four parts or a non-numeric part.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .trim()
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of a referenced assembly, as stored in an `AssemblyRef` row
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyNameReference {
    /// `AssemblyRef` token, null for names parsed from strings
    pub token: Token,
    /// Simple name
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
    /// Flags
    pub flags: AssemblyFlags,
    /// Full public key when [`AssemblyFlags::PUBLIC_KEY`] is set, otherwise the 8 byte token
    pub public_key_or_token: Vec<u8>,
    /// Hash of the referenced assembly
    pub hash_value: Vec<u8>,
}

/// Shared handle of an assembly reference
pub type AssemblyRefRc = Arc<AssemblyNameReference>;

impl AssemblyNameReference {
    /// A reference carrying only a name and version
    #[must_use]
    pub fn new(name: &str, version: AssemblyVersion) -> Self {
        AssemblyNameReference {
            token: Token::new(0),
            name: name.to_string(),
            version,
            culture: None,
            flags: AssemblyFlags::empty(),
            public_key_or_token: Vec::new(),
            hash_value: Vec::new(),
        }
    }

    /// The 8 byte public key token, computed from the full key if necessary.
    ///
    /// The token is the last 8 bytes of the key's SHA-1 hash in reverse order.
    #[must_use]
    pub fn public_key_token(&self) -> Option<[u8; 8]> {
        if self.public_key_or_token.is_empty() {
            return None;
        }

        if self.flags.contains(AssemblyFlags::PUBLIC_KEY) {
            let hash = Sha1::digest(&self.public_key_or_token);
            let mut token = [0u8; 8];
            for (i, byte) in hash.iter().rev().take(8).enumerate() {
                token[i] = *byte;
            }
            return Some(token);
        }

        <[u8; 8]>::try_from(self.public_key_or_token.as_slice()).ok()
    }

    /// Parse a display name such as
    /// `mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on an empty name, a bad version or a bad token.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut reference = AssemblyNameReference::new(name, AssemblyVersion::default());
        for part in parts {
            if let Some(value) = part.strip_prefix("Version=") {
                reference.version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                if value != "neutral" {
                    reference.culture = Some(value.to_string());
                }
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    reference.public_key_or_token = decode_hex(value)?;
                    if reference.public_key_or_token.len() != 8 {
                        return Err(malformed_error!(
                            "PublicKeyToken must be exactly 8 bytes, got '{}'",
                            value
                        ));
                    }
                }
            }
        }

        Ok(reference)
    }

    /// Display name in the format accepted by [`AssemblyNameReference::parse`]
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);
        result.push_str(&self.name);

        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );
        match self.public_key_token() {
            Some(token) => {
                result.push_str(", PublicKeyToken=");
                for byte in token {
                    let _ = write!(result, "{byte:02x}");
                }
            }
            None => result.push_str(", PublicKeyToken=null"),
        }

        result
    }
}

impl fmt::Display for AssemblyNameReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    if value.len() % 2 != 0 {
        return Err(malformed_error!("Odd length hex string '{}'", value));
    }

    (0..value.len())
        .step_by(2)
        .map(|i| {
            value
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| malformed_error!("Invalid hex string '{}'", value))
        })
        .collect()
}

/// The assembly defined by a module, from its `Assembly` row
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyDefinition {
    /// Hash algorithm id used for the file hashes of the manifest
    pub hash_algorithm: u32,
    /// Name, version, culture and public key; the token is `0x20000001`
    pub name: AssemblyNameReference,
}

/// A module of the same assembly, from a `ModuleRef` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    /// `ModuleRef` token
    pub token: Token,
    /// File name of the module
    pub name: String,
}

/// Shared handle of a module reference
pub type ModuleRefRc = Arc<ModuleReference>;

/// Where a type reference says its target lives
#[derive(Clone)]
pub enum MetadataScope {
    /// The reading module itself
    Module(Weak<MetadataReader>),
    /// Another module of the same assembly
    ModuleReference(ModuleRefRc),
    /// Another assembly
    AssemblyReference(AssemblyRefRc),
}

impl MetadataScope {
    /// Name of the scope, for diagnostics and comparisons
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            MetadataScope::Module(module) => module
                .upgrade()
                .map(|module| module.name().to_string())
                .unwrap_or_default(),
            MetadataScope::ModuleReference(module_ref) => module_ref.name.clone(),
            MetadataScope::AssemblyReference(assembly_ref) => assembly_ref.name.clone(),
        }
    }

    /// The module, if this scope is the reading module and it is still alive
    #[must_use]
    pub fn module(&self) -> Option<ModuleRc> {
        match self {
            MetadataScope::Module(module) => module.upgrade(),
            _ => None,
        }
    }
}

impl fmt::Debug for MetadataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataScope::Module(_) => write!(f, "Module({})", self.name()),
            MetadataScope::ModuleReference(module_ref) => {
                write!(f, "ModuleReference({})", module_ref.name)
            }
            MetadataScope::AssemblyReference(assembly_ref) => {
                write!(f, "AssemblyReference({})", assembly_ref.name)
            }
        }
    }
}

/// Target of an exported type row
#[derive(Debug, Clone)]
pub enum ExportedTypeImplementation {
    /// Another file of this assembly
    File(Token),
    /// A type forwarded to another assembly
    AssemblyReference(AssemblyRefRc),
    /// Nested in another exported type
    ExportedType(Token),
}

/// An `ExportedType` row: a type this assembly exposes but does not define in this module
#[derive(Debug, Clone)]
pub struct ExportedType {
    /// `ExportedType` token
    pub token: Token,
    /// Type attributes
    pub flags: u32,
    /// Hint at the `TypeDef` row in the target module
    pub type_def_id: u32,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
    /// Where the type lives
    pub implementation: ExportedTypeImplementation,
}

/// Shared handle of an exported type
pub type ExportedTypeRc = Arc<ExportedType>;

impl ExportedType {
    /// True if this row forwards the type to another assembly
    #[must_use]
    pub fn is_forwarder(&self) -> bool {
        matches!(
            self.implementation,
            ExportedTypeImplementation::AssemblyReference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse() {
        assert_eq!(
            AssemblyVersion::parse("4.0.1").unwrap(),
            AssemblyVersion::new(4, 0, 1, 0)
        );
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        assert_eq!(AssemblyVersion::new(1, 2, 3, 4).to_string(), "1.2.3.4");
    }

    #[test]
    fn display_name_round_trip() {
        let name = "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";
        let reference = AssemblyNameReference::parse(name).unwrap();

        assert_eq!(reference.name, "mscorlib");
        assert_eq!(reference.version, AssemblyVersion::new(4, 0, 0, 0));
        assert_eq!(reference.culture, None);
        assert_eq!(
            reference.public_key_token(),
            Some([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89])
        );
        assert_eq!(reference.display_name(), name);
    }

    #[test]
    fn parse_rejects_bad_token() {
        assert!(AssemblyNameReference::parse("A, PublicKeyToken=abc").is_err());
        assert!(AssemblyNameReference::parse("A, PublicKeyToken=0011").is_err());
        assert!(AssemblyNameReference::parse(", Version=1.0").is_err());
    }

    #[test]
    fn token_from_public_key() {
        let mut reference = AssemblyNameReference::new("Lib", AssemblyVersion::default());
        reference.flags = AssemblyFlags::PUBLIC_KEY;
        reference.public_key_or_token = vec![0x00, 0x24, 0x00, 0x00, 0x04, 0x80];

        let hash = Sha1::digest(&reference.public_key_or_token);
        let token = reference.public_key_token().unwrap();
        assert_eq!(token[0], hash[19]);
        assert_eq!(token[7], hash[12]);
    }
}
