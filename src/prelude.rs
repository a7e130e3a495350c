//! # dotmeta Prelude
//!
//! The most commonly used types of the crate, for glob imports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotmeta operations
pub use crate::Error;

/// The result type used throughout dotmeta
pub use crate::Result;

/// Low-level byte parser
pub use crate::Parser;

// ================================================================================================
// Images and Tables
// ================================================================================================

pub use crate::metadata::image::{ImageBuilder, MemoryImage, MetadataImage};
pub use crate::metadata::tables::{CodedIndexType, TableId, TableInfo};
pub use crate::metadata::token::Token;

// ================================================================================================
// Reader
// ================================================================================================

pub use crate::metadata::reader::{MetadataItem, MetadataReader, ModuleRc, ReaderOptions};

// ================================================================================================
// Type System
// ================================================================================================

pub use crate::metadata::typesystem::{
    CilType, EventRc, FieldRc, GenericParamRc, GenericParameterKind, GenericParameterOwner,
    MemberRefRc, MemberSignature, MethodDefRc, MethodHandle, MethodSignature, PrimitiveKind,
    PrimitiveValue, PropertyRc, TypeDefRc, TypeRefRc, TypeSpecKind,
};

// ================================================================================================
// Generics and Resolution
// ================================================================================================

pub use crate::metadata::resolver::{are_same_type, AssemblyResolver, AssemblySet, MetadataResolver};
pub use crate::metadata::substitution::GenericSubstitution;

// ================================================================================================
// Attributes and Signatures
// ================================================================================================

pub use crate::metadata::customattributes::{
    CustomAttributeArgument, CustomAttributeRc, CustomAttributeValue,
};
pub use crate::metadata::security::{SecurityAction, SecurityDeclRc};
pub use crate::metadata::signatures::{TypeSignature, ELEMENT_TYPE};
