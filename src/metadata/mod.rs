//! Lazy metadata reading for .NET modules.
//!
//! This module contains everything between the raw bytes of a module's metadata and the
//! object graph a consumer walks. It is organized bottom-up:
//!
//! # Key Components
//!
//! - [`image`] - The image collaborator: table rows and heaps, plus an in-memory builder
//! - [`tables`] - Table identifiers, coded indices, row layouts and attribute flags
//! - [`token`] and [`range`] - Row handles and owner-to-children row ranges
//! - [`signatures`] - Token-level decoding of signature blobs
//! - [`reader`] - The [`reader::MetadataReader`], materializing rows on first access
//! - [`typesystem`] - The graph nodes: types, members, generic parameters, scopes
//! - [`substitution`] - Replacing generic parameters by the arguments of an instantiation
//! - [`resolver`] - Following references into other modules and assemblies
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
//! let name = builder.string("Program");
//! let namespace = builder.string("Demo");
//! builder.row(TableId::TypeDef, &[0x0010_0001, name, namespace, 0, 1, 1])?;
//!
//! let reader = MetadataReader::new("Demo.dll", Arc::new(builder.build()?), ReaderOptions::default());
//! let program = reader.get_type("Demo", "Program")?.expect("defined above");
//! assert_eq!(program.full_name(), "Demo.Program");
//! # Ok::<(), dotmeta::Error>(())
//! ```

/// Identity caches and lazily materialized slots
pub mod cache;
/// Custom attribute rows and the decoding of their value blobs
pub mod customattributes;
/// Raw access to table rows and heaps
pub mod image;
/// Native marshalling descriptors
pub mod marshalling;
/// Owner to child row ranges
pub mod range;
/// Lazy, token-addressed materialization of one module
pub mod reader;
/// Resolution of references across modules and assemblies
pub mod resolver;
/// Declarative security
pub mod security;
/// Signature blob decoding
pub mod signatures;
/// Views over the metadata heaps
pub mod streams;
/// Generic parameter substitution
pub mod substitution;
/// Table identifiers, coded indices and row layouts
pub mod tables;
/// Metadata tokens
pub mod token;
/// The materialized object graph
pub mod typesystem;
