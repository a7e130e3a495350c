// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! # dotmeta
//!
//! A lazy reader for ECMA-335 (.NET) metadata.
//!
//! `dotmeta` turns the tables and heaps of one module into an object graph of types,
//! members, signatures and custom attributes, reading nothing until it is asked for.
//! Every node is addressed by its metadata token, materialized on first dereference and
//! cached, so two lookups of the same token return the same node.
//!
//! ## Features
//!
//! - **Lazy materialization** - rows, member lists and signatures are decoded on first access
//! - **Token identity** - each row maps to exactly one shared node
//! - **Re-entrant decoding** - signature decoding may look up further tokens of the module
//! - **Generic substitution** - resolve `!n`/`!!n` against a concrete instantiation
//! - **Cross-assembly resolution** - follow type references and forwarders into other modules
//!
//! ## Quick Start
//!
//! The reader consumes any [`metadata::image::MetadataImage`]. Containers (PE files) are
//! not parsed here; [`metadata::image::MemoryImage`] is built from the raw `#~` stream and
//! heaps, or synthesized with [`metadata::image::ImageBuilder`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use dotmeta::prelude::*;
//!
//! let mut builder = ImageBuilder::new();
//! let name = builder.string("Point");
//! let x = builder.string("X");
//! let int32 = builder.blob(&[0x06, 0x08]);
//! builder.row(TableId::TypeDef, &[0x0000_0001, name, 0, 0, 1, 1])?;
//! builder.row(TableId::Field, &[0x0006, x, int32])?;
//!
//! let reader = MetadataReader::new("Point.dll", Arc::new(builder.build()?), ReaderOptions::default());
//! let point = reader.lookup_token(Token::new(0x0200_0001))?.and_then(|item| item.as_type());
//! assert_eq!(point.map(|ty| ty.full_name()), Some("Point".to_string()));
//! # Ok::<(), dotmeta::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with the crate's [`Error`]. Malformed
//! metadata is reported as [`Error::Malformed`] or [`Error::OutOfBounds`]; a failed
//! materialization leaves the cache unchanged, so a later retry sees the same error.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotmeta::prelude::*;
///
/// let reader = MetadataReader::empty("Empty.dll");
/// assert!(reader.types()?.is_empty());
/// # Ok::<(), dotmeta::Error>(())
/// ```
pub mod prelude;

/// Reading, resolving and substituting .NET metadata
pub mod metadata;

pub(crate) mod utils;

/// `dotmeta` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotmeta` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Low-level byte parser over signature and heap data
pub use file::parser::Parser;
