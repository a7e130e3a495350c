//! Low-level byte access shared by the heap views and blob decoders.
//!
//! - [`io`] - Fixed-width little- and big-endian reads and writes at an offset
//! - [`parser`] - A forward cursor with the ECMA-335 compressed encodings

pub mod io;
pub mod parser;
