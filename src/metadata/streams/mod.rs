//! Views over the four metadata heaps.

mod blob;
mod guid;
mod strings;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use strings::Strings;
pub use userstrings::{decode_utf16, UserStrings};
