//! Table identifiers, coded indices and row layouts.

mod codedindex;
mod flags;
mod schema;
mod tableid;
mod tableinfo;

pub use codedindex::CodedIndexType;
pub use flags::*;
pub use schema::{columns, Column};
pub use tableid::TableId;
pub use tableinfo::{
    TableInfo, TableRowInfo, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS,
};
