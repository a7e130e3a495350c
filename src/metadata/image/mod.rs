//! The image collaborator: raw access to table rows and heaps.
//!
//! The reader never parses containers. It consumes anything implementing
//! [`MetadataImage`], which hands out the bytes of one table at a time and resolves heap
//! offsets. [`MemoryImage`] is the owned implementation built from the raw `#~` stream and
//! the heaps; [`ImageBuilder`] serializes synthetic tables into one.

mod builder;
mod cursor;

pub use builder::ImageBuilder;
pub use cursor::TableCursor;

use crate::{
    metadata::{
        streams::{Blob, Guid, Strings, UserStrings},
        tables::{TableId, TableInfo},
    },
    Result,
};

/// Read-only byte access to a module's metadata.
pub trait MetadataImage: Send + Sync {
    /// Row counts and index widths
    fn table_info(&self) -> &TableInfo;

    /// All rows of `table`, or `None` if the table is absent
    fn table_data(&self, table: TableId) -> Option<&[u8]>;

    /// The `#Strings` entry at `index`
    ///
    /// # Errors
    /// Fails if the index lies outside the heap or the data is not valid UTF-8.
    fn string(&self, index: u32) -> Result<&str>;

    /// The `#Blob` entry at `index`
    ///
    /// # Errors
    /// Fails if the index or the entry lies outside the heap.
    fn blob(&self, index: u32) -> Result<&[u8]>;

    /// The `#GUID` entry at 1-based `index`
    ///
    /// # Errors
    /// Fails if the index lies outside the heap.
    fn guid(&self, index: u32) -> Result<Option<uguid::Guid>>;

    /// The `#US` entry at `index`
    ///
    /// # Errors
    /// Fails if the index or the entry lies outside the heap.
    fn user_string(&self, index: u32) -> Result<String>;
}

/// An owned metadata image.
pub struct MemoryImage {
    info: TableInfo,
    tables: Vec<u8>,
    table_ranges: Vec<Option<(usize, usize)>>,
    strings: Vec<u8>,
    blobs: Vec<u8>,
    guids: Vec<u8>,
    user_strings: Vec<u8>,
}

impl MemoryImage {
    /// Build an image from a raw `#~` stream and the four heaps.
    ///
    /// Missing heaps may be passed as empty vectors; only index 0 is then readable.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the tables stream is shorter than its
    /// header claims, or any error of [`TableInfo::from_header`].
    pub fn new(
        tables: Vec<u8>,
        strings: Vec<u8>,
        blobs: Vec<u8>,
        guids: Vec<u8>,
        user_strings: Vec<u8>,
    ) -> Result<Self> {
        use strum::{EnumCount, IntoEnumIterator};

        let info = TableInfo::from_header(&tables)?;

        let valid = u64::from_le_bytes(
            tables
                .get(8..16)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(out_of_bounds_error!())?,
        );
        // Present-but-empty tables still occupy a row count slot
        let mut offset = 24 + valid.count_ones() as usize * 4;

        let mut table_ranges = vec![None; TableId::COUNT];
        for table in TableId::iter() {
            let rows = info.rows(table);
            if rows == 0 {
                continue;
            }

            let size = rows as usize * info.row_size(table) as usize;
            if offset + size > tables.len() {
                return Err(out_of_bounds_error!());
            }

            table_ranges[table as usize] = Some((offset, offset + size));
            offset += size;
        }

        Ok(MemoryImage {
            info,
            tables,
            table_ranges,
            strings,
            blobs,
            guids,
            user_strings,
        })
    }
}

impl MetadataImage for MemoryImage {
    fn table_info(&self) -> &TableInfo {
        &self.info
    }

    fn table_data(&self, table: TableId) -> Option<&[u8]> {
        self.table_ranges[table as usize].map(|(start, end)| &self.tables[start..end])
    }

    fn string(&self, index: u32) -> Result<&str> {
        if index == 0 {
            return Ok("");
        }
        Strings::from(&self.strings)?.get(index as usize)
    }

    fn blob(&self, index: u32) -> Result<&[u8]> {
        if index == 0 {
            return Ok(&[]);
        }
        Blob::from(&self.blobs)?.get(index as usize)
    }

    fn guid(&self, index: u32) -> Result<Option<uguid::Guid>> {
        Guid::from(&self.guids).get(index as usize)
    }

    fn user_string(&self, index: u32) -> Result<String> {
        if index == 0 {
            return Ok(String::new());
        }
        UserStrings::from(&self.user_strings)?.get(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{CodedIndexType, TableId};

    #[test]
    fn builder_image_round_trip() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("Foo");
        let namespace = builder.string("Bar");
        let signature = builder.blob(&[0x06, 0x08]);
        let extends = CodedIndexType::TypeDefOrRef
            .encode(crate::metadata::token::Token::new(0x0100_0000))
            .unwrap();
        builder.row(TableId::TypeDef, &[0, name, namespace, extends, 1, 1]).unwrap();
        builder.row(TableId::Field, &[0x0006, name, signature]).unwrap();

        let image = builder.build().unwrap();
        assert_eq!(image.table_info().rows(TableId::TypeDef), 1);
        assert_eq!(image.table_info().rows(TableId::Field), 1);
        assert_eq!(image.table_data(TableId::TypeDef).unwrap().len(), 14);
        assert!(image.table_data(TableId::MethodDef).is_none());
        assert_eq!(image.string(name).unwrap(), "Foo");
        assert_eq!(image.string(0).unwrap(), "");
        assert_eq!(image.blob(signature).unwrap(), &[0x06, 0x08]);
    }

    #[test]
    fn truncated_tables() {
        let mut builder = ImageBuilder::new();
        builder.row(TableId::ModuleRef, &[0]).unwrap();
        let (mut tables, strings, blobs, guids, user_strings) = builder.into_streams().unwrap();
        tables.pop();

        assert!(MemoryImage::new(tables, strings, blobs, guids, user_strings).is_err());
    }
}
