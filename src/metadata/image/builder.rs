use std::collections::{BTreeMap, HashMap};

use crate::{
    file::io::{write_le, write_le_dyn},
    metadata::{
        image::MemoryImage,
        tables::{
            columns, Column, TableId, TableInfo, HEAP_LARGE_BLOB, HEAP_LARGE_GUID,
            HEAP_LARGE_STRINGS,
        },
        token::Token,
    },
    utils::write_compressed_uint,
    Result,
};

/// Serializes synthetic tables and heaps into a [`MemoryImage`].
///
/// Rows are given as one raw `u32` per column in schema order: heap offsets as returned
/// by [`ImageBuilder::string`] and friends, simple indices as row ids, coded indices
/// already packed with [`crate::metadata::tables::CodedIndexType::encode`].
///
/// ```rust
/// use dotmeta::metadata::{image::{ImageBuilder, MetadataImage}, tables::TableId};
///
/// let mut builder = ImageBuilder::new();
/// let name = builder.string("Foo");
/// builder.row(TableId::ModuleRef, &[name])?;
/// let image = builder.build()?;
/// assert_eq!(image.table_info().rows(TableId::ModuleRef), 1);
/// # Ok::<(), dotmeta::Error>(())
/// ```
pub struct ImageBuilder {
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    blobs: Vec<u8>,
    guids: Vec<u8>,
    user_strings: Vec<u8>,
    rows: BTreeMap<TableId, Vec<Vec<u32>>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// Start with empty heaps and no rows
    #[must_use]
    pub fn new() -> Self {
        ImageBuilder {
            strings: vec![0],
            string_offsets: HashMap::new(),
            blobs: vec![0],
            guids: Vec::new(),
            user_strings: vec![0],
            rows: BTreeMap::new(),
        }
    }

    /// Intern a string, returning its `#Strings` offset
    #[allow(clippy::cast_possible_truncation)]
    pub fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.string_offsets.get(value) {
            return *offset;
        }

        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(value.to_string(), offset);
        offset
    }

    /// Append a blob, returning its `#Blob` offset
    #[allow(clippy::cast_possible_truncation)]
    pub fn blob(&mut self, value: &[u8]) -> u32 {
        let offset = self.blobs.len() as u32;
        // blobs above 512 MiB are not representable
        let _ = write_compressed_uint(value.len() as u32, &mut self.blobs);
        self.blobs.extend_from_slice(value);
        offset
    }

    /// Append a GUID, returning its 1-based `#GUID` index
    #[allow(clippy::cast_possible_truncation)]
    pub fn guid(&mut self, value: [u8; 16]) -> u32 {
        self.guids.extend_from_slice(&value);
        (self.guids.len() / 16) as u32
    }

    /// Append a user string, returning its `#US` offset
    #[allow(clippy::cast_possible_truncation)]
    pub fn user_string(&mut self, value: &str) -> u32 {
        let offset = self.user_strings.len() as u32;
        let units: Vec<u16> = value.encode_utf16().collect();
        let _ = write_compressed_uint(units.len() as u32 * 2 + 1, &mut self.user_strings);
        for unit in units {
            write_le::<u16>(&mut self.user_strings, unit);
        }
        self.user_strings.push(0);
        offset
    }

    /// Append a row to `table`, returning its token
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the value count does not match the schema.
    #[allow(clippy::cast_possible_truncation)]
    pub fn row(&mut self, table: TableId, values: &[u32]) -> Result<Token> {
        if values.len() != columns(table).len() {
            return Err(malformed_error!(
                "{:?} expects {} columns, got {}",
                table,
                columns(table).len(),
                values.len()
            ));
        }

        let rows = self.rows.entry(table).or_default();
        rows.push(values.to_vec());
        Ok(Token::from_parts(table, rows.len() as u32))
    }

    /// Number of rows appended to `table` so far
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows.get(&table).map_or(0, |rows| rows.len() as u32)
    }

    /// Serialize into a tables stream plus the `#Strings`, `#Blob`, `#GUID` and `#US` heaps
    ///
    /// # Errors
    /// Fails if a value does not fit its column.
    #[allow(clippy::type_complexity)]
    pub fn into_streams(self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)> {
        let mut heap_sizes = 0;
        if self.strings.len() > 0xFFFF {
            heap_sizes |= HEAP_LARGE_STRINGS;
        }
        if self.guids.len() / 16 > 0xFFFF {
            heap_sizes |= HEAP_LARGE_GUID;
        }
        if self.blobs.len() > 0xFFFF {
            heap_sizes |= HEAP_LARGE_BLOB;
        }

        #[allow(clippy::cast_possible_truncation)]
        let counts: Vec<(TableId, u32)> = self
            .rows
            .iter()
            .map(|(table, rows)| (*table, rows.len() as u32))
            .collect();
        let info = TableInfo::new(&counts, heap_sizes);

        let mut stream = Vec::new();
        write_le::<u32>(&mut stream, 0);
        write_le::<u8>(&mut stream, 2);
        write_le::<u8>(&mut stream, 0);
        write_le::<u8>(&mut stream, heap_sizes);
        write_le::<u8>(&mut stream, 1);
        let valid = counts
            .iter()
            .fold(0u64, |valid, (table, _)| valid | (1 << *table as u8));
        write_le::<u64>(&mut stream, valid);
        write_le::<u64>(&mut stream, 0);
        for (_, rows) in &counts {
            write_le::<u32>(&mut stream, *rows);
        }

        for (table, rows) in &self.rows {
            for row in rows {
                for (column, value) in columns(*table).iter().zip(row) {
                    write_column(&mut stream, &info, *column, *value)?;
                }
            }
        }

        Ok((
            stream,
            self.strings,
            self.blobs,
            self.guids,
            self.user_strings,
        ))
    }

    /// Serialize and parse back into a [`MemoryImage`]
    ///
    /// # Errors
    /// Fails if a value does not fit its column.
    pub fn build(self) -> Result<MemoryImage> {
        let (tables, strings, blobs, guids, user_strings) = self.into_streams()?;
        MemoryImage::new(tables, strings, blobs, guids, user_strings)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_column(stream: &mut Vec<u8>, info: &TableInfo, column: Column, value: u32) -> Result<()> {
    let width = info.column_bytes(column);
    let limit = match width {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => u32::MAX,
    };
    if value > limit {
        return Err(malformed_error!(
            "Value 0x{:x} does not fit column {:?}",
            value,
            column
        ));
    }

    match width {
        1 => write_le::<u8>(stream, value as u8),
        w => write_le_dyn(stream, value, w == 4),
    }
    Ok(())
}
