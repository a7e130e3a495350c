use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le_at,
    metadata::tables::{columns, CodedIndexType, Column, TableId},
    Result,
};

/// Heap-size flag of the `#~` header: `#Strings` indices are 4 bytes
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// Heap-size flag of the `#~` header: `#GUID` indices are 4 bytes
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// Heap-size flag of the `#~` header: `#Blob` indices are 4 bytes
pub const HEAP_LARGE_BLOB: u8 = 0x04;

/// Row count and index width of one table
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits needed to store the largest row id
    pub bits: u8,
    /// Whether simple indices into this table take 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Derive bit count and width from a row count
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Row counts of all tables plus every index width derived from them.
///
/// This is everything needed to compute the byte layout of a row.
#[derive(Clone, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    row_sizes: Vec<u32>,
    heap_sizes: u8,
}

impl TableInfo {
    /// Parse the row counts of a `#~` stream header.
    ///
    /// `data` starts at the stream; the valid bit vector sits at offset 8, the heap-size
    /// flags at offset 6 and the row counts from offset 24, one `u32` per present table.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated and
    /// [`crate::Error::NotSupported`] if it flags tables this reader does not know.
    pub fn from_header(data: &[u8]) -> Result<Self> {
        let mut offset = 6;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        let mut offset = 8;
        let valid = read_le_at::<u64>(data, &mut offset)?;

        if valid >> TableId::COUNT != 0 {
            return Err(crate::Error::NotSupported(format!(
                "Unknown metadata tables present - 0x{:016x}",
                valid
            )));
        }

        let mut offset = 24;
        let mut counts = Vec::new();
        for table in TableId::iter() {
            if valid & (1 << table as u8) != 0 {
                counts.push((table, read_le_at::<u32>(data, &mut offset)?));
            }
        }

        Ok(Self::new(&counts, heap_sizes))
    }

    /// Build from explicit `(table, rows)` pairs and the heap-size flags
    #[must_use]
    pub fn new(counts: &[(TableId, u32)], heap_sizes: u8) -> Self {
        let mut info = TableInfo {
            rows: vec![TableRowInfo::default(); TableId::COUNT],
            coded_indexes: vec![0; CodedIndexType::COUNT],
            row_sizes: vec![0; TableId::COUNT],
            heap_sizes,
        };

        for (table, rows) in counts {
            info.rows[*table as usize] = TableRowInfo::new(*rows);
        }

        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .flatten()
                .map(|table| info.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);
            info.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }

        for table in TableId::iter() {
            let size = columns(table)
                .iter()
                .map(|column| u32::from(info.column_bytes(*column)))
                .sum();
            info.row_sizes[table as usize] = size;
        }

        info
    }

    /// Row count and width of `table`
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Size in bytes of one row of `table`
    #[must_use]
    pub fn row_size(&self, table: TableId) -> u32 {
        self.row_sizes[table as usize]
    }

    /// The raw heap-size flags
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        self.heap_sizes
    }

    /// Width of `#Strings` indices
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.heap_sizes & HEAP_LARGE_STRINGS != 0 {
            4
        } else {
            2
        }
    }

    /// Width of `#GUID` indices
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.heap_sizes & HEAP_LARGE_GUID != 0 {
            4
        } else {
            2
        }
    }

    /// Width of `#Blob` indices
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.heap_sizes & HEAP_LARGE_BLOB != 0 {
            4
        } else {
            2
        }
    }

    /// Width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.rows[table as usize].bits > 16 {
            4
        } else {
            2
        }
    }

    /// Width of a coded index of kind `coded_index_type`
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        if self.coded_indexes[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    /// Width of any column
    #[must_use]
    pub fn column_bytes(&self, column: Column) -> u8 {
        match column {
            Column::U8 => 1,
            Column::U16 => 2,
            Column::U32 => 4,
            Column::Str => self.str_bytes(),
            Column::Guid => self.guid_bytes(),
            Column::Blob => self.blob_bytes(),
            Column::Table(table) => self.table_index_bytes(table),
            Column::Coded(kind) => self.coded_index_bytes(kind),
        }
    }
}
