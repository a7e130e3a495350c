use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        image::MetadataImage,
        tables::{CodedIndexType, Column, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// Position inside one table of an image.
///
/// This is the cursor every table scan moves. It is `Copy`, so saving and restoring it
/// around a nested lookup is a plain assignment.
#[derive(Clone, Copy)]
pub struct TableCursor<'a> {
    image: &'a dyn MetadataImage,
    table: Option<TableId>,
    data: &'a [u8],
    position: usize,
}

impl<'a> TableCursor<'a> {
    /// A cursor not yet positioned in any table
    #[must_use]
    pub fn new(image: &'a dyn MetadataImage) -> Self {
        TableCursor {
            image,
            table: None,
            data: &[],
            position: 0,
        }
    }

    /// The image this cursor reads from
    #[must_use]
    pub fn image(&self) -> &'a dyn MetadataImage {
        self.image
    }

    /// Index widths of the image
    #[must_use]
    pub fn info(&self) -> &'a TableInfo {
        self.image.table_info()
    }

    /// Table and byte offset, for diagnostics and save/restore checks
    #[must_use]
    pub fn position(&self) -> (Option<TableId>, usize) {
        (self.table, self.position)
    }

    /// Move to the first row of `table`, returning its row count
    pub fn move_to_table(&mut self, table: TableId) -> u32 {
        self.table = Some(table);
        self.data = self.image.table_data(table).unwrap_or(&[]);
        self.position = 0;
        self.info().rows(table)
    }

    /// Move to row `rid` of `table`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `rid` is 0 or beyond the table.
    pub fn move_to(&mut self, table: TableId, rid: u32) -> Result<()> {
        let rows = self.info().rows(table);
        if rid == 0 || rid > rows {
            return Err(malformed_error!(
                "Row {} outside of {:?} with {} rows",
                rid,
                table,
                rows
            ));
        }

        if self.table != Some(table) {
            self.move_to_table(table);
        }
        self.position = (rid - 1) as usize * self.info().row_size(table) as usize;
        Ok(())
    }

    /// Read one byte
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn read_u8(&mut self) -> Result<u8> {
        read_le_at::<u8>(self.data, &mut self.position)
    }

    /// Read a `u16`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn read_u16(&mut self) -> Result<u16> {
        read_le_at::<u16>(self.data, &mut self.position)
    }

    /// Read a `u32`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn read_u32(&mut self) -> Result<u32> {
        read_le_at::<u32>(self.data, &mut self.position)
    }

    /// Read a `#Strings` index and resolve it
    ///
    /// # Errors
    /// Fails on a truncated row or an invalid heap entry.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let is_large = self.info().str_bytes() == 4;
        let index = read_le_at_dyn(self.data, &mut self.position, is_large)?;
        self.image.string(index)
    }

    /// Read a `#Blob` index without resolving it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn read_blob_index(&mut self) -> Result<u32> {
        let is_large = self.info().blob_bytes() == 4;
        read_le_at_dyn(self.data, &mut self.position, is_large)
    }

    /// Read a `#GUID` index and resolve it
    ///
    /// # Errors
    /// Fails on a truncated row or an index past the heap.
    pub fn read_guid(&mut self) -> Result<Option<uguid::Guid>> {
        let is_large = self.info().guid_bytes() == 4;
        let index = read_le_at_dyn(self.data, &mut self.position, is_large)?;
        self.image.guid(index)
    }

    /// Read a simple row index into `table`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn read_table_index(&mut self, table: TableId) -> Result<u32> {
        let is_large = self.info().table_index_bytes(table) == 4;
        read_le_at_dyn(self.data, &mut self.position, is_large)
    }

    /// Read a coded index and split it into a token
    ///
    /// # Errors
    /// Fails on a truncated row or a tag naming a table the kind does not allow.
    pub fn read_coded_index(&mut self, kind: CodedIndexType) -> Result<Token> {
        let is_large = self.info().coded_index_bytes(kind) == 4;
        let value = read_le_at_dyn(self.data, &mut self.position, is_large)?;
        kind.decode(value)
    }

    /// Skip one column of the given kind
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the table.
    pub fn skip(&mut self, column: Column) -> Result<()> {
        let width = usize::from(self.info().column_bytes(column));
        if self.position + width > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        self.position += width;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::image::ImageBuilder;

    #[test]
    fn moves_and_reads() {
        let mut builder = ImageBuilder::new();
        let first = builder.string("First");
        let second = builder.string("Second");
        builder.row(TableId::ModuleRef, &[first]).unwrap();
        builder.row(TableId::ModuleRef, &[second]).unwrap();
        let image = builder.build().unwrap();

        let mut cursor = TableCursor::new(&image);
        assert_eq!(cursor.move_to_table(TableId::ModuleRef), 2);
        assert_eq!(cursor.read_string().unwrap(), "First");
        assert_eq!(cursor.read_string().unwrap(), "Second");

        cursor.move_to(TableId::ModuleRef, 2).unwrap();
        assert_eq!(cursor.position(), (Some(TableId::ModuleRef), 2));
        assert_eq!(cursor.read_string().unwrap(), "Second");
    }

    #[test]
    fn out_of_range_row() {
        let image = ImageBuilder::new().build().unwrap();
        let mut cursor = TableCursor::new(&image);

        assert!(cursor.move_to(TableId::TypeDef, 1).is_err());
        assert!(cursor.move_to(TableId::TypeDef, 0).is_err());
        assert_eq!(cursor.move_to_table(TableId::TypeDef), 0);
        assert!(cursor.read_u16().is_err());
    }
}
