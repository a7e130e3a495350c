//! Images and instrumentation shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};

use strum::EnumCount;

use crate::{
    metadata::{
        image::{ImageBuilder, MemoryImage, MetadataImage},
        tables::{TableId, TableInfo},
    },
    Result,
};

/// A [`MemoryImage`] that counts how often each table's rows are handed out.
///
/// Used to check that scans run once and that lookups touch only the tables they need.
pub struct CountingImage {
    inner: MemoryImage,
    reads: Vec<AtomicU32>,
}

impl CountingImage {
    pub fn new(inner: MemoryImage) -> Self {
        CountingImage {
            inner,
            reads: (0..TableId::COUNT).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// How often the rows of `table` were requested
    pub fn reads(&self, table: TableId) -> u32 {
        self.reads[table as usize].load(Ordering::Relaxed)
    }

    /// Sum over all tables
    pub fn total_reads(&self) -> u32 {
        self.reads
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    pub fn reset(&self) {
        for count in &self.reads {
            count.store(0, Ordering::Relaxed);
        }
    }
}

impl MetadataImage for CountingImage {
    fn table_info(&self) -> &TableInfo {
        self.inner.table_info()
    }

    fn table_data(&self, table: TableId) -> Option<&[u8]> {
        self.reads[table as usize].fetch_add(1, Ordering::Relaxed);
        self.inner.table_data(table)
    }

    fn string(&self, index: u32) -> Result<&str> {
        self.inner.string(index)
    }

    fn blob(&self, index: u32) -> Result<&[u8]> {
        self.inner.blob(index)
    }

    fn guid(&self, index: u32) -> Result<Option<uguid::Guid>> {
        self.inner.guid(index)
    }

    fn user_string(&self, index: u32) -> Result<String> {
        self.inner.user_string(index)
    }
}

/// `Foo` with the single field `int32 value`: a `TypeDef` and a `Field` row
pub fn two_table_image() -> MemoryImage {
    let mut builder = ImageBuilder::new();
    let foo = builder.string("Foo");
    let value = builder.string("value");
    let int32 = builder.blob(&[0x06, 0x08]);

    builder
        .row(TableId::TypeDef, &[0, foo, 0, 0, 1, 1])
        .expect("TypeDef row");
    builder
        .row(TableId::Field, &[0, value, int32])
        .expect("Field row");
    builder.build().expect("image")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::reader::{MetadataReader, ReaderOptions};

    #[test]
    fn counts_table_requests() {
        let image = Arc::new(CountingImage::new(two_table_image()));
        let reader = MetadataReader::new("Foo.dll", image.clone(), ReaderOptions::default());

        reader.read_type(1).unwrap();
        assert!(image.reads(TableId::TypeDef) > 0);

        image.reset();
        let foo = reader.read_type(1).unwrap();
        assert_eq!(image.total_reads(), 0);
        assert_eq!(foo.fields().unwrap().len(), 1);
        assert!(image.reads(TableId::Field) > 0);
    }
}
