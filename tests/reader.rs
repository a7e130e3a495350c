//! Integration tests for lazy materialization through the public reader API.
//!
//! Every test synthesizes its image with `ImageBuilder`, so the expected graph is fully
//! described next to the assertions.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use dotmeta::{
    metadata::{
        image::{ImageBuilder, MemoryImage, MetadataImage},
        reader::{MetadataItem, MetadataReader, ReaderOptions},
        resolver::MetadataResolver,
        tables::{CodedIndexType, FieldAttributes, PInvokeAttributes, TableId, TableInfo},
        token::Token,
        typesystem::{CilType, MemberSignature, PrimitiveKind, PrimitiveValue},
    },
    Error, Result,
};

/// Counts how often the rows of the `Field` table are handed out
struct FieldCounter {
    inner: MemoryImage,
    field_reads: AtomicU32,
}

impl MetadataImage for FieldCounter {
    fn table_info(&self) -> &TableInfo {
        self.inner.table_info()
    }

    fn table_data(&self, table: TableId) -> Option<&[u8]> {
        if table == TableId::Field {
            self.field_reads.fetch_add(1, Ordering::Relaxed);
        }
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

fn reader(builder: ImageBuilder) -> Result<Arc<MetadataReader>> {
    Ok(MetadataReader::new(
        "Test.dll",
        Arc::new(builder.build()?),
        ReaderOptions::default(),
    ))
}

/// `Foo` with one field `int32 value`
fn foo_image() -> Result<ImageBuilder> {
    let mut b = ImageBuilder::new();
    let foo = b.string("Foo");
    let value = b.string("value");
    let int32 = b.blob(&[0x06, 0x08]);
    b.row(TableId::TypeDef, &[0, foo, 0, 0, 1, 1])?;
    b.row(TableId::Field, &[0, value, int32])?;
    Ok(b)
}

/// Reading the single type of a two-table image yields `Foo` whose field type is the
/// module's `Int32` node, the same node on every access.
#[test]
fn test_two_table_image_end_to_end() -> Result<()> {
    let reader = reader(foo_image()?)?;

    let foo = reader.read_type(1)?;
    assert_eq!(foo.name, "Foo");

    let fields = foo.fields()?;
    assert_eq!(fields.len(), 1);
    let field = fields.get(0).expect("one field");
    assert_eq!(field.name, "value");
    assert_eq!(field.field_type.primitive_kind(), Some(PrimitiveKind::Int32));
    assert_eq!(field.field_type, reader.primitive_type(PrimitiveKind::Int32)?);

    let again = reader.read_type(1)?;
    assert!(Arc::ptr_eq(&foo, &again));
    assert_eq!(
        again.fields()?.get(0).map(|field| field.field_type.clone()),
        Some(field.field_type.clone())
    );
    Ok(())
}

/// The field collection is materialized once; later reads neither rescan nor rebuild it.
#[test]
fn test_field_collection_is_read_once() -> Result<()> {
    let image = Arc::new(FieldCounter {
        inner: foo_image()?.build()?,
        field_reads: AtomicU32::new(0),
    });
    let reader = MetadataReader::new("Foo.dll", image.clone(), ReaderOptions::default());

    let foo = reader.read_type(1)?;
    let first = foo.fields()?;
    let reads = image.field_reads.load(Ordering::Relaxed);
    assert!(reads > 0);

    let second = foo.fields()?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(image.field_reads.load(Ordering::Relaxed), reads);

    let by_token = reader.lookup_token(Token::from_parts(TableId::Field, 1))?;
    let Some(MetadataItem::Field(field)) = by_token else {
        panic!("expected a field");
    };
    assert!(first.get(0).is_some_and(|first| Arc::ptr_eq(&field, first)));
    Ok(())
}

/// A member reference into a type nobody has touched yet materializes that type first
/// and then matches the referenced field.
#[test]
fn test_member_reference_materializes_owner() -> Result<()> {
    let mut b = foo_image()?;
    let parent = CodedIndexType::MemberRefParent.encode(Token::from_parts(TableId::TypeDef, 1))?;
    let value = b.string("value");
    let int32 = b.blob(&[0x06, 0x08]);
    b.row(TableId::MemberRef, &[parent, value, int32])?;
    let reader = reader(b)?;

    let Some(MetadataItem::MemberReference(reference)) =
        reader.lookup_token(Token::from_parts(TableId::MemberRef, 1))?
    else {
        panic!("expected a member reference");
    };
    assert!(reference.is_field());
    let Some(CilType::Definition(owner)) = reference.declaring_type() else {
        panic!("expected a definition parent");
    };
    let owner = owner.upgrade().expect("owner is cached");
    assert!(Arc::ptr_eq(&owner, &reader.read_type(1)?));

    let field = MetadataResolver::local()
        .resolve_field(&reference)?
        .expect("field resolves locally");
    assert!(owner
        .fields()?
        .get(0)
        .is_some_and(|owned| Arc::ptr_eq(&field, owned)));
    Ok(())
}

/// Bad tokens fail without poisoning the module.
#[test]
fn test_malformed_tokens_leave_reader_usable() -> Result<()> {
    let reader = reader(foo_image()?)?;

    assert!(matches!(
        reader.lookup_token(Token::from_parts(TableId::TypeDef, 7)),
        Err(Error::Malformed { .. })
    ));
    assert!(reader.lookup_token(Token::from_parts(TableId::TypeDef, 0))?.is_none());
    assert_eq!(reader.read_type(1)?.name, "Foo");
    Ok(())
}

/// Signatures nested deeper than the configured limit fail with the limit.
#[test]
fn test_signature_depth_limit() -> Result<()> {
    let mut b = ImageBuilder::new();
    let deep = b.string("Deep");
    let jagged = b.string("jagged");
    // FIELD int32[][][][][]
    let signature = b.blob(&[0x06, 0x1D, 0x1D, 0x1D, 0x1D, 0x1D, 0x08]);
    b.row(TableId::TypeDef, &[0, deep, 0, 0, 1, 1])?;
    b.row(TableId::Field, &[0, jagged, signature])?;

    let reader = MetadataReader::new(
        "Deep.dll",
        Arc::new(b.build()?),
        ReaderOptions::default().with_max_signature_depth(3),
    );
    let deep = reader.read_type(1)?;
    assert!(matches!(deep.fields(), Err(Error::RecursionLimit(3))));
    Ok(())
}

/// Nested types hang off their enclosing type and are not found as top-level types.
#[test]
fn test_nested_types() -> Result<()> {
    let mut b = ImageBuilder::new();
    let namespace = b.string("Shapes");
    let outer = b.string("Outer");
    let inner = b.string("Inner");
    b.row(TableId::TypeDef, &[0x1, outer, namespace, 0, 1, 1])?;
    b.row(TableId::TypeDef, &[0x2, inner, 0, 0, 1, 1])?;
    b.row(TableId::NestedClass, &[2, 1])?;
    let reader = reader(b)?;

    let outer = reader.get_type("Shapes", "Outer")?.expect("top-level type");
    let nested = outer.nested_types()?;
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].full_name(), "Shapes.Outer/Inner");
    assert!(Arc::ptr_eq(
        &nested[0].declaring_type()?.expect("declaring type"),
        &outer
    ));
    assert!(reader.get_type("", "Inner")?.is_none());
    assert_eq!(reader.types()?.len(), 2);
    Ok(())
}

/// Method parameters, class layout, platform invoke and user strings.
#[test]
fn test_method_details() -> Result<()> {
    let mut b = ImageBuilder::new();
    let native = b.string("Native");
    b.row(TableId::TypeDef, &[0x0000_0108, native, 0, 0, 1, 1])?;
    b.row(TableId::ClassLayout, &[4, 16, 1])?;

    // DEFAULT, 2 params, returns int32, takes string and int32
    let signature = b.blob(&[0x00, 0x02, 0x08, 0x0E, 0x08]);
    let beep = b.string("Beep");
    b.row(TableId::MethodDef, &[0, 0, 0x2016, beep, signature, 1])?;
    let text = b.string("text");
    b.row(TableId::Param, &[0, 1, text])?;

    let kernel32 = b.string("kernel32.dll");
    b.row(TableId::ModuleRef, &[kernel32])?;
    let forwarded = CodedIndexType::MemberForwarded.encode(Token::from_parts(TableId::MethodDef, 1))?;
    let entry = b.string("BeepW");
    let flags = PInvokeAttributes::CHAR_SET_UNICODE | PInvokeAttributes::CALL_CONV_WINAPI;
    b.row(TableId::ImplMap, &[u32::from(flags.bits()), forwarded, entry, 1])?;

    let greeting = b.user_string("hello");
    let reader = reader(b)?;

    let native = reader.read_type(1)?;
    let layout = native.class_layout()?.expect("class layout");
    assert_eq!((layout.packing_size, layout.class_size), (4, 16));

    let methods = native.methods()?;
    let beep = methods.get(0).expect("one method");
    let parameters = beep.parameters()?;
    assert_eq!(parameters.parameters.len(), 2);
    assert_eq!(parameters.parameters[0].name, "text");
    assert!(parameters.parameters[1].token.is_null());
    assert_eq!(
        parameters.parameters[1].parameter_type.primitive_kind(),
        Some(PrimitiveKind::Int32)
    );

    let pinvoke = beep.pinvoke_info()?.expect("implementation map");
    assert_eq!(pinvoke.entry_point, "BeepW");
    assert_eq!(pinvoke.module.name, "kernel32.dll");
    assert_eq!(pinvoke.flags, flags);

    assert_eq!(
        reader.user_string(Token::new(0x7000_0000 | greeting))?,
        Some("hello".to_string())
    );
    Ok(())
}

/// Literal fields expose their constant; a member reference to a method has a method
/// signature.
#[test]
fn test_constants_and_member_signatures() -> Result<()> {
    let mut b = ImageBuilder::new();
    let limits = b.string("Limits");
    b.row(TableId::TypeDef, &[0, limits, 0, 0, 1, 1])?;
    let max = b.string("Max");
    let int64 = b.blob(&[0x06, 0x0A]);
    let flags = FieldAttributes::STATIC | FieldAttributes::LITERAL | FieldAttributes::HAS_DEFAULT;
    b.row(TableId::Field, &[u32::from(flags), max, int64])?;
    let value = b.blob(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
    let field = CodedIndexType::HasConstant.encode(Token::from_parts(TableId::Field, 1))?;
    b.row(TableId::Constant, &[0x0A, 0, field, value])?;

    let parent = CodedIndexType::MemberRefParent.encode(Token::from_parts(TableId::TypeDef, 1))?;
    let check = b.string("Check");
    let signature = b.blob(&[0x00, 0x00, 0x01]);
    b.row(TableId::MemberRef, &[parent, check, signature])?;
    let reader = reader(b)?;

    let limits = reader.read_type(1)?;
    let max = limits.fields()?.get(0).cloned().expect("one field");
    assert_eq!(max.constant()?, Some(PrimitiveValue::I8(i64::MAX)));

    let Some(MetadataItem::MemberReference(check)) =
        reader.lookup_token(Token::from_parts(TableId::MemberRef, 1))?
    else {
        panic!("expected a member reference");
    };
    assert!(matches!(check.signature()?, MemberSignature::Method(_)));
    Ok(())
}
