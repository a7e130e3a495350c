//! Integration tests for resolving references across modules and assemblies.
//!
//! The fixture is a small world of four modules:
//! - `Lib`, defining `Lib.Gadget` and `Lib.Widget : Gadget`, and forwarding `Lib.Moved`
//!   to `Core`
//! - `Core`, defining `Lib.Moved`
//! - `Helpers.netmodule`, a module without an assembly manifest, defining `Helpers.Util`
//! - `App`, referencing all of the above plus an assembly nobody provides

use std::sync::Arc;

use dotmeta::{
    metadata::{
        image::ImageBuilder,
        reader::{MetadataItem, MetadataReader, ModuleRc, ReaderOptions},
        resolver::{are_same_type, AssemblyResolver, AssemblySet, MetadataResolver},
        tables::{CodedIndexType, TableId},
        token::Token,
        typesystem::{AssemblyNameReference, MemberRefRc, PrimitiveKind, TypeRefRc},
    },
    Result,
};

fn open(name: &str, builder: ImageBuilder, options: ReaderOptions) -> Result<ModuleRc> {
    Ok(MetadataReader::new(name, Arc::new(builder.build()?), options))
}

fn assembly_row(b: &mut ImageBuilder, name: &str) -> Result<()> {
    let name = b.string(name);
    b.row(TableId::Assembly, &[0x8004, 1, 0, 0, 0, 0, 0, name, 0])?;
    Ok(())
}

fn library() -> Result<ModuleRc> {
    let mut b = ImageBuilder::new();
    assembly_row(&mut b, "Lib")?;
    let core = b.string("Core");
    b.row(TableId::AssemblyRef, &[1, 0, 0, 0, 0, 0, core, 0, 0])?;

    let namespace = b.string("Lib");
    let gadget = b.string("Gadget");
    let widget = b.string("Widget");
    let extends = CodedIndexType::TypeDefOrRef.encode(Token::from_parts(TableId::TypeDef, 1))?;
    b.row(TableId::TypeDef, &[0x0000_0001, gadget, namespace, 0, 1, 1])?;
    b.row(TableId::TypeDef, &[0x0000_0001, widget, namespace, extends, 1, 2])?;

    let count = b.string("Count");
    let int32 = b.blob(&[0x06, 0x08]);
    b.row(TableId::Field, &[0x0006, count, int32])?;

    let reset = b.string("Reset");
    // HASTHIS, 0 params, VOID
    let reset_sig = b.blob(&[0x20, 0x00, 0x01]);
    b.row(TableId::MethodDef, &[0, 0, 0x0006, reset, reset_sig, 1])?;
    let spin = b.string("Spin");
    // HASTHIS, 1 param, VOID, I4
    let spin_sig = b.blob(&[0x20, 0x01, 0x01, 0x08]);
    b.row(TableId::MethodDef, &[0, 0, 0x0006, spin, spin_sig, 1])?;

    let moved = b.string("Moved");
    let target = CodedIndexType::Implementation.encode(Token::from_parts(TableId::AssemblyRef, 1))?;
    b.row(TableId::ExportedType, &[0x0020_0000, 0, moved, namespace, target])?;

    open("Lib.dll", b, ReaderOptions::default())
}

fn core() -> Result<ModuleRc> {
    let mut b = ImageBuilder::new();
    assembly_row(&mut b, "Core")?;
    let namespace = b.string("Lib");
    let moved = b.string("Moved");
    b.row(TableId::TypeDef, &[0x0000_0001, moved, namespace, 0, 1, 1])?;
    open("Core.dll", b, ReaderOptions::default())
}

fn helpers() -> Result<ModuleRc> {
    let mut b = ImageBuilder::new();
    let file = b.string("Helpers.netmodule");
    let mvid = b.guid([7; 16]);
    b.row(TableId::Module, &[0, file, mvid, 0, 0])?;
    let namespace = b.string("Helpers");
    let util = b.string("Util");
    b.row(TableId::TypeDef, &[0x0000_0001, util, namespace, 0, 1, 1])?;
    open("helpers-on-disk.bin", b, ReaderOptions::default())
}

/// `App` with type references 1..=4 to `Lib.Widget`, `Lib.Moved`, `Ghost.Thing` and
/// `Helpers.Util`, and member references to `Widget::Count`, `Widget::Spin(int)`, the
/// inherited `Widget::Reset()`, the missing `Widget::Spin(string)` and `Widget::Spin(int)`
/// without the instance flag
fn app(options: ReaderOptions) -> Result<ModuleRc> {
    let mut b = ImageBuilder::new();
    assembly_row(&mut b, "App")?;
    let lib = b.string("Lib");
    let ghost = b.string("Ghost");
    b.row(TableId::AssemblyRef, &[1, 0, 0, 0, 0, 0, lib, 0, 0])?;
    b.row(TableId::AssemblyRef, &[1, 0, 0, 0, 0, 0, ghost, 0, 0])?;
    let helpers = b.string("Helpers.netmodule");
    b.row(TableId::ModuleRef, &[helpers])?;

    let in_lib = CodedIndexType::ResolutionScope.encode(Token::from_parts(TableId::AssemblyRef, 1))?;
    let in_ghost =
        CodedIndexType::ResolutionScope.encode(Token::from_parts(TableId::AssemblyRef, 2))?;
    let in_helpers =
        CodedIndexType::ResolutionScope.encode(Token::from_parts(TableId::ModuleRef, 1))?;
    let namespace = b.string("Lib");
    let widget = b.string("Widget");
    let moved = b.string("Moved");
    let ghost_namespace = b.string("Ghost");
    let thing = b.string("Thing");
    let helpers_namespace = b.string("Helpers");
    let util = b.string("Util");
    b.row(TableId::TypeRef, &[in_lib, widget, namespace])?;
    b.row(TableId::TypeRef, &[in_lib, moved, namespace])?;
    b.row(TableId::TypeRef, &[in_ghost, thing, ghost_namespace])?;
    b.row(TableId::TypeRef, &[in_helpers, util, helpers_namespace])?;

    let parent = CodedIndexType::MemberRefParent.encode(Token::from_parts(TableId::TypeRef, 1))?;
    let count = b.string("Count");
    let int32 = b.blob(&[0x06, 0x08]);
    b.row(TableId::MemberRef, &[parent, count, int32])?;
    let spin = b.string("Spin");
    let spin_sig = b.blob(&[0x20, 0x01, 0x01, 0x08]);
    b.row(TableId::MemberRef, &[parent, spin, spin_sig])?;
    let reset = b.string("Reset");
    let reset_sig = b.blob(&[0x20, 0x00, 0x01]);
    b.row(TableId::MemberRef, &[parent, reset, reset_sig])?;
    // Spin(string) does not exist
    let wrong_sig = b.blob(&[0x20, 0x01, 0x01, 0x0E]);
    b.row(TableId::MemberRef, &[parent, spin, wrong_sig])?;
    // DEFAULT, 1 param, VOID, I4
    let static_sig = b.blob(&[0x00, 0x01, 0x01, 0x08]);
    b.row(TableId::MemberRef, &[parent, spin, static_sig])?;

    open("App.exe", b, options)
}

/// Every module except `App`
fn world() -> Result<Arc<AssemblySet>> {
    let assemblies = Arc::new(AssemblySet::new());
    assemblies.add(library()?)?;
    assemblies.add(core()?)?;
    assemblies.add(helpers()?)?;
    Ok(assemblies)
}

fn type_reference(module: &ModuleRc, rid: u32) -> Result<TypeRefRc> {
    module.read_type_reference(rid)
}

fn member_reference(module: &ModuleRc, rid: u32) -> Result<MemberRefRc> {
    match module.lookup_token(Token::from_parts(TableId::MemberRef, rid))? {
        Some(MetadataItem::MemberReference(reference)) => Ok(reference),
        other => panic!("expected a member reference, got {other:?}"),
    }
}

/// The set indexes manifests by assembly name and plain modules by file name.
#[test]
fn test_assembly_set_lookup() -> Result<()> {
    let assemblies = world()?;
    assert_eq!(assemblies.len(), 3);

    let lib = AssemblyNameReference::parse("lib, Version=1.0.0.0")?;
    let found = assemblies.resolve(&lib).expect("case-insensitive match");
    assert_eq!(found.name(), "Lib.dll");

    let missing = AssemblyNameReference::parse("Ghost")?;
    assert!(assemblies.resolve(&missing).is_none());
    Ok(())
}

/// A type reference scoped to an assembly reference lands on the definition in that
/// assembly.
#[test]
fn test_resolve_across_assemblies() -> Result<()> {
    let assemblies = world()?;
    let app = app(ReaderOptions::default())?;
    let resolver = MetadataResolver::new(assemblies.clone());

    let widget = resolver
        .resolve_reference(&type_reference(&app, 1)?)?
        .expect("Lib.Widget");
    assert_eq!(widget.full_name(), "Lib.Widget");

    let lib = assemblies
        .resolve(&AssemblyNameReference::parse("Lib")?)
        .expect("Lib is loaded");
    assert!(Arc::ptr_eq(&widget, &lib.read_type(2)?));
    Ok(())
}

/// Forwarded types are followed to the assembly that defines them.
#[test]
fn test_resolve_through_forwarder() -> Result<()> {
    let app = app(ReaderOptions::default())?;
    let resolver = MetadataResolver::new(world()?);

    let moved = resolver
        .resolve_reference(&type_reference(&app, 2)?)?
        .expect("forwarded to Core");
    let owner = moved.module().expect("module is alive");
    assert_eq!(owner.name(), "Core.dll");
    Ok(())
}

/// Module references are matched by the module's own name, not the name it was opened
/// under.
#[test]
fn test_resolve_module_reference() -> Result<()> {
    let app = app(ReaderOptions::default())?;
    let resolver = MetadataResolver::new(world()?);

    let util = resolver
        .resolve_reference(&type_reference(&app, 4)?)?
        .expect("Helpers.Util");
    assert_eq!(util.full_name(), "Helpers.Util");
    Ok(())
}

/// Unavailable assemblies are not an error, with or without a resolver.
#[test]
fn test_missing_assembly() -> Result<()> {
    let app = app(ReaderOptions::default())?;
    let ghost = type_reference(&app, 3)?;

    assert!(MetadataResolver::new(world()?).resolve_reference(&ghost)?.is_none());
    assert!(MetadataResolver::local().resolve_reference(&ghost)?.is_none());
    Ok(())
}

/// Fields and methods are matched by name and signature, walking up the base types.
#[test]
fn test_resolve_members() -> Result<()> {
    let app = app(ReaderOptions::default())?;
    let resolver = MetadataResolver::new(world()?);

    let count = resolver
        .resolve_field(&*member_reference(&app, 1)?)?
        .expect("Widget::Count");
    assert_eq!(count.name, "Count");
    assert!(are_same_type(
        &count.field_type,
        &app.primitive_type(PrimitiveKind::Int32)?
    ));

    let spin = resolver
        .resolve_method(&*member_reference(&app, 2)?)?
        .expect("Widget::Spin(int)");
    assert_eq!(spin.declaring_type().map(|owner| owner.name.clone()), Some("Widget".into()));

    let reset = resolver
        .resolve_method(&*member_reference(&app, 3)?)?
        .expect("inherited from Gadget");
    assert_eq!(reset.declaring_type().map(|owner| owner.name.clone()), Some("Gadget".into()));

    assert!(resolver.resolve_method(&*member_reference(&app, 4)?)?.is_none());
    assert!(resolver.resolve_field(&*member_reference(&app, 2)?)?.is_none());
    Ok(())
}

/// A reference whose calling convention disagrees on `HasThis` still finds the method.
#[test]
fn test_resolve_method_ignores_instance_flag() -> Result<()> {
    let app = app(ReaderOptions::default())?;
    let resolver = MetadataResolver::new(world()?);

    let reference = member_reference(&app, 5)?;
    let spin = resolver
        .resolve_method(&reference)?
        .expect("Widget::Spin(int)");
    assert_eq!(spin.name, "Spin");
    assert_eq!(spin.signature()?.parameters.len(), 1);
    Ok(())
}

/// The resolver configured on the reader is the one attribute decoding and friends use.
#[test]
fn test_reader_carries_resolver() -> Result<()> {
    let assemblies: Arc<dyn AssemblyResolver> = world()?;
    let app = app(ReaderOptions::default().with_resolver(assemblies))?;
    let resolver = app
        .options()
        .resolver
        .clone()
        .map(MetadataResolver::new)
        .expect("resolver configured");

    let widget = resolver.resolve_reference(&type_reference(&app, 1)?)?;
    assert!(widget.is_some());
    Ok(())
}
