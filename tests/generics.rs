//! Integration tests for generic substitution over signatures read from an image.

use std::sync::Arc;

use dotmeta::{
    metadata::{
        image::ImageBuilder,
        reader::{MetadataItem, MetadataReader, ModuleRc, ReaderOptions},
        substitution::GenericSubstitution,
        tables::{CodedIndexType, TableId},
        token::Token,
        typesystem::{MethodHandle, PrimitiveKind, TypeSpecKind},
    },
    Result,
};

/// `mscorlib` with ``System.Collections.Generic.List`1`` and ``Dictionary`2`` references
fn collections() -> Result<ImageBuilder> {
    let mut b = ImageBuilder::new();
    let mscorlib = b.string("mscorlib");
    b.row(TableId::AssemblyRef, &[4, 0, 0, 0, 0, 0, mscorlib, 0, 0])?;

    let scope = CodedIndexType::ResolutionScope.encode(Token::from_parts(TableId::AssemblyRef, 1))?;
    let namespace = b.string("System.Collections.Generic");
    let list = b.string("List`1");
    let dictionary = b.string("Dictionary`2");
    b.row(TableId::TypeRef, &[scope, list, namespace])?;
    b.row(TableId::TypeRef, &[scope, dictionary, namespace])?;
    Ok(b)
}

fn open(builder: ImageBuilder) -> Result<ModuleRc> {
    Ok(MetadataReader::new(
        "Generics.dll",
        Arc::new(builder.build()?),
        ReaderOptions::default(),
    ))
}

fn method_handle(reader: &MetadataReader, token: Token) -> Result<MethodHandle> {
    Ok(reader
        .lookup_token(token)?
        .and_then(|item| item.as_method())
        .expect("token names a method"))
}

/// `T[] List<int>::_items` resolves to `int[]` through the declaring instance.
#[test]
fn test_field_of_generic_instance() -> Result<()> {
    let mut b = collections()?;
    // GENERICINST CLASS TypeRef(1) 1: I4
    let spec = b.blob(&[0x15, 0x12, 0x05, 0x01, 0x08]);
    b.row(TableId::TypeSpec, &[spec])?;

    let parent = CodedIndexType::MemberRefParent.encode(Token::from_parts(TableId::TypeSpec, 1))?;
    let items = b.string("_items");
    // FIELD SZARRAY VAR 0
    let signature = b.blob(&[0x06, 0x1D, 0x13, 0x00]);
    b.row(TableId::MemberRef, &[parent, items, signature])?;
    let reader = open(b)?;

    let Some(MetadataItem::MemberReference(field)) =
        reader.lookup_token(Token::from_parts(TableId::MemberRef, 1))?
    else {
        panic!("expected a member reference");
    };

    let declared = GenericSubstitution::resolve_field_type(&field)?.expect("field signature");
    assert_eq!(declared.full_name(), "System.Int32[]");
    let Some(TypeSpecKind::SzArray(element)) = declared.as_specification().map(|spec| spec.kind.clone())
    else {
        panic!("expected a vector");
    };
    assert_eq!(element, reader.primitive_type(PrimitiveKind::Int32)?);

    let declaring = field.declaring_type().expect("type spec parent");
    assert_eq!(
        declaring.full_name(),
        "System.Collections.Generic.List`1<System.Int32>"
    );
    Ok(())
}

/// `Util::Identity<T>(T)` and `Util::Wrap<U>(Dictionary<string, List<U>>)`, each with a
/// `MethodSpec` instantiating it
fn util() -> Result<ImageBuilder> {
    let mut b = collections()?;
    let util = b.string("Util");
    b.row(TableId::TypeDef, &[0x0010_0181, util, 0, 0, 1, 1])?;

    let identity = b.string("Identity");
    // GENERIC, 1 generic param, 1 param, returns MVAR 0, takes MVAR 0
    let identity_sig = b.blob(&[0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]);
    b.row(TableId::MethodDef, &[0, 0, 0x0016, identity, identity_sig, 1])?;

    let wrap = b.string("Wrap");
    // GENERIC, 1 generic param, 1 param, VOID,
    // GENERICINST CLASS TypeRef(2) 2: STRING, GENERICINST CLASS TypeRef(1) 1: MVAR 0
    let wrap_sig = b.blob(&[
        0x10, 0x01, 0x01, 0x01, 0x15, 0x12, 0x09, 0x02, 0x0E, 0x15, 0x12, 0x05, 0x01, 0x1E, 0x00,
    ]);
    b.row(TableId::MethodDef, &[0, 0, 0x0016, wrap, wrap_sig, 1])?;

    let t = b.string("T");
    let u = b.string("U");
    let identity_owner =
        CodedIndexType::TypeOrMethodDef.encode(Token::from_parts(TableId::MethodDef, 1))?;
    let wrap_owner =
        CodedIndexType::TypeOrMethodDef.encode(Token::from_parts(TableId::MethodDef, 2))?;
    b.row(TableId::GenericParam, &[0, 0, identity_owner, t])?;
    b.row(TableId::GenericParam, &[0, 0, wrap_owner, u])?;

    // GENERICINST 1: STRING
    let with_string = b.blob(&[0x0A, 0x01, 0x0E]);
    // GENERICINST 1: BOOLEAN
    let with_bool = b.blob(&[0x0A, 0x01, 0x02]);
    let identity_method =
        CodedIndexType::MethodDefOrRef.encode(Token::from_parts(TableId::MethodDef, 1))?;
    let wrap_method =
        CodedIndexType::MethodDefOrRef.encode(Token::from_parts(TableId::MethodDef, 2))?;
    b.row(TableId::MethodSpec, &[identity_method, with_string])?;
    b.row(TableId::MethodSpec, &[wrap_method, with_bool])?;
    Ok(b)
}

/// `Identity<string>` returns and takes the module's `String` node.
#[test]
fn test_method_instance_substitutes_method_parameters() -> Result<()> {
    let reader = open(util()?)?;
    let instance = method_handle(&reader, Token::from_parts(TableId::MethodSpec, 1))?;
    assert!(matches!(instance, MethodHandle::Instance(_)));
    assert_eq!(instance.name(), "Identity");

    let string = reader.primitive_type(PrimitiveKind::String)?;
    assert_eq!(GenericSubstitution::resolve_return_type(&instance)?, string);
    assert_eq!(
        GenericSubstitution::resolve_parameter_type(&instance, 0)?,
        Some(string)
    );
    assert_eq!(GenericSubstitution::resolve_parameter_type(&instance, 1)?, None);

    // The generic definition itself keeps its parameter
    let definition = method_handle(&reader, Token::from_parts(TableId::MethodDef, 1))?;
    let unbound = GenericSubstitution::resolve_return_type(&definition)?;
    assert!(unbound.contains_generic_parameter());
    assert_eq!(unbound.full_name(), "T");
    Ok(())
}

/// A method parameter nested two instances deep is replaced in place.
#[test]
fn test_nested_instance_in_method_signature() -> Result<()> {
    let reader = open(util()?)?;
    let wrap = method_handle(&reader, Token::from_parts(TableId::MethodSpec, 2))?;

    let parameter = GenericSubstitution::resolve_parameter_type(&wrap, 0)?.expect("one parameter");
    assert_eq!(
        parameter.full_name(),
        "System.Collections.Generic.Dictionary`2<System.String,\
         System.Collections.Generic.List`1<System.Boolean>>"
    );
    assert!(!parameter.contains_generic_parameter());

    let declared = wrap.signature()?;
    assert_eq!(
        declared.parameters[0].full_name(),
        "System.Collections.Generic.Dictionary`2<System.String,\
         System.Collections.Generic.List`1<U>>"
    );
    Ok(())
}

/// Explicit arguments: a type parameter stays unresolved without a type context, and a
/// position past the arguments is malformed.
#[test]
fn test_explicit_substitution() -> Result<()> {
    let reader = open(util()?)?;
    let identity = method_handle(&reader, Token::from_parts(TableId::MethodDef, 1))?;
    let signature = identity.signature()?;
    let int32 = reader.primitive_type(PrimitiveKind::Int32)?;

    let type_only = GenericSubstitution::new(Some(vec![int32.clone()]), None);
    assert!(type_only.resolve(&signature.return_type)?.contains_generic_parameter());

    let method_only = GenericSubstitution::new(None, Some(vec![int32.clone()]));
    let resolved = method_only.resolve_signature(&signature)?;
    assert_eq!(resolved.return_type, int32);
    assert_eq!(resolved.parameters, vec![int32]);

    let empty = GenericSubstitution::new(None, Some(Vec::new()));
    assert!(empty.resolve(&signature.return_type).is_err());
    Ok(())
}
