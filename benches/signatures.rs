//! Benchmarks for signature decoding.
//!
//! Two levels are measured:
//! - Token-level parsing of raw blobs into `TypeSignature` trees
//! - Reader-level decoding, where every token in a signature is materialized through the
//!   module's caches, cold and warm
//! - Generic substitution over a decoded signature
//! - The compressed integer encoding every blob is made of

extern crate dotmeta;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use dotmeta::{
    metadata::{
        image::{ImageBuilder, MemoryImage},
        reader::{MetadataReader, ReaderOptions},
        signatures::{
            parse_field_signature, parse_local_var_signature, parse_method_signature,
            parse_type_spec_signature,
        },
        substitution::GenericSubstitution,
        tables::{CodedIndexType, TableId},
        token::Token,
        typesystem::{CilType, TypeReference},
    },
    Parser, Result,
};

/// Blobs of increasing shape complexity, all free of table tokens.
const METHOD_SIGNATURES: &[(&str, &[u8])] = &[
    // DEFAULT, 0 params, VOID
    ("void_no_params", &[0x00, 0x00, 0x01]),
    // DEFAULT, 3 params, I4 return, I4, STRING, BOOLEAN
    ("primitives", &[0x00, 0x03, 0x08, 0x08, 0x0E, 0x02]),
    // HASTHIS | GENERIC, 1 generic param, 1 param, MVAR(0) return, MVAR(0)
    ("generic", &[0x30, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]),
    // DEFAULT, 2 params, VOID, BYREF I4, BYREF STRING
    ("byref", &[0x00, 0x02, 0x01, 0x10, 0x08, 0x10, 0x0E]),
    // DEFAULT, 8 params, VOID, 8x I4
    (
        "many_params",
        &[0x00, 0x08, 0x01, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08],
    ),
];

fn bench_token_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for (name, signature) in METHOD_SIGNATURES {
        group.bench_function(format!("method_{name}"), |b| {
            b.iter(|| parse_method_signature(black_box(signature)).unwrap());
        });
    }

    // FIELD, SZARRAY, I4
    let field = [0x06, 0x1D, 0x08];
    group.bench_function("field_array", |b| {
        b.iter(|| parse_field_signature(black_box(&field)).unwrap());
    });

    // LOCAL_SIG, 2 variables, PINNED PTR I4, OBJECT
    let locals = [0x07, 0x02, 0x45, 0x0F, 0x08, 0x1C];
    group.bench_function("locals_pinned", |b| {
        b.iter(|| parse_local_var_signature(black_box(&locals)).unwrap());
    });

    // GENERICINST CLASS TypeRef(1) 2 args: STRING, GENERICINST CLASS TypeRef(1) 1 arg: I4
    let nested = [0x15, 0x12, 0x05, 0x02, 0x0E, 0x15, 0x12, 0x05, 0x01, 0x08];
    group.bench_function("type_spec_nested_generic", |b| {
        b.iter(|| parse_type_spec_signature(black_box(&nested)).unwrap());
    });

    group.finish();
}

/// A module referencing ``System.Collections.Generic.Dictionary`2`` from mscorlib, with a
/// member reference `!1 Dictionary<string, List<int>>::get_Item(!0)`
fn dictionary_image() -> Result<MemoryImage> {
    let mut b = ImageBuilder::new();
    let mscorlib = b.string("mscorlib");
    b.row(TableId::AssemblyRef, &[4, 0, 0, 0, 0, 0, mscorlib, 0, 0])?;

    let scope = CodedIndexType::ResolutionScope.encode(Token::from_parts(TableId::AssemblyRef, 1))?;
    let namespace = b.string("System.Collections.Generic");
    let dictionary = b.string("Dictionary`2");
    let list = b.string("List`1");
    b.row(TableId::TypeRef, &[scope, dictionary, namespace])?;
    b.row(TableId::TypeRef, &[scope, list, namespace])?;

    // GENERICINST CLASS TypeRef(1) 2: STRING, GENERICINST CLASS TypeRef(2) 1: I4
    let spec = b.blob(&[0x15, 0x12, 0x05, 0x02, 0x0E, 0x15, 0x12, 0x09, 0x01, 0x08]);
    b.row(TableId::TypeSpec, &[spec])?;

    let parent = CodedIndexType::MemberRefParent.encode(Token::from_parts(TableId::TypeSpec, 1))?;
    let name = b.string("get_Item");
    // HASTHIS, 1 param, returns !1, takes !0
    let signature = b.blob(&[0x20, 0x01, 0x13, 0x01, 0x13, 0x00]);
    b.row(TableId::MemberRef, &[parent, name, signature])?;

    b.build()
}

fn bench_reader_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader");
    let member = Token::from_parts(TableId::MemberRef, 1);

    group.bench_function("member_ref_cold", |b| {
        b.iter_batched(
            || {
                MetadataReader::new(
                    "Bench.dll",
                    Arc::new(dictionary_image().unwrap()),
                    ReaderOptions::default(),
                )
            },
            |reader| black_box(reader.lookup_token(member).unwrap()),
            BatchSize::SmallInput,
        );
    });

    let reader = MetadataReader::new(
        "Bench.dll",
        Arc::new(dictionary_image().unwrap()),
        ReaderOptions::default(),
    );
    reader.lookup_token(member).unwrap();
    group.bench_function("member_ref_warm", |b| {
        b.iter(|| black_box(reader.lookup_token(black_box(member)).unwrap()));
    });

    group.finish();
}

fn bench_substitution(c: &mut Criterion) {
    let reader = MetadataReader::new(
        "Bench.dll",
        Arc::new(dictionary_image().unwrap()),
        ReaderOptions::default(),
    );
    let Some(item) = reader
        .lookup_token(Token::from_parts(TableId::MemberRef, 1))
        .unwrap()
    else {
        panic!("member reference is missing");
    };
    let method = item.as_method().unwrap();

    c.bench_function("substitute_return_type", |b| {
        b.iter(|| GenericSubstitution::resolve_return_type(black_box(&method)).unwrap());
    });

    let int32 = CilType::Reference(Arc::new(TypeReference::synthesized(
        "System", "Int32", None, true,
    )));
    let substitution = GenericSubstitution::new(Some(vec![int32.clone(), int32]), None);
    let signature = method.signature().unwrap();
    c.bench_function("substitute_signature", |b| {
        b.iter(|| substitution.resolve_signature(black_box(&signature)).unwrap());
    });
}

fn bench_compressed_ints(c: &mut Criterion) {
    let mut group = c.benchmark_group("compressed");

    // 1-, 2- and 4-byte forms, 64 of each
    let mut unsigned = Vec::new();
    for _ in 0..64 {
        unsigned.extend_from_slice(&[0x03, 0x80, 0x80, 0xC0, 0x00, 0x40, 0x00]);
    }
    group.bench_function("uint_mixed", |b| {
        b.iter(|| {
            let mut parser = Parser::new(black_box(&unsigned));
            let mut sum = 0u64;
            while parser.has_more_data() {
                sum += u64::from(parser.read_compressed_uint().unwrap());
            }
            sum
        });
    });

    // -64, 8191, -268435456
    let mut signed = Vec::new();
    for _ in 0..64 {
        signed.extend_from_slice(&[0x01, 0xBF, 0xFE, 0xC0, 0x00, 0x00, 0x01]);
    }
    group.bench_function("int_mixed", |b| {
        b.iter(|| {
            let mut parser = Parser::new(black_box(&signed));
            let mut sum = 0i64;
            while parser.has_more_data() {
                sum += i64::from(parser.read_compressed_int().unwrap());
            }
            sum
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_token_level,
    bench_reader_level,
    bench_substitution,
    bench_compressed_ints
);
criterion_main!(benches);
