//! Custom attributes, security declarations, constants and marshalling descriptors.

use std::sync::Arc;

use crate::{
    metadata::{
        customattributes::{
            AttributeTypeResolver, CustomAttribute, CustomAttributeParser, CustomAttributeRc,
            CustomAttributeValue,
        },
        marshalling::{parse_marshal_descriptor, MarshalInfo},
        reader::{context::ReadContext, MetadataReader},
        resolver::MetadataResolver,
        security::{
            parse_permission_set, SecurityAction, SecurityAttribute, SecurityDeclRc,
            SecurityDeclaration,
        },
        tables::{CodedIndexType, TableId},
        token::Token,
        typesystem::{
            CilType, MetadataScope, MethodHandle, PrimitiveKind, PrimitiveValue, TypeDefRc,
            TypeName,
        },
    },
    Result,
};

impl<'a> ReadContext<'a> {
    /// Custom attributes applied to `owner`, in table order
    pub fn custom_attributes(&mut self, owner: Token) -> Result<Arc<Vec<CustomAttributeRc>>> {
        let reader = self.reader;
        if !reader.options.read_custom_attributes {
            return Ok(Arc::default());
        }
        if let Some(list) = reader.cache.attribute_lists.get(&owner) {
            return Ok(list.value().clone());
        }

        let runs = self.attribute_runs()?.get(&owner);
        let mut attributes = Vec::new();
        for rid in runs.into_iter().flatten().flat_map(|range| range.rows()) {
            attributes.push(self.custom_attribute(rid)?);
        }

        Ok(reader
            .cache
            .attribute_lists
            .entry(owner)
            .or_insert(Arc::new(attributes))
            .value()
            .clone())
    }

    pub fn custom_attribute(&mut self, rid: u32) -> Result<CustomAttributeRc> {
        let reader = self.reader;
        if let Some(attribute) = reader.cache.custom_attributes.get(rid) {
            return Ok(attribute);
        }
        self.check_row(TableId::CustomAttribute, rid)?;

        let (parent, constructor, blob) = self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::CustomAttribute, rid)?;
            let parent = ctx.cursor.read_coded_index(CodedIndexType::HasCustomAttribute)?;
            let constructor = ctx.cursor.read_coded_index(CodedIndexType::CustomAttributeType)?;
            let blob = ctx.cursor.read_blob_index()?;
            Ok((parent, constructor, blob))
        })?;

        let token = Token::from_parts(TableId::CustomAttribute, rid);
        let constructor = match constructor.table_id() {
            Some(TableId::MethodDef) => MethodHandle::definition(&self.method(constructor.row())?),
            Some(TableId::MemberRef) => {
                MethodHandle::Reference(self.member_reference(constructor.row())?)
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid constructor {} of custom attribute {}",
                    constructor,
                    token
                ))
            }
        };

        log::trace!("materialized custom attribute {} on {}", token, parent);
        reader.cache.custom_attributes.insert(
            rid,
            Arc::new(CustomAttribute::new(
                token,
                parent,
                constructor,
                self.image.blob(blob)?.to_vec(),
                self.module(),
            )),
        )
    }

    /// Security declarations attached to `owner`
    pub fn security_declarations(&mut self, owner: Token) -> Result<Arc<Vec<SecurityDeclRc>>> {
        let reader = self.reader;
        if let Some(list) = reader.cache.security_lists.get(&owner) {
            return Ok(list.value().clone());
        }

        let runs = self.security_runs()?.get(&owner);
        let mut declarations = Vec::new();
        for rid in runs.into_iter().flatten().flat_map(|range| range.rows()) {
            declarations.push(self.security_declaration(rid)?);
        }

        Ok(reader
            .cache
            .security_lists
            .entry(owner)
            .or_insert(Arc::new(declarations))
            .value()
            .clone())
    }

    pub fn security_declaration(&mut self, rid: u32) -> Result<SecurityDeclRc> {
        let reader = self.reader;
        if let Some(declaration) = reader.cache.security.get(rid) {
            return Ok(declaration);
        }
        self.check_row(TableId::DeclSecurity, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::DeclSecurity, rid)?;
            let action = SecurityAction::from(ctx.cursor.read_u16()?);
            let parent = ctx.cursor.read_coded_index(CodedIndexType::HasDeclSecurity)?;
            let blob = ctx.cursor.read_blob_index()?;

            let token = Token::from_parts(TableId::DeclSecurity, rid);
            log::trace!("materialized security declaration {} on {}", token, parent);
            reader.cache.security.insert(
                rid,
                Arc::new(SecurityDeclaration::new(
                    token,
                    action,
                    parent,
                    ctx.image.blob(blob)?.to_vec(),
                    ctx.module(),
                )),
            )
        })
    }

    pub fn constant(&mut self, owner: Token) -> Result<Option<PrimitiveValue>> {
        match self.constants()?.get(&owner) {
            Some(&(element_type, blob)) => Ok(Some(PrimitiveValue::from_constant(
                element_type,
                self.image.blob(blob)?,
            )?)),
            None => Ok(None),
        }
    }

    pub fn marshal_info(&mut self, owner: Token) -> Result<Option<MarshalInfo>> {
        match self.marshals()?.get(&owner) {
            Some(&blob) => Ok(Some(parse_marshal_descriptor(self.image.blob(blob)?)?)),
            None => Ok(None),
        }
    }
}

/// Decode the value blob of `attribute` against its constructor's parameters
pub(super) fn attribute_value(
    reader: &MetadataReader,
    attribute: &CustomAttribute,
) -> Result<CustomAttributeValue> {
    let parameters = attribute.constructor.signature()?.parameters;
    CustomAttributeParser::new(&attribute.blob, reader)
        .with_max_depth(reader.options.max_signature_depth)
        .parse_custom_attribute(&parameters)
}

/// Decode the permission set of `declaration`
pub(super) fn security_attributes(
    reader: &MetadataReader,
    declaration: &SecurityDeclaration,
) -> Result<Vec<SecurityAttribute>> {
    parse_permission_set(&declaration.blob, reader)
}

impl MetadataReader {
    fn resolver(&self) -> MetadataResolver {
        match &self.options.resolver {
            Some(assemblies) => MetadataResolver::new(assemblies.clone()),
            None => MetadataResolver::local(),
        }
    }

    /// A type of this module by reflection name, walking `+` nesting
    fn find_by_name(&self, name: &TypeName) -> Result<Option<TypeDefRc>> {
        let Some(mut current) = self.get_type(&name.namespace, &name.name)? else {
            return Ok(None);
        };
        for nested in &name.nested {
            let inner = current
                .nested_types()?
                .iter()
                .find(|ty| &ty.name == nested)
                .cloned();
            match inner {
                Some(inner) => current = inner,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// The integral type of the instance field of `definition`, if it is an enum
fn underlying_type(definition: &TypeDefRc) -> Result<Option<PrimitiveKind>> {
    if !definition.is_enum() {
        return Ok(None);
    }
    Ok(definition
        .fields()?
        .iter()
        .find(|field| !field.is_static())
        .and_then(|field| field.field_type.primitive_kind()))
}

impl AttributeTypeResolver for MetadataReader {
    fn enum_underlying_type(&self, ty: &CilType) -> Result<Option<PrimitiveKind>> {
        match self.resolver().resolve_type(ty)? {
            Some(definition) => underlying_type(&definition),
            None => Ok(None),
        }
    }

    fn enum_underlying_type_by_name(&self, name: &str) -> Result<Option<PrimitiveKind>> {
        let name = TypeName::parse(name)?;

        let definition = match &name.assembly {
            Some(assembly) => match self.resolver().resolve_assembly(assembly) {
                Some(module) => module.find_by_name(&name)?,
                None => None,
            },
            None => match self.find_by_name(&name)? {
                Some(definition) => Some(definition),
                None => match self.read_required(|ctx| ctx.corlib_scope())? {
                    MetadataScope::AssemblyReference(corlib) => {
                        match self.resolver().resolve_assembly(&corlib) {
                            Some(module) => module.find_by_name(&name)?,
                            None => None,
                        }
                    }
                    _ => None,
                },
            },
        };

        match definition {
            Some(definition) => underlying_type(&definition),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock, Weak,
    };

    use crate::metadata::{
        customattributes::CustomAttributeArgument,
        image::ImageBuilder,
        marshalling::{MarshalInfo, NATIVE_TYPE},
        reader::{MetadataItem, MetadataReader, ModuleRc, ReaderOptions},
        resolver::{AssemblyResolver, AssemblySet},
        security::SecurityAction,
        tables::{CodedIndexType, FieldAttributes, TableId},
        token::Token,
        typesystem::{AssemblyNameReference, PrimitiveValue},
    };

    /// `enum Color : byte` and a type `Tagged` carrying `[Tagged(Color)2]`, a demand, and a
    /// literal field `Max = 42` marshalled as `LPSTR`
    fn tagged(options: ReaderOptions) -> Arc<MetadataReader> {
        let mut b = ImageBuilder::new();

        let system = b.string("System");
        let enum_name = b.string("Enum");
        b.row(TableId::TypeRef, &[0, enum_name, system]).unwrap();

        let color = b.string("Color");
        let extends = CodedIndexType::TypeDefOrRef
            .encode(Token::from_parts(TableId::TypeRef, 1))
            .unwrap();
        b.row(TableId::TypeDef, &[0, color, 0, extends, 1, 1]).unwrap();
        let tagged = b.string("Tagged");
        b.row(TableId::TypeDef, &[0, tagged, 0, 0, 2, 1]).unwrap();

        let value = b.string("value__");
        let uint8 = b.blob(&[0x06, 0x05]);
        let flags = FieldAttributes::SPECIAL_NAME | FieldAttributes::RT_SPECIAL_NAME;
        b.row(TableId::Field, &[u32::from(flags), value, uint8]).unwrap();
        let max = b.string("Max");
        let int32 = b.blob(&[0x06, 0x08]);
        let flags = FieldAttributes::STATIC | FieldAttributes::LITERAL;
        b.row(TableId::Field, &[u32::from(flags), max, int32]).unwrap();

        // HASTHIS, 1 param, void, valuetype Color
        let ctor_sig = b.blob(&[0x20, 0x01, 0x01, 0x11, 0x04]);
        let ctor = b.string(".ctor");
        b.row(TableId::MethodDef, &[0, 0, 0x1886, ctor, ctor_sig, 1]).unwrap();

        let tagged_token = Token::from_parts(TableId::TypeDef, 2);
        let max_token = Token::from_parts(TableId::Field, 2);

        let value = b.blob(&[0x01, 0x00, 0x02, 0x00, 0x00]);
        b.row(
            TableId::CustomAttribute,
            &[
                CodedIndexType::HasCustomAttribute.encode(tagged_token).unwrap(),
                CodedIndexType::CustomAttributeType
                    .encode(Token::from_parts(TableId::MethodDef, 1))
                    .unwrap(),
                value,
            ],
        )
        .unwrap();

        let forty_two = b.blob(&[42, 0, 0, 0]);
        b.row(
            TableId::Constant,
            &[0x08, 0, CodedIndexType::HasConstant.encode(max_token).unwrap(), forty_two],
        )
        .unwrap();

        let lpstr = b.blob(&[NATIVE_TYPE::LPSTR]);
        b.row(
            TableId::FieldMarshal,
            &[CodedIndexType::HasFieldMarshal.encode(max_token).unwrap(), lpstr],
        )
        .unwrap();

        let empty = b.blob(&[]);
        b.row(
            TableId::DeclSecurity,
            &[2, CodedIndexType::HasDeclSecurity.encode(tagged_token).unwrap(), empty],
        )
        .unwrap();

        MetadataReader::new("Tagged.dll", Arc::new(b.build().unwrap()), options)
    }

    #[test]
    fn enum_argument_uses_underlying_type() {
        let reader = tagged(ReaderOptions::default());
        let tagged = reader.read_type(2).unwrap();
        let attributes = tagged.custom_attributes().unwrap();
        assert_eq!(attributes.len(), 1);

        let attribute = &attributes[0];
        assert_eq!(attribute.parent, tagged.token);
        assert_eq!(attribute.attribute_type().unwrap().name(), "Tagged");

        let value = attribute.value().unwrap();
        assert_eq!(
            value.fixed_args,
            vec![CustomAttributeArgument::Enum(
                "Color".to_string(),
                Box::new(CustomAttributeArgument::U1(2))
            )]
        );
    }

    #[test]
    fn attribute_lists_are_shared() {
        let reader = tagged(ReaderOptions::default());
        let owner = Token::from_parts(TableId::TypeDef, 2);
        let first = reader.read_custom_attributes(owner).unwrap();
        let second = reader.read_custom_attributes(owner).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        match reader.lookup_token(Token::from_parts(TableId::CustomAttribute, 1)).unwrap() {
            Some(MetadataItem::CustomAttribute(attribute)) => {
                assert!(Arc::ptr_eq(&attribute, &first[0]));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn disabled_custom_attributes_are_empty() {
        let reader = tagged(ReaderOptions::default().with_custom_attributes(false));
        let owner = Token::from_parts(TableId::TypeDef, 2);
        assert!(reader.read_custom_attributes(owner).unwrap().is_empty());
        assert!(!reader.has_custom_attributes(owner).unwrap());
    }

    #[test]
    fn constants_and_marshalling() {
        let reader = tagged(ReaderOptions::default());
        let max = Token::from_parts(TableId::Field, 2);
        assert_eq!(reader.read_constant(max).unwrap(), Some(PrimitiveValue::I4(42)));
        assert_eq!(
            reader.read_marshal_info(max).unwrap(),
            Some(MarshalInfo::Simple(NATIVE_TYPE::LPSTR))
        );
        assert_eq!(
            reader.read_constant(Token::from_parts(TableId::Field, 1)).unwrap(),
            None
        );
    }

    #[test]
    fn security_declarations() {
        let reader = tagged(ReaderOptions::default());
        let declarations = reader
            .read_security_declarations(Token::from_parts(TableId::TypeDef, 2))
            .unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].action, SecurityAction::Demand);
        assert!(declarations[0].attributes().unwrap().is_empty());
    }

    /// Records how deep the calling thread holds `watched`'s guard on every lookup
    #[derive(Default)]
    struct GuardWatch {
        assemblies: AssemblySet,
        watched: OnceLock<Weak<MetadataReader>>,
        lookups: AtomicUsize,
        deepest: AtomicUsize,
    }

    impl AssemblyResolver for GuardWatch {
        fn resolve(&self, name: &AssemblyNameReference) -> Option<ModuleRc> {
            if let Some(module) = self.watched.get().and_then(Weak::upgrade) {
                self.lookups.fetch_add(1, Ordering::Relaxed);
                self.deepest
                    .fetch_max(module.guard.held_depth(), Ordering::Relaxed);
            }
            self.assemblies.resolve(name)
        }
    }

    /// Assembly `Paint` with `enum Paint.Color : byte`
    fn paint() -> ModuleRc {
        let mut b = ImageBuilder::new();
        let paint = b.string("Paint");
        b.row(TableId::Assembly, &[0x8004, 1, 0, 0, 0, 0, 0, paint, 0]).unwrap();

        let system = b.string("System");
        let enum_name = b.string("Enum");
        b.row(TableId::TypeRef, &[0, enum_name, system]).unwrap();
        let extends = CodedIndexType::TypeDefOrRef
            .encode(Token::from_parts(TableId::TypeRef, 1))
            .unwrap();
        let color = b.string("Color");
        b.row(TableId::TypeDef, &[0x0000_0101, color, paint, extends, 1, 1]).unwrap();

        let value = b.string("value__");
        let uint8 = b.blob(&[0x06, 0x05]);
        let flags = FieldAttributes::SPECIAL_NAME | FieldAttributes::RT_SPECIAL_NAME;
        b.row(TableId::Field, &[u32::from(flags), value, uint8]).unwrap();

        MetadataReader::new("Paint.dll", Arc::new(b.build().unwrap()), ReaderOptions::default())
    }

    /// `[Tagged(Paint.Color)2]` on `Tagged`, with the enum living in `Paint`
    fn tagged_across(options: ReaderOptions) -> ModuleRc {
        let mut b = ImageBuilder::new();
        let paint = b.string("Paint");
        b.row(TableId::AssemblyRef, &[1, 0, 0, 0, 0, 0, paint, 0, 0]).unwrap();
        let scope = CodedIndexType::ResolutionScope
            .encode(Token::from_parts(TableId::AssemblyRef, 1))
            .unwrap();
        let color = b.string("Color");
        b.row(TableId::TypeRef, &[scope, color, paint]).unwrap();

        let tagged = b.string("Tagged");
        b.row(TableId::TypeDef, &[0, tagged, 0, 0, 1, 1]).unwrap();
        // HASTHIS, 1 param, void, valuetype TypeRef(1)
        let ctor_sig = b.blob(&[0x20, 0x01, 0x01, 0x11, 0x05]);
        let ctor = b.string(".ctor");
        b.row(TableId::MethodDef, &[0, 0, 0x1886, ctor, ctor_sig, 1]).unwrap();

        let value = b.blob(&[0x01, 0x00, 0x02, 0x00, 0x00]);
        b.row(
            TableId::CustomAttribute,
            &[
                CodedIndexType::HasCustomAttribute
                    .encode(Token::from_parts(TableId::TypeDef, 1))
                    .unwrap(),
                CodedIndexType::CustomAttributeType
                    .encode(Token::from_parts(TableId::MethodDef, 1))
                    .unwrap(),
                value,
            ],
        )
        .unwrap();

        MetadataReader::new("Tagged.dll", Arc::new(b.build().unwrap()), options)
    }

    #[test]
    fn foreign_enum_is_resolved_outside_the_guard() {
        let watch = Arc::new(GuardWatch::default());
        watch.assemblies.add(paint()).unwrap();
        let resolver: Arc<dyn AssemblyResolver> = watch.clone();
        let reader = tagged_across(ReaderOptions::default().with_resolver(resolver));
        watch.watched.set(Arc::downgrade(&reader)).unwrap();

        let tagged = reader.read_type(1).unwrap();
        let attributes = tagged.custom_attributes().unwrap();
        let value = attributes[0].value().unwrap();
        match &value.fixed_args[..] {
            [CustomAttributeArgument::Enum(_, underlying)] => {
                assert_eq!(**underlying, CustomAttributeArgument::U1(2));
            }
            other => panic!("unexpected arguments {other:?}"),
        }

        assert!(watch.lookups.load(Ordering::Relaxed) > 0);
        assert_eq!(watch.deepest.load(Ordering::Relaxed), 0);
        assert_eq!(reader.guard.held_depth(), 0);
        assert!(Arc::ptr_eq(&value, &attributes[0].value().unwrap()));
    }
}
