//! Member materializers: fields, methods, parameters, properties, events, member
//! references, method instantiations and stand-alone signatures.
//!
//! Members are only ever created through their owner's collection so that every node is
//! attached to exactly one type. Lookups by row id find the owner first and then pick the
//! member out of the identity cache.

use std::sync::Arc;

use crate::{
    metadata::{
        range::Range,
        reader::context::{GenericContext, ReadContext},
        tables::{
            CodedIndexType, Column, EventAttributes, FieldAttributes, MethodAttributes,
            MethodSemanticsAttributes, PInvokeAttributes, PropertyAttributes, TableId,
        },
        token::Token,
        typesystem::{
            CilType, EventAccessors, EventDefinition, EventRc, FieldDefinition, FieldRc,
            GenericInstanceMethod, GenericInstanceMethodRc, GenericParameterOwner,
            MemberCollection, MemberRefParent, MemberRefRc, MemberReference, MethodDefRc,
            MethodDefinition, MethodHandle, MethodParameters, PInvokeInfo, ParamRc,
            ParameterDefinition, PrimitiveKind, PropertyAccessors, PropertyDefinition,
            PropertyRc, StandAloneSignature, TypeDefRc,
        },
    },
    Result,
};

const DELETED: &str = "_Deleted";

/// Index of the range holding `position`, i.e. the owner row id minus one
fn owner_index(ranges: &[Range], position: u32) -> Option<u32> {
    ranges
        .iter()
        .position(|range| range.contains(position))
        .and_then(|index| u32::try_from(index).ok())
}

impl<'a> ReadContext<'a> {
    pub fn field(&mut self, rid: u32) -> Result<FieldRc> {
        let reader = self.reader;
        if let Some(field) = reader.cache.fields.get(rid) {
            return Ok(field);
        }
        self.check_row(TableId::Field, rid)?;

        let position = self.logical_position(TableId::Field, rid)?;
        let owner = owner_index(&self.member_lists()?.fields, position)
            .ok_or_else(|| malformed_error!("Field {} is not owned by any type", rid))?;
        let owner = self.type_definition(owner + 1)?;
        self.fields(&owner)?;

        reader
            .cache
            .fields
            .get(rid)
            .ok_or_else(|| malformed_error!("Field {} is deleted", rid))
    }

    pub fn fields(&mut self, owner: &TypeDefRc) -> Result<Arc<MemberCollection<FieldDefinition>>> {
        owner.fields.get_or_materialize(owner.token, || {
            let reader = self.reader;
            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                let mut fields = MemberCollection::with_capacity(owner.field_list.length as usize);
                for position in owner.field_list.rows() {
                    let rid = ctx.physical_row(TableId::Field, position)?;
                    if let Some(field) = reader.cache.fields.get(rid) {
                        fields.attach(owner, field)?;
                        continue;
                    }

                    ctx.cursor.move_to(TableId::Field, rid)?;
                    let flags = ctx.cursor.read_u16()?;
                    let name = ctx.cursor.read_string()?;
                    let signature = ctx.cursor.read_blob_index()?;
                    if name == DELETED && flags & FieldAttributes::RT_SPECIAL_NAME != 0 {
                        continue;
                    }

                    let name = name.to_string();
                    let field_type = ctx.decode_field_blob(signature)?;
                    let token = Token::from_parts(TableId::Field, rid);
                    log::trace!("materialized field {} {}", token, name);

                    let field = reader.cache.fields.insert(
                        rid,
                        Arc::new(FieldDefinition::new(
                            token,
                            flags,
                            name,
                            field_type,
                            ctx.module(),
                        )),
                    )?;
                    fields.attach(owner, field)?;
                }
                Ok(fields)
            })
        })
    }

    pub fn method(&mut self, rid: u32) -> Result<MethodDefRc> {
        let reader = self.reader;
        if let Some(method) = reader.cache.methods.get(rid) {
            return Ok(method);
        }
        self.check_row(TableId::MethodDef, rid)?;

        let position = self.logical_position(TableId::MethodDef, rid)?;
        let owner = owner_index(&self.member_lists()?.methods, position)
            .ok_or_else(|| malformed_error!("Method {} is not owned by any type", rid))?;
        let owner = self.type_definition(owner + 1)?;
        self.methods(&owner)?;

        reader
            .cache
            .methods
            .get(rid)
            .ok_or_else(|| malformed_error!("Method {} is deleted", rid))
    }

    pub fn methods(
        &mut self,
        owner: &TypeDefRc,
    ) -> Result<Arc<MemberCollection<MethodDefinition>>> {
        owner.methods.get_or_materialize(owner.token, || {
            let reader = self.reader;
            let param_lists = self.param_lists()?;

            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                let mut methods =
                    MemberCollection::with_capacity(owner.method_list.length as usize);
                for position in owner.method_list.rows() {
                    let rid = ctx.physical_row(TableId::MethodDef, position)?;
                    if let Some(method) = reader.cache.methods.get(rid) {
                        methods.attach(owner, method)?;
                        continue;
                    }

                    ctx.cursor.move_to(TableId::MethodDef, rid)?;
                    let rva = ctx.cursor.read_u32()?;
                    let impl_flags = ctx.cursor.read_u16()?;
                    let flags = ctx.cursor.read_u16()?;
                    let name = ctx.cursor.read_string()?;
                    let signature = ctx.cursor.read_blob_index()?;
                    if name == DELETED && flags & MethodAttributes::RT_SPECIAL_NAME != 0 {
                        continue;
                    }

                    let token = Token::from_parts(TableId::MethodDef, rid);
                    let param_list = param_lists
                        .get(rid as usize - 1)
                        .copied()
                        .unwrap_or_default();
                    let method = Arc::new(MethodDefinition::new(
                        token,
                        rva,
                        impl_flags,
                        flags,
                        name.to_string(),
                        param_list,
                        ctx.module(),
                    ));

                    // `!!n` binds to the method being built
                    let decoded = ctx.scoped_with(
                        GenericContext::for_method(owner, &method),
                        |ctx| ctx.decode_method_blob(signature),
                    )?;
                    method.signature.set(decoded).map_err(|_| {
                        malformed_error!("Signature of {} was decoded twice", token)
                    })?;
                    log::trace!("materialized method {} {}", token, method.name);

                    let method = reader.cache.methods.insert(rid, method)?;
                    methods.attach(owner, method)?;
                }
                Ok(methods)
            })
        })
    }

    pub fn parameter(&mut self, rid: u32) -> Result<ParamRc> {
        let reader = self.reader;
        if let Some(parameter) = reader.cache.params.get(rid) {
            return Ok(parameter);
        }
        self.check_row(TableId::Param, rid)?;

        let position = self.logical_position(TableId::Param, rid)?;
        let method = owner_index(self.param_lists()?, position)
            .ok_or_else(|| malformed_error!("Parameter {} is not owned by any method", rid))?;
        let method = self.method(method + 1)?;
        self.parameters(&method)?;

        reader.cache.params.get(rid).ok_or_else(|| {
            malformed_error!("Parameter {} has no place in the signature of {}", rid, method.token)
        })
    }

    /// `Param` rows matched to the signature by sequence number.
    ///
    /// Signature parameters without a row get a nameless entry with a null token.
    pub fn parameters(&mut self, method: &MethodDefRc) -> Result<Arc<MethodParameters>> {
        method.parameters.get_or_materialize(method.token, || {
            let reader = self.reader;
            let signature = method.signature()?.clone();

            self.scoped(|ctx| {
                let mut return_parameter = None;
                let mut rows: Vec<Option<ParamRc>> = vec![None; signature.parameters.len()];

                for position in method.param_list.rows() {
                    let rid = ctx.physical_row(TableId::Param, position)?;
                    ctx.cursor.move_to(TableId::Param, rid)?;
                    let flags = ctx.cursor.read_u16()?;
                    let sequence = ctx.cursor.read_u16()?;
                    let name = ctx.cursor.read_string()?;

                    let parameter_type = if sequence == 0 {
                        signature.return_type.clone()
                    } else if let Some(ty) = signature.parameters.get(usize::from(sequence) - 1)
                    {
                        ty.clone()
                    } else {
                        log::warn!(
                            "Parameter row {} of {} has sequence {} beyond its {} parameters",
                            rid,
                            method.token,
                            sequence,
                            signature.parameters.len()
                        );
                        continue;
                    };

                    let parameter = match reader.cache.params.get(rid) {
                        Some(parameter) => parameter,
                        None => reader.cache.params.insert(
                            rid,
                            Arc::new(ParameterDefinition {
                                token: Token::from_parts(TableId::Param, rid),
                                flags,
                                name: name.to_string(),
                                sequence,
                                parameter_type,
                                method: Arc::downgrade(method),
                                module: ctx.module(),
                            }),
                        )?,
                    };

                    match sequence {
                        0 => return_parameter = Some(parameter),
                        _ => rows[usize::from(sequence) - 1] = Some(parameter),
                    }
                }

                let parameters = rows
                    .into_iter()
                    .zip(&signature.parameters)
                    .enumerate()
                    .map(|(index, (row, parameter_type))| {
                        row.unwrap_or_else(|| {
                            Arc::new(ParameterDefinition {
                                token: Token::new(0),
                                flags: 0,
                                name: String::new(),
                                sequence: u16::try_from(index + 1).unwrap_or(u16::MAX),
                                parameter_type: parameter_type.clone(),
                                method: Arc::downgrade(method),
                                module: ctx.module(),
                            })
                        })
                    })
                    .collect();

                Ok(MethodParameters {
                    return_parameter,
                    parameters,
                })
            })
        })
    }

    /// Declarations `method` implements according to `MethodImpl`
    pub fn overrides_of(&mut self, method: &MethodDefRc) -> Result<Arc<Vec<MethodHandle>>> {
        method.overrides.get_or_materialize(method.token, || {
            let declarations = self.overrides()?.get(&method.token);
            let generics = match method.declaring_type() {
                Some(owner) => GenericContext::for_method(&owner, method),
                None => GenericContext::default(),
            };

            self.scoped_with(generics, |ctx| {
                declarations
                    .into_iter()
                    .flatten()
                    .map(|declaration| ctx.method_handle(*declaration))
                    .collect()
            })
        })
    }

    pub fn pinvoke_info(&mut self, method: Token) -> Result<Option<PInvokeInfo>> {
        let Some(row) = self.pinvokes()?.get(&method) else {
            return Ok(None);
        };

        Ok(Some(PInvokeInfo {
            flags: PInvokeAttributes::from_bits_truncate(row.flags),
            entry_point: row.entry_point.clone(),
            module: self.module_reference(row.module_ref)?,
        }))
    }

    pub fn property(&mut self, rid: u32) -> Result<PropertyRc> {
        let reader = self.reader;
        if let Some(property) = reader.cache.properties.get(rid) {
            return Ok(property);
        }
        self.check_row(TableId::Property, rid)?;

        let position = self.logical_position(TableId::Property, rid)?;
        let owner = self
            .property_map()?
            .owner_of(position)
            .ok_or_else(|| malformed_error!("Property {} is not owned by any type", rid))?;
        let owner = self.type_definition(owner)?;
        self.properties(&owner)?;

        reader
            .cache
            .properties
            .get(rid)
            .ok_or_else(|| malformed_error!("Property {} is deleted", rid))
    }

    pub fn properties(
        &mut self,
        owner: &TypeDefRc,
    ) -> Result<Arc<MemberCollection<PropertyDefinition>>> {
        owner.properties.get_or_materialize(owner.token, || {
            let reader = self.reader;
            let list = self
                .property_map()?
                .ranges
                .get(&owner.token.row())
                .copied()
                .unwrap_or_default();

            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                let mut properties = MemberCollection::with_capacity(list.length as usize);
                for position in list.rows() {
                    let rid = ctx.physical_row(TableId::Property, position)?;
                    if let Some(property) = reader.cache.properties.get(rid) {
                        properties.attach(owner, property)?;
                        continue;
                    }

                    ctx.cursor.move_to(TableId::Property, rid)?;
                    let flags = ctx.cursor.read_u16()?;
                    let name = ctx.cursor.read_string()?;
                    let signature = ctx.cursor.read_blob_index()?;
                    if name == DELETED && flags & PropertyAttributes::RT_SPECIAL_NAME != 0 {
                        continue;
                    }

                    let name = name.to_string();
                    let shape = ctx.decode_property_blob(signature)?;
                    let token = Token::from_parts(TableId::Property, rid);
                    log::trace!("materialized property {} {}", token, name);

                    let property = reader.cache.properties.insert(
                        rid,
                        Arc::new(PropertyDefinition {
                            token,
                            flags,
                            name,
                            has_this: shape.has_this,
                            property_type: shape.property_type,
                            parameters: shape.parameters,
                            accessors: Default::default(),
                            declaring_type: Default::default(),
                            module: ctx.module(),
                        }),
                    )?;
                    properties.attach(owner, property)?;
                }
                Ok(properties)
            })
        })
    }

    pub fn event(&mut self, rid: u32) -> Result<EventRc> {
        let reader = self.reader;
        if let Some(event) = reader.cache.events.get(rid) {
            return Ok(event);
        }
        self.check_row(TableId::Event, rid)?;

        let position = self.logical_position(TableId::Event, rid)?;
        let owner = self
            .event_map()?
            .owner_of(position)
            .ok_or_else(|| malformed_error!("Event {} is not owned by any type", rid))?;
        let owner = self.type_definition(owner)?;
        self.events(&owner)?;

        reader
            .cache
            .events
            .get(rid)
            .ok_or_else(|| malformed_error!("Event {} is deleted", rid))
    }

    pub fn events(&mut self, owner: &TypeDefRc) -> Result<Arc<MemberCollection<EventDefinition>>> {
        owner.events.get_or_materialize(owner.token, || {
            let reader = self.reader;
            let list = self
                .event_map()?
                .ranges
                .get(&owner.token.row())
                .copied()
                .unwrap_or_default();

            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                let mut events = MemberCollection::with_capacity(list.length as usize);
                for position in list.rows() {
                    let rid = ctx.physical_row(TableId::Event, position)?;
                    if let Some(event) = reader.cache.events.get(rid) {
                        events.attach(owner, event)?;
                        continue;
                    }

                    ctx.cursor.move_to(TableId::Event, rid)?;
                    let flags = ctx.cursor.read_u16()?;
                    let name = ctx.cursor.read_string()?;
                    let event_type = ctx.cursor.read_coded_index(CodedIndexType::TypeDefOrRef)?;
                    if name == DELETED && flags & EventAttributes::RT_SPECIAL_NAME != 0 {
                        continue;
                    }

                    let name = name.to_string();
                    let event_type = if event_type.is_null() {
                        ctx.primitive(PrimitiveKind::Object)?
                    } else {
                        ctx.type_token(event_type)?
                    };
                    let token = Token::from_parts(TableId::Event, rid);
                    log::trace!("materialized event {} {}", token, name);

                    let event = reader.cache.events.insert(
                        rid,
                        Arc::new(EventDefinition {
                            token,
                            flags,
                            name,
                            event_type,
                            accessors: Default::default(),
                            declaring_type: Default::default(),
                            module: ctx.module(),
                        }),
                    )?;
                    events.attach(owner, event)?;
                }
                Ok(events)
            })
        })
    }

    pub fn property_accessors(&mut self, property: &PropertyRc) -> Result<Arc<PropertyAccessors>> {
        property.accessors.get_or_materialize(property.token, || {
            let associations = self.semantics()?.associations.get(&property.token);

            let mut accessors = PropertyAccessors::default();
            for (flags, rid) in associations.into_iter().flatten() {
                let method = self.method(*rid)?;
                if flags.contains(MethodSemanticsAttributes::GETTER) {
                    accessors.getter = Some(method);
                } else if flags.contains(MethodSemanticsAttributes::SETTER) {
                    accessors.setter = Some(method);
                } else {
                    accessors.others.push(method);
                }
            }
            Ok(accessors)
        })
    }

    pub fn event_accessors(&mut self, event: &EventRc) -> Result<Arc<EventAccessors>> {
        event.accessors.get_or_materialize(event.token, || {
            let associations = self.semantics()?.associations.get(&event.token);

            let mut accessors = EventAccessors::default();
            for (flags, rid) in associations.into_iter().flatten() {
                let method = self.method(*rid)?;
                if flags.contains(MethodSemanticsAttributes::ADD_ON) {
                    accessors.add = Some(method);
                } else if flags.contains(MethodSemanticsAttributes::REMOVE_ON) {
                    accessors.remove = Some(method);
                } else if flags.contains(MethodSemanticsAttributes::FIRE) {
                    accessors.fire = Some(method);
                } else {
                    accessors.others.push(method);
                }
            }
            Ok(accessors)
        })
    }

    /// A `MemberRef` row.
    ///
    /// The signature is read with the parent type as type context and the reference itself
    /// as method context. References whose parent mentions a generic parameter depend on
    /// the caller's context and are not cached.
    pub fn member_reference(&mut self, rid: u32) -> Result<MemberRefRc> {
        let reader = self.reader;
        if let Some(reference) = reader.cache.member_refs.get(rid) {
            return Ok(reference);
        }
        self.check_row(TableId::MemberRef, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::MemberRef, rid)?;
            let class = ctx.cursor.read_coded_index(CodedIndexType::MemberRefParent)?;
            let name = ctx.cursor.read_string()?.to_string();
            let signature = ctx.cursor.read_blob_index()?;

            let token = Token::from_parts(TableId::MemberRef, rid);
            let parent = match class.table_id() {
                Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec) => {
                    MemberRefParent::Type(ctx.type_token(class)?)
                }
                Some(TableId::MethodDef) => {
                    MemberRefParent::Method(Arc::downgrade(&ctx.method(class.row())?))
                }
                _ => {
                    return Err(malformed_error!(
                        "Unsupported parent {} of member reference {}",
                        class,
                        token
                    ))
                }
            };

            let (type_owner, cacheable) = match &parent {
                MemberRefParent::Type(ty) => (
                    GenericContext::type_owner_of(ty),
                    !ty.contains_generic_parameter(),
                ),
                MemberRefParent::Method(method) => (
                    method
                        .upgrade()
                        .and_then(|method| method.declaring_type())
                        .map(|owner| GenericParameterOwner::Type(Arc::downgrade(&owner))),
                    true,
                ),
            };

            let reference = Arc::new(MemberReference::new(token, name, parent, ctx.module()));
            let generics = GenericContext {
                type_owner,
                method_owner: Some(GenericParameterOwner::MethodReference(Arc::downgrade(
                    &reference,
                ))),
            };
            let decoded = ctx.scoped_with(generics, |ctx| ctx.decode_member_blob(signature))?;
            reference
                .signature
                .set(decoded)
                .map_err(|_| malformed_error!("Signature of {} was decoded twice", token))?;
            log::trace!("materialized member reference {} {}", token, reference.name);

            if cacheable {
                reader.cache.member_refs.insert(rid, reference)
            } else {
                Ok(reference)
            }
        })
    }

    /// A `MethodSpec` row, instantiated in the active generic context
    pub fn method_specification(&mut self, rid: u32) -> Result<GenericInstanceMethodRc> {
        let reader = self.reader;
        if let Some(instance) = reader.cache.method_specs.get(rid) {
            return Ok(instance);
        }
        self.check_row(TableId::MethodSpec, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::MethodSpec, rid)?;
            let method = ctx.cursor.read_coded_index(CodedIndexType::MethodDefOrRef)?;
            let instantiation = ctx.cursor.read_blob_index()?;

            let element = ctx.method_handle(method)?;
            let arguments = ctx.decode_method_spec_blob(instantiation)?;
            let cacheable = !arguments.iter().any(CilType::contains_generic_parameter)
                && !element
                    .declaring_type()
                    .is_some_and(|ty| ty.contains_generic_parameter());

            let instance = Arc::new(GenericInstanceMethod {
                token: Token::from_parts(TableId::MethodSpec, rid),
                element,
                arguments,
            });
            if cacheable {
                reader.cache.method_specs.insert(rid, instance)
            } else {
                Ok(instance)
            }
        })
    }

    pub fn stand_alone_signature(&mut self, rid: u32) -> Result<Arc<StandAloneSignature>> {
        let reader = self.reader;
        if let Some(signature) = reader.cache.stand_alone_sigs.get(rid) {
            return Ok(signature);
        }
        self.check_row(TableId::StandAloneSig, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::StandAloneSig, rid)?;
            let blob = ctx.cursor.read_blob_index()?;
            let signature = ctx.decode_stand_alone_blob(blob)?;

            let generic = match &signature {
                StandAloneSignature::Locals(locals) => {
                    locals.iter().any(CilType::contains_generic_parameter)
                }
                StandAloneSignature::Method(method) => method.contains_generic_parameter(),
            };
            let signature = Arc::new(signature);
            if generic {
                Ok(signature)
            } else {
                reader.cache.stand_alone_sigs.insert(rid, signature)
            }
        })
    }

    /// Resolve a `MethodDefOrRef` or `MethodSpec` token
    pub fn method_handle(&mut self, token: Token) -> Result<MethodHandle> {
        match token.table_id() {
            Some(TableId::MethodDef) if !token.is_null() => {
                Ok(MethodHandle::definition(&self.method(token.row())?))
            }
            Some(TableId::MemberRef) if !token.is_null() => {
                let reference = self.member_reference(token.row())?;
                if reference.is_field() {
                    return Err(malformed_error!("{} references a field, not a method", token));
                }
                Ok(MethodHandle::Reference(reference))
            }
            Some(TableId::MethodSpec) if !token.is_null() => Ok(MethodHandle::Instance(
                self.method_specification(token.row())?,
            )),
            _ => Err(malformed_error!("{} does not name a method", token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            image::ImageBuilder,
            reader::{MetadataItem, MetadataReader, ReaderOptions},
            tables::{CodedIndexType, FieldAttributes, MethodSemanticsAttributes, TableId},
            token::Token,
            typesystem::{GenericParameterOwner, MemberSignature},
        },
        Error,
    };

    /// `Widget` with two fields (one deleted), a generic method `T Echo<T>(T value)` with
    /// one `Param` row, and a property `Size` with a getter `get_Size`.
    fn widget() -> Arc<MetadataReader> {
        let mut b = ImageBuilder::new();
        let widget = b.string("Widget");
        b.row(TableId::TypeDef, &[0, widget, 0, 0, 1, 1]).unwrap();

        let int32 = b.blob(&[0x06, 0x08]);
        let count = b.string("count");
        let deleted = b.string("_Deleted");
        b.row(TableId::Field, &[0, count, int32]).unwrap();
        b.row(
            TableId::Field,
            &[u32::from(FieldAttributes::RT_SPECIAL_NAME), deleted, int32],
        )
        .unwrap();

        // GENERIC 1 generic, 1 param, returns !!0, takes !!0
        let echo_sig = b.blob(&[0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]);
        let echo = b.string("Echo");
        b.row(TableId::MethodDef, &[0, 0, 0, echo, echo_sig, 1]).unwrap();
        // HASTHIS, 0 params, returns int32
        let getter_sig = b.blob(&[0x20, 0x00, 0x08]);
        let get_size = b.string("get_Size");
        b.row(TableId::MethodDef, &[0, 0, 0, get_size, getter_sig, 2]).unwrap();

        let value = b.string("value");
        b.row(TableId::Param, &[0, 1, value]).unwrap();

        let t = b.string("T");
        let owner = CodedIndexType::TypeOrMethodDef
            .encode(Token::from_parts(TableId::MethodDef, 1))
            .unwrap();
        b.row(TableId::GenericParam, &[0, 0, owner, t]).unwrap();

        b.row(TableId::PropertyMap, &[1, 1]).unwrap();
        let size = b.string("Size");
        // PROPERTY HASTHIS, 0 params, int32
        let size_sig = b.blob(&[0x28, 0x00, 0x08]);
        b.row(TableId::Property, &[0, size, size_sig]).unwrap();

        let association = CodedIndexType::HasSemantics
            .encode(Token::from_parts(TableId::Property, 1))
            .unwrap();
        b.row(
            TableId::MethodSemantics,
            &[u32::from(MethodSemanticsAttributes::GETTER.bits()), 2, association],
        )
        .unwrap();

        MetadataReader::new("Widget.dll", Arc::new(b.build().unwrap()), ReaderOptions::default())
    }

    #[test]
    fn deleted_members_are_skipped() {
        let reader = widget();
        let fields = reader.read_type(1).unwrap().fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(0).unwrap().name, "count");

        assert!(matches!(
            reader.lookup_token(Token::from_parts(TableId::Field, 2)),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn member_lookup_goes_through_owner() {
        let reader = widget();
        let Some(MetadataItem::Method(method)) = reader
            .lookup_token(Token::from_parts(TableId::MethodDef, 2))
            .unwrap()
        else {
            panic!("expected a method");
        };
        assert_eq!(method.name, "get_Size");

        let owner = method.declaring_type().unwrap();
        let methods = owner.methods().unwrap();
        assert!(Arc::ptr_eq(methods.get(1).unwrap(), &method));
    }

    #[test]
    fn method_generic_parameters_bind_signature() {
        let reader = widget();
        let methods = reader.read_type(1).unwrap().methods().unwrap();
        let echo = methods.get(0).unwrap();

        let signature = echo.signature().unwrap();
        let parameter = signature.return_type.as_generic_parameter().unwrap();
        assert_eq!(parameter.name, "T");
        assert!(matches!(
            parameter.owner,
            Some(GenericParameterOwner::Method(_))
        ));
        assert_eq!(signature.parameters[0], signature.return_type);

        let generics = echo.generic_parameters().unwrap();
        assert!(Arc::ptr_eq(&generics[0], &parameter));
    }

    #[test]
    fn parameters_by_sequence() {
        let reader = widget();
        let methods = reader.read_type(1).unwrap().methods().unwrap();
        let parameters = methods.get(0).unwrap().parameters().unwrap();

        assert!(parameters.return_parameter.is_none());
        assert_eq!(parameters.parameters.len(), 1);
        assert_eq!(parameters.parameters[0].name, "value");
        assert_eq!(parameters.parameters[0].sequence, 1);

        let Some(MetadataItem::Parameter(row)) = reader
            .lookup_token(Token::from_parts(TableId::Param, 1))
            .unwrap()
        else {
            panic!("expected a parameter");
        };
        assert!(Arc::ptr_eq(&row, &parameters.parameters[0]));

        // no Param rows: synthesized entries
        let getter = methods.get(1).unwrap().parameters().unwrap();
        assert!(getter.parameters.is_empty());
    }

    #[test]
    fn property_accessors() {
        let reader = widget();
        let owner = reader.read_type(1).unwrap();
        let properties = owner.properties().unwrap();
        let size = properties.get(0).unwrap();
        assert_eq!(size.name, "Size");
        assert!(size.has_this);
        assert_eq!(size.property_type.full_name(), "System.Int32");

        let accessors = size.accessors().unwrap();
        assert_eq!(accessors.getter.as_ref().unwrap().name, "get_Size");
        assert!(accessors.setter.is_none());
        assert_eq!(
            accessors.getter.as_ref().unwrap().semantics().unwrap(),
            MethodSemanticsAttributes::GETTER
        );
    }

    #[test]
    fn member_reference_to_field() {
        let mut b = ImageBuilder::new();
        let holder = b.string("Holder");
        b.row(TableId::TypeDef, &[0, holder, 0, 0, 1, 1]).unwrap();
        let parent = CodedIndexType::MemberRefParent
            .encode(Token::from_parts(TableId::TypeDef, 1))
            .unwrap();
        let name = b.string("value");
        let signature = b.blob(&[0x06, 0x0E]);
        b.row(TableId::MemberRef, &[parent, name, signature]).unwrap();
        let reader =
            MetadataReader::new("Holder.dll", Arc::new(b.build().unwrap()), ReaderOptions::default());

        let Some(MetadataItem::MemberReference(reference)) = reader
            .lookup_token(Token::from_parts(TableId::MemberRef, 1))
            .unwrap()
        else {
            panic!("expected a member reference");
        };
        assert!(reference.is_field());
        assert!(matches!(
            reference.signature().unwrap(),
            MemberSignature::Field(ty) if ty.full_name() == "System.String"
        ));

        // cached: same node again
        let Some(MetadataItem::MemberReference(again)) = reader
            .lookup_token(Token::from_parts(TableId::MemberRef, 1))
            .unwrap()
        else {
            panic!("expected a member reference");
        };
        assert!(Arc::ptr_eq(&reference, &again));
    }

    #[test]
    fn signatures_are_set_at_materialization() {
        let reader = widget();
        let owner = reader.read_type(1).unwrap();
        let methods = owner.methods().unwrap();
        for method in methods.iter() {
            assert!(method.signature.get().is_some(), "{}", method.name);
        }

        let again = owner.methods().unwrap();
        assert!(std::ptr::eq(
            methods.get(1).unwrap().signature().unwrap(),
            again.get(1).unwrap().signature().unwrap()
        ));
    }

    #[test]
    fn truncated_signature_leaves_no_method() {
        let mut b = ImageBuilder::new();
        let broken = b.string("Broken");
        b.row(TableId::TypeDef, &[0, broken, 0, 0, 1, 1]).unwrap();
        // HASTHIS, 2 params, void, int32, then nothing
        let signature = b.blob(&[0x20, 0x02, 0x01, 0x08]);
        let run = b.string("Run");
        b.row(TableId::MethodDef, &[0, 0, 0, run, signature, 1]).unwrap();
        let reader =
            MetadataReader::new("Broken.dll", Arc::new(b.build().unwrap()), ReaderOptions::default());

        let owner = reader.read_type(1).unwrap();
        assert!(owner.methods().is_err());
        assert!(!owner.methods.is_cached());
        assert!(reader.cache.methods.get(1).is_none());
        assert!(owner.methods().is_err());
    }
}
