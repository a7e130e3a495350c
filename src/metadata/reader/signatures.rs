//! Turning decoded signature trees into graph nodes.
//!
//! The blob grammars are decoded by [`SignatureParser`] into token-bearing trees; this
//! module resolves every token and generic parameter of such a tree against the active
//! [`GenericContext`](crate::metadata::reader::GenericContext).

use std::sync::Arc;

use crate::{
    metadata::{
        reader::context::ReadContext,
        signatures::{
            SignatureMember, SignatureMethod, SignatureParser, SignatureStandAlone, TypeSignature,
        },
        typesystem::{
            ArrayDimension, CilType, GenericParameter, GenericParameterKind,
            GenericParameterOwner, MemberSignature, MethodSignature, PrimitiveKind,
            StandAloneSignature, TypeSpecKind,
        },
    },
    Result,
};

/// A decoded `PropertySig`
pub(crate) struct PropertyShape {
    pub has_this: bool,
    pub property_type: CilType,
    pub parameters: Vec<CilType>,
}

impl<'a> ReadContext<'a> {
    fn signature_parser(&self, index: u32) -> Result<SignatureParser<'a>> {
        let image = self.image;
        Ok(SignatureParser::new(image.blob(index)?).with_max_depth(self.max_depth()))
    }

    /// Resolve one decoded type
    pub fn resolve_signature(&mut self, signature: &TypeSignature) -> Result<CilType> {
        let wrap = |kind| Ok(CilType::specification(kind));

        match signature {
            TypeSignature::Void => self.primitive(PrimitiveKind::Void),
            TypeSignature::Boolean => self.primitive(PrimitiveKind::Boolean),
            TypeSignature::Char => self.primitive(PrimitiveKind::Char),
            TypeSignature::I1 => self.primitive(PrimitiveKind::SByte),
            TypeSignature::U1 => self.primitive(PrimitiveKind::Byte),
            TypeSignature::I2 => self.primitive(PrimitiveKind::Int16),
            TypeSignature::U2 => self.primitive(PrimitiveKind::UInt16),
            TypeSignature::I4 => self.primitive(PrimitiveKind::Int32),
            TypeSignature::U4 => self.primitive(PrimitiveKind::UInt32),
            TypeSignature::I8 => self.primitive(PrimitiveKind::Int64),
            TypeSignature::U8 => self.primitive(PrimitiveKind::UInt64),
            TypeSignature::R4 => self.primitive(PrimitiveKind::Single),
            TypeSignature::R8 => self.primitive(PrimitiveKind::Double),
            TypeSignature::String => self.primitive(PrimitiveKind::String),
            TypeSignature::Object => self.primitive(PrimitiveKind::Object),
            TypeSignature::I => self.primitive(PrimitiveKind::IntPtr),
            TypeSignature::U => self.primitive(PrimitiveKind::UIntPtr),
            TypeSignature::TypedByRef => self.primitive(PrimitiveKind::TypedReference),
            TypeSignature::ValueType(token) => {
                let ty = self.type_token(*token)?;
                if let CilType::Reference(reference) = &ty {
                    reference.mark_value_type();
                }
                Ok(ty)
            }
            TypeSignature::Class(token) => self.type_token(*token),
            TypeSignature::Ptr(inner) => wrap(TypeSpecKind::Pointer(self.resolve_signature(inner)?)),
            TypeSignature::ByRef(inner) => {
                wrap(TypeSpecKind::ByReference(self.resolve_signature(inner)?))
            }
            TypeSignature::Pinned(inner) => wrap(TypeSpecKind::Pinned(self.resolve_signature(inner)?)),
            TypeSignature::Sentinel(inner) => {
                wrap(TypeSpecKind::Sentinel(self.resolve_signature(inner)?))
            }
            TypeSignature::SzArray(inner) => {
                wrap(TypeSpecKind::SzArray(self.resolve_signature(inner)?))
            }
            TypeSignature::Array(array) => wrap(TypeSpecKind::Array {
                element: self.resolve_signature(&array.element)?,
                dimensions: ArrayDimension::from_shape(
                    array.rank,
                    &array.sizes,
                    &array.lower_bounds,
                ),
            }),
            TypeSignature::ModifiedRequired { modifier, element } => {
                wrap(TypeSpecKind::RequiredModifier {
                    modifier: self.type_token(*modifier)?,
                    element: self.resolve_signature(element)?,
                })
            }
            TypeSignature::ModifiedOptional { modifier, element } => {
                wrap(TypeSpecKind::OptionalModifier {
                    modifier: self.type_token(*modifier)?,
                    element: self.resolve_signature(element)?,
                })
            }
            TypeSignature::GenericInst {
                value_type,
                element,
                arguments,
            } => {
                let element = self.type_token(*element)?;
                if *value_type {
                    if let CilType::Reference(reference) = &element {
                        reference.mark_value_type();
                    }
                }

                let arguments = arguments
                    .iter()
                    .map(|argument| self.resolve_signature(argument))
                    .collect::<Result<Vec<_>>>()?;
                wrap(TypeSpecKind::GenericInstance {
                    element,
                    arguments,
                    value_type: *value_type,
                })
            }
            TypeSignature::GenericParamType(position) => {
                self.generic_argument(GenericParameterKind::Type, *position)
            }
            TypeSignature::GenericParamMethod(position) => {
                self.generic_argument(GenericParameterKind::Method, *position)
            }
            TypeSignature::FnPtr(method) => wrap(TypeSpecKind::FunctionPointer(Box::new(
                self.resolve_method_signature(method)?,
            ))),
        }
    }

    /// `!n` or `!!n` in the active generic context.
    ///
    /// Definitions hand out their declared parameters, references stable placeholders.
    /// Without an owner of the right kind the parameter stays unbound.
    fn generic_argument(&mut self, kind: GenericParameterKind, position: u32) -> Result<CilType> {
        let owner = match kind {
            GenericParameterKind::Type => self.generics.type_owner.clone(),
            GenericParameterKind::Method => self.generics.method_owner.clone(),
        };

        let parameter = match &owner {
            Some(GenericParameterOwner::TypeReference(reference)) => match reference.upgrade() {
                Some(reference) => reference.generic_parameter(position)?,
                None => self.unbound_parameter(kind, position)?,
            },
            Some(GenericParameterOwner::MethodReference(reference)) => match reference.upgrade() {
                Some(reference) => reference.generic_parameter(position)?,
                None => self.unbound_parameter(kind, position)?,
            },
            Some(owner) => {
                let parameters = self.generic_parameters(owner)?;
                parameters
                    .get(position as usize)
                    .cloned()
                    .ok_or_else(|| {
                        malformed_error!(
                            "Generic parameter {} outside of the {} declared by {}",
                            position,
                            parameters.len(),
                            owner.token()
                        )
                    })?
            }
            None => self.unbound_parameter(kind, position)?,
        };

        Ok(CilType::generic_parameter(&parameter))
    }

    fn unbound_parameter(
        &self,
        kind: GenericParameterKind,
        position: u32,
    ) -> Result<Arc<GenericParameter>> {
        let mut unbound = lock!(self.reader.cache.unbound_params)?;
        Ok(unbound
            .entry((kind, position))
            .or_insert_with(|| {
                Arc::new(GenericParameter::placeholder(
                    position,
                    kind,
                    None,
                    self.module(),
                ))
            })
            .clone())
    }

    pub fn resolve_method_signature(&mut self, method: &SignatureMethod) -> Result<MethodSignature> {
        let return_type = self.resolve_signature(&method.return_type)?;
        let parameters = method
            .params
            .iter()
            .map(|parameter| self.resolve_signature(parameter))
            .collect::<Result<Vec<_>>>()?;

        Ok(MethodSignature {
            has_this: method.has_this,
            explicit_this: method.explicit_this,
            calling_convention: method.calling_convention,
            generic_arity: method.generic_param_count,
            return_type,
            parameters,
        })
    }

    /// `TypeSpec` blob
    pub fn decode_type_blob(&mut self, index: u32) -> Result<CilType> {
        let signature = self.signature_parser(index)?.parse_type_spec_signature()?;
        self.resolve_signature(&signature)
    }

    /// `FieldSig` blob
    pub fn decode_field_blob(&mut self, index: u32) -> Result<CilType> {
        let signature = self.signature_parser(index)?.parse_field_signature()?;
        self.resolve_signature(&signature.field_type)
    }

    /// `MethodDefSig` blob
    pub fn decode_method_blob(&mut self, index: u32) -> Result<MethodSignature> {
        let signature = self.signature_parser(index)?.parse_method_signature()?;
        self.resolve_method_signature(&signature)
    }

    /// `PropertySig` blob
    pub fn decode_property_blob(&mut self, index: u32) -> Result<PropertyShape> {
        let signature = self.signature_parser(index)?.parse_property_signature()?;
        let property_type = self.resolve_signature(&signature.property_type)?;
        let parameters = signature
            .params
            .iter()
            .map(|parameter| self.resolve_signature(parameter))
            .collect::<Result<Vec<_>>>()?;

        Ok(PropertyShape {
            has_this: signature.has_this,
            property_type,
            parameters,
        })
    }

    /// `MemberRef` blob, field or method by its first byte
    pub fn decode_member_blob(&mut self, index: u32) -> Result<MemberSignature> {
        match self.signature_parser(index)?.parse_member_signature()? {
            SignatureMember::Field(field) => Ok(MemberSignature::Field(
                self.resolve_signature(&field.field_type)?,
            )),
            SignatureMember::Method(method) => Ok(MemberSignature::Method(
                self.resolve_method_signature(&method)?,
            )),
        }
    }

    /// `MethodSpec` instantiation blob
    pub fn decode_method_spec_blob(&mut self, index: u32) -> Result<Vec<CilType>> {
        let signature = self.signature_parser(index)?.parse_method_spec_signature()?;
        signature
            .generic_args
            .iter()
            .map(|argument| self.resolve_signature(argument))
            .collect()
    }

    /// `StandAloneSig` blob
    pub fn decode_stand_alone_blob(&mut self, index: u32) -> Result<StandAloneSignature> {
        match self.signature_parser(index)?.parse_stand_alone_signature()? {
            SignatureStandAlone::Locals(locals) => Ok(StandAloneSignature::Locals(
                locals
                    .locals
                    .iter()
                    .map(|local| self.resolve_signature(local))
                    .collect::<Result<Vec<_>>>()?,
            )),
            SignatureStandAlone::Method(method) => Ok(StandAloneSignature::Method(
                self.resolve_method_signature(&method)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            image::ImageBuilder,
            reader::{MetadataReader, ReaderOptions},
            tables::TableId,
            typesystem::{CilType, TypeSpecKind},
        },
        Error,
    };

    /// One type `Holder` with one field per entry of `signatures`
    fn reader(signatures: &[&[u8]], options: ReaderOptions) -> Arc<MetadataReader> {
        let mut builder = ImageBuilder::new();
        let name = builder.string("Holder");
        builder.row(TableId::TypeDef, &[0, name, 0, 0, 1, 1]).unwrap();
        for (index, signature) in signatures.iter().enumerate() {
            let field_name = builder.string(&format!("f{index}"));
            let blob = builder.blob(signature);
            builder.row(TableId::Field, &[0, field_name, blob]).unwrap();
        }
        MetadataReader::new("Holder.dll", Arc::new(builder.build().unwrap()), options)
    }

    #[test]
    fn constructed_types() {
        let reader = reader(
            &[
                // int32[]
                &[0x06, 0x1D, 0x08],
                // string[0...,0...]
                &[0x06, 0x14, 0x0E, 0x02, 0x00, 0x02, 0x00, 0x00],
                // int32*
                &[0x06, 0x0F, 0x08],
                // modreq(Holder) int32
                &[0x06, 0x1F, 0x04, 0x08],
            ],
            ReaderOptions::default(),
        );
        let holder = reader.read_type(1).unwrap();
        let fields = holder.fields().unwrap();
        let names: Vec<String> = fields.iter().map(|f| f.field_type.full_name()).collect();
        assert_eq!(names[0], "System.Int32[]");
        assert_eq!(names[2], "System.Int32*");

        let Some(spec) = fields.get(1).unwrap().field_type.as_specification().cloned() else {
            panic!("expected an array");
        };
        let TypeSpecKind::Array { dimensions, .. } = &spec.kind else {
            panic!("expected a general array");
        };
        assert_eq!(dimensions.len(), 2);
        assert_eq!(dimensions[0].lower_bound, Some(0));

        let modified = &fields.get(3).unwrap().field_type;
        let Some(TypeSpecKind::RequiredModifier { modifier, element }) =
            modified.as_specification().map(|spec| &spec.kind)
        else {
            panic!("expected a required modifier");
        };
        assert_eq!(modifier, &CilType::definition(&holder));
        assert_eq!(element.full_name(), "System.Int32");
    }

    #[test]
    fn primitives_are_shared() {
        let reader = reader(&[&[0x06, 0x08], &[0x06, 0x08]], ReaderOptions::default());
        let fields = reader.read_type(1).unwrap().fields().unwrap();
        assert_eq!(
            fields.get(0).unwrap().field_type,
            fields.get(1).unwrap().field_type
        );
        assert!(fields.get(0).unwrap().field_type.is_value_type());
    }

    #[test]
    fn unbound_parameter_without_context() {
        // `Holder` declares no generic parameters, so `!0` has no definition to bind to
        let reader = reader(&[&[0x06, 0x13, 0x00]], ReaderOptions::default());
        assert!(matches!(
            reader.read_type(1).unwrap().fields(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn nesting_limit_applies() {
        let mut deep = vec![0x06];
        deep.extend(std::iter::repeat(0x1D).take(40));
        deep.push(0x08);

        let reader = reader(
            &[&deep],
            ReaderOptions::default().with_max_signature_depth(8),
        );
        assert!(matches!(
            reader.read_type(1).unwrap().fields(),
            Err(Error::RecursionLimit(_))
        ));
    }
}
