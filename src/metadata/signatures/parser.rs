use crate::{
    file::parser::Parser,
    metadata::signatures::{
        CallingConvention, SignatureArray, SignatureField, SignatureLocalVariables,
        SignatureMember, SignatureMethod, SignatureMethodSpec, SignatureProperty,
        SignatureStandAlone, TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    Error, Result,
};

/// Default nesting limit of [`SignatureParser`]
pub const MAX_RECURSION_DEPTH: usize = 50;

/// Recursive-descent decoder for signature blobs.
///
/// One parser decodes one blob. Nesting of types deeper than the configured limit fails
/// with [`Error::RecursionLimit`] instead of exhausting the stack.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
    max_depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Decoder over `data` with the default nesting limit
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
            max_depth: MAX_RECURSION_DEPTH,
        }
    }

    /// Replace the nesting limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decode one type
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] on an unknown element type, [`Error::RecursionLimit`]
    /// if nesting is too deep, [`Error::OutOfBounds`] on truncated data.
    pub fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(Error::RecursionLimit(self.max_depth));
        }

        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VOID => Ok(TypeSignature::Void),
            ELEMENT_TYPE::BOOLEAN => Ok(TypeSignature::Boolean),
            ELEMENT_TYPE::CHAR => Ok(TypeSignature::Char),
            ELEMENT_TYPE::I1 => Ok(TypeSignature::I1),
            ELEMENT_TYPE::U1 => Ok(TypeSignature::U1),
            ELEMENT_TYPE::I2 => Ok(TypeSignature::I2),
            ELEMENT_TYPE::U2 => Ok(TypeSignature::U2),
            ELEMENT_TYPE::I4 => Ok(TypeSignature::I4),
            ELEMENT_TYPE::U4 => Ok(TypeSignature::U4),
            ELEMENT_TYPE::I8 => Ok(TypeSignature::I8),
            ELEMENT_TYPE::U8 => Ok(TypeSignature::U8),
            ELEMENT_TYPE::R4 => Ok(TypeSignature::R4),
            ELEMENT_TYPE::R8 => Ok(TypeSignature::R8),
            ELEMENT_TYPE::STRING => Ok(TypeSignature::String),
            ELEMENT_TYPE::OBJECT => Ok(TypeSignature::Object),
            ELEMENT_TYPE::I => Ok(TypeSignature::I),
            ELEMENT_TYPE::U => Ok(TypeSignature::U),
            ELEMENT_TYPE::TYPEDBYREF => Ok(TypeSignature::TypedByRef),
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Ptr(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::BYREF => Ok(TypeSignature::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::PINNED => Ok(TypeSignature::Pinned(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::SENTINEL => Ok(TypeSignature::Sentinel(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SzArray(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::VALUETYPE => Ok(TypeSignature::ValueType(
                self.parser.read_compressed_token()?,
            )),
            ELEMENT_TYPE::CLASS => Ok(TypeSignature::Class(self.parser.read_compressed_token()?)),
            ELEMENT_TYPE::VAR => Ok(TypeSignature::GenericParamType(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::MVAR => Ok(TypeSignature::GenericParamMethod(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::ARRAY => {
                let element = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                let num_sizes = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(num_sizes.min(rank) as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                let mut lower_bounds = Vec::with_capacity(num_lo_bounds.min(rank) as usize);
                for _ in 0..num_lo_bounds {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSignature::Array(SignatureArray {
                    element: Box::new(element),
                    rank,
                    sizes,
                    lower_bounds,
                }))
            }
            ELEMENT_TYPE::GENERICINST => {
                let value_type = match self.parser.read_le::<u8>()? {
                    ELEMENT_TYPE::VALUETYPE => true,
                    ELEMENT_TYPE::CLASS => false,
                    other => {
                        return Err(malformed_error!(
                            "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                            other
                        ))
                    }
                };

                let element = self.parser.read_compressed_token()?;
                let arg_count = self.parser.read_compressed_uint()?;

                let mut arguments = Vec::with_capacity(arg_count.min(64) as usize);
                for _ in 0..arg_count {
                    arguments.push(self.parse_type()?);
                }

                Ok(TypeSignature::GenericInst {
                    value_type,
                    element,
                    arguments,
                })
            }
            ELEMENT_TYPE::CMOD_REQD => {
                let modifier = self.parser.read_compressed_token()?;
                Ok(TypeSignature::ModifiedRequired {
                    modifier,
                    element: Box::new(self.parse_type()?),
                })
            }
            ELEMENT_TYPE::CMOD_OPT => {
                let modifier = self.parser.read_compressed_token()?;
                Ok(TypeSignature::ModifiedOptional {
                    modifier,
                    element: Box::new(self.parse_type()?),
                })
            }
            ELEMENT_TYPE::FNPTR => Ok(TypeSignature::FnPtr(Box::new(
                self.parse_method_signature()?,
            ))),
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {}",
                current_byte
            )),
        }
    }

    /// Decode a method signature (`MethodDefSig`, `MethodRefSig`, `StandAloneMethodSig`).
    ///
    /// Parameters following a `SENTINEL` byte are wrapped in [`TypeSignature::Sentinel`]
    /// only for the first of them, marking where the varargs start.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for a calling convention that is not a method
    /// convention, plus every error of [`SignatureParser::parse_type`].
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention_byte = self.parser.read_le::<u8>()?;
        let Some(calling_convention) = CallingConvention::from_bits(convention_byte) else {
            return Err(Error::NotSupported(format!(
                "Calling convention 0x{convention_byte:02x}"
            )));
        };

        let generic_param_count = if convention_byte & SIGNATURE_HEADER::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        for _ in 0..param_count {
            // SENTINEL itself is not counted, it prefixes the first vararg parameter
            params.push(self.parse_type()?);
        }

        Ok(SignatureMethod {
            has_this: convention_byte & SIGNATURE_HEADER::HAS_THIS != 0,
            explicit_this: convention_byte & SIGNATURE_HEADER::EXPLICIT_THIS != 0,
            calling_convention,
            generic_param_count,
            return_type,
            params,
        })
    }

    /// Decode a `FieldSig`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the blob does not start with `FIELD` (0x06).
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        Ok(SignatureField {
            field_type: self.parse_type()?,
        })
    }

    /// Decode a `PropertySig`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the `PROPERTY` bit (0x08) is missing.
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let head_byte = self.parser.read_le::<u8>()?;
        if (head_byte & 0x0F) != SIGNATURE_HEADER::PROPERTY {
            return Err(malformed_error!(
                "SignatureProperty - invalid start - {}",
                head_byte
            ));
        }

        let param_count = self.parser.read_compressed_uint()?;
        let property_type = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        for _ in 0..param_count {
            params.push(self.parse_type()?);
        }

        Ok(SignatureProperty {
            has_this: head_byte & SIGNATURE_HEADER::HAS_THIS != 0,
            property_type,
            params,
        })
    }

    /// Decode a `LocalVarSig`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the blob does not start with `LOCAL_SIG` (0x07).
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            locals.push(self.parse_type()?);
        }

        Ok(SignatureLocalVariables { locals })
    }

    /// Decode a `TypeSpec` blob, which is a bare type
    ///
    /// # Errors
    /// Every error of [`SignatureParser::parse_type`].
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSignature> {
        self.parse_type()
    }

    /// Decode a `MethodSpec` instantiation
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the blob does not start with `GENERICINST` (0x0A).
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::GENERIC_INST {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head_byte
            ));
        }

        let arg_count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(arg_count.min(64) as usize);
        for _ in 0..arg_count {
            generic_args.push(self.parse_type()?);
        }

        Ok(SignatureMethodSpec { generic_args })
    }

    /// Decode a `MemberRef` signature, a field if the first byte is `FIELD`
    ///
    /// # Errors
    /// Errors of the field or method decoder.
    pub fn parse_member_signature(&mut self) -> Result<SignatureMember> {
        if self.parser.peek_byte()? == SIGNATURE_HEADER::FIELD {
            Ok(SignatureMember::Field(self.parse_field_signature()?))
        } else {
            Ok(SignatureMember::Method(self.parse_method_signature()?))
        }
    }

    /// Decode a `StandAloneSig` blob, locals if the first byte is `LOCAL_SIG`
    ///
    /// # Errors
    /// Errors of the locals or method decoder.
    pub fn parse_stand_alone_signature(&mut self) -> Result<SignatureStandAlone> {
        if self.parser.peek_byte()? == SIGNATURE_HEADER::LOCAL_SIG {
            Ok(SignatureStandAlone::Locals(self.parse_local_var_signature()?))
        } else {
            Ok(SignatureStandAlone::Method(self.parse_method_signature()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn test_parse_primitive_types() {
        let test_cases = [
            (vec![0x01], TypeSignature::Void),
            (vec![0x02], TypeSignature::Boolean),
            (vec![0x08], TypeSignature::I4),
            (vec![0x0E], TypeSignature::String),
            (vec![0x1C], TypeSignature::Object),
            (vec![0x18], TypeSignature::I),
            (vec![0x16], TypeSignature::TypedByRef),
        ];

        for (input, expected) in test_cases {
            let mut parser = SignatureParser::new(&input);
            assert_eq!(parser.parse_type().unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_class_and_valuetype() {
        // CLASS TypeRef row 2: (2 << 2) | 1
        let mut parser = SignatureParser::new(&[0x12, 0x09]);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::Class(Token::new(0x0100_0002))
        );

        // VALUETYPE TypeDef row 3
        let mut parser = SignatureParser::new(&[0x11, 0x0C]);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::ValueType(Token::new(0x0200_0003))
        );
    }

    #[test]
    fn test_parse_generic_instance() {
        // GENERICINST CLASS TypeRef#1 <int32, !0>
        let data = [0x15, 0x12, 0x05, 0x02, 0x08, 0x13, 0x00];
        let mut parser = SignatureParser::new(&data);

        let parsed = parser.parse_type().unwrap();
        assert_eq!(
            parsed,
            TypeSignature::GenericInst {
                value_type: false,
                element: Token::new(0x0100_0001),
                arguments: vec![TypeSignature::I4, TypeSignature::GenericParamType(0)],
            }
        );
        assert!(parsed.contains_generic_parameter());
    }

    #[test]
    fn test_generic_instance_requires_class_or_valuetype() {
        let mut parser = SignatureParser::new(&[0x15, 0x08, 0x05, 0x01, 0x08]);
        assert!(matches!(parser.parse_type(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_parse_array_shape() {
        // int32[0...9, -3...]: rank 2, one size, two lower bounds
        let data = [0x14, 0x08, 0x02, 0x01, 0x0A, 0x02, 0x00, 0x7B];
        let mut parser = SignatureParser::new(&data);

        let TypeSignature::Array(array) = parser.parse_type().unwrap() else {
            panic!("expected array");
        };
        assert_eq!(*array.element, TypeSignature::I4);
        assert_eq!(array.rank, 2);
        assert_eq!(array.sizes, vec![10]);
        assert_eq!(array.lower_bounds, vec![0, -3]);
    }

    #[test]
    fn test_parse_modifiers() {
        // modreq(TypeRef#1) modopt(TypeRef#2) int32
        let data = [0x1F, 0x05, 0x20, 0x09, 0x08];
        let mut parser = SignatureParser::new(&data);

        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::ModifiedRequired {
                modifier: Token::new(0x0100_0001),
                element: Box::new(TypeSignature::ModifiedOptional {
                    modifier: Token::new(0x0100_0002),
                    element: Box::new(TypeSignature::I4),
                }),
            }
        );
    }

    #[test]
    fn test_parse_method_signature() {
        // instance generic<1> void (int32, !!0)
        let data = [0x30, 0x01, 0x02, 0x01, 0x08, 0x1E, 0x00];
        let mut parser = SignatureParser::new(&data);

        let method = parser.parse_method_signature().unwrap();
        assert!(method.has_this);
        assert!(!method.explicit_this);
        assert_eq!(method.calling_convention, CallingConvention::Default);
        assert_eq!(method.generic_param_count, 1);
        assert_eq!(method.return_type, TypeSignature::Void);
        assert_eq!(
            method.params,
            vec![TypeSignature::I4, TypeSignature::GenericParamMethod(0)]
        );
        assert_eq!(method.sentinel_position(), None);
    }

    #[test]
    fn test_parse_vararg_call_site() {
        // vararg void (int32, ..., string)
        let data = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0E];
        let mut parser = SignatureParser::new(&data);

        let method = parser.parse_method_signature().unwrap();
        assert_eq!(method.calling_convention, CallingConvention::VarArg);
        assert_eq!(method.sentinel_position(), Some(1));
        assert_eq!(
            method.params[1],
            TypeSignature::Sentinel(Box::new(TypeSignature::String))
        );
    }

    #[test]
    fn test_unsupported_calling_convention() {
        let mut parser = SignatureParser::new(&[0x0B, 0x00, 0x01]);
        assert!(matches!(
            parser.parse_method_signature(),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_parse_field_and_property() {
        let mut parser = SignatureParser::new(&[0x06, 0x1D, 0x08]);
        assert_eq!(
            parser.parse_field_signature().unwrap().field_type,
            TypeSignature::SzArray(Box::new(TypeSignature::I4))
        );

        let mut parser = SignatureParser::new(&[0x07, 0x08]);
        assert!(parser.parse_field_signature().is_err());

        // instance string Item[int32]
        let mut parser = SignatureParser::new(&[0x28, 0x01, 0x0E, 0x08]);
        let property = parser.parse_property_signature().unwrap();
        assert!(property.has_this);
        assert_eq!(property.property_type, TypeSignature::String);
        assert_eq!(property.params, vec![TypeSignature::I4]);
    }

    #[test]
    fn test_parse_locals_and_method_spec() {
        // pinned byref int32, object
        let mut parser = SignatureParser::new(&[0x07, 0x02, 0x45, 0x10, 0x08, 0x1C]);
        let locals = parser.parse_local_var_signature().unwrap();
        assert_eq!(
            locals.locals,
            vec![
                TypeSignature::Pinned(Box::new(TypeSignature::ByRef(Box::new(
                    TypeSignature::I4
                )))),
                TypeSignature::Object,
            ]
        );

        let mut parser = SignatureParser::new(&[0x0A, 0x02, 0x02, 0x0E]);
        assert_eq!(
            parser.parse_method_spec_signature().unwrap().generic_args,
            vec![TypeSignature::Boolean, TypeSignature::String]
        );
    }

    #[test]
    fn test_member_and_stand_alone_dispatch() {
        let mut parser = SignatureParser::new(&[0x06, 0x08]);
        assert!(matches!(
            parser.parse_member_signature().unwrap(),
            SignatureMember::Field(_)
        ));

        let mut parser = SignatureParser::new(&[0x20, 0x00, 0x01]);
        assert!(matches!(
            parser.parse_member_signature().unwrap(),
            SignatureMember::Method(_)
        ));

        let mut parser = SignatureParser::new(&[0x07, 0x00]);
        assert!(matches!(
            parser.parse_stand_alone_signature().unwrap(),
            SignatureStandAlone::Locals(_)
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let mut data = vec![ELEMENT_TYPE::SZARRAY; 10];
        data.push(ELEMENT_TYPE::I4);

        let mut parser = SignatureParser::new(&data).with_max_depth(5);
        assert!(matches!(parser.parse_type(), Err(Error::RecursionLimit(5))));

        let mut parser = SignatureParser::new(&data);
        assert!(parser.parse_type().is_ok());
    }

    #[test]
    fn test_unknown_element_type() {
        let mut parser = SignatureParser::new(&[0x17]);
        assert!(matches!(parser.parse_type(), Err(Error::Malformed { .. })));

        let mut parser = SignatureParser::new(&[0x12]);
        assert!(matches!(parser.parse_type(), Err(Error::OutOfBounds { .. })));
    }
}
