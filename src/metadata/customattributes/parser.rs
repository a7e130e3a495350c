//! Custom attribute blob decoding (ECMA-335 II.23.3).
//!
//! A blob starts with the prolog `0x0001`, followed by one fixed argument per constructor
//! parameter and a `u16` count of named arguments. Fixed arguments are decoded with the
//! constructor parameter types; named arguments carry their own `FieldOrPropType`.
//!
//! Enum arguments are encoded as their underlying integral value, so decoding them needs
//! the enum's definition. That lookup goes through [`AttributeTypeResolver`].

use crate::{
    file::parser::Parser,
    metadata::{
        customattributes::types::{
            ArgumentType, CustomAttributeArgument, CustomAttributeNamedArgument,
            CustomAttributeValue, SERIALIZATION_TYPE,
        },
        signatures::MAX_RECURSION_DEPTH,
        typesystem::{CilType, PrimitiveKind, PrimitiveValue, TypeSpecKind},
    },
    Error, Result,
};

/// Finds the underlying type of enums named in custom attribute blobs
pub trait AttributeTypeResolver {
    /// Underlying type of `ty` if it is an enum, `None` if it is not or cannot be resolved
    ///
    /// # Errors
    /// Fails if resolving `ty` reads malformed metadata.
    fn enum_underlying_type(&self, ty: &CilType) -> Result<Option<PrimitiveKind>>;

    /// Underlying type of the enum called `name`, a possibly assembly-qualified
    /// reflection name
    ///
    /// # Errors
    /// Fails if resolving the name reads malformed metadata.
    fn enum_underlying_type_by_name(&self, name: &str) -> Result<Option<PrimitiveKind>>;
}

/// Resolves nothing; every enum falls back to `Int32`
pub struct NoTypeResolver;

impl AttributeTypeResolver for NoTypeResolver {
    fn enum_underlying_type(&self, _ty: &CilType) -> Result<Option<PrimitiveKind>> {
        Ok(None)
    }

    fn enum_underlying_type_by_name(&self, _name: &str) -> Result<Option<PrimitiveKind>> {
        Ok(None)
    }
}

/// Decoder for one custom attribute blob
pub struct CustomAttributeParser<'a> {
    parser: Parser<'a>,
    resolver: &'a dyn AttributeTypeResolver,
    depth: usize,
    max_depth: usize,
}

impl<'a> CustomAttributeParser<'a> {
    /// A parser over `data`, resolving enums through `resolver`
    #[must_use]
    pub fn new(data: &'a [u8], resolver: &'a dyn AttributeTypeResolver) -> Self {
        CustomAttributeParser {
            parser: Parser::new(data),
            resolver,
            depth: 0,
            max_depth: MAX_RECURSION_DEPTH,
        }
    }

    /// Limit nesting of arrays and boxed values
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decode the whole blob for a constructor taking `parameters`.
    ///
    /// An empty blob is accepted for a parameterless constructor.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] on a wrong prolog, an argument type that cannot
    /// appear in an attribute, or truncated data.
    pub fn parse_custom_attribute(
        &mut self,
        parameters: &[CilType],
    ) -> Result<CustomAttributeValue> {
        if self.parser.is_empty() && parameters.is_empty() {
            return Ok(CustomAttributeValue::default());
        }

        let prolog = self.parser.read_le::<u16>()?;
        if prolog != 0x0001 {
            return Err(malformed_error!(
                "Invalid custom attribute prolog - expected 0x0001, got 0x{:04x}",
                prolog
            ));
        }

        let mut fixed_args = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let arg_type = self.argument_type(parameter)?;
            fixed_args.push(self.read_value(&arg_type)?);
        }

        let named_args = if self.parser.has_more_data() {
            let count = self.parser.read_le::<u16>()?;
            self.read_named_arguments(u32::from(count))?
        } else {
            Vec::new()
        };

        Ok(CustomAttributeValue {
            fixed_args,
            named_args,
        })
    }

    /// Decode `count` named arguments at the current position
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] on a kind byte other than `0x53`/`0x54`, a bad
    /// `FieldOrPropType` or truncated data.
    pub(crate) fn read_named_arguments(
        &mut self,
        count: u32,
    ) -> Result<Vec<CustomAttributeNamedArgument>> {
        let mut named_args = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            named_args.push(self.read_named_argument()?);
        }
        Ok(named_args)
    }

    /// The underlying parser, for callers interleaving their own fields
    pub(crate) fn parser(&mut self) -> &mut Parser<'a> {
        &mut self.parser
    }

    fn read_named_argument(&mut self) -> Result<CustomAttributeNamedArgument> {
        let kind = self.parser.read_le::<u8>()?;
        let is_field = match kind {
            SERIALIZATION_TYPE::FIELD => true,
            SERIALIZATION_TYPE::PROPERTY => false,
            _ => {
                return Err(malformed_error!(
                    "Invalid named argument kind - 0x{:02x}",
                    kind
                ))
            }
        };

        let arg_type = self.read_field_or_prop_type()?;
        let name = self
            .parser
            .read_ser_string()?
            .ok_or_else(|| malformed_error!("Named argument without a name"))?;
        let value = self.read_value(&arg_type)?;

        Ok(CustomAttributeNamedArgument {
            is_field,
            name,
            arg_type: arg_type.to_string(),
            value,
        })
    }

    /// Map a constructor parameter type to the encoding of its argument
    fn argument_type(&mut self, ty: &CilType) -> Result<ArgumentType> {
        if let Some(TypeSpecKind::SzArray(element)) =
            ty.as_specification().map(|specification| &specification.kind)
        {
            return Ok(ArgumentType::SzArray(Box::new(self.argument_type(element)?)));
        }

        match ty.primitive_kind() {
            Some(PrimitiveKind::Object) => return Ok(ArgumentType::Object),
            Some(kind) => return Ok(ArgumentType::Primitive(kind)),
            None => {}
        }

        if ty.namespace() == "System" && ty.name() == "Type" {
            return Ok(ArgumentType::Type);
        }

        if ty.as_specification().is_some() || ty.as_generic_parameter().is_some() {
            return Err(malformed_error!(
                "Type {} cannot be a custom attribute argument",
                ty.full_name()
            ));
        }

        let underlying = match self.resolver.enum_underlying_type(ty)? {
            Some(kind) => kind,
            None => {
                log::warn!(
                    "Underlying type of enum {} is unknown, assuming System.Int32",
                    ty.full_name()
                );
                PrimitiveKind::Int32
            }
        };
        Ok(ArgumentType::Enum {
            name: ty.full_name(),
            underlying,
        })
    }

    fn read_field_or_prop_type(&mut self) -> Result<ArgumentType> {
        let tag = self.parser.read_le::<u8>()?;
        match tag {
            SERIALIZATION_TYPE::TAGGED_OBJECT => Ok(ArgumentType::Object),
            SERIALIZATION_TYPE::TYPE => Ok(ArgumentType::Type),
            SERIALIZATION_TYPE::SZARRAY => {
                self.enter()?;
                let element = self.read_field_or_prop_type();
                self.depth -= 1;
                Ok(ArgumentType::SzArray(Box::new(element?)))
            }
            SERIALIZATION_TYPE::ENUM => {
                let name = self
                    .parser
                    .read_ser_string()?
                    .ok_or_else(|| malformed_error!("Enum argument without a type name"))?;
                let underlying = match self.resolver.enum_underlying_type_by_name(&name)? {
                    Some(kind) => kind,
                    None => {
                        log::warn!(
                            "Underlying type of enum {} is unknown, assuming System.Int32",
                            name
                        );
                        PrimitiveKind::Int32
                    }
                };
                Ok(ArgumentType::Enum { name, underlying })
            }
            SERIALIZATION_TYPE::BOOLEAN..=SERIALIZATION_TYPE::STRING => {
                PrimitiveKind::from_element_type(tag)
                    .map(ArgumentType::Primitive)
                    .ok_or_else(|| malformed_error!("Invalid FieldOrPropType - 0x{:02x}", tag))
            }
            _ => Err(malformed_error!("Invalid FieldOrPropType - 0x{:02x}", tag)),
        }
    }

    fn read_value(&mut self, arg_type: &ArgumentType) -> Result<CustomAttributeArgument> {
        match arg_type {
            ArgumentType::Primitive(PrimitiveKind::String) => {
                Ok(CustomAttributeArgument::String(self.parser.read_ser_string()?))
            }
            ArgumentType::Primitive(kind) => self.read_primitive(*kind),
            ArgumentType::Type => Ok(CustomAttributeArgument::Type(
                self.parser.read_ser_string()?,
            )),
            ArgumentType::Object => {
                self.enter()?;
                let value = self
                    .read_field_or_prop_type()
                    .and_then(|boxed| self.read_value(&boxed));
                self.depth -= 1;
                value
            }
            ArgumentType::Enum { name, underlying } => {
                let value = self.read_primitive(*underlying)?;
                Ok(CustomAttributeArgument::Enum(name.clone(), Box::new(value)))
            }
            ArgumentType::SzArray(element) => {
                let length = self.parser.read_le::<u32>()?;
                if length == u32::MAX {
                    return Ok(CustomAttributeArgument::Array(None));
                }
                if length as usize > self.parser.remaining() {
                    return Err(malformed_error!(
                        "Array of {} elements exceeds the blob",
                        length
                    ));
                }

                self.enter()?;
                let values = (0..length)
                    .map(|_| self.read_value(element))
                    .collect::<Result<Vec<_>>>();
                self.depth -= 1;
                Ok(CustomAttributeArgument::Array(Some(values?)))
            }
        }
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<CustomAttributeArgument> {
        let value = match kind {
            PrimitiveKind::Boolean
            | PrimitiveKind::Char
            | PrimitiveKind::SByte
            | PrimitiveKind::Byte
            | PrimitiveKind::Int16
            | PrimitiveKind::UInt16
            | PrimitiveKind::Int32
            | PrimitiveKind::UInt32
            | PrimitiveKind::Int64
            | PrimitiveKind::UInt64
            | PrimitiveKind::Single
            | PrimitiveKind::Double => PrimitiveValue::read(&mut self.parser, kind.element_type())?,
            _ => {
                return Err(malformed_error!(
                    "{} cannot be a custom attribute argument",
                    kind
                ))
            }
        };

        Ok(match value {
            PrimitiveValue::Boolean(value) => CustomAttributeArgument::Bool(value),
            PrimitiveValue::Char(value) => CustomAttributeArgument::Char(value),
            PrimitiveValue::I1(value) => CustomAttributeArgument::I1(value),
            PrimitiveValue::U1(value) => CustomAttributeArgument::U1(value),
            PrimitiveValue::I2(value) => CustomAttributeArgument::I2(value),
            PrimitiveValue::U2(value) => CustomAttributeArgument::U2(value),
            PrimitiveValue::I4(value) => CustomAttributeArgument::I4(value),
            PrimitiveValue::U4(value) => CustomAttributeArgument::U4(value),
            PrimitiveValue::I8(value) => CustomAttributeArgument::I8(value),
            PrimitiveValue::U8(value) => CustomAttributeArgument::U8(value),
            PrimitiveValue::R4(value) => CustomAttributeArgument::R4(value),
            PrimitiveValue::R8(value) => CustomAttributeArgument::R8(value),
            PrimitiveValue::String(value) => CustomAttributeArgument::String(Some(value)),
            PrimitiveValue::Null => CustomAttributeArgument::String(None),
        })
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }
}

/// Decode a custom attribute blob without enum resolution
///
/// # Errors
/// See [`CustomAttributeParser::parse_custom_attribute`].
pub fn parse_custom_attribute_data(
    data: &[u8],
    parameters: &[CilType],
) -> Result<CustomAttributeValue> {
    CustomAttributeParser::new(data, &NoTypeResolver).parse_custom_attribute(parameters)
}
