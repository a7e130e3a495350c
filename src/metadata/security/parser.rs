//! `DeclSecurity` permission set blobs.
//!
//! Since .NET 2.0 a permission set is binary: a `.` marker, a compressed attribute count,
//! and per attribute its type name, a blob size and the named arguments in custom attribute
//! encoding. Older compilers stored an XML document in UTF-16 instead; it is surfaced as a
//! single `PermissionSetAttribute` whose `XML` property holds the document.

use quick_xml::{events::Event, Reader};

use crate::{
    metadata::{
        customattributes::{
            AttributeTypeResolver, CustomAttributeArgument, CustomAttributeNamedArgument,
            CustomAttributeParser,
        },
        security::SecurityAttribute,
        streams::decode_utf16,
        typesystem::TypeName,
    },
    Result,
};

const PERMISSION_SET_ATTRIBUTE: &str =
    "System.Security.Permissions.PermissionSetAttribute, mscorlib, Version=2.0.0.0, \
     Culture=neutral, PublicKeyToken=b77a5c561934e089";

/// Decode a permission set blob into its attributes.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on a missing type name, malformed named arguments
/// or truncated data.
pub fn parse_permission_set(
    data: &[u8],
    resolver: &dyn AttributeTypeResolver,
) -> Result<Vec<SecurityAttribute>> {
    match data.first() {
        None => Ok(Vec::new()),
        Some(b'.') => parse_binary(data, resolver),
        Some(_) => {
            let xml = decode_utf16(data);
            log::warn!(
                "Legacy XML permission set with {} permission(s)",
                permission_classes(&xml).map_or(0, |classes| classes.len())
            );

            Ok(vec![SecurityAttribute {
                attribute_type: TypeName::parse(PERMISSION_SET_ATTRIBUTE)?,
                named_args: vec![CustomAttributeNamedArgument {
                    is_field: false,
                    name: "XML".to_string(),
                    arg_type: "System.String".to_string(),
                    value: CustomAttributeArgument::String(Some(xml)),
                }],
            }])
        }
    }
}

fn parse_binary(
    data: &[u8],
    resolver: &dyn AttributeTypeResolver,
) -> Result<Vec<SecurityAttribute>> {
    let mut parser = CustomAttributeParser::new(data, resolver);
    parser.parser().advance_by(1)?;

    let count = parser.parser().read_compressed_uint()?;
    let mut attributes = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let type_name = parser
            .parser()
            .read_ser_string()?
            .ok_or_else(|| malformed_error!("Security attribute without a type name"))?;
        let _blob_size = parser.parser().read_compressed_uint()?;
        let named_count = parser.parser().read_compressed_uint()?;

        attributes.push(SecurityAttribute {
            attribute_type: TypeName::parse(&type_name)?,
            named_args: parser.read_named_arguments(named_count)?,
        });
    }

    Ok(attributes)
}

/// The `class` of every `IPermission` element of a legacy XML permission set
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the document is not well-formed XML.
pub fn permission_classes(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut classes = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element) | Event::Empty(element)) => {
                if element.name().as_ref() != b"IPermission" {
                    continue;
                }
                for attribute in element.attributes() {
                    let attribute = attribute
                        .map_err(|e| malformed_error!("Invalid permission set XML - {}", e))?;
                    if attribute.key.as_ref() == b"class" {
                        let value = attribute
                            .unescape_value()
                            .map_err(|e| malformed_error!("Invalid permission set XML - {}", e))?;
                        classes.push(value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed_error!("Invalid permission set XML - {}", e)),
            _ => {}
        }
    }

    Ok(classes)
}
