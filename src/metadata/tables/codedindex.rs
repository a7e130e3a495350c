use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Result,
};

/// Coded index kinds of ECMA-335 II.24.2.6.
///
/// A coded index packs a small tag selecting the target table into its low bits and the
/// row id above it.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// Every table that may carry custom attributes
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// Constructor of a custom attribute; tags 0, 1 and 4 are unused
    CustomAttributeType,
    /// Scope of a `TypeRef`
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Tables addressed by each tag value, `None` for reserved tags
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => &[Some(TableId::MethodDef), Some(TableId::MemberRef)],
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of low bits holding the tag
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len();
        #[allow(clippy::cast_possible_truncation)]
        let bits = usize::BITS - (count - 1).leading_zeros();
        bits as u8
    }

    /// Split a raw coded value into a token.
    ///
    /// A row id of 0 yields a null token of the selected table.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the tag selects a reserved or missing slot.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let tag_bits = self.tag_bits();
        let tag = (value & ((1 << tag_bits) - 1)) as usize;
        let row = value >> tag_bits;

        match self.tables().get(tag) {
            Some(Some(table)) => Ok(Token::from_parts(*table, row)),
            _ => Err(crate::Error::NotSupported(format!(
                "Coded index {:?} has no table for tag {} (value 0x{:x})",
                self, tag, value
            ))),
        }
    }

    /// Pack a token into a raw coded value.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the token's table is not addressable by
    /// this coded index kind.
    pub fn encode(&self, token: Token) -> Result<u32> {
        let tag = self
            .tables()
            .iter()
            .position(|table| table.is_some_and(|t| token.is_table(t)))
            .ok_or_else(|| {
                crate::Error::NotSupported(format!(
                    "Token {} cannot be encoded as {:?}",
                    token, self
                ))
            })?;

        #[allow(clippy::cast_possible_truncation)]
        Ok((token.row() << self.tag_bits()) | tag as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
    }

    #[test]
    fn decode() {
        let token = CodedIndexType::TypeDefOrRef.decode((5 << 2) | 1).unwrap();
        assert_eq!(token, Token::new(0x0100_0005));

        let token = CodedIndexType::CustomAttributeType.decode((3 << 3) | 3).unwrap();
        assert_eq!(token, Token::new(0x0A00_0003));

        assert!(matches!(
            CodedIndexType::CustomAttributeType.decode((1 << 3) | 1),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            CodedIndexType::TypeDefOrRef.decode(3),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn encode() {
        assert_eq!(
            CodedIndexType::HasCustomAttribute
                .encode(Token::new(0x0200_0007))
                .unwrap(),
            (7 << 5) | 3
        );
        assert!(CodedIndexType::HasSemantics
            .encode(Token::new(0x0200_0001))
            .is_err());
    }
}
