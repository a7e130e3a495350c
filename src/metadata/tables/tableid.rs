use strum::{EnumCount, EnumIter};

/// The metadata tables of ECMA-335 II.22, numbered as in the `#~` valid bit vector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, EnumIter, EnumCount)]
#[repr(u8)]
pub enum TableId {
    /// `Module`, exactly one row
    Module = 0x00,
    /// `TypeRef`
    TypeRef = 0x01,
    /// `TypeDef`
    TypeDef = 0x02,
    /// `FieldPtr`, indirection into `Field` in unoptimized images
    FieldPtr = 0x03,
    /// `Field`
    Field = 0x04,
    /// `MethodPtr`, indirection into `MethodDef` in unoptimized images
    MethodPtr = 0x05,
    /// `MethodDef`
    MethodDef = 0x06,
    /// `ParamPtr`
    ParamPtr = 0x07,
    /// `Param`
    Param = 0x08,
    /// `InterfaceImpl`
    InterfaceImpl = 0x09,
    /// `MemberRef`
    MemberRef = 0x0A,
    /// `Constant`
    Constant = 0x0B,
    /// `CustomAttribute`
    CustomAttribute = 0x0C,
    /// `FieldMarshal`
    FieldMarshal = 0x0D,
    /// `DeclSecurity`
    DeclSecurity = 0x0E,
    /// `ClassLayout`
    ClassLayout = 0x0F,
    /// `FieldLayout`
    FieldLayout = 0x10,
    /// `StandAloneSig`
    StandAloneSig = 0x11,
    /// `EventMap`
    EventMap = 0x12,
    /// `EventPtr`
    EventPtr = 0x13,
    /// `Event`
    Event = 0x14,
    /// `PropertyMap`
    PropertyMap = 0x15,
    /// `PropertyPtr`
    PropertyPtr = 0x16,
    /// `Property`
    Property = 0x17,
    /// `MethodSemantics`
    MethodSemantics = 0x18,
    /// `MethodImpl`
    MethodImpl = 0x19,
    /// `ModuleRef`
    ModuleRef = 0x1A,
    /// `TypeSpec`
    TypeSpec = 0x1B,
    /// `ImplMap`
    ImplMap = 0x1C,
    /// `FieldRVA`
    FieldRVA = 0x1D,
    /// `EncLog`
    EncLog = 0x1E,
    /// `EncMap`
    EncMap = 0x1F,
    /// `Assembly`
    Assembly = 0x20,
    /// `AssemblyProcessor`
    AssemblyProcessor = 0x21,
    /// `AssemblyOS`
    AssemblyOS = 0x22,
    /// `AssemblyRef`
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor`
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS`
    AssemblyRefOS = 0x25,
    /// `File`
    File = 0x26,
    /// `ExportedType`
    ExportedType = 0x27,
    /// `ManifestResource`
    ManifestResource = 0x28,
    /// `NestedClass`
    NestedClass = 0x29,
    /// `GenericParam`
    GenericParam = 0x2A,
    /// `MethodSpec`
    MethodSpec = 0x2B,
    /// `GenericParamConstraint`
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Map a token kind byte to its table
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        use strum::IntoEnumIterator;

        if usize::from(value) >= TableId::COUNT {
            return None;
        }
        TableId::iter().nth(usize::from(value))
    }

    /// The indirection table used by unoptimized (`#-`) images for this table, if any
    #[must_use]
    pub fn pointer_table(self) -> Option<TableId> {
        match self {
            TableId::Field => Some(TableId::FieldPtr),
            TableId::MethodDef => Some(TableId::MethodPtr),
            TableId::Param => Some(TableId::ParamPtr),
            TableId::Event => Some(TableId::EventPtr),
            TableId::Property => Some(TableId::PropertyPtr),
            _ => None,
        }
    }
}
