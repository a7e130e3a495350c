//! Per-module identity caches and scan maps.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use dashmap::DashMap;
use strum::EnumCount;

use crate::metadata::{
    cache::{RowCache, ScanMap},
    customattributes::{CustomAttribute, CustomAttributeRc},
    range::Range,
    security::{SecurityDeclRc, SecurityDeclaration},
    tables::{MethodSemanticsAttributes, TableId, TableInfo},
    token::Token,
    typesystem::{
        AssemblyDefinition, AssemblyNameReference, CilType, ClassLayout, EventDefinition,
        ExportedType, FieldDefinition, GenericInstanceMethod, GenericParamRc, GenericParameter,
        GenericParameterKind, MemberReference, MetadataScope, MethodDefinition, ModuleReference,
        ParameterDefinition, PrimitiveKind, PropertyDefinition, StandAloneSignature,
        TypeDefinition, TypeReference, TypeSpecification,
    },
};

/// Field and method list ranges of every `TypeDef`, indexed by `rid - 1`
pub(crate) struct MemberLists {
    pub fields: Vec<Range>,
    pub methods: Vec<Range>,
}

/// One `*Ptr` indirection table
pub(crate) struct PointerMap {
    /// Physical row of every logical position, indexed by `position - 1`
    pub rows: Vec<u32>,
    /// Logical position of every physical row
    pub positions: HashMap<u32, u32>,
}

pub(crate) struct NestedMap {
    pub nested: HashMap<u32, Vec<u32>>,
    pub enclosing: HashMap<u32, u32>,
}

/// `PropertyMap` or `EventMap`: parent type to its member list
pub(crate) struct ListMap {
    pub ranges: HashMap<u32, Range>,
}

impl ListMap {
    /// Parent type whose list contains logical position `position`
    pub fn owner_of(&self, position: u32) -> Option<u32> {
        self.ranges
            .iter()
            .find(|(_, range)| range.contains(position))
            .map(|(parent, _)| *parent)
    }
}

pub(crate) struct SemanticsMap {
    pub associations: HashMap<Token, Vec<(MethodSemanticsAttributes, u32)>>,
    pub methods: HashMap<u32, MethodSemanticsAttributes>,
}

pub(crate) struct ImplMapRow {
    pub flags: u16,
    pub entry_point: String,
    pub module_ref: u32,
}

pub(crate) struct ModuleIdentity {
    pub name: String,
    pub mvid: Option<uguid::Guid>,
}

/// Everything one module has materialized or scanned.
///
/// Row caches are sized once from the table row counts. Scan maps are built on first
/// use and never rebuilt.
pub(crate) struct MetadataCache {
    pub types: RowCache<TypeDefinition>,
    pub type_refs: RowCache<TypeReference>,
    pub type_specs: RowCache<TypeSpecification>,
    pub fields: RowCache<FieldDefinition>,
    pub methods: RowCache<MethodDefinition>,
    pub params: RowCache<ParameterDefinition>,
    pub properties: RowCache<PropertyDefinition>,
    pub events: RowCache<EventDefinition>,
    pub generic_params: RowCache<GenericParameter>,
    pub member_refs: RowCache<MemberReference>,
    pub method_specs: RowCache<GenericInstanceMethod>,
    pub stand_alone_sigs: RowCache<StandAloneSignature>,
    pub assembly_refs: RowCache<AssemblyNameReference>,
    pub module_refs: RowCache<ModuleReference>,
    pub exported_types: RowCache<ExportedType>,
    pub custom_attributes: RowCache<CustomAttribute>,
    pub security: RowCache<SecurityDeclaration>,

    pub attribute_lists: DashMap<Token, Arc<Vec<CustomAttributeRc>>>,
    pub security_lists: DashMap<Token, Arc<Vec<SecurityDeclRc>>>,
    pub primitives: Vec<OnceLock<CilType>>,
    pub unbound_params: Mutex<HashMap<(GenericParameterKind, u32), GenericParamRc>>,
    pub corlib: OnceLock<MetadataScope>,
    pub module: OnceLock<Option<ModuleIdentity>>,
    pub assembly: OnceLock<Option<Arc<AssemblyDefinition>>>,

    pub member_lists: ScanMap<MemberLists>,
    pub param_lists: ScanMap<Vec<Range>>,
    pub field_ptrs: ScanMap<PointerMap>,
    pub method_ptrs: ScanMap<PointerMap>,
    pub param_ptrs: ScanMap<PointerMap>,
    pub property_ptrs: ScanMap<PointerMap>,
    pub event_ptrs: ScanMap<PointerMap>,
    pub nested: ScanMap<NestedMap>,
    pub interfaces: ScanMap<HashMap<Token, Vec<Range>>>,
    pub property_map: ScanMap<ListMap>,
    pub event_map: ScanMap<ListMap>,
    pub generic_param_runs: ScanMap<HashMap<Token, Vec<Range>>>,
    pub constraint_runs: ScanMap<HashMap<Token, Vec<Range>>>,
    pub attribute_runs: ScanMap<HashMap<Token, Vec<Range>>>,
    pub security_runs: ScanMap<HashMap<Token, Vec<Range>>>,
    pub constants: ScanMap<HashMap<Token, (u8, u32)>>,
    pub marshals: ScanMap<HashMap<Token, u32>>,
    pub semantics: ScanMap<SemanticsMap>,
    pub overrides: ScanMap<HashMap<Token, Vec<Token>>>,
    pub class_layouts: ScanMap<HashMap<u32, ClassLayout>>,
    pub field_layouts: ScanMap<HashMap<u32, u32>>,
    pub field_rvas: ScanMap<HashMap<u32, u32>>,
    pub pinvokes: ScanMap<HashMap<Token, ImplMapRow>>,
    pub type_names: ScanMap<HashMap<(String, String), u32>>,
}

impl MetadataCache {
    pub fn new(info: Option<&TableInfo>) -> Self {
        let rows = |table| info.map_or(0, |info| info.rows(table));

        MetadataCache {
            types: RowCache::new(rows(TableId::TypeDef)),
            type_refs: RowCache::new(rows(TableId::TypeRef)),
            type_specs: RowCache::new(rows(TableId::TypeSpec)),
            fields: RowCache::new(rows(TableId::Field)),
            methods: RowCache::new(rows(TableId::MethodDef)),
            params: RowCache::new(rows(TableId::Param)),
            properties: RowCache::new(rows(TableId::Property)),
            events: RowCache::new(rows(TableId::Event)),
            generic_params: RowCache::new(rows(TableId::GenericParam)),
            member_refs: RowCache::new(rows(TableId::MemberRef)),
            method_specs: RowCache::new(rows(TableId::MethodSpec)),
            stand_alone_sigs: RowCache::new(rows(TableId::StandAloneSig)),
            assembly_refs: RowCache::new(rows(TableId::AssemblyRef)),
            module_refs: RowCache::new(rows(TableId::ModuleRef)),
            exported_types: RowCache::new(rows(TableId::ExportedType)),
            custom_attributes: RowCache::new(rows(TableId::CustomAttribute)),
            security: RowCache::new(rows(TableId::DeclSecurity)),

            attribute_lists: DashMap::new(),
            security_lists: DashMap::new(),
            primitives: (0..PrimitiveKind::COUNT).map(|_| OnceLock::new()).collect(),
            unbound_params: Mutex::new(HashMap::new()),
            corlib: OnceLock::new(),
            module: OnceLock::new(),
            assembly: OnceLock::new(),

            member_lists: ScanMap::default(),
            param_lists: ScanMap::default(),
            field_ptrs: ScanMap::default(),
            method_ptrs: ScanMap::default(),
            param_ptrs: ScanMap::default(),
            property_ptrs: ScanMap::default(),
            event_ptrs: ScanMap::default(),
            nested: ScanMap::default(),
            interfaces: ScanMap::default(),
            property_map: ScanMap::default(),
            event_map: ScanMap::default(),
            generic_param_runs: ScanMap::default(),
            constraint_runs: ScanMap::default(),
            attribute_runs: ScanMap::default(),
            security_runs: ScanMap::default(),
            constants: ScanMap::default(),
            marshals: ScanMap::default(),
            semantics: ScanMap::default(),
            overrides: ScanMap::default(),
            class_layouts: ScanMap::default(),
            field_layouts: ScanMap::default(),
            field_rvas: ScanMap::default(),
            pinvokes: ScanMap::default(),
            type_names: ScanMap::default(),
        }
    }

    /// Scan map of the indirection table in front of `table`
    pub fn pointers(&self, table: TableId) -> Option<&ScanMap<PointerMap>> {
        match table {
            TableId::Field => Some(&self.field_ptrs),
            TableId::MethodDef => Some(&self.method_ptrs),
            TableId::Param => Some(&self.param_ptrs),
            TableId::Property => Some(&self.property_ptrs),
            TableId::Event => Some(&self.event_ptrs),
            _ => None,
        }
    }
}
