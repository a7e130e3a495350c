//! Single-pass table scans building the owner and mapping indices.
//!
//! Every map is built at most once per module, on first demand. `has_*` queries answer
//! from these maps without materializing anything.

use std::collections::HashMap;

use crate::{
    metadata::{
        range::{derive_list_ranges, group_owner_runs, Range},
        reader::{
            context::ReadContext,
            store::{ImplMapRow, ListMap, MemberLists, NestedMap, PointerMap, SemanticsMap},
        },
        tables::{CodedIndexType, Column, MethodSemanticsAttributes, TableId, TypeAttributes},
        token::Token,
        typesystem::ClassLayout,
    },
    Result,
};

type OwnerRuns = HashMap<Token, Vec<Range>>;

impl<'a> ReadContext<'a> {
    /// Number of logical rows of `table`, honoring its `*Ptr` table
    pub fn logical_rows(&self, table: TableId) -> u32 {
        match table.pointer_table() {
            Some(pointer) if self.rows(pointer) > 0 => self.rows(pointer),
            _ => self.rows(table),
        }
    }

    fn pointer_map(&mut self, table: TableId) -> Result<Option<&'a PointerMap>> {
        let Some(pointer) = table.pointer_table() else {
            return Ok(None);
        };
        if self.rows(pointer) == 0 {
            return Ok(None);
        }

        let reader = self.reader;
        let Some(map) = reader.cache.pointers(table) else {
            return Ok(None);
        };
        map.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(pointer);
                let mut map = PointerMap {
                    rows: Vec::with_capacity(rows as usize),
                    positions: HashMap::with_capacity(rows as usize),
                };
                for position in 1..=rows {
                    let row = ctx.cursor.read_table_index(table)?;
                    map.rows.push(row);
                    map.positions.entry(row).or_insert(position);
                }

                log::debug!("Scanned {:?}: {} rows", pointer, rows);
                Ok(map)
            })
        })
        .map(Some)
    }

    /// Physical row of logical list position `position`
    pub fn physical_row(&mut self, table: TableId, position: u32) -> Result<u32> {
        match self.pointer_map(table)? {
            Some(map) => position
                .checked_sub(1)
                .and_then(|index| map.rows.get(index as usize))
                .copied()
                .ok_or_else(|| {
                    malformed_error!("List position {} outside of {:?}", position, table)
                }),
            None => Ok(position),
        }
    }

    /// Logical list position of physical row `rid`
    pub fn logical_position(&mut self, table: TableId, rid: u32) -> Result<u32> {
        match self.pointer_map(table)? {
            Some(map) => map.positions.get(&rid).copied().ok_or_else(|| {
                malformed_error!("Row {} of {:?} is not listed by its pointer table", rid, table)
            }),
            None => Ok(rid),
        }
    }

    /// Field and method list ranges of every type
    pub fn member_lists(&mut self) -> Result<&'a MemberLists> {
        let reader = self.reader;
        reader.cache.member_lists.get_or_scan(|| {
            let field_rows = self.logical_rows(TableId::Field);
            let method_rows = self.logical_rows(TableId::MethodDef);

            self.scoped(|ctx| {
                let rows = ctx.rows(TableId::TypeDef);
                let mut field_starts = Vec::with_capacity(rows as usize);
                let mut method_starts = Vec::with_capacity(rows as usize);

                for rid in 1..=rows {
                    ctx.cursor.move_to(TableId::TypeDef, rid)?;
                    ctx.cursor.skip(Column::U32)?;
                    ctx.cursor.skip(Column::Str)?;
                    ctx.cursor.skip(Column::Str)?;
                    ctx.cursor.skip(Column::Coded(CodedIndexType::TypeDefOrRef))?;
                    field_starts.push(ctx.cursor.read_table_index(TableId::Field)?);
                    method_starts.push(ctx.cursor.read_table_index(TableId::MethodDef)?);
                }

                log::debug!("Scanned {:?}: {} rows", TableId::TypeDef, rows);
                Ok(MemberLists {
                    fields: derive_list_ranges(&field_starts, field_rows),
                    methods: derive_list_ranges(&method_starts, method_rows),
                })
            })
        })
    }

    /// Parameter list ranges of every method, indexed by `rid - 1`
    pub fn param_lists(&mut self) -> Result<&'a Vec<Range>> {
        let reader = self.reader;
        reader.cache.param_lists.get_or_scan(|| {
            let param_rows = self.logical_rows(TableId::Param);

            self.scoped(|ctx| {
                let rows = ctx.rows(TableId::MethodDef);
                let mut starts = Vec::with_capacity(rows as usize);

                for rid in 1..=rows {
                    ctx.cursor.move_to(TableId::MethodDef, rid)?;
                    ctx.cursor.skip(Column::U32)?;
                    ctx.cursor.skip(Column::U16)?;
                    ctx.cursor.skip(Column::U16)?;
                    ctx.cursor.skip(Column::Str)?;
                    ctx.cursor.skip(Column::Blob)?;
                    starts.push(ctx.cursor.read_table_index(TableId::Param)?);
                }

                log::debug!("Scanned {:?}: {} rows", TableId::MethodDef, rows);
                Ok(derive_list_ranges(&starts, param_rows))
            })
        })
    }

    pub fn nested_map(&mut self) -> Result<&'a NestedMap> {
        let reader = self.reader;
        reader.cache.nested.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::NestedClass);
                let mut map = NestedMap {
                    nested: HashMap::new(),
                    enclosing: HashMap::new(),
                };

                for _ in 0..rows {
                    let nested = ctx.cursor.read_table_index(TableId::TypeDef)?;
                    let enclosing = ctx.cursor.read_table_index(TableId::TypeDef)?;
                    map.nested.entry(enclosing).or_default().push(nested);
                    map.enclosing.insert(nested, enclosing);
                }

                log::debug!("Scanned {:?}: {} rows", TableId::NestedClass, rows);
                Ok(map)
            })
        })
    }

    pub fn interface_runs(&mut self) -> Result<&'a OwnerRuns> {
        let reader = self.reader;
        reader.cache.interfaces.get_or_scan(|| {
            self.owner_runs(TableId::InterfaceImpl, |ctx| {
                let class = ctx.cursor.read_table_index(TableId::TypeDef)?;
                ctx.cursor.skip(Column::Coded(CodedIndexType::TypeDefOrRef))?;
                Ok(Token::from_parts(TableId::TypeDef, class))
            })
        })
    }

    pub fn generic_param_runs(&mut self) -> Result<&'a OwnerRuns> {
        let reader = self.reader;
        reader.cache.generic_param_runs.get_or_scan(|| {
            self.owner_runs(TableId::GenericParam, |ctx| {
                ctx.cursor.skip(Column::U16)?;
                ctx.cursor.skip(Column::U16)?;
                let owner = ctx.cursor.read_coded_index(CodedIndexType::TypeOrMethodDef)?;
                ctx.cursor.skip(Column::Str)?;
                Ok(owner)
            })
        })
    }

    pub fn constraint_runs(&mut self) -> Result<&'a OwnerRuns> {
        let reader = self.reader;
        reader.cache.constraint_runs.get_or_scan(|| {
            self.owner_runs(TableId::GenericParamConstraint, |ctx| {
                let owner = ctx.cursor.read_table_index(TableId::GenericParam)?;
                ctx.cursor.skip(Column::Coded(CodedIndexType::TypeDefOrRef))?;
                Ok(Token::from_parts(TableId::GenericParam, owner))
            })
        })
    }

    pub fn attribute_runs(&mut self) -> Result<&'a OwnerRuns> {
        let reader = self.reader;
        reader.cache.attribute_runs.get_or_scan(|| {
            self.owner_runs(TableId::CustomAttribute, |ctx| {
                let parent = ctx.cursor.read_coded_index(CodedIndexType::HasCustomAttribute)?;
                ctx.cursor.skip(Column::Coded(CodedIndexType::CustomAttributeType))?;
                ctx.cursor.skip(Column::Blob)?;
                Ok(parent)
            })
        })
    }

    pub fn security_runs(&mut self) -> Result<&'a OwnerRuns> {
        let reader = self.reader;
        reader.cache.security_runs.get_or_scan(|| {
            self.owner_runs(TableId::DeclSecurity, |ctx| {
                ctx.cursor.skip(Column::U16)?;
                let parent = ctx.cursor.read_coded_index(CodedIndexType::HasDeclSecurity)?;
                ctx.cursor.skip(Column::Blob)?;
                Ok(parent)
            })
        })
    }

    /// Read the owner column of every row of `table` and group the runs
    fn owner_runs<F>(&mut self, table: TableId, mut read_owner: F) -> Result<OwnerRuns>
    where
        F: FnMut(&mut Self) -> Result<Token>,
    {
        self.scoped(|ctx| {
            let rows = ctx.cursor.move_to_table(table);
            let mut owners = Vec::with_capacity(rows as usize);
            for _ in 0..rows {
                owners.push(read_owner(ctx)?);
            }

            log::debug!("Scanned {:?}: {} rows", table, rows);
            Ok(group_owner_runs(owners))
        })
    }

    /// `PropertyMap` or `EventMap`
    fn list_map(&mut self, map_table: TableId, list_table: TableId) -> Result<ListMap> {
        let list_rows = self.logical_rows(list_table);

        self.scoped(|ctx| {
            let rows = ctx.cursor.move_to_table(map_table);
            let mut parents = Vec::with_capacity(rows as usize);
            let mut starts = Vec::with_capacity(rows as usize);
            for _ in 0..rows {
                parents.push(ctx.cursor.read_table_index(TableId::TypeDef)?);
                starts.push(ctx.cursor.read_table_index(list_table)?);
            }

            log::debug!("Scanned {:?}: {} rows", map_table, rows);
            Ok(ListMap {
                ranges: parents
                    .into_iter()
                    .zip(derive_list_ranges(&starts, list_rows))
                    .collect(),
            })
        })
    }

    pub fn property_map(&mut self) -> Result<&'a ListMap> {
        let reader = self.reader;
        reader
            .cache
            .property_map
            .get_or_scan(|| self.list_map(TableId::PropertyMap, TableId::Property))
    }

    pub fn event_map(&mut self) -> Result<&'a ListMap> {
        let reader = self.reader;
        reader
            .cache
            .event_map
            .get_or_scan(|| self.list_map(TableId::EventMap, TableId::Event))
    }

    /// Parent to (element type, value blob index) from `Constant`
    pub fn constants(&mut self) -> Result<&'a HashMap<Token, (u8, u32)>> {
        let reader = self.reader;
        reader.cache.constants.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::Constant);
                let mut map = HashMap::with_capacity(rows as usize);
                for _ in 0..rows {
                    let element_type = ctx.cursor.read_u8()?;
                    let _padding = ctx.cursor.read_u8()?;
                    let parent = ctx.cursor.read_coded_index(CodedIndexType::HasConstant)?;
                    let value = ctx.cursor.read_blob_index()?;
                    map.insert(parent, (element_type, value));
                }

                log::debug!("Scanned {:?}: {} rows", TableId::Constant, rows);
                Ok(map)
            })
        })
    }

    pub fn marshals(&mut self) -> Result<&'a HashMap<Token, u32>> {
        let reader = self.reader;
        reader.cache.marshals.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::FieldMarshal);
                let mut map = HashMap::with_capacity(rows as usize);
                for _ in 0..rows {
                    let parent = ctx.cursor.read_coded_index(CodedIndexType::HasFieldMarshal)?;
                    map.insert(parent, ctx.cursor.read_blob_index()?);
                }

                log::debug!("Scanned {:?}: {} rows", TableId::FieldMarshal, rows);
                Ok(map)
            })
        })
    }

    pub fn semantics(&mut self) -> Result<&'a SemanticsMap> {
        let reader = self.reader;
        reader.cache.semantics.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::MethodSemantics);
                let mut map = SemanticsMap {
                    associations: HashMap::new(),
                    methods: HashMap::new(),
                };
                for _ in 0..rows {
                    let flags = MethodSemanticsAttributes::from_bits_truncate(ctx.cursor.read_u16()?);
                    let method = ctx.cursor.read_table_index(TableId::MethodDef)?;
                    let association = ctx.cursor.read_coded_index(CodedIndexType::HasSemantics)?;

                    map.associations
                        .entry(association)
                        .or_default()
                        .push((flags, method));
                    *map.methods
                        .entry(method)
                        .or_insert(MethodSemanticsAttributes::empty()) |= flags;
                }

                log::debug!("Scanned {:?}: {} rows", TableId::MethodSemantics, rows);
                Ok(map)
            })
        })
    }

    /// Method body to the declarations it implements, from `MethodImpl`
    pub fn overrides(&mut self) -> Result<&'a HashMap<Token, Vec<Token>>> {
        let reader = self.reader;
        reader.cache.overrides.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::MethodImpl);
                let mut map: HashMap<Token, Vec<Token>> = HashMap::new();
                for _ in 0..rows {
                    ctx.cursor.skip(Column::Table(TableId::TypeDef))?;
                    let body = ctx.cursor.read_coded_index(CodedIndexType::MethodDefOrRef)?;
                    let declaration = ctx.cursor.read_coded_index(CodedIndexType::MethodDefOrRef)?;
                    map.entry(body).or_default().push(declaration);
                }

                log::debug!("Scanned {:?}: {} rows", TableId::MethodImpl, rows);
                Ok(map)
            })
        })
    }

    pub fn class_layouts(&mut self) -> Result<&'a HashMap<u32, ClassLayout>> {
        let reader = self.reader;
        reader.cache.class_layouts.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::ClassLayout);
                let mut map = HashMap::with_capacity(rows as usize);
                for _ in 0..rows {
                    let packing_size = ctx.cursor.read_u16()?;
                    let class_size = ctx.cursor.read_u32()?;
                    let parent = ctx.cursor.read_table_index(TableId::TypeDef)?;
                    map.insert(
                        parent,
                        ClassLayout {
                            packing_size,
                            class_size,
                        },
                    );
                }

                log::debug!("Scanned {:?}: {} rows", TableId::ClassLayout, rows);
                Ok(map)
            })
        })
    }

    /// `FieldLayout` and `FieldRVA` share their shape: a `u32` then the field
    fn field_values(&mut self, table: TableId) -> Result<HashMap<u32, u32>> {
        self.scoped(|ctx| {
            let rows = ctx.cursor.move_to_table(table);
            let mut map = HashMap::with_capacity(rows as usize);
            for _ in 0..rows {
                let value = ctx.cursor.read_u32()?;
                let field = ctx.cursor.read_table_index(TableId::Field)?;
                map.insert(field, value);
            }

            log::debug!("Scanned {:?}: {} rows", table, rows);
            Ok(map)
        })
    }

    pub fn field_layouts(&mut self) -> Result<&'a HashMap<u32, u32>> {
        let reader = self.reader;
        reader
            .cache
            .field_layouts
            .get_or_scan(|| self.field_values(TableId::FieldLayout))
    }

    pub fn field_rvas(&mut self) -> Result<&'a HashMap<u32, u32>> {
        let reader = self.reader;
        reader
            .cache
            .field_rvas
            .get_or_scan(|| self.field_values(TableId::FieldRVA))
    }

    pub fn pinvokes(&mut self) -> Result<&'a HashMap<Token, ImplMapRow>> {
        let reader = self.reader;
        reader.cache.pinvokes.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.cursor.move_to_table(TableId::ImplMap);
                let mut map = HashMap::with_capacity(rows as usize);
                for _ in 0..rows {
                    let flags = ctx.cursor.read_u16()?;
                    let member = ctx.cursor.read_coded_index(CodedIndexType::MemberForwarded)?;
                    let entry_point = ctx.cursor.read_string()?.to_string();
                    let module_ref = ctx.cursor.read_table_index(TableId::ModuleRef)?;
                    map.insert(
                        member,
                        ImplMapRow {
                            flags,
                            entry_point,
                            module_ref,
                        },
                    );
                }

                log::debug!("Scanned {:?}: {} rows", TableId::ImplMap, rows);
                Ok(map)
            })
        })
    }

    /// Top-level types by namespace and name; the first row wins on duplicates
    pub fn type_names(&mut self) -> Result<&'a HashMap<(String, String), u32>> {
        let reader = self.reader;
        reader.cache.type_names.get_or_scan(|| {
            self.scoped(|ctx| {
                let rows = ctx.rows(TableId::TypeDef);
                let mut map = HashMap::with_capacity(rows as usize);
                for rid in 1..=rows {
                    ctx.cursor.move_to(TableId::TypeDef, rid)?;
                    let flags = ctx.cursor.read_u32()?;
                    if flags & TypeAttributes::VISIBILITY_MASK > TypeAttributes::PUBLIC {
                        continue;
                    }

                    let name = ctx.cursor.read_string()?.to_string();
                    let namespace = ctx.cursor.read_string()?.to_string();
                    map.entry((namespace, name)).or_insert(rid);
                }

                log::debug!("Indexed {} type names", map.len());
                Ok(map)
            })
        })
    }
}
