//! Type definitions, type references, type specifications and scope rows.

use std::sync::Arc;

use crate::{
    metadata::{
        reader::{
            context::{GenericContext, ReadContext},
            store::ModuleIdentity,
        },
        tables::{AssemblyFlags, CodedIndexType, Column, GenericParameterAttributes, TableId},
        token::Token,
        typesystem::{
            AssemblyDefinition, AssemblyNameReference, AssemblyRefRc, AssemblyVersion, CilType,
            ExportedType, ExportedTypeImplementation, ExportedTypeRc, GenericParamRc,
            GenericParameter, GenericParameterOwner, InterfaceImplementation, MetadataScope,
            ModuleRefRc, ModuleReference, PrimitiveKind, TypeDefRc, TypeDefinition, TypeRefRc,
            TypeReference, TypeSpecification,
        },
    },
    Result,
};

/// Names under which the core library is referenced
const CORLIB_NAMES: [&str; 4] = [
    "mscorlib",
    "System.Runtime",
    "netstandard",
    "System.Private.CoreLib",
];

/// `b77a5c561934e089`
const ECMA_PUBLIC_KEY_TOKEN: [u8; 8] = [0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89];

impl<'a> ReadContext<'a> {
    /// Fail unless `rid` addresses a row of `table`
    pub fn check_row(&self, table: TableId, rid: u32) -> Result<()> {
        let rows = self.rows(table);
        if rid == 0 || rid > rows {
            return Err(malformed_error!(
                "Row {} outside of {:?} with {} rows",
                rid,
                table,
                rows
            ));
        }
        Ok(())
    }

    pub fn type_definition(&mut self, rid: u32) -> Result<TypeDefRc> {
        let reader = self.reader;
        if let Some(definition) = reader.cache.types.get(rid) {
            return Ok(definition);
        }
        self.check_row(TableId::TypeDef, rid)?;

        let lists = self.member_lists()?;
        let index = rid as usize - 1;
        let field_list = lists.fields.get(index).copied().unwrap_or_default();
        let method_list = lists.methods.get(index).copied().unwrap_or_default();

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::TypeDef, rid)?;
            let flags = ctx.cursor.read_u32()?;
            let name = ctx.cursor.read_string()?.to_string();
            let namespace = ctx.cursor.read_string()?.to_string();
            let extends = ctx.cursor.read_coded_index(CodedIndexType::TypeDefOrRef)?;

            let token = Token::from_parts(TableId::TypeDef, rid);
            log::trace!("materialized type {} {}.{}", token, namespace, name);

            reader.cache.types.insert(
                rid,
                Arc::new(TypeDefinition::new(
                    token,
                    flags,
                    namespace,
                    name,
                    extends,
                    field_list,
                    method_list,
                    ctx.module(),
                )),
            )
        })
    }

    pub fn type_reference(&mut self, rid: u32) -> Result<TypeRefRc> {
        let reader = self.reader;
        if let Some(reference) = reader.cache.type_refs.get(rid) {
            return Ok(reference);
        }
        self.check_row(TableId::TypeRef, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::TypeRef, rid)?;
            let scope = ctx.cursor.read_coded_index(CodedIndexType::ResolutionScope)?;
            let name = ctx.cursor.read_string()?.to_string();
            let namespace = ctx.cursor.read_string()?.to_string();

            let token = Token::from_parts(TableId::TypeRef, rid);
            let (scope, declaring_type) = if scope.is_null() {
                (MetadataScope::Module(ctx.module()), None)
            } else {
                match scope.table_id() {
                    Some(TableId::Module) => (MetadataScope::Module(ctx.module()), None),
                    Some(TableId::ModuleRef) => (
                        MetadataScope::ModuleReference(ctx.module_reference(scope.row())?),
                        None,
                    ),
                    Some(TableId::AssemblyRef) => (
                        MetadataScope::AssemblyReference(ctx.assembly_reference(scope.row())?),
                        None,
                    ),
                    Some(TableId::TypeRef) if scope.row() != rid => {
                        let outer = ctx.type_reference(scope.row())?;
                        let outer_scope = outer.scope.clone().ok_or_else(|| {
                            malformed_error!("Enclosing type of {} has no scope", token)
                        })?;
                        (outer_scope, Some(outer))
                    }
                    _ => {
                        return Err(malformed_error!(
                            "Invalid resolution scope {} for {}",
                            scope,
                            token
                        ))
                    }
                }
            };

            log::trace!("materialized type reference {} {}.{}", token, namespace, name);
            reader.cache.type_refs.insert(
                rid,
                Arc::new(TypeReference::new(
                    token,
                    namespace,
                    name,
                    Some(scope),
                    declaring_type.as_ref(),
                    ctx.module(),
                )),
            )
        })
    }

    /// The type a `TypeSpec` row names.
    ///
    /// Specifications mentioning generic parameters depend on the active generic context
    /// and are not cached.
    pub fn type_specification(&mut self, rid: u32) -> Result<CilType> {
        let reader = self.reader;
        if let Some(specification) = reader.cache.type_specs.get(rid) {
            return Ok(CilType::Specification(specification));
        }
        self.check_row(TableId::TypeSpec, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::TypeSpec, rid)?;
            let signature = ctx.cursor.read_blob_index()?;
            let resolved = ctx.decode_type_blob(signature)?;

            let CilType::Specification(specification) = resolved else {
                return Ok(resolved);
            };
            let kind = match Arc::try_unwrap(specification) {
                Ok(specification) => specification.kind,
                Err(shared) => shared.kind.clone(),
            };
            let specification = Arc::new(TypeSpecification {
                token: Token::from_parts(TableId::TypeSpec, rid),
                kind,
            });

            if specification.contains_generic_parameter() {
                return Ok(CilType::Specification(specification));
            }
            Ok(CilType::Specification(
                reader.cache.type_specs.insert(rid, specification)?,
            ))
        })
    }

    /// Resolve a `TypeDefOrRef` token
    pub fn type_token(&mut self, token: Token) -> Result<CilType> {
        match token.table_id() {
            Some(TableId::TypeDef) if !token.is_null() => {
                Ok(CilType::definition(&self.type_definition(token.row())?))
            }
            Some(TableId::TypeRef) if !token.is_null() => {
                Ok(CilType::Reference(self.type_reference(token.row())?))
            }
            Some(TableId::TypeSpec) if !token.is_null() => self.type_specification(token.row()),
            _ => Err(malformed_error!("{} does not name a type", token)),
        }
    }

    pub fn base_type(&mut self, owner: &TypeDefRc) -> Result<Arc<Option<CilType>>> {
        owner.base_type.get_or_materialize(owner.token, || {
            if owner.extends.is_null() {
                return Ok(None);
            }
            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                ctx.type_token(owner.extends).map(Some)
            })
        })
    }

    pub fn declaring_type(&mut self, owner: &TypeDefinition) -> Result<Option<TypeDefRc>> {
        let enclosing = self.nested_map()?.enclosing.get(&owner.token.row()).copied();
        enclosing.map(|rid| self.type_definition(rid)).transpose()
    }

    pub fn nested_types(&mut self, owner: &TypeDefRc) -> Result<Arc<Vec<TypeDefRc>>> {
        owner.nested_types.get_or_materialize(owner.token, || {
            let nested = self.nested_map()?.nested.get(&owner.token.row());
            nested
                .into_iter()
                .flatten()
                .map(|rid| self.type_definition(*rid))
                .collect()
        })
    }

    pub fn interfaces(&mut self, owner: &TypeDefRc) -> Result<Arc<Vec<InterfaceImplementation>>> {
        owner.interfaces.get_or_materialize(owner.token, || {
            let runs = self.interface_runs()?.get(&owner.token);
            self.scoped_with(GenericContext::for_type(owner), |ctx| {
                let mut interfaces = Vec::new();
                for rid in runs.into_iter().flatten().flat_map(|range| range.rows()) {
                    ctx.cursor.move_to(TableId::InterfaceImpl, rid)?;
                    ctx.cursor.skip(Column::Table(TableId::TypeDef))?;
                    let interface = ctx.cursor.read_coded_index(CodedIndexType::TypeDefOrRef)?;
                    interfaces.push(InterfaceImplementation {
                        token: Token::from_parts(TableId::InterfaceImpl, rid),
                        interface: ctx.type_token(interface)?,
                    });
                }
                Ok(interfaces)
            })
        })
    }

    /// Generic parameters of a type or method definition; references have none
    pub fn generic_parameters(
        &mut self,
        owner: &GenericParameterOwner,
    ) -> Result<Arc<Vec<GenericParamRc>>> {
        match owner {
            GenericParameterOwner::Type(definition) => {
                let definition = definition
                    .upgrade()
                    .ok_or_else(|| malformed_error!("Generic parameter owner was dropped"))?;
                definition
                    .generic_parameters
                    .get_or_materialize(definition.token, || {
                        self.generic_parameter_rows(definition.token, owner)
                    })
            }
            GenericParameterOwner::Method(method) => {
                let method = method
                    .upgrade()
                    .ok_or_else(|| malformed_error!("Generic parameter owner was dropped"))?;
                method
                    .generic_parameters
                    .get_or_materialize(method.token, || {
                        self.generic_parameter_rows(method.token, owner)
                    })
            }
            GenericParameterOwner::TypeReference(_) | GenericParameterOwner::MethodReference(_) => {
                Ok(Arc::default())
            }
        }
    }

    fn generic_parameter_rows(
        &mut self,
        token: Token,
        owner: &GenericParameterOwner,
    ) -> Result<Vec<GenericParamRc>> {
        let reader = self.reader;
        let runs = self.generic_param_runs()?.get(&token);

        self.scoped(|ctx| {
            let mut parameters = Vec::new();
            for rid in runs.into_iter().flatten().flat_map(|range| range.rows()) {
                if let Some(parameter) = reader.cache.generic_params.get(rid) {
                    parameters.push(parameter);
                    continue;
                }

                ctx.cursor.move_to(TableId::GenericParam, rid)?;
                let number = ctx.cursor.read_u16()?;
                let flags = GenericParameterAttributes::from_bits_truncate(ctx.cursor.read_u16()?);
                ctx.cursor.skip(Column::Coded(CodedIndexType::TypeOrMethodDef))?;
                let name = ctx.cursor.read_string()?.to_string();

                let parameter = Arc::new(GenericParameter::new(
                    Token::from_parts(TableId::GenericParam, rid),
                    name,
                    u32::from(number),
                    flags,
                    owner.clone(),
                    ctx.module(),
                ));
                parameters.push(reader.cache.generic_params.insert(rid, parameter)?);
            }

            parameters.sort_by_key(|parameter| parameter.position);
            Ok(parameters)
        })
    }

    /// The `GenericParam` row `rid`, materialized through its owner
    pub fn generic_parameter_row(&mut self, rid: u32) -> Result<GenericParamRc> {
        let reader = self.reader;
        if let Some(parameter) = reader.cache.generic_params.get(rid) {
            return Ok(parameter);
        }
        self.check_row(TableId::GenericParam, rid)?;

        let owner_token = self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::GenericParam, rid)?;
            ctx.cursor.skip(Column::U16)?;
            ctx.cursor.skip(Column::U16)?;
            ctx.cursor.read_coded_index(CodedIndexType::TypeOrMethodDef)
        })?;

        let owner = match owner_token.table_id() {
            Some(TableId::TypeDef) => GenericParameterOwner::Type(Arc::downgrade(
                &self.type_definition(owner_token.row())?,
            )),
            Some(TableId::MethodDef) => {
                GenericParameterOwner::Method(Arc::downgrade(&self.method(owner_token.row())?))
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid owner {} of generic parameter {}",
                    owner_token,
                    rid
                ))
            }
        };

        self.generic_parameters(&owner)?;
        reader.cache.generic_params.get(rid).ok_or_else(|| {
            malformed_error!("Generic parameter {} is not listed by its owner", rid)
        })
    }

    pub fn generic_constraints(&mut self, parameter: &GenericParamRc) -> Result<Arc<Vec<CilType>>> {
        parameter
            .constraints
            .get_or_materialize(parameter.token, || {
                let runs = self.constraint_runs()?.get(&parameter.token);
                let generics = parameter
                    .owner
                    .as_ref()
                    .map(GenericContext::for_owner)
                    .unwrap_or_default();

                self.scoped_with(generics, |ctx| {
                    let mut constraints = Vec::new();
                    for rid in runs.into_iter().flatten().flat_map(|range| range.rows()) {
                        ctx.cursor.move_to(TableId::GenericParamConstraint, rid)?;
                        ctx.cursor.skip(Column::Table(TableId::GenericParam))?;
                        let constraint =
                            ctx.cursor.read_coded_index(CodedIndexType::TypeDefOrRef)?;
                        constraints.push(ctx.type_token(constraint)?);
                    }
                    Ok(constraints)
                })
            })
    }

    pub fn assembly_reference(&mut self, rid: u32) -> Result<AssemblyRefRc> {
        let reader = self.reader;
        if let Some(reference) = reader.cache.assembly_refs.get(rid) {
            return Ok(reference);
        }
        self.check_row(TableId::AssemblyRef, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::AssemblyRef, rid)?;
            let version = AssemblyVersion::new(
                ctx.cursor.read_u16()?,
                ctx.cursor.read_u16()?,
                ctx.cursor.read_u16()?,
                ctx.cursor.read_u16()?,
            );
            let flags = AssemblyFlags::from_bits_truncate(ctx.cursor.read_u32()?);
            let public_key_or_token = ctx.cursor.read_blob_index()?;
            let name = ctx.cursor.read_string()?.to_string();
            let culture = ctx.cursor.read_string()?;
            let hash_value = ctx.cursor.read_blob_index()?;

            let reference = AssemblyNameReference {
                token: Token::from_parts(TableId::AssemblyRef, rid),
                name,
                version,
                culture: (!culture.is_empty()).then(|| culture.to_string()),
                flags,
                public_key_or_token: ctx.image.blob(public_key_or_token)?.to_vec(),
                hash_value: ctx.image.blob(hash_value)?.to_vec(),
            };
            reader.cache.assembly_refs.insert(rid, Arc::new(reference))
        })
    }

    pub fn module_reference(&mut self, rid: u32) -> Result<ModuleRefRc> {
        let reader = self.reader;
        if let Some(reference) = reader.cache.module_refs.get(rid) {
            return Ok(reference);
        }
        self.check_row(TableId::ModuleRef, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::ModuleRef, rid)?;
            let name = ctx.cursor.read_string()?.to_string();
            reader.cache.module_refs.insert(
                rid,
                Arc::new(ModuleReference {
                    token: Token::from_parts(TableId::ModuleRef, rid),
                    name,
                }),
            )
        })
    }

    pub fn exported_type(&mut self, rid: u32) -> Result<ExportedTypeRc> {
        let reader = self.reader;
        if let Some(exported) = reader.cache.exported_types.get(rid) {
            return Ok(exported);
        }
        self.check_row(TableId::ExportedType, rid)?;

        self.scoped(|ctx| {
            ctx.cursor.move_to(TableId::ExportedType, rid)?;
            let flags = ctx.cursor.read_u32()?;
            let type_def_id = ctx.cursor.read_u32()?;
            let name = ctx.cursor.read_string()?.to_string();
            let namespace = ctx.cursor.read_string()?.to_string();
            let implementation = ctx.cursor.read_coded_index(CodedIndexType::Implementation)?;

            let token = Token::from_parts(TableId::ExportedType, rid);
            let implementation = match implementation.table_id() {
                Some(TableId::File) => ExportedTypeImplementation::File(implementation),
                Some(TableId::AssemblyRef) => ExportedTypeImplementation::AssemblyReference(
                    ctx.assembly_reference(implementation.row())?,
                ),
                Some(TableId::ExportedType) if implementation.row() != rid => {
                    ExportedTypeImplementation::ExportedType(implementation)
                }
                _ => {
                    return Err(malformed_error!(
                        "Invalid implementation {} of exported type {}",
                        implementation,
                        token
                    ))
                }
            };

            reader.cache.exported_types.insert(
                rid,
                Arc::new(ExportedType {
                    token,
                    flags,
                    type_def_id,
                    namespace,
                    name,
                    implementation,
                }),
            )
        })
    }

    pub fn module_identity(&mut self) -> Result<Option<&'a ModuleIdentity>> {
        let reader = self.reader;
        if let Some(identity) = reader.cache.module.get() {
            return Ok(identity.as_ref());
        }

        let identity = if self.rows(TableId::Module) == 0 {
            None
        } else {
            self.scoped(|ctx| {
                ctx.cursor.move_to(TableId::Module, 1)?;
                ctx.cursor.skip(Column::U16)?;
                let name = ctx.cursor.read_string()?.to_string();
                let mvid = ctx.cursor.read_guid()?;
                Ok(Some(ModuleIdentity { name, mvid }))
            })?
        };
        Ok(reader.cache.module.get_or_init(|| identity).as_ref())
    }

    pub fn assembly(&mut self) -> Result<Option<Arc<AssemblyDefinition>>> {
        let reader = self.reader;
        if let Some(assembly) = reader.cache.assembly.get() {
            return Ok(assembly.clone());
        }

        let assembly = if self.rows(TableId::Assembly) == 0 {
            None
        } else {
            self.scoped(|ctx| {
                ctx.cursor.move_to(TableId::Assembly, 1)?;
                let hash_algorithm = ctx.cursor.read_u32()?;
                let version = AssemblyVersion::new(
                    ctx.cursor.read_u16()?,
                    ctx.cursor.read_u16()?,
                    ctx.cursor.read_u16()?,
                    ctx.cursor.read_u16()?,
                );
                let flags = AssemblyFlags::from_bits_truncate(ctx.cursor.read_u32()?);
                let public_key = ctx.cursor.read_blob_index()?;
                let name = ctx.cursor.read_string()?.to_string();
                let culture = ctx.cursor.read_string()?;

                Ok(Some(Arc::new(AssemblyDefinition {
                    hash_algorithm,
                    name: AssemblyNameReference {
                        token: Token::from_parts(TableId::Assembly, 1),
                        name,
                        version,
                        culture: (!culture.is_empty()).then(|| culture.to_string()),
                        flags,
                        public_key_or_token: ctx.image.blob(public_key)?.to_vec(),
                        hash_value: Vec::new(),
                    },
                })))
            })?
        };
        Ok(reader.cache.assembly.get_or_init(|| assembly).clone())
    }

    /// Where this module's signatures find the built-in types
    pub fn corlib_scope(&mut self) -> Result<MetadataScope> {
        let reader = self.reader;
        if let Some(scope) = reader.cache.corlib.get() {
            return Ok(scope.clone());
        }

        let found = self.scoped(|ctx| {
            for rid in 1..=ctx.rows(TableId::AssemblyRef) {
                ctx.cursor.move_to(TableId::AssemblyRef, rid)?;
                for column in [Column::U16, Column::U16, Column::U16, Column::U16] {
                    ctx.cursor.skip(column)?;
                }
                ctx.cursor.skip(Column::U32)?;
                ctx.cursor.skip(Column::Blob)?;
                if CORLIB_NAMES.contains(&ctx.cursor.read_string()?) {
                    return Ok(Some(rid));
                }
            }
            Ok(None)
        })?;

        let scope = match found {
            Some(rid) => MetadataScope::AssemblyReference(self.assembly_reference(rid)?),
            None if self
                .type_names()?
                .contains_key(&("System".to_string(), "Object".to_string())) =>
            {
                MetadataScope::Module(self.module())
            }
            None => {
                let mut mscorlib =
                    AssemblyNameReference::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
                mscorlib.public_key_or_token = ECMA_PUBLIC_KEY_TOKEN.to_vec();
                MetadataScope::AssemblyReference(Arc::new(mscorlib))
            }
        };

        log::debug!("Core library of {} is {:?}", reader.name(), scope);
        Ok(reader.cache.corlib.get_or_init(|| scope).clone())
    }

    /// The node for a built-in type: a local `System` definition, otherwise a reference
    /// into the core library. One node per kind and module.
    pub fn primitive(&mut self, kind: PrimitiveKind) -> Result<CilType> {
        let reader = self.reader;
        let slot = &reader.cache.primitives[kind as usize];
        if let Some(ty) = slot.get() {
            return Ok(ty.clone());
        }

        let local = self
            .type_names()?
            .get(&("System".to_string(), kind.name().to_string()))
            .copied();
        let ty = match local {
            Some(rid) => CilType::definition(&self.type_definition(rid)?),
            None => {
                let scope = self.corlib_scope()?;
                CilType::Reference(Arc::new(TypeReference::synthesized(
                    "System",
                    kind.name(),
                    Some(scope),
                    kind.is_value_type(),
                )))
            }
        };
        Ok(slot.get_or_init(|| ty).clone())
    }
}
