//! The decode context threaded through every materializer.
//!
//! A [`ReadContext`] carries the table cursor and the active generic context of one
//! call chain. Nested lookups go through [`ReadContext::scoped`], which snapshots both and
//! puts them back on every exit path, so an outer decode continues exactly where it
//! stopped no matter how deep the nested lookup went or whether it failed.

use std::sync::{Arc, Weak};

use crate::{
    metadata::{
        image::{MetadataImage, TableCursor},
        reader::{MetadataItem, MetadataReader},
        tables::TableId,
        token::{Token, USER_STRING_KIND},
        typesystem::{CilType, GenericParameterOwner, MethodDefRc, TypeDefRc},
    },
    Error, Result,
};

/// The entities `!n` and `!!n` are interpreted against
#[derive(Clone, Default, Debug)]
pub(crate) struct GenericContext {
    pub type_owner: Option<GenericParameterOwner>,
    pub method_owner: Option<GenericParameterOwner>,
}

impl GenericContext {
    pub fn for_type(owner: &TypeDefRc) -> Self {
        GenericContext {
            type_owner: Some(GenericParameterOwner::Type(Arc::downgrade(owner))),
            method_owner: None,
        }
    }

    pub fn for_method(owner: &TypeDefRc, method: &MethodDefRc) -> Self {
        GenericContext {
            type_owner: Some(GenericParameterOwner::Type(Arc::downgrade(owner))),
            method_owner: Some(GenericParameterOwner::Method(Arc::downgrade(method))),
        }
    }

    /// Context of a generic parameter's owner, used for its constraints
    pub fn for_owner(owner: &GenericParameterOwner) -> Self {
        match owner {
            GenericParameterOwner::Type(_) | GenericParameterOwner::TypeReference(_) => {
                GenericContext {
                    type_owner: Some(owner.clone()),
                    method_owner: None,
                }
            }
            GenericParameterOwner::Method(method) => GenericContext {
                type_owner: method
                    .upgrade()
                    .and_then(|method| method.declaring_type())
                    .map(|declaring| GenericParameterOwner::Type(Arc::downgrade(&declaring))),
                method_owner: Some(owner.clone()),
            },
            GenericParameterOwner::MethodReference(_) => GenericContext {
                type_owner: None,
                method_owner: Some(owner.clone()),
            },
        }
    }

    /// The owner whose parameters `!n` of a member of `ty` refer to
    pub fn type_owner_of(ty: &CilType) -> Option<GenericParameterOwner> {
        match ty.element_type() {
            CilType::Definition(definition) => Some(GenericParameterOwner::Type(definition)),
            CilType::Reference(reference) => Some(GenericParameterOwner::TypeReference(
                Arc::downgrade(&reference),
            )),
            _ => None,
        }
    }

    /// Owner tokens, for comparing contexts
    pub fn tokens(&self) -> (Option<Token>, Option<Token>) {
        (
            self.type_owner.as_ref().map(GenericParameterOwner::token),
            self.method_owner.as_ref().map(GenericParameterOwner::token),
        )
    }
}

/// Cursor, generic context and nesting depth of one read.
pub(crate) struct ReadContext<'a> {
    pub reader: &'a MetadataReader,
    pub image: &'a dyn MetadataImage,
    pub cursor: TableCursor<'a>,
    pub generics: GenericContext,
    depth: usize,
}

impl<'a> ReadContext<'a> {
    pub fn new(reader: &'a MetadataReader, image: &'a dyn MetadataImage) -> Self {
        ReadContext {
            reader,
            image,
            cursor: TableCursor::new(image),
            generics: GenericContext::default(),
            depth: 0,
        }
    }

    /// Run `f` as a nested lookup.
    ///
    /// Cursor and generic context are restored afterwards, whether `f` succeeded or not.
    ///
    /// # Errors
    /// Returns [`Error::RecursionLimit`] once nesting exceeds `max_signature_depth`, or
    /// whatever `f` fails with.
    pub fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let limit = self.reader.options().max_signature_depth;
        if self.depth >= limit {
            return Err(Error::RecursionLimit(limit));
        }

        let cursor = self.cursor;
        let generics = self.generics.clone();
        self.depth += 1;

        let result = f(self);

        self.depth -= 1;
        self.generics = generics;
        self.cursor = cursor;
        result
    }

    /// [`ReadContext::scoped`] with `generics` active inside `f`
    pub fn scoped_with<T, F>(&mut self, generics: GenericContext, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.scoped(|ctx| {
            ctx.generics = generics;
            f(ctx)
        })
    }

    /// Row count of `table`
    pub fn rows(&self, table: TableId) -> u32 {
        self.image.table_info().rows(table)
    }

    /// Back-reference handed to every node this module creates
    pub fn module(&self) -> Weak<MetadataReader> {
        self.reader.this.clone()
    }

    pub fn max_depth(&self) -> usize {
        self.reader.options().max_signature_depth
    }

    /// Materialize whatever `token` names.
    ///
    /// A null row or a table without graph nodes yields `None`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a row id outside its table, or any error of the
    /// materializer.
    pub fn lookup(&mut self, token: Token) -> Result<Option<MetadataItem>> {
        log::trace!("lookup {}", token);

        if token.table() == USER_STRING_KIND {
            return Ok(Some(MetadataItem::UserString(
                self.image.user_string(token.row())?,
            )));
        }

        let Some(table) = token.table_id() else {
            return Ok(None);
        };
        let rid = token.row();
        if rid == 0 {
            return Ok(None);
        }

        let rows = self.rows(table);
        if rid > rows {
            return Err(malformed_error!(
                "Token {} outside of {:?} with {} rows",
                token,
                table,
                rows
            ));
        }

        let item = match table {
            TableId::Module => match self.reader.this.upgrade() {
                Some(module) => MetadataItem::Module(module),
                None => return Ok(None),
            },
            TableId::Assembly => match self.assembly()? {
                Some(assembly) => MetadataItem::Assembly(assembly),
                None => return Ok(None),
            },
            TableId::TypeDef => MetadataItem::TypeDefinition(self.type_definition(rid)?),
            TableId::TypeRef => MetadataItem::TypeReference(self.type_reference(rid)?),
            TableId::TypeSpec => MetadataItem::TypeSpecification(self.type_specification(rid)?),
            TableId::Field => MetadataItem::Field(self.field(rid)?),
            TableId::MethodDef => MetadataItem::Method(self.method(rid)?),
            TableId::Param => MetadataItem::Parameter(self.parameter(rid)?),
            TableId::Property => MetadataItem::Property(self.property(rid)?),
            TableId::Event => MetadataItem::Event(self.event(rid)?),
            TableId::MemberRef => MetadataItem::MemberReference(self.member_reference(rid)?),
            TableId::MethodSpec => {
                MetadataItem::MethodSpecification(self.method_specification(rid)?)
            }
            TableId::GenericParam => {
                MetadataItem::GenericParameter(self.generic_parameter_row(rid)?)
            }
            TableId::AssemblyRef => {
                MetadataItem::AssemblyReference(self.assembly_reference(rid)?)
            }
            TableId::ModuleRef => MetadataItem::ModuleReference(self.module_reference(rid)?),
            TableId::StandAloneSig => {
                MetadataItem::StandAloneSignature(self.stand_alone_signature(rid)?)
            }
            TableId::CustomAttribute => {
                MetadataItem::CustomAttribute(self.custom_attribute(rid)?)
            }
            TableId::DeclSecurity => {
                MetadataItem::SecurityDeclaration(self.security_declaration(rid)?)
            }
            TableId::ExportedType => MetadataItem::ExportedType(self.exported_type(rid)?),
            _ => return Ok(None),
        };

        Ok(Some(item))
    }
}
