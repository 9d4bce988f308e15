//! Resolvers of the fields of generated object, connection and edge types.
//!
//! Object types resolve against an [`Entity`] parent, connection types against a [`Paginator`]
//! and edge types against the [`Entity`] of the edge. Every property read is authorized first:
//! the caller must be allowed to view the property, and to view the target of a to-one relation.
//! A paginated relation is returned as a [`Paginator`] whose `totalCount` and `edges` authorize
//! listing the target model when (and if) they are selected.

use super::crud::MutationObserver;
use super::eager::EagerLoadPlanner;
use super::selection::Selection;
use super::type_graph::{FieldNode, FieldShape, TypeGraph};
use crate::error::{Error, Result};
use crate::model::{entity::to_graphql, Catalog, Entity, Loaded, ModelId};
use crate::security::{Caller, SecurityGuard};
use crate::sql::db::{Connection, Query, Value};
use crate::sql::ops::{
    column_name,
    relation::{entities, related_query, Loader, RelationArgs},
};
use crate::sql::{Paginator, RelationSource};
use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext};
use async_graphql::{ErrorExtensions, Number, Value as GqlValue};
use std::any::Any;
use std::sync::Arc;

/// Everything a resolver needs at request time, shared by every resolver of a schema.
pub(crate) struct Runtime<C> {
    pub conn: C,
    pub catalog: Arc<Catalog>,
    pub graph: Arc<TypeGraph>,
    pub guard: SecurityGuard,
    pub observer: Arc<dyn MutationObserver>,
    pub selection_depth: usize,
    pub max_depth: usize,
}

impl<C: Connection> Runtime<C> {
    pub fn loader(&self) -> Loader<'_, C> {
        Loader::new(&self.conn, &self.catalog, self.max_depth)
    }

    /// A paginator over `source`, restricted by `args`.
    pub fn paginate(
        &self,
        caller: &Caller,
        model: &ModelId,
        source: RelationSource,
        args: RelationArgs,
    ) -> Result<Paginator> {
        let mut paginator = Paginator::new(self.catalog.clone(), self.max_depth, model.clone(), source)
            .limit(args.limit)
            .offset(args.offset);
        if let Some(filter) = args.filter {
            paginator = paginator.filter(&self.guard, caller, filter)?;
        }
        paginator.order(args.order)
    }

    /// Load the relations the `selections` traverse from `entities` of `model`.
    pub async fn eager_load(
        &self,
        model: &ModelId,
        entities: &mut [Entity],
        selections: &[&Selection],
    ) -> Result<()> {
        let root = self.graph.object(model)?;
        let plan = EagerLoadPlanner::new(&self.catalog, &self.graph)
            .plan_all(selections.iter().copied(), root)?;
        if plan.is_empty() {
            return Ok(());
        }
        self.loader()
            .load_paths(model, entities, plan.entries())
            .await
    }

    /// The value of a scalar property, read through the model's accessor if it has one.
    pub fn read(&self, entity: &Entity, property: &str) -> Result<Value> {
        let accessor = self.catalog.definition(&entity.model)?.accessor;
        Ok(accessor
            .and_then(|accessor| accessor(entity, property))
            .unwrap_or_else(|| entity.get(&column_name(property))))
    }
}

/// The caller attached to the request, or an anonymous one.
pub(crate) fn caller(ctx: &ResolverContext) -> Caller {
    ctx.data_opt::<Caller>().cloned().unwrap_or_default()
}

/// The parent value of a field, which must be of type `T`.
pub(crate) fn parent<'a, T: Any>(ctx: &ResolverContext<'a>) -> Result<&'a T> {
    ctx.parent_value
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Schema {
            error: format!(
                "field {} expected a {} parent",
                ctx.field().name(),
                std::any::type_name::<T>()
            ),
        })
}

/// Capture the selection of the field being resolved.
pub(crate) fn capture<C>(runtime: &Runtime<C>, ctx: &ResolverContext) -> Result<Selection> {
    Selection::capture(&ctx.field(), runtime.selection_depth)
}

pub(crate) fn entity_list<'a>(entities: Vec<Entity>) -> FieldValue<'a> {
    FieldValue::list(entities.into_iter().map(FieldValue::owned_any))
}

/// The resolver of a field of a generated output type.
pub(crate) fn field_resolver<C: Connection>(
    runtime: Arc<Runtime<C>>,
    field: FieldNode,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    let field = Arc::new(field);
    move |ctx: ResolverContext| {
        let runtime = runtime.clone();
        let field = field.clone();
        FieldFuture::new(async move {
            resolve(&runtime, &field, &ctx)
                .await
                .map_err(|err| err.extend())
        })
    }
}

async fn resolve<'a, C: Connection>(
    runtime: &Runtime<C>,
    field: &FieldNode,
    ctx: &ResolverContext<'a>,
) -> Result<Option<FieldValue<'a>>> {
    let caller = caller(ctx);
    match &field.shape {
        FieldShape::Scalar(_) => {
            let entity = parent::<Entity>(ctx)?;
            runtime
                .guard
                .assert_can_view_property(&caller, entity, &field.name)?;
            let value = runtime.read(entity, &field.name)?;
            Ok(Some(FieldValue::value(to_graphql(&value))))
        }
        FieldShape::ToOne(target) => {
            let entity = parent::<Entity>(ctx)?;
            runtime
                .guard
                .assert_can_view_property(&caller, entity, &field.name)?;
            let related = match entity.relation(&field.name) {
                Some(Loaded::One(loaded)) => loaded.as_deref().cloned(),
                _ => load_one(runtime, entity, &field.name, target).await?,
            };
            let Some(related) = related else {
                return Ok(None);
            };
            runtime.guard.assert_can_view(&caller, &related)?;
            Ok(Some(FieldValue::owned_any(related)))
        }
        FieldShape::ToMany(target) => {
            let entity = parent::<Entity>(ctx)?;
            runtime
                .guard
                .assert_can_view_property(&caller, entity, &field.name)?;
            let args = RelationArgs::parse(&runtime.catalog, target, ctx.args.as_index_map())?;
            if let Some(filter) = &args.filter {
                runtime.guard.assert_can_filter(&caller, target, filter)?;
            }
            let related = match entity.relation_with(&field.name, &args) {
                Some(Loaded::Many(loaded)) => loaded.clone(),
                _ => load_many(runtime, entity, &field.name, &args).await?,
            };
            Ok(Some(entity_list(
                runtime.guard.filter_viewable(&caller, related),
            )))
        }
        FieldShape::Connection(target) => {
            let entity = parent::<Entity>(ctx)?;
            runtime
                .guard
                .assert_can_view_property(&caller, entity, &field.name)?;
            let args = RelationArgs::parse(&runtime.catalog, target, ctx.args.as_index_map())?;
            let relation = runtime.catalog.relation(&entity.model, &field.name)?;
            let source = match related_query(&relation, entity) {
                Some(query) => RelationSource::Query(query),
                None => RelationSource::Materialized(vec![]),
            };
            let preloaded = match entity.relation_with(&field.name, &args) {
                Some(Loaded::Many(loaded)) => Some(loaded.clone()),
                _ => None,
            };
            let mut paginator = runtime.paginate(&caller, target, source, args)?;
            if let Some(loaded) = preloaded {
                paginator = paginator.with_entries(loaded);
            }
            Ok(Some(FieldValue::owned_any(paginator)))
        }
        FieldShape::TotalCount => {
            let paginator = parent::<Paginator>(ctx)?;
            runtime
                .guard
                .assert_can_view_any(&caller, paginator.model())?;
            let count = paginator.count(&runtime.conn).await?;
            Ok(Some(FieldValue::value(GqlValue::Number(Number::from(
                count as u64,
            )))))
        }
        FieldShape::Edges(target) => {
            let paginator = parent::<Paginator>(ctx)?;
            runtime
                .guard
                .assert_can_view_any(&caller, paginator.model())?;
            let mut entries = paginator.get(&runtime.conn).await?;
            if !paginator.is_preloaded() {
                let selection = capture(runtime, ctx)?;
                let nodes = selection.descend(&["node"]);
                runtime.eager_load(target, &mut entries, &nodes).await?;
            }
            Ok(Some(entity_list(entries)))
        }
        FieldShape::Node(_) => {
            let entity = parent::<Entity>(ctx)?;
            Ok(Some(FieldValue::borrowed_any(entity)))
        }
        FieldShape::Input => Err(Error::Schema {
            error: format!("input field {} has no resolver", field.name),
        }),
    }
}

/// Query the target of a to-one relation of `entity`.
async fn load_one<C: Connection>(
    runtime: &Runtime<C>,
    entity: &Entity,
    property: &str,
    target: &ModelId,
) -> Result<Option<Entity>> {
    let relation = runtime.catalog.relation(&entity.model, property)?;
    let Some(query) = related_query(&relation, entity) else {
        return Ok(None);
    };
    let records = query
        .limit(Some(1))
        .many(&runtime.conn)
        .await
        .map_err(Error::sql)?;
    Ok(entities(target, records).into_iter().next())
}

/// Query the targets of a to-many relation of `entity`, restricted by `args`.
async fn load_many<C: Connection>(
    runtime: &Runtime<C>,
    entity: &Entity,
    property: &str,
    args: &RelationArgs,
) -> Result<Vec<Entity>> {
    let mut owner = Entity::new(entity.model.clone(), entity.attributes.clone());
    runtime
        .loader()
        .load(&entity.model, &mut [&mut owner], property, args)
        .await?;
    Ok(match owner.relations.remove(property) {
        Some(Loaded::Many(related)) => related,
        _ => vec![],
    })
}

/// A query over every row of `model`'s table.
pub(crate) fn table_query<C>(runtime: &Runtime<C>, model: &ModelId) -> Result<Query> {
    Ok(Query::from(runtime.catalog.table(model)?))
}
