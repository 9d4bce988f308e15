//! Root query and mutation fields: listing, viewing, creating, updating and deleting entities.
//!
//! Every root resolver authorizes the operation before touching the database, except `view` of a
//! missing entity, which resolves to null without consulting the policy. Mutations which find no
//! entity under the given key resolve to `false`.

use super::resolvers::{caller, capture, entity_list, table_query, Runtime};
use super::schema::RootField;
use crate::error::{Error, Result};
use crate::model::{entity::from_graphql, Catalog, Entity, Link, ModelId, PropertyType, Relation, ID};
use crate::security::Caller;
use crate::sql::db::{Connection, Record, Value};
use crate::sql::ops::{column_name, persist, relation::RelationArgs};
use crate::sql::RelationSource;
use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext};
use async_graphql::{ErrorExtensions, Name, Value as GqlValue};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::instrument;

/// Hooks called around each generated mutation.
///
/// All methods default to doing nothing. Hooks cannot veto a mutation; authorization is the job of
/// the [`Policy`](crate::security::Policy).
pub trait MutationObserver: Send + Sync + 'static {
    /// Called before inserting a new entity with the given column values.
    fn creating(&self, _model: &ModelId, _attributes: &Record) {}
    /// Called after a new entity and its relations are stored.
    fn created(&self, _entity: &Entity) {}
    /// Called before writing `changes` to `entity`.
    fn updating(&self, _entity: &Entity, _changes: &Record) {}
    fn updated(&self, _entity: &Entity) {}
    fn deleting(&self, _entity: &Entity) {}
    fn deleted(&self, _entity: &Entity) {}
}

/// A [`MutationObserver`] which ignores every mutation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl MutationObserver for NoopObserver {}

/// The resolver of a root field.
///
/// `input` names the argument carrying the input object of create and update fields.
pub(crate) fn root_resolver<C: Connection>(
    runtime: Arc<Runtime<C>>,
    root: RootField,
    input: String,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    let root = Arc::new(root);
    let input = Arc::new(input);
    move |ctx: ResolverContext| {
        let runtime = runtime.clone();
        let root = root.clone();
        let input = input.clone();
        FieldFuture::new(async move {
            let caller = caller(&ctx);
            let args = ctx.args.as_index_map();
            let value = match root.as_ref() {
                RootField::All { model, options } if options.paginate => {
                    all_paginated(&runtime, &caller, model, args).await?
                }
                RootField::All { model, .. } => all(&runtime, &ctx, &caller, model).await?,
                RootField::View { model } => view(&runtime, &ctx, &caller, model).await?,
                RootField::Create { model } => {
                    create(&runtime, &ctx, &caller, model, input_arg(args, &input)?).await?
                }
                RootField::Update { model } => {
                    update(&runtime, &caller, model, id_arg(args)?, input_arg(args, &input)?)
                        .await?
                }
                RootField::Delete { model } => delete(&runtime, &caller, model, id_arg(args)?).await?,
            };
            Ok(value)
        })
    }
}

fn id_arg(args: &IndexMap<Name, GqlValue>) -> Result<i64, async_graphql::Error> {
    match args.get("id") {
        Some(GqlValue::Number(id)) => id
            .as_i64()
            .ok_or_else(|| Error::input(format!("invalid id {id}")).extend()),
        _ => Err(Error::input("missing id").extend()),
    }
}

fn input_arg<'a>(
    args: &'a IndexMap<Name, GqlValue>,
    name: &str,
) -> Result<&'a GqlValue, async_graphql::Error> {
    args.get(name)
        .ok_or_else(|| Error::input(format!("missing {name}")).extend())
}

fn boolean<'a>(value: bool) -> Option<FieldValue<'a>> {
    Some(FieldValue::value(GqlValue::Boolean(value)))
}

#[instrument(skip_all, fields(model = %model))]
async fn all_paginated<'a, C: Connection>(
    runtime: &Runtime<C>,
    caller: &Caller,
    model: &ModelId,
    args: &IndexMap<Name, GqlValue>,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let paginator = async {
        runtime.guard.assert_can_view_any(caller, model)?;
        let args = RelationArgs::parse(&runtime.catalog, model, args)?;
        let query = table_query(runtime, model)?;
        runtime.paginate(caller, model, RelationSource::Query(query), args)
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(Some(FieldValue::owned_any(paginator)))
}

#[instrument(skip_all, fields(model = %model))]
async fn all<'a, C: Connection>(
    runtime: &Runtime<C>,
    ctx: &ResolverContext<'a>,
    caller: &Caller,
    model: &ModelId,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let entities = async {
        let args = RelationArgs::parse(&runtime.catalog, model, ctx.args.as_index_map())?;
        let query = table_query(runtime, model)?;
        let paginator = runtime.paginate(caller, model, RelationSource::Query(query), args)?;
        let mut entities = paginator.get(&runtime.conn).await?;
        let selection = capture(runtime, ctx)?;
        runtime
            .eager_load(model, &mut entities, &[&selection])
            .await?;
        Ok::<_, Error>(runtime.guard.filter_viewable(caller, entities))
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(Some(entity_list(entities)))
}

#[instrument(skip_all, fields(model = %model))]
async fn view<'a, C: Connection>(
    runtime: &Runtime<C>,
    ctx: &ResolverContext<'a>,
    caller: &Caller,
    model: &ModelId,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let id = id_arg(ctx.args.as_index_map())?;
    let entity = async {
        let table = runtime.catalog.table(model)?;
        let Some(entity) = persist::find(&runtime.conn, model, &table, id).await? else {
            return Ok(None);
        };
        runtime.guard.assert_can_view(caller, &entity)?;
        let mut entities = [entity];
        let selection = capture(runtime, ctx)?;
        runtime
            .eager_load(model, &mut entities, &[&selection])
            .await?;
        let [entity] = entities;
        Ok::<_, Error>(Some(entity))
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(entity.map(FieldValue::owned_any))
}

#[instrument(skip_all, fields(model = %model))]
async fn create<'a, C: Connection>(
    runtime: &Runtime<C>,
    ctx: &ResolverContext<'a>,
    caller: &Caller,
    model: &ModelId,
    input: &GqlValue,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let entity = async {
        runtime.guard.assert_can_create(caller, model, input)?;
        let changes = Changes::parse(&runtime.catalog, model, input, true)?;
        let table = runtime.catalog.table(model)?;

        runtime.observer.creating(model, &changes.attributes);
        let id = persist::insert(&runtime.conn, &table, changes.attributes).await?;
        for (relation, targets) in &changes.relations {
            persist::sync(&runtime.conn, relation, id, targets).await?;
        }
        let entity = persist::find(&runtime.conn, model, &table, id)
            .await?
            .ok_or_else(|| Error::sql(format!("{model} {id} is missing after insert")))?;
        runtime.observer.created(&entity);

        let mut entities = [entity];
        let selection = capture(runtime, ctx)?;
        runtime
            .eager_load(model, &mut entities, &[&selection])
            .await?;
        let [entity] = entities;
        Ok::<_, Error>(entity)
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(Some(FieldValue::owned_any(entity)))
}

#[instrument(skip_all, fields(model = %model, id = id))]
async fn update<'a, C: Connection>(
    runtime: &Runtime<C>,
    caller: &Caller,
    model: &ModelId,
    id: i64,
    input: &GqlValue,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let updated = async {
        let table = runtime.catalog.table(model)?;
        let Some(entity) = persist::find(&runtime.conn, model, &table, id).await? else {
            return Ok(false);
        };
        runtime.guard.assert_can_update(caller, &entity, input)?;
        let changes = Changes::parse(&runtime.catalog, model, input, false)?;

        runtime.observer.updating(&entity, &changes.attributes);
        persist::update(&runtime.conn, &table, id, changes.attributes).await?;
        for (relation, targets) in &changes.relations {
            persist::sync(&runtime.conn, relation, id, targets).await?;
        }
        if let Some(entity) = persist::find(&runtime.conn, model, &table, id).await? {
            runtime.observer.updated(&entity);
        }
        Ok::<_, Error>(true)
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(boolean(updated))
}

#[instrument(skip_all, fields(model = %model, id = id))]
async fn delete<'a, C: Connection>(
    runtime: &Runtime<C>,
    caller: &Caller,
    model: &ModelId,
    id: i64,
) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
    let deleted = async {
        let table = runtime.catalog.table(model)?;
        let Some(entity) = persist::find(&runtime.conn, model, &table, id).await? else {
            return Ok(false);
        };
        runtime.guard.assert_can_delete(caller, &entity)?;
        runtime.observer.deleting(&entity);
        let count = persist::delete(&runtime.conn, &table, id).await?;
        runtime.observer.deleted(&entity);
        Ok::<_, Error>(count > 0)
    }
    .await
    .map_err(|err| err.extend())?;
    Ok(boolean(deleted))
}

/// An input object, split into column values and inverse-owned relation links.
#[derive(Clone, Debug, Default, PartialEq)]
struct Changes {
    /// Scalar columns and belongs-to foreign keys, written with the row itself.
    attributes: Record,
    /// Relations stored on other rows, synced once the row has a key.
    relations: Vec<(Relation, Vec<i64>)>,
}

impl Changes {
    /// Split `input` for `model`. With `skip_nulls`, explicit nulls leave the column at its default.
    fn parse(catalog: &Catalog, model: &ModelId, input: &GqlValue, skip_nulls: bool) -> Result<Self> {
        let GqlValue::Object(fields) = input else {
            return Err(Error::input(format!("input for {model} must be an object")));
        };
        let mut changes = Self::default();
        for (name, value) in fields {
            let property = catalog.property(model, name)?;
            if property.name == ID || !property.is_writable() {
                return Err(Error::input(format!("{model}.{name} is not writable")));
            }
            if skip_nulls && value == &GqlValue::Null {
                continue;
            }
            match &property.ty {
                PropertyType::Scalar(kind) => {
                    changes
                        .attributes
                        .insert(column_name(name), from_graphql(value, *kind)?);
                }
                PropertyType::Model(_) => {
                    let relation = catalog.relation(model, name)?;
                    let targets = target_ids(name, value)?;
                    match &relation.link {
                        Link::BelongsTo { foreign_key } => {
                            let key = targets.first().copied().map(Value::Int).unwrap_or_default();
                            changes.attributes.insert(foreign_key.clone(), key);
                        }
                        _ => changes.relations.push((relation, targets)),
                    }
                }
                ty => {
                    return Err(Error::UnsupportedType {
                        model: model.to_string(),
                        property: name.to_string(),
                        ty: ty.to_string(),
                    })
                }
            }
        }
        Ok(changes)
    }
}

/// The keys of the targets a relation input refers to. Null refers to no target.
fn target_ids(name: &str, value: &GqlValue) -> Result<Vec<i64>> {
    let id = |value: &GqlValue| match value {
        GqlValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::input(format!("invalid key {n} for {name}"))),
        other => Err(Error::input(format!("invalid key {other} for {name}"))),
    };
    match value {
        GqlValue::Null => Ok(vec![]),
        GqlValue::List(values) => values.iter().map(id).collect(),
        value => Ok(vec![id(value)?]),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::test::library;
    use async_graphql::value;

    fn book() -> ModelId {
        "library::Book".into()
    }

    #[test]
    fn test_changes_split_relations() {
        init_logging();
        let catalog = library();
        let changes = Changes::parse(
            &catalog,
            &book(),
            &value!({ "name": "Dune", "author": 2, "readers": [1, 3] }),
            true,
        )
        .unwrap();
        assert_eq!(changes.attributes.get("name"), Some(&Value::from("Dune")));
        assert_eq!(changes.attributes.get("author_id"), Some(&Value::Int(2)));
        assert_eq!(changes.relations.len(), 1);
        assert_eq!(changes.relations[0].0.property, "readers");
        assert_eq!(changes.relations[0].1, [1, 3]);
    }

    #[test]
    fn test_changes_nulls() {
        init_logging();
        let catalog = library();
        let input = value!({ "name": null, "author": null });

        let create = Changes::parse(&catalog, &book(), &input, true).unwrap();
        assert_eq!(create, Changes::default());

        let update = Changes::parse(&catalog, &book(), &input, false).unwrap();
        assert_eq!(update.attributes.get("name"), Some(&Value::Null));
        assert_eq!(update.attributes.get("author_id"), Some(&Value::Null));
    }

    #[test]
    fn test_changes_reject_unwritable() {
        init_logging();
        let catalog = library();
        for input in [value!({ "id": 4 }), value!({ "nonsense": 1 }), value!([1])] {
            Changes::parse(&catalog, &book(), &input, true).unwrap_err();
        }
        let err = Changes::parse(&catalog, &book(), &value!({ "author": "two" }), true).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
