//! Loading the targets of relations.
//!
//! [`related_query`] builds the query for the targets of one owner, which backs lazily resolved
//! relation fields. [`Loader`] loads a relation for many owners at once, issuing one query per
//! relation (two for many-to-many relations) instead of one per owner.

use super::{
    filter::{FilterCompiler, FilterExpression},
    id_column,
    order::{OrderCompiler, OrderExpression},
};
use crate::error::{Error, Result};
use crate::model::{Catalog, Entity, Link, Loaded, ModelId, Relation, ID};
use crate::sql::db::{Boolean, Column, Connection, JoinClause, Query, Value};
use async_graphql::{Name, Value as GqlValue};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Arguments restricting the targets of a relation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationArgs {
    pub filter: Option<FilterExpression>,
    pub order: Option<OrderExpression>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl RelationArgs {
    /// Parse the `filter`, `order`, `limit` and `offset` arguments of a field whose targets are of
    /// type `target`. Other arguments are ignored.
    pub fn parse(
        catalog: &Catalog,
        target: &ModelId,
        args: &IndexMap<Name, GqlValue>,
    ) -> Result<Self> {
        let mut parsed = Self::default();
        if let Some(filter) = args.get("filter") {
            let filter = FilterExpression::parse(catalog, target, filter)?;
            if !filter.is_empty() {
                parsed.filter = Some(filter);
            }
        }
        if let Some(order) = args.get("order") {
            parsed.order = OrderExpression::parse(catalog, target, order)?;
        }
        parsed.limit = parse_count(args.get("limit"), "limit")?;
        parsed.offset = parse_count(args.get("offset"), "offset")?;
        Ok(parsed)
    }

    /// Apply `offset` and `limit` to an already ordered collection.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset.filter(|n| *n > 0).unwrap_or(0))
            .take(self.limit.filter(|n| *n > 0).unwrap_or(usize::MAX))
            .collect()
    }
}

/// Parse a non-negative count argument. Absent, null and zero counts mean no restriction.
fn parse_count(value: Option<&GqlValue>, name: &str) -> Result<Option<usize>> {
    match value {
        None | Some(GqlValue::Null) => Ok(None),
        Some(GqlValue::Number(n)) => match n.as_u64() {
            Some(0) => Ok(None),
            Some(n) => Ok(Some(n as usize)),
            None => Err(Error::input(format!("{name} must be a non-negative integer"))),
        },
        Some(value) => Err(Error::input(format!("{name} must be an integer, found {value}"))),
    }
}

/// The query for the targets of `relation` owned by `owner`.
///
/// Returns [`None`] if the owner holds a null foreign key, so that it can have no target.
pub fn related_query(relation: &Relation, owner: &Entity) -> Option<Query> {
    let target = relation.target_table.as_str();
    let owner_id = owner.get(ID);
    let query = Query::from(target);
    Some(match &relation.link {
        Link::BelongsTo { foreign_key } => {
            let key = owner.get(foreign_key);
            if key.is_null() {
                return None;
            }
            query.filter(Boolean::cmp(id_column(target), "=", key))
        }
        Link::HasOne { foreign_key } | Link::HasMany { foreign_key } => query.filter(
            Boolean::cmp(Column::qualified(target.to_string(), foreign_key.clone()), "=", owner_id),
        ),
        Link::BelongsToMany {
            pivot,
            owner_key,
            related_key,
        } => query
            .join(JoinClause {
                table: pivot.clone().into(),
                lhs: Column::qualified(pivot.clone(), related_key.clone()),
                op: "=".into(),
                rhs: id_column(target),
            })
            .filter(Boolean::cmp(
                Column::qualified(pivot.clone(), owner_key.clone()),
                "=",
                owner_id,
            )),
    })
}

/// Convert the records of a query on `model`'s table into entities.
pub fn entities(model: &ModelId, records: Vec<crate::sql::db::Record>) -> Vec<Entity> {
    records
        .into_iter()
        .map(|record| Entity::new(model.clone(), record))
        .collect()
}

/// Batch loader for relations.
#[derive(Debug)]
pub struct Loader<'a, C> {
    conn: &'a C,
    catalog: &'a Catalog,
    max_depth: usize,
}

impl<'a, C: Connection> Loader<'a, C> {
    pub fn new(conn: &'a C, catalog: &'a Catalog, max_depth: usize) -> Self {
        Self {
            conn,
            catalog,
            max_depth,
        }
    }

    /// Load every dotted relation path, such as `books.readers`, for the owners.
    ///
    /// Intermediate relations which are not loaded already are loaded without restrictions.
    pub async fn load_paths(
        &self,
        model: &ModelId,
        owners: &mut [Entity],
        paths: &[(String, RelationArgs)],
    ) -> Result<()> {
        let mut paths = paths.iter().collect::<Vec<_>>();
        paths.sort_by_key(|(path, _)| path.matches('.').count());
        for (path, args) in paths {
            let segments = path.split('.').collect::<Vec<_>>();
            self.load_path(model, owners.iter_mut().collect(), &segments, args)
                .await?;
        }
        Ok(())
    }

    async fn load_path(
        &self,
        model: &ModelId,
        owners: Vec<&mut Entity>,
        segments: &[&str],
        args: &RelationArgs,
    ) -> Result<()> {
        let mut model = model.clone();
        let mut owners = owners;
        let Some((last, parents)) = segments.split_last() else {
            return Ok(());
        };
        for property in parents {
            if owners.iter().any(|owner| owner.relation(property).is_none()) {
                self.load(&model, &mut owners, property, &RelationArgs::default())
                    .await?;
            }
            model = self.catalog.relation(&model, property)?.target;
            owners = owners
                .into_iter()
                .flat_map(|owner| owner.loaded_mut(property))
                .collect();
        }
        self.load(&model, &mut owners, last, args).await
    }

    /// Load the relation `property` of every owner into its relation slot.
    pub async fn load(
        &self,
        model: &ModelId,
        owners: &mut [&mut Entity],
        property: &str,
        args: &RelationArgs,
    ) -> Result<()> {
        let relation = self.catalog.relation(model, property)?;
        tracing::debug!(
            "batch loading {model}.{property} for {} owners",
            owners.len()
        );
        match &relation.link {
            Link::BelongsTo { foreign_key } => {
                let keys = distinct_keys(owners.iter().map(|owner| owner.get(foreign_key)));
                let targets = self
                    .targets(&relation, args, ID, &keys)
                    .await?
                    .into_iter()
                    .filter_map(|target| Some((target.id()?, target)))
                    .collect::<HashMap<_, _>>();
                for owner in owners.iter_mut() {
                    let target = owner
                        .get(foreign_key)
                        .as_int()
                        .and_then(|key| targets.get(&key).cloned());
                    owner.set_restricted_relation(
                        property,
                        Loaded::One(target.map(Box::new)),
                        args.clone(),
                    );
                }
            }
            Link::HasOne { foreign_key } | Link::HasMany { foreign_key } => {
                let keys = distinct_keys(owners.iter().map(|owner| owner.get(ID)));
                let mut groups: HashMap<i64, Vec<Entity>> = HashMap::new();
                for target in self
                    .targets(&relation, args, foreign_key, &keys)
                    .await?
                {
                    if let Some(key) = target.get(foreign_key).as_int() {
                        groups.entry(key).or_default().push(target);
                    }
                }
                let one = relation.link.is_to_one();
                for owner in owners.iter_mut() {
                    let group = owner
                        .id()
                        .and_then(|id| groups.get(&id).cloned())
                        .unwrap_or_default();
                    let loaded = if one {
                        Loaded::One(group.into_iter().next().map(Box::new))
                    } else {
                        Loaded::Many(args.paginate(group))
                    };
                    owner.set_restricted_relation(property, loaded, args.clone());
                }
            }
            Link::BelongsToMany {
                pivot,
                owner_key,
                related_key,
            } => {
                let keys = distinct_keys(owners.iter().map(|owner| owner.get(ID)));
                let mut pairs: Vec<(i64, i64)> = vec![];
                if !keys.is_empty() {
                    let links = Query::from(pivot.as_str())
                        .filter(Boolean::one_of(
                            Column::qualified(pivot.clone(), owner_key.clone()),
                            keys,
                        ))
                        .many(self.conn)
                        .await
                        .map_err(Error::sql)?;
                    pairs = links
                        .iter()
                        .filter_map(|link| {
                            Some((link.get(owner_key)?.as_int()?, link.get(related_key)?.as_int()?))
                        })
                        .collect();
                }
                let related = distinct_keys(pairs.iter().map(|(_, related)| Value::Int(*related)));
                let targets = self.targets(&relation, args, ID, &related).await?;
                for owner in owners.iter_mut() {
                    let id = owner.id();
                    let group = targets
                        .iter()
                        .filter(|target| {
                            pairs
                                .iter()
                                .any(|(o, r)| Some(*o) == id && Some(*r) == target.id())
                        })
                        .cloned()
                        .collect();
                    owner.set_restricted_relation(
                        property,
                        Loaded::Many(args.paginate(group)),
                        args.clone(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Query the targets of `relation` whose `key` column is one of `keys`, applying the filter
    /// and order of `args`.
    async fn targets(
        &self,
        relation: &Relation,
        args: &RelationArgs,
        key: &str,
        keys: &[Value],
    ) -> Result<Vec<Entity>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let table = relation.target_table.as_str();
        let mut query = Query::from(table)
            .filter(Boolean::one_of(
                Column::qualified(table.to_string(), key.to_string()),
                keys.to_vec(),
            ));
        if let Some(filter) = &args.filter {
            query = FilterCompiler::new(self.catalog, self.max_depth).apply(
                query,
                &relation.target,
                filter,
            )?;
        }
        if let Some(order) = &args.order {
            query = OrderCompiler::new(self.catalog, self.max_depth).apply(
                query,
                &relation.target,
                order,
            )?;
        }
        let records = query.many(self.conn).await.map_err(Error::sql)?;
        Ok(entities(&relation.target, records))
    }
}

/// The distinct non-null values among `values`, in order of first appearance.
fn distinct_keys(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut keys = vec![];
    for value in values {
        if !value.is_null() && !keys.contains(&value) {
            keys.push(value);
        }
    }
    keys
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::test::library;
    use crate::sql::ops::test::{library_db, names};
    use async_graphql::value;

    fn book() -> ModelId {
        "library::Book".into()
    }

    fn author() -> ModelId {
        "library::Author".into()
    }

    async fn all(db: &crate::sql::db::mock::Connection, model: &ModelId) -> Vec<Entity> {
        let table = library().table(model).unwrap();
        entities(model, Query::from(table).many(db).await.unwrap())
    }

    fn loaded_names(entity: &Entity, property: &str) -> Vec<String> {
        match entity.relation(property).unwrap() {
            Loaded::One(target) => target
                .iter()
                .map(|t| String::try_from(t.get("name")).unwrap())
                .collect(),
            Loaded::Many(targets) => targets
                .iter()
                .map(|t| String::try_from(t.get("name")).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_parse_args() {
        let catalog = library();
        let args = value!({
            "filter": { "name": { "eq": "Dune" } },
            "order": { "name": { "order": "desc" } },
            "limit": 2,
            "offset": 0,
            "other": true,
        });
        let GqlValue::Object(args) = args else {
            unreachable!()
        };
        let parsed = RelationArgs::parse(&catalog, &book(), &args).unwrap();
        assert!(parsed.filter.is_some());
        assert!(parsed.order.is_some());
        assert_eq!(parsed.limit, Some(2));
        assert_eq!(parsed.offset, None);
        assert_eq!(parsed.paginate(vec![1, 2, 3]), [1, 2]);

        let GqlValue::Object(bad) = value!({ "limit": -1 }) else {
            unreachable!()
        };
        assert!(RelationArgs::parse(&catalog, &book(), &bad).is_err());
    }

    #[async_std::test]
    async fn test_related_query() {
        init_logging();
        let catalog = library();
        let db = library_db().await;
        let books = all(&db, &book()).await;
        let authors = all(&db, &author()).await;

        let query = related_query(&catalog.relation(&book(), "author").unwrap(), &books[2]).unwrap();
        assert_eq!(names(&query.many(&db).await.unwrap()), ["Tolkien"]);

        let query = related_query(&catalog.relation(&author(), "books").unwrap(), &authors[0]).unwrap();
        assert_eq!(
            names(&query.many(&db).await.unwrap()),
            ["Dune", "Children of Dune"]
        );

        let query = related_query(&catalog.relation(&book(), "readers").unwrap(), &books[0]).unwrap();
        assert_eq!(names(&query.many(&db).await.unwrap()), ["Alice", "Bob"]);

        let pencils = all(&db, &"library::Pencil".into()).await;
        assert!(related_query(
            &catalog
                .relation(&"library::Pencil".into(), "author")
                .unwrap(),
            &pencils[1]
        )
        .is_none());
    }

    #[async_std::test]
    async fn test_batch_load() {
        init_logging();
        let catalog = library();
        let db = library_db().await;
        let loader = Loader::new(&db, &catalog, 1);

        let mut books = all(&db, &book()).await;
        loader
            .load_paths(
                &book(),
                &mut books,
                &[
                    ("author.pencil".to_string(), RelationArgs::default()),
                    ("readers".to_string(), RelationArgs::default()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(loaded_names(&books[0], "author"), ["Herbert"]);
        assert_eq!(loaded_names(&books[4], "author"), ["Le Guin"]);
        assert_eq!(loaded_names(&books[0], "readers"), ["Alice", "Bob"]);
        assert_eq!(loaded_names(&books[2], "readers"), ["Alice"]);
        assert!(loaded_names(&books[1], "readers").is_empty());

        let Some(Loaded::One(Some(herbert))) = books[0].relation("author") else {
            panic!("author not loaded");
        };
        assert_eq!(loaded_names(herbert, "pencil"), ["HB"]);
        let Some(Loaded::One(Some(tolkien))) = books[2].relation("author") else {
            panic!("author not loaded");
        };
        assert!(loaded_names(tolkien, "pencil").is_empty());
    }

    #[async_std::test]
    async fn test_batch_load_with_args() {
        init_logging();
        let catalog = library();
        let db = library_db().await;
        let loader = Loader::new(&db, &catalog, 1);

        let mut authors = all(&db, &author()).await;
        let args = RelationArgs {
            order: OrderExpression::parse(
                &catalog,
                &book(),
                &value!({ "published": { "order": "desc" } }),
            )
            .unwrap(),
            limit: Some(1),
            ..Default::default()
        };
        loader
            .load(
                &author(),
                &mut authors.iter_mut().collect::<Vec<_>>(),
                "books",
                &args,
            )
            .await
            .unwrap();
        assert_eq!(loaded_names(&authors[0], "books"), ["Children of Dune"]);
        assert_eq!(loaded_names(&authors[1], "books"), ["The Silmarillion"]);
        assert_eq!(loaded_names(&authors[2], "books"), ["Earthsea"]);

        let args = RelationArgs {
            filter: Some(
                FilterExpression::parse(
                    &catalog,
                    &book(),
                    &value!({ "name": { "like": "The %" } }),
                )
                .unwrap(),
            ),
            ..Default::default()
        };
        loader
            .load(
                &author(),
                &mut authors.iter_mut().collect::<Vec<_>>(),
                "books",
                &args,
            )
            .await
            .unwrap();
        assert!(loaded_names(&authors[0], "books").is_empty());
        assert_eq!(
            loaded_names(&authors[1], "books"),
            ["The Hobbit", "The Silmarillion"]
        );
    }
}
