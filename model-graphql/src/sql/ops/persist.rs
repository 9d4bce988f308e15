//! Writing entities and relation links to the database.

use super::{id_column, relation::entities};
use crate::error::{Error, Result};
use crate::model::{Entity, Link, ModelId, Relation, ID};
use crate::sql::db::{
    Boolean, Column, Connection, Delete, Insert, Query, Record, Update, Value, WhereClause,
};

/// Load the entity of `model` stored in `table` with the given primary key.
pub async fn find<C: Connection>(
    conn: &C,
    model: &ModelId,
    table: &str,
    id: i64,
) -> Result<Option<Entity>> {
    let records = Query::from(table)
        .filter(Boolean::cmp(id_column(table), "=", id))
        .many(conn)
        .await
        .map_err(Error::sql)?;
    Ok(entities(model, records).into_iter().next())
}

/// Insert a row, returning its generated primary key.
///
/// Columns missing from `attributes` take their default values.
pub async fn insert<C: Connection>(conn: &C, table: &str, attributes: Record) -> Result<i64> {
    let (columns, values): (Vec<_>, Vec<_>) = attributes.into_iter().unzip();
    tracing::info!("inserting into {table}: {columns:?}");
    let keys = conn
        .insert(table, columns)
        .rows([values])
        .execute()
        .await
        .map_err(Error::sql)?;
    keys.first()
        .and_then(Value::as_int)
        .ok_or_else(|| Error::sql(format!("insert into {table} generated no key")))
}

/// Update the row of `table` with primary key `id`.
pub async fn update<C: Connection>(
    conn: &C,
    table: &str,
    id: i64,
    changes: Record,
) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }
    tracing::info!("updating {table} {id}: {:?}", changes.keys());
    let mut statement = conn.update(table);
    for (column, value) in changes {
        statement = statement.set(column, value);
    }
    statement
        .filter(Boolean::cmp(Column::named(ID), "=", id))
        .execute()
        .await
        .map_err(Error::sql)
}

/// Delete the row of `table` with primary key `id`.
pub async fn delete<C: Connection>(conn: &C, table: &str, id: i64) -> Result<usize> {
    tracing::info!("deleting from {table}: {id}");
    conn.delete(table)
        .filter(Boolean::cmp(Column::named(ID), "=", id))
        .execute()
        .await
        .map_err(Error::sql)
}

/// Make `targets` the complete set of targets of an inverse-owned relation.
///
/// For a has-one or has-many relation, targets which are no longer referenced have their foreign
/// key nulled and the new targets point at the owner. For a many-to-many relation, pivot rows are
/// removed and added to match. Belongs-to relations are stored on the owner itself and must be
/// written with the owner's attributes instead.
pub async fn sync<C: Connection>(
    conn: &C,
    relation: &Relation,
    owner: i64,
    targets: &[i64],
) -> Result<()> {
    tracing::info!(
        "syncing {}.{} of {owner} to {targets:?}",
        relation.owner_table,
        relation.property
    );
    let keys = targets.iter().copied().map(Value::Int).collect::<Vec<_>>();
    match &relation.link {
        Link::BelongsTo { .. } => Err(Error::input(format!(
            "{} is stored on the owner and cannot be synced",
            relation.property
        ))),
        Link::HasOne { foreign_key } | Link::HasMany { foreign_key } => {
            let table = relation.target_table.as_str();
            conn.update(table)
                .set(foreign_key.as_str(), Value::Null)
                .filter(Boolean::cmp(Column::named(foreign_key.as_str()), "=", owner))
                .filter(Boolean::none_of(Column::named(ID), keys.clone()))
                .execute()
                .await
                .map_err(Error::sql)?;
            if !keys.is_empty() {
                conn.update(table)
                    .set(foreign_key.as_str(), Value::Int(owner))
                    .filter(Boolean::one_of(Column::named(ID), keys))
                    .execute()
                    .await
                    .map_err(Error::sql)?;
            }
            Ok(())
        }
        Link::BelongsToMany {
            pivot,
            owner_key,
            related_key,
        } => {
            let existing = Query::from(pivot.as_str())
                .filter(Boolean::cmp(
                    Column::qualified(pivot.clone(), owner_key.clone()),
                    "=",
                    owner,
                ))
                .many(conn)
                .await
                .map_err(Error::sql)?
                .into_iter()
                .filter_map(|link| link.get(related_key).and_then(Value::as_int))
                .collect::<Vec<_>>();

            conn.delete(pivot.as_str())
                .filter(WhereClause::all([
                    Boolean::cmp(Column::named(owner_key.as_str()), "=", owner),
                    Boolean::none_of(Column::named(related_key.as_str()), keys),
                ]))
                .execute()
                .await
                .map_err(Error::sql)?;

            let mut added = vec![];
            for target in targets {
                if !existing.contains(target) && !added.contains(target) {
                    added.push(*target);
                }
            }
            if !added.is_empty() {
                conn.insert(pivot.as_str(), [owner_key.as_str(), related_key.as_str()])
                    .rows(
                        added
                            .into_iter()
                            .map(|target| vec![Value::Int(owner), Value::Int(target)]),
                    )
                    .execute()
                    .await
                    .map_err(Error::sql)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::test::library;
    use crate::sql::ops::test::{library_db, names};

    #[async_std::test]
    async fn test_insert_find_update_delete() {
        init_logging();
        let db = library_db().await;
        let book = ModelId::from("library::Book");

        let id = insert(
            &db,
            "books",
            [("author_id".to_string(), Value::Int(3))].into_iter().collect(),
        )
        .await
        .unwrap();
        assert_eq!(id, 6);
        let entity = find(&db, &book, "books", id).await.unwrap().unwrap();
        assert_eq!(entity.get("name"), Value::from("Untitled"));
        assert_eq!(entity.get("published"), Value::Null);

        let changed = update(
            &db,
            "books",
            id,
            [("name".to_string(), Value::from("Tehanu"))]
                .into_iter()
                .collect(),
        )
        .await
        .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            find(&db, &book, "books", id).await.unwrap().unwrap().get("name"),
            Value::from("Tehanu")
        );
        assert_eq!(update(&db, "books", id, Record::new()).await.unwrap(), 0);

        assert_eq!(delete(&db, "books", id).await.unwrap(), 1);
        assert!(find(&db, &book, "books", id).await.unwrap().is_none());
        assert_eq!(delete(&db, "books", id).await.unwrap(), 0);
    }

    #[async_std::test]
    async fn test_sync_has_many() {
        init_logging();
        let db = library_db().await;
        let catalog = library();
        let relation = catalog
            .relation(&"library::Author".into(), "books")
            .unwrap();

        // Move Dune to Le Guin and drop Earthsea.
        sync(&db, &relation, 3, &[1]).await.unwrap();
        let books = db.dump("books").await.unwrap();
        let author_of = |name: &str| {
            books
                .iter()
                .find(|b| b["name"] == Value::from(name))
                .unwrap()["author_id"]
                .clone()
        };
        assert_eq!(author_of("Dune"), Value::Int(3));
        assert_eq!(author_of("Earthsea"), Value::Null);
        assert_eq!(author_of("Children of Dune"), Value::Int(1));
    }

    #[async_std::test]
    async fn test_sync_has_one() {
        init_logging();
        let db = library_db().await;
        let catalog = library();
        let relation = catalog
            .relation(&"library::Author".into(), "pencil")
            .unwrap();

        sync(&db, &relation, 1, &[2]).await.unwrap();
        let pencils = db.dump("pencils").await.unwrap();
        assert_eq!(pencils[0]["author_id"], Value::Null);
        assert_eq!(pencils[1]["author_id"], Value::Int(1));
    }

    #[async_std::test]
    async fn test_sync_belongs_to_many() {
        init_logging();
        let db = library_db().await;
        let catalog = library();
        let relation = catalog
            .relation(&"library::Book".into(), "readers")
            .unwrap();

        // Dune is read by Alice and Bob; keep Bob, drop Alice.
        sync(&db, &relation, 1, &[2, 2]).await.unwrap();
        let readers = Query::from("readers")
            .join(crate::sql::db::JoinClause {
                table: "book_reader".into(),
                lhs: Column::qualified("book_reader", "reader_id"),
                op: "=".into(),
                rhs: Column::qualified("readers", "id"),
            })
            .filter(Boolean::cmp(
                Column::qualified("book_reader", "book_id"),
                "=",
                1,
            ))
            .many(&db)
            .await
            .unwrap();
        assert_eq!(names(&readers), ["Bob"]);
        assert_eq!(db.dump("book_reader").await.unwrap().len(), 2);

        sync(&db, &relation, 2, &[1, 2]).await.unwrap();
        assert_eq!(db.dump("book_reader").await.unwrap().len(), 4);

        assert!(sync(
            &db,
            &catalog.relation(&"library::Book".into(), "author").unwrap(),
            1,
            &[1]
        )
        .await
        .is_err());
    }
}
