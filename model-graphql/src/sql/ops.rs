//! Compilation of high-level GraphQL operations into low-level SQL operations.

use super::db::Column;
use crate::model::{to_snake_case, PropertyDescriptor, PropertyType, ScalarKind, ID};

pub mod filter;
pub mod order;
pub mod persist;
pub mod relation;

/// The name of the column storing the property `property`.
pub fn column_name(property: &str) -> String {
    to_snake_case(property)
}

/// The column storing `property`, qualified by `table`.
pub fn property_column(table: &str, property: &str) -> Column<'static> {
    Column::qualified(table.to_string(), column_name(property))
}

/// The primary key column of `table`.
pub fn id_column(table: &str) -> Column<'static> {
    Column::qualified(table.to_string(), ID)
}

/// The scalar kind of a property, if it is stored as a scalar column.
pub(crate) fn scalar_kind(property: &PropertyDescriptor) -> Option<ScalarKind> {
    match property.ty {
        PropertyType::Scalar(kind) => Some(kind),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::sql::db::{mock, parse_date_time, Record, SchemaColumn, Type, Value};

    fn date(s: &str) -> Value {
        Value::DateTime(parse_date_time(s).unwrap())
    }

    /// An in-memory database holding the tables of [`library`](crate::model::test::library).
    pub async fn library_db() -> mock::Connection {
        let db = mock::Connection::create();
        db.create_table_with_rows(
            "authors",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text),
                SchemaColumn::new("email", Type::Text).with_default("unlisted"),
            ],
            [
                vec!["Herbert".into(), "frank@dune.org".into()],
                vec!["Tolkien".into(), Value::Null],
                vec!["Le Guin".into(), Value::Null],
            ],
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "books",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text).with_default("Untitled"),
                SchemaColumn::new("published", Type::DateTime),
                SchemaColumn::new("author_id", Type::Int),
            ],
            [
                vec!["Dune".into(), date("1965-08-01"), 1.into()],
                vec!["Children of Dune".into(), date("1976-04-01"), 1.into()],
                vec!["The Hobbit".into(), date("1937-09-21"), 2.into()],
                vec!["The Silmarillion".into(), date("1977-09-15"), 2.into()],
                vec!["Earthsea".into(), date("1968-11-01"), 3.into()],
            ],
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "pencils",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text),
                SchemaColumn::new("author_id", Type::Int),
            ],
            [
                vec!["HB".into(), 1.into()],
                vec!["2B".into(), Value::Null],
            ],
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "readers",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text),
            ],
            [vec!["Alice".into()], vec!["Bob".into()]],
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "book_reader",
            [
                SchemaColumn::new("book_id", Type::Int),
                SchemaColumn::new("reader_id", Type::Int),
            ],
            [
                vec![1.into(), 1.into()],
                vec![1.into(), 2.into()],
                vec![3.into(), 1.into()],
            ],
        )
        .await
        .unwrap();
        db
    }

    /// The `name` column of each record.
    pub fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| String::try_from(r["name"].clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_columns() {
        assert_eq!(column_name("createdAt"), "created_at");
        assert_eq!(
            property_column("books", "publishedOn").to_string(),
            "books.published_on"
        );
        assert_eq!(id_column("books").to_string(), "books.id");
    }
}
