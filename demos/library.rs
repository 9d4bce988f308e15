use clap::Parser;
use model_graphql::{
    prelude::*,
    sql::db::{mock, SchemaColumn, Type},
};
use std::sync::Arc;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Models
//

/// A writer of books.
///
/// @property int $id
/// @property string $name
/// @property ?int $born @orderable
/// @property Book[] $books @paginate @filterable @orderable
/// @property-read int $bookCount @computed
#[derive(Model)]
#[model(accessor(author_accessor))]
pub struct Author;

/// @property int $id
/// @property string $title
/// @property Author $author
/// @property ?date $published
/// @property Reader[] $readers @paginate @filterable
#[derive(Model)]
#[model(belongs_to_many(readers, "loans"))]
pub struct Book;

/// @property int $id
/// @property string $name
/// @property Book[] $books
#[derive(Model)]
#[model(belongs_to_many(books, "loans"))]
pub struct Reader;

fn author_accessor(author: &Entity, property: &str) -> Option<Value> {
    match property {
        "bookCount" => match author.relation("books") {
            Some(model_graphql::model::Loaded::Many(books)) => Some((books.len() as i64).into()),
            _ => Some(0.into()),
        },
        _ => None,
    }
}

/// Anyone may read; only signed-in readers may change anything.
fn library_policy(caller: &Caller, ability: Ability, _: &ModelId, _: &[PolicyArgument]) -> bool {
    match ability {
        Ability::Create | Ability::Update | Ability::Delete => !caller.is_anonymous(),
        _ => true,
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Test data
//

#[derive(Clone, Debug, Parser)]
pub struct Options {
    /// The request to execute. If not given, the schema is printed instead.
    #[clap(long, short, env = "EXAMPLE_QUERY")]
    query: Option<String>,
    /// Execute the request on behalf of the reader with this id.
    #[clap(long, env = "EXAMPLE_READER")]
    reader: Option<i64>,
}

fn catalog() -> Catalog {
    Catalog::new().with::<Author>().with::<Book>().with::<Reader>()
}

pub async fn create_db() -> mock::Connection {
    let db = mock::Connection::create();
    db.create_table_with_rows(
        "authors",
        [
            SchemaColumn::new("id", Type::Serial),
            SchemaColumn::new("name", Type::Text),
            SchemaColumn::new("born", Type::Int),
        ],
        [
            vec!["Jeff".into(), 1975.into()],
            vec!["Annie".into(), 2000.into()],
            vec!["Abed".into(), 2001.into()],
        ],
    )
    .await
    .unwrap();
    db.create_table_with_rows(
        "books",
        [
            SchemaColumn::new("id", Type::Serial),
            SchemaColumn::new("title", Type::Text),
            SchemaColumn::new("author_id", Type::Int),
            SchemaColumn::new("published", Type::DateTime),
        ],
        [
            vec!["History of Something".into(), 1.into(), Value::Null],
            vec!["Principles of Intermediate".into(), 2.into(), Value::Null],
            vec!["Studyology".into(), 2.into(), Value::Null],
            vec!["Learning!".into(), 3.into(), Value::Null],
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
        [vec!["Troy".into()], vec!["Britta".into()]],
    )
    .await
    .unwrap();
    db.create_table_with_rows(
        "loans",
        [
            SchemaColumn::new("book_id", Type::Int),
            SchemaColumn::new("reader_id", Type::Int),
        ],
        [vec![3.into(), 1.into()], vec![4.into(), 1.into()], vec![1.into(), 2.into()]],
    )
    .await
    .unwrap();
    db
}

pub async fn schema() -> Schema {
    let config = SchemaConfig::default()
        .crud("library::Author")
        .crud("library::Book")
        .crud("library::Reader");
    SchemaBuilder::new(catalog(), create_db().await, Arc::new(library_policy))
        .config(config)
        .finish()
        .unwrap()
}

/// The caller on whose behalf requests run: the reader with the given id, if there is one.
pub async fn caller(schema: &Schema, reader: Option<i64>) -> Caller {
    let Some(id) = reader else {
        return Caller::anonymous();
    };
    let response = schema
        .execute(format!("{{ reader(id: {id}) {{ name }} }}"))
        .await;
    let async_graphql::Value::Object(data) = response.data else {
        return Caller::anonymous();
    };
    let Some(async_graphql::Value::Object(reader)) = data.get("reader") else {
        return Caller::anonymous();
    };
    let mut entity = Entity::new("library::Reader".into(), Default::default());
    entity.set("id", id.into());
    if let Some(async_graphql::Value::String(name)) = reader.get("name") {
        entity.set("name", name.as_str().into());
    }
    Caller::user(entity)
}

#[async_std::main]
async fn main() {
    model_graphql::init_logging();
    let opt = Options::parse();
    let schema = schema().await;
    let Some(query) = opt.query else {
        println!("{}", schema.sdl());
        return;
    };
    let caller = caller(&schema, opt.reader).await;
    let response = schema.execute(Request::new(query).data(caller)).await;
    println!("{}", render(&response));
}

fn render(response: &Response) -> String {
    match response.errors.as_slice() {
        [] => response.data.to_string(),
        errors => errors
            .iter()
            .map(|err| format!("error: {}", err.message))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use model_graphql::init_logging;

    #[async_std::test]
    async fn test_many_to_one_query() {
        init_logging();
        let schema = schema().await;

        // Authors born in 2000 or later, with the titles of the books they've written.
        let young_authors = schema
            .execute(
                r#"query {
                    allAuthors(
                        filter: { born: { gte: 2000 } }
                        order: { born: { order: "asc" } }
                    ) {
                        edges {
                            node {
                                name
                                bookCount
                                books {
                                    edges {
                                        node {
                                            title
                                        }
                                    }
                                }
                            }
                        }
                    }
                }"#,
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            young_authors.data,
            value!({
                "allAuthors": {
                    "edges": [
                        {
                            "node": {
                                "name": "Annie",
                                "bookCount": 2,
                                "books": {
                                    "edges": [
                                        { "node": { "title": "Principles of Intermediate" } },
                                        { "node": { "title": "Studyology" } },
                                    ]
                                }
                            }
                        },
                        {
                            "node": {
                                "name": "Abed",
                                "bookCount": 1,
                                "books": {
                                    "edges": [
                                        { "node": { "title": "Learning!" } },
                                    ]
                                }
                            }
                        }
                    ]
                }
            })
        );
    }

    #[async_std::test]
    async fn test_relation_filter() {
        init_logging();
        let schema = schema().await;

        // Books whose author is named Annie.
        let books = schema
            .execute(
                r#"query {
                    allBooks(filter: { author: { name: { eq: "Annie" } } }) {
                        totalCount
                        edges { node { title readers { totalCount } } }
                    }
                }"#,
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            books.data,
            value!({
                "allBooks": {
                    "totalCount": 2,
                    "edges": [
                        { "node": { "title": "Principles of Intermediate", "readers": { "totalCount": 0 } } },
                        { "node": { "title": "Studyology", "readers": { "totalCount": 1 } } },
                    ]
                }
            })
        );
    }

    #[async_std::test]
    async fn test_mutations_require_a_reader() {
        init_logging();
        let schema = schema().await;
        let create = r#"mutation { createBook(book: { title: "Chang", author: 1 }) { id title } }"#;

        let anonymous = schema
            .execute(Request::new(create).data(caller(&schema, None).await))
            .await;
        assert_eq!(anonymous.errors.len(), 1);

        let troy = caller(&schema, Some(1)).await;
        assert!(!troy.is_anonymous());
        let created = schema
            .execute(Request::new(create).data(troy))
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            created.data,
            value!({ "createBook": { "id": 5, "title": "Chang" } })
        );
    }
}
