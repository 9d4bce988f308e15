//! Model GraphQL generates a GraphQL API from annotated data models and executes queries against it
//! on top of a relational database. It consists of three layers:
//!
//! * A [model] layer, where applications declare their models with `#[derive(Model)]`. The doc
//!   comments of a model carry `@property` annotations describing its fields and relations, which
//!   are parsed into property descriptors when the schema is built.
//! * A [graphql] layer, which synthesizes object, input, filter, order and connection types for
//!   every model, and assembles root query and mutation fields for viewing, listing, creating,
//!   updating and deleting entities. Every resolver consults the application's
//!   [policy](security::Policy) before revealing or changing data.
//! * A [sql] layer, which compiles filter and order arguments into queries, paginates results and
//!   batch loads relations. It runs against any implementation of the
//!   [`Connection`](sql::db::Connection) trait; an in-memory mock database is included for testing.
//!
//! ```ignore
//! use model_graphql::prelude::*;
//!
//! /// @property int $id
//! /// @property string $name
//! /// @property Book[] $books @paginate @filterable
//! #[derive(Model)]
//! #[model(namespace("library"))]
//! struct Author;
//!
//! let catalog = Catalog::new().with::<Author>().with::<Book>();
//! let schema = SchemaBuilder::new(catalog, connection, Arc::new(AllowAll))
//!     .config(SchemaConfig::default().crud("library::Author").crud("library::Book"))
//!     .finish()?;
//! let response = schema
//!     .execute(Request::new("{ allAuthors { totalCount } }").data(Caller::anonymous()))
//!     .await;
//! ```

// Lets derived code refer to `::model_graphql` from within this crate.
extern crate self as model_graphql;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub mod error;
pub mod graphql;
pub mod model;
pub mod prelude;
pub mod security;
pub mod sql;

pub use error::{Error, Result};
pub use model::Model;
pub use model_graphql_derive::Model;

/// Initialize tracing.
pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        color_eyre::install().unwrap();
        tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}
