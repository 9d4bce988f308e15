//! Common items that you will always want in scope when generating a schema.

pub use crate::graphql::{
    async_graphql::{self, value},
    ListOptions, MutationObserver, Request, Response, RootField, Schema, SchemaBuilder,
    SchemaConfig, Vocabulary,
};
pub use crate::model::{Catalog, Entity, Model, ModelDefinition, ModelId, RelationKind, RelationOverride};
pub use crate::security::{Ability, AllowAll, Caller, Policy, PolicyArgument};
pub use crate::sql::db::{Connection, Value};
pub use model_graphql_derive::Model;
