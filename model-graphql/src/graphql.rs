//! Generation of a GraphQL schema from model metadata, and resolution of requests against it.

pub mod crud;
pub mod eager;
pub(crate) mod resolvers;
pub mod schema;
pub mod selection;
pub mod type_graph;
pub mod vocabulary;

pub use crud::{MutationObserver, NoopObserver};
pub use schema::{RootField, SchemaBuilder, SchemaConfig};
pub use type_graph::{ListOptions, TypeGraph, TypeGraphBuilder};
pub use vocabulary::{English, German, Vocabulary};

// Re-export commonly used `async_graphql` types.
pub use async_graphql::{dynamic::Schema, value, Request, Response};

// Re-export `async_graphql` directly as an escape hatch.
pub extern crate async_graphql;
