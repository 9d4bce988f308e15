//! Query compilation and execution against a relational database.

pub mod db;
pub mod ops;
pub mod paginator;

pub use paginator::{Paginator, RelationSource};
