//! Derive macros for the `model_graphql` crate.

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod helpers;
mod model;

/// Derive an implementation of `Model` for a type.
///
/// The doc comment of the type is its annotation block: every line starting with `@property`,
/// `@property-read` or `@property-write` declares a property, with its type, its name and any
/// flags. Other lines are ignored, so annotations can be mixed with ordinary documentation.
///
/// Relations use conventional keys unless declared otherwise. A singular relation belongs to its
/// target, with the foreign key `<property>_id` on this model's table, and a list relation has
/// many targets, each holding the foreign key `<model>_id`. Relations of other shapes, or with
/// other keys, are declared with the relation attributes below.
///
/// # Examples
///
/// ```
/// use model_graphql::prelude::*;
///
/// /// An author of books.
/// ///
/// /// @property int $id
/// /// @property string $name
/// /// @property Book[] $books @paginate @filterable
/// /// @property ?Pencil $pencil
/// #[derive(Model)]
/// #[model(namespace("library"))]
/// #[model(has_one(pencil, "owner_id"))]
/// struct Author;
///
/// let definition = Author::definition();
/// assert_eq!(definition.id(), ModelId::new("library", "Author"));
/// assert_eq!(definition.table(), "authors");
/// assert!(definition.annotations.contains("@property string $name"));
/// assert_eq!(
///     definition.relations,
///     [RelationOverride {
///         property: "pencil".into(),
///         kind: RelationKind::HasOne { foreign_key: Some("owner_id".into()) },
///     }]
/// );
/// ```
///
/// # Attributes
///
/// | Attribute       | Description                                             | Arg     | Required |
/// |-----------------|---------------------------------------------------------|---------|----------|
/// | namespace       | The namespace relation types are resolved in. Defaults to the module path of the type. | string | no |
/// | table           | The backing table. Defaults to the snake case plural of the type name. | string | no |
/// | accessor        | A `fn(&Entity, &str) -> Option<Value>` reading computed properties. | path | no |
/// | belongs_to      | A property whose foreign key is on this model's table, optionally followed by the key. | ident, string? | no |
/// | has_one         | A singular property whose foreign key is on the target's table, optionally followed by the key. | ident, string? | no |
/// | has_many        | A list property whose foreign key is on the target's table, optionally followed by the key. | ident, string? | no |
/// | belongs_to_many | A list property linked through a pivot table, optionally followed by the pivot table, the key of this model and the key of the target. | ident, string? ... | no |
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive(parse_macro_input!(input)).into()
}
