//! Assembly of the executable schema.
//!
//! [`SchemaBuilder`] builds the [`TypeGraph`] of every model reachable from the configured
//! [`RootField`]s, lowers each node to a dynamic type of the execution engine with resolvers bound
//! to a shared runtime, and adds the `Query` and `Mutation` roots. The resulting schema is
//! immutable. Attach a [`Caller`](crate::security::Caller) to each request to authorize it on
//! behalf of a user.

use super::crud::{root_resolver, MutationObserver, NoopObserver};
use super::resolvers::{field_resolver, Runtime};
use super::type_graph::{
    scalar_filter_name, scalar_filter_operators, scalar_type_name, ArgumentNode, FieldType,
    ListOptions, TypeGraph, TypeGraphBuilder, TypeNode, DATE_TIME, ORDER,
};
use super::vocabulary::{English, Vocabulary};
use crate::error::{Error, Result};
use crate::model::{Catalog, ModelId, ScalarKind};
use crate::security::{Policy, SecurityGuard};
use crate::sql::db::{parse_date_time, Connection, DATE_TIME_FORMAT};
use async_graphql::dynamic::{
    Field, InputObject, InputValue, Object, Scalar, Schema, Type, TypeRef,
};
use async_graphql::Value as GqlValue;
use derivative::Derivative;
use std::sync::Arc;

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";

/// A generated root field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RootField {
    /// Every entity of a model, such as `allBooks`.
    All { model: ModelId, options: ListOptions },
    /// One entity by identifier, such as `book(id: 1)`.
    View { model: ModelId },
    /// The `createBook(book: BookInput!)` mutation.
    Create { model: ModelId },
    /// The `updateBook(id: 1, book: BookInput!)` mutation.
    Update { model: ModelId },
    /// The `deleteBook(id: 1)` mutation.
    Delete { model: ModelId },
}

impl RootField {
    /// Every root field of a model, with a paginated, filterable and orderable list.
    pub fn crud(model: impl Into<ModelId>) -> Vec<Self> {
        let model = model.into();
        vec![
            Self::All {
                model: model.clone(),
                options: ListOptions::default(),
            },
            Self::View {
                model: model.clone(),
            },
            Self::Create {
                model: model.clone(),
            },
            Self::Update {
                model: model.clone(),
            },
            Self::Delete { model },
        ]
    }

    pub fn model(&self) -> &ModelId {
        match self {
            Self::All { model, .. }
            | Self::View { model }
            | Self::Create { model }
            | Self::Update { model }
            | Self::Delete { model } => model,
        }
    }

    /// Whether the field belongs to the `Mutation` root.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }
}

/// Options of a generated schema.
#[derive(Clone, Debug)]
pub struct SchemaConfig {
    /// Names of root fields and wording of authorization errors.
    pub vocabulary: Arc<dyn Vocabulary>,
    /// How many levels of a request's selection are analyzed for eager loading.
    pub selection_depth: usize,
    /// How many relations a filter or order may traverse.
    pub max_relation_depth: usize,
    pub roots: Vec<RootField>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            vocabulary: Arc::new(English),
            selection_depth: 10,
            max_relation_depth: 1,
            roots: vec![],
        }
    }
}

impl SchemaConfig {
    pub fn vocabulary(mut self, vocabulary: impl Vocabulary) -> Self {
        self.vocabulary = Arc::new(vocabulary);
        self
    }

    pub fn root(mut self, root: RootField) -> Self {
        self.roots.push(root);
        self
    }

    /// Add every root field of `model`.
    pub fn crud(mut self, model: impl Into<ModelId>) -> Self {
        self.roots.extend(RootField::crud(model));
        self
    }
}

/// Builds the executable schema of a catalog of models.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct SchemaBuilder<C> {
    catalog: Arc<Catalog>,
    #[derivative(Debug = "ignore")]
    conn: C,
    #[derivative(Debug = "ignore")]
    policy: Arc<dyn Policy>,
    config: SchemaConfig,
    #[derivative(Debug = "ignore")]
    observer: Arc<dyn MutationObserver>,
    #[derivative(Debug = "ignore")]
    queries: Vec<Field>,
    #[derivative(Debug = "ignore")]
    mutations: Vec<Field>,
    #[derivative(Debug = "ignore")]
    types: Vec<Type>,
}

impl<C: Connection> SchemaBuilder<C> {
    pub fn new(catalog: impl Into<Arc<Catalog>>, conn: C, policy: Arc<dyn Policy>) -> Self {
        Self {
            catalog: catalog.into(),
            conn,
            policy,
            config: Default::default(),
            observer: Arc::new(NoopObserver),
            queries: vec![],
            mutations: vec![],
            types: vec![],
        }
    }

    pub fn config(mut self, config: SchemaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: impl MutationObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Add a hand-written field to the `Query` root.
    pub fn query_field(mut self, field: Field) -> Self {
        self.queries.push(field);
        self
    }

    /// Add a hand-written field to the `Mutation` root.
    pub fn mutation_field(mut self, field: Field) -> Self {
        self.mutations.push(field);
        self
    }

    /// Register a hand-written type used by hand-written fields.
    pub fn register(mut self, ty: impl Into<Type>) -> Self {
        self.types.push(ty.into());
        self
    }

    /// Build the schema.
    ///
    /// # Errors
    ///
    /// Fails if the metadata of a model reachable from a root field cannot be parsed or has a type
    /// with no GraphQL counterpart, or if the resulting schema is invalid.
    pub fn finish(self) -> Result<Schema> {
        let (graph, roots) = self.build_graph()?;
        let runtime = Arc::new(Runtime {
            conn: self.conn,
            catalog: self.catalog.clone(),
            graph: graph.clone(),
            guard: SecurityGuard::new(self.policy).with_vocabulary(self.config.vocabulary.clone()),
            observer: self.observer,
            selection_depth: self.config.selection_depth,
            max_depth: self.config.max_relation_depth,
        });

        let has_mutation = !self.mutations.is_empty() || roots.iter().any(|root| root.field.is_mutation());
        let mut schema = Schema::build(QUERY, has_mutation.then_some(MUTATION), None);
        for ty in shared_types() {
            schema = schema.register(ty);
        }
        for node in graph.nodes() {
            schema = schema.register(lower_node(&runtime, node));
        }

        let mut query = Object::new(QUERY);
        let mut mutation = Object::new(MUTATION);
        for root in roots {
            let is_mutation = root.field.is_mutation();
            let field = root.lower(&runtime);
            if is_mutation {
                mutation = mutation.field(field);
            } else {
                query = query.field(field);
            }
        }
        for field in self.queries {
            query = query.field(field);
        }
        for field in self.mutations {
            mutation = mutation.field(field);
        }
        schema = schema.register(query);
        if has_mutation {
            schema = schema.register(mutation);
        }
        for ty in self.types {
            schema = schema.register(ty);
        }

        let schema = schema.finish().map_err(|err| Error::Schema {
            error: err.to_string(),
        })?;
        tracing::info!("built schema with {} model types", graph.len());
        Ok(schema)
    }

    /// Build the types every root field needs.
    fn build_graph(&self) -> Result<(Arc<TypeGraph>, Vec<RootPlan>)> {
        let vocabulary = &self.config.vocabulary;
        let mut builder = TypeGraphBuilder::new(&self.catalog);
        let mut roots = vec![];
        for field in &self.config.roots {
            let model = field.model();
            let name = model.name();
            let object = builder.build_object_type(model)?;
            let object_type = FieldType::named(&object.name);
            let input = vocabulary.view(name);
            let id = ArgumentNode::new("id", FieldType::named(TypeRef::INT).non_null());
            let (field_name, ty, args) = match field {
                RootField::All { options, .. } => {
                    let args = builder.list_args(model, *options)?;
                    let ty = if options.paginate {
                        let connection = builder.build_connection_type(model)?;
                        FieldType::named(&connection.name).non_null()
                    } else {
                        object_type.non_null().list().non_null()
                    };
                    (vocabulary.all(name), ty, args)
                }
                RootField::View { .. } => (vocabulary.view(name), object_type, vec![id]),
                RootField::Create { .. } => {
                    let input_type = builder.build_input_type(model)?;
                    (
                        vocabulary.create(name),
                        object_type.non_null(),
                        vec![ArgumentNode::new(
                            &input,
                            FieldType::named(&input_type.name).non_null(),
                        )],
                    )
                }
                RootField::Update { .. } => {
                    let input_type = builder.build_input_type(model)?;
                    (
                        vocabulary.update(name),
                        FieldType::named(TypeRef::BOOLEAN).non_null(),
                        vec![
                            id,
                            ArgumentNode::new(&input, FieldType::named(&input_type.name).non_null()),
                        ],
                    )
                }
                RootField::Delete { .. } => (
                    vocabulary.delete(name),
                    FieldType::named(TypeRef::BOOLEAN).non_null(),
                    vec![id],
                ),
            };
            roots.push(RootPlan {
                field: field.clone(),
                name: field_name,
                ty,
                args,
                input,
            });
        }
        Ok((builder.finish(), roots))
    }
}

/// A root field with its name and signature resolved.
#[derive(Clone, Debug)]
struct RootPlan {
    field: RootField,
    name: String,
    ty: FieldType,
    args: Vec<ArgumentNode>,
    /// The name of the argument holding a mutation's input.
    input: String,
}

impl RootPlan {
    fn lower<C: Connection>(self, runtime: &Arc<Runtime<C>>) -> Field {
        let resolver = root_resolver(runtime.clone(), self.field, self.input);
        let mut field = Field::new(self.name, type_ref(&self.ty), resolver);
        for arg in &self.args {
            field = field.argument(InputValue::new(&arg.name, type_ref(&arg.ty)));
        }
        field
    }
}

fn type_ref(ty: &FieldType) -> TypeRef {
    match ty {
        FieldType::Named(name) => TypeRef::named(name),
        FieldType::NonNull(inner) => TypeRef::NonNull(Box::new(type_ref(inner))),
        FieldType::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
    }
}

/// The engine type of a node of the type graph.
fn lower_node<C: Connection>(runtime: &Arc<Runtime<C>>, node: &TypeNode) -> Type {
    if node.kind().is_input() {
        let mut input = InputObject::new(&node.name);
        for field in node.fields() {
            input = input.field(InputValue::new(&field.name, type_ref(&field.ty)));
        }
        input.into()
    } else {
        let mut object = Object::new(&node.name);
        for field in node.fields() {
            let mut lowered = Field::new(
                &field.name,
                type_ref(&field.ty),
                field_resolver(runtime.clone(), field.clone()),
            );
            for arg in &field.args {
                lowered = lowered.argument(InputValue::new(&arg.name, type_ref(&arg.ty)));
            }
            object = object.field(lowered);
        }
        object.into()
    }
}

/// Types shared by every model: the date scalar, the sort direction and the scalar filters.
fn shared_types() -> Vec<Type> {
    let mut types: Vec<Type> = vec![
        Scalar::new(DATE_TIME)
            .description(format!("A date and time in the format `{DATE_TIME_FORMAT}`."))
            .validator(|value| {
                matches!(value, GqlValue::String(s) if parse_date_time(s).is_some())
            })
            .into(),
        InputObject::new(ORDER)
            .description("A sort direction, `asc` or `desc`.")
            .field(InputValue::new("order", TypeRef::named_nn(TypeRef::STRING)))
            .into(),
    ];
    for kind in [
        ScalarKind::Int,
        ScalarKind::Float,
        ScalarKind::Boolean,
        ScalarKind::String,
        ScalarKind::DateTime,
    ] {
        let scalar = scalar_type_name(kind);
        let mut filter = InputObject::new(scalar_filter_name(kind));
        for op in scalar_filter_operators(kind) {
            let ty = if op.takes_list() {
                TypeRef::named_nn_list(scalar)
            } else {
                TypeRef::named(scalar)
            };
            filter = filter.field(InputValue::new(op.to_string(), ty));
        }
        types.push(filter.into());
    }
    types
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::test::library;
    use crate::security::{test::RecordingPolicy, Ability, Caller};
    use crate::sql::ops::test::library_db;
    use async_graphql::{value, Request, Response};

    async fn library_schema(policy: Arc<RecordingPolicy>) -> Schema {
        let config = SchemaConfig::default()
            .crud("library::Author")
            .crud("library::Book")
            .root(RootField::All {
                model: "library::Reader".into(),
                options: ListOptions {
                    paginate: false,
                    filterable: false,
                    orderable: true,
                },
            });
        SchemaBuilder::new(library(), library_db().await, policy)
            .config(config)
            .finish()
            .unwrap()
    }

    async fn execute(schema: &Schema, query: &str) -> Response {
        schema
            .execute(Request::new(query).data(Caller::anonymous()))
            .await
    }

    async fn data(schema: &Schema, query: &str) -> GqlValue {
        let response = execute(schema, query).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data
    }

    fn error_code(response: &Response) -> Option<GqlValue> {
        response.errors[0]
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .cloned()
    }

    #[async_std::test]
    async fn test_generated_types() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        let sdl = schema.sdl();
        for ty in [
            "type Author",
            "type BookConnection",
            "type BookEdge",
            "input BookInput",
            "input BookFilterInput",
            "input ReaderOrderInput",
            "input FilterString",
            "scalar DateTime",
        ] {
            assert!(sdl.contains(ty), "missing {ty}");
        }
    }

    #[async_std::test]
    async fn test_view_missing_is_not_authorized() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;
        assert_eq!(
            data(&schema, "{ book(id: 99) { name } }").await,
            value!({ "book": null })
        );
        assert!(policy.calls().is_empty());
    }

    #[async_std::test]
    async fn test_view_with_connection() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;
        assert_eq!(
            data(
                &schema,
                "{ author(id: 1) { name books(limit: 1) { totalCount edges { node { name } } } } }"
            )
            .await,
            value!({
                "author": {
                    "name": "Herbert",
                    "books": {
                        "totalCount": 2,
                        "edges": [{ "node": { "name": "Dune" } }],
                    },
                },
            })
        );
        assert_eq!(policy.abilities()[0], Ability::View);
        assert!(policy.abilities().contains(&Ability::ViewAny));
    }

    #[async_std::test]
    async fn test_aliases_with_different_args() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        assert_eq!(
            data(
                &schema,
                r#"{
                    author(id: 1) {
                        dune: books(filter: { name: { eq: "Dune" } }) {
                            totalCount
                            edges { node { name } }
                        }
                        all: books { totalCount edges { node { name } } }
                    }
                }"#
            )
            .await,
            value!({
                "author": {
                    "dune": {
                        "totalCount": 1,
                        "edges": [{ "node": { "name": "Dune" } }],
                    },
                    "all": {
                        "totalCount": 2,
                        "edges": [
                            { "node": { "name": "Dune" } },
                            { "node": { "name": "Children of Dune" } },
                        ],
                    },
                },
            })
        );

        assert_eq!(
            data(
                &schema,
                r#"{
                    allReaders(order: { name: { order: "desc" } }) {
                        name
                        all: books { name }
                        hobbit: books(filter: { name: { eq: "The Hobbit" } }) { name }
                    }
                }"#
            )
            .await,
            value!({
                "allReaders": [
                    { "name": "Bob", "all": [{ "name": "Dune" }], "hobbit": [] },
                    {
                        "name": "Alice",
                        "all": [{ "name": "Dune" }, { "name": "The Hobbit" }],
                        "hobbit": [{ "name": "The Hobbit" }],
                    },
                ],
            })
        );
    }

    #[async_std::test]
    async fn test_all_filtered() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;
        assert_eq!(
            data(
                &schema,
                r#"{
                    allBooks(filter: { name: { eq: "Dune" } }) {
                        totalCount
                        edges { node { name author { name } } }
                    }
                }"#
            )
            .await,
            value!({
                "allBooks": {
                    "totalCount": 1,
                    "edges": [{ "node": { "name": "Dune", "author": { "name": "Herbert" } } }],
                },
            })
        );
        assert!(policy.abilities().contains(&Ability::Filter));

        policy.deny(Ability::Filter);
        let response = execute(
            &schema,
            r#"{ allBooks(filter: { name: { eq: "Dune" } }) { totalCount } }"#,
        )
        .await;
        assert_eq!(error_code(&response), Some(value!("UNAUTHORIZED")));
    }

    #[async_std::test]
    async fn test_total_count_ignores_limit() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        assert_eq!(
            data(
                &schema,
                r#"{
                    allBooks(limit: 2, order: { name: { order: "asc" } }) {
                        totalCount
                        edges { node { name } }
                    }
                }"#
            )
            .await,
            value!({
                "allBooks": {
                    "totalCount": 5,
                    "edges": [
                        { "node": { "name": "Children of Dune" } },
                        { "node": { "name": "Dune" } },
                    ],
                },
            })
        );
    }

    #[async_std::test]
    async fn test_plain_list() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        assert_eq!(
            data(
                &schema,
                r#"{ allReaders(order: { name: { order: "desc" } }) { name books { name } } }"#
            )
            .await,
            value!({
                "allReaders": [
                    { "name": "Bob", "books": [{ "name": "Dune" }] },
                    { "name": "Alice", "books": [{ "name": "Dune" }, { "name": "The Hobbit" }] },
                ],
            })
        );
    }

    #[async_std::test]
    async fn test_create_drops_nulls() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;
        assert_eq!(
            data(
                &schema,
                r#"mutation { createAuthor(author: { name: "Banks", email: null }) { id name email } }"#
            )
            .await,
            value!({ "createAuthor": { "id": 4, "name": "Banks", "email": "unlisted" } })
        );
        assert_eq!(policy.abilities()[0], Ability::Create);
    }

    #[async_std::test]
    async fn test_update_syncs_relations() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        assert_eq!(
            data(
                &schema,
                r#"mutation { updateBook(id: 5, book: { name: "A Wizard of Earthsea", author: 3, readers: [2] }) }"#
            )
            .await,
            value!({ "updateBook": true })
        );
        assert_eq!(
            data(
                &schema,
                "{ book(id: 5) { name readers { edges { node { name } } } } }"
            )
            .await,
            value!({
                "book": {
                    "name": "A Wizard of Earthsea",
                    "readers": { "edges": [{ "node": { "name": "Bob" } }] },
                },
            })
        );
        assert_eq!(
            data(&schema, r#"mutation { updateBook(id: 42, book: { name: "Lost", author: 1 }) }"#).await,
            value!({ "updateBook": false })
        );
    }

    #[async_std::test]
    async fn test_denied_delete_keeps_the_row() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;

        policy.deny(Ability::Delete);
        let response = execute(&schema, "mutation { deleteBook(id: 1) }").await;
        assert_eq!(error_code(&response), Some(value!("UNAUTHORIZED")));

        policy.clear();
        assert_eq!(
            data(&schema, "mutation { deleteBook(id: 42) }").await,
            value!({ "deleteBook": false })
        );
        assert!(policy.calls().is_empty());

        assert_eq!(
            data(&schema, "{ book(id: 1) { name } }").await,
            value!({ "book": { "name": "Dune" } })
        );
    }

    #[async_std::test]
    async fn test_delete() {
        init_logging();
        let schema = library_schema(RecordingPolicy::new()).await;
        assert_eq!(
            data(&schema, "mutation { deleteBook(id: 2) }").await,
            value!({ "deleteBook": true })
        );
        assert_eq!(
            data(&schema, "{ allBooks { totalCount } }").await,
            value!({ "allBooks": { "totalCount": 4 } })
        );
    }

    #[async_std::test]
    async fn test_hidden_property() {
        init_logging();
        let policy = RecordingPolicy::new();
        let schema = library_schema(policy.clone()).await;
        policy.deny_property(Ability::ViewProperty, "email");
        let response = execute(&schema, "{ author(id: 1) { name email } }").await;
        assert_eq!(error_code(&response), Some(value!("UNAUTHORIZED")));
    }
}
